use serde_json::Value;

use super::atomic::AtomicModel;
use super::Message;
use crate::utils::errors::SimulationError;

/// The serialization capability behind model snapshots.  Model-private
/// fields are captured as an opaque value, owned by the serialization
/// mechanism rather than the kernel.  The default implementations are
/// no-ops, for models with no private state worth persisting.
pub trait SerializableState {
    fn snapshot_state(&self) -> Result<Value, SimulationError> {
        Ok(Value::Null)
    }

    fn restore_state(&mut self, _state: &Value) -> Result<(), SimulationError> {
        Ok(())
    }
}

/// The `DevsModel` trait defines everything required for a model to operate
/// within the discrete event simulation.  The simulator formalism (Discrete
/// Event System Specification) requires `external_transition`,
/// `internal_transition`, `output`, and `time_advance`.
///
/// `output` is only invoked immediately before an internal transition of an
/// imminent model, never on a pure external transition.  `time_advance`
/// defaults to the registered duration of the current state.
pub trait DevsModel: SerializableState {
    fn atomic(&self) -> &AtomicModel;

    fn atomic_mut(&mut self) -> &mut AtomicModel;

    fn external_transition(
        &mut self,
        port: &str,
        message: &Message,
        elapsed: f64,
    ) -> Result<(), SimulationError>;

    fn internal_transition(&mut self) -> Result<(), SimulationError>;

    fn output(&mut self) -> Result<Option<Message>, SimulationError>;

    fn time_advance(&self) -> f64 {
        self.atomic().time_advance()
    }

    fn name(&self) -> &str {
        self.atomic().name()
    }
}
