//! The executor module attaches scheduling metadata to models and exposes
//! the capability interface the scheduler drives.  Decorators re-implement
//! that interface transparently, so orthogonal concerns (snapshotting tied
//! to a time predicate, tracing, auditing) compose with any model without
//! modifying it.

pub mod behavior_executor;
pub mod snapshot_executor;

pub use self::behavior_executor::BehaviorExecutor;
pub use self::snapshot_executor::{SnapshotExecutor, SnapshotHooks};

use crate::models::{DevsModel, Message};
use crate::utils::errors::SimulationError;

/// The `Executor` trait is the scheduler-facing capability interface over a
/// wrapped model: current state, the three event functions, time advance,
/// and the scheduling metadata (time of last and next event).  Any
/// decorator can wrap a `Box<dyn Executor>` and re-implement the interface
/// around the wrapped one.
pub trait Executor {
    fn name(&self) -> &str;

    fn engine_name(&self) -> &str;

    /// Tags the executor chain with the owning engine, at registration.
    fn set_engine_name(&mut self, name: &str);

    /// The wrapped model's declared input ports.
    fn input_ports(&self) -> &[String] {
        self.model().atomic().input_ports()
    }

    /// Simulation time at which the wrapped model instance was created.
    fn create_time(&self) -> f64;

    /// Simulation time at which the instance is destroyed, possibly
    /// infinite.
    fn destruct_time(&self) -> f64;

    fn cur_state(&self) -> &str;

    fn external_transition(
        &mut self,
        port: &str,
        message: &Message,
        elapsed: f64,
    ) -> Result<(), SimulationError>;

    fn internal_transition(&mut self) -> Result<(), SimulationError>;

    fn output(&mut self) -> Result<Option<Message>, SimulationError>;

    fn time_advance(&self) -> f64;

    fn time_last(&self) -> f64;

    fn time_next(&self) -> f64;

    /// Commits a completed transition at `global_time`: time_last becomes
    /// the global time and time_next is re-derived from the model's time
    /// advance in its new state.
    fn set_req_time(&mut self, global_time: f64);

    /// Called once per scheduling tick, after all of the tick's transitions
    /// have committed.  The default is a deliberate no-op; decorators
    /// override it (e.g. to evaluate snapshot conditions).
    fn tick(&mut self, _global_time: f64) {}

    /// Access to the wrapped model, for state serialization.
    fn model(&self) -> &dyn DevsModel;
}
