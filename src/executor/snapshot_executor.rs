use std::path::PathBuf;

use tracing::warn;

use super::Executor;
use crate::models::{DevsModel, Message};
use crate::snapshot::ModelSnapshot;
use crate::utils::errors::SimulationError;

/// Interception hooks around the three event functions of a wrapped
/// executor, plus a per-tick time condition.  Every hook has a default
/// no-op implementation - the hooks are the intended extension point, and
/// the decorator invokes them unconditionally.  Implementations override
/// only what they need.
pub trait SnapshotHooks {
    fn pre_external(&mut self, _port: &str, _message: &Message, _cur_state: &str) {}

    fn post_external(&mut self, _port: &str, _message: &Message, _cur_state: &str) {}

    fn pre_internal(&mut self, _cur_state: &str) {}

    fn post_internal(&mut self, _cur_state: &str) {}

    fn pre_output(&mut self, _cur_state: &str) {}

    fn post_output(&mut self, _cur_state: &str, _output: Option<&Message>) {}

    /// Evaluated once per scheduling tick with the global time; returning
    /// true snapshots the wrapped model.
    fn time_condition(&mut self, _global_time: f64) -> bool {
        false
    }
}

/// `SnapshotExecutor` decorates any executor with snapshot behavior: hooks
/// run around each delegated event function, and when the time condition
/// fires the wrapped model's state is serialized and persisted under the
/// snapshot directory.  Decorators compose - the wrapped executor may
/// itself be a decorator.
pub struct SnapshotExecutor {
    inner: Box<dyn Executor>,
    hooks: Box<dyn SnapshotHooks>,
    snapshot_dir: PathBuf,
}

impl SnapshotExecutor {
    pub fn new(
        inner: Box<dyn Executor>,
        hooks: Box<dyn SnapshotHooks>,
        snapshot_dir: PathBuf,
    ) -> Self {
        Self {
            inner,
            hooks,
            snapshot_dir,
        }
    }

    /// Persists a snapshot of the wrapped model.  A serialization or I/O
    /// failure is logged and swallowed - a tick-triggered snapshot must
    /// never corrupt or abort the live run.
    fn take_snapshot(&mut self, global_time: f64) {
        let snapshot = match ModelSnapshot::take(self.inner.as_ref()) {
            Ok(snapshot) => snapshot,
            Err(error) => {
                warn!(model = self.inner.name(), %error, "model state serialization failed");
                return;
            }
        };
        let path = self
            .snapshot_dir
            .join(format!("{}_{}.json", self.inner.name(), global_time));
        if let Err(error) = snapshot.write(&path) {
            warn!(model = self.inner.name(), %error, "model snapshot write failed");
        }
    }
}

impl Executor for SnapshotExecutor {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn engine_name(&self) -> &str {
        self.inner.engine_name()
    }

    fn set_engine_name(&mut self, name: &str) {
        self.inner.set_engine_name(name);
    }

    fn create_time(&self) -> f64 {
        self.inner.create_time()
    }

    fn destruct_time(&self) -> f64 {
        self.inner.destruct_time()
    }

    fn cur_state(&self) -> &str {
        self.inner.cur_state()
    }

    fn external_transition(
        &mut self,
        port: &str,
        message: &Message,
        elapsed: f64,
    ) -> Result<(), SimulationError> {
        let before = self.inner.cur_state().to_string();
        self.hooks.pre_external(port, message, &before);
        self.inner.external_transition(port, message, elapsed)?;
        let after = self.inner.cur_state().to_string();
        self.hooks.post_external(port, message, &after);
        Ok(())
    }

    fn internal_transition(&mut self) -> Result<(), SimulationError> {
        let before = self.inner.cur_state().to_string();
        self.hooks.pre_internal(&before);
        self.inner.internal_transition()?;
        let after = self.inner.cur_state().to_string();
        self.hooks.post_internal(&after);
        Ok(())
    }

    fn output(&mut self) -> Result<Option<Message>, SimulationError> {
        let before = self.inner.cur_state().to_string();
        self.hooks.pre_output(&before);
        let output = self.inner.output()?;
        self.hooks.post_output(&before, output.as_ref());
        Ok(output)
    }

    fn time_advance(&self) -> f64 {
        self.inner.time_advance()
    }

    fn time_last(&self) -> f64 {
        self.inner.time_last()
    }

    fn time_next(&self) -> f64 {
        self.inner.time_next()
    }

    fn set_req_time(&mut self, global_time: f64) {
        self.inner.set_req_time(global_time);
    }

    fn tick(&mut self, global_time: f64) {
        if self.hooks.time_condition(global_time) {
            self.take_snapshot(global_time);
        }
        self.inner.tick(global_time);
    }

    fn model(&self) -> &dyn DevsModel {
        self.inner.model()
    }
}
