use tracing::warn;

use super::Executor;
use crate::models::{DevsModel, Message};
use crate::utils::errors::SimulationError;

/// `BehaviorExecutor` attaches scheduling metadata (time of last and next
/// event, owning engine, instance lifetime) to one model, without altering
/// the model's logic.  It is the innermost link of every decorator chain.
pub struct BehaviorExecutor {
    engine_name: String,
    instance_time: f64,
    destruct_time: f64,
    time_last: f64,
    time_next: f64,
    behavior: Box<dyn DevsModel>,
}

impl BehaviorExecutor {
    pub fn new(behavior: Box<dyn DevsModel>, instance_time: f64, destruct_time: f64) -> Self {
        let time_next = instance_time + behavior.time_advance();
        Self {
            engine_name: String::from("default"),
            instance_time,
            destruct_time,
            time_last: instance_time,
            time_next,
            behavior,
        }
    }
}

impl Executor for BehaviorExecutor {
    fn name(&self) -> &str {
        self.behavior.atomic().name()
    }

    fn engine_name(&self) -> &str {
        &self.engine_name
    }

    fn set_engine_name(&mut self, name: &str) {
        self.engine_name = name.to_string();
    }

    fn create_time(&self) -> f64 {
        self.instance_time
    }

    fn destruct_time(&self) -> f64 {
        self.destruct_time
    }

    fn cur_state(&self) -> &str {
        self.behavior.atomic().cur_state()
    }

    fn external_transition(
        &mut self,
        port: &str,
        message: &Message,
        elapsed: f64,
    ) -> Result<(), SimulationError> {
        // Unknown-port messages point at a coupling misconfiguration;
        // the policy is to ignore and log, not abort the run
        if !self.behavior.atomic().has_input_port(port) {
            warn!(
                model = self.name(),
                port, "external message on an undeclared input port was ignored"
            );
            return Ok(());
        }
        self.behavior.external_transition(port, message, elapsed)
    }

    fn internal_transition(&mut self) -> Result<(), SimulationError> {
        self.behavior.internal_transition()
    }

    fn output(&mut self) -> Result<Option<Message>, SimulationError> {
        self.behavior.output()
    }

    fn time_advance(&self) -> f64 {
        self.behavior.time_advance()
    }

    fn time_last(&self) -> f64 {
        self.time_last
    }

    fn time_next(&self) -> f64 {
        self.time_next
    }

    fn set_req_time(&mut self, global_time: f64) {
        self.time_last = global_time;
        self.time_next = global_time + self.behavior.time_advance();
    }

    fn model(&self) -> &dyn DevsModel {
        self.behavior.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Generator, INFINITE};

    fn gen_executor() -> BehaviorExecutor {
        BehaviorExecutor::new(Box::new(Generator::new("gen", 2.0, None, "job")), 0.0, INFINITE)
    }

    #[test]
    fn passive_model_schedules_no_next_event() {
        let executor = gen_executor();
        assert_eq!(executor.time_last(), 0.0);
        assert!(executor.time_next().is_infinite());
        assert_eq!(executor.create_time(), 0.0);
        assert!(executor.destruct_time().is_infinite());
    }

    #[test]
    fn undeclared_port_is_ignored() -> Result<(), SimulationError> {
        let mut executor = gen_executor();
        let message = Message::new("boundary", "bogus");
        executor.external_transition("bogus", &message, 0.0)?;
        assert_eq!(executor.cur_state(), "Wait");
        Ok(())
    }

    #[test]
    fn set_req_time_recomputes_time_next() -> Result<(), SimulationError> {
        let mut executor = gen_executor();
        let start = Message::new("boundary", "start");
        executor.external_transition("start", &start, 0.0)?;
        executor.set_req_time(3.0);
        assert_eq!(executor.time_last(), 3.0);
        // The generator sits in its zero-advance emit state
        assert_eq!(executor.time_next(), 3.0);
        Ok(())
    }
}
