use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::atomic::{AtomicModel, INFINITE};
use super::model_trait::{DevsModel, SerializableState};
use super::Message;
use crate::utils::errors::SimulationError;

/// The generator produces jobs on a fixed cycle, starting the moment a
/// message arrives on its `start` port.  The first job leaves at the start
/// instant itself (through a zero-advance emit state), and subsequent jobs
/// leave one cycle apart.  A `stop` message returns the generator to its
/// passive wait state.  An optional limit caps the total number of jobs
/// generated.
#[derive(Debug)]
pub struct Generator {
    model: AtomicModel,
    cycle: f64,
    remaining: Option<usize>,
    emitted: usize,
    job_port: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeneratorState {
    cycle: f64,
    remaining: Option<usize>,
    emitted: usize,
    job_port: String,
}

impl Generator {
    pub fn new(name: &str, cycle: f64, limit: Option<usize>, job_port: &str) -> Self {
        let mut model = AtomicModel::new(name);
        model.insert_state("Wait", INFINITE);
        model.insert_state("Emit", 0.0);
        model.insert_state("Generate", cycle);
        model.init_state("Wait");
        model.insert_input_port("start");
        model.insert_input_port("stop");
        model.insert_output_port(job_port);
        Self {
            model,
            cycle,
            remaining: limit,
            emitted: 0,
            job_port: job_port.to_string(),
        }
    }

    pub fn emitted(&self) -> usize {
        self.emitted
    }

    fn exhausted(&self) -> bool {
        self.remaining == Some(0)
    }
}

impl SerializableState for Generator {
    fn snapshot_state(&self) -> Result<Value, SimulationError> {
        Ok(serde_json::to_value(GeneratorState {
            cycle: self.cycle,
            remaining: self.remaining,
            emitted: self.emitted,
            job_port: self.job_port.clone(),
        })?)
    }

    fn restore_state(&mut self, state: &Value) -> Result<(), SimulationError> {
        let snapshot: GeneratorState = serde_json::from_value(state.clone())?;
        self.cycle = snapshot.cycle;
        self.remaining = snapshot.remaining;
        self.emitted = snapshot.emitted;
        self.model.insert_state("Generate", self.cycle);
        self.model.insert_output_port(&snapshot.job_port);
        self.job_port = snapshot.job_port;
        Ok(())
    }
}

impl DevsModel for Generator {
    fn atomic(&self) -> &AtomicModel {
        &self.model
    }

    fn atomic_mut(&mut self) -> &mut AtomicModel {
        &mut self.model
    }

    fn external_transition(
        &mut self,
        port: &str,
        _message: &Message,
        _elapsed: f64,
    ) -> Result<(), SimulationError> {
        match port {
            "start" if !self.exhausted() => self.model.set_state("Emit"),
            "start" => Ok(()),
            "stop" => self.model.set_state("Wait"),
            _ => Ok(()),
        }
    }

    fn internal_transition(&mut self) -> Result<(), SimulationError> {
        self.emitted += 1;
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining = remaining.saturating_sub(1);
        }
        if self.exhausted() {
            self.model.set_state("Wait")
        } else {
            self.model.set_state("Generate")
        }
    }

    fn output(&mut self) -> Result<Option<Message>, SimulationError> {
        if self.model.cur_state() == "Wait" {
            return Ok(None);
        }
        let mut message = Message::new(self.model.name(), &self.job_port);
        message.insert(Value::from(self.emitted as u64));
        Ok(Some(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_passive_and_emits_after_start() -> Result<(), SimulationError> {
        let mut generator = Generator::new("gen", 2.0, None, "job");
        assert!(generator.time_advance().is_infinite());

        let start = Message::new("boundary", "start");
        generator.external_transition("start", &start, 0.0)?;
        assert_eq!(generator.atomic().cur_state(), "Emit");
        assert_eq!(generator.time_advance(), 0.0);

        let job = generator.output()?.expect("job message");
        assert_eq!(job.port(), "job");
        generator.internal_transition()?;
        assert_eq!(generator.atomic().cur_state(), "Generate");
        assert_eq!(generator.time_advance(), 2.0);
        Ok(())
    }

    #[test]
    fn limit_exhaustion_returns_to_wait() -> Result<(), SimulationError> {
        let mut generator = Generator::new("gen", 1.0, Some(1), "job");
        let start = Message::new("boundary", "start");
        generator.external_transition("start", &start, 0.0)?;
        generator.output()?;
        generator.internal_transition()?;
        assert_eq!(generator.atomic().cur_state(), "Wait");
        assert_eq!(generator.emitted(), 1);
        Ok(())
    }

    #[test]
    fn state_round_trips_through_snapshot() -> Result<(), SimulationError> {
        let mut generator = Generator::new("gen", 3.0, Some(10), "user_out");
        let start = Message::new("boundary", "start");
        generator.external_transition("start", &start, 0.0)?;
        generator.output()?;
        generator.internal_transition()?;

        let state = generator.snapshot_state()?;
        let mut restored = Generator::new("gen", 1.0, None, "user_out");
        restored.restore_state(&state)?;
        assert_eq!(restored.emitted(), 1);
        assert_eq!(restored.remaining, Some(9));
        assert_eq!(restored.cycle, 3.0);
        Ok(())
    }
}
