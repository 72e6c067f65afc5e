use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::atomic::{AtomicModel, INFINITE};
use super::model_trait::{DevsModel, SerializableState};
use super::Message;
use crate::utils::errors::SimulationError;

/// The processor is a single-job worker with a fixed service time.  A job
/// arriving on `in` while idle starts service; when service completes, the
/// processor announces itself free on `next`, carrying its worker index, and
/// returns to idle.  A job arriving mid-service is dropped with a warning -
/// an upstream dispatcher is expected to send work only to idle workers.
#[derive(Debug)]
pub struct Processor {
    model: AtomicModel,
    index: usize,
    service_time: f64,
    job: Option<Value>,
    processed: usize,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProcessorState {
    index: usize,
    service_time: f64,
    job: Option<Value>,
    processed: usize,
}

impl Processor {
    pub fn new(name: &str, index: usize, service_time: f64) -> Self {
        let mut model = AtomicModel::new(name);
        model.insert_state("Idle", INFINITE);
        model.insert_state("Process", service_time);
        model.init_state("Idle");
        model.insert_input_port("in");
        model.insert_output_port("next");
        Self {
            model,
            index,
            service_time,
            job: None,
            processed: 0,
        }
    }

    pub fn processed(&self) -> usize {
        self.processed
    }
}

impl SerializableState for Processor {
    fn snapshot_state(&self) -> Result<Value, SimulationError> {
        Ok(serde_json::to_value(ProcessorState {
            index: self.index,
            service_time: self.service_time,
            job: self.job.clone(),
            processed: self.processed,
        })?)
    }

    fn restore_state(&mut self, state: &Value) -> Result<(), SimulationError> {
        let snapshot: ProcessorState = serde_json::from_value(state.clone())?;
        self.index = snapshot.index;
        self.service_time = snapshot.service_time;
        self.job = snapshot.job;
        self.processed = snapshot.processed;
        self.model.insert_state("Process", self.service_time);
        Ok(())
    }
}

impl DevsModel for Processor {
    fn atomic(&self) -> &AtomicModel {
        &self.model
    }

    fn atomic_mut(&mut self) -> &mut AtomicModel {
        &mut self.model
    }

    fn external_transition(
        &mut self,
        port: &str,
        message: &Message,
        _elapsed: f64,
    ) -> Result<(), SimulationError> {
        if port != "in" {
            return Ok(());
        }
        if self.model.cur_state() == "Process" {
            warn!(
                worker = self.model.name(),
                "job arrived while busy and was dropped"
            );
            return Ok(());
        }
        self.job = Some(message.retrieve().first().cloned().unwrap_or(Value::Null));
        self.model.set_state("Process")
    }

    fn internal_transition(&mut self) -> Result<(), SimulationError> {
        self.processed += 1;
        self.job = None;
        self.model.set_state("Idle")
    }

    fn output(&mut self) -> Result<Option<Message>, SimulationError> {
        if self.model.cur_state() != "Process" {
            return Ok(None);
        }
        let mut message = Message::new(self.model.name(), "next");
        message.insert(Value::from(self.index as u64));
        Ok(Some(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processes_one_job_at_a_time() -> Result<(), SimulationError> {
        let mut worker = Processor::new("worker0", 0, 5.0);
        let mut job = Message::new("queue", "worker0");
        job.insert(Value::from("job 1"));
        worker.external_transition("in", &job, 0.0)?;
        assert_eq!(worker.atomic().cur_state(), "Process");
        assert_eq!(worker.time_advance(), 5.0);

        // A second arrival mid-service is dropped, not queued
        let mut second = Message::new("queue", "worker0");
        second.insert(Value::from("job 2"));
        worker.external_transition("in", &second, 2.0)?;
        assert_eq!(worker.job, Some(Value::from("job 1")));

        let freed = worker.output()?.expect("free announcement");
        assert_eq!(freed.port(), "next");
        worker.internal_transition()?;
        assert_eq!(worker.atomic().cur_state(), "Idle");
        assert_eq!(worker.processed(), 1);
        Ok(())
    }
}
