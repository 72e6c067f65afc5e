use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::atomic::{AtomicModel, INFINITE};
use super::model_trait::{DevsModel, SerializableState};
use super::Message;
use crate::utils::errors::SimulationError;

/// The collector is a passive sink: it consumes messages on its single
/// input port and records the first payload item of each, with the
/// simulation time of reception.  It never schedules an internal event.
///
/// The reception clock is the accumulated elapsed time since the collector
/// was registered, so it equals the global time for a collector registered
/// at time zero.
#[derive(Debug)]
pub struct Collector {
    model: AtomicModel,
    in_port: String,
    received: Vec<Value>,
    times: Vec<f64>,
    clock: f64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CollectorState {
    in_port: String,
    received: Vec<Value>,
    times: Vec<f64>,
    clock: f64,
}

impl Collector {
    pub fn new(name: &str, in_port: &str) -> Self {
        let mut model = AtomicModel::new(name);
        model.insert_state("Wait", INFINITE);
        model.init_state("Wait");
        model.insert_input_port(in_port);
        Self {
            model,
            in_port: in_port.to_string(),
            received: Vec::new(),
            times: Vec::new(),
            clock: 0.0,
        }
    }

    pub fn received(&self) -> &[Value] {
        &self.received
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }
}

impl SerializableState for Collector {
    fn snapshot_state(&self) -> Result<Value, SimulationError> {
        Ok(serde_json::to_value(CollectorState {
            in_port: self.in_port.clone(),
            received: self.received.clone(),
            times: self.times.clone(),
            clock: self.clock,
        })?)
    }

    fn restore_state(&mut self, state: &Value) -> Result<(), SimulationError> {
        let snapshot: CollectorState = serde_json::from_value(state.clone())?;
        self.model.insert_input_port(&snapshot.in_port);
        self.in_port = snapshot.in_port;
        self.received = snapshot.received;
        self.times = snapshot.times;
        self.clock = snapshot.clock;
        Ok(())
    }
}

impl DevsModel for Collector {
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
        elapsed: f64,
    ) -> Result<(), SimulationError> {
        self.clock += elapsed;
        if port == self.in_port {
            self.received
                .push(message.retrieve().first().cloned().unwrap_or(Value::Null));
            self.times.push(self.clock);
        }
        Ok(())
    }

    fn internal_transition(&mut self) -> Result<(), SimulationError> {
        // Passive model; the scheduler never makes it imminent
        Err(SimulationError::InvalidModelState)
    }

    fn output(&mut self) -> Result<Option<Message>, SimulationError> {
        Ok(None)
    }
}
