use std::collections::{BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::atomic::{AtomicModel, INFINITE};
use super::model_trait::{DevsModel, SerializableState};
use super::Message;
use crate::utils::errors::SimulationError;

/// The bounded queue buffers jobs arriving on `job_in` and dispatches them
/// to a bank of workers, one job per zero-time step, over the per-worker
/// output ports `worker0..workerN`.  Workers announce themselves free on
/// `worker_free`.  Jobs arriving at a full queue are dropped with a warning.
/// The fan-out is widenable with `set_proc_num`, for structural growth while
/// a simulation is paused.
#[derive(Debug)]
pub struct BoundedQueue {
    model: AtomicModel,
    capacity: usize,
    proc_num: usize,
    jobs: VecDeque<Value>,
    idle: BTreeSet<usize>,
    // Worker chosen at output time; the internal transition marks exactly
    // this worker busy, so a confluent worker_free cannot redirect it
    pending_dispatch: Option<usize>,
    dispatched: usize,
    dropped: usize,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueueState {
    capacity: usize,
    proc_num: usize,
    jobs: VecDeque<Value>,
    idle: BTreeSet<usize>,
    dispatched: usize,
    dropped: usize,
}

impl BoundedQueue {
    pub fn new(name: &str, capacity: usize, proc_num: usize) -> Self {
        let mut model = AtomicModel::new(name);
        model.insert_state("Wait", INFINITE);
        model.insert_state("Send", 0.0);
        model.init_state("Wait");
        model.insert_input_port("job_in");
        model.insert_input_port("worker_free");
        let mut queue = Self {
            model,
            capacity,
            proc_num: 0,
            jobs: VecDeque::new(),
            idle: BTreeSet::new(),
            pending_dispatch: None,
            dispatched: 0,
            dropped: 0,
        };
        queue.set_proc_num(proc_num);
        queue
    }

    /// Widens the worker fan-out to `proc_num` ports, marking the added
    /// workers idle.  Narrowing is not supported; a smaller value is a
    /// no-op.
    pub fn set_proc_num(&mut self, proc_num: usize) {
        for index in self.proc_num..proc_num {
            self.model.insert_output_port(&format!("worker{index}"));
            self.idle.insert(index);
        }
        self.proc_num = self.proc_num.max(proc_num);
    }

    pub fn occupancy(&self) -> usize {
        self.jobs.len()
    }

    pub fn dispatched(&self) -> usize {
        self.dispatched
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }

    fn dispatchable(&self) -> bool {
        !self.jobs.is_empty() && !self.idle.is_empty()
    }

    fn reschedule(&mut self) -> Result<(), SimulationError> {
        if self.dispatchable() {
            self.model.set_state("Send")
        } else {
            self.model.set_state("Wait")
        }
    }
}

impl SerializableState for BoundedQueue {
    fn snapshot_state(&self) -> Result<Value, SimulationError> {
        Ok(serde_json::to_value(QueueState {
            capacity: self.capacity,
            proc_num: self.proc_num,
            jobs: self.jobs.clone(),
            idle: self.idle.clone(),
            dispatched: self.dispatched,
            dropped: self.dropped,
        })?)
    }

    fn restore_state(&mut self, state: &Value) -> Result<(), SimulationError> {
        let snapshot: QueueState = serde_json::from_value(state.clone())?;
        self.capacity = snapshot.capacity;
        self.jobs = snapshot.jobs;
        self.dispatched = snapshot.dispatched;
        self.dropped = snapshot.dropped;
        // A restored queue keeps the wider of the recorded and constructed
        // fan-outs; workers beyond the recorded fan-out start idle, and the
        // recorded idle set is adopted verbatim for the rest
        let wider = self.proc_num.max(snapshot.proc_num);
        for index in 0..wider {
            self.model.insert_output_port(&format!("worker{index}"));
        }
        self.idle = snapshot.idle;
        for index in snapshot.proc_num..wider {
            self.idle.insert(index);
        }
        self.proc_num = wider;
        Ok(())
    }
}

impl DevsModel for BoundedQueue {
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
        match port {
            "job_in" => {
                if self.jobs.len() >= self.capacity {
                    self.dropped += 1;
                    warn!(queue = self.model.name(), "job arrived at a full queue and was dropped");
                } else {
                    self.jobs
                        .push_back(message.retrieve().first().cloned().unwrap_or(Value::Null));
                }
            }
            "worker_free" => {
                if let Some(index) = message.retrieve().first().and_then(Value::as_u64) {
                    self.idle.insert(index as usize);
                }
            }
            _ => return Ok(()),
        }
        self.reschedule()
    }

    fn internal_transition(&mut self) -> Result<(), SimulationError> {
        if let Some(index) = self.pending_dispatch.take() {
            if self.jobs.pop_front().is_some() {
                self.idle.remove(&index);
                self.dispatched += 1;
            }
        }
        self.reschedule()
    }

    fn output(&mut self) -> Result<Option<Message>, SimulationError> {
        if !self.dispatchable() {
            return Ok(None);
        }
        // Deterministic pairing: front job to the lowest idle worker index
        let index = match self.idle.iter().next() {
            Some(index) => *index,
            None => return Ok(None),
        };
        let job = match self.jobs.front() {
            Some(job) => job.clone(),
            None => return Ok(None),
        };
        self.pending_dispatch = Some(index);
        Ok(Some(Message::with_payload(
            self.model.name(),
            &format!("worker{index}"),
            vec![job],
        )))
    }
}
