//! The simulator module provides the mechanics to orchestrate the models
//! and couplings via discrete event simulation.  The specific formalism for
//! simulation execution is the Discrete Event System Specification.  User
//! interaction is also captured in this module - simulation stepping, input
//! injection, pause/resume, and structural mutation while paused.
//!
//! The scheduler is logically single-threaded and cooperative: no model
//! executes concurrently with another, and no transition re-enters the
//! scheduler.  Real-time mode only paces the driving thread to the wall
//! clock; it is not semantic concurrency.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::executor::{BehaviorExecutor, Executor, SnapshotExecutor};
use crate::models::{DevsModel, Message, INFINITE};
use crate::snapshot::{
    EventRecord, ModelSnapshot, SimulationSnapshot, SnapshotManager, SNAPSHOT_VERSION,
};
use crate::utils::errors::SimulationError;
use crate::utils::OrderedTime;

pub mod coupling;

pub use self::coupling::{Coupling, CouplingGraph, Endpoint, RelayPorts, StructuralModel};

/// Execution pacing, selected at construction.  Virtual time advances as
/// fast as possible; real time paces each advance to the wall clock, at
/// `time_resolution` seconds per simulated time unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionType {
    VirtualTime,
    RealTime,
}

struct PendingEvent {
    time: f64,
    seq: u64,
    port: String,
    message: Message,
}

/// `SysExecutor` is the global scheduler: it owns the clock, the registered
/// executors, the coupling graph, and the event-advance and message-routing
/// algorithm.  There is no ambient engine instance - a `SysExecutor` is
/// explicitly constructed and explicitly owned.
///
/// A scheduling step is not transactional: a transition error aborts the
/// step after earlier executors in the deterministic (name) order have
/// already committed, and propagates to the `simulate` caller.
pub struct SysExecutor {
    engine_name: String,
    time_resolution: f64,
    mode: ExecutionType,
    global_time: f64,
    running: bool,
    input_ports: Vec<String>,
    executors: BTreeMap<String, Box<dyn Executor>>,
    schedule: BTreeSet<(OrderedTime, String)>,
    coupling: CouplingGraph,
    pending_events: Vec<PendingEvent>,
    event_seq: u64,
    snapshot_manager: Option<SnapshotManager>,
    wall_anchor: Option<(Instant, f64)>,
}

impl SysExecutor {
    /// This constructor method creates a scheduler with the supplied time
    /// resolution and execution mode.  The clock starts at 0.0.
    pub fn new(time_resolution: f64, mode: ExecutionType) -> Self {
        Self {
            engine_name: String::from("default"),
            time_resolution,
            mode,
            global_time: 0.0,
            running: false,
            input_ports: Vec::new(),
            executors: BTreeMap::new(),
            schedule: BTreeSet::new(),
            coupling: CouplingGraph::default(),
            pending_events: Vec::new(),
            event_seq: 0,
            snapshot_manager: None,
            wall_anchor: None,
        }
    }

    /// Like `new`, with a snapshot manager attached.  Models registered
    /// under a name with snapshot hooks get wrapped in a snapshot decorator
    /// at registration.
    pub fn with_snapshot_manager(
        time_resolution: f64,
        mode: ExecutionType,
        snapshot_manager: SnapshotManager,
    ) -> Self {
        Self {
            snapshot_manager: Some(snapshot_manager),
            ..Self::new(time_resolution, mode)
        }
    }

    /// An accessor method for the simulation global time.
    pub fn global_time(&self) -> f64 {
        self.global_time
    }

    /// Declares a boundary input port, through which external events enter
    /// the simulation.
    pub fn insert_input_port(&mut self, port: &str) {
        if !self.input_ports.iter().any(|name| name == port) {
            self.input_ports.push(port.to_string());
        }
    }

    /// Registers a model.  The model is validated eagerly (state table,
    /// initial state), wrapped in an executor created at the current global
    /// time, and indexed for scheduling.
    pub fn register_entity(&mut self, behavior: Box<dyn DevsModel>) -> Result<(), SimulationError> {
        let time_last = self.global_time;
        self.install_entity(behavior, time_last)
    }

    /// Registers a model restored from a snapshot: the recorded state and
    /// time of last event are adopted, and the time of next event is
    /// re-derived from the restored state's registered duration, so resumed
    /// execution is indistinguishable from an uninterrupted run.
    pub fn register_entity_restored(
        &mut self,
        mut behavior: Box<dyn DevsModel>,
        snapshot: &ModelSnapshot,
    ) -> Result<(), SimulationError> {
        behavior.atomic_mut().set_state(&snapshot.cur_state)?;
        self.install_entity(behavior, snapshot.time_last)
    }

    fn install_entity(
        &mut self,
        behavior: Box<dyn DevsModel>,
        time_last: f64,
    ) -> Result<(), SimulationError> {
        behavior.atomic().validate()?;
        let name = behavior.name().to_string();
        if self.executors.contains_key(&name) || self.coupling.is_relay(&name) {
            return Err(SimulationError::DuplicateModel);
        }
        let mut executor: Box<dyn Executor> =
            Box::new(BehaviorExecutor::new(behavior, time_last, INFINITE));
        if let Some(manager) = self.snapshot_manager.as_mut() {
            if let Some(hooks) = manager.take_hooks(&name) {
                let snapshot_dir = manager.snapshot_dir().to_path_buf();
                executor = Box::new(SnapshotExecutor::new(executor, hooks, snapshot_dir));
            }
        }
        executor.set_engine_name(&self.engine_name);
        self.schedule_insert(&name, executor.time_next());
        self.executors.insert(name, executor);
        Ok(())
    }

    /// Registers a structural model: its children become executors and its
    /// name becomes a relay node, so outer couplings can address the
    /// container boundary.
    pub fn register_structural(
        &mut self,
        structural: StructuralModel,
    ) -> Result<(), SimulationError> {
        let (name, ports, components, inputs, outputs, internals) = structural.into_parts();
        if self.executors.contains_key(&name) || self.coupling.is_relay(&name) {
            return Err(SimulationError::DuplicateModel);
        }
        self.coupling.add_relay(&name, ports);
        for component in components {
            self.register_entity(component)?;
        }
        for coupling in inputs {
            self.coupling_relation(
                Some(&name),
                &coupling.source_port,
                Some(&coupling.target_id),
                &coupling.target_port,
            )?;
        }
        for coupling in outputs {
            self.coupling_relation(
                Some(&coupling.source_id),
                &coupling.source_port,
                Some(&name),
                &coupling.target_port,
            )?;
        }
        for coupling in internals {
            self.coupling_relation(
                Some(&coupling.source_id),
                &coupling.source_port,
                Some(&coupling.target_id),
                &coupling.target_port,
            )?;
        }
        Ok(())
    }

    /// Unregisters a model, destroying its executor and dropping every
    /// coupling that references it.  Intended for structural mutation while
    /// the simulation is paused.
    pub fn remove_entity(&mut self, name: &str) -> Result<(), SimulationError> {
        let executor = self
            .executors
            .remove(name)
            .ok_or(SimulationError::ModelNotFound)?;
        self.schedule_remove(name, executor.time_next());
        self.coupling.remove_entity(name);
        Ok(())
    }

    /// Adds a coupling relation; `None` addresses the scheduler boundary.
    /// The relation is validated eagerly: an unregistered model or an
    /// undeclared port is rejected here, not at dispatch time.
    pub fn coupling_relation(
        &mut self,
        source: Option<&str>,
        source_port: &str,
        target: Option<&str>,
        target_port: &str,
    ) -> Result<(), SimulationError> {
        let source = self.endpoint_for(source, source_port, true)?;
        let target = self.endpoint_for(target, target_port, false)?;
        self.coupling.add(Coupling {
            source,
            source_port: source_port.to_string(),
            target,
            target_port: target_port.to_string(),
        });
        Ok(())
    }

    fn endpoint_for(
        &self,
        entity: Option<&str>,
        port: &str,
        is_source: bool,
    ) -> Result<Endpoint, SimulationError> {
        match entity {
            None => {
                // A boundary source must be a declared input port; a
                // boundary target is an external sink and accepts any port
                if is_source && !self.input_ports.iter().any(|name| name == port) {
                    return Err(SimulationError::PortNotFound);
                }
                Ok(Endpoint::Boundary)
            }
            Some(name) => {
                if let Some(executor) = self.executors.get(name) {
                    let declared = if is_source {
                        executor.model().atomic().has_output_port(port)
                    } else {
                        executor.input_ports().iter().any(|declared| declared == port)
                    };
                    if !declared {
                        return Err(SimulationError::PortNotFound);
                    }
                } else if let Some(relay) = self.coupling.relay_ports(name) {
                    if !relay.has_port(port) {
                        return Err(SimulationError::PortNotFound);
                    }
                } else {
                    return Err(SimulationError::ModelNotFound);
                }
                Ok(Endpoint::Entity(name.to_string()))
            }
        }
    }

    /// Injects an external event at the current global time.
    pub fn insert_external_event(
        &mut self,
        port: &str,
        message: Option<Message>,
    ) -> Result<(), SimulationError> {
        let time = self.global_time;
        self.insert_external_event_at(port, message, time)
    }

    /// Injects an external event at an explicit future time.
    pub fn insert_external_event_at(
        &mut self,
        port: &str,
        message: Option<Message>,
        time: f64,
    ) -> Result<(), SimulationError> {
        if !self.input_ports.iter().any(|name| name == port) {
            return Err(SimulationError::PortNotFound);
        }
        if time < self.global_time {
            return Err(SimulationError::CausalityError);
        }
        let message = message.unwrap_or_else(|| Message::new("boundary", port));
        self.pending_events.push(PendingEvent {
            time,
            seq: self.event_seq,
            port: port.to_string(),
            message,
        });
        self.event_seq += 1;
        Ok(())
    }

    /// Halts the clock: no further advance occurs until `simulate` is
    /// called again.  Checked only between discrete steps, never mid-step.
    /// While paused, callers may register additional models and couplings,
    /// or remove and replace them, before resuming.
    pub fn simulation_stop(&mut self) {
        self.running = false;
    }

    /// Executes exactly `n_steps` discrete scheduling steps, unless
    /// `simulation_stop` halts the run between steps.  Resuming after a
    /// pause continues from the paused global time.
    pub fn simulate(&mut self, n_steps: usize) -> Result<(), SimulationError> {
        self.running = true;
        if self.mode == ExecutionType::RealTime {
            self.wall_anchor = Some((Instant::now(), self.global_time));
        }
        for _ in 0..n_steps {
            if !self.running {
                break;
            }
            self.step()?;
        }
        Ok(())
    }

    /// One scheduling step: advance to the minimum event time, collect
    /// outputs of imminent executors and due external events, route every
    /// message through the coupling graph with zero delay, apply the
    /// classified transitions, and commit the schedule metadata.
    ///
    /// The confluent tie-break is fixed and independent of registration
    /// order: an executor that is imminent and also receives a message at
    /// the same instant applies its external transition first (elapsed 0),
    /// then its internal transition.
    fn step(&mut self) -> Result<(), SimulationError> {
        let next_model = self
            .schedule
            .iter()
            .next()
            .map_or(INFINITE, |(time, _)| time.0);
        let next_event = self
            .pending_events
            .iter()
            .map(|event| event.time)
            .fold(INFINITE, f64::min);
        let time = f64::min(next_model, next_event);
        if time.is_infinite() {
            debug!("no scheduled events; the system is quiescent");
            return Ok(());
        }
        if time < self.global_time {
            return Err(SimulationError::CausalityError);
        }
        if self.mode == ExecutionType::RealTime {
            self.pace(time);
        }
        self.global_time = time;

        // Imminent executors, in name order within the shared event time
        let mut imminent: Vec<String> = Vec::new();
        loop {
            let due = match self.schedule.iter().next() {
                Some((scheduled, _)) => scheduled.0 <= time,
                None => false,
            };
            if !due {
                break;
            }
            if let Some((_, name)) = self.schedule.pop_first() {
                imminent.push(name);
            }
        }

        // Output collection and zero-time routing
        let mut deliveries: BTreeMap<String, Vec<(String, Message)>> = BTreeMap::new();
        for name in &imminent {
            let output = {
                let executor = self
                    .executors
                    .get_mut(name)
                    .ok_or(SimulationError::ModelNotFound)?;
                let output = executor.output()?;
                match output {
                    Some(message)
                        if !executor.model().atomic().has_output_port(message.port()) =>
                    {
                        warn!(
                            model = name.as_str(),
                            port = message.port(),
                            "output on an undeclared port was dropped"
                        );
                        None
                    }
                    other => other,
                }
            };
            if let Some(message) = output {
                let source = Endpoint::Entity(name.clone());
                self.route(&source, message.port(), &message, &mut deliveries)?;
            }
        }
        let mut due_events = Vec::new();
        let mut remaining = Vec::new();
        for event in self.pending_events.drain(..) {
            if event.time <= time {
                due_events.push(event);
            } else {
                remaining.push(event);
            }
        }
        self.pending_events = remaining;
        due_events.sort_by_key(|event| event.seq);
        for event in &due_events {
            self.route(&Endpoint::Boundary, &event.port, &event.message, &mut deliveries)?;
        }

        // Classified transitions, in name order
        let imminent_set: BTreeSet<&String> = imminent.iter().collect();
        let involved: BTreeSet<String> = imminent
            .iter()
            .cloned()
            .chain(deliveries.keys().cloned())
            .collect();
        for name in &involved {
            let is_imminent = imminent_set.contains(name);
            let messages = deliveries.remove(name);
            let executor = self
                .executors
                .get_mut(name)
                .ok_or(SimulationError::ModelNotFound)?;
            let previous_next = executor.time_next();
            match (is_imminent, messages) {
                (true, None) => {
                    executor.internal_transition()?;
                }
                (false, Some(messages)) => {
                    // Only the first delivery at an instant carries elapsed
                    // time; the rest happen at zero separation
                    let mut elapsed = time - executor.time_last();
                    for (port, message) in &messages {
                        executor.external_transition(port, message, elapsed)?;
                        elapsed = 0.0;
                    }
                }
                (true, Some(messages)) => {
                    // Confluent: external before internal, elapsed 0
                    for (port, message) in &messages {
                        executor.external_transition(port, message, 0.0)?;
                    }
                    executor.internal_transition()?;
                }
                (false, None) => continue,
            }
            executor.set_req_time(time);
            let next = executor.time_next();
            if !is_imminent {
                self.schedule_remove(name, previous_next);
            }
            self.schedule_insert(name, next);
        }

        // Per-tick hooks run after the instant is fully committed
        for executor in self.executors.values_mut() {
            executor.tick(time);
        }
        Ok(())
    }

    fn route(
        &self,
        source: &Endpoint,
        source_port: &str,
        message: &Message,
        deliveries: &mut BTreeMap<String, Vec<(String, Message)>>,
    ) -> Result<(), SimulationError> {
        let destinations = self.coupling.resolve(source, source_port)?;
        if destinations.is_empty() {
            debug!(
                source = ?source,
                port = source_port,
                "message has no coupled destinations and was dropped"
            );
        }
        for (target, target_port) in destinations {
            if !self.executors.contains_key(&target) {
                warn!(
                    target = target.as_str(),
                    "coupled target is not registered; message dropped"
                );
                continue;
            }
            deliveries
                .entry(target)
                .or_default()
                .push((target_port, message.clone()));
        }
        Ok(())
    }

    fn schedule_insert(&mut self, name: &str, time_next: f64) {
        if time_next.is_finite() {
            self.schedule.insert((OrderedTime(time_next), name.to_string()));
        }
    }

    fn schedule_remove(&mut self, name: &str, time_next: f64) {
        if time_next.is_finite() {
            self.schedule.remove(&(OrderedTime(time_next), name.to_string()));
        }
    }

    /// Paces a real-time run: sleeps until the wall-clock target for the
    /// next event time.  Falling behind the wall clock is a soft condition,
    /// reported but never fatal, with no drift correction.
    fn pace(&mut self, time: f64) {
        if let Some((anchor, anchor_time)) = self.wall_anchor {
            let offset = (time - anchor_time).max(0.0) * self.time_resolution;
            let target = anchor + Duration::from_secs_f64(offset);
            let now = Instant::now();
            if target > now {
                std::thread::sleep(target - now);
            } else if (now - target).as_secs_f64() > self.time_resolution {
                warn!(
                    behind_secs = (now - target).as_secs_f64(),
                    "real-time pacing is behind the wall clock"
                );
            }
        }
    }

    /// This accessor method returns the current state name of a registered
    /// model.
    pub fn cur_state(&self, name: &str) -> Result<String, SimulationError> {
        Ok(self
            .executors
            .get(name)
            .ok_or(SimulationError::ModelNotFound)?
            .cur_state()
            .to_string())
    }

    /// This accessor method returns the (time_last, time_next) scheduling
    /// metadata of a registered model.
    pub fn scheduled_times(&self, name: &str) -> Result<(f64, f64), SimulationError> {
        let executor = self
            .executors
            .get(name)
            .ok_or(SimulationError::ModelNotFound)?;
        Ok((executor.time_last(), executor.time_next()))
    }

    /// Materializes a snapshot of one registered model, on demand.
    pub fn model_snapshot(&self, name: &str) -> Result<ModelSnapshot, SimulationError> {
        ModelSnapshot::take(
            self.executors
                .get(name)
                .ok_or(SimulationError::ModelNotFound)?
                .as_ref(),
        )
    }

    /// The names of all registered models, in deterministic order.
    pub fn model_names(&self) -> Vec<String> {
        self.executors.keys().cloned().collect()
    }

    /// Synchronously serializes the full executor population, coupling
    /// graph, pending external events, and global time into one durable
    /// record at `{path}/{name}.json`.  A serialization or I/O failure is
    /// reported to the caller and leaves the live simulation untouched.
    pub fn snapshot_simulation(&self, name: &str, path: &Path) -> Result<(), SimulationError> {
        let models = self
            .executors
            .values()
            .map(|executor| ModelSnapshot::take(executor.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        let record = SimulationSnapshot {
            version: SNAPSHOT_VERSION,
            name: name.to_string(),
            global_time: self.global_time,
            time_resolution: self.time_resolution,
            input_ports: self.input_ports.clone(),
            relays: self.coupling.relays().clone(),
            couplings: self.coupling.couplings().to_vec(),
            models,
            pending_events: self
                .pending_events
                .iter()
                .map(|event| EventRecord {
                    time: event.time,
                    port: event.port.clone(),
                    message: event.message.clone(),
                })
                .collect(),
        };
        std::fs::create_dir_all(path)?;
        let bytes = serde_json::to_vec_pretty(&record)?;
        std::fs::write(path.join(format!("{name}.json")), bytes)?;
        Ok(())
    }

    /// Reconstructs a scheduler from a snapshot record, using the restorers
    /// registered on the snapshot manager.  Structural edits are permitted
    /// on the result before the clock resumes.
    pub fn restore(
        file: &Path,
        mode: ExecutionType,
        manager: SnapshotManager,
    ) -> Result<Self, SimulationError> {
        let bytes = std::fs::read(file)?;
        let record: SimulationSnapshot = serde_json::from_slice(&bytes)?;
        if record.version != SNAPSHOT_VERSION {
            return Err(SimulationError::UnsupportedSnapshotVersion);
        }
        let behaviors = record
            .models
            .iter()
            .map(|snapshot| Ok((manager.restore_model(snapshot)?, snapshot.time_last)))
            .collect::<Result<Vec<_>, SimulationError>>()?;

        let mut executor = Self::with_snapshot_manager(record.time_resolution, mode, manager);
        executor.global_time = record.global_time;
        executor.input_ports = record.input_ports;
        for (name, ports) in record.relays {
            executor.coupling.add_relay(&name, ports);
        }
        for (behavior, time_last) in behaviors {
            executor.install_entity(behavior, time_last)?;
        }
        for coupling in record.couplings {
            executor.coupling.add(coupling);
        }
        for event in record.pending_events {
            executor.pending_events.push(PendingEvent {
                time: event.time,
                seq: executor.event_seq,
                port: event.port,
                message: event.message,
            });
            executor.event_seq += 1;
        }
        Ok(executor)
    }
}
