use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::utils::errors::SimulationError;

/// The distinguished "infinite" time advance.  A state with this duration is
/// passive - it never self-triggers an internal transition, and leaves only
/// on an external message.
pub const INFINITE: f64 = f64::INFINITY;

/// `AtomicModel` is the state-machine skeleton shared by every model: a
/// state table mapping state names to time-advance durations, the current
/// state, and the declared input and output ports.  Model implementations
/// embed an `AtomicModel` and drive it from their transition functions.
/// There is exactly one current state at all times.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtomicModel {
    name: String,
    states: BTreeMap<String, f64>,
    cur_state: String,
    ports_in: Vec<String>,
    ports_out: Vec<String>,
}

impl AtomicModel {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            states: BTreeMap::new(),
            cur_state: String::new(),
            ports_in: Vec::new(),
            ports_out: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers a state and its time-advance duration.  Durations must be
    /// non-negative or `INFINITE`; violations surface as registration-time
    /// errors from the scheduler, not at insertion.
    pub fn insert_state(&mut self, name: &str, duration: f64) {
        self.states.insert(name.to_string(), duration);
    }

    /// Sets the initial (current) state by name.
    pub fn init_state(&mut self, name: &str) {
        self.cur_state = name.to_string();
    }

    pub fn insert_input_port(&mut self, name: &str) {
        if !self.ports_in.iter().any(|port| port == name) {
            self.ports_in.push(name.to_string());
        }
    }

    pub fn insert_output_port(&mut self, name: &str) {
        if !self.ports_out.iter().any(|port| port == name) {
            self.ports_out.push(name.to_string());
        }
    }

    pub fn cur_state(&self) -> &str {
        &self.cur_state
    }

    /// Transitions to a registered state.  Transitioning to a state missing
    /// from the state table is an error.
    pub fn set_state(&mut self, name: &str) -> Result<(), SimulationError> {
        if !self.states.contains_key(name) {
            return Err(SimulationError::UnknownState);
        }
        self.cur_state = name.to_string();
        Ok(())
    }

    /// The registered time-advance duration of the current state.
    pub fn time_advance(&self) -> f64 {
        self.states.get(&self.cur_state).copied().unwrap_or(INFINITE)
    }

    pub fn has_input_port(&self, name: &str) -> bool {
        self.ports_in.iter().any(|port| port == name)
    }

    pub fn has_output_port(&self, name: &str) -> bool {
        self.ports_out.iter().any(|port| port == name)
    }

    pub fn input_ports(&self) -> &[String] {
        &self.ports_in
    }

    pub fn output_ports(&self) -> &[String] {
        &self.ports_out
    }

    /// Registration-time configuration validation: a model must have at
    /// least one state, no negative durations, and a current state that
    /// exists in the state table.
    pub(crate) fn validate(&self) -> Result<(), SimulationError> {
        if self.states.is_empty() {
            return Err(SimulationError::EmptyStateTable);
        }
        if self.states.values().any(|duration| !(*duration >= 0.0)) {
            return Err(SimulationError::NegativeTimeAdvance);
        }
        if !self.states.contains_key(&self.cur_state) {
            return Err(SimulationError::UnknownState);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stopwatch() -> AtomicModel {
        let mut model = AtomicModel::new("stopwatch");
        model.insert_state("Idle", INFINITE);
        model.insert_state("Running", 2.5);
        model.init_state("Idle");
        model.insert_input_port("toggle");
        model.insert_output_port("lap");
        model
    }

    #[test]
    fn passive_state_has_infinite_advance() {
        let model = stopwatch();
        assert!(model.time_advance().is_infinite());
    }

    #[test]
    fn set_state_updates_time_advance() -> Result<(), SimulationError> {
        let mut model = stopwatch();
        model.set_state("Running")?;
        assert_eq!(model.time_advance(), 2.5);
        Ok(())
    }

    #[test]
    fn set_state_rejects_unknown_state() {
        let mut model = stopwatch();
        assert!(matches!(
            model.set_state("Sprinting"),
            Err(SimulationError::UnknownState)
        ));
        assert_eq!(model.cur_state(), "Idle");
    }

    #[test]
    fn validate_rejects_empty_state_table() {
        let model = AtomicModel::new("empty");
        assert!(matches!(
            model.validate(),
            Err(SimulationError::EmptyStateTable)
        ));
    }

    #[test]
    fn validate_rejects_negative_durations() {
        let mut model = AtomicModel::new("negative");
        model.insert_state("Backwards", -1.0);
        model.init_state("Backwards");
        assert!(matches!(
            model.validate(),
            Err(SimulationError::NegativeTimeAdvance)
        ));
    }

    #[test]
    fn validate_rejects_missing_initial_state() {
        let mut model = AtomicModel::new("uninitialized");
        model.insert_state("Idle", INFINITE);
        assert!(matches!(
            model.validate(),
            Err(SimulationError::UnknownState)
        ));
    }
}
