use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::DevsModel;
use crate::utils::errors::SimulationError;

/// One end of a coupling relation: the scheduler boundary, or a named
/// entity.  An entity is either a registered executor or a structural relay
/// node (the boundary of a hierarchical container).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Endpoint {
    Boundary,
    Entity(String),
}

/// A directed coupling from a (source, port) emission point to a
/// (target, port) reception point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coupling {
    pub source: Endpoint,
    pub source_port: String,
    pub target: Endpoint,
    pub target_port: String,
}

/// The boundary ports of a structural relay node, kept for pass-through
/// resolution and registration-time validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayPorts {
    pub ports_in: Vec<String>,
    pub ports_out: Vec<String>,
}

impl RelayPorts {
    pub fn has_port(&self, port: &str) -> bool {
        self.ports_in.iter().any(|name| name == port)
            || self.ports_out.iter().any(|name| name == port)
    }
}

/// `CouplingGraph` resolves a (model, port) emission to the set of coupled
/// (model, port) receivers.  Relations are stored flat; hierarchy enters
/// through relay nodes, whose pass-through mappings are walked recursively
/// at dispatch time.
#[derive(Debug, Default)]
pub struct CouplingGraph {
    couplings: Vec<Coupling>,
    relays: BTreeMap<String, RelayPorts>,
}

impl CouplingGraph {
    /// Adds a coupling relation.  Adding a relation that already exists is
    /// idempotent.  Endpoint validation is the scheduler's concern, since
    /// only it knows the registered executors.
    pub fn add(&mut self, coupling: Coupling) {
        if !self.couplings.contains(&coupling) {
            self.couplings.push(coupling);
        }
    }

    pub fn add_relay(&mut self, name: &str, ports: RelayPorts) {
        self.relays.insert(name.to_string(), ports);
    }

    pub fn is_relay(&self, name: &str) -> bool {
        self.relays.contains_key(name)
    }

    pub fn relay_ports(&self, name: &str) -> Option<&RelayPorts> {
        self.relays.get(name)
    }

    pub fn couplings(&self) -> &[Coupling] {
        &self.couplings
    }

    pub fn relays(&self) -> &BTreeMap<String, RelayPorts> {
        &self.relays
    }

    /// Drops every relation touching the named entity, and its relay entry
    /// if it has one.
    pub fn remove_entity(&mut self, name: &str) {
        let entity = Endpoint::Entity(name.to_string());
        self.couplings
            .retain(|coupling| coupling.source != entity && coupling.target != entity);
        self.relays.remove(name);
    }

    fn direct_targets(&self, source: &Endpoint, port: &str) -> Vec<(Endpoint, String)> {
        self.couplings
            .iter()
            .filter_map(|coupling| {
                if &coupling.source == source && coupling.source_port == port {
                    Some((coupling.target.clone(), coupling.target_port.clone()))
                } else {
                    None
                }
            })
            .collect()
    }

    /// Resolves one emission into the ordered set of destination
    /// (model, port) pairs, flattening relay nodes recursively.  A relay
    /// chain that feeds back into itself within one resolution would never
    /// terminate, so it is reported as a coupling cycle.
    pub fn resolve(
        &self,
        source: &Endpoint,
        port: &str,
    ) -> Result<Vec<(String, String)>, SimulationError> {
        let mut destinations = Vec::new();
        let mut path = BTreeSet::new();
        self.resolve_into(source, port, &mut path, &mut destinations)?;
        Ok(destinations)
    }

    fn resolve_into(
        &self,
        source: &Endpoint,
        port: &str,
        path: &mut BTreeSet<(Endpoint, String)>,
        destinations: &mut Vec<(String, String)>,
    ) -> Result<(), SimulationError> {
        let key = (source.clone(), port.to_string());
        if !path.insert(key.clone()) {
            return Err(SimulationError::CouplingCycle);
        }
        for (target, target_port) in self.direct_targets(source, port) {
            match &target {
                Endpoint::Boundary => {
                    debug!(port = %target_port, "message reached an unbound boundary port and was dropped");
                }
                Endpoint::Entity(name) if self.relays.contains_key(name) => {
                    self.resolve_into(&target, &target_port, path, destinations)?;
                }
                Endpoint::Entity(name) => {
                    destinations.push((name.clone(), target_port));
                }
            }
        }
        path.remove(&key);
        Ok(())
    }
}

/// External input coupling of a structural model: boundary input port to a
/// child input port.
#[derive(Debug, Clone)]
pub struct ExternalInputCoupling {
    pub source_port: String,
    pub target_id: String,
    pub target_port: String,
}

/// External output coupling of a structural model: child output port to a
/// boundary output port.
#[derive(Debug, Clone)]
pub struct ExternalOutputCoupling {
    pub source_id: String,
    pub source_port: String,
    pub target_port: String,
}

/// Internal coupling of a structural model: child output to child input.
#[derive(Debug, Clone)]
pub struct InternalCoupling {
    pub source_id: String,
    pub source_port: String,
    pub target_id: String,
    pub target_port: String,
}

/// `StructuralModel` is a hierarchical container: child models, couplings
/// among them, and pass-through mappings between its own boundary ports and
/// child ports.  Registering a structural model registers its children as
/// executors and its name as a relay node, so outer couplings can target
/// the container boundary.
pub struct StructuralModel {
    name: String,
    ports_in: Vec<String>,
    ports_out: Vec<String>,
    components: Vec<Box<dyn DevsModel>>,
    external_input_couplings: Vec<ExternalInputCoupling>,
    external_output_couplings: Vec<ExternalOutputCoupling>,
    internal_couplings: Vec<InternalCoupling>,
}

impl StructuralModel {
    pub fn new(name: &str, ports_in: Vec<String>, ports_out: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            ports_in,
            ports_out,
            components: Vec::new(),
            external_input_couplings: Vec::new(),
            external_output_couplings: Vec::new(),
            internal_couplings: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_component(&mut self, component: Box<dyn DevsModel>) {
        self.components.push(component);
    }

    pub fn couple_input(&mut self, source_port: &str, target_id: &str, target_port: &str) {
        self.external_input_couplings.push(ExternalInputCoupling {
            source_port: source_port.to_string(),
            target_id: target_id.to_string(),
            target_port: target_port.to_string(),
        });
    }

    pub fn couple_output(&mut self, source_id: &str, source_port: &str, target_port: &str) {
        self.external_output_couplings.push(ExternalOutputCoupling {
            source_id: source_id.to_string(),
            source_port: source_port.to_string(),
            target_port: target_port.to_string(),
        });
    }

    pub fn couple_internal(
        &mut self,
        source_id: &str,
        source_port: &str,
        target_id: &str,
        target_port: &str,
    ) {
        self.internal_couplings.push(InternalCoupling {
            source_id: source_id.to_string(),
            source_port: source_port.to_string(),
            target_id: target_id.to_string(),
            target_port: target_port.to_string(),
        });
    }

    #[allow(clippy::type_complexity)]
    pub(crate) fn into_parts(
        self,
    ) -> (
        String,
        RelayPorts,
        Vec<Box<dyn DevsModel>>,
        Vec<ExternalInputCoupling>,
        Vec<ExternalOutputCoupling>,
        Vec<InternalCoupling>,
    ) {
        (
            self.name,
            RelayPorts {
                ports_in: self.ports_in,
                ports_out: self.ports_out,
            },
            self.components,
            self.external_input_couplings,
            self.external_output_couplings,
            self.internal_couplings,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(name: &str) -> Endpoint {
        Endpoint::Entity(name.to_string())
    }

    fn couple(source: Endpoint, source_port: &str, target: Endpoint, target_port: &str) -> Coupling {
        Coupling {
            source,
            source_port: source_port.to_string(),
            target,
            target_port: target_port.to_string(),
        }
    }

    #[test]
    fn resolves_fan_out_to_all_destinations() -> Result<(), SimulationError> {
        let mut graph = CouplingGraph::default();
        graph.add(couple(entity("gen"), "job", entity("a"), "in"));
        graph.add(couple(entity("gen"), "job", entity("b"), "in"));
        graph.add(couple(entity("gen"), "job", entity("c"), "in"));
        // Idempotent re-add of an existing relation
        graph.add(couple(entity("gen"), "job", entity("a"), "in"));

        let destinations = graph.resolve(&entity("gen"), "job")?;
        assert_eq!(destinations.len(), 3);
        assert!(destinations.contains(&("a".to_string(), "in".to_string())));
        Ok(())
    }

    #[test]
    fn resolves_transitively_through_relays() -> Result<(), SimulationError> {
        let mut graph = CouplingGraph::default();
        graph.add_relay(
            "cluster",
            RelayPorts {
                ports_in: vec!["work".to_string()],
                ports_out: vec![],
            },
        );
        graph.add(couple(entity("gen"), "job", entity("cluster"), "work"));
        graph.add(couple(entity("cluster"), "work", entity("inner"), "in"));

        let destinations = graph.resolve(&entity("gen"), "job")?;
        assert_eq!(destinations, vec![("inner".to_string(), "in".to_string())]);
        Ok(())
    }

    #[test]
    fn diamond_pass_through_is_not_a_cycle() -> Result<(), SimulationError> {
        let mut graph = CouplingGraph::default();
        for relay in ["left", "right", "join"] {
            graph.add_relay(
                relay,
                RelayPorts {
                    ports_in: vec!["p".to_string()],
                    ports_out: vec![],
                },
            );
        }
        graph.add(couple(entity("gen"), "job", entity("left"), "p"));
        graph.add(couple(entity("gen"), "job", entity("right"), "p"));
        graph.add(couple(entity("left"), "p", entity("join"), "p"));
        graph.add(couple(entity("right"), "p", entity("join"), "p"));
        graph.add(couple(entity("join"), "p", entity("sink"), "in"));

        let destinations = graph.resolve(&entity("gen"), "job")?;
        assert_eq!(destinations.len(), 2);
        Ok(())
    }

    #[test]
    fn self_feeding_relay_cycle_is_detected() {
        let mut graph = CouplingGraph::default();
        graph.add_relay(
            "loop",
            RelayPorts {
                ports_in: vec!["p".to_string()],
                ports_out: vec![],
            },
        );
        graph.add(couple(entity("gen"), "job", entity("loop"), "p"));
        graph.add(couple(entity("loop"), "p", entity("loop"), "p"));

        assert!(matches!(
            graph.resolve(&entity("gen"), "job"),
            Err(SimulationError::CouplingCycle)
        ));
    }

    #[test]
    fn remove_entity_drops_its_relations() -> Result<(), SimulationError> {
        let mut graph = CouplingGraph::default();
        graph.add(couple(entity("gen"), "job", entity("queue"), "job_in"));
        graph.add(couple(entity("queue"), "worker0", entity("w0"), "in"));
        graph.remove_entity("queue");
        assert!(graph.resolve(&entity("gen"), "job")?.is_empty());
        assert!(graph.couplings().is_empty());
        Ok(())
    }
}
