//! The models module provides the atomic-model contract required of any
//! model operating within the discrete event simulation, the message
//! envelope exchanged between models, and a set of prebuilt atomic models
//! for easy reuse in simulation products and projects.

use serde::{Deserialize, Serialize};

pub mod atomic;
pub mod collector;
pub mod generator;
pub mod model_trait;
pub mod processor;
pub mod queue;

pub use self::atomic::{AtomicModel, INFINITE};
pub use self::collector::Collector;
pub use self::generator::Generator;
pub use self::model_trait::{DevsModel, SerializableState};
pub use self::processor::Processor;
pub use self::queue::BoundedQueue;

/// Messages are the mechanism of information exchange for models in a
/// simulation.  A message carries its origin information (source model name
/// and source model port) and an ordered sequence of payload items.  A
/// message is immutable once emitted - the scheduler only ever hands out
/// shared references during routing and delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    source: String,
    port: String,
    payload: Vec<serde_json::Value>,
}

impl Message {
    /// This constructor method builds a `Message` with an empty payload.
    pub fn new(source: &str, port: &str) -> Self {
        Self {
            source: source.to_string(),
            port: port.to_string(),
            payload: Vec::new(),
        }
    }

    /// This constructor method builds a `Message` with the given payload.
    pub fn with_payload(source: &str, port: &str, payload: Vec<serde_json::Value>) -> Self {
        Self {
            source: source.to_string(),
            port: port.to_string(),
            payload,
        }
    }

    /// Appends one payload item, preserving insertion order.
    pub fn insert(&mut self, item: serde_json::Value) {
        self.payload.push(item);
    }

    /// This accessor method returns the model name of the message source.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// This accessor method returns the port the message was emitted on.
    pub fn port(&self) -> &str {
        &self.port
    }

    /// This accessor method returns the ordered payload items.
    pub fn retrieve(&self) -> &[serde_json::Value] {
        &self.payload
    }
}
