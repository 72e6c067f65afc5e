//! # Overview
//! Devsim provides a discrete event simulation kernel, built on the
//! Discrete Event System Specification (DEVS) formalism.
//!
//! This repository contains:
//!
//! * An atomic-model contract, for expressing models as state machines
//! with explicit time-advance, transition, and output functions.
//! * A coupling graph, for hierarchically composing models through port
//! couplings, with zero-time message routing within a scheduling instant.
//! * A global scheduler, for event advance with deterministic
//! confluent-event tie-breaking, in virtual-time or real-time pacing.
//! * A snapshot subsystem, for pausing a live run, serializing full
//! executor state, mutating structure, and resuming deterministically.
//!
//! The kernel is logically single-threaded and deterministic; all model
//! interaction is scheduler-mediated message routing.
pub mod executor;
pub mod models;
pub mod simulator;
pub mod snapshot;
pub mod utils;
