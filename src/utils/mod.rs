//! The utilities module provides general capabilities that span the models,
//! executor, simulator, and snapshot modules.  The utilities are centered
//! around error handling and event-time ordering.

pub mod errors;

use std::cmp::Ordering;

/// `OrderedTime` wraps an event time with a total order, so event times can
/// key the scheduler's minimum-time index.  The wrapped value is an absolute
/// simulation time, possibly infinite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderedTime(pub f64);

impl Eq for OrderedTime {}

impl Ord for OrderedTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl PartialOrd for OrderedTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
