//! Response collection for forwarded statements
//!
//! Reply handlers running on connection reader tasks `offer` into a
//! [`ResponseRegistry`]; the dispatching call waits on it with a bound.

pub mod pending;
pub mod registry;

pub use pending::PendingWait;
pub use registry::{CorrelationId, Registration, ResponseRegistry};
