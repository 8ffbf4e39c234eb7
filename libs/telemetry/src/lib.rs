//! Lightweight facade around tracing setup and service counters.
//!
//! Counters are recorded twice: once through the `metrics` facade for
//! whatever exporter the host process installs, and once into an in-process
//! atomic registry that the gateway serves from its metrics endpoint.

pub mod counters;
mod logging;

pub use counters::{StatsSnapshot, record_counter, snapshot};
pub use logging::init_logging;
