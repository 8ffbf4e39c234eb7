//! The inventory write path: per-key serialization, the shared command
//! protocol for adjust/reserve, and startup crash recovery.

pub mod commands;
pub mod recovery;
pub mod serializer;

pub use commands::CommandEngine;
pub use recovery::{RecoveryReport, recover};
pub use serializer::KeyedSerializer;
