//! interludes/crates/il-core/src/lib.rs
//!
//! The central domain logic and interface definitions for the Interludes
//! registration site: planning conflict detection, allocation checks and the
//! admin report.

pub mod cas;
pub mod conflicts;
pub mod error;
pub mod models;
pub mod report;
pub mod season;
pub mod traits;
pub mod validation;

// Re-exporting for easier access in other crates
pub use error::*;
pub use models::*;
pub use traits::*;
