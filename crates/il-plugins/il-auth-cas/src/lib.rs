//! # il-auth-cas
//!
//! Identity plugins: CAS v3 ticket validation (`CasVerifier`) and Argon2
//! admin password checks (`AdminAuth`).

mod admin;
mod client;

pub use admin::Argon2AdminAuth;
pub use client::{parse_service_response, CasClient};
