//! interludes/crates/il-api/src/middleware.rs Middleware
//!
//! Request logging, CORS and default security headers.

use actix_cors::Cors;
use actix_web::middleware::{DefaultHeaders, Logger};

// The 'default' logger outputs:
// remote-ip "request-line" status-code response-size "referrer" "user-agent"
pub fn standard_middleware() -> Logger {
    Logger::default()
}

// Read-only API: the JSON report may be fetched from another origin.
pub fn cors_policy() -> Cors {
    Cors::default()
        .allow_any_origin()
        .allowed_methods(vec!["GET"])
        .max_age(3600)
}

pub fn security_headers() -> DefaultHeaders {
    DefaultHeaders::new()
        .add(("X-Content-Type-Options", "nosniff"))
        .add(("Referrer-Policy", "strict-origin-when-cross-origin"))
        .add(("X-Frame-Options", "DENY"))
}
