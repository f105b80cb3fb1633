//! # il-api
//!
//! The web routing and orchestration layer for Interludes.

pub mod error;
pub mod handlers;
pub mod middleware;

use actix_web::web;

/// Configures the routes of the site.
///
/// # Developer Note
/// The binary mounts these at the root; tests mount them on a bare `App`.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(handlers::index))
        .service(
            web::scope("/admin")
                .route("/", web::get().to(handlers::admin_report))
                .route("/report.json", web::get().to(handlers::admin_report_json)),
        )
        .route("/accounts/cas/login", web::get().to(handlers::cas_login));
}
