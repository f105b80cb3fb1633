//! # il-api Handlers
//!
//! This module coordinates the flow between HTTP requests and Core traits.

use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use askama::Template;
use base64::Engine;
use chrono::Utc;
use il_core::cas::authenticate_cas;
use il_core::error::AppError;
use il_core::report::{load_admin_report, AdminReport};
use il_core::season::current_season;
use il_core::traits::{AccountRepo, AdminAuth, CasVerifier, PlanningRepo};
use il_ui::AdminTemplate;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::ApiError;

/// State shared across all Actix-web workers.
pub struct AppState {
    pub planning: Box<dyn PlanningRepo>,
    pub accounts: Box<dyn AccountRepo>,
    pub cas: Box<dyn CasVerifier>,
    pub auth: Box<dyn AdminAuth>,
    /// Basic-auth user name accepted on `/admin`.
    pub admin_user: String,
    /// Argon2 hash guarding `/admin`; unset keeps the admin pages closed.
    pub admin_password_hash: Option<SecretString>,
    /// Season override; the clock decides when unset.
    pub season: Option<i32>,
    /// This site's CAS callback, sent along with every ticket.
    pub cas_service_url: String,
    /// Where to send browsers arriving without a ticket.
    pub cas_login_url: String,
}

impl AppState {
    fn season(&self) -> i32 {
        current_season(self.season, Utc::now())
    }
}

/// Simple homepage handler for "/"
pub async fn index(data: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().body(format!("Bienvenue sur le site des Interludes {} !", data.season()))
}

/// Extracts `(user, password)` from an `Authorization: Basic` header.
fn basic_credentials(req: &HttpRequest) -> Option<(String, String)> {
    let value = req.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = base64::engine::general_purpose::STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

async fn require_admin(data: &AppState, req: &HttpRequest) -> Result<(), ApiError> {
    let Some(hash) = data.admin_password_hash.as_ref() else {
        return Err(AppError::Unauthorized("admin access is not configured".into()).into());
    };
    let Some((user, password)) = basic_credentials(req) else {
        return Err(AppError::Unauthorized("missing credentials".into()).into());
    };
    // Verified even when the user name is wrong.
    let password_ok = data.auth.verify_admin_password(&password, hash.expose_secret()).await;
    if !password_ok || user != data.admin_user {
        tracing::warn!(user = %user, "admin login refused");
        return Err(AppError::Unauthorized("invalid credentials".into()).into());
    }
    Ok(())
}

async fn admin_report_for(data: &AppState, req: &HttpRequest) -> Result<AdminReport, ApiError> {
    require_admin(data, req).await?;
    Ok(load_admin_report(data.planning.as_ref(), data.season()).await?)
}

/// Renders the admin dashboard (`/admin/`)
pub async fn admin_report(data: web::Data<AppState>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let report = admin_report_for(&data, &req).await?;
    let html = AdminTemplate {
        report: &report,
        title: &format!("Interludes {} - administration", report.season),
    }
    .render()?;

    Ok(HttpResponse::Ok().content_type("text/html; charset=utf-8").body(html))
}

/// Same report as `/admin/`, as JSON.
pub async fn admin_report_json(data: web::Data<AppState>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let report = admin_report_for(&data, &req).await?;
    Ok(HttpResponse::Ok().json(report))
}

#[derive(Debug, Deserialize)]
pub struct CasCallback {
    pub ticket: Option<String>,
}

/// CAS callback. Without a ticket the browser is sent to the CAS login page;
/// with one, the ticket is validated and the account resolved.
pub async fn cas_login(data: web::Data<AppState>, query: web::Query<CasCallback>) -> Result<HttpResponse, ApiError> {
    let Some(ticket) = query.into_inner().ticket else {
        return Ok(HttpResponse::Found()
            .insert_header((header::LOCATION, data.cas_login_url.as_str()))
            .finish());
    };

    let identity = data
        .cas
        .verify_ticket(&ticket, &data.cas_service_url)
        .await?
        .ok_or_else(|| ApiError::Forbidden("CAS authentication failed".into()))?;

    match authenticate_cas(data.accounts.as_ref(), &identity, Utc::now()).await? {
        Ok(user) => Ok(HttpResponse::Ok().json(user)),
        Err(reason) => Err(ApiError::Forbidden(reason)),
    }
}
