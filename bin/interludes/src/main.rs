//! # Interludes Binary
//!
//! The entry point that assembles the application from its configuration and
//! the compiled-in plugins.

use actix_web::{web, App, HttpServer};
use il_api::configure_routes;
use il_api::handlers::AppState;
use il_api::middleware::{cors_policy, security_headers, standard_middleware};
use il_config::AppConfig;
use tracing_subscriber::EnvFilter;

#[cfg(not(all(feature = "db-sqlite", feature = "auth-cas")))]
compile_error!("interludes needs a store (`db-sqlite`) and an identity plugin (`auth-cas`)");

#[cfg(feature = "db-sqlite")]
use il_db_sqlite::SqlitePlanningRepo;

#[cfg(feature = "auth-cas")]
use il_auth_cas::{Argon2AdminAuth, CasClient};

/// `RUST_LOG` wins over the configured filter when set.
fn init_tracing(config: &AppConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.log_filter))?;
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = if config.log_json {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    };
    installed.map_err(|err| anyhow::anyhow!(err))
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    init_tracing(&config)?;

    // 1. Initialize the store; it serves both planning and accounts
    let repo = SqlitePlanningRepo::new(&config.database_url).await?;

    // 2. Initialize identity plugins
    let cas = CasClient::new(&config.cas_server_url)?;
    let cas_service_url = config.cas_service_url();
    let cas_login_url = cas.login_url(&cas_service_url)?.to_string();

    if config.admin_password_hash.is_none() {
        tracing::warn!("no admin_password_hash configured, /admin stays locked");
    }

    // 3. Wrap in AppState (dynamic dispatch keeps handlers plugin-agnostic)
    let state = web::Data::new(AppState {
        planning: Box::new(repo.clone()),
        accounts: Box::new(repo),
        cas: Box::new(cas),
        auth: Box::new(Argon2AdminAuth),
        admin_user: config.admin_user.clone(),
        admin_password_hash: config.admin_password_hash.clone(),
        season: config.season,
        cas_service_url,
        cas_login_url,
    });

    tracing::info!(bind_addr = %config.bind_addr, "interludes starting");

    HttpServer::new(move || {
        App::new()
            .wrap(cors_policy())
            .wrap(security_headers())
            .wrap(standard_middleware())
            .app_data(state.clone())
            .configure(configure_routes)
    })
    .bind(config.bind_addr.as_str())?
    .run()
    .await?;

    Ok(())
}
