//! Postbox API server
//! Users, posts, comments and datastore records behind the request guard.

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use postbox_backend::{
    auth::{
        AuthService, AuthorizationStore, JwtHandler, PasswordHasher, Role,
        SqliteAuthorizationStore, UserStore,
    },
    clock::SystemClock,
    config::{AppConfig, LogFormat},
    db::Database,
    health::HealthChecker,
    middleware::GuardContext,
    state::{build_router, AppState, Limiters},
};

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    let config = AppConfig::parse();
    init_tracing(config.log_format);

    info!("Postbox API starting");
    if config.uses_dev_secret() {
        warn!("JWT_SECRET not set, using the development secret. Do not run this in production");
    }

    let db = Database::open(&config.database_path)
        .with_context(|| format!("open database at {}", config.database_path))?;
    info!(path = %config.database_path, "Database opened");

    let authz: Arc<dyn AuthorizationStore> = Arc::new(SqliteAuthorizationStore::new(db.clone()));
    authz
        .initialize_defaults()
        .await
        .context("install default role permissions")?;

    for grant in &config.extra_roles {
        for permission in &grant.permissions {
            authz
                .grant_permission(&grant.role, permission)
                .await
                .with_context(|| format!("grant {permission} to {}", grant.role))?;
        }
        info!(role = %grant.role, permissions = grant.permissions.len(), "Extra role configured");
    }

    let users = UserStore::new(db.clone());
    if let Some(email) = &config.bootstrap_admin {
        match users.find_by_contact(email).await? {
            Some(principal) if principal.is_active => {
                authz.assign_role(principal.id, &Role::ADMIN).await?;
                info!(user_id = principal.id, "Bootstrap admin promoted");
            }
            _ => warn!(email = %email, "Bootstrap admin not found or inactive, skipping"),
        }
    }

    let jwt = Arc::new(JwtHandler::with_clock(
        &config.jwt_secret,
        config.token_ttl(),
        Arc::new(SystemClock),
    ));
    let auth = AuthService::new(users, Arc::clone(&authz), Arc::clone(&jwt), PasswordHasher::default());
    let state = AppState::new(db.clone(), auth);

    let guards = GuardContext {
        jwt,
        authz,
        deadline: config.guard_deadline(),
    };

    let limiters = Limiters::new(
        config.general_limits(),
        config.auth_limits(),
        config.strict_limits(),
    );
    let sweep_every = config.sweep_interval();
    for limiter in limiters.all() {
        limiter.spawn_sweeper(sweep_every);
    }
    info!(
        general = config.general_limit,
        auth = config.auth_limit,
        strict = config.strict_limit,
        window_secs = config.rate_window().as_secs(),
        "Rate limiters ready"
    );

    let app = build_router(state, &guards, &limiters, HealthChecker::new(db));

    let listener = TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("bind {}", config.bind))?;
    info!("API server listening on {}", config.bind);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    info!("Postbox API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "postbox_backend=debug,postbox=debug,tower_http=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

fn load_env() {
    // Standard dotenv search (cwd + parents), then the crate root.
    let _ = dotenv();

    let manifest_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    if manifest_env.exists() {
        let _ = dotenv::from_path(&manifest_env);
    }
}
