//! Health probes.
//!
//! `/health` and `/health/ready` run every check and answer 503 when any of
//! them is unhealthy; `/health/live` only proves the process is serving.

use crate::db::Database;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const DATABASE_CHECK_DEADLINE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct Check {
    pub status: HealthStatus,
    pub message: String,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub timestamp: String,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub checks: BTreeMap<&'static str, Check>,
}

#[derive(Clone)]
pub struct HealthChecker {
    db: Database,
    started: Instant,
    db_deadline: Duration,
}

impl HealthChecker {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            started: Instant::now(),
            db_deadline: DATABASE_CHECK_DEADLINE,
        }
    }

    async fn check_database(&self) -> Check {
        let start = Instant::now();
        let (status, message, error) =
            match tokio::time::timeout(self.db_deadline, self.db.ping()).await {
                Ok(Ok(())) => (HealthStatus::Healthy, "Database connection is healthy", None),
                Ok(Err(e)) => (
                    HealthStatus::Unhealthy,
                    "Database ping failed",
                    Some(format!("{e:#}")),
                ),
                Err(_) => (
                    HealthStatus::Unhealthy,
                    "Database ping timed out",
                    Some(format!("no answer within {:?}", self.db_deadline)),
                ),
            };
        Check {
            status,
            message: message.to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
            error,
        }
    }

    fn check_application(&self) -> Check {
        Check {
            status: HealthStatus::Healthy,
            message: "Application is running normally".to_string(),
            duration_ms: 0,
            error: None,
        }
    }

    /// Overall status is the worst individual status.
    pub async fn report(&self) -> HealthReport {
        let mut checks = BTreeMap::new();
        checks.insert("database", self.check_database().await);
        checks.insert("application", self.check_application());

        let status = checks
            .values()
            .map(|c| c.status)
            .max()
            .unwrap_or(HealthStatus::Healthy);

        HealthReport {
            status,
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION"),
            uptime_secs: self.started.elapsed().as_secs(),
            checks,
        }
    }
}

async fn health(State(checker): State<Arc<HealthChecker>>) -> impl IntoResponse {
    let report = checker.report().await;
    let code = if report.status == HealthStatus::Unhealthy {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (code, Json(report))
}

async fn live() -> impl IntoResponse {
    Json(json!({
        "status": "alive",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

pub fn router(checker: HealthChecker) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(health))
        .route("/health/live", get(live))
        .with_state(Arc::new(checker))
}
