//! Runtime configuration: command-line flags with environment fallbacks.

use crate::auth::models::{InvalidName, Permission, Role};
use crate::middleware::rate_limit::RateLimitConfig;
use clap::Parser;
use std::str::FromStr;
use std::time::Duration;

pub const DEV_JWT_SECRET: &str = "postbox-dev-secret-change-me";

#[derive(Parser, Debug, Clone)]
#[command(name = "postbox")]
#[command(about = "Postbox API - users, posts, comments and datastore records behind a request guard")]
pub struct AppConfig {
    /// Listen address
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:3000")]
    pub bind: String,

    /// SQLite database file
    #[arg(long, env = "DATABASE_PATH", default_value = "postbox.db")]
    pub database_path: String,

    /// HMAC secret for bearer tokens
    #[arg(long, env = "JWT_SECRET", default_value = DEV_JWT_SECRET, hide_env_values = true)]
    pub jwt_secret: String,

    #[arg(long, env = "TOKEN_TTL_HOURS", default_value = "24")]
    pub token_ttl_hours: i64,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "pretty")]
    pub log_format: LogFormat,

    #[arg(long, env = "RATE_LIMIT_GENERAL", default_value = "100")]
    pub general_limit: u32,

    #[arg(long, env = "RATE_LIMIT_AUTH", default_value = "5")]
    pub auth_limit: u32,

    #[arg(long, env = "RATE_LIMIT_STRICT", default_value = "10")]
    pub strict_limit: u32,

    #[arg(long, env = "RATE_LIMIT_WINDOW_SECS", default_value = "60")]
    pub rate_window_secs: u64,

    /// Defaults to the window length
    #[arg(long, env = "RATE_LIMIT_SWEEP_SECS")]
    pub sweep_interval_secs: Option<u64>,

    /// Budget for authorization lookups inside the guard
    #[arg(long, env = "GUARD_DEADLINE_MS", default_value = "5000")]
    pub guard_deadline_ms: u64,

    /// Email of an existing user to promote to admin at startup
    #[arg(long, env = "BOOTSTRAP_ADMIN_EMAIL")]
    pub bootstrap_admin: Option<String>,

    /// Additional role grants, `name=perm1,perm2`; repeatable
    #[arg(long = "extra-role", value_parser = parse_role_grant)]
    pub extra_roles: Vec<RoleGrant>,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// A role plus the permissions it should carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGrant {
    pub role: Role,
    pub permissions: Vec<Permission>,
}

impl FromStr for RoleGrant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, perms) = s
            .split_once('=')
            .ok_or_else(|| format!("expected name=perm1,perm2, got '{s}'"))?;
        let role: Role = name.trim().parse().map_err(|e: InvalidName| e.to_string())?;
        let permissions = perms
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| p.parse::<Permission>().map_err(|e| e.to_string()))
            .collect::<Result<Vec<_>, _>>()?;
        if permissions.is_empty() {
            return Err(format!("role '{role}' lists no permissions"));
        }
        Ok(RoleGrant { role, permissions })
    }
}

fn parse_role_grant(s: &str) -> Result<RoleGrant, String> {
    s.parse()
}

impl AppConfig {
    pub fn uses_dev_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }

    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.token_ttl_hours.max(1))
    }

    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_window_secs.max(1))
    }

    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval_secs
            .map(|s| Duration::from_secs(s.max(1)))
            .unwrap_or_else(|| self.rate_window())
    }

    pub fn guard_deadline(&self) -> Duration {
        Duration::from_millis(self.guard_deadline_ms.max(1))
    }

    pub fn general_limits(&self) -> RateLimitConfig {
        self.limit(self.general_limit)
    }

    pub fn auth_limits(&self) -> RateLimitConfig {
        self.limit(self.auth_limit)
    }

    pub fn strict_limits(&self) -> RateLimitConfig {
        self.limit(self.strict_limit)
    }

    fn limit(&self, max_requests: u32) -> RateLimitConfig {
        RateLimitConfig {
            max_requests,
            window: self.rate_window(),
        }
    }
}
