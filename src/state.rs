//! Application state
//!
//! Holds configuration and the shared allocation engine

use crate::allocation::AllocationEngine;
use crate::capacity::Limits;
use crate::error::{Error, Result};
use crate::session_driver::DriverSettings;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Geo-target tokens understood by the remote campaign wizard
const TARGET_LOCATIONS: &[(&str, &str)] = &[
    (
        "US",
        "COUNTRY|2840|United States|US|Country|State|false|true|45493238|-104785149",
    ),
    (
        "CA",
        "COUNTRY|2124|Canada|CA|Country|Territory|false|true|61313568|-94184135",
    ),
];

/// Remote token for a location key (`US`, `CA`)
pub fn target_token(key: &str) -> Option<&'static str> {
    TARGET_LOCATIONS
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, token)| *token)
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Database URL
    pub database_url: String,
    /// Server port
    pub port: u16,
    /// Server host
    pub host: String,
    /// Origin of the remote management UI
    pub remote_base_url: String,
    /// Sign-in form target
    pub remote_login_url: String,
    pub max_campaigns_per_account: usize,
    pub max_adgroups_per_campaign: usize,
    pub max_keywords_per_adgroup: usize,
    /// Randomized delay bounds between remote requests (ms)
    pub pacing_min_ms: u64,
    pub pacing_max_ms: u64,
    pub pacing_enabled: bool,
    /// Daily budget for new campaigns
    pub campaign_budget: Decimal,
    /// Geo-target key, see [`target_token`]
    pub target_location: String,
    /// Per-request timeout for remote calls
    pub http_timeout_sec: u64,
    /// Create the schema at start-up
    pub install_schema: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        let limits = Limits::default();
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "mysql://root@localhost:3306/adwords".to_string()),
            port: env_or("PORT", 8080),
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            remote_base_url: std::env::var("REMOTE_BASE_URL")
                .unwrap_or_else(|_| "https://adwords.google.com".to_string()),
            remote_login_url: std::env::var("REMOTE_LOGIN_URL").unwrap_or_else(|_| {
                "https://www.google.com/accounts/ServiceLoginAuth?service=adwords".to_string()
            }),
            max_campaigns_per_account: env_or(
                "MAX_CAMPAIGNS_PER_ACCOUNT",
                limits.max_campaigns_per_account,
            ),
            max_adgroups_per_campaign: env_or(
                "MAX_ADGROUPS_PER_CAMPAIGN",
                limits.max_adgroups_per_campaign,
            ),
            max_keywords_per_adgroup: env_or(
                "MAX_KEYWORDS_PER_ADGROUP",
                limits.max_keywords_per_adgroup,
            ),
            pacing_min_ms: env_or("PACING_MIN_MS", 2000),
            pacing_max_ms: env_or("PACING_MAX_MS", 4000),
            pacing_enabled: env_or("PACING_ENABLED", true),
            campaign_budget: env_or("CAMPAIGN_BUDGET", Decimal::new(100000, 2)),
            target_location: std::env::var("TARGET_LOCATION")
                .unwrap_or_else(|_| "US".to_string()),
            http_timeout_sec: env_or("HTTP_TIMEOUT_SEC", 30),
            install_schema: env_or("INSTALL_SCHEMA", false),
        }
    }
}

impl AppConfig {
    /// Quotas for the capacity model
    pub fn limits(&self) -> Result<Limits> {
        if self.max_campaigns_per_account == 0
            || self.max_adgroups_per_campaign == 0
            || self.max_keywords_per_adgroup == 0
        {
            return Err(Error::Config("quota limits must be positive".to_string()));
        }
        Ok(Limits {
            max_campaigns_per_account: self.max_campaigns_per_account,
            max_adgroups_per_campaign: self.max_adgroups_per_campaign,
            max_keywords_per_adgroup: self.max_keywords_per_adgroup,
        })
    }

    /// Remote endpoints and campaign defaults for new sessions
    pub fn driver_settings(&self) -> Result<DriverSettings> {
        let token = target_token(&self.target_location).ok_or_else(|| {
            Error::Config(format!("unknown target location: {}", self.target_location))
        })?;
        if self.campaign_budget <= Decimal::ZERO {
            return Err(Error::Config("campaign budget must be positive".to_string()));
        }
        Ok(DriverSettings {
            base_url: self.remote_base_url.trim_end_matches('/').to_string(),
            login_url: self.remote_login_url.clone(),
            campaign_budget: self.campaign_budget,
            target_location: token.to_string(),
        })
    }

    /// Pacing bounds, `None` when pacing is disabled
    pub fn pacing_bounds(&self) -> Option<(Duration, Duration)> {
        if !self.pacing_enabled {
            return None;
        }
        let min = self.pacing_min_ms.min(self.pacing_max_ms);
        let max = self.pacing_min_ms.max(self.pacing_max_ms);
        Some((Duration::from_millis(min), Duration::from_millis(max)))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_sec)
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    /// Single writer; every mutating request holds this lock
    pub engine: Arc<Mutex<AllocationEngine>>,
}

impl AppState {
    pub fn new(config: AppConfig, engine: AllocationEngine) -> Self {
        Self {
            config,
            engine: Arc::new(Mutex::new(engine)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn config() -> AppConfig {
        AppConfig {
            database_url: "mysql://localhost/test".to_string(),
            port: 8080,
            host: "127.0.0.1".to_string(),
            remote_base_url: "https://remote.example/".to_string(),
            remote_login_url: "https://login.example/ServiceLoginAuth".to_string(),
            max_campaigns_per_account: 25,
            max_adgroups_per_campaign: 100,
            max_keywords_per_adgroup: 1000,
            pacing_min_ms: 4000,
            pacing_max_ms: 2000,
            pacing_enabled: true,
            campaign_budget: dec!(1000.00),
            target_location: "ca".to_string(),
            http_timeout_sec: 30,
            install_schema: false,
        }
    }

    #[test]
    fn test_target_token_lookup() {
        assert!(target_token("US").unwrap_or_default().contains("United States"));
        assert!(target_token("ca").unwrap_or_default().contains("Canada"));
        assert!(target_token("FR").is_none());
    }

    #[test]
    fn test_driver_settings_maps_location() {
        let settings = config().driver_settings().unwrap();
        assert_eq!(settings.base_url, "https://remote.example");
        assert!(settings.target_location.starts_with("COUNTRY|2124|Canada"));
        assert_eq!(settings.campaign_budget, dec!(1000.00));
    }

    #[test]
    fn test_driver_settings_rejects_unknown_location() {
        let mut cfg = config();
        cfg.target_location = "XX".to_string();
        assert!(matches!(cfg.driver_settings(), Err(Error::Config(_))));
    }

    #[test]
    fn test_limits_reject_zero() {
        let mut cfg = config();
        assert_eq!(cfg.limits().unwrap(), Limits::default());
        cfg.max_keywords_per_adgroup = 0;
        assert!(matches!(cfg.limits(), Err(Error::Config(_))));
    }

    #[test]
    fn test_pacing_bounds_ordered_or_disabled() {
        let mut cfg = config();
        assert_eq!(
            cfg.pacing_bounds(),
            Some((Duration::from_millis(2000), Duration::from_millis(4000)))
        );
        cfg.pacing_enabled = false;
        assert_eq!(cfg.pacing_bounds(), None);
    }
}
