//! # Configuration
//!
//! Non-secret settings come from an optional TOML file (`--config`); every
//! field has a default so a missing file or section is never an error.
//! Secrets (API keys, token-verification material) are read from the
//! environment only, after `dotenvy` has loaded `.env`. Without
//! `AUTH_JWT_SECRET` or `FIREBASE_PROJECT_ID` the server refuses to start
//! unless `debug = true` and `AUTH_INSECURE=1` are both set.
//!
//! ```toml
//! [server]
//! debug = false
//! cors_origins = ["https://app.plantkeeper.io"]
//! public_paths = ["/metrics"]
//!
//! [kpi]
//! target_impressions_per_user = 50
//! revenue_per_impression = "0.005"
//!
//! [admob]
//! app_id_android = "ca-app-pub-xxx~yyy"
//! test_mode = true
//!
//! [external]
//! openai_model = "gpt-4.1-nano"
//! timeout_secs = 20
//! ```

use crate::kpi::KpiSettings;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub kpi: KpiSettings,
    pub admob: AdmobConfig,
    pub external: ExternalConfig,
}

/// The `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub debug: bool,
    /// Allowed CORS origins. Empty means any origin.
    pub cors_origins: Vec<String>,
    /// Paths reachable without a bearer token, in addition to the built-in
    /// root, API root, health and docs paths.
    pub public_paths: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            debug: false,
            cors_origins: Vec::new(),
            public_paths: Vec::new(),
            request_timeout_secs: 60,
        }
    }
}

/// The `[admob]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmobConfig {
    pub app_id_android: String,
    pub app_id_ios: String,
    pub test_mode: bool,
}

impl Default for AdmobConfig {
    fn default() -> Self {
        // Google's published sample app ids.
        AdmobConfig {
            app_id_android: "ca-app-pub-3940256099942544~3347511713".to_string(),
            app_id_ios: "ca-app-pub-3940256099942544~1458002511".to_string(),
            test_mode: true,
        }
    }
}

impl AdmobConfig {
    pub fn app_id_for(&self, platform: crate::dto::Platform) -> &str {
        match platform {
            crate::dto::Platform::Android => &self.app_id_android,
            crate::dto::Platform::Ios => &self.app_id_ios,
        }
    }
}

/// The `[external]` section: plant-info and text-generation endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalConfig {
    pub perenual_base_url: String,
    pub trefle_base_url: String,
    pub openai_base_url: String,
    pub openai_model: String,
    /// Per-call timeout for every outbound request.
    pub timeout_secs: u64,
}

impl Default for ExternalConfig {
    fn default() -> Self {
        ExternalConfig {
            perenual_base_url: "https://perenual.com/api".to_string(),
            trefle_base_url: "https://trefle.io/api/v1".to_string(),
            openai_base_url: "https://api.openai.com/v1".to_string(),
            openai_model: "gpt-4.1-nano".to_string(),
            timeout_secs: 20,
        }
    }
}

/// Parse configuration from a TOML string.
pub fn parse_toml(content: &str) -> Result<AppConfig> {
    let config: AppConfig = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Load configuration from an optional TOML file. `None` yields defaults.
pub fn load(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(p) => {
            let content = std::fs::read_to_string(p)
                .with_context(|| format!("reading config file {}", p.display()))?;
            parse_toml(&content)
        }
        None => Ok(AppConfig::default()),
    }
}

fn validate(config: &AppConfig) -> Result<()> {
    if !(config.kpi.target_impressions_per_user > 0.0) {
        anyhow::bail!("kpi.target_impressions_per_user must be positive");
    }
    if config.kpi.revenue_per_impression.is_sign_negative() {
        anyhow::bail!("kpi.revenue_per_impression must not be negative");
    }
    if config.external.timeout_secs == 0 {
        anyhow::bail!("external.timeout_secs must be at least 1");
    }
    Ok(())
}

/// Secrets read from the environment.
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    pub perenual_api_key: String,
    pub trefle_api_key: String,
    pub openai_api_key: String,
    pub auth_jwt_secret: Option<String>,
    pub firebase_project_id: Option<String>,
    /// `AUTH_INSECURE=1`: accept unverified tokens. Only honored together
    /// with `[server] debug = true`.
    pub allow_insecure_auth: bool,
}

impl Secrets {
    pub fn from_env() -> Self {
        let non_empty = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        Secrets {
            perenual_api_key: non_empty("PERENUAL_API_KEY").unwrap_or_default(),
            trefle_api_key: non_empty("TREFLE_API_KEY").unwrap_or_default(),
            openai_api_key: non_empty("OPENAI_API_KEY").unwrap_or_default(),
            auth_jwt_secret: non_empty("AUTH_JWT_SECRET"),
            firebase_project_id: non_empty("FIREBASE_PROJECT_ID"),
            allow_insecure_auth: non_empty("AUTH_INSECURE")
                .is_some_and(|v| matches!(v.trim(), "1" | "true" | "yes")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::io::Write;
    use std::str::FromStr;

    #[test]
    fn empty_document_yields_defaults() {
        let config = parse_toml("").unwrap();
        assert_eq!(config.kpi, KpiSettings::default());
        assert_eq!(config.external.timeout_secs, 20);
        assert!(config.admob.test_mode);
        assert!(config.server.public_paths.is_empty());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = parse_toml(
            r#"
            [kpi]
            target_impressions_per_user = 40

            [server]
            public_paths = ["/metrics"]
            "#,
        )
        .unwrap();
        assert_eq!(config.kpi.target_impressions_per_user, 40.0);
        assert_eq!(config.kpi.revenue_per_impression, Decimal::new(5, 3));
        assert_eq!(config.server.public_paths, vec!["/metrics".to_string()]);
        assert_eq!(config.server.request_timeout_secs, 60);
    }

    #[test]
    fn revenue_rate_accepts_string_decimal() {
        let config = parse_toml("[kpi]\nrevenue_per_impression = \"0.0125\"\n").unwrap();
        assert_eq!(
            config.kpi.revenue_per_impression,
            Decimal::from_str("0.0125").unwrap()
        );
    }

    #[test]
    fn rejects_non_positive_target() {
        assert!(parse_toml("[kpi]\ntarget_impressions_per_user = 0\n").is_err());
    }

    #[test]
    fn rejects_zero_timeout() {
        assert!(parse_toml("[external]\ntimeout_secs = 0\n").is_err());
    }

    #[test]
    fn load_reads_file_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[admob]\ntest_mode = false\napp_id_ios = \"ios-app\"").unwrap();
        let config = load(Some(file.path())).unwrap();
        assert!(!config.admob.test_mode);
        assert_eq!(config.admob.app_id_ios, "ios-app");
    }

    #[test]
    fn load_without_path_is_default() {
        let config = load(None).unwrap();
        assert_eq!(config.external.openai_model, "gpt-4.1-nano");
    }

    #[test]
    fn load_missing_file_errors() {
        assert!(load(Some(Path::new("/nonexistent/plantkeeper.toml"))).is_err());
    }
}
