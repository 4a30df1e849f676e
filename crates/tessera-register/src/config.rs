//! # Register Configuration
//!
//! Configuration for one register session.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TESSERA_STORE_NAME="Downtown Parts"                                │
//! │     TESSERA_TAX_OVERRIDE=7.25                                          │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/tessera-pos/register.toml (Linux)                        │
//! │     ~/Library/Application Support/com.tessera.pos/register.toml (macOS)│
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # register.toml
//! [store]
//! name = "Downtown Parts"
//! currency = "USD"
//!
//! [store.location]
//! country = "US"
//! state = "CA"
//! county = "Alameda"
//!
//! [tax]
//! override_rate = "7.25"         # optional, replaces rate-table lookups
//! override_label = "Event tax"
//!
//! [scanner]
//! burst_latency_ms = 50
//! window_len = 10
//! window_ms = 500
//!
//! [checkout]
//! tender_policy = "warn_only"    # warn_only | block
//! # gateway_timeout_secs = 120  # unset: wait until confirmed or cancelled
//! ```

use std::path::PathBuf;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use tessera_core::scanner::ScanThresholds;
use tessera_core::tax::ManualOverride;
use tessera_core::validation::validate_tax_percentage;
use tessera_core::{Address, BusinessProfile};

use crate::error::ConfigError;

// =============================================================================
// Tender Policy
// =============================================================================

/// What happens when cash tendered is below the total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenderPolicy {
    /// Finalize anyway and warn. Change is zero.
    #[default]
    WarnOnly,
    /// Refuse to finalize.
    Block,
}

impl std::fmt::Display for TenderPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TenderPolicy::WarnOnly => write!(f, "warn_only"),
            TenderPolicy::Block => write!(f, "block"),
        }
    }
}

impl std::str::FromStr for TenderPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "warn_only" | "warn" => Ok(TenderPolicy::WarnOnly),
            "block" | "strict" => Ok(TenderPolicy::Block),
            other => Err(ConfigError::Invalid(format!(
                "Unknown tender policy: '{}'. Valid options: warn_only, block",
                other
            ))),
        }
    }
}

// =============================================================================
// Sections
// =============================================================================

/// The business running this register.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_name")]
    pub name: String,

    /// ISO 4217 code sent to the payment gateway.
    #[serde(default = "default_currency")]
    pub currency: String,

    /// The business's own jurisdiction.
    #[serde(default)]
    pub location: Address,
}

fn default_store_name() -> String {
    "Tessera Store".to_string()
}

fn default_currency() -> String {
    "USD".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            name: default_store_name(),
            currency: default_currency(),
            location: Address::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaxSettings {
    /// Flat percentage that replaces rate-table lookups. Never applies to
    /// the no-party or export zero-rate gates.
    #[serde(default)]
    pub override_rate: Option<Decimal>,

    #[serde(default)]
    pub override_label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSettings {
    #[serde(default)]
    pub tender_policy: TenderPolicy,

    /// How long one `await_payment` waits for the gateway. A timeout leaves
    /// the payment pending; unset waits until the card is confirmed or the
    /// interaction is cancelled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_timeout_secs: Option<u64>,
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        CheckoutSettings {
            tender_policy: TenderPolicy::default(),
            gateway_timeout_secs: None,
        }
    }
}

// =============================================================================
// Main Register Configuration
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterConfig {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub tax: TaxSettings,

    /// Scan-burst detection thresholds.
    #[serde(default)]
    pub scanner: ScanThresholds,

    #[serde(default)]
    pub checkout: CheckoutSettings,
}

impl RegisterConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (register.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading register config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load register config: {}. Using defaults.", e);
            Self::default()
        })
    }

    pub fn save(&self, config_path: Option<PathBuf>) -> Result<(), ConfigError> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| ConfigError::SaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::SaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| ConfigError::SaveFailed(e.to_string()))?;

        info!(?path, "Register config saved");
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let currency = &self.store.currency;
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(ConfigError::Invalid(format!(
                "currency must be a 3-letter ISO code, got: {}",
                currency
            )));
        }

        if let Some(rate) = self.tax.override_rate {
            validate_tax_percentage(rate).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }

        let s = &self.scanner;
        let timings = [
            ("sequence_gap_ms", s.sequence_gap_ms),
            ("burst_latency_ms", s.burst_latency_ms),
            ("window_ms", s.window_ms),
            ("idle_clear_ms", s.idle_clear_ms),
        ];
        if let Some((name, _)) = timings.iter().find(|(_, ms)| *ms == 0) {
            return Err(ConfigError::Invalid(format!(
                "scanner.{} must be greater than 0",
                name
            )));
        }
        if s.burst_min_len == 0 || s.window_len == 0 {
            return Err(ConfigError::Invalid(
                "scanner burst_min_len and window_len must be greater than 0".into(),
            ));
        }

        if self.checkout.gateway_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "gateway_timeout_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(name) = std::env::var("TESSERA_STORE_NAME") {
            self.store.name = name;
        }

        if let Ok(currency) = std::env::var("TESSERA_CURRENCY") {
            self.store.currency = currency.to_uppercase();
        }

        if let Ok(country) = std::env::var("TESSERA_COUNTRY") {
            debug!(%country, "Overriding business country from environment");
            self.store.location.country = country;
        }
        if let Ok(state) = std::env::var("TESSERA_STATE") {
            self.store.location.state = state;
        }
        if let Ok(county) = std::env::var("TESSERA_COUNTY") {
            self.store.location.county = county;
        }

        if let Ok(rate) = std::env::var("TESSERA_TAX_OVERRIDE") {
            match rate.parse::<Decimal>() {
                Ok(parsed) => {
                    debug!(rate = %parsed, "Overriding tax rate from environment");
                    self.tax.override_rate = Some(parsed);
                }
                Err(_) => warn!(%rate, "Ignoring unparseable TESSERA_TAX_OVERRIDE"),
            }
        }

        if let Ok(policy) = std::env::var("TESSERA_TENDER_POLICY") {
            match policy.parse() {
                Ok(parsed) => self.checkout.tender_policy = parsed,
                Err(_) => warn!(%policy, "Unknown tender policy in environment"),
            }
        }

        if let Ok(secs) = std::env::var("TESSERA_GATEWAY_TIMEOUT_SECS") {
            if let Ok(s) = secs.parse::<u64>() {
                self.checkout.gateway_timeout_secs = Some(s);
            }
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "tessera", "pos")
            .map(|dirs| dirs.config_dir().join("register.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn business_profile(&self) -> BusinessProfile {
        BusinessProfile {
            name: self.store.name.clone(),
            location: self.store.location.clone(),
            currency: self.store.currency.clone(),
        }
    }

    pub fn manual_override(&self) -> Option<ManualOverride> {
        self.tax.override_rate.map(|rate| {
            let mut manual = ManualOverride::new(rate);
            if let Some(label) = &self.tax.override_label {
                manual.label = label.clone();
            }
            manual
        })
    }
}
