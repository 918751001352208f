//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and `#[serde(default)]`,
//! so a settings file may specify any subset of fields.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PilotSettings {
    /// Endpoint chain-id probing.
    pub probe: ProbeSettings,
    /// Ledger driver (transaction execution against the fork).
    pub driver: DriverSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl PilotSettings {
    /// Reject values that would make the engine unusable.
    pub fn validate(&self) -> Result<()> {
        if self.probe.timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "probe.timeoutMs must be positive".into(),
            ));
        }
        if self.driver.receipt_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "driver.receiptTimeoutMs must be positive".into(),
            ));
        }
        if self.driver.last_executed_key.is_empty() {
            return Err(SettingsError::InvalidValue(
                "driver.lastExecutedKey must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Chain-id probe settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProbeSettings {
    /// Upper bound for a single probe round trip, in milliseconds.
    pub timeout_ms: u64,
    /// Forget failed probes so the next observation of the url probes again.
    /// When `false`, a url whose probe failed stays unclassified for the
    /// lifetime of the process.
    pub retry_unclassified: bool,
    /// User agent sent with probe requests.
    pub user_agent: String,
}

impl ProbeSettings {
    /// Probe timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            retry_unclassified: false,
            user_agent: "pilot/0.1".to_string(),
        }
    }
}

/// Ledger driver settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DriverSettings {
    /// How long to wait for a sent transaction to be mined, in milliseconds.
    pub receipt_timeout_ms: u64,
    /// Key under which the last-executed timestamp is stored.
    pub last_executed_key: String,
}

impl DriverSettings {
    /// Receipt timeout as a [`Duration`].
    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_millis(self.receipt_timeout_ms)
    }
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            receipt_timeout_ms: 60_000,
            last_executed_key: "lastTransactionExecuted".to_string(),
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Filter directive passed to the subscriber.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}
