//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`PilotSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `PILOT_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::PilotSettings;

/// Resolve the default settings file path (`~/.pilot/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".pilot").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<PilotSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or values that fail
/// [`PilotSettings::validate`] are errors.
pub fn load_settings_from_path(path: &Path) -> Result<PilotSettings> {
    let mut layered = serde_json::to_value(PilotSettings::default())?;

    match std::fs::read_to_string(path) {
        Ok(content) => {
            debug!(path = %path.display(), "merging settings file");
            deep_merge(&mut layered, serde_json::from_str(&content)?);
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no settings file, using defaults");
        }
        Err(source) => {
            return Err(SettingsError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    }

    let mut settings: PilotSettings = serde_json::from_value(layered)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Merge `overlay` into `base` in place.
///
/// Objects merge key by key, `null` in the overlay keeps the base value, and
/// anything else in the overlay replaces the base value.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    let Value::Object(overlay_map) = overlay else {
        *base = overlay;
        return;
    };
    let Value::Object(base_map) = base else {
        *base = Value::Object(overlay_map);
        return;
    };
    for (key, value) in overlay_map {
        if value.is_null() {
            continue;
        }
        match base_map.get_mut(&key) {
            Some(slot) => deep_merge(slot, value),
            None => {
                let _ = base_map.insert(key, value);
            }
        }
    }
}

/// Apply `PILOT_*` environment variable overrides.
///
/// Invalid values are ignored with a warning; the file or default value stays.
pub fn apply_env_overrides(settings: &mut PilotSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup` instead of the process environment.
pub fn apply_overrides(settings: &mut PilotSettings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(ms) = env_value(&lookup, "PILOT_PROBE_TIMEOUT_MS", |raw| {
        parse_u64_range(raw, 1, 600_000)
    }) {
        settings.probe.timeout_ms = ms;
    }
    if let Some(flag) = env_value(&lookup, "PILOT_PROBE_RETRY_UNCLASSIFIED", parse_bool) {
        settings.probe.retry_unclassified = flag;
    }
    if let Some(ms) = env_value(&lookup, "PILOT_RECEIPT_TIMEOUT_MS", |raw| {
        parse_u64_range(raw, 1, 3_600_000)
    }) {
        settings.driver.receipt_timeout_ms = ms;
    }
    if let Some(level) = env_value(&lookup, "PILOT_LOG_LEVEL", |raw| Some(raw.to_owned())) {
        settings.logging.level = level;
    }
    if let Some(flag) = env_value(&lookup, "PILOT_LOG_JSON", parse_bool) {
        settings.logging.json = flag;
    }
}

fn env_value<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    parse: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    let raw = lookup(name).filter(|v| !v.is_empty())?;
    let parsed = parse(&raw);
    if parsed.is_none() {
        warn!(key = name, value = %raw, "ignoring invalid environment override");
    }
    parsed
}

/// Parse a boolean flag: `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`,
/// case-insensitive.
pub fn parse_bool(raw: &str) -> Option<bool> {
    let raw = raw.trim();
    ["true", "1", "yes", "on"]
        .iter()
        .any(|t| raw.eq_ignore_ascii_case(t))
        .then_some(true)
        .or_else(|| {
            ["false", "0", "no", "off"]
                .iter()
                .any(|f| raw.eq_ignore_ascii_case(f))
                .then_some(false)
        })
}

/// Parse an integer and accept it only within `min..=max`.
pub fn parse_u64_range(raw: &str, min: u64, max: u64) -> Option<u64> {
    raw.trim().parse::<u64>().ok().filter(|n| (min..=max).contains(n))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
