//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`BeaconSettings::default()`]
//! 2. If a settings file is given (argument or `BEACON_CONFIG`), deep-merge it over defaults
//! 3. Apply environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::{BeaconSettings, MAX_CONNECTIONS_LIMIT, PublishScope};

/// Env var naming an optional settings file.
pub const CONFIG_ENV: &str = "BEACON_CONFIG";

/// Load settings from an optional file plus process environment.
///
/// `path` wins over `BEACON_CONFIG`. A named file that does not exist is an
/// error; no file at all means defaults.
pub fn load_settings(path: Option<&Path>) -> Result<BeaconSettings> {
    let from_env = read_env_string(CONFIG_ENV).map(PathBuf::from);
    let path = path.map(Path::to_path_buf).or(from_env);

    let defaults = serde_json::to_value(BeaconSettings::default())?;
    let merged = match path {
        Some(path) => {
            debug!(path = %path.display(), "loading settings from file");
            let content = std::fs::read_to_string(&path)?;
            let user: Value = serde_json::from_str(&content)?;
            deep_merge(defaults, user)
        }
        None => defaults,
    };

    let mut settings: BeaconSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply overrides from the process environment.
pub fn apply_env_overrides(settings: &mut BeaconSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary variable lookup.
///
/// Invalid values are ignored with a warning (fall back to file/default).
pub fn apply_overrides_from(settings: &mut BeaconSettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = Env { lookup };

    if let Some(v) = env.u16("PORT", 1, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = env.string("BEACON_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.usize("BEACON_MAX_CONNECTIONS", 1, MAX_CONNECTIONS_LIMIT) {
        settings.server.max_connections = v;
    }
    if let Some(v) = env.u64("BEACON_HEARTBEAT_INTERVAL_MS", 1_000, 600_000) {
        settings.server.heartbeat_interval_ms = v;
    }
    if let Some(v) = env.u64("BEACON_HEARTBEAT_TIMEOUT_MS", 1_000, 3_600_000) {
        settings.server.heartbeat_timeout_ms = v;
    }
    if let Some(raw) = env.string("BEACON_PUBLISH_SCOPE") {
        match PublishScope::parse(&raw) {
            Some(scope) => settings.fanout.publish_scope = scope,
            None => warn!(key = "BEACON_PUBLISH_SCOPE", value = %raw, "invalid publish scope, ignoring"),
        }
    }
    if let Some(v) = env.string("BEACON_LOG") {
        settings.logging.level = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Variable readers ────────────────────────────────────────────────────────

struct Env<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, parse: impl FnOnce(&str) -> Option<T>) -> Option<T> {
        let val = self.string(name)?;
        let result = parse(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid numeric env var, ignoring");
        }
        result
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        self.parsed(name, |v| parse_u16_range(v, min, max))
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        self.parsed(name, |v| parse_u64_range(v, min, max))
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        self.parsed(name, |v| parse_usize_range(v, min, max))
    }
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SettingsError;
    use std::collections::HashMap;
    use std::io::Write;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"server": {"port": 3001, "host": "0.0.0.0"}});
        let source = serde_json::json!({"server": {"port": 9090}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "0.0.0.0");
    }

    #[test]
    fn merge_null_preserves_target() {
        let merged = deep_merge(serde_json::json!({"a": 1}), serde_json::json!({"a": null}));
        assert_eq!(merged["a"], 1);
    }

    #[test]
    fn merge_array_replace() {
        let merged = deep_merge(
            serde_json::json!({"items": [1, 2, 3]}),
            serde_json::json!({"items": [4]}),
        );
        assert_eq!(merged["items"], serde_json::json!([4]));
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let merged = deep_merge(
            serde_json::json!({"a": {"nested": true}}),
            serde_json::json!({"a": 42}),
        );
        assert_eq!(merged["a"], 42);
    }

    // ── overrides ───────────────────────────────────────────────────

    #[test]
    fn port_override() {
        let mut s = BeaconSettings::default();
        apply_overrides_from(&mut s, vars(&[("PORT", "8080")]));
        assert_eq!(s.server.port, 8080);
    }

    #[test]
    fn port_unset_keeps_default_3001() {
        let mut s = BeaconSettings::default();
        apply_overrides_from(&mut s, vars(&[]));
        assert_eq!(s.server.port, 3001);
    }

    #[test]
    fn invalid_port_is_ignored() {
        let mut s = BeaconSettings::default();
        apply_overrides_from(&mut s, vars(&[("PORT", "not-a-port")]));
        assert_eq!(s.server.port, 3001);
        apply_overrides_from(&mut s, vars(&[("PORT", "0")]));
        assert_eq!(s.server.port, 3001);
        apply_overrides_from(&mut s, vars(&[("PORT", "70000")]));
        assert_eq!(s.server.port, 3001);
    }

    #[test]
    fn empty_value_is_ignored() {
        let mut s = BeaconSettings::default();
        apply_overrides_from(&mut s, vars(&[("BEACON_HOST", "")]));
        assert_eq!(s.server.host, "0.0.0.0");
    }

    #[test]
    fn all_overrides_apply() {
        let mut s = BeaconSettings::default();
        apply_overrides_from(
            &mut s,
            vars(&[
                ("BEACON_HOST", "127.0.0.1"),
                ("BEACON_MAX_CONNECTIONS", "42"),
                ("BEACON_HEARTBEAT_INTERVAL_MS", "5000"),
                ("BEACON_HEARTBEAT_TIMEOUT_MS", "15000"),
                ("BEACON_PUBLISH_SCOPE", "subscribers"),
                ("BEACON_LOG", "debug"),
            ]),
        );
        assert_eq!(s.server.host, "127.0.0.1");
        assert_eq!(s.server.max_connections, 42);
        assert_eq!(s.server.heartbeat_interval_ms, 5_000);
        assert_eq!(s.server.heartbeat_timeout_ms, 15_000);
        assert_eq!(s.fanout.publish_scope, PublishScope::Subscribers);
        assert_eq!(s.logging.level, "debug");
    }

    #[test]
    fn invalid_publish_scope_is_ignored() {
        let mut s = BeaconSettings::default();
        apply_overrides_from(&mut s, vars(&[("BEACON_PUBLISH_SCOPE", "everyone?")]));
        assert_eq!(s.fanout.publish_scope, PublishScope::AllConnections);
    }

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_u16_range(" 3001 ", 1, 65535), Some(3001));
        assert_eq!(parse_u16_range("-1", 1, 65535), None);
        assert_eq!(parse_u64_range("999", 1_000, 2_000), None);
        assert_eq!(parse_usize_range("10", 1, 10), Some(10));
    }

    // ── load_settings ───────────────────────────────────────────────

    #[test]
    fn load_from_file_merges_over_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"server":{{"maxConnections":7}},"fanout":{{"publishScope":"subscribers"}}}}"#)
            .unwrap();
        let s = load_settings(Some(file.path())).unwrap();
        assert_eq!(s.server.max_connections, 7);
        assert_eq!(s.fanout.publish_scope, PublishScope::Subscribers);
        assert_eq!(s.server.heartbeat_interval_ms, 25_000);
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = load_settings(Some(Path::new("/nonexistent/beacon.json"))).unwrap_err();
        assert!(matches!(err, SettingsError::Io(_)));
    }

    #[test]
    fn load_invalid_json_is_json_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();
        let err = load_settings(Some(file.path())).unwrap_err();
        assert!(matches!(err, SettingsError::Json(_)));
    }

    #[test]
    fn load_rejects_inconsistent_heartbeat() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"server":{{"heartbeatIntervalMs":10000,"heartbeatTimeoutMs":5000}}}}"#
        )
        .unwrap();
        let err = load_settings(Some(file.path())).unwrap_err();
        assert!(matches!(err, SettingsError::InvalidValue(_)));
    }
}
