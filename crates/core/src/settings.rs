//! Settings provider (C4): typed, bounded accessors over a key/value
//! store with process-in defaults. The store itself is a plain string
//! map (backed by the catalog's `settings` table in `manga-server`);
//! this module owns the schema, the bounds, and the clamping.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A single setting's declared type and bounds, used both to validate
/// overrides and to render a defaults table to clients.
#[derive(Debug, Clone, Copy)]
enum Bound {
    Int { min: i64, max: i64 },
    Bool,
    Enum(&'static [&'static str]),
}

struct Spec {
    key: &'static str,
    default: &'static str,
    bound: Bound,
}

macro_rules! int_spec {
    ($key:expr, $min:expr, $max:expr, $default:expr) => {
        Spec { key: $key, default: $default, bound: Bound::Int { min: $min, max: $max } }
    };
}

macro_rules! bool_spec {
    ($key:expr, $default:expr) => {
        Spec { key: $key, default: $default, bound: Bound::Bool }
    };
}

macro_rules! enum_spec {
    ($key:expr, $values:expr, $default:expr) => {
        Spec { key: $key, default: $default, bound: Bound::Enum($values) }
    };
}

const SPECS: &[Spec] = &[
    int_spec!("scan.max_workers", 1, 128, "12"),
    enum_spec!("scan.hash.mode", &["full", "off"], "full"),
    enum_spec!("scan.cover.mode", &["scan", "off"], "scan"),
    bool_spec!("scan.cover.regenerate_missing", "true"),
    int_spec!("scan.cancel_check.interval_ms", 50, 5000, "200"),
    int_spec!("scan.cover.max_width", 64, 4000, "500"),
    int_spec!("scan.cover.target_kb", 50, 5000, "300"),
    int_spec!("scan.cover.quality_start", 1, 100, "80"),
    int_spec!("scan.cover.quality_min", 1, 100, "10"),
    int_spec!("scan.cover.quality_step", 1, 50, "10"),
    int_spec!("cover.cache.shard_count", 1, 4096, "256"),
    int_spec!("reader.stream.chunk_kb", 64, 4096, "512"),
    int_spec!("ui.reader.image.max_side_px", 0, 20000, "0"),
    enum_spec!("ui.reader.image.render.format", &["jpeg", "png", "webp"], "jpeg"),
    int_spec!("ui.reader.image.render.quality", 1, 100, "85"),
    enum_spec!("ui.reader.image.render.resample", &["nearest", "triangle", "lanczos3"], "lanczos3"),
    int_spec!("ui.reader.image.render.webp_method", 0, 6, "4"),
    bool_spec!("ui.reader.image.render.optimize", "false"),
    bool_spec!("ui.reader.image.cache.enabled", "true"),
    int_spec!("ui.reader.image.cache.max_age_s", 0, 31_536_000, "86400"),
    bool_spec!("ui.reader.image.cache.immutable", "false"),
    int_spec!("ui.tasks.history.retention_days", 0, 3650, "30"),
];

fn spec_for(key: &str) -> Option<&'static Spec> {
    SPECS.iter().find(|s| s.key == key)
}

/// Clamp a raw override string against its declared bound. Returns the
/// defaulted value (as a string) when the raw value fails to parse or
/// falls outside the enum's allowed set — never an error, per the
/// provider's "fall back to defaults on parse failure" contract.
fn clamp_to_bound(spec: &Spec, raw: &str) -> String {
    match spec.bound {
        Bound::Int { min, max } => match raw.parse::<i64>() {
            Ok(n) => n.clamp(min, max).to_string(),
            Err(_) => spec.default.to_string(),
        },
        Bound::Bool => match raw.parse::<bool>() {
            Ok(b) => b.to_string(),
            Err(_) => spec.default.to_string(),
        },
        Bound::Enum(values) => {
            if values.contains(&raw) {
                raw.to_string()
            } else {
                spec.default.to_string()
            }
        }
    }
}

/// In-process settings provider: a full defaults table plus whatever
/// overrides the catalog's `settings` table has stored. Accessors never
/// fail — an invalid or missing override silently falls back to the
/// compiled-in default.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    overrides: HashMap<String, String>,
}

impl Settings {
    pub fn new() -> Self {
        Self { overrides: HashMap::new() }
    }

    /// Load a full override set, e.g. read back from the catalog store
    /// at startup. Unknown keys are kept (forward-compat with a newer
    /// schema) but never returned by [`Settings::get`].
    pub fn from_overrides(overrides: HashMap<String, String>) -> Self {
        Self { overrides }
    }

    /// Apply one override, clamping it to the key's declared bound.
    /// Unknown keys are ignored.
    pub fn set(&mut self, key: &str, value: &str) {
        let Some(spec) = spec_for(key) else {
            tracing::warn!(key, "ignoring override for unknown setting");
            return;
        };
        self.overrides.insert(key.to_string(), clamp_to_bound(spec, value));
        self.enforce_cover_quality_invariant();
    }

    /// Remove an override, reverting the key to its compiled-in default.
    pub fn reset(&mut self, key: &str) {
        self.overrides.remove(key);
    }

    /// Read a setting as its raw string form (override, clamped, or
    /// default). Returns `None` only for an unrecognized key.
    pub fn get(&self, key: &str) -> Option<String> {
        let spec = spec_for(key)?;
        Some(self.overrides.get(key).cloned().unwrap_or_else(|| spec.default.to_string()))
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key)?.parse().ok()
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key)?.parse().ok()
    }

    /// `quality_min` must never exceed `quality_start`; if an override
    /// pushes it past, clamp `quality_min` down rather than reject it.
    fn enforce_cover_quality_invariant(&mut self) {
        let start = self.get_int("scan.cover.quality_start").unwrap_or(80);
        let min = self.get_int("scan.cover.quality_min").unwrap_or(10);
        if min > start {
            self.overrides.insert("scan.cover.quality_min".to_string(), start.to_string());
        }
    }

    /// Render the full defaults + overrides table, e.g. for a settings
    /// inspection endpoint.
    pub fn snapshot(&self) -> Vec<SettingEntry> {
        SPECS
            .iter()
            .map(|spec| SettingEntry {
                key: spec.key.to_string(),
                value: self.get(spec.key).unwrap_or_else(|| spec.default.to_string()),
                default: spec.default.to_string(),
                is_overridden: self.overrides.contains_key(spec.key),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingEntry {
    pub key: String,
    pub value: String,
    pub default: String,
    pub is_overridden: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_key_set_is_ignored() {
        let mut s = Settings::new();
        s.set("scan.bogus_knob", "9999");
        assert_eq!(s.get("scan.bogus_knob"), None);
    }

    #[test]
    fn int_out_of_bounds_clamps() {
        let mut s = Settings::new();
        s.set("scan.max_workers", "999");
        assert_eq!(s.get_int("scan.max_workers"), Some(128));
    }

    #[test]
    fn unparseable_int_falls_back_to_default() {
        let mut s = Settings::new();
        s.set("scan.max_workers", "not-a-number");
        assert_eq!(s.get_int("scan.max_workers"), Some(12));
    }

    #[test]
    fn enum_outside_allowed_set_falls_back() {
        let mut s = Settings::new();
        s.set("scan.hash.mode", "partial");
        assert_eq!(s.get("scan.hash.mode"), Some("full".to_string()));
    }

    #[test]
    fn quality_min_is_clamped_below_quality_start() {
        let mut s = Settings::new();
        s.set("scan.cover.quality_start", "50");
        s.set("scan.cover.quality_min", "90");
        assert!(s.get_int("scan.cover.quality_min").unwrap() <= 50);
    }

    #[test]
    fn reset_reverts_to_default() {
        let mut s = Settings::new();
        s.set("scan.max_workers", "64");
        assert_eq!(s.get_int("scan.max_workers"), Some(64));
        s.reset("scan.max_workers");
        assert_eq!(s.get_int("scan.max_workers"), Some(12));
    }
}
