//! Layered runtime configuration.
//!
//! Settings are merged from three layers, lowest precedence first:
//!
//! 1. built-in defaults ([`layers::defaults_layer`])
//! 2. the process environment, captured once when the store opens
//! 3. the persisted override document (`user-config.json`)
//!
//! The merge is shallow and key-by-key; the result is normalized into an
//! immutable [`Config`] snapshot. [`ConfigStore`] owns the live snapshot and
//! swaps it atomically on reload or patch.
//!
//! # Override document
//!
//! ```json
//! {
//!   "configVersion": 1,
//!   "tmdbApiKeys": ["key-a", "key-b"],
//!   "febboxCookies": "ui=abc; def",
//!   "enableVidzeeProvider": false
//! }
//! ```
//!
//! Patching a key to `null` deletes it from the document, so the setting falls
//! back to the environment or default layer on the next load.

pub mod env;
pub mod layers;
pub mod parse;
mod store;

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Serialize, Serializer};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::warn;

pub use env::{EnvSurface, MemoryEnv, ProcessEnv};
pub use store::ConfigStore;

use parse::{
    coerce_bool, cookies_from_value, dedup_trimmed, non_empty_string, parse_json_maybe,
    scalar_string, split_delimited, split_provider_list,
};

/// Schema generation written into new override documents.
pub const CONFIG_SCHEMA_VERSION: u64 = 1;

pub const DEFAULT_PORT: u16 = 8787;

/// Aggregator deadline per provider call.
pub const DEFAULT_PROVIDER_TIMEOUT_MS: u64 = 30_000;

/// Providers with a dedicated enable flag, in registry enumeration order.
pub const KNOWN_PROVIDERS: [&str; 7] = [
    "showbox", "4khdhub", "moviesmod", "mp4hydra", "vidzee", "vixsrc", "xprime",
];

/// Variables from retired proxy support, cleared on every mirror.
const RETIRED_ENV_VARS: [&str; 7] = [
    "SHOWBOX_USE_ROTATING_PROXY",
    "SHOWBOX_PROXY_URL_VALUE",
    "SHOWBOX_PROXY_URL_ALTERNATE",
    "XPRIME_PROXY_URL",
    "VIDZEE_PROXY_URL",
    "VIDSRC_PROXY_URL",
    "MOVIESMOD_PROXY_URL",
];

/// Keys with a typed home in [`Config`]; anything else lands in `extra`.
const TYPED_KEYS: [&str; 17] = [
    "configVersion",
    "port",
    "defaultRegion",
    "defaultProviders",
    "minQualitiesRaw",
    "minQualities",
    "excludeCodecsRaw",
    "excludeCodecs",
    "tmdbApiKeys",
    "tmdbApiKey",
    "febboxCookies",
    "disableCache",
    "enablePStreamApi",
    "disableUrlValidation",
    "disable4khdhubUrlValidation",
    "showboxCacheDir",
    "providerTimeoutMs",
];

static PROVIDER_FLAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^enable([A-Za-z0-9]+)Provider$").expect("static regex"));

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{path} does not contain a JSON object")]
    NotAMapping { path: PathBuf },

    #[error("failed to serialize override document: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Override-document key of a provider's enable flag (`vidzee` → `enableVidzeeProvider`).
#[must_use]
pub fn provider_flag_key(name: &str) -> String {
    let mut chars = name.chars();
    let capitalized: String = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    };
    format!("enable{capitalized}Provider")
}

/// Spelling of `key` used inside merged layers.
///
/// Provider flags match case-insensitively on the provider name, so
/// `enableVIDZEEProvider` folds onto `enableVidzeeProvider`. Other keys pass through.
pub(crate) fn canonical_key(key: &str) -> Cow<'_, str> {
    match PROVIDER_FLAG.captures(key) {
        Some(caps) => {
            let canonical = provider_flag_key(&caps[1].to_lowercase());
            if canonical == key {
                Cow::Borrowed(key)
            } else {
                Cow::Owned(canonical)
            }
        }
        None => Cow::Borrowed(key),
    }
}

/// Environment name of a provider's enable flag (`vidzee` → `ENABLE_VIDZEE_PROVIDER`).
#[must_use]
pub fn provider_env_key(name: &str) -> String {
    format!("ENABLE_{}_PROVIDER", name.to_uppercase())
}

/// A fully resolved configuration snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub config_version: u64,
    pub port: u16,
    pub default_region: Option<String>,
    /// Lower-cased provider names preselected by the serving layer.
    pub default_providers: Vec<String>,
    pub min_qualities_raw: Option<String>,
    /// `min_qualities_raw` as JSON, or `{"default": raw}` when it is not JSON.
    pub min_qualities: Option<Value>,
    pub exclude_codecs_raw: Option<String>,
    pub exclude_codecs: Option<Value>,
    /// Trimmed, deduplicated, order-stable.
    pub tmdb_api_keys: Vec<String>,
    /// Deduplicated credential pool with `ui=` markers stripped.
    pub febbox_cookies: Vec<String>,
    /// Enable flag per lower-cased provider name.
    pub provider_flags: BTreeMap<String, bool>,
    pub disable_cache: bool,
    pub enable_pstream_api: bool,
    pub disable_url_validation: bool,
    pub disable_4khdhub_url_validation: bool,
    pub showbox_cache_dir: Option<String>,
    pub provider_timeout_ms: u64,
    /// Unrecognized keys, preserved for forward compatibility.
    pub extra: Map<String, Value>,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_merged(&layers::defaults_layer())
    }
}

impl Config {
    /// Normalize a merged layer stack into a snapshot.
    pub fn from_merged(merged: &Map<String, Value>) -> Self {
        let get = |key: &str| merged.get(key).filter(|v| !v.is_null());

        let config_version = get("configVersion")
            .and_then(Value::as_u64)
            .filter(|v| *v > 0)
            .unwrap_or(CONFIG_SCHEMA_VERSION);

        let port = get("port").and_then(port_value).unwrap_or_else(|| {
            if let Some(raw) = get("port") {
                warn!(value = %raw, "Invalid port, using default");
            }
            DEFAULT_PORT
        });

        let default_providers = match get("defaultProviders") {
            Some(Value::Array(items)) => dedup_trimmed(
                items
                    .iter()
                    .filter_map(scalar_string)
                    .map(|p| p.to_lowercase()),
            ),
            Some(Value::String(raw)) => split_provider_list(raw),
            _ => Vec::new(),
        };

        let min_qualities_raw = non_empty_string(get("minQualitiesRaw"));
        let min_qualities = min_qualities_raw
            .as_deref()
            .map(|raw| parse_json_maybe(raw).unwrap_or_else(|| json!({ "default": raw })));
        let exclude_codecs_raw = non_empty_string(get("excludeCodecsRaw"));
        let exclude_codecs = exclude_codecs_raw.as_deref().and_then(parse_json_maybe);

        let mut provider_flags: BTreeMap<String, bool> = KNOWN_PROVIDERS
            .iter()
            .map(|name| ((*name).to_string(), true))
            .collect();
        let mut extra = Map::new();

        for (key, value) in merged {
            if let Some(caps) = PROVIDER_FLAG.captures(key) {
                let name = caps[1].to_lowercase();
                match coerce_bool(value) {
                    Some(enabled) => {
                        provider_flags.insert(name, enabled);
                    }
                    None if value.is_null() => {}
                    None => warn!(key = %key, value = %value, "Unrecognized boolean, keeping provider enabled"),
                }
            } else if !TYPED_KEYS.contains(&key.as_str()) && !value.is_null() {
                extra.insert(key.clone(), value.clone());
            }
        }

        Self {
            config_version,
            port,
            default_region: non_empty_string(get("defaultRegion")),
            default_providers,
            min_qualities_raw,
            min_qualities,
            exclude_codecs_raw,
            exclude_codecs,
            tmdb_api_keys: tmdb_keys(merged),
            febbox_cookies: get("febboxCookies").map(cookies_from_value).unwrap_or_default(),
            provider_flags,
            disable_cache: flag(merged, "disableCache", false),
            enable_pstream_api: flag(merged, "enablePStreamApi", true),
            disable_url_validation: flag(merged, "disableUrlValidation", false),
            disable_4khdhub_url_validation: flag(merged, "disable4khdhubUrlValidation", false),
            showbox_cache_dir: non_empty_string(get("showboxCacheDir")),
            provider_timeout_ms: get("providerTimeoutMs")
                .and_then(|v| scalar_string(v)?.trim().parse().ok())
                .unwrap_or(DEFAULT_PROVIDER_TIMEOUT_MS),
            extra,
        }
    }

    /// Whether `name` is enabled. Names without a flag default to enabled.
    #[must_use]
    pub fn provider_enabled(&self, name: &str) -> bool {
        self.provider_flags
            .get(&name.to_lowercase())
            .copied()
            .unwrap_or(true)
    }

    /// The snapshot as a camelCase document. The legacy `tmdbApiKey` is never emitted.
    #[must_use]
    pub fn to_document(&self) -> Map<String, Value> {
        let mut doc = Map::new();
        doc.insert("configVersion".into(), json!(self.config_version));
        doc.insert("port".into(), json!(self.port));
        doc.insert("defaultRegion".into(), json!(self.default_region));
        doc.insert("defaultProviders".into(), json!(self.default_providers));
        doc.insert("minQualitiesRaw".into(), json!(self.min_qualities_raw));
        doc.insert("minQualities".into(), json!(self.min_qualities));
        doc.insert("excludeCodecsRaw".into(), json!(self.exclude_codecs_raw));
        doc.insert("excludeCodecs".into(), json!(self.exclude_codecs));
        doc.insert("tmdbApiKeys".into(), json!(self.tmdb_api_keys));
        doc.insert("febboxCookies".into(), json!(self.febbox_cookies));
        for (name, enabled) in &self.provider_flags {
            doc.insert(provider_flag_key(name), json!(enabled));
        }
        doc.insert("disableCache".into(), json!(self.disable_cache));
        doc.insert("enablePStreamApi".into(), json!(self.enable_pstream_api));
        doc.insert("disableUrlValidation".into(), json!(self.disable_url_validation));
        doc.insert(
            "disable4khdhubUrlValidation".into(),
            json!(self.disable_4khdhub_url_validation),
        );
        doc.insert("showboxCacheDir".into(), json!(self.showbox_cache_dir));
        doc.insert("providerTimeoutMs".into(), json!(self.provider_timeout_ms));
        for (key, value) in &self.extra {
            doc.entry(key.clone()).or_insert_with(|| value.clone());
        }
        doc
    }

    /// Environment assignments mirroring this snapshot. `None` means unset.
    #[must_use]
    pub fn env_mirror(&self) -> Vec<(String, Option<String>)> {
        let bool_str = |b: bool| Some(if b { "true" } else { "false" }.to_string());
        let joined = |items: &[String]| Some(items.join(",")).filter(|s| !s.is_empty());

        let mut vars = vec![
            ("API_PORT".to_string(), Some(self.port.to_string())),
            ("TMDB_API_KEY".to_string(), self.tmdb_api_keys.first().cloned()),
            ("DEFAULT_PROVIDERS".to_string(), joined(&self.default_providers)),
            ("MIN_QUALITIES".to_string(), self.min_qualities_raw.clone()),
            ("EXCLUDE_CODECS".to_string(), self.exclude_codecs_raw.clone()),
            ("FEBBOX_COOKIES".to_string(), joined(&self.febbox_cookies)),
            ("DEFAULT_REGION".to_string(), self.default_region.clone()),
            ("FEBBOX_REGION".to_string(), self.default_region.clone()),
        ];
        for (name, enabled) in &self.provider_flags {
            vars.push((provider_env_key(name), bool_str(*enabled)));
        }
        vars.extend([
            ("DISABLE_CACHE".to_string(), bool_str(self.disable_cache)),
            ("ENABLE_PSTREAM_API".to_string(), bool_str(self.enable_pstream_api)),
            ("DISABLE_URL_VALIDATION".to_string(), bool_str(self.disable_url_validation)),
            (
                "DISABLE_4KHDHUB_URL_VALIDATION".to_string(),
                bool_str(self.disable_4khdhub_url_validation),
            ),
            ("SHOWBOX_CACHE_DIR".to_string(), self.showbox_cache_dir.clone()),
            (
                "PROVIDER_TIMEOUT_MS".to_string(),
                Some(self.provider_timeout_ms.to_string()),
            ),
        ]);
        vars.extend(RETIRED_ENV_VARS.iter().map(|v| ((*v).to_string(), None)));
        vars
    }
}

impl Serialize for Config {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_document().serialize(serializer)
    }
}

fn port_value(value: &Value) -> Option<u16> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn flag(merged: &Map<String, Value>, key: &str, default: bool) -> bool {
    match merged.get(key) {
        None | Some(Value::Null) => default,
        Some(value) => coerce_bool(value).unwrap_or_else(|| {
            warn!(key, value = %value, default, "Unrecognized boolean, using default");
            default
        }),
    }
}

/// Resolve the TMDB key list, falling back to the legacy single key.
///
/// An explicitly empty `tmdbApiKeys` array suppresses the fallback so a
/// cleared list stays cleared.
fn tmdb_keys(merged: &Map<String, Value>) -> Vec<String> {
    let (listed, explicit_empty) = match merged.get("tmdbApiKeys") {
        Some(Value::Array(items)) => (
            items.iter().filter_map(scalar_string).collect::<Vec<_>>(),
            items.is_empty(),
        ),
        Some(Value::String(raw)) => (split_delimited(raw), false),
        _ => (Vec::new(), false),
    };
    if listed.is_empty() && !explicit_empty {
        return non_empty_string(merged.get("tmdbApiKey")).into_iter().collect();
    }
    dedup_trimmed(listed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn merged(value: Value) -> Map<String, Value> {
        let mut base = layers::defaults_layer();
        if let Value::Object(upper) = value {
            layers::merge_into(&mut base, &upper);
        }
        base
    }

    #[test]
    fn defaults_enable_every_known_provider() {
        let config = Config::default();
        for name in KNOWN_PROVIDERS {
            assert!(config.provider_enabled(name), "{name} should default on");
        }
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.config_version, CONFIG_SCHEMA_VERSION);
        assert!(!config.disable_cache);
        assert!(config.enable_pstream_api);
        assert!(config.tmdb_api_keys.is_empty());
    }

    #[test]
    fn febbox_cookies_normalized() {
        let config = Config::from_merged(&merged(json!({ "febboxCookies": ["abc", "ui=def", "abc"] })));
        assert_eq!(config.febbox_cookies, vec!["abc", "def"]);
    }

    #[test]
    fn tmdb_keys_deduped_and_trimmed() {
        let config = Config::from_merged(&merged(json!({ "tmdbApiKeys": [" a ", "b", "a", ""] })));
        assert_eq!(config.tmdb_api_keys, vec!["a", "b"]);
    }

    #[test]
    fn tmdb_keys_from_delimited_string() {
        let config = Config::from_merged(&merged(json!({ "tmdbApiKeys": "a;b\nc,a" })));
        assert_eq!(config.tmdb_api_keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn legacy_tmdb_key_fills_empty_list() {
        let config = Config::from_merged(&merged(json!({ "tmdbApiKey": "legacy" })));
        assert_eq!(config.tmdb_api_keys, vec!["legacy"]);
        assert!(!config.to_document().contains_key("tmdbApiKey"));
    }

    #[test]
    fn explicit_empty_list_suppresses_legacy_key() {
        let config = Config::from_merged(&merged(json!({ "tmdbApiKey": "legacy", "tmdbApiKeys": [] })));
        assert!(config.tmdb_api_keys.is_empty());
    }

    #[test]
    fn provider_flags_coerce_strings() {
        let config = Config::from_merged(&merged(json!({
            "enableVidzeeProvider": "false",
            "enableXprimeProvider": "nonsense",
            "enableCustomProvider": false,
        })));
        assert!(!config.provider_enabled("vidzee"));
        assert!(!config.provider_enabled("VidZee"));
        assert!(config.provider_enabled("xprime"));
        assert!(!config.provider_enabled("custom"));
        assert!(config.provider_enabled("never-configured"));
    }

    #[test]
    fn flag_key_case_does_not_lose_to_defaults() {
        for key in ["enableVidZeeProvider", "enableVIDZEEProvider", "enablevidzeeProvider"] {
            let config = Config::from_merged(&merged(json!({ key: false })));
            assert!(!config.provider_enabled("vidzee"), "{key} should disable vidzee");
            assert!(config.provider_enabled("xprime"));
        }
    }

    #[test]
    fn canonical_key_folds_provider_flags_only() {
        assert_eq!(canonical_key("enableVIDZEEProvider"), "enableVidzeeProvider");
        assert_eq!(canonical_key("enable4KHDHubProvider"), "enable4khdhubProvider");
        assert!(matches!(canonical_key("enableVidzeeProvider"), Cow::Borrowed(_)));
        assert_eq!(canonical_key("tmdbApiKeys"), "tmdbApiKeys");
    }

    #[test]
    fn min_qualities_derived_view() {
        let json_raw = Config::from_merged(&merged(json!({ "minQualitiesRaw": r#"{"movie":"1080p"}"# })));
        assert_eq!(json_raw.min_qualities, Some(json!({ "movie": "1080p" })));

        let plain = Config::from_merged(&merged(json!({ "minQualitiesRaw": "720p" })));
        assert_eq!(plain.min_qualities, Some(json!({ "default": "720p" })));

        let codecs = Config::from_merged(&merged(json!({ "excludeCodecsRaw": "x265" })));
        assert_eq!(codecs.exclude_codecs, None);
    }

    #[test]
    fn unknown_keys_preserved() {
        let config = Config::from_merged(&merged(json!({ "futureSetting": { "a": 1 } })));
        assert_eq!(config.extra.get("futureSetting"), Some(&json!({ "a": 1 })));
        assert_eq!(config.to_document()["futureSetting"], json!({ "a": 1 }));
    }

    #[test]
    fn port_accepts_numeric_strings() {
        assert_eq!(Config::from_merged(&merged(json!({ "port": "9999" }))).port, 9999);
        assert_eq!(Config::from_merged(&merged(json!({ "port": 70000 }))).port, DEFAULT_PORT);
    }

    #[test]
    fn env_mirror_covers_flags_and_keys() {
        let config = Config::from_merged(&merged(json!({
            "tmdbApiKeys": ["first", "second"],
            "febboxCookies": ["c1", "c2"],
            "enableVidzeeProvider": false,
        })));
        let vars: BTreeMap<String, Option<String>> = config.env_mirror().into_iter().collect();
        assert_eq!(vars["TMDB_API_KEY"].as_deref(), Some("first"));
        assert_eq!(vars["FEBBOX_COOKIES"].as_deref(), Some("c1,c2"));
        assert_eq!(vars["ENABLE_VIDZEE_PROVIDER"].as_deref(), Some("false"));
        assert_eq!(vars["ENABLE_SHOWBOX_PROVIDER"].as_deref(), Some("true"));
        assert_eq!(vars["DEFAULT_REGION"], None);
        assert_eq!(vars["XPRIME_PROXY_URL"], None);
    }

    #[test]
    fn flag_key_naming() {
        assert_eq!(provider_flag_key("4khdhub"), "enable4khdhubProvider");
        assert_eq!(provider_flag_key("mp4hydra"), "enableMp4hydraProvider");
        assert_eq!(provider_env_key("4khdhub"), "ENABLE_4KHDHUB_PROVIDER");
    }
}
