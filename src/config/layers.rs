//! The three configuration layers: built-in defaults, the environment, and
//! the persisted override document.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use super::env::EnvSurface;
use super::parse::{parse_cookies, parse_json_maybe, split_provider_list};
use super::{
    canonical_key, provider_flag_key, ConfigError, CONFIG_SCHEMA_VERSION, DEFAULT_PORT,
    DEFAULT_PROVIDER_TIMEOUT_MS, KNOWN_PROVIDERS,
};

/// File name of the override document.
pub const OVERRIDE_FILE_NAME: &str = "user-config.json";

/// Environment variable that pins the override document location.
pub const CONFIG_PATH_VAR: &str = "STREAMGATE_CONFIG";

static ENABLE_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ENABLE_([A-Z0-9]+)_PROVIDER$").expect("static regex"));

/// A flat mapping of setting names to values.
pub type Layer = Map<String, Value>;

/// Lowest-precedence layer.
pub fn defaults_layer() -> Layer {
    let mut layer = Map::new();
    layer.insert("configVersion".into(), json!(CONFIG_SCHEMA_VERSION));
    layer.insert("port".into(), json!(DEFAULT_PORT));
    layer.insert("defaultProviders".into(), json!([]));
    layer.insert("febboxCookies".into(), json!([]));
    for name in KNOWN_PROVIDERS {
        layer.insert(provider_flag_key(name), json!(true));
    }
    layer.insert("disableCache".into(), json!(false));
    layer.insert("enablePStreamApi".into(), json!(true));
    layer.insert("disableUrlValidation".into(), json!(false));
    layer.insert("disable4khdhubUrlValidation".into(), json!(false));
    layer.insert("providerTimeoutMs".into(), json!(DEFAULT_PROVIDER_TIMEOUT_MS));
    layer
}

/// Environment variables that map 1:1 onto a raw string setting.
const ENV_STRINGS: [(&str, &str); 7] = [
    ("MIN_QUALITIES", "minQualitiesRaw"),
    ("EXCLUDE_CODECS", "excludeCodecsRaw"),
    ("TMDB_API_KEY", "tmdbApiKey"),
    ("SHOWBOX_CACHE_DIR", "showboxCacheDir"),
    ("DISABLE_CACHE", "disableCache"),
    ("ENABLE_PSTREAM_API", "enablePStreamApi"),
    ("DISABLE_URL_VALIDATION", "disableUrlValidation"),
];

/// Middle layer, read from `env`. Only variables that are set contribute.
pub fn env_layer(env: &dyn EnvSurface) -> Layer {
    let mut layer = Map::new();
    let get = |key: &str| env.get(key).filter(|v| !v.trim().is_empty());

    if let Some(raw) = get("API_PORT") {
        match raw.trim().parse::<u16>() {
            Ok(port) => {
                layer.insert("port".into(), json!(port));
            }
            Err(_) => warn!(value = %raw, "Ignoring non-numeric API_PORT"),
        }
    }
    if let Some(region) = get("DEFAULT_REGION").or_else(|| get("FEBBOX_REGION")) {
        layer.insert("defaultRegion".into(), json!(region));
    }
    if let Some(raw) = get("DEFAULT_PROVIDERS") {
        layer.insert("defaultProviders".into(), json!(split_provider_list(&raw)));
    }
    if let Some(raw) = get("TMDB_API_KEYS") {
        let value = parse_json_maybe(&raw).unwrap_or(Value::String(raw));
        layer.insert("tmdbApiKeys".into(), value);
    }
    if let Some(raw) = get("FEBBOX_COOKIES") {
        layer.insert("febboxCookies".into(), json!(parse_cookies(&raw)));
    }
    if let Some(raw) = get("DISABLE_4KHDHUB_URL_VALIDATION") {
        layer.insert("disable4khdhubUrlValidation".into(), json!(raw));
    }
    if let Some(raw) = get("PROVIDER_TIMEOUT_MS") {
        layer.insert("providerTimeoutMs".into(), json!(raw));
    }
    for (var, key) in ENV_STRINGS {
        if let Some(raw) = get(var) {
            layer.insert(key.into(), json!(raw));
        }
    }

    for (var, value) in env.vars() {
        if let Some(caps) = ENABLE_VAR.captures(&var) {
            let name = caps[1].to_lowercase();
            layer.insert(provider_flag_key(&name), json!(value));
        }
    }

    debug!(keys = layer.len(), "Environment layer captured");
    layer
}

/// Highest-precedence layer.
///
/// A missing file is an empty layer. A file that cannot be read, is not
/// JSON, or is not a JSON object is an error.
pub fn read_override(path: &Path) -> Result<Layer, ConfigError> {
    if !path.exists() {
        return Ok(Map::new());
    }
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ConfigError::NotAMapping {
            path: path.to_path_buf(),
        }),
    }
}

/// Persist the override document, replacing the file atomically.
pub fn write_override(path: &Path, document: &Layer) -> Result<(), ConfigError> {
    let io_err = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let body = serde_json::to_string_pretty(document).map_err(ConfigError::Serialize)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, body).map_err(io_err)?;
    fs::rename(&tmp, path).map_err(io_err)
}

/// Shallow merge: every non-null key of `upper` replaces the one in `base`.
pub fn merge_into(base: &mut Layer, upper: &Layer) {
    for (key, value) in upper {
        if !value.is_null() {
            base.insert(canonical_key(key).into_owned(), value.clone());
        }
    }
}

/// Location of the override document.
///
/// `STREAMGATE_CONFIG` wins. Otherwise the per-user config directory is used,
/// unless only a legacy `./user-config.json` exists.
pub fn default_override_path(env: &dyn EnvSurface) -> PathBuf {
    if let Some(pinned) = env.get(CONFIG_PATH_VAR).filter(|p| !p.trim().is_empty()) {
        return PathBuf::from(pinned);
    }
    let primary = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("streamgate")
        .join(OVERRIDE_FILE_NAME);
    let legacy = PathBuf::from(OVERRIDE_FILE_NAME);
    if primary.exists() || !legacy.exists() {
        primary
    } else {
        legacy
    }
}
