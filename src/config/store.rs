//! Live configuration store with patch-and-reload.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};

use super::env::{EnvSurface, ProcessEnv};
use super::layers::{
    default_override_path, defaults_layer, env_layer, merge_into, read_override, write_override,
    Layer,
};
use super::{canonical_key, Config, ConfigError, CONFIG_SCHEMA_VERSION};

/// Owns the live [`Config`] snapshot.
///
/// Readers take an `Arc<Config>` via [`snapshot`](Self::snapshot) and keep
/// it for as long as they need a stable view. Reloads and patches build a
/// complete replacement and swap the pointer, so a reader never observes a
/// half-merged state. Writers are serialized.
pub struct ConfigStore {
    override_path: PathBuf,
    env: Arc<dyn EnvSurface>,
    /// Environment layer as it was when the store opened, before any mirroring.
    env_layer: Layer,
    current: RwLock<Arc<Config>>,
    writer: Mutex<()>,
}

impl ConfigStore {
    /// Open a store over `override_path`, reading the environment layer from `env`.
    pub fn open(override_path: impl Into<PathBuf>, env: Arc<dyn EnvSurface>) -> Self {
        let env_layer = env_layer(env.as_ref());
        let mut store = Self {
            override_path: override_path.into(),
            env,
            env_layer,
            current: RwLock::new(Arc::new(Config::default())),
            writer: Mutex::new(()),
        };
        let initial = store.load();
        *store
            .current
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(initial);
        info!(path = %store.override_path.display(), "Configuration loaded");
        store
    }

    /// Open against the real process environment and the default document location.
    pub fn from_process_env() -> Self {
        let env: Arc<dyn EnvSurface> = Arc::new(ProcessEnv);
        let path = default_override_path(env.as_ref());
        Self::open(path, env)
    }

    pub fn override_path(&self) -> &Path {
        &self.override_path
    }

    /// Recompute the merged configuration from all layers.
    ///
    /// A malformed override document is logged and ignored. The result is
    /// mirrored into the environment surface before returning. The live
    /// snapshot is not touched; see [`reload`](Self::reload).
    pub fn load(&self) -> Config {
        let mut merged = defaults_layer();
        merge_into(&mut merged, &self.env_layer);
        match read_override(&self.override_path) {
            Ok(document) => merge_into(&mut merged, &document),
            Err(e) => warn!("Ignoring override document: {e}"),
        }

        let config = Config::from_merged(&merged);
        self.mirror(&config);
        config
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<Config> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Re-read every layer and swap in the result.
    pub fn reload(&self) -> Arc<Config> {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        self.swap(self.load())
    }

    /// Merge `partial` into the override document, persist it, and reload.
    ///
    /// Keys set to `null` are removed from the document. On a persistence
    /// error the live snapshot is left unchanged.
    pub fn try_patch(&self, partial: &Map<String, Value>) -> Result<Arc<Config>, ConfigError> {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        let existing = read_override(&self.override_path).unwrap_or_else(|e| {
            warn!("Existing override document unreadable, starting fresh: {e}");
            Map::new()
        });
        let mut document: Map<String, Value> = existing
            .into_iter()
            .map(|(key, value)| (canonical_key(&key).into_owned(), value))
            .collect();
        for (key, value) in partial {
            document.insert(canonical_key(key).into_owned(), value.clone());
        }
        if document.get("configVersion").map_or(true, Value::is_null) {
            document.insert("configVersion".into(), json!(CONFIG_SCHEMA_VERSION));
        }
        document.retain(|_, value| !value.is_null());

        write_override(&self.override_path, &document)?;
        debug!(keys = partial.len(), "Override document written");
        Ok(self.swap(self.load()))
    }

    /// [`try_patch`](Self::try_patch) reporting only success.
    pub fn patch(&self, partial: &Map<String, Value>) -> bool {
        match self.try_patch(partial) {
            Ok(_) => true,
            Err(e) => {
                error!("Failed to persist configuration patch: {e}");
                false
            }
        }
    }

    fn swap(&self, config: Config) -> Arc<Config> {
        let config = Arc::new(config);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&config);
        config
    }

    fn mirror(&self, config: &Config) {
        for (key, value) in config.env_mirror() {
            match value {
                Some(value) => self.env.set(&key, &value),
                None => self.env.remove(&key),
            }
        }
    }
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigStore")
            .field("override_path", &self.override_path)
            .field("current", &self.snapshot())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::env::MemoryEnv;
    use crate::config::layers::OVERRIDE_FILE_NAME;

    fn patch_of(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("patch must be an object"),
        }
    }

    fn store_with(env: MemoryEnv) -> (tempfile::TempDir, Arc<MemoryEnv>, ConfigStore) {
        let dir = tempfile::tempdir().unwrap();
        let env = Arc::new(env);
        let store = ConfigStore::open(dir.path().join(OVERRIDE_FILE_NAME), env.clone());
        (dir, env, store)
    }

    #[test]
    fn override_wins_over_env() {
        let (_dir, _env, store) = store_with(MemoryEnv::from_pairs([("API_PORT", "9000")]));
        assert_eq!(store.snapshot().port, 9000);

        assert!(store.patch(&patch_of(json!({ "port": 9100 }))));
        assert_eq!(store.snapshot().port, 9100);
    }

    #[test]
    fn null_patch_falls_back_to_env_layer() {
        let (_dir, _env, store) =
            store_with(MemoryEnv::from_pairs([("ENABLE_VIDZEE_PROVIDER", "true")]));
        assert!(store.patch(&patch_of(json!({ "enableVidzeeProvider": false }))));
        assert!(!store.snapshot().provider_enabled("vidzee"));

        assert!(store.patch(&patch_of(json!({ "enableVidzeeProvider": null }))));
        assert!(store.snapshot().provider_enabled("vidzee"));

        let document = read_override(store.override_path()).unwrap();
        assert!(!document.contains_key("enableVidzeeProvider"));
    }

    #[test]
    fn flag_patches_fold_key_case() {
        let (dir, _env, store) = store_with(MemoryEnv::new());
        std::fs::write(
            dir.path().join(OVERRIDE_FILE_NAME),
            r#"{ "enableXPRIMEProvider": false }"#,
        )
        .unwrap();
        assert!(!store.reload().provider_enabled("xprime"));

        assert!(store.patch(&patch_of(json!({ "enableVidZeeProvider": false }))));
        assert!(!store.snapshot().provider_enabled("vidzee"));
        let document = read_override(store.override_path()).unwrap();
        assert_eq!(document["enableVidzeeProvider"], json!(false));
        assert_eq!(document["enableXprimeProvider"], json!(false));
        assert!(!document.contains_key("enableVidZeeProvider"));

        assert!(store.patch(&patch_of(json!({ "enableXprimeProvider": null }))));
        assert!(store.snapshot().provider_enabled("xprime"));
        assert!(!read_override(store.override_path()).unwrap().contains_key("enableXprimeProvider"));
    }

    #[test]
    fn null_patch_falls_back_to_default_despite_mirroring() {
        let (_dir, env, store) = store_with(MemoryEnv::new());
        assert!(store.patch(&patch_of(json!({ "disableCache": true }))));
        assert_eq!(env.get("DISABLE_CACHE").as_deref(), Some("true"));

        assert!(store.patch(&patch_of(json!({ "disableCache": null }))));
        assert!(!store.snapshot().disable_cache);
        assert_eq!(env.get("DISABLE_CACHE").as_deref(), Some("false"));
    }

    #[test]
    fn patch_stamps_schema_version() {
        let (_dir, _env, store) = store_with(MemoryEnv::new());
        assert!(store.patch(&patch_of(json!({ "defaultRegion": "eu" }))));
        let document = read_override(store.override_path()).unwrap();
        assert_eq!(document["configVersion"], json!(CONFIG_SCHEMA_VERSION));
        assert_eq!(document["defaultRegion"], json!("eu"));
    }

    #[test]
    fn malformed_document_falls_back_to_lower_layers() {
        let (dir, _env, _store) = store_with(MemoryEnv::new());
        let path = dir.path().join(OVERRIDE_FILE_NAME);
        std::fs::write(&path, "{{ definitely not json").unwrap();

        let store = ConfigStore::open(&path, Arc::new(MemoryEnv::from_pairs([("API_PORT", "7000")])));
        assert_eq!(store.snapshot().port, 7000);
    }

    #[test]
    fn failed_write_keeps_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        // a directory where the document should be makes the rename fail
        let path = dir.path().join(OVERRIDE_FILE_NAME);
        std::fs::create_dir_all(path.join("occupied")).unwrap();
        let store = ConfigStore::open(&path, Arc::new(MemoryEnv::new()));
        let before = store.snapshot();

        assert!(!store.patch(&patch_of(json!({ "port": 1 }))));
        assert_eq!(*store.snapshot(), *before);
    }

    #[test]
    fn load_mirrors_into_env() {
        let (_dir, env, store) = store_with(MemoryEnv::from_pairs([
            ("TMDB_API_KEYS", r#"["k1","k2"]"#),
            ("XPRIME_PROXY_URL", "http://old-proxy"),
        ]));
        assert_eq!(store.snapshot().tmdb_api_keys, vec!["k1", "k2"]);
        assert_eq!(env.get("TMDB_API_KEY").as_deref(), Some("k1"));
        assert_eq!(env.get("ENABLE_XPRIME_PROVIDER").as_deref(), Some("true"));
        assert!(env.get("XPRIME_PROXY_URL").is_none());
    }

    #[test]
    fn snapshots_are_stable_across_patches() {
        let (_dir, _env, store) = store_with(MemoryEnv::new());
        let held = store.snapshot();
        assert!(store.patch(&patch_of(json!({ "port": 4242 }))));
        assert_eq!(held.port, crate::config::DEFAULT_PORT);
        assert_eq!(store.snapshot().port, 4242);
    }
}
