//! Environment-variable surfaces.
//!
//! The store reads its environment layer from, and mirrors resolved values
//! back into, an [`EnvSurface`]. [`ProcessEnv`] is the real process
//! environment; [`MemoryEnv`] keeps everything in a map for tests and for
//! embedding several stores in one process.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

/// Read/write access to a flat `KEY=value` namespace.
pub trait EnvSurface: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    /// Every variable currently set.
    fn vars(&self) -> Vec<(String, String)>;

    fn set(&self, key: &str, value: &str);

    fn remove(&self, key: &str);
}

/// The process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnv;

impl EnvSurface for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }

    fn vars(&self) -> Vec<(String, String)> {
        std::env::vars().collect()
    }

    fn set(&self, key: &str, value: &str) {
        std::env::set_var(key, value);
    }

    fn remove(&self, key: &str) {
        std::env::remove_var(key);
    }
}

/// In-memory environment.
#[derive(Debug, Default)]
pub struct MemoryEnv {
    vars: RwLock<BTreeMap<String, String>>,
}

impl MemoryEnv {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            vars: RwLock::new(vars),
        }
    }
}

impl EnvSurface for MemoryEnv {
    fn get(&self, key: &str) -> Option<String> {
        self.vars
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn vars(&self) -> Vec<(String, String)> {
        self.vars
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn set(&self, key: &str, value: &str) {
        self.vars
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.vars
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_env_roundtrip() {
        let env = MemoryEnv::from_pairs([("A", "1")]);
        assert_eq!(env.get("A").as_deref(), Some("1"));
        env.set("B", "2");
        env.remove("A");
        assert_eq!(env.vars(), vec![("B".to_string(), "2".to_string())]);
    }
}
