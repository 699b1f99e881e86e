use anyhow::{bail, Result};
use serde_json::{Map, Value};

use streamgate::ConfigStore;

pub fn cmd_config_show(store: &ConfigStore) -> Result<()> {
    eprintln!("📄 Override document: {}", store.override_path().display());
    println!("{}", serde_json::to_string_pretty(&*store.snapshot())?);
    Ok(())
}

pub fn cmd_config_set(store: &ConfigStore, key: &str, raw: &str) -> Result<()> {
    // Bare words are stored as strings
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    apply(store, key, value)?;
    eprintln!("✅ Set {key}");
    Ok(())
}

pub fn cmd_config_unset(store: &ConfigStore, key: &str) -> Result<()> {
    apply(store, key, Value::Null)?;
    eprintln!("✅ Unset {key}");
    Ok(())
}

fn apply(store: &ConfigStore, key: &str, value: Value) -> Result<()> {
    if key.trim().is_empty() {
        bail!("Config key must not be empty");
    }
    let mut partial = Map::new();
    partial.insert(key.to_string(), value);
    store.try_patch(&partial)?;
    Ok(())
}
