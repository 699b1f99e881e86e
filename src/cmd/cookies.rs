use anyhow::Result;

use streamgate::{ConfigStore, CookieRotator};

pub fn cmd_cookies(store: &ConfigStore, pick: bool) -> Result<()> {
    let config = store.snapshot();
    let pool = &config.febbox_cookies;
    eprintln!("🍪 Credential pool: {} entries", pool.len());

    if !pick {
        return Ok(());
    }

    let rotator = CookieRotator::new();
    if rotator.select(pool).is_none() {
        eprintln!("No credentials configured");
        return Ok(());
    }
    if let Some(stats) = rotator.stats() {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    }
    Ok(())
}
