use anyhow::Result;

use streamgate::{ConfigStore, StreamService};

pub fn cmd_providers(store: ConfigStore, json: bool) -> Result<()> {
    let service = StreamService::with_builtin_providers(store)?;
    let providers = service.providers();

    if json {
        println!("{}", serde_json::to_string_pretty(&providers)?);
        return Ok(());
    }

    for provider in &providers {
        let mark = if provider.enabled { "✅" } else { "⛔" };
        println!("{mark} {}", provider.name);
    }
    Ok(())
}
