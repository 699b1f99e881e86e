use anyhow::{bail, Result};

use streamgate::{ConfigStore, FetchContext, MediaType, StreamService};

pub async fn cmd_streams(
    store: ConfigStore,
    media_id: String,
    media_type: MediaType,
    season: Option<u32>,
    episode: Option<u32>,
    json: bool,
) -> Result<()> {
    let ctx = FetchContext {
        media_id,
        media_type,
        season,
        episode,
    };
    if let Err(e) = ctx.validate() {
        bail!("Invalid request: {e}");
    }

    let service = StreamService::with_builtin_providers(store)?;
    eprintln!("🎬 Fetching {} {}", ctx.media_type, ctx.media_id);
    let streams = service.fetch_streams(&ctx).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&streams)?);
        return Ok(());
    }

    if streams.is_empty() {
        eprintln!("No streams found");
        return Ok(());
    }
    for stream in &streams {
        println!(
            "{:<6} {:<12} {:<14} {}",
            stream.quality, stream.provider, stream.size, stream.title
        );
        println!("       {}", stream.url);
    }
    eprintln!("\n✅ {} streams", streams.len());
    Ok(())
}
