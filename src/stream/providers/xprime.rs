//! Xprime provider
//!
//! Xprime looks titles up by name and year rather than by id, so each fetch
//! first resolves the TMDB id through [`crate::tmdb`]. Stream sizes come from
//! HEAD requests and are memoized per URL unless caching is disabled.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::http_client::AcceleratedClient;
use crate::stream::provider::{
    CallContext, FetchContext, RawStream, StreamProvider, UNKNOWN_SIZE,
};
use crate::tmdb::{self, TitleInfo};

const API_BASE: &str = "https://backend.xprime.tv/primebox";
const MAX_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const SIZE_TIMEOUT: Duration = Duration::from_secs(5);
const PLAYLIST_SIZE: &str = "Playlist (size N/A)";

#[derive(Debug, Default, Deserialize)]
struct PrimeboxItem {
    error: Option<Value>,
    /// Quality label to stream URL. Ordered so output is deterministic.
    streams: Option<BTreeMap<String, Value>>,
}

pub struct XprimeProvider {
    client: AcceleratedClient,
    sizes: Mutex<HashMap<String, String>>,
}

impl XprimeProvider {
    pub fn new(client: AcceleratedClient) -> Self {
        Self {
            client,
            sizes: Mutex::new(HashMap::new()),
        }
    }

    fn primebox_url(info: &TitleInfo, ctx: &FetchContext) -> String {
        let mut url = format!(
            "{API_BASE}?name={}&year={year}&fallback_year={year}",
            urlencoding::encode(&info.title),
            year = info.year
        );
        if let Some((season, episode)) = ctx.episode_coordinates() {
            url.push_str(&format!("&season={season}&episode={episode}"));
        }
        url
    }

    async fn fetch_with_retry(&self, url: &str) -> Result<Value> {
        let mut attempt = 1;
        loop {
            match self.client.get_json::<Value>(url, &[], REQUEST_TIMEOUT).await {
                Ok(payload) => return Ok(payload),
                Err(e) if attempt < MAX_ATTEMPTS => {
                    let delay = RETRY_BASE_DELAY * 2u32.pow(attempt - 1);
                    debug!(attempt, ?delay, "Xprime request failed, retrying: {e:#}");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.context(format!("Xprime gave up after {MAX_ATTEMPTS} attempts"))),
            }
        }
    }

    async fn stream_size(&self, url: &str, use_cache: bool) -> String {
        if use_cache {
            let cached = self
                .sizes
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(url)
                .cloned();
            if let Some(size) = cached {
                return size;
            }
        }

        let size = if url.to_lowercase().contains(".m3u8") {
            PLAYLIST_SIZE.to_string()
        } else {
            self.client
                .content_length(url, SIZE_TIMEOUT)
                .await
                .map_or_else(|| UNKNOWN_SIZE.to_string(), format_size)
        };

        if use_cache {
            self.sizes
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(url.to_string(), size.clone());
        }
        size
    }
}

#[async_trait]
impl StreamProvider for XprimeProvider {
    fn name(&self) -> &str {
        "xprime"
    }

    async fn fetch(&self, ctx: &FetchContext, call: &CallContext) -> Result<Vec<RawStream>> {
        ctx.validate()?;
        let Some(api_key) = tmdb::choose_key(&call.config().tmdb_api_keys) else {
            warn!("No TMDB API key configured, skipping Xprime");
            return Ok(Vec::new());
        };

        let info = tmdb::lookup(&self.client, ctx.media_type, &ctx.media_id, api_key).await?;
        let url = Self::primebox_url(&info, ctx);
        info!(title = %info.title, year = info.year, "Querying Xprime");

        let payload = self.fetch_with_retry(&url).await?;
        let mut streams = streams_from_payload(payload, &info.title, ctx)?;

        let use_cache = !call.config().disable_cache;
        let sizes = futures::future::join_all(
            streams
                .iter()
                .map(|s| self.stream_size(s.url.as_deref().unwrap_or_default(), use_cache)),
        )
        .await;
        for (stream, size) in streams.iter_mut().zip(sizes) {
            stream.size = Some(size);
        }

        info!(count = streams.len(), "Xprime streams collected");
        Ok(streams)
    }
}

fn streams_from_payload(payload: Value, title: &str, ctx: &FetchContext) -> Result<Vec<RawStream>> {
    let items: Vec<PrimeboxItem> = match payload {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        Value::Object(_) => vec![serde_json::from_value(payload)?],
        other => return Err(anyhow!("unexpected Xprime payload: {other}")),
    };

    let episode_tag = ctx
        .episode_coordinates()
        .map(|(season, episode)| format!("S{season:02}E{episode:02} "))
        .unwrap_or_default();

    let streams = items
        .into_iter()
        .filter(|item| item.error.as_ref().map_or(true, Value::is_null))
        .filter_map(|item| item.streams)
        .flatten()
        .filter_map(|(quality, url)| match url {
            Value::String(url) if !url.is_empty() => Some(
                RawStream::new(format!("{title} - {episode_tag}{quality}"), url)
                    .with_quality(quality)
                    .with_provider("Xprime.tv"),
            ),
            _ => None,
        })
        .collect();
    Ok(streams)
}

/// Human-readable byte count with two decimals (`1.50 GB`).
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    #[allow(clippy::cast_precision_loss)]
    let scaled = |unit: u64| bytes as f64 / unit as f64;
    match bytes {
        b if b < KB => format!("{b} B"),
        b if b < MB => format!("{:.2} KB", scaled(KB)),
        b if b < GB => format!("{:.2} MB", scaled(MB)),
        _ => format!("{:.2} GB", scaled(GB)),
    }
}
