//! VidZee provider
//!
//! VidZee exposes ten numbered mirror servers behind one JSON endpoint. All
//! servers are queried at once; a server that fails or times out simply
//! contributes nothing.

use std::sync::LazyLock;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::http_client::AcceleratedClient;
use crate::stream::provider::{CallContext, FetchContext, RawStream, StreamProvider, UNKNOWN_SIZE};

const API_BASE: &str = "https://player.vidzee.wtf/api/server";
const EMBED_BASE: &str = "https://player.vidzee.wtf/embed/movie";
const PLAYBACK_REFERER: &str = "https://core.vidzee.wtf/";
const SERVERS: std::ops::RangeInclusive<u8> = 1..=10;
const SERVER_TIMEOUT: Duration = Duration::from_secs(7);
/// Label used when a source has no recognizable resolution.
const BASELINE_QUALITY: &str = "720p";

static NUMERIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+$").expect("static regex"));
static RESOLUTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{3,4}p").expect("static regex"));

#[derive(Debug, Clone, Default, Deserialize)]
struct SourceItem {
    name: Option<Value>,
    #[serde(rename = "type")]
    kind: Option<Value>,
    link: Option<String>,
    language: Option<String>,
    lang: Option<String>,
}

pub struct VidZeeProvider {
    client: AcceleratedClient,
}

impl VidZeeProvider {
    pub fn new(client: AcceleratedClient) -> Self {
        Self { client }
    }

    fn server_url(ctx: &FetchContext, server: u8) -> String {
        let mut url = format!(
            "{API_BASE}?id={}&sr={server}",
            urlencoding::encode(&ctx.media_id)
        );
        if let Some((season, episode)) = ctx.episode_coordinates() {
            url.push_str(&format!("&ss={season}&ep={episode}"));
        }
        url
    }

    async fn fetch_server(&self, ctx: &FetchContext, server: u8) -> Vec<RawStream> {
        let url = Self::server_url(ctx, server);
        let referer = format!("{EMBED_BASE}/{}", ctx.media_id);
        debug!(server, url = %url, "Fetching VidZee server");

        match self
            .client
            .get_json::<Value>(&url, &[("Referer", referer.as_str())], SERVER_TIMEOUT)
            .await
        {
            Ok(payload) => {
                let streams = streams_from_payload(payload, server);
                debug!(server, count = streams.len(), "VidZee server answered");
                streams
            }
            Err(e) => {
                warn!(server, "VidZee server failed: {e:#}");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl StreamProvider for VidZeeProvider {
    fn name(&self) -> &str {
        "vidzee"
    }

    async fn fetch(&self, ctx: &FetchContext, _call: &CallContext) -> Result<Vec<RawStream>> {
        ctx.validate()?;

        let per_server =
            futures::future::join_all(SERVERS.map(|server| self.fetch_server(ctx, server))).await;
        let streams: Vec<RawStream> = per_server.into_iter().flatten().collect();

        info!(media_id = %ctx.media_id, count = streams.len(), "VidZee streams collected");
        Ok(streams)
    }
}

/// Sources in a server payload: either a `url` array or a single `link` object.
fn sources(payload: Value) -> Vec<SourceItem> {
    match payload {
        Value::Object(mut map) => match map.remove("url") {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| serde_json::from_value(item).ok())
                .collect(),
            _ if map.get("link").is_some_and(Value::is_string) => {
                serde_json::from_value(Value::Object(map)).into_iter().collect()
            }
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

fn quality_label(item: &SourceItem) -> String {
    let label = [&item.name, &item.kind]
        .into_iter()
        .flatten()
        .find_map(|value| match value {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .unwrap_or_default();

    let label = if NUMERIC.is_match(&label) {
        format!("{label}p")
    } else {
        label
    };
    if RESOLUTION.is_match(&label.to_lowercase()) {
        label
    } else {
        BASELINE_QUALITY.to_string()
    }
}

fn streams_from_payload(payload: Value, server: u8) -> Vec<RawStream> {
    sources(payload)
        .into_iter()
        .filter_map(|item| {
            let link = item.link.clone().filter(|l| !l.is_empty())?;
            let quality = quality_label(&item);
            let mut stream = RawStream::new(format!("VidZee S{server} - {quality}"), link)
                .with_quality(quality)
                .with_provider("VidZee")
                .with_header("Referer", PLAYBACK_REFERER);
            stream.language = item.language.or(item.lang);
            stream.size = Some(UNKNOWN_SIZE.to_string());
            Some(stream)
        })
        .collect()
}
