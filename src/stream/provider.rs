//! Stream provider trait and common types.
//!
//! A [`StreamProvider`] knows how to turn a [`FetchContext`] into playable
//! stream descriptions for one external content source. Providers return
//! loosely-shaped [`RawStream`]s; the aggregator turns those into
//! [`StreamCandidate`]s with a canonical quality and a non-empty provider tag.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Config;
use crate::cookie::{CookieRotator, SelectedCookie};
use crate::quality::{normalize, Quality};

/// Size label used when a provider does not report one.
pub const UNKNOWN_SIZE: &str = "Unknown size";

/// Kind of title being requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Series,
}

impl MediaType {
    /// Path segment TMDB-style APIs use for this kind (`movie` / `tv`).
    #[must_use]
    pub fn tmdb_kind(self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::Series => "tv",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaType::Movie => f.write_str("movie"),
            MediaType::Series => f.write_str("series"),
        }
    }
}

impl FromStr for MediaType {
    type Err = ContextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "movie" => Ok(MediaType::Movie),
            "series" | "tv" | "show" => Ok(MediaType::Series),
            other => Err(ContextError::UnknownMediaType(other.to_string())),
        }
    }
}

/// Reasons a [`FetchContext`] cannot be served.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("media id is empty")]
    MissingMediaId,

    #[error("series requests need both season and episode (season={season:?}, episode={episode:?})")]
    MissingEpisode {
        season: Option<u32>,
        episode: Option<u32>,
    },

    #[error("unknown media type: {0}")]
    UnknownMediaType(String),
}

/// What the caller is looking for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchContext {
    /// Canonical media identifier (a TMDB id for the bundled providers).
    pub media_id: String,
    pub media_type: MediaType,
    pub season: Option<u32>,
    pub episode: Option<u32>,
}

impl FetchContext {
    #[must_use]
    pub fn movie(media_id: impl Into<String>) -> Self {
        Self {
            media_id: media_id.into(),
            media_type: MediaType::Movie,
            season: None,
            episode: None,
        }
    }

    #[must_use]
    pub fn episode(media_id: impl Into<String>, season: u32, episode: u32) -> Self {
        Self {
            media_id: media_id.into(),
            media_type: MediaType::Series,
            season: Some(season),
            episode: Some(episode),
        }
    }

    /// Check the season/episode pairing.
    ///
    /// Series need both; movies ignore them.
    pub fn validate(&self) -> Result<(), ContextError> {
        if self.media_id.trim().is_empty() {
            return Err(ContextError::MissingMediaId);
        }
        if self.media_type == MediaType::Series && self.episode_coordinates().is_none() {
            return Err(ContextError::MissingEpisode {
                season: self.season,
                episode: self.episode,
            });
        }
        Ok(())
    }

    /// `(season, episode)` for a fully specified series request.
    #[must_use]
    pub fn episode_coordinates(&self) -> Option<(u32, u32)> {
        match (self.media_type, self.season, self.episode) {
            (MediaType::Series, Some(season), Some(episode)) => Some((season, episode)),
            _ => None,
        }
    }
}

/// A subtitle track attached to a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtitle {
    pub language: String,
    pub url: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// A stream as a provider reported it, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawStream {
    pub title: String,
    pub url: Option<String>,
    /// Provider-specific quality label (`"FHD"`, `"1080"`, `"Server 2"`).
    pub quality: Option<String>,
    pub language: Option<String>,
    pub provider: Option<String>,
    pub size: Option<String>,
    pub headers: Option<HashMap<String, String>>,
    #[serde(default)]
    pub subtitles: Vec<Subtitle>,
}

impl RawStream {
    #[must_use]
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: Some(url.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_quality(mut self, quality: impl Into<String>) -> Self {
        self.quality = Some(quality.into());
        self
    }

    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(HashMap::new)
            .insert(name.into(), value.into());
        self
    }
}

/// A normalized, playable candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamCandidate {
    pub title: String,
    /// Never empty.
    pub url: String,
    pub quality: Quality,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Never empty.
    pub provider: String,
    pub size: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitles: Option<Vec<Subtitle>>,
}

impl StreamCandidate {
    /// Normalize a raw stream, tagging it with `provider` when it has no tag.
    ///
    /// Returns `None` when the stream has no usable URL.
    #[must_use]
    pub fn from_raw(raw: RawStream, provider: &str) -> Option<Self> {
        let url = raw.url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty())?;
        let provider = raw
            .provider
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| provider.to_string());
        let title = if raw.title.trim().is_empty() {
            provider.clone()
        } else {
            raw.title
        };

        Some(Self {
            title,
            url,
            quality: normalize(raw.quality.as_deref().unwrap_or_default()),
            language: raw.language.filter(|l| !l.is_empty()),
            provider,
            size: raw
                .size
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| UNKNOWN_SIZE.to_string()),
            headers: raw.headers.filter(|h| !h.is_empty()),
            subtitles: Some(raw.subtitles).filter(|s| !s.is_empty()),
        })
    }
}

/// Per-call context handed to a provider.
///
/// Carries the configuration snapshot captured when the aggregate call
/// started, so every provider in one call sees the same settings.
#[derive(Debug, Clone)]
pub struct CallContext {
    config: Arc<Config>,
    rotator: Arc<CookieRotator>,
}

impl CallContext {
    #[must_use]
    pub fn new(config: Arc<Config>, rotator: Arc<CookieRotator>) -> Self {
        Self { config, rotator }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Draw a fresh credential from the configured pool.
    pub fn credential(&self) -> Option<SelectedCookie> {
        self.rotator.select(&self.config.febbox_cookies)
    }

    /// Record the quota a provider observed after a credentialed call.
    pub fn report_remaining_quota(&self, remaining_mb: f64) {
        self.rotator.record_remaining_quota(remaining_mb);
    }
}

/// Trait for stream source providers.
///
/// Implementors query one external site and return whatever streams it
/// offers for the context. Errors are fine to return: the aggregator
/// contains them and substitutes an empty contribution.
#[async_trait]
pub trait StreamProvider: Send + Sync {
    /// Short lowercase provider name (e.g., `"vidzee"`).
    fn name(&self) -> &str;

    /// Fetch streams for `ctx`.
    async fn fetch(&self, ctx: &FetchContext, call: &CallContext) -> Result<Vec<RawStream>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn series_requires_both_coordinates() {
        let mut ctx = FetchContext::episode("1399", 1, 2);
        assert!(ctx.validate().is_ok());
        assert_eq!(ctx.episode_coordinates(), Some((1, 2)));

        ctx.episode = None;
        assert_eq!(
            ctx.validate(),
            Err(ContextError::MissingEpisode {
                season: Some(1),
                episode: None
            })
        );
    }

    #[test]
    fn movie_ignores_coordinates() {
        let ctx = FetchContext::movie("603");
        assert!(ctx.validate().is_ok());
        assert!(ctx.episode_coordinates().is_none());
        assert_eq!(FetchContext::movie(" ").validate(), Err(ContextError::MissingMediaId));
    }

    #[test]
    fn media_type_parsing() {
        assert_eq!("tv".parse::<MediaType>().unwrap(), MediaType::Series);
        assert_eq!("Movie".parse::<MediaType>().unwrap(), MediaType::Movie);
        assert!("podcast".parse::<MediaType>().is_err());
        assert_eq!(MediaType::Series.tmdb_kind(), "tv");
    }

    #[test]
    fn candidate_defaults_provider_and_quality() {
        let raw = RawStream::new("Some Title", "https://cdn.example/video.m3u8").with_quality("FHD");
        let candidate = StreamCandidate::from_raw(raw, "vidzee").unwrap();
        assert_eq!(candidate.provider, "vidzee");
        assert_eq!(candidate.quality, Quality::P1080);
        assert_eq!(candidate.size, UNKNOWN_SIZE);
        assert!(candidate.subtitles.is_none());
    }

    #[test]
    fn candidate_keeps_own_provider_tag() {
        let raw = RawStream::new("t", "https://x").with_provider("VidZee");
        assert_eq!(StreamCandidate::from_raw(raw, "vidzee").unwrap().provider, "VidZee");
    }

    #[test]
    fn candidate_without_url_is_dropped() {
        assert!(StreamCandidate::from_raw(RawStream::default(), "p").is_none());
        let blank = RawStream::new("t", "   ");
        assert!(StreamCandidate::from_raw(blank, "p").is_none());
    }

    #[test]
    fn candidate_serializes_external_shape() {
        let raw = RawStream::new("t", "https://x")
            .with_quality("720")
            .with_header("Referer", "https://ref/");
        let json = serde_json::to_value(StreamCandidate::from_raw(raw, "p").unwrap()).unwrap();
        assert_eq!(json["quality"], "720p");
        assert_eq!(json["headers"]["Referer"], "https://ref/");
        assert!(json.get("language").is_none());
        assert!(json.get("subtitles").is_none());
    }

    #[test]
    fn call_context_draws_from_snapshot_pool() {
        let config = Config {
            febbox_cookies: vec!["only".to_string()],
            ..Config::default()
        };
        let rotator = Arc::new(CookieRotator::new());
        let call = CallContext::new(Arc::new(config), rotator.clone());
        let cookie = call.credential().unwrap();
        assert_eq!(cookie.value, "only");
        call.report_remaining_quota(42.0);
        assert_eq!(rotator.stats().unwrap().remaining_quota, Some(42.0));
    }
}
