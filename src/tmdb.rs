//! Title and year lookup against TMDB.

use std::time::Duration;

use anyhow::{anyhow, Result};
use rand::seq::SliceRandom;
use serde::Deserialize;
use tracing::debug;

use crate::http_client::AcceleratedClient;
use crate::stream::provider::MediaType;

const TMDB_API_BASE: &str = "https://api.themoviedb.org/3";
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Display title and release year of a TMDB entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleInfo {
    pub title: String,
    pub year: u16,
}

#[derive(Debug, Deserialize)]
struct TmdbDetails {
    title: Option<String>,
    name: Option<String>,
    release_date: Option<String>,
    first_air_date: Option<String>,
}

impl TmdbDetails {
    fn into_title_info(self) -> Option<TitleInfo> {
        let title = self.title.or(self.name).filter(|t| !t.trim().is_empty())?;
        let year = self
            .release_date
            .or(self.first_air_date)
            .as_deref()
            .and_then(|date| date.get(..4))
            .and_then(|year| year.parse().ok())?;
        Some(TitleInfo { title, year })
    }
}

/// Pick one key uniformly from the configured pool.
pub fn choose_key(keys: &[String]) -> Option<&str> {
    keys.choose(&mut rand::thread_rng()).map(String::as_str)
}

/// Details URL for a TMDB id.
#[must_use]
pub fn details_url(media_type: MediaType, tmdb_id: &str, api_key: &str) -> String {
    format!(
        "{TMDB_API_BASE}/{}/{}?api_key={}",
        media_type.tmdb_kind(),
        urlencoding::encode(tmdb_id),
        urlencoding::encode(api_key)
    )
}

/// Look up the title and year of `tmdb_id` using `api_key`.
pub async fn lookup(
    client: &AcceleratedClient,
    media_type: MediaType,
    tmdb_id: &str,
    api_key: &str,
) -> Result<TitleInfo> {
    let url = details_url(media_type, tmdb_id, api_key);
    let details: TmdbDetails = client.get_json(&url, &[], LOOKUP_TIMEOUT).await?;
    let info = details
        .into_title_info()
        .ok_or_else(|| anyhow!("TMDB entry {tmdb_id} has no title or release date"))?;
    debug!(tmdb_id, title = %info.title, year = info.year, "TMDB lookup");
    Ok(info)
}
