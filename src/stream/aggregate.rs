//! Concurrent fan-out across enabled providers.
//!
//! [`AggregationEngine::fetch_all`] calls every enabled provider at once and
//! waits for all of them. Each call is isolated: an error, a panic, a
//! timeout, or a provider that failed to load all become an empty
//! contribution and a log line, never a failure of the aggregate call.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::cookie::{CookieRotator, CookieStats};

use super::provider::{CallContext, FetchContext, RawStream, StreamCandidate};
use super::registry::{panic_message, ProviderDescriptor, ProviderRegistry};

/// Why one provider contributed nothing.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("provider unavailable")]
    Unavailable,

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Fetch(#[from] anyhow::Error),
}

/// Runs aggregate fetches against a registry.
#[derive(Debug, Clone, Default)]
pub struct AggregationEngine {
    rotator: Arc<CookieRotator>,
    timeout_override: Option<Duration>,
}

impl AggregationEngine {
    #[must_use]
    pub fn new(rotator: Arc<CookieRotator>) -> Self {
        Self {
            rotator,
            timeout_override: None,
        }
    }

    /// Use a fixed per-provider deadline instead of the configured one.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_override = Some(timeout);
        self
    }

    pub fn rotator(&self) -> &Arc<CookieRotator> {
        &self.rotator
    }

    /// Last credential pick made by any provider.
    pub fn cookie_stats(&self) -> Option<CookieStats> {
        self.rotator.stats()
    }

    /// Fetch from every enabled provider and merge the results.
    ///
    /// Always returns a list, possibly empty. Results are concatenated in
    /// registry order, not completion order.
    pub async fn fetch_all(&self, ctx: &FetchContext, registry: &ProviderRegistry) -> Vec<StreamCandidate> {
        if let Err(e) = ctx.validate() {
            warn!(media_id = %ctx.media_id, "Skipping all providers: {e}");
            return Vec::new();
        }

        // One snapshot for the whole call, even if config reloads meanwhile.
        let config = Arc::clone(registry.config());
        let call = CallContext::new(Arc::clone(&config), Arc::clone(&self.rotator));
        let timeout = self
            .timeout_override
            .unwrap_or_else(|| Duration::from_millis(config.provider_timeout_ms));

        let tasks: Vec<_> = registry
            .enabled()
            .map(|descriptor| self.run_one(descriptor, ctx, &call, timeout))
            .collect();
        debug!(providers = tasks.len(), media_id = %ctx.media_id, "Fanning out");

        let started = Instant::now();
        let per_provider = futures::future::join_all(tasks).await;
        let merged: Vec<StreamCandidate> = per_provider.into_iter().flatten().collect();

        info!(
            media_id = %ctx.media_id,
            count = merged.len(),
            elapsed_ms = elapsed_ms(started),
            "Aggregate fetch complete"
        );
        merged
    }

    async fn run_one(
        &self,
        descriptor: &ProviderDescriptor,
        ctx: &FetchContext,
        call: &CallContext,
        timeout: Duration,
    ) -> Vec<StreamCandidate> {
        let name = descriptor.name();
        let started = Instant::now();

        match Self::invoke(descriptor, ctx, call, timeout).await {
            Ok(raw) => {
                let candidates: Vec<StreamCandidate> = raw
                    .into_iter()
                    .filter_map(|stream| StreamCandidate::from_raw(stream, name))
                    .collect();
                info!(
                    provider = name,
                    count = candidates.len(),
                    elapsed_ms = elapsed_ms(started),
                    "Provider fetch complete"
                );
                candidates
            }
            Err(ProviderError::Unavailable) => {
                debug!(provider = name, "Provider unavailable, contributing nothing");
                Vec::new()
            }
            Err(e) => {
                error!(
                    provider = name,
                    elapsed_ms = elapsed_ms(started),
                    "Provider fetch error: {e:#}"
                );
                Vec::new()
            }
        }
    }

    async fn invoke(
        descriptor: &ProviderDescriptor,
        ctx: &FetchContext,
        call: &CallContext,
        timeout: Duration,
    ) -> Result<Vec<RawStream>, ProviderError> {
        let provider = descriptor.provider().ok_or(ProviderError::Unavailable)?;
        let fetch = AssertUnwindSafe(provider.fetch(ctx, call)).catch_unwind();

        match tokio::time::timeout(timeout, fetch).await {
            Err(_) => Err(ProviderError::Timeout(timeout)),
            Ok(Err(panic)) => Err(ProviderError::Panicked(panic_message(panic.as_ref()))),
            Ok(Ok(result)) => Ok(result?),
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
