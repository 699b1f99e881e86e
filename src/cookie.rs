//! Session credential rotation.
//!
//! Credential-gated providers draw one cookie per call from the configured
//! pool. Selection is uniform at random (never round-robin, never sticky), and
//! the most recent pick is recorded as anonymized [`CookieStats`] for
//! debugging quota exhaustion.

use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info};

/// Characters of a credential that may appear in stats.
pub const STATS_PREFIX_CHARS: usize = 16;

const ELLIPSIS: &str = "...";
const COOKIE_PREFIX: &str = "ui=";

/// A credential drawn from the pool for one provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedCookie {
    /// Credential value without the `ui=` marker.
    pub value: String,
    /// Position in the pool it was drawn from.
    pub index: usize,
}

impl SelectedCookie {
    /// Cookie header fragment with the `ui=` marker restored.
    #[must_use]
    pub fn header_value(&self) -> String {
        if self.value.starts_with(COOKIE_PREFIX) {
            self.value.clone()
        } else {
            format!("{COOKIE_PREFIX}{}", self.value)
        }
    }
}

/// Observational record of the last credential pick.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieStats {
    /// First [`STATS_PREFIX_CHARS`] characters of the credential plus `...`.
    pub selected_prefix: String,
    pub index: usize,
    pub pool_size: usize,
    /// Remaining quota in MB, when the provider surfaced one after its call.
    pub remaining_quota: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// Uniform random credential picker with anonymized last-pick stats.
#[derive(Debug, Default)]
pub struct CookieRotator {
    last: RwLock<Option<CookieStats>>,
}

impl CookieRotator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Draw one credential uniformly from `pool`.
    ///
    /// Returns `None` for an empty pool. The pool itself is never mutated.
    pub fn select(&self, pool: &[String]) -> Option<SelectedCookie> {
        self.select_with(pool, &mut rand::thread_rng())
    }

    /// [`select`](Self::select) with a caller-supplied RNG.
    pub fn select_with<R: Rng + ?Sized>(&self, pool: &[String], rng: &mut R) -> Option<SelectedCookie> {
        if pool.is_empty() {
            debug!("Credential pool empty, proceeding without cookie");
            return None;
        }

        let index = rng.gen_range(0..pool.len());
        let value = pool[index].clone();

        let stats = CookieStats {
            selected_prefix: anonymize(&value),
            index,
            pool_size: pool.len(),
            remaining_quota: None,
            timestamp: Utc::now(),
        };
        *self.last.write().unwrap_or_else(PoisonError::into_inner) = Some(stats);

        info!(index, pool_size = pool.len(), "Cookie random pick");
        Some(SelectedCookie { value, index })
    }

    /// Attach a post-call quota reading to the most recent pick.
    pub fn record_remaining_quota(&self, remaining_mb: f64) {
        let mut last = self.last.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(stats) = last.as_mut() {
            stats.remaining_quota = Some(remaining_mb);
        }
    }

    /// Stats of the most recent pick, if any pick happened yet.
    pub fn stats(&self) -> Option<CookieStats> {
        self.last.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Truncate a credential so stats never carry the usable value.
fn anonymize(value: &str) -> String {
    let prefix: String = value.chars().take(STATS_PREFIX_CHARS).collect();
    format!("{prefix}{ELLIPSIS}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn pool(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("credential-{i:02}-0123456789abcdef")).collect()
    }

    #[test]
    fn empty_pool_selects_nothing() {
        let rotator = CookieRotator::new();
        assert!(rotator.select(&[]).is_none());
        assert!(rotator.stats().is_none());
    }

    #[test]
    fn selection_is_roughly_uniform() {
        let rotator = CookieRotator::new();
        let pool = pool(4);
        let mut rng = StdRng::seed_from_u64(7);
        let mut counts = [0usize; 4];
        for _ in 0..20_000 {
            let picked = rotator.select_with(&pool, &mut rng).unwrap();
            assert_eq!(picked.value, pool[picked.index]);
            counts[picked.index] += 1;
        }
        // expected 5000 each; stddev ~61
        for count in counts {
            assert!((4500..5500).contains(&count), "skewed distribution: {counts:?}");
        }
    }

    #[test]
    fn stats_never_expose_full_credential() {
        let rotator = CookieRotator::new();
        let secret = "abcdefghijklmnopqrstuvwxyz0123456789".to_string();
        rotator.select(std::slice::from_ref(&secret)).unwrap();

        let stats = rotator.stats().unwrap();
        assert_eq!(stats.selected_prefix, "abcdefghijklmnop...");
        assert!(!stats.selected_prefix.contains(&secret));
        assert_eq!(stats.index, 0);
        assert_eq!(stats.pool_size, 1);
        assert!(stats.remaining_quota.is_none());
    }

    #[test]
    fn short_credentials_still_get_marker() {
        assert_eq!(anonymize("abc"), "abc...");
    }

    #[test]
    fn quota_attaches_to_last_pick() {
        let rotator = CookieRotator::new();
        rotator.record_remaining_quota(10.0);
        assert!(rotator.stats().is_none());

        rotator.select(&pool(2)).unwrap();
        rotator.record_remaining_quota(512.5);
        assert_eq!(rotator.stats().unwrap().remaining_quota, Some(512.5));

        // next pick starts without a reading
        rotator.select(&pool(2)).unwrap();
        assert!(rotator.stats().unwrap().remaining_quota.is_none());
    }

    #[test]
    fn poisoned_stats_lock_keeps_recording() {
        let rotator = CookieRotator::new();
        rotator.select(&pool(2)).unwrap();
        let poisoned = std::thread::scope(|s| {
            s.spawn(|| {
                let _guard = rotator.last.write().unwrap();
                panic!("writer died holding the lock");
            })
            .join()
        });
        assert!(poisoned.is_err());
        assert!(rotator.last.is_poisoned());

        rotator.record_remaining_quota(64.0);
        assert_eq!(rotator.stats().unwrap().remaining_quota, Some(64.0));
        rotator.select(&pool(2)).unwrap();
        let stats = rotator.stats().unwrap();
        assert_eq!(stats.pool_size, 2);
        assert!(stats.remaining_quota.is_none());
    }

    #[test]
    fn header_value_restores_marker() {
        let cookie = SelectedCookie { value: "token".into(), index: 0 };
        assert_eq!(cookie.header_value(), "ui=token");
        let prefixed = SelectedCookie { value: "ui=token".into(), index: 0 };
        assert_eq!(prefixed.header_value(), "ui=token");
    }

    #[test]
    fn stats_serialize_camel_case() {
        let rotator = CookieRotator::new();
        rotator.select(&pool(3)).unwrap();
        let json = serde_json::to_value(rotator.stats().unwrap()).unwrap();
        assert!(json.get("selectedPrefix").is_some());
        assert!(json.get("poolSize").is_some());
        assert!(json.get("remainingQuota").unwrap().is_null());
    }
}
