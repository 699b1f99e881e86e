//! `streamgate` - Provider aggregation and configuration engine
//!
//! # Features
//!
//! - **Layered configuration**: defaults, environment and a persisted JSON
//!   override document, hot-patchable at runtime
//! - **Provider registry**: lazily constructed adapters, toggled per provider
//! - **Aggregation**: concurrent fan-out with per-provider isolation
//! - **Credential rotation**: uniform random choice over a cookie pool
//! - **Quality normalization**: free-form labels mapped onto a fixed ladder
//!
//! # Example
//!
//! ```rust,no_run
//! use streamgate::{ConfigStore, FetchContext, StreamService};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let service = StreamService::with_builtin_providers(ConfigStore::from_process_env())?;
//!     for stream in service.fetch_streams(&FetchContext::movie("603")).await {
//!         println!("{} [{}] {}", stream.provider, stream.quality, stream.url);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod cookie;
pub mod http_client;
pub mod quality;
pub mod service;
pub mod stream;
pub mod tmdb;

pub use config::{Config, ConfigError, ConfigStore, EnvSurface, MemoryEnv, ProcessEnv};
pub use cookie::{CookieRotator, CookieStats, SelectedCookie};
pub use http_client::AcceleratedClient;
pub use quality::{normalize as normalize_quality, Quality};
pub use service::StreamService;
pub use stream::{
    AggregationEngine, CallContext, FetchContext, MediaType, ProviderCatalog, ProviderRegistry,
    ProviderStatus, RawStream, StreamCandidate, StreamProvider,
};

/// Version of streamgate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
