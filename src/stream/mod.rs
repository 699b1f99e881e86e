//! Stream discovery across providers
//!
//! Providers implement [`StreamProvider`]; the [`ProviderRegistry`] decides
//! which ones are enabled for a config snapshot, and the
//! [`AggregationEngine`] fans a request out to all of them.

pub mod aggregate;
pub mod provider;
pub mod providers;
pub mod registry;

pub use aggregate::{AggregationEngine, ProviderError};
pub use provider::{
    CallContext, ContextError, FetchContext, MediaType, RawStream, StreamCandidate, StreamProvider,
    Subtitle,
};
pub use registry::{Availability, ProviderCatalog, ProviderDescriptor, ProviderRegistry, ProviderStatus};
