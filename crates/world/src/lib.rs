//! Region and column model plus the tiered region provider.
//!
//! # Invariants
//! - Exactly one [`Region`] exists per coordinate, owned by its [`Column`] and
//!   indexed for constant-time lookup.
//! - A region is unloaded only when its ticket set is empty; a column only when
//!   it owns no regions.
//! - A region's achieved [`strata_common::Requirement`] never decreases.
//! - Store reads may run on worker threads; their results are applied only on
//!   the thread that owns the provider.

mod collab;
mod io;
mod memory;
mod provider;
mod region;

pub use collab::{
    FlatGenerator, Generator, LightingEngine, NullLighting, ProviderListener, Store, StoreError,
};
pub use memory::MemoryStore;
pub use provider::{
    AsyncFetch, Completion, FetchTarget, GcReport, ProviderConfig, ProviderConfigError,
    ProviderStats, RegionProvider, RequestId,
};
pub use region::{
    Column, ColumnPayload, ColumnRecord, Region, RegionPayload, RegionRecord, Ticket,
};

pub fn crate_info() -> &'static str {
    "strata-world v0.1.0"
}
