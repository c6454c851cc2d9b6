//! Query/cache layer between `recdesk-api` and consumers (the CLI).
//!
//! - **[`QueryCache`]**: per `(endpoint, argument)` cache entries with
//!   subscriber tracking, request coalescing, polling, and refetch on focus,
//!   reconnect, mount, or argument change.
//! - **Endpoint definitions** ([`QueryDef`] / [`MutationDef`]): typed trait
//!   implementations that build requests, reshape responses and declare the
//!   [`Tag`]s they provide or invalidate.
//! - **[`EntityStore`]**: ordered, id-keyed normalized collections.
//! - **[`Desk`]**: lifecycle facade that wires transport, session, client,
//!   cache and the office resources ([`OfficeApi`]) together.

pub mod cache;
pub mod config;
pub mod desk;
pub mod endpoint;
pub mod entity;
pub mod error;
pub mod mutation;
pub mod resources;
pub mod tags;

// ── Primary re-exports ──────────────────────────────────────────────
pub use cache::{
    CacheKey, QueryCache, QueryConfig, QueryEndpoint, QueryState, QueryStatus, QueryStream,
    QuerySubscription, SubscribeOptions,
};
pub use config::{Credentials, DeskConfig};
pub use desk::{ConnectionState, Desk};
pub use endpoint::{EndpointDef, EndpointKind, MutationDef, QueryDef, decode_body};
pub use entity::{EntityStore, Identified};
pub use error::CoreError;
pub use mutation::{MutationEndpoint, MutationState, MutationTracker};
pub use resources::{
    Asset, CollectionOrder, DeathCase, Incoming, LogEntry, OfficeApi, Outgoing, PrisonCase,
    PurchaseOrder, Resource, ResourceApi, User,
};
pub use tags::{Tag, TagId};

// Re-exported so consumers don't need a direct dependency on the API crate.
pub use recdesk_api;
pub use recdesk_api::{AuthPaths, TlsMode};
