// ── Office resources ──
//
// The nine record collections of the office backend. They all expose the
// same five REST operations, so endpoints are generic over `Resource` and
// each record type only states its tag type and path.

mod endpoints;
mod models;

use std::fmt::Debug;

use serde::Serialize;
use serde::de::DeserializeOwned;

pub use self::endpoints::{CreateMutation, DeleteMutation, GetQuery, ListQuery, UpdateMutation};
pub use self::models::{
    Asset, CollectionOrder, DeathCase, Incoming, LogEntry, Outgoing, PrisonCase, PurchaseOrder,
    User,
};

use crate::cache::{QueryCache, QueryEndpoint};
use crate::entity::Identified;
use crate::error::CoreError;
use crate::mutation::MutationEndpoint;

/// A record collection served under one REST path.
pub trait Resource:
    Identified + Serialize + DeserializeOwned + Clone + Send + Sync + Debug + 'static
{
    /// Tag type, also the endpoint name prefix.
    const TAG: &'static str;
    /// Collection path, e.g. `/assets`.
    const PATH: &'static str;

    /// Short human-readable label, when the record has one.
    fn label(&self) -> Option<&str>;
}

/// The five registered endpoints of one resource.
pub struct ResourceApi<R: Resource> {
    pub list: QueryEndpoint<ListQuery<R>>,
    pub get: QueryEndpoint<GetQuery<R>>,
    pub create: MutationEndpoint<CreateMutation<R>>,
    pub update: MutationEndpoint<UpdateMutation<R>>,
    pub delete: MutationEndpoint<DeleteMutation<R>>,
}

impl<R: Resource> ResourceApi<R> {
    pub fn register(cache: &QueryCache) -> Result<Self, CoreError> {
        Ok(Self {
            list: cache.register_query(ListQuery::default())?,
            get: cache.register_query(GetQuery::default())?,
            create: cache.register_mutation(CreateMutation::default())?,
            update: cache.register_mutation(UpdateMutation::default())?,
            delete: cache.register_mutation(DeleteMutation::default())?,
        })
    }
}

impl<R: Resource> Clone for ResourceApi<R> {
    fn clone(&self) -> Self {
        Self {
            list: self.list.clone(),
            get: self.get.clone(),
            create: self.create.clone(),
            update: self.update.clone(),
            delete: self.delete.clone(),
        }
    }
}

impl<R: Resource> Debug for ResourceApi<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceApi")
            .field("tag", &R::TAG)
            .field("path", &R::PATH)
            .finish()
    }
}

/// Every office resource, registered against one cache.
#[derive(Debug, Clone)]
pub struct OfficeApi {
    pub assets: ResourceApi<Asset>,
    pub incomings: ResourceApi<Incoming>,
    pub outgoings: ResourceApi<Outgoing>,
    pub death_cases: ResourceApi<DeathCase>,
    pub prison_cases: ResourceApi<PrisonCase>,
    pub purchase_orders: ResourceApi<PurchaseOrder>,
    pub collection_orders: ResourceApi<CollectionOrder>,
    pub users: ResourceApi<User>,
    pub logs: ResourceApi<LogEntry>,
}

impl OfficeApi {
    /// Register all resources. Fails if any endpoint name is already taken
    /// on `cache`, e.g. when called twice.
    pub fn register(cache: &QueryCache) -> Result<Self, CoreError> {
        Ok(Self {
            assets: ResourceApi::register(cache)?,
            incomings: ResourceApi::register(cache)?,
            outgoings: ResourceApi::register(cache)?,
            death_cases: ResourceApi::register(cache)?,
            prison_cases: ResourceApi::register(cache)?,
            purchase_orders: ResourceApi::register(cache)?,
            collection_orders: ResourceApi::register(cache)?,
            users: ResourceApi::register(cache)?,
            logs: ResourceApi::register(cache)?,
        })
    }
}
