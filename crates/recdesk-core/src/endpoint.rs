// ── Endpoint definitions ──
//
// Queries and mutations are typed trait implementations: the argument and
// output types are checked at compile time, and the registry only has to
// enforce that names are unique.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use recdesk_api::{ApiClient, RawResponse, RequestSpec};

use crate::error::CoreError;
use crate::tags::Tag;

/// What every endpoint knows: its name, the tag type it deals in, how to
/// build a request and how to reshape the response.
pub trait EndpointDef: Send + Sync + 'static {
    /// Argument, serialized into the cache key.
    type Arg: Serialize + Clone + Send + Sync + 'static;
    type Output: Send + Sync + 'static;

    /// Unique endpoint name.
    fn name(&self) -> &str;

    /// Tag type used by the default tag sets.
    fn tag_type(&self) -> &str;

    fn build_request(&self, arg: &Self::Arg) -> Result<RequestSpec, CoreError>;

    /// Reshape a raw response. Must be pure; a response that does not
    /// match the expected shape is a transform error, never a partial value.
    fn transform_response(&self, raw: RawResponse) -> Result<Self::Output, CoreError>;
}

/// A cacheable read.
pub trait QueryDef: EndpointDef {
    /// Tags this result provides. Defaults to the whole collection.
    fn provides_tags(&self, _result: &Self::Output, _arg: &Self::Arg) -> Vec<Tag> {
        vec![Tag::list(self.tag_type())]
    }
}

/// A write that invalidates cached reads on success.
pub trait MutationDef: EndpointDef {
    /// Tags to invalidate after success. Defaults to the whole collection.
    fn invalidates_tags(&self, _result: &Self::Output, _arg: &Self::Arg) -> Vec<Tag> {
        vec![Tag::list(self.tag_type())]
    }
}

/// Run one endpoint round trip through the reauthenticating client.
pub(crate) async fn run_endpoint<D: EndpointDef>(
    client: &ApiClient,
    def: &D,
    arg: &D::Arg,
) -> Result<D::Output, CoreError> {
    let spec = def.build_request(arg)?;
    debug!(endpoint = def.name(), method = %spec.method, path = %spec.path, "running endpoint");
    let raw = client.execute(&spec).await?;
    def.transform_response(raw)
}

/// Deserialize a response body, reporting shape mismatches as transform errors.
pub fn decode_body<T: DeserializeOwned>(body: Value, what: &str) -> Result<T, CoreError> {
    serde_json::from_value(body)
        .map_err(|e| CoreError::transform(format!("{what}: {e}")))
}

// ── Registry ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    Query,
    Mutation,
}

/// Names of every registered endpoint, across both kinds.
#[derive(Debug, Default)]
pub(crate) struct EndpointRegistry {
    names: DashMap<String, EndpointKind>,
}

impl EndpointRegistry {
    /// Reserve `name`. Fails if any endpoint already uses it.
    pub(crate) fn claim(&self, name: &str, kind: EndpointKind) -> Result<(), CoreError> {
        match self.names.entry(name.to_owned()) {
            Entry::Occupied(_) => Err(CoreError::DuplicateEndpoint {
                name: name.to_owned(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(kind);
                Ok(())
            }
        }
    }

    pub(crate) fn kind_of(&self, name: &str) -> Option<EndpointKind> {
        self.names.get(name).map(|kind| *kind)
    }

    pub(crate) fn len(&self) -> usize {
        self.names.len()
    }
}
