// ── Generic resource endpoints ──
//
// The five REST operations every office resource shares. Each is generic
// over `Resource`, so a resource only contributes its tag and path.

use std::marker::PhantomData;

use serde_json::{Value, json};

use recdesk_api::{RawResponse, RequestSpec};

use super::Resource;
use crate::endpoint::{EndpointDef, MutationDef, QueryDef, decode_body};
use crate::entity::EntityStore;
use crate::error::CoreError;
use crate::tags::Tag;

fn endpoint_name<R: Resource>(op: &str) -> String {
    format!("{}.{op}", R::TAG)
}

fn item_path<R: Resource>(id: &str) -> String {
    format!("{}/{id}", R::PATH)
}

// ── list ─────────────────────────────────────────────────────────────

/// `GET /<path>`: the whole collection, normalized.
pub struct ListQuery<R> {
    name: String,
    _resource: PhantomData<fn() -> R>,
}

impl<R: Resource> Default for ListQuery<R> {
    fn default() -> Self {
        Self {
            name: endpoint_name::<R>("list"),
            _resource: PhantomData,
        }
    }
}

impl<R: Resource> EndpointDef for ListQuery<R> {
    type Arg = ();
    type Output = EntityStore<R>;

    fn name(&self) -> &str {
        &self.name
    }

    fn tag_type(&self) -> &str {
        R::TAG
    }

    fn build_request(&self, _arg: &()) -> Result<RequestSpec, CoreError> {
        Ok(RequestSpec::get(R::PATH))
    }

    fn transform_response(&self, raw: RawResponse) -> Result<EntityStore<R>, CoreError> {
        let items: Vec<R> = decode_body(raw.body, &format!("{} list", R::TAG))?;
        if let Some(missing) = items.iter().position(|item| item.id().is_empty()) {
            return Err(CoreError::transform(format!(
                "{} list: element {missing} has no identifier",
                R::TAG
            )));
        }
        Ok(EntityStore::from_items(items))
    }
}

impl<R: Resource> QueryDef for ListQuery<R> {
    fn provides_tags(&self, result: &EntityStore<R>, _arg: &()) -> Vec<Tag> {
        std::iter::once(Tag::list(R::TAG))
            .chain(result.ids().into_iter().map(|id| Tag::id(R::TAG, id)))
            .collect()
    }
}

// ── get ──────────────────────────────────────────────────────────────

/// `GET /<path>/<id>`: one record. Does not touch the list store.
pub struct GetQuery<R> {
    name: String,
    _resource: PhantomData<fn() -> R>,
}

impl<R: Resource> Default for GetQuery<R> {
    fn default() -> Self {
        Self {
            name: endpoint_name::<R>("get"),
            _resource: PhantomData,
        }
    }
}

impl<R: Resource> EndpointDef for GetQuery<R> {
    type Arg = String;
    type Output = R;

    fn name(&self) -> &str {
        &self.name
    }

    fn tag_type(&self) -> &str {
        R::TAG
    }

    fn build_request(&self, id: &String) -> Result<RequestSpec, CoreError> {
        Ok(RequestSpec::get(item_path::<R>(id)))
    }

    fn transform_response(&self, raw: RawResponse) -> Result<R, CoreError> {
        decode_body(raw.body, R::TAG)
    }
}

impl<R: Resource> QueryDef for GetQuery<R> {
    fn provides_tags(&self, _result: &R, id: &String) -> Vec<Tag> {
        vec![Tag::id(R::TAG, id.as_str())]
    }
}

// ── create ───────────────────────────────────────────────────────────

/// `POST /<path>` with the record as body.
pub struct CreateMutation<R> {
    name: String,
    _resource: PhantomData<fn() -> R>,
}

impl<R: Resource> Default for CreateMutation<R> {
    fn default() -> Self {
        Self {
            name: endpoint_name::<R>("create"),
            _resource: PhantomData,
        }
    }
}

impl<R: Resource> EndpointDef for CreateMutation<R> {
    type Arg = R;
    type Output = Value;

    fn name(&self) -> &str {
        &self.name
    }

    fn tag_type(&self) -> &str {
        R::TAG
    }

    fn build_request(&self, record: &R) -> Result<RequestSpec, CoreError> {
        Ok(RequestSpec::post(R::PATH).with_body(serde_json::to_value(record)?))
    }

    fn transform_response(&self, raw: RawResponse) -> Result<Value, CoreError> {
        Ok(raw.body)
    }
}

impl<R: Resource> MutationDef for CreateMutation<R> {}

// ── update ───────────────────────────────────────────────────────────

/// `PATCH /<path>` with the record's fields plus `"id"`.
pub struct UpdateMutation<R> {
    name: String,
    _resource: PhantomData<fn() -> R>,
}

impl<R: Resource> Default for UpdateMutation<R> {
    fn default() -> Self {
        Self {
            name: endpoint_name::<R>("update"),
            _resource: PhantomData,
        }
    }
}

impl<R: Resource> EndpointDef for UpdateMutation<R> {
    type Arg = R;
    type Output = Value;

    fn name(&self) -> &str {
        &self.name
    }

    fn tag_type(&self) -> &str {
        R::TAG
    }

    fn build_request(&self, record: &R) -> Result<RequestSpec, CoreError> {
        if record.id().is_empty() {
            return Err(CoreError::Serialization {
                message: format!("{} update needs an id", R::TAG),
            });
        }
        let mut body = serde_json::to_value(record)?;
        match body.as_object_mut() {
            Some(fields) => {
                fields.insert("id".into(), Value::String(record.id().to_owned()));
            }
            None => {
                return Err(CoreError::Serialization {
                    message: format!("{} does not serialize to an object", R::TAG),
                });
            }
        }
        Ok(RequestSpec::patch(R::PATH).with_body(body))
    }

    fn transform_response(&self, raw: RawResponse) -> Result<Value, CoreError> {
        Ok(raw.body)
    }
}

impl<R: Resource> MutationDef for UpdateMutation<R> {
    fn invalidates_tags(&self, _result: &Value, record: &R) -> Vec<Tag> {
        vec![Tag::id(R::TAG, record.id()), Tag::list(R::TAG)]
    }
}

// ── delete ───────────────────────────────────────────────────────────

/// `DELETE /<path>` with `{"id": id}` as body.
pub struct DeleteMutation<R> {
    name: String,
    _resource: PhantomData<fn() -> R>,
}

impl<R: Resource> Default for DeleteMutation<R> {
    fn default() -> Self {
        Self {
            name: endpoint_name::<R>("delete"),
            _resource: PhantomData,
        }
    }
}

impl<R: Resource> EndpointDef for DeleteMutation<R> {
    type Arg = String;
    type Output = Value;

    fn name(&self) -> &str {
        &self.name
    }

    fn tag_type(&self) -> &str {
        R::TAG
    }

    fn build_request(&self, id: &String) -> Result<RequestSpec, CoreError> {
        Ok(RequestSpec::delete(R::PATH).with_body(json!({ "id": id })))
    }

    fn transform_response(&self, raw: RawResponse) -> Result<Value, CoreError> {
        Ok(raw.body)
    }
}

impl<R: Resource> MutationDef for DeleteMutation<R> {
    fn invalidates_tags(&self, _result: &Value, id: &String) -> Vec<Tag> {
        vec![Tag::id(R::TAG, id.as_str()), Tag::list(R::TAG)]
    }
}
