//! Record command handlers: list, get, create, update, delete.
//!
//! Generic over the resource; `commands::dispatch` picks the endpoints.

use serde_json::Value;
use tabled::Tabled;

use recdesk_core::{Identified, Resource, ResourceApi};

use crate::cli::{GlobalOpts, PayloadArgs, ResourceKind};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
pub(crate) struct RecordRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "Fields")]
    fields: usize,
}

impl RecordRow {
    pub(crate) fn of<R: Resource>(record: &&R) -> Self {
        let fields = serde_json::to_value(*record)
            .ok()
            .and_then(|v| v.as_object().map(serde_json::Map::len))
            .unwrap_or_default();
        Self {
            id: record.id().to_owned(),
            label: record.label().unwrap_or_default().to_owned(),
            fields,
        }
    }
}

pub(crate) fn id_of<R: Resource>(record: &&R) -> String {
    record.id().to_owned()
}

// ── Handlers ────────────────────────────────────────────────────────

pub async fn list<R: Resource>(api: &ResourceApi<R>, global: &GlobalOpts) -> Result<(), CliError> {
    let store = api.list.fetch(()).await?;
    let records = store.select_all();
    let out = output::render_list(global.output, &records, RecordRow::of::<R>, id_of::<R>)?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn get<R: Resource>(
    api: &ResourceApi<R>,
    kind: ResourceKind,
    id: String,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let record = api
        .get
        .fetch(id.clone())
        .await
        .map_err(|e| CliError::from(e).with_resource(kind.cli_name(), &id))?;
    let out = output::render_single(global.output, record.as_ref(), |r| r.id().to_owned())?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn create<R: Resource>(
    api: &ResourceApi<R>,
    kind: ResourceKind,
    payload: &PayloadArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let fields = util::read_payload(payload)?;
    let record: R = serde_json::from_value(Value::Object(fields))?;

    let created = api.create.trigger(record).await?;
    report(global, &created, &format!("Created {} record", kind.cli_name()))
}

pub async fn update<R: Resource>(
    api: &ResourceApi<R>,
    kind: ResourceKind,
    id: String,
    payload: &PayloadArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let mut fields = util::read_payload(payload)?;
    fields.insert("_id".into(), Value::String(id.clone()));
    let record: R = serde_json::from_value(Value::Object(fields))?;

    let updated = api
        .update
        .trigger(record)
        .await
        .map_err(|e| CliError::from(e).with_resource(kind.cli_name(), &id))?;
    report(global, &updated, &format!("Updated {} '{id}'", kind.cli_name()))
}

pub async fn delete<R: Resource>(
    api: &ResourceApi<R>,
    kind: ResourceKind,
    id: String,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    if !util::confirm(&format!("Delete {} '{id}'?", kind.cli_name()), global.yes)? {
        return Ok(());
    }
    api.delete
        .trigger(id.clone())
        .await
        .map_err(|e| CliError::from(e).with_resource(kind.cli_name(), &id))?;
    if !global.quiet {
        eprintln!("Deleted {} '{id}'", kind.cli_name());
    }
    Ok(())
}

/// Print the backend's answer to a write, if it sent one.
fn report(global: &GlobalOpts, body: &Value, done: &str) -> Result<(), CliError> {
    if !global.quiet {
        eprintln!("{done}");
    }
    if body.is_null() {
        return Ok(());
    }
    let out = output::render_single(global.output, body, |v| {
        v.get("_id").map(output::scalar_text).unwrap_or_default()
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}
