//! Output formatting: table, JSON, YAML, plain.
//!
//! Renders data in the format selected by `--output`. Table uses `tabled`,
//! structured formats use serde, plain emits one identifier per line.

use std::io::{self, Write};

use serde::Serialize;
use serde_json::Value;
use tabled::{Table, Tabled, settings::Style};

use crate::cli::OutputFormat;
use crate::error::CliError;

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of serializable items in the chosen format.
///
/// - `table`: one `Tabled` row per item via `to_row`
/// - `json` / `json-compact` / `yaml`: the items themselves via serde
/// - `plain`: `id_fn` per item, one per line
pub fn render_list<T, R>(
    format: OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: Serialize,
    R: Tabled,
{
    match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            Ok(render_table(&rows))
        }
        OutputFormat::Json => render_json(data, false),
        OutputFormat::JsonCompact => render_json(data, true),
        OutputFormat::Yaml => render_yaml(data),
        OutputFormat::Plain => Ok(data.iter().map(&id_fn).collect::<Vec<_>>().join("\n")),
    }
}

/// Render a single item. Table format shows a field/value listing.
pub fn render_single<T>(
    format: OutputFormat,
    data: &T,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: Serialize,
{
    match format {
        OutputFormat::Table => Ok(render_detail(&serde_json::to_value(data)?)),
        OutputFormat::Json => render_json(data, false),
        OutputFormat::JsonCompact => render_json(data, true),
        OutputFormat::Yaml => render_yaml(data),
        OutputFormat::Plain => Ok(id_fn(data)),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

// ── Format-specific renderers ────────────────────────────────────────

fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "Field")]
    field: String,
    #[tabled(rename = "Value")]
    value: String,
}

/// Field/value table for one JSON object; scalars print as-is.
fn render_detail(value: &Value) -> String {
    match value {
        Value::Object(fields) => {
            let rows: Vec<FieldRow> = fields
                .iter()
                .map(|(field, value)| FieldRow {
                    field: field.clone(),
                    value: scalar_text(value),
                })
                .collect();
            render_table(&rows)
        }
        other => scalar_text(other),
    }
}

/// Display text for a JSON value: strings unquoted, null empty,
/// composites as compact JSON.
pub fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn render_json<T: Serialize + ?Sized>(data: &T, compact: bool) -> Result<String, CliError> {
    let out = if compact {
        serde_json::to_string(data)?
    } else {
        serde_json::to_string_pretty(data)?
    };
    Ok(out)
}

fn render_yaml<T: Serialize + ?Sized>(data: &T) -> Result<String, CliError> {
    serde_yaml::to_string(data).map_err(|e| CliError::Internal(format!("YAML output: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[derive(Tabled)]
    struct Row {
        id: String,
    }

    fn items() -> Vec<Value> {
        vec![json!({ "_id": "a1" }), json!({ "_id": "a2" })]
    }

    fn id_of(v: &Value) -> String {
        v["_id"].as_str().unwrap_or_default().to_owned()
    }

    #[test]
    fn plain_lists_one_id_per_line() {
        let out = render_list(OutputFormat::Plain, &items(), |v| Row { id: id_of(v) }, id_of)
            .unwrap();
        assert_eq!(out, "a1\na2");
    }

    #[test]
    fn compact_json_is_single_line() {
        let out = render_list(OutputFormat::JsonCompact, &items(), |v| Row { id: id_of(v) }, id_of)
            .unwrap();
        assert_eq!(out, r#"[{"_id":"a1"},{"_id":"a2"}]"#);
    }

    #[test]
    fn detail_table_lists_fields() {
        let out = render_single(OutputFormat::Table, &json!({ "_id": "a1", "name": "Desk" }), id_of)
            .unwrap();
        assert!(out.contains("Field"));
        assert!(out.contains("Desk"));
    }

    #[test]
    fn scalar_text_unquotes_strings() {
        assert_eq!(scalar_text(&json!("x")), "x");
        assert_eq!(scalar_text(&json!(null)), "");
        assert_eq!(scalar_text(&json!([1, 2])), "[1,2]");
    }
}
