//! Shared helpers for command handlers.

use std::io::IsTerminal;

use serde_json::{Map, Value};

use crate::cli::PayloadArgs;
use crate::error::CliError;

/// Prompt for confirmation, auto-approving if `--yes` was passed.
/// Without a terminal to ask on, `--yes` is required.
pub fn confirm(message: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        return Err(CliError::NonInteractiveRequiresYes {
            action: message.into(),
        });
    }
    let confirmed = dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))?;
    Ok(confirmed)
}

/// Read the record fields from `--data` or `--from-file`. Must be a JSON
/// object.
pub fn read_payload(payload: &PayloadArgs) -> Result<Map<String, Value>, CliError> {
    let (source, text) = match (&payload.data, &payload.from_file) {
        (Some(data), _) => ("data", data.clone()),
        (None, Some(path)) => ("from-file", std::fs::read_to_string(path)?),
        (None, None) => {
            return Err(CliError::Validation {
                field: "payload".into(),
                reason: "pass --data or --from-file".into(),
            });
        }
    };

    match serde_json::from_str::<Value>(&text) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(_) => Err(CliError::Validation {
            field: source.into(),
            reason: "expected a JSON object".into(),
        }),
        Err(e) => Err(CliError::Validation {
            field: source.into(),
            reason: format!("invalid JSON: {e}"),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn inline(data: &str) -> PayloadArgs {
        PayloadArgs {
            data: Some(data.into()),
            from_file: None,
        }
    }

    #[test]
    fn payload_must_be_an_object() {
        assert_eq!(read_payload(&inline(r#"{"name":"Desk"}"#)).unwrap()["name"], "Desk");
        assert!(matches!(
            read_payload(&inline("[1]")),
            Err(CliError::Validation { .. })
        ));
        assert!(matches!(
            read_payload(&inline("{oops")),
            Err(CliError::Validation { .. })
        ));
    }

    #[test]
    fn payload_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("asset.json");
        std::fs::write(&path, r#"{"name":"Chair"}"#).unwrap();
        let args = PayloadArgs {
            data: None,
            from_file: Some(path),
        };
        assert_eq!(read_payload(&args).unwrap()["name"], "Chair");
    }

    #[test]
    fn yes_flag_skips_prompt() {
        assert!(confirm("Delete?", true).unwrap());
    }
}
