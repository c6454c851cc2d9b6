//! `watch`: keep a polling list subscription open and print each change.

use futures::StreamExt;
use serde_json::Value;
use tracing::{debug, warn};

use recdesk_core::{CoreError, QueryStatus, Resource, ResourceApi, SubscribeOptions};

use crate::cli::{GlobalOpts, OutputFormat, ResourceKind, WatchArgs};
use crate::error::CliError;
use crate::output;

use super::records::{RecordRow, id_of};

pub async fn handle<R: Resource>(
    api: &ResourceApi<R>,
    kind: ResourceKind,
    args: &WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    if args.interval.is_zero() {
        return Err(CliError::Validation {
            field: "interval".into(),
            reason: "must be greater than zero".into(),
        });
    }

    let options = SubscribeOptions::default()
        .polling(args.interval)
        .refetch_on_reconnect();
    let mut states = api.list.subscribe((), options)?.into_stream();

    let mut printed = 0usize;
    let mut last: Option<Value> = None;

    loop {
        let state = tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => {
                debug!("watch interrupted");
                break;
            }
            next = states.next() => match next {
                Some(state) => state,
                None => break,
            },
        };

        if state.is_fetching {
            continue;
        }

        match state.status {
            QueryStatus::Success => {
                let Some(store) = state.data else { continue };
                let snapshot = serde_json::to_value(store.as_ref())?;
                if last.as_ref() == Some(&snapshot) {
                    debug!(resource = kind.cli_name(), "poll returned unchanged list");
                    continue;
                }

                let records = store.select_all();
                if global.output == OutputFormat::Table && !global.quiet {
                    eprintln!(
                        "[{}] {} {} record(s)",
                        chrono::Local::now().format("%H:%M:%S"),
                        records.len(),
                        kind.cli_name()
                    );
                }
                let out =
                    output::render_list(global.output, &records, RecordRow::of::<R>, id_of::<R>)?;
                output::print_output(&out, global.quiet);

                last = Some(snapshot);
                printed += 1;
                if args.count.is_some_and(|limit| printed >= limit) {
                    break;
                }
            }
            QueryStatus::Error => {
                let err = state
                    .error
                    .unwrap_or_else(|| CoreError::Internal("error state without error".into()));
                if err.is_session_lost() || matches!(err, CoreError::Evicted { .. }) {
                    return Err(err.into());
                }
                warn!(resource = kind.cli_name(), error = %err, "poll failed; still watching");
            }
            QueryStatus::Uninitialized | QueryStatus::Loading => {}
        }
    }

    Ok(())
}
