//! Command dispatch: bridges CLI args -> resource endpoints -> output formatting.

pub mod config_cmd;
pub mod records;
pub mod util;
pub mod watch;

use recdesk_core::{Desk, Resource, ResourceApi};

use crate::cli::{Command, GlobalOpts, ResourceKind};
use crate::error::CliError;

/// Dispatch a backend-bound command to the endpoints of its resource.
pub async fn dispatch(cmd: Command, desk: &Desk, global: &GlobalOpts) -> Result<(), CliError> {
    let api = desk.api()?;
    let Some(kind) = cmd.resource() else {
        return Err(CliError::Internal(
            "config and completions are handled before dispatch".into(),
        ));
    };

    match kind {
        ResourceKind::Assets => run(&api.assets, kind, cmd, global).await,
        ResourceKind::Incomings => run(&api.incomings, kind, cmd, global).await,
        ResourceKind::Outgoings => run(&api.outgoings, kind, cmd, global).await,
        ResourceKind::DeathCases => run(&api.death_cases, kind, cmd, global).await,
        ResourceKind::PrisonCases => run(&api.prison_cases, kind, cmd, global).await,
        ResourceKind::PurchaseOrders => run(&api.purchase_orders, kind, cmd, global).await,
        ResourceKind::CollectionOrders => run(&api.collection_orders, kind, cmd, global).await,
        ResourceKind::Users => run(&api.users, kind, cmd, global).await,
        ResourceKind::Logs => run(&api.logs, kind, cmd, global).await,
    }
}

async fn run<R: Resource>(
    api: &ResourceApi<R>,
    kind: ResourceKind,
    cmd: Command,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::List { .. } => records::list(api, global).await,
        Command::Get { id, .. } => records::get(api, kind, id, global).await,
        Command::Create { payload, .. } => records::create(api, kind, &payload, global).await,
        Command::Update { id, payload, .. } => {
            records::update(api, kind, id, &payload, global).await
        }
        Command::Delete { id, .. } => records::delete(api, kind, id, global).await,
        Command::Watch(args) => watch::handle(api, kind, &args, global).await,
        Command::Config(_) | Command::Completions(_) => Err(CliError::Internal(
            "config and completions are handled before dispatch".into(),
        )),
    }
}
