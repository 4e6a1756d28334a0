//! `batch`: one operation over several servers.
//!
//! Ids come either as one comma separated token (`1,2,3`) or as separate
//! tokens. Bad tokens and unknown servers are reported and skipped; every
//! remaining server is attempted even after a failure.

use super::{finish, id_candidates, parse_id, parse_id_list, precheck, CommandError};
use anyhow::Result;
use hicloud_api::types::Server;
use hicloud_api::{ApiResult, CloudApi};
use hicloud_console::{
    Candidate, CommandNode, ExecContext, IdCache, LookupError, Outcome, Render, ResourceHandler,
    ResourceKind, SubcommandSpec, Table,
};
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Start,
    Stop,
    Snapshot,
    Delete,
}

impl Op {
    fn from_sub(sub: &str) -> Option<Self> {
        match sub {
            "start" => Some(Op::Start),
            "stop" => Some(Op::Stop),
            "snapshot" => Some(Op::Snapshot),
            "delete" => Some(Op::Delete),
            _ => None,
        }
    }

    /// Servers already in this state are skipped.
    fn skip_status(self) -> Option<&'static str> {
        match self {
            Op::Start => Some("running"),
            Op::Stop => Some("off"),
            _ => None,
        }
    }

    fn verb(self) -> &'static str {
        match self {
            Op::Start => "started",
            Op::Stop => "stopped",
            Op::Snapshot => "snapshotted",
            Op::Delete => "deleted",
        }
    }
}

/// For `snapshot`, everything after the ids is the description.
fn split_ids(op: Op, args: &[String]) -> (Vec<u64>, Vec<String>, Option<String>) {
    if op != Op::Snapshot {
        let (ids, invalid) = parse_id_list(args);
        return (ids, invalid, None);
    }
    let id_tokens = match args.first() {
        Some(first) if first.contains(',') => 1,
        _ => args
            .iter()
            .take_while(|a| parse_id(a, "server").is_ok())
            .count()
            .max(1),
    };
    let (ids, invalid) = parse_id_list(&args[..id_tokens.min(args.len())]);
    let rest = &args[id_tokens.min(args.len())..];
    let description = (!rest.is_empty()).then(|| rest.join(" "));
    (ids, invalid, description)
}

fn no_valid_ids(invalid: &[String]) -> CommandError {
    let mut text = "No valid server IDs given".to_string();
    if !invalid.is_empty() {
        text.push_str(&format!(" (invalid: {})", invalid.join(", ")));
    }
    CommandError::InvalidArgument(text)
}

pub struct BatchHandler {
    api: Rc<CloudApi>,
}

impl BatchHandler {
    pub fn new(api: Rc<CloudApi>) -> Self {
        Self { api }
    }

    fn apply(&self, op: Op, server: &Server, description: Option<&str>) -> ApiResult<String> {
        match op {
            Op::Start => self.api.power_on(server.id).map(|()| "OK".to_string()),
            Op::Stop => self.api.stop_server(server.id).map(|()| "OK".to_string()),
            Op::Delete => self.api.delete_server(server.id).map(|()| "OK".to_string()),
            Op::Snapshot => {
                let fallback = format!("Batch snapshot of {}", server.name);
                let image = self
                    .api
                    .create_image(server.id, Some(description.unwrap_or(&fallback)), "snapshot")?;
                Ok(format!("OK (snapshot {})", image.id))
            }
        }
    }

    fn run(&self, op: Op, args: &[String]) -> Result<Render> {
        let (ids, invalid, description) = split_ids(op, args);
        let mut parts = Vec::new();
        for bad in &invalid {
            parts.push(Render::message(format!("Invalid server ID: {bad} (must be an integer)")));
        }
        if ids.is_empty() {
            return Err(no_valid_ids(&invalid).into());
        }

        let mut missing = Vec::new();
        let mut skipped = Vec::new();
        let mut targets = Vec::new();
        for id in ids {
            match self.api.get_server(id) {
                Ok(server) if op.skip_status() == Some(server.status.as_str()) => skipped.push(server),
                Ok(server) => targets.push(server),
                Err(e) if e.is_not_found() => missing.push(id.to_string()),
                Err(e) => return Err(e.into()),
            }
        }
        if !missing.is_empty() {
            parts.push(Render::message(format!(
                "Warning: server IDs not found: {}",
                missing.join(", ")
            )));
        }
        for s in &skipped {
            parts.push(Render::message(format!(
                "Skipping '{}' (ID: {}): already {}",
                s.name, s.id, s.status
            )));
        }
        if targets.is_empty() {
            parts.push(Render::message(format!("No servers to be {}.", op.verb())));
            return Ok(Render::Sequence(parts));
        }

        let mut table = Table::new(["ID", "Name", "Result"]).titled(format!("Servers {}", op.verb()));
        let (mut ok, mut failed) = (0, 0);
        for server in &targets {
            let result = match self.apply(op, server, description.as_deref()) {
                Ok(text) => {
                    ok += 1;
                    text
                }
                Err(e) => {
                    failed += 1;
                    tracing::warn!(server = server.id, error = %e, "batch operation failed");
                    format!("FAILED: {e}")
                }
            };
            table.row([server.id.to_string(), server.name.clone(), result]);
        }
        parts.push(Render::Table(table));
        parts.push(Render::message(format!(
            "Batch operation completed: {ok} succeeded, {failed} failed"
        )));
        Ok(Render::Sequence(parts))
    }
}

impl ResourceHandler for BatchHandler {
    fn describe(&self) -> CommandNode {
        CommandNode::new("batch", "Run one operation on several VMs")
            .sub(
                SubcommandSpec::new("start", "batch start <id1,id2,...>")
                    .args(1, None)
                    .destructive()
                    .summary("Start several VMs"),
            )
            .sub(
                SubcommandSpec::new("stop", "batch stop <id1,id2,...>")
                    .args(1, None)
                    .destructive()
                    .summary("Shut down several VMs"),
            )
            .sub(
                SubcommandSpec::new("snapshot", "batch snapshot <id1,id2,...> [description...]")
                    .args(1, None)
                    .destructive()
                    .summary("Snapshot several VMs"),
            )
            .sub(
                SubcommandSpec::new("delete", "batch delete <id1,id2,...>")
                    .args(1, None)
                    .literal("delete")
                    .summary("Delete several VMs"),
            )
    }

    fn execute(&self, _ctx: &mut ExecContext<'_>, sub: &str, args: &[String]) -> Outcome {
        finish(match Op::from_sub(sub) {
            Some(op) => self.run(op, args),
            None => Err(CommandError::Usage(format!("Unknown batch subcommand: {sub}")).into()),
        })
    }

    fn complete(
        &self,
        cache: &mut IdCache,
        _sub: &str,
        arg_index: usize,
        _args: &[String],
    ) -> Result<Vec<Candidate>, LookupError> {
        match arg_index {
            0 => id_candidates(cache, &self.api, ResourceKind::Server),
            _ => Ok(Vec::new()),
        }
    }

    fn check(&self, sub: &str, args: &[String]) -> Result<(), Outcome> {
        let Some(op) = Op::from_sub(sub) else {
            return Ok(());
        };
        match split_ids(op, args) {
            (ids, invalid, _) if ids.is_empty() => precheck(Err(no_valid_ids(&invalid))),
            _ => Ok(()),
        }
    }

    fn confirm_prompt(&self, sub: &str, args: &[String]) -> Option<String> {
        let op = Op::from_sub(sub)?;
        let (ids, _, _) = split_ids(op, args);
        let list = ids.iter().map(u64::to_string).collect::<Vec<_>>().join(", ");
        Some(match op {
            Op::Start => format!("Start {} server(s): {list}?", ids.len()),
            Op::Stop => format!("Stop {} server(s): {list}?", ids.len()),
            Op::Snapshot => format!(
                "Create snapshots of {} server(s): {list}? This may take some time.",
                ids.len()
            ),
            Op::Delete => format!(
                "PERMANENTLY DELETE {} server(s): {list}? This action is irreversible!",
                ids.len()
            ),
        })
    }
}
