//! `snapshot`: server snapshots, including bulk delete and rebuild.

use super::{finish, found, id_candidates, parse_id, precheck, short_date, CommandError};
use anyhow::Result;
use hicloud_api::types::Image;
use hicloud_api::CloudApi;
use hicloud_console::{
    Candidate, CommandNode, ExecContext, IdCache, LookupError, Outcome, Render, ResourceHandler,
    ResourceKind, SubcommandSpec, Table,
};
use std::rc::Rc;

pub struct SnapshotHandler {
    api: Rc<CloudApi>,
}

fn server_of(image: &Image) -> Option<u64> {
    image.created_from.as_ref().map(|c| c.id)
}

fn size(image: &Image) -> String {
    match image.image_size {
        Some(gb) => format!("{gb:.2} GB"),
        None => "-".to_string(),
    }
}

impl SnapshotHandler {
    pub fn new(api: Rc<CloudApi>) -> Self {
        Self { api }
    }

    fn snapshots_of(&self, vm: Option<u64>) -> Result<Vec<Image>> {
        let mut snapshots = self.api.list_images(Some("snapshot"))?;
        if let Some(vm) = vm {
            snapshots.retain(|s| server_of(s) == Some(vm));
        }
        Ok(snapshots)
    }

    fn list(&self, args: &[String]) -> Result<Render> {
        let vm = args.first().map(|raw| parse_id(raw, "VM")).transpose()?;
        let snapshots = self.snapshots_of(vm)?;
        if snapshots.is_empty() {
            return Ok(Render::message("No snapshots found"));
        }

        let mut table = Table::new(["ID", "Description", "Created", "Size", "Server ID"]).titled("Snapshots");
        for s in &snapshots {
            table.row([
                s.id.to_string(),
                s.label().to_string(),
                short_date(&s.created),
                size(s),
                server_of(s).map_or_else(|| "-".to_string(), |id| id.to_string()),
            ]);
        }
        Ok(Render::Table(table))
    }

    fn create(&self, args: &[String]) -> Result<Render> {
        let Some((raw, words)) = args.split_first() else {
            return Err(CommandError::Usage("snapshot create <vm> [description...]".into()).into());
        };
        let vm = parse_id(raw, "VM")?;
        let server = found(self.api.get_server(vm), "VM", vm)?;
        let description = if words.is_empty() {
            format!("Snapshot of {}", server.name)
        } else {
            words.join(" ")
        };
        let image = self.api.create_image(vm, Some(&description), "snapshot")?;
        Ok(Render::message(format!(
            "Snapshot {} created for VM '{}' (ID: {vm})",
            image.id, server.name
        )))
    }

    fn delete(&self, args: &[String]) -> Result<Render> {
        match args {
            [all, raw] if all == "all" => self.delete_all(raw),
            [all] if all == "all" => {
                Err(CommandError::Usage("snapshot delete all <vm>".into()).into())
            }
            [raw] => {
                let id = parse_id(raw, "snapshot")?;
                found(self.api.delete_image(id), "Snapshot", id)?;
                Ok(Render::message(format!("Snapshot {id} deleted")))
            }
            _ => Err(CommandError::Usage("snapshot delete <id|all> [vm]".into()).into()),
        }
    }

    fn delete_all(&self, raw: &str) -> Result<Render> {
        let vm = parse_id(raw, "VM")?;
        found(self.api.get_server(vm), "VM", vm)?;
        let snapshots = self.snapshots_of(Some(vm))?;
        if snapshots.is_empty() {
            return Ok(Render::message(format!("No snapshots found for VM {vm}")));
        }

        let mut table = Table::new(["Snapshot", "Result"]).titled(format!("Deleting snapshots of VM {vm}"));
        let mut failed = 0;
        for s in &snapshots {
            match self.api.delete_image(s.id) {
                Ok(()) => table.row([s.id.to_string(), "OK".to_string()]),
                Err(e) => {
                    tracing::warn!(snapshot = s.id, "delete failed: {e}");
                    failed += 1;
                    table.row([s.id.to_string(), format!("FAILED: {e}")]);
                }
            }
        }
        Ok(Render::Sequence(vec![
            Render::Table(table),
            Render::message(format!(
                "Deleted {} snapshots, {failed} failed",
                snapshots.len() - failed
            )),
        ]))
    }

    fn rebuild(&self, snapshot: &str, vm: &str) -> Result<Render> {
        let snapshot = parse_id(snapshot, "snapshot")?;
        let vm = parse_id(vm, "VM")?;
        let server = found(self.api.get_server(vm), "VM", vm)?;
        found(self.api.get_image(snapshot), "Snapshot", snapshot)?;
        self.api.rebuild_server(vm, &snapshot.to_string())?;
        Ok(Render::message(format!(
            "VM '{}' (ID: {vm}) rebuilt from snapshot {snapshot}",
            server.name
        )))
    }
}

impl ResourceHandler for SnapshotHandler {
    fn describe(&self) -> CommandNode {
        CommandNode::new("snapshot", "Manage server snapshots")
            .sub(
                SubcommandSpec::new("list", "snapshot list [vm]")
                    .args(0, Some(1))
                    .summary("List snapshots, optionally for one VM"),
            )
            .sub(
                SubcommandSpec::new("create", "snapshot create <vm> [description...]")
                    .args(1, None)
                    .summary("Create a snapshot of a VM"),
            )
            .sub(
                SubcommandSpec::new("delete", "snapshot delete <id|all> [vm]")
                    .args(1, Some(2))
                    .destructive()
                    .summary("Delete a snapshot, or all snapshots of a VM"),
            )
            .sub(
                SubcommandSpec::new("rebuild", "snapshot rebuild <snapshot> <vm>")
                    .exactly(2)
                    .literal("rebuild")
                    .summary("Rebuild a VM from a snapshot"),
            )
    }

    fn execute(&self, _ctx: &mut ExecContext<'_>, sub: &str, args: &[String]) -> Outcome {
        finish(match (sub, args) {
            ("list", _) => self.list(args),
            ("create", _) => self.create(args),
            ("delete", _) => self.delete(args),
            ("rebuild", [snapshot, vm]) => self.rebuild(snapshot, vm),
            _ => Err(CommandError::Usage(format!("Unknown snapshot subcommand: {sub}")).into()),
        })
    }

    fn complete(
        &self,
        cache: &mut IdCache,
        sub: &str,
        arg_index: usize,
        args: &[String],
    ) -> Result<Vec<Candidate>, LookupError> {
        match (sub, arg_index) {
            ("list", 0) | ("create", 0) | ("rebuild", 1) => {
                id_candidates(cache, &self.api, ResourceKind::Server)
            }
            ("delete", 0) => {
                let mut candidates = vec![Candidate::word("all")];
                candidates.extend(id_candidates(cache, &self.api, ResourceKind::Snapshot)?);
                Ok(candidates)
            }
            ("delete", 1) if args.first().is_some_and(|a| a == "all") => {
                id_candidates(cache, &self.api, ResourceKind::Server)
            }
            ("rebuild", 0) => id_candidates(cache, &self.api, ResourceKind::Snapshot),
            _ => Ok(Vec::new()),
        }
    }

    fn confirm_prompt(&self, sub: &str, args: &[String]) -> Option<String> {
        match (sub, args) {
            ("delete", [all, vm]) if all == "all" => {
                Some(format!("Delete ALL snapshots of VM {vm}?"))
            }
            ("delete", [id]) => Some(format!("Delete snapshot {id}?")),
            ("rebuild", [snapshot, vm]) => Some(format!(
                "WARNING: rebuilding VM {vm} from snapshot {snapshot} deletes all data on the VM. This is irreversible."
            )),
            _ => None,
        }
    }

    fn check(&self, sub: &str, args: &[String]) -> Result<(), Outcome> {
        precheck(match (sub, args) {
            ("delete", [all]) if all == "all" => Err(CommandError::Usage("snapshot delete all <vm>".into())),
            ("delete", [all, vm]) if all == "all" => parse_id(vm, "VM").map(drop),
            ("delete", [id]) => parse_id(id, "snapshot").map(drop),
            ("delete", _) => Err(CommandError::Usage("snapshot delete <id|all> [vm]".into())),
            ("rebuild", [snapshot, vm]) => {
                parse_id(snapshot, "snapshot").and_then(|_| parse_id(vm, "VM")).map(drop)
            }
            _ => Ok(()),
        })
    }
}
