//! `backup`: automatic server backups.

use super::{finish, found, id_candidates, parse_id, precheck, short_date, words, CommandError};
use anyhow::Result;
use hicloud_api::CloudApi;
use hicloud_console::{
    Candidate, CommandNode, ExecContext, IdCache, LookupError, Outcome, Render, ResourceHandler,
    ResourceKind, SubcommandSpec, Table,
};
use std::rc::Rc;

/// Backup windows the API accepts, in UTC.
pub const BACKUP_WINDOWS: [&str; 6] = ["22-02", "02-06", "06-10", "10-14", "14-18", "18-22"];

pub struct BackupHandler {
    api: Rc<CloudApi>,
}

impl BackupHandler {
    pub fn new(api: Rc<CloudApi>) -> Self {
        Self { api }
    }

    fn list(&self, args: &[String]) -> Result<Render> {
        let vm = args.first().map(|raw| parse_id(raw, "VM")).transpose()?;
        let mut backups = self.api.list_images(Some("backup"))?;
        if let Some(vm) = vm {
            backups.retain(|b| b.created_from.as_ref().map(|c| c.id) == Some(vm));
        }
        if backups.is_empty() {
            return Ok(Render::message("No backups found"));
        }

        let mut table = Table::new(["ID", "Description", "Created", "Size", "Server ID"]).titled("Backups");
        for b in &backups {
            table.row([
                b.id.to_string(),
                b.label().to_string(),
                short_date(&b.created),
                b.image_size.map_or_else(|| "-".to_string(), |gb| format!("{gb:.2} GB")),
                b.created_from
                    .as_ref()
                    .map_or_else(|| "-".to_string(), |c| c.id.to_string()),
            ]);
        }
        Ok(Render::Table(table))
    }

    fn enable(&self, raw: &str, window: Option<&str>) -> Result<Render> {
        let vm = parse_id(raw, "VM")?;
        if let Some(w) = window {
            if !BACKUP_WINDOWS.contains(&w) {
                return Err(CommandError::InvalidArgument(format!(
                    "Invalid backup window '{w}'. Must be one of: {}",
                    BACKUP_WINDOWS.join(", ")
                ))
                .into());
            }
        }
        let server = found(self.api.get_server(vm), "VM", vm)?;
        self.api.enable_backup(vm, window)?;
        Ok(Render::message(format!(
            "Automatic backups enabled for VM '{}' (ID: {vm})",
            server.name
        )))
    }

    fn disable(&self, raw: &str) -> Result<Render> {
        let vm = parse_id(raw, "VM")?;
        found(self.api.disable_backup(vm), "VM", vm)?;
        Ok(Render::message(format!("Automatic backups disabled for VM {vm}")))
    }

    fn delete(&self, raw: &str) -> Result<Render> {
        let id = parse_id(raw, "backup")?;
        found(self.api.delete_image(id), "Backup", id)?;
        Ok(Render::message(format!("Backup {id} deleted")))
    }
}

impl ResourceHandler for BackupHandler {
    fn describe(&self) -> CommandNode {
        CommandNode::new("backup", "Manage automatic backups")
            .sub(
                SubcommandSpec::new("list", "backup list [vm]")
                    .args(0, Some(1))
                    .summary("List backups, optionally for one VM"),
            )
            .sub(
                SubcommandSpec::new("enable", "backup enable <vm> [window]")
                    .args(1, Some(2))
                    .summary("Enable automatic backups"),
            )
            .sub(
                SubcommandSpec::new("disable", "backup disable <vm>")
                    .exactly(1)
                    .destructive()
                    .summary("Disable automatic backups and drop existing ones"),
            )
            .sub(
                SubcommandSpec::new("delete", "backup delete <id>")
                    .exactly(1)
                    .destructive()
                    .summary("Delete a backup"),
            )
    }

    fn execute(&self, _ctx: &mut ExecContext<'_>, sub: &str, args: &[String]) -> Outcome {
        finish(match (sub, args) {
            ("list", _) => self.list(args),
            ("enable", [vm]) => self.enable(vm, None),
            ("enable", [vm, window]) => self.enable(vm, Some(window.as_str())),
            ("disable", [vm]) => self.disable(vm),
            ("delete", [id]) => self.delete(id),
            _ => Err(CommandError::Usage(format!("Unknown backup subcommand: {sub}")).into()),
        })
    }

    fn complete(
        &self,
        cache: &mut IdCache,
        sub: &str,
        arg_index: usize,
        _args: &[String],
    ) -> Result<Vec<Candidate>, LookupError> {
        match (sub, arg_index) {
            ("list" | "enable" | "disable", 0) => id_candidates(cache, &self.api, ResourceKind::Server),
            ("enable", 1) => Ok(words(&BACKUP_WINDOWS)),
            ("delete", 0) => id_candidates(cache, &self.api, ResourceKind::Backup),
            _ => Ok(Vec::new()),
        }
    }

    fn confirm_prompt(&self, sub: &str, args: &[String]) -> Option<String> {
        match (sub, args) {
            ("disable", [vm]) => Some(format!(
                "Disable backups for VM {vm}? Existing backups of this VM are deleted."
            )),
            ("delete", [id]) => Some(format!("Delete backup {id}?")),
            _ => None,
        }
    }

    fn check(&self, sub: &str, args: &[String]) -> Result<(), Outcome> {
        precheck(match (sub, args) {
            ("disable", [vm]) => parse_id(vm, "VM").map(drop),
            ("delete", [id]) => parse_id(id, "backup").map(drop),
            _ => Ok(()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::{api, check, complete, run};
    use hicloud_api::{Method, MockTransport};
    use hicloud_console::ErrorKind;
    use serde_json::json;

    #[test]
    fn enable_passes_the_window() {
        let mock = Rc::new(MockTransport::new().with(
            Method::Get,
            "servers/42",
            json!({ "server": { "id": 42, "name": "web-1" } }),
        ));
        let h = BackupHandler::new(api(&mock));
        let run = run(&h, "enable", &["42", "02-06"], &[]);
        assert!(run.outcome.is_success());
        let post = mock.calls().into_iter().find(|c| c.method == Method::Post).expect("post");
        assert_eq!(post.path, "servers/42/actions/enable_backup");
        assert_eq!(post.body.expect("body")["backup_window"], "02-06");
    }

    #[test]
    fn unknown_window_is_rejected_before_any_call() {
        let mock = Rc::new(MockTransport::new());
        let h = BackupHandler::new(api(&mock));
        let run = run(&h, "enable", &["42", "01-05"], &[]);
        assert!(matches!(run.outcome, Outcome::Failure { kind: ErrorKind::InvalidArgument, .. }));
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn list_without_backups_says_so() {
        let mock = Rc::new(MockTransport::new().with(Method::Get, "images?type=backup", json!({ "images": [] })));
        let h = BackupHandler::new(api(&mock));
        assert_eq!(run(&h, "list", &[], &[]).outcome, Outcome::message("No backups found"));
    }

    #[test]
    fn window_completion_lists_every_window() {
        let h = BackupHandler::new(api(&Rc::new(MockTransport::new())));
        assert_eq!(complete(&h, "enable", 1, &["42"]).len(), BACKUP_WINDOWS.len());
    }

    #[test]
    fn disable_and_delete_need_numeric_ids() {
        let h = BackupHandler::new(api(&Rc::new(MockTransport::new())));
        assert!(check(&h, "disable", &["web"]).is_err());
        assert!(check(&h, "delete", &["-3"]).is_err());
        assert!(check(&h, "delete", &["300"]).is_ok());
    }
}
