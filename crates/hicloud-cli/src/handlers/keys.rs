//! `keys`: SSH keys stored in the project.

use super::{finish, found, id_candidates, parse_id, precheck, short_date, CommandError};
use anyhow::Result;
use hicloud_api::CloudApi;
use hicloud_console::{
    Candidate, CommandNode, Details, ExecContext, IdCache, LookupError, Outcome, Render,
    ResourceHandler, ResourceKind, SubcommandSpec, Table,
};
use std::rc::Rc;

pub struct KeysHandler {
    api: Rc<CloudApi>,
}

impl KeysHandler {
    pub fn new(api: Rc<CloudApi>) -> Self {
        Self { api }
    }

    fn list(&self) -> Result<Render> {
        let keys = self.api.list_ssh_keys()?;
        if keys.is_empty() {
            return Ok(Render::message("No SSH keys found"));
        }
        let mut table = Table::new(["ID", "Name", "Fingerprint", "Created"]).titled("SSH Keys");
        for k in &keys {
            table.row([
                k.id.to_string(),
                k.name.clone(),
                k.fingerprint.clone(),
                short_date(&k.created),
            ]);
        }
        Ok(Render::Table(table))
    }

    fn info(&self, raw: &str) -> Result<Render> {
        let id = parse_id(raw, "SSH key")?;
        let k = found(self.api.get_ssh_key(id), "SSH key", id)?;
        Ok(Render::Details(
            Details::new(format!("SSH Key Information: {} (ID: {id})", k.name))
                .field("Fingerprint", &k.fingerprint)
                .field("Created", short_date(&k.created))
                .field("Public Key", k.public_key.trim()),
        ))
    }

    fn delete(&self, raw: &str) -> Result<Render> {
        let id = parse_id(raw, "SSH key")?;
        found(self.api.delete_ssh_key(id), "SSH key", id)?;
        Ok(Render::message(format!("SSH key {id} deleted")))
    }
}

impl ResourceHandler for KeysHandler {
    fn describe(&self) -> CommandNode {
        CommandNode::new("keys", "Manage SSH keys")
            .sub(SubcommandSpec::new("list", "keys list").summary("List SSH keys"))
            .sub(SubcommandSpec::new("info", "keys info <id>").exactly(1).summary("Show an SSH key"))
            .sub(
                SubcommandSpec::new("delete", "keys delete <id>")
                    .exactly(1)
                    .destructive()
                    .summary("Delete an SSH key"),
            )
    }

    fn execute(&self, _ctx: &mut ExecContext<'_>, sub: &str, args: &[String]) -> Outcome {
        finish(match (sub, args) {
            ("list", _) => self.list(),
            ("info", [id]) => self.info(id),
            ("delete", [id]) => self.delete(id),
            _ => Err(CommandError::Usage(format!("Unknown keys subcommand: {sub}")).into()),
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
            ("info" | "delete", 0) => id_candidates(cache, &self.api, ResourceKind::SshKey),
            _ => Ok(Vec::new()),
        }
    }

    fn confirm_prompt(&self, sub: &str, args: &[String]) -> Option<String> {
        match (sub, args) {
            ("delete", [id]) => Some(format!("Delete SSH key {id}?")),
            _ => None,
        }
    }

    fn check(&self, sub: &str, args: &[String]) -> Result<(), Outcome> {
        precheck(match (sub, args) {
            ("delete", [id]) => parse_id(id, "SSH key").map(drop),
            _ => Ok(()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::{api, check, run};
    use hicloud_api::{Method, MockTransport};
    use hicloud_console::ErrorKind;
    use serde_json::json;

    #[test]
    fn list_shows_fingerprints() {
        let mock = Rc::new(MockTransport::new().with(
            Method::Get,
            "ssh_keys",
            json!({ "ssh_keys": [{ "id": 1, "name": "laptop", "fingerprint": "b7:2f:30:a0" }] }),
        ));
        let h = KeysHandler::new(api(&mock));
        let text = run(&h, "list", &[], &[]).text();
        assert!(text.contains("laptop"));
        assert!(text.contains("b7:2f:30:a0"));
    }

    #[test]
    fn delete_of_missing_key_is_not_found() {
        let mock = Rc::new(MockTransport::new());
        mock.fail(Method::Delete, "ssh_keys/3", 404, "ssh_key not found");
        let h = KeysHandler::new(api(&mock));
        let run = run(&h, "delete", &["3"], &[]);
        assert_eq!(run.outcome, Outcome::failure(ErrorKind::NotFound, "SSH key 3 not found"));
    }

    #[test]
    fn delete_by_name_is_rejected_up_front() {
        let h = KeysHandler::new(api(&Rc::new(MockTransport::new())));
        assert_eq!(
            check(&h, "delete", &["laptop"]),
            Err(Outcome::failure(
                ErrorKind::InvalidArgument,
                "Invalid SSH key ID: laptop (must be a positive integer)"
            ))
        );
    }
}
