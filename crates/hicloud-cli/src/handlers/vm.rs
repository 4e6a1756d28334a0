//! `vm` (alias `server`): server lifecycle.

use super::{
    finish, found, id_candidates, name_candidates, or_dash, parse_id, precheck, short_date, yes_no,
    CommandError,
};
use anyhow::{Context, Result};
use hicloud_api::types::CreateServer;
use hicloud_api::CloudApi;
use hicloud_console::{
    Candidate, CommandNode, Details, ExecContext, IdCache, LookupError, Outcome, Render,
    ResourceHandler, ResourceKind, SubcommandSpec, Table,
};
use std::rc::Rc;

pub struct VmHandler {
    api: Rc<CloudApi>,
}

impl VmHandler {
    pub fn new(api: Rc<CloudApi>) -> Self {
        Self { api }
    }

    fn list(&self) -> Result<Render> {
        let servers = self.api.list_servers()?;
        if servers.is_empty() {
            return Ok(Render::message("No VMs found"));
        }
        let mut table = Table::new(["ID", "Name", "Status", "Type", "IPv4", "Location"])
            .titled(format!("Virtual Machines: {}", servers.len()));
        for s in &servers {
            table.row([
                s.id.to_string(),
                s.name.clone(),
                s.status.clone(),
                s.server_type.name.clone(),
                s.ipv4().to_string(),
                or_dash(Some(&s.datacenter.location.name)),
            ]);
        }
        Ok(Render::Table(table))
    }

    fn info(&self, raw: &str) -> Result<Render> {
        let id = parse_id(raw, "VM")?;
        let s = found(self.api.get_server(id), "VM", id)?;

        let backup = match &s.backup_window {
            Some(w) if !w.is_empty() => format!("Enabled (Window: {w})"),
            _ => "Disabled".to_string(),
        };
        let image = s
            .image
            .as_ref()
            .map(|i| i.label().to_string())
            .unwrap_or_else(|| "-".to_string());

        let details = Details::new(format!("VM Information: {} (ID: {id})", s.name))
            .field("Status", &s.status)
            .field("Created", short_date(&s.created))
            .field("Type", &s.server_type.name)
            .field("CPU Cores", s.server_type.cores)
            .field("Memory", format!("{} GB", s.server_type.memory))
            .field("Disk", format!("{} GB", s.server_type.disk))
            .field("Datacenter", or_dash(Some(&s.datacenter.name)))
            .field("City", or_dash(Some(&s.datacenter.location.city)))
            .field("Country", or_dash(Some(&s.datacenter.location.country)))
            .field("IPv4", s.ipv4())
            .field("IPv6", s.ipv6())
            .field("Image", image)
            .field("Volumes", s.volumes.len())
            .field("Backup", backup)
            .field("Delete Protection", yes_no(s.protection.delete))
            .field("Rebuild Protection", yes_no(s.protection.rebuild));
        Ok(Render::Details(details))
    }

    fn create(&self, args: &[String]) -> Result<Render> {
        let [name, server_type, image, rest @ ..] = args else {
            return Err(CommandError::Usage("vm create <name> <type> <image> [location]".into()).into());
        };
        let params = CreateServer {
            name: name.clone(),
            server_type: server_type.clone(),
            image: image.clone(),
            location: rest.first().cloned(),
            ssh_keys: Vec::new(),
            start_after_create: true,
        };
        let s = self
            .api
            .create_server(&params)
            .with_context(|| format!("failed to create VM '{name}'"))?;
        Ok(Render::Details(
            Details::new("VM created successfully")
                .field("ID", s.id)
                .field("Name", &s.name)
                .field("Status", &s.status)
                .field("IPv4", s.ipv4()),
        ))
    }

    fn power(&self, sub: &str, raw: &str) -> Result<Render> {
        let id = parse_id(raw, "VM")?;
        let (result, done) = match sub {
            "start" => (self.api.power_on(id), "started"),
            "stop" => (self.api.stop_server(id), "stopped"),
            _ => (self.api.reboot(id), "rebooted"),
        };
        found(result, "VM", id)?;
        Ok(Render::message(format!("VM {id} {done}")))
    }

    fn rename(&self, raw: &str, name: &str) -> Result<Render> {
        let id = parse_id(raw, "VM")?;
        found(self.api.rename_server(id, name), "VM", id)?;
        Ok(Render::message(format!("VM {id} renamed to '{name}'")))
    }

    fn resize(&self, raw: &str, server_type: &str) -> Result<Render> {
        let id = parse_id(raw, "VM")?;
        found(self.api.change_server_type(id, server_type, false), "VM", id)?;
        Ok(Render::message(format!("VM {id} resized to {server_type}")))
    }

    fn delete(&self, raw: &str) -> Result<Render> {
        let id = parse_id(raw, "VM")?;
        found(self.api.delete_server(id), "VM", id)?;
        Ok(Render::message(format!("VM {id} deleted")))
    }

    fn server_type_names(&self) -> Result<Vec<Candidate>, LookupError> {
        let types = self
            .api
            .list_server_types()
            .map_err(|e| LookupError::Unavailable(e.to_string()))?;
        Ok(types.into_iter().map(|t| Candidate::word(t.name)).collect())
    }
}

impl ResourceHandler for VmHandler {
    fn describe(&self) -> CommandNode {
        CommandNode::new("vm", "Manage virtual machines")
            .alias("server")
            .sub(SubcommandSpec::new("list", "vm list").summary("List all VMs"))
            .sub(SubcommandSpec::new("info", "vm info <id>").exactly(1).summary("Show VM details"))
            .sub(
                SubcommandSpec::new("create", "vm create <name> <type> <image> [location]")
                    .args(3, Some(4))
                    .summary("Create a new VM"),
            )
            .sub(SubcommandSpec::new("start", "vm start <id>").exactly(1).summary("Power on a VM"))
            .sub(SubcommandSpec::new("stop", "vm stop <id>").exactly(1).summary("Shut down a VM"))
            .sub(SubcommandSpec::new("reboot", "vm reboot <id>").exactly(1).summary("Reboot a VM"))
            .sub(
                SubcommandSpec::new("rename", "vm rename <id> <name>")
                    .exactly(2)
                    .summary("Rename a VM"),
            )
            .sub(
                SubcommandSpec::new("resize", "vm resize <id> <type>")
                    .exactly(2)
                    .destructive()
                    .summary("Change the server type of a stopped VM"),
            )
            .sub(
                SubcommandSpec::new("delete", "vm delete <id>")
                    .exactly(1)
                    .destructive()
                    .summary("Delete a VM"),
            )
    }

    fn execute(&self, _ctx: &mut ExecContext<'_>, sub: &str, args: &[String]) -> Outcome {
        finish(match (sub, args) {
            ("list", _) => self.list(),
            ("info", [id]) => self.info(id),
            ("create", _) => self.create(args),
            ("start" | "stop" | "reboot", [id]) => self.power(sub, id),
            ("rename", [id, name]) => self.rename(id, name),
            ("resize", [id, server_type]) => self.resize(id, server_type),
            ("delete", [id]) => self.delete(id),
            _ => Err(CommandError::Usage(format!("Unknown VM subcommand: {sub}")).into()),
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
            ("create", 1) | ("resize", 1) => self.server_type_names(),
            ("create", 3) => name_candidates(cache, &self.api, ResourceKind::Location),
            ("create", _) | ("list", _) => Ok(Vec::new()),
            (_, 0) => id_candidates(cache, &self.api, ResourceKind::Server),
            _ => Ok(Vec::new()),
        }
    }

    fn confirm_prompt(&self, sub: &str, args: &[String]) -> Option<String> {
        match (sub, args) {
            ("delete", [id]) => Some(format!("Delete VM {id}? This cannot be undone.")),
            ("resize", [id, t]) => Some(format!(
                "Resize VM {id} to {t}? The VM must be powered off."
            )),
            _ => None,
        }
    }

    fn check(&self, sub: &str, args: &[String]) -> Result<(), Outcome> {
        precheck(match (sub, args) {
            ("delete", [id]) | ("resize", [id, _]) => parse_id(id, "VM").map(drop),
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

    fn servers() -> serde_json::Value {
        json!({ "servers": [
            { "id": 42, "name": "web-1", "status": "running",
              "server_type": { "name": "cx22" },
              "public_net": { "ipv4": { "ip": "1.2.3.4" } },
              "datacenter": { "name": "fsn1-dc14", "location": { "name": "fsn1" } } },
            { "id": 43, "name": "db-1", "status": "off", "server_type": { "name": "cx32" } }
        ]})
    }

    #[test]
    fn list_renders_a_table() {
        let mock = Rc::new(MockTransport::new().with(Method::Get, "servers", servers()));
        let h = VmHandler::new(api(&mock));
        let text = run(&h, "list", &[], &[]).text();
        assert!(text.contains("Virtual Machines: 2"));
        assert!(text.contains("web-1"));
        assert!(text.contains("1.2.3.4"));
        assert!(text.contains("fsn1"));
    }

    #[test]
    fn info_of_unknown_vm_is_not_found() {
        let mock = Rc::new(MockTransport::new());
        let h = VmHandler::new(api(&mock));
        let run = run(&h, "info", &["9"], &[]);
        assert_eq!(run.outcome, Outcome::failure(ErrorKind::NotFound, "VM 9 not found"));
    }

    #[test]
    fn invalid_id_never_reaches_the_api() {
        let mock = Rc::new(MockTransport::new());
        let h = VmHandler::new(api(&mock));
        let run = run(&h, "start", &["abc"], &[]);
        assert!(matches!(run.outcome, Outcome::Failure { kind: ErrorKind::InvalidArgument, .. }));
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn start_posts_the_power_on_action() {
        let mock = Rc::new(MockTransport::new());
        let h = VmHandler::new(api(&mock));
        let run = run(&h, "start", &["42"], &[]);
        assert_eq!(run.outcome, Outcome::message("VM 42 started"));
        assert_eq!(mock.calls_to(Method::Post, "servers/42/actions/poweron"), 1);
    }

    #[test]
    fn create_sends_the_positional_fields() {
        let mock = Rc::new(MockTransport::new().with(
            Method::Post,
            "servers",
            json!({ "server": { "id": 7, "name": "new", "status": "initializing" } }),
        ));
        let h = VmHandler::new(api(&mock));
        let run = run(&h, "create", &["new", "cx22", "ubuntu-24.04", "nbg1"], &[]);
        assert!(run.outcome.is_success());
        let body = mock.calls()[0].body.clone().expect("body");
        assert_eq!(body["server_type"], "cx22");
        assert_eq!(body["location"], "nbg1");
        assert_eq!(body["start_after_create"], true);
    }

    #[test]
    fn rename_uses_put() {
        let mock = Rc::new(MockTransport::new().with(
            Method::Put,
            "servers/42",
            json!({ "server": { "id": 42, "name": "web-2" } }),
        ));
        let h = VmHandler::new(api(&mock));
        run(&h, "rename", &["42", "web-2"], &[]);
        assert_eq!(mock.calls()[0].body.as_ref().expect("body")["name"], "web-2");
    }

    #[test]
    fn completes_server_ids_for_id_arguments() {
        let mock = Rc::new(MockTransport::new().with(Method::Get, "servers", servers()));
        let h = VmHandler::new(api(&mock));
        assert_eq!(complete(&h, "delete", 0, &[]), vec!["42", "43"]);
        assert!(complete(&h, "delete", 1, &["42"]).is_empty());
        assert_eq!(mock.write_calls(), 0);
    }

    #[test]
    fn destructive_prompts_name_the_vm() {
        let h = VmHandler::new(api(&Rc::new(MockTransport::new())));
        let prompt = h.confirm_prompt("delete", &["42".to_string()]).expect("prompt");
        assert!(prompt.contains("VM 42"));
    }

    #[test]
    fn delete_of_a_name_fails_before_any_prompt() {
        let h = VmHandler::new(api(&Rc::new(MockTransport::new())));
        assert_eq!(
            check(&h, "delete", &["web"]),
            Err(Outcome::failure(
                ErrorKind::InvalidArgument,
                "Invalid VM ID: web (must be a positive integer)"
            ))
        );
        assert!(check(&h, "resize", &["0", "cx32"]).is_err());
        assert!(check(&h, "delete", &["42"]).is_ok());
    }
}
