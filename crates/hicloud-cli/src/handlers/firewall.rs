//! `firewall`: firewalls, their rules and the servers they apply to.

use super::{
    finish, found, id_candidates, or_dash, parse_id, parse_id_list, precheck, short_date, CommandError,
};
use anyhow::Result;
use hicloud_api::types::{Firewall, FirewallRule};
use hicloud_api::CloudApi;
use hicloud_console::{
    Candidate, CommandNode, Details, ExecContext, IdCache, LookupError, Outcome, Render,
    ResourceHandler, ResourceKind, SubcommandSpec, Table,
};
use std::rc::Rc;

pub struct FirewallHandler {
    api: Rc<CloudApi>,
}

fn applied_servers(fw: &Firewall) -> Vec<u64> {
    fw.applied_to
        .iter()
        .filter(|a| a.kind == "server")
        .filter_map(|a| a.server.as_ref().map(|s| s.id))
        .collect()
}

fn rules_table(rules: &[FirewallRule]) -> Table {
    let mut table = Table::new(["Direction", "Protocol", "Port", "Source/Destination", "Description"])
        .titled("Rules");
    for r in rules {
        let ips = if r.direction == "in" { &r.source_ips } else { &r.destination_ips };
        table.row([
            r.direction.clone(),
            r.protocol.clone(),
            or_dash(r.port.as_deref()),
            if ips.is_empty() { "-".to_string() } else { ips.join(", ") },
            or_dash(r.description.as_deref()),
        ]);
    }
    table
}

/// `<vm[,vm...]>` spread over one or more tokens; any non-id is rejected.
fn server_ids(args: &[String]) -> Result<Vec<u64>, CommandError> {
    let (ids, invalid) = parse_id_list(args);
    if !invalid.is_empty() {
        return Err(CommandError::InvalidArgument(format!(
            "Invalid VM ID(s): {}",
            invalid.join(", ")
        )));
    }
    if ids.is_empty() {
        return Err(CommandError::Usage("No VM IDs given".into()));
    }
    Ok(ids)
}

fn id_list(ids: &[u64]) -> String {
    ids.iter().map(u64::to_string).collect::<Vec<_>>().join(", ")
}

impl FirewallHandler {
    pub fn new(api: Rc<CloudApi>) -> Self {
        Self { api }
    }

    fn list(&self) -> Result<Render> {
        let firewalls = self.api.list_firewalls()?;
        if firewalls.is_empty() {
            return Ok(Render::message("No firewalls found"));
        }
        let mut table = Table::new(["ID", "Name", "Rules", "Applied To", "Created"]).titled("Firewalls");
        for fw in &firewalls {
            table.row([
                fw.id.to_string(),
                fw.name.clone(),
                fw.rules.len().to_string(),
                format!("{} server(s)", applied_servers(fw).len()),
                short_date(&fw.created),
            ]);
        }
        Ok(Render::Table(table))
    }

    fn info(&self, raw: &str) -> Result<Render> {
        let id = parse_id(raw, "firewall")?;
        let fw = found(self.api.get_firewall(id), "Firewall", id)?;
        let servers = applied_servers(&fw);
        let details = Details::new(format!("Firewall Information: {} (ID: {id})", fw.name))
            .field("Created", short_date(&fw.created))
            .field("Rules", fw.rules.len())
            .field("Applied To", if servers.is_empty() { "-".to_string() } else { id_list(&servers) });
        Ok(Render::Sequence(vec![Render::Details(details), Render::Table(rules_table(&fw.rules))]))
    }

    fn rules(&self, raw: &str) -> Result<Render> {
        let id = parse_id(raw, "firewall")?;
        let fw = found(self.api.get_firewall(id), "Firewall", id)?;
        Ok(Render::Table(
            rules_table(&fw.rules).titled(format!("Rules of firewall '{}' (ID: {id})", fw.name)),
        ))
    }

    fn create(&self, name: &str, vms: &[String]) -> Result<Render> {
        let servers = if vms.is_empty() { Vec::new() } else { server_ids(vms)? };
        let fw = self.api.create_firewall(name, &servers)?;
        let mut text = format!("Firewall '{}' created with ID {}", fw.name, fw.id);
        if !servers.is_empty() {
            text.push_str(&format!(" and applied to VM(s) {}", id_list(&servers)));
        }
        Ok(Render::message(text))
    }

    fn update(&self, raw: &str, name: &str) -> Result<Render> {
        let id = parse_id(raw, "firewall")?;
        let fw = found(self.api.rename_firewall(id, name), "Firewall", id)?;
        Ok(Render::message(format!("Firewall {id} renamed to '{}'", fw.name)))
    }

    fn apply(&self, raw: &str, vms: &[String]) -> Result<Render> {
        let id = parse_id(raw, "firewall")?;
        let servers = server_ids(vms)?;
        found(self.api.apply_firewall(id, &servers), "Firewall", id)?;
        Ok(Render::message(format!("Firewall {id} applied to VM(s) {}", id_list(&servers))))
    }

    fn remove(&self, raw: &str, vms: &[String]) -> Result<Render> {
        let id = parse_id(raw, "firewall")?;
        let servers = server_ids(vms)?;
        found(self.api.remove_firewall(id, &servers), "Firewall", id)?;
        Ok(Render::message(format!("Firewall {id} removed from VM(s) {}", id_list(&servers))))
    }

    fn delete(&self, raw: &str) -> Result<Render> {
        let id = parse_id(raw, "firewall")?;
        found(self.api.delete_firewall(id), "Firewall", id)?;
        Ok(Render::message(format!("Firewall {id} deleted")))
    }
}

impl ResourceHandler for FirewallHandler {
    fn describe(&self) -> CommandNode {
        CommandNode::new("firewall", "Manage firewalls")
            .sub(SubcommandSpec::new("list", "firewall list").summary("List firewalls"))
            .sub(SubcommandSpec::new("info", "firewall info <id>").exactly(1).summary("Show firewall details"))
            .sub(SubcommandSpec::new("rules", "firewall rules <id>").exactly(1).summary("Show firewall rules"))
            .sub(
                SubcommandSpec::new("create", "firewall create <name> [vm[,vm...]]")
                    .args(1, None)
                    .summary("Create a firewall, optionally applied to VMs"),
            )
            .sub(
                SubcommandSpec::new("update", "firewall update <id> <name>")
                    .exactly(2)
                    .summary("Rename a firewall"),
            )
            .sub(
                SubcommandSpec::new("apply", "firewall apply <firewall> <vm[,vm...]>")
                    .args(2, None)
                    .summary("Apply a firewall to VMs"),
            )
            .sub(
                SubcommandSpec::new("remove", "firewall remove <firewall> <vm[,vm...]>")
                    .args(2, None)
                    .destructive()
                    .summary("Remove a firewall from VMs"),
            )
            .sub(
                SubcommandSpec::new("delete", "firewall delete <id>")
                    .exactly(1)
                    .destructive()
                    .summary("Delete a firewall"),
            )
    }

    fn execute(&self, _ctx: &mut ExecContext<'_>, sub: &str, args: &[String]) -> Outcome {
        finish(match (sub, args) {
            ("list", _) => self.list(),
            ("info", [id]) => self.info(id),
            ("rules", [id]) => self.rules(id),
            ("create", [name, vms @ ..]) => self.create(name, vms),
            ("update", [id, name]) => self.update(id, name),
            ("apply", [id, vms @ ..]) => self.apply(id, vms),
            ("remove", [id, vms @ ..]) => self.remove(id, vms),
            ("delete", [id]) => self.delete(id),
            _ => Err(CommandError::Usage(format!("Unknown firewall subcommand: {sub}")).into()),
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
            ("list", _) | ("create", 0) => Ok(Vec::new()),
            (_, 0) => id_candidates(cache, &self.api, ResourceKind::Firewall),
            ("apply" | "remove" | "create", _) => id_candidates(cache, &self.api, ResourceKind::Server),
            _ => Ok(Vec::new()),
        }
    }

    fn check(&self, sub: &str, args: &[String]) -> Result<(), Outcome> {
        precheck(match (sub, args) {
            ("remove", [id, vms @ ..]) => parse_id(id, "firewall").and_then(|_| server_ids(vms).map(drop)),
            ("delete", [id]) => parse_id(id, "firewall").map(drop),
            _ => Ok(()),
        })
    }

    fn confirm_prompt(&self, sub: &str, args: &[String]) -> Option<String> {
        match (sub, args) {
            ("remove", [id, vms @ ..]) => Some(format!(
                "Remove firewall {id} from VM(s) {}?",
                vms.join(" ")
            )),
            ("delete", [id]) => Some(format!("Delete firewall {id}?")),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::{api, check, run};
    use hicloud_api::{Method, MockTransport};
    use hicloud_console::ErrorKind;
    use serde_json::json;

    fn firewall() -> serde_json::Value {
        json!({ "firewall": { "id": 8, "name": "web",
            "rules": [
                { "direction": "in", "protocol": "tcp", "port": "22", "source_ips": ["0.0.0.0/0"], "description": "ssh" },
                { "direction": "out", "protocol": "icmp", "destination_ips": [] }
            ],
            "applied_to": [
                { "type": "server", "server": { "id": 42 } },
                { "type": "label_selector" }
            ] } })
    }

    #[test]
    fn info_lists_rules_and_targets() {
        let mock = Rc::new(MockTransport::new().with(Method::Get, "firewalls/8", firewall()));
        let h = FirewallHandler::new(api(&mock));
        let text = run(&h, "info", &["8"], &[]).text();
        assert!(text.contains("Firewall Information: web (ID: 8)"));
        assert!(text.contains("0.0.0.0/0"));
        assert!(text.contains("ssh"));
        assert!(text.contains("Applied To:"));
    }

    #[test]
    fn apply_accepts_comma_separated_ids() {
        let mock = Rc::new(MockTransport::new());
        let h = FirewallHandler::new(api(&mock));
        let run = run(&h, "apply", &["8", "42,43"], &[]);
        assert_eq!(run.outcome, Outcome::message("Firewall 8 applied to VM(s) 42, 43"));
        let body = mock.calls()[0].body.clone().expect("body");
        assert_eq!(body["apply_to"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn apply_rejects_bad_ids_without_calling() {
        let mock = Rc::new(MockTransport::new());
        let h = FirewallHandler::new(api(&mock));
        let run = run(&h, "apply", &["8", "42,web"], &[]);
        assert_eq!(
            run.outcome,
            Outcome::failure(ErrorKind::InvalidArgument, "Invalid VM ID(s): web")
        );
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn create_applies_to_listed_servers() {
        let mock = Rc::new(MockTransport::new().with(
            Method::Post,
            "firewalls",
            json!({ "firewall": { "id": 9, "name": "db" } }),
        ));
        let h = FirewallHandler::new(api(&mock));
        let run = run(&h, "create", &["db", "42,43"], &[]);
        assert_eq!(
            run.outcome,
            Outcome::message("Firewall 'db' created with ID 9 and applied to VM(s) 42, 43")
        );
        let body = mock.calls()[0].body.clone().expect("body");
        assert_eq!(body["name"], "db");
        assert_eq!(body["apply_to"][1]["server"]["id"], 43);
    }

    #[test]
    fn update_renames() {
        let mock = Rc::new(MockTransport::new().with(
            Method::Put,
            "firewalls/8",
            json!({ "firewall": { "id": 8, "name": "edge" } }),
        ));
        let h = FirewallHandler::new(api(&mock));
        let run = run(&h, "update", &["8", "edge"], &[]);
        assert_eq!(run.outcome, Outcome::message("Firewall 8 renamed to 'edge'"));
        assert_eq!(mock.calls()[0].body.as_ref().map(|b| b["name"].clone()), Some(json!("edge")));
    }

    #[test]
    fn remove_with_bad_server_list_is_rejected_up_front() {
        let h = FirewallHandler::new(api(&Rc::new(MockTransport::new())));
        assert_eq!(
            check(&h, "remove", &["8", "web"]),
            Err(Outcome::failure(ErrorKind::InvalidArgument, "Invalid VM ID(s): web"))
        );
        assert!(check(&h, "remove", &["8", "42"]).is_ok());
        assert!(check(&h, "delete", &["x"]).is_err());
        assert!(check(&h, "delete", &["8"]).is_ok());
    }

    #[test]
    fn applied_servers_ignores_label_selectors() {
        let fw: Firewall = serde_json::from_value(firewall()["firewall"].clone()).expect("decode");
        assert_eq!(applied_servers(&fw), vec![42]);
    }
}
