//! `floating-ip`: floating IPs and their assignment.

use super::{
    dns_prompt, finish, found, id_candidates, ip_target, name_candidates, or_dash, parse_id, parse_ip_type, parse_toggle, precheck,
    rest, words, yes_no, CommandError,
};
use anyhow::Result;
use hicloud_api::types::CreateIp;
use hicloud_api::CloudApi;
use hicloud_console::{
    Candidate, CommandNode, Details, ExecContext, IdCache, LookupError, Outcome, Render,
    ResourceHandler, ResourceKind, SubcommandSpec, Table,
};
use std::rc::Rc;

pub struct FloatingIpHandler {
    api: Rc<CloudApi>,
}

impl FloatingIpHandler {
    pub fn new(api: Rc<CloudApi>) -> Self {
        Self { api }
    }

    fn list(&self) -> Result<Render> {
        let ips = self.api.list_floating_ips()?;
        if ips.is_empty() {
            return Ok(Render::message("No floating IPs found"));
        }
        let mut table =
            Table::new(["ID", "Name", "IP", "Type", "Server", "Location"]).titled("Floating IPs");
        for ip in &ips {
            table.row([
                ip.id.to_string(),
                ip.name.clone(),
                ip.ip.clone(),
                ip.ip_type.clone(),
                ip.server.map_or_else(|| "-".to_string(), |s| s.to_string()),
                or_dash(Some(&ip.home_location.name)),
            ]);
        }
        Ok(Render::Table(table))
    }

    fn info(&self, raw: &str) -> Result<Render> {
        let id = parse_id(raw, "floating IP")?;
        let ip = found(self.api.get_floating_ip(id), "Floating IP", id)?;
        Ok(Render::Details(
            Details::new(format!("Floating IP Information: {} (ID: {id})", ip.ip))
                .field("Name", or_dash(Some(&ip.name)))
                .field("Description", or_dash(ip.description.as_deref()))
                .field("Type", &ip.ip_type)
                .field("Server", ip.server.map_or_else(|| "Not assigned".to_string(), |s| s.to_string()))
                .field("Home Location", or_dash(Some(&ip.home_location.name)))
                .field("Blocked", yes_no(ip.blocked))
                .field("Delete Protection", yes_no(ip.protection.delete)),
        ))
    }

    fn create(&self, ip_type: &str, name: &str, target: &str, description: &[String]) -> Result<Render> {
        let params = CreateIp {
            name: name.to_string(),
            ip_type: parse_ip_type(ip_type)?.to_string(),
            target: ip_target(target),
        };
        let ip = self.api.create_floating_ip(&params, rest(description).as_deref())?;
        Ok(Render::message(format!(
            "Floating IP {} created with ID {}",
            ip.ip, ip.id
        )))
    }

    fn update(&self, raw: &str, name: &str, description: &[String]) -> Result<Render> {
        let id = parse_id(raw, "floating IP")?;
        let ip = found(
            self.api.update_floating_ip(id, name, rest(description).as_deref()),
            "Floating IP",
            id,
        )?;
        Ok(Render::message(format!("Floating IP {id} updated (name: {})", ip.name)))
    }

    fn dns(&self, raw: &str, address: &str, ptr: Option<&str>) -> Result<Render> {
        let id = parse_id(raw, "floating IP")?;
        let ptr = ptr.filter(|p| *p != "reset");
        found(self.api.change_floating_ip_dns(id, address, ptr), "Floating IP", id)?;
        Ok(Render::message(match ptr {
            Some(ptr) => format!("Reverse DNS for {address} set to {ptr}"),
            None => format!("Reverse DNS for {address} reset"),
        }))
    }

    fn assign(&self, ip: &str, vm: &str) -> Result<Render> {
        let ip = parse_id(ip, "floating IP")?;
        let vm = parse_id(vm, "VM")?;
        found(self.api.assign_floating_ip(ip, vm), "Floating IP", ip)?;
        Ok(Render::message(format!("Floating IP {ip} assigned to VM {vm}")))
    }

    fn unassign(&self, raw: &str) -> Result<Render> {
        let ip = parse_id(raw, "floating IP")?;
        found(self.api.unassign_floating_ip(ip), "Floating IP", ip)?;
        Ok(Render::message(format!("Floating IP {ip} unassigned")))
    }

    fn protect(&self, raw: &str, toggle: &str) -> Result<Render> {
        let ip = parse_id(raw, "floating IP")?;
        let on = parse_toggle(toggle)?;
        found(self.api.set_floating_ip_protection(ip, on), "Floating IP", ip)?;
        let state = if on { "enabled" } else { "disabled" };
        Ok(Render::message(format!("Delete protection {state} for floating IP {ip}")))
    }

    fn delete(&self, raw: &str) -> Result<Render> {
        let ip = parse_id(raw, "floating IP")?;
        found(self.api.delete_floating_ip(ip), "Floating IP", ip)?;
        Ok(Render::message(format!("Floating IP {ip} deleted")))
    }
}

impl ResourceHandler for FloatingIpHandler {
    fn describe(&self) -> CommandNode {
        CommandNode::new("floating-ip", "Manage floating IPs")
            .sub(SubcommandSpec::new("list", "floating-ip list").summary("List floating IPs"))
            .sub(SubcommandSpec::new("info", "floating-ip info <id>").exactly(1).summary("Show floating IP details"))
            .sub(
                SubcommandSpec::new("create", "floating-ip create <ipv4|ipv6> <name> <location|vm> [description...]")
                    .args(3, None)
                    .summary("Create a floating IP in a location or on a VM"),
            )
            .sub(
                SubcommandSpec::new("update", "floating-ip update <id> <name> [description...]")
                    .args(2, None)
                    .summary("Change name and description"),
            )
            .sub(
                SubcommandSpec::new("dns", "floating-ip dns <id> <ip> [ptr|reset]")
                    .args(2, Some(3))
                    .destructive()
                    .summary("Set or reset reverse DNS"),
            )
            .sub(
                SubcommandSpec::new("assign", "floating-ip assign <ip> <vm>")
                    .exactly(2)
                    .summary("Assign a floating IP to a VM"),
            )
            .sub(
                SubcommandSpec::new("unassign", "floating-ip unassign <ip>")
                    .exactly(1)
                    .destructive()
                    .summary("Unassign a floating IP"),
            )
            .sub(
                SubcommandSpec::new("protect", "floating-ip protect <ip> <enable|disable>")
                    .exactly(2)
                    .summary("Toggle delete protection"),
            )
            .sub(
                SubcommandSpec::new("delete", "floating-ip delete <id>")
                    .exactly(1)
                    .destructive()
                    .summary("Delete a floating IP"),
            )
    }

    fn execute(&self, _ctx: &mut ExecContext<'_>, sub: &str, args: &[String]) -> Outcome {
        finish(match (sub, args) {
            ("list", _) => self.list(),
            ("info", [id]) => self.info(id),
            ("create", [ip_type, name, target, desc @ ..]) => self.create(ip_type, name, target, desc),
            ("update", [id, name, desc @ ..]) => self.update(id, name, desc),
            ("dns", [id, address]) => self.dns(id, address, None),
            ("dns", [id, address, ptr]) => self.dns(id, address, Some(ptr)),
            ("assign", [ip, vm]) => self.assign(ip, vm),
            ("unassign", [ip]) => self.unassign(ip),
            ("protect", [ip, toggle]) => self.protect(ip, toggle),
            ("delete", [ip]) => self.delete(ip),
            _ => Err(CommandError::Usage(format!("Unknown floating-ip subcommand: {sub}")).into()),
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
            ("list", _) => Ok(Vec::new()),
            ("create", 0) => Ok(words(&["ipv4", "ipv6"])),
            ("create", 2) => name_candidates(cache, &self.api, ResourceKind::Location),
            ("create", _) => Ok(Vec::new()),
            (_, 0) => id_candidates(cache, &self.api, ResourceKind::FloatingIp),
            ("assign", 1) => id_candidates(cache, &self.api, ResourceKind::Server),
            ("dns", 2) => Ok(words(&["reset"])),
            ("protect", 1) => Ok(words(&["enable", "disable"])),
            _ => Ok(Vec::new()),
        }
    }

    fn confirm_prompt(&self, sub: &str, args: &[String]) -> Option<String> {
        match (sub, args) {
            ("unassign", [ip]) => Some(format!("Unassign floating IP {ip} from its VM?")),
            ("delete", [ip]) => Some(format!("Delete floating IP {ip}? The address is released.")),
            ("dns", _) => dns_prompt("floating IP", args),
            _ => None,
        }
    }

    fn check(&self, sub: &str, args: &[String]) -> Result<(), Outcome> {
        precheck(match (sub, args) {
            ("unassign" | "delete" | "dns", [id, ..]) => parse_id(id, "floating IP").map(drop),
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
    use serde_json::{json, Value};

    #[test]
    fn list_shows_assignment() {
        let mock = Rc::new(MockTransport::new().with(
            Method::Get,
            "floating_ips",
            json!({ "floating_ips": [
                { "id": 4, "name": "front", "ip": "203.0.113.7", "type": "ipv4", "server": 42, "home_location": { "name": "fsn1" } },
                { "id": 5, "ip": "2001:db8::", "type": "ipv6" }
            ]}),
        ));
        let h = FloatingIpHandler::new(api(&mock));
        let text = run(&h, "list", &[], &[]).text();
        assert!(text.contains("203.0.113.7"));
        assert!(text.contains("2001:db8::"));
    }

    #[test]
    fn assign_posts_the_server() {
        let mock = Rc::new(MockTransport::new());
        let h = FloatingIpHandler::new(api(&mock));
        let run = run(&h, "assign", &["4", "42"], &[]);
        assert_eq!(run.outcome, Outcome::message("Floating IP 4 assigned to VM 42"));
        let call = &mock.calls()[0];
        assert_eq!(call.path, "floating_ips/4/actions/assign");
        assert_eq!(call.body.as_ref().expect("body")["server"], 42);
    }

    #[test]
    fn completion_labels_ids_with_addresses() {
        let mock = Rc::new(MockTransport::new().with(
            Method::Get,
            "floating_ips",
            json!({ "floating_ips": [{ "id": 4, "ip": "203.0.113.7" }] }),
        ));
        let h = FloatingIpHandler::new(api(&mock));
        assert_eq!(complete(&h, "unassign", 0, &[]), vec!["4"]);
        assert_eq!(complete(&h, "protect", 1, &["4"]), vec!["enable", "disable"]);
    }

    #[test]
    fn create_in_a_location_with_description() {
        let mock = Rc::new(MockTransport::new().with(
            Method::Post,
            "floating_ips",
            json!({ "floating_ip": { "id": 6, "ip": "203.0.113.9", "type": "ipv4" } }),
        ));
        let h = FloatingIpHandler::new(api(&mock));
        let run = run(&h, "create", &["ipv4", "front", "fsn1", "public", "entry"], &[]);
        assert_eq!(run.outcome, Outcome::message("Floating IP 203.0.113.9 created with ID 6"));
        let body = mock.calls()[0].body.clone().expect("body");
        assert_eq!(body["home_location"], "fsn1");
        assert_eq!(body["description"], "public entry");
        assert!(body.get("server").is_none());
    }

    #[test]
    fn create_rejects_unknown_family() {
        let mock = Rc::new(MockTransport::new());
        let h = FloatingIpHandler::new(api(&mock));
        let run = run(&h, "create", &["ipv5", "front", "42"], &[]);
        assert_eq!(
            run.outcome,
            Outcome::failure(ErrorKind::InvalidArgument, "Expected 'ipv4' or 'ipv6', got 'ipv5'")
        );
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn dns_reset_sends_no_pointer() {
        let mock = Rc::new(MockTransport::new());
        let h = FloatingIpHandler::new(api(&mock));
        let run = run(&h, "dns", &["4", "203.0.113.7", "reset"], &[]);
        assert_eq!(run.outcome, Outcome::message("Reverse DNS for 203.0.113.7 reset"));
        let call = &mock.calls()[0];
        assert_eq!(call.path, "floating_ips/4/actions/change_dns_ptr");
        assert_eq!(call.body.as_ref().expect("body")["dns_ptr"], Value::Null);
        assert_eq!(
            h.confirm_prompt("dns", &["4".into(), "203.0.113.7".into(), "web.example.com".into()])
                .as_deref(),
            Some("Set reverse DNS for 203.0.113.7 to web.example.com on floating IP 4?")
        );
    }

    #[test]
    fn update_keeps_description_words_together() {
        let mock = Rc::new(MockTransport::new().with(
            Method::Put,
            "floating_ips/4",
            json!({ "floating_ip": { "id": 4, "name": "edge" } }),
        ));
        let h = FloatingIpHandler::new(api(&mock));
        let run = run(&h, "update", &["4", "edge", "main", "entry"], &[]);
        assert_eq!(run.outcome, Outcome::message("Floating IP 4 updated (name: edge)"));
        assert_eq!(mock.calls()[0].body.as_ref().expect("body")["description"], "main entry");
    }

    #[test]
    fn malformed_ids_are_rejected_before_confirmation() {
        let h = FloatingIpHandler::new(api(&Rc::new(MockTransport::new())));
        assert!(check(&h, "delete", &["front"]).is_err());
        assert!(check(&h, "dns", &["x", "203.0.113.7"]).is_err());
        assert!(check(&h, "unassign", &["4"]).is_ok());
    }
}
