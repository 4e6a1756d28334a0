//! `primary-ip`: primary IPs.

use super::{
    dns_prompt, finish, found, id_candidates, ip_target, name_candidates, or_dash, parse_id,
    parse_ip_type, parse_toggle, precheck, words, yes_no, CommandError,
};
use anyhow::Result;
use hicloud_api::types::CreateIp;
use hicloud_api::CloudApi;
use hicloud_console::{
    Candidate, CommandNode, Details, ExecContext, IdCache, LookupError, Outcome, Render,
    ResourceHandler, ResourceKind, SubcommandSpec, Table,
};
use std::rc::Rc;

fn parse_yes_no(raw: &str) -> Result<bool, CommandError> {
    match raw {
        "yes" => Ok(true),
        "no" => Ok(false),
        other => Err(CommandError::InvalidArgument(format!(
            "Expected 'yes' or 'no', got '{other}'"
        ))),
    }
}

pub struct PrimaryIpHandler {
    api: Rc<CloudApi>,
}

impl PrimaryIpHandler {
    pub fn new(api: Rc<CloudApi>) -> Self {
        Self { api }
    }

    fn list(&self) -> Result<Render> {
        let ips = self.api.list_primary_ips()?;
        if ips.is_empty() {
            return Ok(Render::message("No primary IPs found"));
        }
        let mut table = Table::new(["ID", "Name", "IP", "Type", "Assignee", "Datacenter", "Auto Delete"])
            .titled("Primary IPs");
        for ip in &ips {
            table.row([
                ip.id.to_string(),
                ip.name.clone(),
                ip.ip.clone(),
                ip.ip_type.clone(),
                ip.assignee_id.map_or_else(|| "-".to_string(), |a| a.to_string()),
                or_dash(Some(&ip.datacenter.name)),
                yes_no(ip.auto_delete).to_string(),
            ]);
        }
        Ok(Render::Table(table))
    }

    fn info(&self, raw: &str) -> Result<Render> {
        let id = parse_id(raw, "primary IP")?;
        let ip = found(self.api.get_primary_ip(id), "Primary IP", id)?;
        let assignee = match ip.assignee_id {
            Some(a) => format!("{} {a}", or_dash(Some(&ip.assignee_type))),
            None => "Not assigned".to_string(),
        };
        Ok(Render::Details(
            Details::new(format!("Primary IP Information: {} (ID: {id})", ip.ip))
                .field("Name", or_dash(Some(&ip.name)))
                .field("Type", &ip.ip_type)
                .field("Assignee", assignee)
                .field("Datacenter", or_dash(Some(&ip.datacenter.name)))
                .field("Auto Delete", yes_no(ip.auto_delete))
                .field("Blocked", yes_no(ip.blocked))
                .field("Delete Protection", yes_no(ip.protection.delete)),
        ))
    }

    fn create(&self, ip_type: &str, name: &str, target: &str, auto_delete: Option<&str>) -> Result<Render> {
        let params = CreateIp {
            name: name.to_string(),
            ip_type: parse_ip_type(ip_type)?.to_string(),
            target: ip_target(target),
        };
        let auto_delete = auto_delete.map(parse_yes_no).transpose()?.unwrap_or(false);
        let ip = self.api.create_primary_ip(&params, auto_delete)?;
        Ok(Render::message(format!("Primary IP {} created with ID {}", ip.ip, ip.id)))
    }

    fn update(&self, raw: &str, name: &str, auto_delete: Option<&str>) -> Result<Render> {
        let id = parse_id(raw, "primary IP")?;
        let auto_delete = auto_delete.map(parse_yes_no).transpose()?;
        let ip = found(self.api.update_primary_ip(id, name, auto_delete), "Primary IP", id)?;
        Ok(Render::message(format!(
            "Primary IP {id} updated (name: {}, auto delete: {})",
            ip.name,
            yes_no(ip.auto_delete)
        )))
    }

    fn dns(&self, raw: &str, address: &str, ptr: Option<&str>) -> Result<Render> {
        let id = parse_id(raw, "primary IP")?;
        let ptr = ptr.filter(|p| *p != "reset");
        found(self.api.change_primary_ip_dns(id, address, ptr), "Primary IP", id)?;
        Ok(Render::message(match ptr {
            Some(ptr) => format!("Reverse DNS for {address} set to {ptr}"),
            None => format!("Reverse DNS for {address} reset"),
        }))
    }

    fn assign(&self, ip: &str, vm: &str) -> Result<Render> {
        let ip = parse_id(ip, "primary IP")?;
        let vm = parse_id(vm, "VM")?;
        found(self.api.assign_primary_ip(ip, vm), "Primary IP", ip)?;
        Ok(Render::message(format!("Primary IP {ip} assigned to VM {vm}")))
    }

    fn unassign(&self, raw: &str) -> Result<Render> {
        let ip = parse_id(raw, "primary IP")?;
        found(self.api.unassign_primary_ip(ip), "Primary IP", ip)?;
        Ok(Render::message(format!("Primary IP {ip} unassigned")))
    }

    fn protect(&self, raw: &str, toggle: &str) -> Result<Render> {
        let ip = parse_id(raw, "primary IP")?;
        let on = parse_toggle(toggle)?;
        found(self.api.set_primary_ip_protection(ip, on), "Primary IP", ip)?;
        let state = if on { "enabled" } else { "disabled" };
        Ok(Render::message(format!("Delete protection {state} for primary IP {ip}")))
    }

    fn delete(&self, raw: &str) -> Result<Render> {
        let ip = parse_id(raw, "primary IP")?;
        found(self.api.delete_primary_ip(ip), "Primary IP", ip)?;
        Ok(Render::message(format!("Primary IP {ip} deleted")))
    }
}

impl ResourceHandler for PrimaryIpHandler {
    fn describe(&self) -> CommandNode {
        CommandNode::new("primary-ip", "Manage primary IPs")
            .sub(SubcommandSpec::new("list", "primary-ip list").summary("List primary IPs"))
            .sub(SubcommandSpec::new("info", "primary-ip info <id>").exactly(1).summary("Show primary IP details"))
            .sub(
                SubcommandSpec::new("create", "primary-ip create <ipv4|ipv6> <name> <datacenter|vm> [yes|no]")
                    .args(3, Some(4))
                    .summary("Create a primary IP in a datacenter or on a powered-off VM"),
            )
            .sub(
                SubcommandSpec::new("update", "primary-ip update <id> <name> [yes|no]")
                    .args(2, Some(3))
                    .summary("Change name and auto delete"),
            )
            .sub(
                SubcommandSpec::new("dns", "primary-ip dns <id> <ip> [ptr|reset]")
                    .args(2, Some(3))
                    .destructive()
                    .summary("Set or reset reverse DNS"),
            )
            .sub(
                SubcommandSpec::new("assign", "primary-ip assign <ip> <vm>")
                    .exactly(2)
                    .summary("Assign a primary IP to a powered-off VM"),
            )
            .sub(
                SubcommandSpec::new("unassign", "primary-ip unassign <ip>")
                    .exactly(1)
                    .destructive()
                    .summary("Unassign a primary IP"),
            )
            .sub(
                SubcommandSpec::new("protect", "primary-ip protect <ip> <enable|disable>")
                    .exactly(2)
                    .summary("Toggle delete protection"),
            )
            .sub(
                SubcommandSpec::new("delete", "primary-ip delete <id>")
                    .exactly(1)
                    .destructive()
                    .summary("Delete a primary IP"),
            )
    }

    fn execute(&self, _ctx: &mut ExecContext<'_>, sub: &str, args: &[String]) -> Outcome {
        finish(match (sub, args) {
            ("list", _) => self.list(),
            ("info", [id]) => self.info(id),
            ("create", [ip_type, name, target]) => self.create(ip_type, name, target, None),
            ("create", [ip_type, name, target, auto]) => self.create(ip_type, name, target, Some(auto)),
            ("update", [id, name]) => self.update(id, name, None),
            ("update", [id, name, auto]) => self.update(id, name, Some(auto)),
            ("dns", [id, address]) => self.dns(id, address, None),
            ("dns", [id, address, ptr]) => self.dns(id, address, Some(ptr)),
            ("assign", [ip, vm]) => self.assign(ip, vm),
            ("unassign", [ip]) => self.unassign(ip),
            ("protect", [ip, toggle]) => self.protect(ip, toggle),
            ("delete", [ip]) => self.delete(ip),
            _ => Err(CommandError::Usage(format!("Unknown primary-ip subcommand: {sub}")).into()),
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
            ("create", 2) => name_candidates(cache, &self.api, ResourceKind::Datacenter),
            ("create", 3) | ("update", 2) => Ok(words(&["yes", "no"])),
            ("create", _) => Ok(Vec::new()),
            (_, 0) => id_candidates(cache, &self.api, ResourceKind::PrimaryIp),
            ("assign", 1) => id_candidates(cache, &self.api, ResourceKind::Server),
            ("dns", 2) => Ok(words(&["reset"])),
            ("protect", 1) => Ok(words(&["enable", "disable"])),
            _ => Ok(Vec::new()),
        }
    }

    fn confirm_prompt(&self, sub: &str, args: &[String]) -> Option<String> {
        match (sub, args) {
            ("unassign", [ip]) => Some(format!(
                "Unassign primary IP {ip}? The VM must be powered off."
            )),
            ("delete", [ip]) => Some(format!("Delete primary IP {ip}? The address is released.")),
            ("dns", _) => dns_prompt("primary IP", args),
            _ => None,
        }
    }

    fn check(&self, sub: &str, args: &[String]) -> Result<(), Outcome> {
        precheck(match (sub, args) {
            ("unassign" | "delete" | "dns", [id, ..]) => parse_id(id, "primary IP").map(drop),
            _ => Ok(()),
        })
    }
}
