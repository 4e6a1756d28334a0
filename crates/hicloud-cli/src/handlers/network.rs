//! `network`: private networks and their subnets.

use super::{
    finish, found, id_candidates, parse_id, parse_toggle, precheck, short_date, words, yes_no,
    CommandError,
};
use anyhow::Result;
use hicloud_api::CloudApi;
use hicloud_console::{
    Candidate, CommandNode, Details, ExecContext, IdCache, LookupError, Outcome, Render,
    ResourceHandler, ResourceKind, SubcommandSpec, Table,
};
use std::rc::Rc;

const NETWORK_ZONES: [&str; 3] = ["eu-central", "us-east", "us-west"];

pub struct NetworkHandler {
    api: Rc<CloudApi>,
}

impl NetworkHandler {
    pub fn new(api: Rc<CloudApi>) -> Self {
        Self { api }
    }

    fn list(&self) -> Result<Render> {
        let networks = self.api.list_networks()?;
        if networks.is_empty() {
            return Ok(Render::message("No networks found"));
        }
        let mut table = Table::new(["ID", "Name", "IP Range", "Subnets", "Servers"]).titled("Networks");
        for n in &networks {
            table.row([
                n.id.to_string(),
                n.name.clone(),
                n.ip_range.clone(),
                n.subnets.len().to_string(),
                n.servers.len().to_string(),
            ]);
        }
        Ok(Render::Table(table))
    }

    fn info(&self, raw: &str) -> Result<Render> {
        let id = parse_id(raw, "network")?;
        let n = found(self.api.get_network(id), "Network", id)?;
        let details = Details::new(format!("Network Information: {} (ID: {id})", n.name))
            .field("IP Range", &n.ip_range)
            .field("Created", short_date(&n.created))
            .field("Delete Protection", yes_no(n.protection.delete))
            .field(
                "Servers",
                if n.servers.is_empty() {
                    "-".to_string()
                } else {
                    n.servers.iter().map(u64::to_string).collect::<Vec<_>>().join(", ")
                },
            );

        let mut subnets = Table::new(["Type", "IP Range", "Zone", "Gateway"]).titled("Subnets");
        for s in &n.subnets {
            subnets.row([&s.subnet_type, &s.ip_range, &s.network_zone, &s.gateway]);
        }
        Ok(Render::Sequence(vec![Render::Details(details), Render::Table(subnets)]))
    }

    fn create(&self, name: &str, ip_range: &str) -> Result<Render> {
        let n = self.api.create_network(name, ip_range)?;
        Ok(Render::message(format!(
            "Network '{}' created with ID {} ({})",
            n.name, n.id, n.ip_range
        )))
    }

    fn update(&self, raw: &str, name: &str) -> Result<Render> {
        let net = parse_id(raw, "network")?;
        let n = found(self.api.rename_network(net, name), "Network", net)?;
        Ok(Render::message(format!("Network {net} renamed to '{}'", n.name)))
    }

    fn attach(&self, net: &str, vm: &str, ip: Option<&str>) -> Result<Render> {
        let net = parse_id(net, "network")?;
        let vm = parse_id(vm, "VM")?;
        found(self.api.attach_to_network(vm, net, ip), "VM", vm)?;
        Ok(Render::message(match ip {
            Some(ip) => format!("VM {vm} attached to network {net} with IP {ip}"),
            None => format!("VM {vm} attached to network {net}"),
        }))
    }

    fn detach(&self, net: &str, vm: &str) -> Result<Render> {
        let net = parse_id(net, "network")?;
        let vm = parse_id(vm, "VM")?;
        found(self.api.detach_from_network(vm, net), "VM", vm)?;
        Ok(Render::message(format!("VM {vm} detached from network {net}")))
    }

    fn subnet(&self, net: &str, ip_range: &str, zone: &str) -> Result<Render> {
        let net = parse_id(net, "network")?;
        if !NETWORK_ZONES.contains(&zone) {
            return Err(CommandError::InvalidArgument(format!(
                "Invalid network zone '{zone}'. Must be one of: {}",
                NETWORK_ZONES.join(", ")
            ))
            .into());
        }
        found(self.api.add_subnet(net, ip_range, zone), "Network", net)?;
        Ok(Render::message(format!("Subnet {ip_range} added to network {net} in {zone}")))
    }

    fn protect(&self, raw: &str, toggle: &str) -> Result<Render> {
        let net = parse_id(raw, "network")?;
        let on = parse_toggle(toggle)?;
        found(self.api.set_network_protection(net, on), "Network", net)?;
        let state = if on { "enabled" } else { "disabled" };
        Ok(Render::message(format!("Delete protection {state} for network {net}")))
    }

    fn delete(&self, raw: &str) -> Result<Render> {
        let net = parse_id(raw, "network")?;
        found(self.api.delete_network(net), "Network", net)?;
        Ok(Render::message(format!("Network {net} deleted")))
    }
}

impl ResourceHandler for NetworkHandler {
    fn describe(&self) -> CommandNode {
        CommandNode::new("network", "Manage private networks")
            .sub(SubcommandSpec::new("list", "network list").summary("List networks"))
            .sub(SubcommandSpec::new("info", "network info <id>").exactly(1).summary("Show network details"))
            .sub(
                SubcommandSpec::new("create", "network create <name> <ip_range>")
                    .exactly(2)
                    .summary("Create a network"),
            )
            .sub(
                SubcommandSpec::new("update", "network update <id> <name>")
                    .exactly(2)
                    .summary("Rename a network"),
            )
            .sub(
                SubcommandSpec::new("attach", "network attach <network> <vm> [ip]")
                    .args(2, Some(3))
                    .summary("Attach a VM to a network"),
            )
            .sub(
                SubcommandSpec::new("detach", "network detach <network> <vm>")
                    .exactly(2)
                    .destructive()
                    .summary("Detach a VM from a network"),
            )
            .sub(
                SubcommandSpec::new("subnet", "network subnet <network> <ip_range> <zone>")
                    .exactly(3)
                    .summary("Add a subnet"),
            )
            .sub(
                SubcommandSpec::new("protect", "network protect <network> <enable|disable>")
                    .exactly(2)
                    .summary("Toggle delete protection"),
            )
            .sub(
                SubcommandSpec::new("delete", "network delete <id>")
                    .exactly(1)
                    .destructive()
                    .summary("Delete a network"),
            )
    }

    fn execute(&self, _ctx: &mut ExecContext<'_>, sub: &str, args: &[String]) -> Outcome {
        finish(match (sub, args) {
            ("list", _) => self.list(),
            ("info", [id]) => self.info(id),
            ("create", [name, range]) => self.create(name, range),
            ("update", [net, name]) => self.update(net, name),
            ("attach", [net, vm]) => self.attach(net, vm, None),
            ("attach", [net, vm, ip]) => self.attach(net, vm, Some(ip.as_str())),
            ("detach", [net, vm]) => self.detach(net, vm),
            ("subnet", [net, range, zone]) => self.subnet(net, range, zone),
            ("protect", [net, toggle]) => self.protect(net, toggle),
            ("delete", [net]) => self.delete(net),
            _ => Err(CommandError::Usage(format!("Unknown network subcommand: {sub}")).into()),
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
            ("attach" | "detach", 1) => id_candidates(cache, &self.api, ResourceKind::Server),
            ("subnet", 2) => Ok(words(&NETWORK_ZONES)),
            ("protect", 1) => Ok(words(&["enable", "disable"])),
            ("info" | "update" | "attach" | "detach" | "subnet" | "protect" | "delete", 0) => {
                id_candidates(cache, &self.api, ResourceKind::Network)
            }
            _ => Ok(Vec::new()),
        }
    }

    fn confirm_prompt(&self, sub: &str, args: &[String]) -> Option<String> {
        match (sub, args) {
            ("detach", [net, vm]) => Some(format!("Detach VM {vm} from network {net}?")),
            ("delete", [net]) => Some(format!("Delete network {net}?")),
            _ => None,
        }
    }

    fn check(&self, sub: &str, args: &[String]) -> Result<(), Outcome> {
        precheck(match (sub, args) {
            ("detach", [net, vm]) => parse_id(net, "network").and_then(|_| parse_id(vm, "VM")).map(drop),
            ("delete", [net]) => parse_id(net, "network").map(drop),
            _ => Ok(()),
        })
    }
}
