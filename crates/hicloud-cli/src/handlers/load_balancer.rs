//! `lb`: load balancers, their algorithm, services and server targets.

use super::{
    finish, found, id_candidates, name_candidates, or_dash, parse_id, precheck, words, yes_no,
    CommandError,
};
use anyhow::Result;
use hicloud_api::types::{LbService, LoadBalancer};
use hicloud_api::CloudApi;
use hicloud_console::{
    Candidate, CommandNode, Details, ExecContext, IdCache, LookupError, Outcome, Render,
    ResourceHandler, ResourceKind, SubcommandSpec, Table,
};
use std::rc::Rc;

const ALGORITHMS: [&str; 2] = ["round_robin", "least_connections"];
const PROTOCOLS: [&str; 3] = ["tcp", "http", "https"];
const SERVICE_USAGE: &str = "lb service <id> [list|add <protocol> <listen_port> <destination_port>|delete <listen_port>]";

pub struct LoadBalancerHandler {
    api: Rc<CloudApi>,
}

fn target_servers(lb: &LoadBalancer) -> Vec<u64> {
    lb.targets
        .iter()
        .filter(|t| t.kind == "server")
        .filter_map(|t| t.server.as_ref().map(|s| s.id))
        .collect()
}

fn parse_port(raw: &str) -> Result<u16, CommandError> {
    match raw.parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(CommandError::InvalidArgument(format!(
            "Invalid port: {raw} (must be 1-65535)"
        ))),
    }
}

fn services_table(lb: &LoadBalancer) -> Render {
    let mut table = Table::new(["Protocol", "Listen Port", "Destination Port", "Proxy Protocol"])
        .titled(format!("Services of '{}'", lb.name));
    for s in &lb.services {
        table.row([
            s.protocol.clone(),
            s.listen_port.to_string(),
            s.destination_port.to_string(),
            yes_no(s.proxyprotocol).to_string(),
        ]);
    }
    Render::Table(table)
}

impl LoadBalancerHandler {
    pub fn new(api: Rc<CloudApi>) -> Self {
        Self { api }
    }

    fn list(&self) -> Result<Render> {
        let lbs = self.api.list_load_balancers()?;
        if lbs.is_empty() {
            return Ok(Render::message("No load balancers found"));
        }
        let mut table = Table::new(["ID", "Name", "Type", "Algorithm", "IPv4", "Targets", "Location"])
            .titled("Load Balancers");
        for lb in &lbs {
            table.row([
                lb.id.to_string(),
                lb.name.clone(),
                lb.load_balancer_type.name.clone(),
                lb.algorithm.kind.clone(),
                or_dash(Some(&lb.public_net.ipv4.ip)),
                lb.targets.len().to_string(),
                or_dash(Some(&lb.location.name)),
            ]);
        }
        Ok(Render::Table(table))
    }

    fn info(&self, raw: &str) -> Result<Render> {
        let id = parse_id(raw, "load balancer")?;
        let lb = found(self.api.get_load_balancer(id), "Load balancer", id)?;
        let details = Details::new(format!("Load Balancer Information: {} (ID: {id})", lb.name))
            .field("Type", &lb.load_balancer_type.name)
            .field("Algorithm", &lb.algorithm.kind)
            .field("Location", or_dash(Some(&lb.location.name)))
            .field("Public Interface", if lb.public_net.enabled { "enabled" } else { "disabled" })
            .field("IPv4", or_dash(Some(&lb.public_net.ipv4.ip)))
            .field("Max Targets", lb.load_balancer_type.max_targets)
            .field("Delete Protection", yes_no(lb.protection.delete));
        Ok(Render::Sequence(vec![
            Render::Details(details),
            services_table(&lb),
            self.targets_table(&lb),
        ]))
    }

    fn create(&self, name: &str, lb_type: &str, location: &str) -> Result<Render> {
        let lb = self.api.create_load_balancer(name, lb_type, location)?;
        Ok(Render::message(format!(
            "Load balancer '{}' created with ID {} ({})",
            lb.name,
            lb.id,
            or_dash(Some(&lb.public_net.ipv4.ip))
        )))
    }

    fn type_names(&self) -> Result<Vec<Candidate>, LookupError> {
        let types = self
            .api
            .list_load_balancer_types()
            .map_err(|e| LookupError::Unavailable(e.to_string()))?;
        Ok(types.into_iter().map(|t| Candidate::word(t.name)).collect())
    }

    fn service(&self, ctx: &mut ExecContext<'_>, args: &[String]) -> Result<Render> {
        let Some((raw, rest)) = args.split_first() else {
            return Err(CommandError::Usage(SERVICE_USAGE.into()).into());
        };
        let id = parse_id(raw, "load balancer")?;
        match rest {
            [] => {
                let lb = found(self.api.get_load_balancer(id), "Load balancer", id)?;
                Ok(services_table(&lb))
            }
            [action] if action == "list" => {
                let lb = found(self.api.get_load_balancer(id), "Load balancer", id)?;
                Ok(services_table(&lb))
            }
            [action, protocol, listen, dest] if action == "add" => {
                if !PROTOCOLS.contains(&protocol.as_str()) {
                    return Err(CommandError::InvalidArgument(format!(
                        "Invalid protocol '{protocol}'. Must be one of: {}",
                        PROTOCOLS.join(", ")
                    ))
                    .into());
                }
                let service = LbService {
                    protocol: protocol.clone(),
                    listen_port: parse_port(listen)?,
                    destination_port: parse_port(dest)?,
                    proxyprotocol: false,
                };
                found(self.api.add_lb_service(id, &service), "Load balancer", id)?;
                Ok(Render::message(format!(
                    "Service {protocol} {} -> {} added to load balancer {id}",
                    service.listen_port, service.destination_port
                )))
            }
            [action, port] if action == "delete" => {
                let port = parse_port(port)?;
                let lb = found(self.api.get_load_balancer(id), "Load balancer", id)?;
                if !lb.services.iter().any(|s| s.listen_port == port) {
                    return Err(CommandError::NotFound(format!(
                        "No service on port {port} of load balancer {id}"
                    ))
                    .into());
                }
                if !ctx.gate.confirm(&format!(
                    "Delete the service on port {port} of load balancer '{}'?",
                    lb.name
                )) {
                    return Err(CommandError::Cancelled.into());
                }
                self.api.delete_lb_service(id, port)?;
                Ok(Render::message(format!("Service on port {port} deleted from load balancer {id}")))
            }
            _ => Err(CommandError::Usage(SERVICE_USAGE.into()).into()),
        }
    }

    fn targets_table(&self, lb: &LoadBalancer) -> Render {
        let mut table = Table::new(["Type", "Server"]).titled(format!("Targets of '{}'", lb.name));
        for t in &lb.targets {
            table.row([
                t.kind.clone(),
                t.server.as_ref().map_or_else(|| "-".to_string(), |s| s.id.to_string()),
            ]);
        }
        Render::Table(table)
    }

    fn algorithm(&self, raw: &str, algorithm: &str) -> Result<Render> {
        let id = parse_id(raw, "load balancer")?;
        if !ALGORITHMS.contains(&algorithm) {
            return Err(CommandError::InvalidArgument(format!(
                "Invalid algorithm '{algorithm}'. Must be one of: {}",
                ALGORITHMS.join(", ")
            ))
            .into());
        }
        found(self.api.change_lb_algorithm(id, algorithm), "Load balancer", id)?;
        Ok(Render::message(format!("Load balancer {id} now uses {algorithm}")))
    }

    fn targets(&self, ctx: &mut ExecContext<'_>, args: &[String]) -> Result<Render> {
        let Some((raw, rest)) = args.split_first() else {
            return Err(CommandError::Usage("lb targets <id> [add|remove <vm>]".into()).into());
        };
        let id = parse_id(raw, "load balancer")?;
        match rest {
            [] => {
                let lb = found(self.api.get_load_balancer(id), "Load balancer", id)?;
                Ok(self.targets_table(&lb))
            }
            [action, vm] if action == "add" => {
                let vm = parse_id(vm, "VM")?;
                found(self.api.add_lb_target(id, vm), "Load balancer", id)?;
                Ok(Render::message(format!("VM {vm} added to load balancer {id}")))
            }
            [action, vm] if action == "remove" => {
                let vm = parse_id(vm, "VM")?;
                let lb = found(self.api.get_load_balancer(id), "Load balancer", id)?;
                if !target_servers(&lb).contains(&vm) {
                    return Err(CommandError::NotFound(format!(
                        "VM {vm} is not a target of load balancer {id}"
                    ))
                    .into());
                }
                if !ctx
                    .gate
                    .confirm(&format!("Remove VM {vm} from load balancer '{}'?", lb.name))
                {
                    return Err(CommandError::Cancelled.into());
                }
                self.api.remove_lb_target(id, vm)?;
                Ok(Render::message(format!("VM {vm} removed from load balancer {id}")))
            }
            _ => Err(CommandError::Usage("lb targets <id> [add|remove <vm>]".into()).into()),
        }
    }

    fn delete(&self, raw: &str) -> Result<Render> {
        let id = parse_id(raw, "load balancer")?;
        found(self.api.delete_load_balancer(id), "Load balancer", id)?;
        Ok(Render::message(format!("Load balancer {id} deleted")))
    }
}

impl ResourceHandler for LoadBalancerHandler {
    fn describe(&self) -> CommandNode {
        CommandNode::new("lb", "Manage load balancers")
            .sub(SubcommandSpec::new("list", "lb list").summary("List load balancers"))
            .sub(SubcommandSpec::new("info", "lb info <id>").exactly(1).summary("Show load balancer details"))
            .sub(
                SubcommandSpec::new("create", "lb create <name> <type> <location>")
                    .exactly(3)
                    .summary("Create a load balancer"),
            )
            .sub(
                SubcommandSpec::new("algorithm", "lb algorithm <id> <round_robin|least_connections>")
                    .exactly(2)
                    .summary("Change the balancing algorithm"),
            )
            .sub(
                SubcommandSpec::new("targets", "lb targets <id> [add|remove <vm>]")
                    .args(1, Some(3))
                    .summary("Show, add or remove server targets"),
            )
            .sub(
                SubcommandSpec::new("service", SERVICE_USAGE)
                    .args(1, Some(5))
                    .summary("Show, add or delete services"),
            )
            .sub(
                SubcommandSpec::new("delete", "lb delete <id>")
                    .exactly(1)
                    .destructive()
                    .summary("Delete a load balancer"),
            )
    }

    fn execute(&self, ctx: &mut ExecContext<'_>, sub: &str, args: &[String]) -> Outcome {
        finish(match (sub, args) {
            ("list", _) => self.list(),
            ("info", [id]) => self.info(id),
            ("algorithm", [id, algorithm]) => self.algorithm(id, algorithm),
            ("create", [name, lb_type, location]) => self.create(name, lb_type, location),
            ("targets", _) => self.targets(ctx, args),
            ("service", _) => self.service(ctx, args),
            ("delete", [id]) => self.delete(id),
            _ => Err(CommandError::Usage(format!("Unknown lb subcommand: {sub}")).into()),
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
            ("list", _) | ("create", 0) => Ok(Vec::new()),
            ("create", 1) => self.type_names(),
            ("create", 2) => name_candidates(cache, &self.api, ResourceKind::Location),
            ("create", _) => Ok(Vec::new()),
            (_, 0) => id_candidates(cache, &self.api, ResourceKind::LoadBalancer),
            ("algorithm", 1) => Ok(words(&ALGORITHMS)),
            ("targets", 1) => Ok(words(&["add", "remove"])),
            ("targets", 2) => id_candidates(cache, &self.api, ResourceKind::Server),
            ("service", 1) => Ok(words(&["list", "add", "delete"])),
            ("service", 2) if args.get(1).is_some_and(|a| a == "add") => Ok(words(&PROTOCOLS)),
            _ => Ok(Vec::new()),
        }
    }

    fn confirm_prompt(&self, sub: &str, args: &[String]) -> Option<String> {
        match (sub, args) {
            ("delete", [id]) => Some(format!("Delete load balancer {id}?")),
            _ => None,
        }
    }

    fn check(&self, sub: &str, args: &[String]) -> Result<(), Outcome> {
        precheck(match (sub, args) {
            ("delete", [id]) => parse_id(id, "load balancer").map(drop),
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

    fn mock() -> Rc<MockTransport> {
        Rc::new(MockTransport::new().with(
            Method::Get,
            "load_balancers/9",
            json!({ "load_balancer": { "id": 9, "name": "front",
                "algorithm": { "type": "round_robin" },
                "services": [{ "protocol": "http", "listen_port": 80, "destination_port": 8080 }],
                "targets": [{ "type": "server", "server": { "id": 42 } }] } }),
        ))
    }

    #[test]
    fn declined_target_removal_writes_nothing() {
        let mock = mock();
        let h = LoadBalancerHandler::new(api(&mock));
        let run = run(&h, "targets", &["9", "remove", "42"], &["n"]);
        assert_eq!(run.outcome, Outcome::Cancelled);
        assert_eq!(run.prompts.len(), 1);
        assert!(run.prompts[0].contains("Remove VM 42 from load balancer 'front'?"));
        assert_eq!(mock.write_calls(), 0);
    }

    #[test]
    fn confirmed_target_removal_posts_once() {
        let mock = mock();
        let h = LoadBalancerHandler::new(api(&mock));
        let run = run(&h, "targets", &["9", "remove", "42"], &["y"]);
        assert_eq!(run.outcome, Outcome::message("VM 42 removed from load balancer 9"));
        assert_eq!(mock.calls_to(Method::Post, "load_balancers/9/actions/remove_target"), 1);
    }

    #[test]
    fn removing_a_non_target_never_prompts() {
        let mock = mock();
        let h = LoadBalancerHandler::new(api(&mock));
        let run = run(&h, "targets", &["9", "remove", "43"], &["y"]);
        assert!(matches!(run.outcome, Outcome::Failure { kind: ErrorKind::NotFound, .. }));
        assert!(run.prompts.is_empty());
    }

    #[test]
    fn targets_without_action_lists_them() {
        let mock = mock();
        let h = LoadBalancerHandler::new(api(&mock));
        let text = run(&h, "targets", &["9"], &[]).text();
        assert!(text.contains("Targets of 'front'"));
        assert!(text.contains("42"));
    }

    #[test]
    fn algorithm_is_validated() {
        let mock = mock();
        let h = LoadBalancerHandler::new(api(&mock));
        let run = run(&h, "algorithm", &["9", "random"], &[]);
        assert!(matches!(run.outcome, Outcome::Failure { kind: ErrorKind::InvalidArgument, .. }));
        assert_eq!(mock.write_calls(), 0);
    }

    #[test]
    fn targets_completion_offers_actions_then_servers() {
        let mock = mock();
        mock.respond(Method::Get, "servers", json!({ "servers": [{ "id": 42 }] }));
        let h = LoadBalancerHandler::new(api(&mock));
        assert_eq!(complete(&h, "targets", 1, &["9"]), vec!["add", "remove"]);
        assert_eq!(complete(&h, "targets", 2, &["9", "add"]), vec!["42"]);
    }

    #[test]
    fn info_shows_services() {
        let mock = mock();
        let h = LoadBalancerHandler::new(api(&mock));
        let text = run(&h, "info", &["9"], &[]).text();
        assert!(text.contains("Services of 'front'"));
        assert!(text.contains("8080"));
    }

    #[test]
    fn create_sends_type_and_location() {
        let mock = mock();
        mock.respond(
            Method::Post,
            "load_balancers",
            json!({ "load_balancer": { "id": 10, "name": "edge", "public_net": { "ipv4": { "ip": "203.0.113.20" } } } }),
        );
        let h = LoadBalancerHandler::new(api(&mock));
        let run = run(&h, "create", &["edge", "lb11", "fsn1"], &[]);
        assert_eq!(
            run.outcome,
            Outcome::message("Load balancer 'edge' created with ID 10 (203.0.113.20)")
        );
        let body = mock.calls()[0].body.clone().expect("body");
        assert_eq!(body["load_balancer_type"], "lb11");
        assert_eq!(body["location"], "fsn1");
    }

    #[test]
    fn service_add_validates_ports() {
        let mock = mock();
        let h = LoadBalancerHandler::new(api(&mock));
        let bad = run(&h, "service", &["9", "add", "tcp", "0", "22"], &[]);
        assert_eq!(
            bad.outcome,
            Outcome::failure(ErrorKind::InvalidArgument, "Invalid port: 0 (must be 1-65535)")
        );
        let added = run(&h, "service", &["9", "add", "tcp", "2222", "22"], &[]);
        assert_eq!(added.outcome, Outcome::message("Service tcp 2222 -> 22 added to load balancer 9"));
        let call = &mock.calls()[0];
        assert_eq!(call.path, "load_balancers/9/actions/add_service");
        assert_eq!(call.body.as_ref().expect("body")["listen_port"], 2222);
    }

    #[test]
    fn service_delete_is_confirmed_inside_the_command() {
        let mock = mock();
        let h = LoadBalancerHandler::new(api(&mock));
        let declined = run(&h, "service", &["9", "delete", "80"], &["n"]);
        assert_eq!(declined.outcome, Outcome::Cancelled);
        assert_eq!(mock.write_calls(), 0);

        let missing = run(&h, "service", &["9", "delete", "443"], &["y"]);
        assert!(matches!(missing.outcome, Outcome::Failure { kind: ErrorKind::NotFound, .. }));
        assert!(missing.prompts.is_empty());

        let deleted = run(&h, "service", &["9", "delete", "80"], &["y"]);
        assert_eq!(deleted.outcome, Outcome::message("Service on port 80 deleted from load balancer 9"));
        assert_eq!(mock.calls_to(Method::Post, "load_balancers/9/actions/delete_service"), 1);
    }

    #[test]
    fn delete_needs_a_numeric_id() {
        let h = LoadBalancerHandler::new(api(&mock()));
        assert!(check(&h, "delete", &["front"]).is_err());
    }
}
