//! `iso`: ISO images and mounting them on servers.

use super::{finish, found, id_candidates, or_dash, parse_id, precheck, CommandError};
use anyhow::Result;
use hicloud_api::CloudApi;
use hicloud_console::{
    Candidate, CommandNode, Details, ExecContext, IdCache, LookupError, Outcome, Render,
    ResourceHandler, ResourceKind, SubcommandSpec, Table,
};
use std::rc::Rc;

pub struct IsoHandler {
    api: Rc<CloudApi>,
}

impl IsoHandler {
    pub fn new(api: Rc<CloudApi>) -> Self {
        Self { api }
    }

    fn list(&self) -> Result<Render> {
        let isos = self.api.list_isos()?;
        if isos.is_empty() {
            return Ok(Render::message("No ISOs found"));
        }
        let mut table = Table::new(["ID", "Name", "Type", "Architecture", "Description"]).titled("ISOs");
        for iso in &isos {
            table.row([
                iso.id.to_string(),
                iso.name.clone(),
                iso.iso_type.clone(),
                or_dash(iso.architecture.as_deref()),
                iso.description.clone(),
            ]);
        }
        Ok(Render::Table(table))
    }

    fn info(&self, raw: &str) -> Result<Render> {
        let id = parse_id(raw, "ISO")?;
        let iso = found(self.api.get_iso(id), "ISO", id)?;
        Ok(Render::Details(
            Details::new(format!("ISO Information: {} (ID: {id})", iso.name))
                .field("Description", or_dash(Some(&iso.description)))
                .field("Type", &iso.iso_type)
                .field("Architecture", or_dash(iso.architecture.as_deref())),
        ))
    }

    fn attach(&self, iso: &str, vm: &str) -> Result<Render> {
        let iso = parse_id(iso, "ISO")?;
        let vm = parse_id(vm, "VM")?;
        let server = found(self.api.get_server(vm), "VM", vm)?;
        if let Some(current) = &server.iso {
            tracing::debug!(vm, current = current.id, "replacing mounted ISO");
        }
        found(self.api.attach_iso(vm, iso), "ISO", iso)?;
        Ok(Render::message(format!("ISO {iso} attached to VM '{}' (ID: {vm})", server.name)))
    }

    fn detach(&self, raw: &str) -> Result<Render> {
        let vm = parse_id(raw, "VM")?;
        let server = found(self.api.get_server(vm), "VM", vm)?;
        if server.iso.is_none() {
            return Ok(Render::message(format!("No ISO attached to VM {vm}")));
        }
        self.api.detach_iso(vm)?;
        Ok(Render::message(format!("ISO detached from VM {vm}")))
    }
}

impl ResourceHandler for IsoHandler {
    fn describe(&self) -> CommandNode {
        CommandNode::new("iso", "Manage ISO images")
            .sub(SubcommandSpec::new("list", "iso list").summary("List available ISOs"))
            .sub(SubcommandSpec::new("info", "iso info <id>").exactly(1).summary("Show ISO details"))
            .sub(
                SubcommandSpec::new("attach", "iso attach <iso> <vm>")
                    .exactly(2)
                    .summary("Mount an ISO on a VM"),
            )
            .sub(
                SubcommandSpec::new("detach", "iso detach <vm>")
                    .exactly(1)
                    .destructive()
                    .summary("Unmount the ISO from a VM"),
            )
    }

    fn execute(&self, _ctx: &mut ExecContext<'_>, sub: &str, args: &[String]) -> Outcome {
        finish(match (sub, args) {
            ("list", _) => self.list(),
            ("info", [id]) => self.info(id),
            ("attach", [iso, vm]) => self.attach(iso, vm),
            ("detach", [vm]) => self.detach(vm),
            _ => Err(CommandError::Usage(format!("Unknown iso subcommand: {sub}")).into()),
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
            ("info" | "attach", 0) => id_candidates(cache, &self.api, ResourceKind::Iso),
            ("attach", 1) | ("detach", 0) => id_candidates(cache, &self.api, ResourceKind::Server),
            _ => Ok(Vec::new()),
        }
    }

    fn confirm_prompt(&self, sub: &str, args: &[String]) -> Option<String> {
        match (sub, args) {
            ("detach", [vm]) => Some(format!("Detach the ISO from VM {vm}?")),
            _ => None,
        }
    }

    fn check(&self, sub: &str, args: &[String]) -> Result<(), Outcome> {
        precheck(match (sub, args) {
            ("detach", [vm]) => parse_id(vm, "VM").map(drop),
            _ => Ok(()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::{api, check, complete, run};
    use hicloud_api::{Method, MockTransport};
    use serde_json::json;

    fn mock() -> Rc<MockTransport> {
        Rc::new(
            MockTransport::new()
                .with(
                    Method::Get,
                    "isos",
                    json!({ "isos": [
                        { "id": 10, "name": "virtio-win.iso", "type": "public", "architecture": "x86" },
                        { "id": 11, "name": "debian-12.iso", "type": "public" }
                    ]}),
                )
                .with(Method::Get, "servers", json!({ "servers": [{ "id": 42, "name": "web-1" }] })),
        )
    }

    #[test]
    fn attach_completion_walks_iso_then_server() {
        let mock = mock();
        let h = IsoHandler::new(api(&mock));
        assert_eq!(complete(&h, "attach", 0, &[]), vec!["10", "11"]);
        assert_eq!(complete(&h, "attach", 1, &["10"]), vec!["42"]);
        assert!(complete(&h, "attach", 2, &["10", "42"]).is_empty());
        assert_eq!(mock.write_calls(), 0);
    }

    #[test]
    fn attach_posts_the_iso_id() {
        let mock = mock();
        mock.respond(Method::Get, "servers/42", json!({ "server": { "id": 42, "name": "web-1" } }));
        let h = IsoHandler::new(api(&mock));
        let run = run(&h, "attach", &["10", "42"], &[]);
        assert_eq!(run.outcome, Outcome::message("ISO 10 attached to VM 'web-1' (ID: 42)"));
        assert_eq!(mock.calls_to(Method::Post, "servers/42/actions/attach_iso"), 1);
    }

    #[test]
    fn detach_without_mounted_iso_makes_no_write() {
        let mock = mock();
        mock.respond(Method::Get, "servers/42", json!({ "server": { "id": 42, "iso": null } }));
        let h = IsoHandler::new(api(&mock));
        let run = run(&h, "detach", &["42"], &[]);
        assert_eq!(run.outcome, Outcome::message("No ISO attached to VM 42"));
        assert_eq!(mock.write_calls(), 0);
    }

    #[test]
    fn list_renders_every_iso() {
        let mock = mock();
        let h = IsoHandler::new(api(&mock));
        let text = run(&h, "list", &[], &[]).text();
        assert!(text.contains("virtio-win.iso"));
        assert!(text.contains("debian-12.iso"));
    }

    #[test]
    fn detach_needs_a_numeric_vm() {
        let h = IsoHandler::new(api(&mock()));
        assert!(check(&h, "detach", &["web"]).is_err());
        assert!(check(&h, "detach", &["42"]).is_ok());
    }
}
