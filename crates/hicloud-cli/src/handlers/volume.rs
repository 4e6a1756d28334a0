//! `volume`: block storage volumes.

use super::{
    finish, found, id_candidates, name_candidates, or_dash, parse_id, parse_toggle, precheck,
    short_date, words, yes_no, CommandError,
};
use anyhow::Result;
use hicloud_api::CloudApi;
use hicloud_console::{
    Candidate, CommandNode, Details, ExecContext, IdCache, LookupError, Outcome, Render,
    ResourceHandler, ResourceKind, SubcommandSpec, Table,
};
use std::rc::Rc;

const MIN_SIZE_GB: u64 = 10;
const MAX_SIZE_GB: u64 = 10_240;

fn parse_size(raw: &str) -> Result<u64, CommandError> {
    match raw.parse::<u64>() {
        Ok(gb) if (MIN_SIZE_GB..=MAX_SIZE_GB).contains(&gb) => Ok(gb),
        _ => Err(CommandError::InvalidArgument(format!(
            "Invalid volume size: {raw} (must be {MIN_SIZE_GB}-{MAX_SIZE_GB} GB)"
        ))),
    }
}

pub struct VolumeHandler {
    api: Rc<CloudApi>,
}

impl VolumeHandler {
    pub fn new(api: Rc<CloudApi>) -> Self {
        Self { api }
    }

    fn list(&self) -> Result<Render> {
        let volumes = self.api.list_volumes()?;
        if volumes.is_empty() {
            return Ok(Render::message("No volumes found"));
        }
        let mut table = Table::new(["ID", "Name", "Size", "Server", "Location", "Status"]).titled("Volumes");
        for v in &volumes {
            table.row([
                v.id.to_string(),
                v.name.clone(),
                format!("{} GB", v.size),
                v.server.map_or_else(|| "-".to_string(), |s| s.to_string()),
                or_dash(Some(&v.location.name)),
                v.status.clone(),
            ]);
        }
        Ok(Render::Table(table))
    }

    fn info(&self, raw: &str) -> Result<Render> {
        let id = parse_id(raw, "volume")?;
        let v = found(self.api.get_volume(id), "Volume", id)?;
        let server = match v.server {
            Some(s) => match self.api.get_server(s) {
                Ok(server) => format!("{} (ID: {s})", server.name),
                Err(_) => s.to_string(),
            },
            None => "Not attached".to_string(),
        };
        Ok(Render::Details(
            Details::new(format!("Volume Information: {} (ID: {id})", v.name))
                .field("Size", format!("{} GB", v.size))
                .field("Status", &v.status)
                .field("Format", or_dash(v.format.as_deref()))
                .field("Location", or_dash(Some(&v.location.name)))
                .field("Device", or_dash(Some(&v.linux_device)))
                .field("Server", server)
                .field("Created", short_date(&v.created))
                .field("Delete Protection", yes_no(v.protection.delete)),
        ))
    }

    fn create(&self, name: &str, size: &str, location: &str) -> Result<Render> {
        let size = parse_size(size)?;
        let v = self.api.create_volume(name, size, location)?;
        Ok(Render::message(format!(
            "Volume '{}' created with ID {} ({size} GB in {location})",
            v.name, v.id
        )))
    }

    fn attach(&self, vol: &str, vm: &str) -> Result<Render> {
        let vol = parse_id(vol, "volume")?;
        let vm = parse_id(vm, "VM")?;
        let v = found(self.api.get_volume(vol), "Volume", vol)?;
        if let Some(current) = v.server {
            return Err(CommandError::InvalidArgument(format!(
                "Volume {vol} is already attached to VM {current}"
            ))
            .into());
        }
        self.api.attach_volume(vol, vm, false)?;
        Ok(Render::message(format!("Volume {vol} attached to VM {vm}")))
    }

    fn detach(&self, raw: &str) -> Result<Render> {
        let vol = parse_id(raw, "volume")?;
        let v = found(self.api.get_volume(vol), "Volume", vol)?;
        if v.server.is_none() {
            return Ok(Render::message(format!("Volume {vol} is not attached")));
        }
        self.api.detach_volume(vol)?;
        Ok(Render::message(format!("Volume {vol} detached")))
    }

    fn resize(&self, raw: &str, size: &str) -> Result<Render> {
        let vol = parse_id(raw, "volume")?;
        let size = parse_size(size)?;
        let v = found(self.api.get_volume(vol), "Volume", vol)?;
        if size <= v.size {
            return Err(CommandError::InvalidArgument(format!(
                "Volumes can only grow: {vol} is already {} GB",
                v.size
            ))
            .into());
        }
        self.api.resize_volume(vol, size)?;
        Ok(Render::message(format!("Volume {vol} resized to {size} GB")))
    }

    fn protect(&self, raw: &str, toggle: &str) -> Result<Render> {
        let vol = parse_id(raw, "volume")?;
        let on = parse_toggle(toggle)?;
        found(self.api.set_volume_protection(vol, on), "Volume", vol)?;
        let state = if on { "enabled" } else { "disabled" };
        Ok(Render::message(format!("Delete protection {state} for volume {vol}")))
    }

    fn delete(&self, raw: &str) -> Result<Render> {
        let vol = parse_id(raw, "volume")?;
        found(self.api.delete_volume(vol), "Volume", vol)?;
        Ok(Render::message(format!("Volume {vol} deleted")))
    }
}

impl ResourceHandler for VolumeHandler {
    fn describe(&self) -> CommandNode {
        CommandNode::new("volume", "Manage block storage volumes")
            .sub(SubcommandSpec::new("list", "volume list").summary("List volumes"))
            .sub(SubcommandSpec::new("info", "volume info <id>").exactly(1).summary("Show volume details"))
            .sub(
                SubcommandSpec::new("create", "volume create <name> <size> <location>")
                    .exactly(3)
                    .summary("Create a volume (size in GB)"),
            )
            .sub(
                SubcommandSpec::new("attach", "volume attach <volume> <vm>")
                    .exactly(2)
                    .summary("Attach a volume to a VM"),
            )
            .sub(
                SubcommandSpec::new("detach", "volume detach <volume>")
                    .exactly(1)
                    .destructive()
                    .summary("Detach a volume from its VM"),
            )
            .sub(
                SubcommandSpec::new("resize", "volume resize <volume> <size>")
                    .exactly(2)
                    .summary("Grow a volume"),
            )
            .sub(
                SubcommandSpec::new("protect", "volume protect <volume> <enable|disable>")
                    .exactly(2)
                    .summary("Toggle delete protection"),
            )
            .sub(
                SubcommandSpec::new("delete", "volume delete <id>")
                    .exactly(1)
                    .destructive()
                    .summary("Delete a volume"),
            )
    }

    fn execute(&self, _ctx: &mut ExecContext<'_>, sub: &str, args: &[String]) -> Outcome {
        finish(match (sub, args) {
            ("list", _) => self.list(),
            ("info", [id]) => self.info(id),
            ("create", [name, size, location]) => self.create(name, size, location),
            ("attach", [vol, vm]) => self.attach(vol, vm),
            ("detach", [vol]) => self.detach(vol),
            ("resize", [vol, size]) => self.resize(vol, size),
            ("protect", [vol, toggle]) => self.protect(vol, toggle),
            ("delete", [vol]) => self.delete(vol),
            _ => Err(CommandError::Usage(format!("Unknown volume subcommand: {sub}")).into()),
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
            ("create", 2) => name_candidates(cache, &self.api, ResourceKind::Location),
            ("attach", 1) => id_candidates(cache, &self.api, ResourceKind::Server),
            ("protect", 1) => Ok(words(&["enable", "disable"])),
            ("info" | "attach" | "detach" | "resize" | "protect" | "delete", 0) => {
                id_candidates(cache, &self.api, ResourceKind::Volume)
            }
            _ => Ok(Vec::new()),
        }
    }

    fn confirm_prompt(&self, sub: &str, args: &[String]) -> Option<String> {
        match (sub, args) {
            ("detach", [vol]) => Some(format!("Detach volume {vol} from its VM?")),
            ("delete", [vol]) => Some(format!("Delete volume {vol}? All data on it is lost.")),
            _ => None,
        }
    }

    fn check(&self, sub: &str, args: &[String]) -> Result<(), Outcome> {
        precheck(match (sub, args) {
            ("detach" | "delete", [vol]) => parse_id(vol, "volume").map(drop),
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

    fn volume(server: Option<u64>) -> serde_json::Value {
        json!({ "volume": { "id": 5, "name": "data", "size": 50, "server": server,
                            "location": { "name": "fsn1" } } })
    }

    #[test]
    fn create_validates_size() {
        let mock = Rc::new(MockTransport::new());
        let h = VolumeHandler::new(api(&mock));
        for bad in ["5", "abc", "20000"] {
            let run = run(&h, "create", &["data", bad, "fsn1"], &[]);
            assert!(matches!(run.outcome, Outcome::Failure { kind: ErrorKind::InvalidArgument, .. }));
        }
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn create_posts_name_size_and_location() {
        let mock = Rc::new(MockTransport::new().with(Method::Post, "volumes", volume(None)));
        let h = VolumeHandler::new(api(&mock));
        let run = run(&h, "create", &["data", "50", "fsn1"], &[]);
        assert_eq!(run.outcome, Outcome::message("Volume 'data' created with ID 5 (50 GB in fsn1)"));
        let body = mock.calls()[0].body.clone().expect("body");
        assert_eq!(body["size"], 50);
    }

    #[test]
    fn resize_only_grows() {
        let mock = Rc::new(MockTransport::new().with(Method::Get, "volumes/5", volume(None)));
        let h = VolumeHandler::new(api(&mock));
        let shrink = run(&h, "resize", &["5", "40"], &[]);
        assert!(matches!(shrink.outcome, Outcome::Failure { kind: ErrorKind::InvalidArgument, .. }));
        assert_eq!(mock.write_calls(), 0);

        let grow = run(&h, "resize", &["5", "100"], &[]);
        assert_eq!(grow.outcome, Outcome::message("Volume 5 resized to 100 GB"));
        assert_eq!(mock.calls_to(Method::Post, "volumes/5/actions/resize"), 1);
    }

    #[test]
    fn attach_refuses_an_attached_volume() {
        let mock = Rc::new(MockTransport::new().with(Method::Get, "volumes/5", volume(Some(42))));
        let h = VolumeHandler::new(api(&mock));
        let run = run(&h, "attach", &["5", "43"], &[]);
        assert_eq!(
            run.outcome,
            Outcome::failure(ErrorKind::InvalidArgument, "Volume 5 is already attached to VM 42")
        );
    }

    #[test]
    fn protect_sends_the_flag() {
        let mock = Rc::new(MockTransport::new());
        let h = VolumeHandler::new(api(&mock));
        run(&h, "protect", &["5", "enable"], &[]);
        assert_eq!(mock.calls()[0].body.as_ref().expect("body")["delete"], true);
    }

    #[test]
    fn create_completes_location_names() {
        let mock = Rc::new(MockTransport::new().with(
            Method::Get,
            "locations",
            json!({ "locations": [{ "id": 1, "name": "fsn1" }, { "id": 2, "name": "nbg1" }] }),
        ));
        let h = VolumeHandler::new(api(&mock));
        assert_eq!(complete(&h, "create", 2, &["data", "50"]), vec!["fsn1", "nbg1"]);
        assert!(complete(&h, "create", 0, &[]).is_empty());
    }

    #[test]
    fn detach_needs_a_numeric_volume() {
        let h = VolumeHandler::new(api(&Rc::new(MockTransport::new())));
        assert!(check(&h, "detach", &["data"]).is_err());
        assert!(check(&h, "delete", &["7"]).is_ok());
    }
}
