//! `location` and `datacenter`: read-only catalogue lookups.

use super::{finish, found, id_candidates, or_dash, parse_id, CommandError};
use anyhow::Result;
use hicloud_api::CloudApi;
use hicloud_console::{
    Candidate, CommandNode, Details, ExecContext, IdCache, LookupError, Outcome, Render,
    ResourceHandler, ResourceKind, SubcommandSpec, Table,
};
use std::rc::Rc;

// ============================================================================
// Locations
// ============================================================================

pub struct LocationHandler {
    api: Rc<CloudApi>,
}

impl LocationHandler {
    pub fn new(api: Rc<CloudApi>) -> Self {
        Self { api }
    }

    fn list(&self) -> Result<Render> {
        let locations = self.api.list_locations()?;
        let mut table = Table::new(["ID", "Name", "Description", "City", "Country", "Network Zone"])
            .titled("Locations");
        for l in &locations {
            table.row([
                l.id.to_string(),
                l.name.clone(),
                l.description.clone(),
                l.city.clone(),
                l.country.clone(),
                l.network_zone.clone(),
            ]);
        }
        Ok(Render::Table(table))
    }

    fn info(&self, raw: &str) -> Result<Render> {
        let id = parse_id(raw, "location")?;
        let l = found(self.api.get_location(id), "Location", id)?;
        let datacenters: Vec<String> = self
            .api
            .list_datacenters()?
            .into_iter()
            .filter(|d| d.location.id == id)
            .map(|d| d.name)
            .collect();
        Ok(Render::Details(
            Details::new(format!("Location Information: {} (ID: {id})", l.name))
                .field("Description", or_dash(Some(&l.description)))
                .field("City", or_dash(Some(&l.city)))
                .field("Country", or_dash(Some(&l.country)))
                .field("Network Zone", or_dash(Some(&l.network_zone)))
                .field(
                    "Datacenters",
                    if datacenters.is_empty() { "-".to_string() } else { datacenters.join(", ") },
                ),
        ))
    }
}

impl ResourceHandler for LocationHandler {
    fn describe(&self) -> CommandNode {
        CommandNode::new("location", "Show locations")
            .sub(SubcommandSpec::new("list", "location list").summary("List locations"))
            .sub(SubcommandSpec::new("info", "location info <id>").exactly(1).summary("Show location details"))
    }

    fn execute(&self, _ctx: &mut ExecContext<'_>, sub: &str, args: &[String]) -> Outcome {
        finish(match (sub, args) {
            ("list", _) => self.list(),
            ("info", [id]) => self.info(id),
            _ => Err(CommandError::Usage(format!("Unknown location subcommand: {sub}")).into()),
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
            ("info", 0) => id_candidates(cache, &self.api, ResourceKind::Location),
            _ => Ok(Vec::new()),
        }
    }
}

// ============================================================================
// Datacenters
// ============================================================================

pub struct DatacenterHandler {
    api: Rc<CloudApi>,
}

impl DatacenterHandler {
    pub fn new(api: Rc<CloudApi>) -> Self {
        Self { api }
    }

    fn list(&self) -> Result<Render> {
        let datacenters = self.api.list_datacenters()?;
        let mut table = Table::new(["ID", "Name", "Description", "Location", "City"]).titled("Datacenters");
        for d in &datacenters {
            table.row([
                d.id.to_string(),
                d.name.clone(),
                d.description.clone(),
                d.location.name.clone(),
                d.location.city.clone(),
            ]);
        }
        Ok(Render::Table(table))
    }

    fn info(&self, raw: &str) -> Result<Render> {
        let id = parse_id(raw, "datacenter")?;
        let d = found(self.api.get_datacenter(id), "Datacenter", id)?;
        Ok(Render::Details(
            Details::new(format!("Datacenter Information: {} (ID: {id})", d.name))
                .field("Description", or_dash(Some(&d.description)))
                .field("Location", or_dash(Some(&d.location.name)))
                .field("City", or_dash(Some(&d.location.city)))
                .field("Country", or_dash(Some(&d.location.country)))
                .field("Network Zone", or_dash(Some(&d.location.network_zone))),
        ))
    }
}

impl ResourceHandler for DatacenterHandler {
    fn describe(&self) -> CommandNode {
        CommandNode::new("datacenter", "Show datacenters")
            .sub(SubcommandSpec::new("list", "datacenter list").summary("List datacenters"))
            .sub(SubcommandSpec::new("info", "datacenter info <id>").exactly(1).summary("Show datacenter details"))
    }

    fn execute(&self, _ctx: &mut ExecContext<'_>, sub: &str, args: &[String]) -> Outcome {
        finish(match (sub, args) {
            ("list", _) => self.list(),
            ("info", [id]) => self.info(id),
            _ => Err(CommandError::Usage(format!("Unknown datacenter subcommand: {sub}")).into()),
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
            ("info", 0) => id_candidates(cache, &self.api, ResourceKind::Datacenter),
            _ => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::{api, complete, run};
    use hicloud_api::{Method, MockTransport};
    use serde_json::json;

    fn mock() -> Rc<MockTransport> {
        Rc::new(
            MockTransport::new()
                .with(
                    Method::Get,
                    "locations/1",
                    json!({ "location": { "id": 1, "name": "fsn1", "city": "Falkenstein", "country": "DE", "network_zone": "eu-central" } }),
                )
                .with(
                    Method::Get,
                    "datacenters",
                    json!({ "datacenters": [
                        { "id": 4, "name": "fsn1-dc14", "location": { "id": 1, "name": "fsn1" } },
                        { "id": 2, "name": "nbg1-dc3", "location": { "id": 2, "name": "nbg1" } }
                    ]}),
                ),
        )
    }

    #[test]
    fn location_info_lists_its_datacenters() {
        let mock = mock();
        let h = LocationHandler::new(api(&mock));
        let text = run(&h, "info", &["1"], &[]).text();
        assert!(text.contains("Falkenstein"));
        assert!(text.contains("fsn1-dc14"));
        assert!(!text.contains("nbg1-dc3"));
    }

    #[test]
    fn datacenter_list_shows_location() {
        let mock = mock();
        let h = DatacenterHandler::new(api(&mock));
        let text = run(&h, "list", &[], &[]).text();
        assert!(text.contains("fsn1-dc14"));
        assert!(text.contains("nbg1"));
    }

    #[test]
    fn datacenter_ids_complete_from_the_list() {
        let mock = mock();
        let h = DatacenterHandler::new(api(&mock));
        assert_eq!(complete(&h, "info", 0, &[]), vec!["4", "2"]);
    }
}
