//! `project`: what the active project holds, and switching between the
//! projects of the configuration file.

use super::{finish, short_date, CommandError, Credentials};
use anyhow::Result;
use hicloud_api::CloudApi;
use hicloud_console::{
    CommandNode, Details, ExecContext, Outcome, Render, ResourceHandler, SessionState,
    SubcommandSpec, Table,
};
use std::rc::Rc;

pub struct ProjectHandler {
    api: Rc<CloudApi>,
    credentials: Rc<Credentials>,
}

impl ProjectHandler {
    pub fn new(api: Rc<CloudApi>, credentials: Rc<Credentials>) -> Self {
        Self { api, credentials }
    }

    fn resources(&self, session: &SessionState) -> Result<Render> {
        let mut parts = vec![Render::message(format!(
            "Resources in project '{}':",
            session.active_project().name
        ))];

        let servers = self.api.list_servers()?;
        let mut table = Table::new(["ID", "Name", "Status", "Type"])
            .titled(format!("Virtual Machines: {}", servers.len()));
        for s in &servers {
            table.row([s.id.to_string(), s.name.clone(), s.status.clone(), s.server_type.name.clone()]);
        }
        parts.push(Render::Table(table));

        for (kind, title) in [("snapshot", "Snapshots"), ("backup", "Backups")] {
            let images = self.api.list_images(Some(kind))?;
            let mut table = Table::new(["ID", "Description", "Created"])
                .titled(format!("{title}: {}", images.len()));
            for i in &images {
                table.row([i.id.to_string(), i.label().to_string(), short_date(&i.created)]);
            }
            parts.push(Render::Table(table));
        }

        let keys = self.api.list_ssh_keys()?;
        let mut table = Table::new(["ID", "Name"]).titled(format!("SSH Keys: {}", keys.len()));
        for k in &keys {
            table.row([k.id.to_string(), k.name.clone()]);
        }
        parts.push(Render::Table(table));

        Ok(Render::Sequence(parts))
    }

    fn list(&self, session: &SessionState) -> Render {
        let active = &session.active_project().key;
        let mut table = Table::new(["#", "Project", "Name", "Current"]).titled("Available Projects");
        for (n, p) in session.projects().iter().enumerate() {
            table.row([
                (n + 1).to_string(),
                p.key.clone(),
                p.name.clone(),
                if &p.key == active { "*".to_string() } else { String::new() },
            ]);
        }
        Render::Sequence(vec![
            Render::Table(table),
            Render::message("Use 'project switch <project|number>' to change the active project."),
        ])
    }

    fn switch(&self, session: &mut SessionState, target: &str) -> Result<Render> {
        let project = session.resolve_project(target).map_err(|_| {
            let known: Vec<&str> = session.projects().iter().map(|p| p.key.as_str()).collect();
            CommandError::NotFound(format!(
                "Project '{target}' not found. Available projects: {}",
                known.join(", ")
            ))
        })?;
        let key = project.key.clone();
        let Some(token) = self.credentials.token(&key) else {
            return Err(CommandError::InvalidArgument(format!("No API token configured for project '{key}'")).into());
        };
        self.api.set_token(token);
        let project = session.switch_project(&key)?;
        Ok(Render::message(format!(
            "Switched to project '{}' ({})",
            project.name, project.key
        )))
    }

    fn info(&self, session: &SessionState) -> Result<Render> {
        let project = session.active_project();
        let mut details = Details::new(format!("Project Information: {}", project.name))
            .field("Key", &project.key);

        let datacenters = match self.api.list_datacenters() {
            Ok(dcs) => dcs,
            Err(e) => {
                details.push("Connection Status", format!("Error: {e}"));
                return Ok(Render::Details(details));
            }
        };
        details.push("Connection Status", "Connected");

        let servers = self.api.list_servers()?;
        let running = servers.iter().filter(|s| s.status == "running").count();
        details.push("VMs", format!("{} total, {running} running", servers.len()));
        details.push("Snapshots", self.api.list_images(Some("snapshot"))?.len());
        details.push("Networks", self.api.list_networks()?.len());
        details.push("SSH Keys", self.api.list_ssh_keys()?.len());
        details.push("Datacenters", datacenters.len());

        let mut locations = Table::new(["Datacenter", "Location", "City", "Country"])
            .titled("Available Locations");
        for dc in &datacenters {
            locations.row([
                dc.name.clone(),
                dc.location.name.clone(),
                dc.location.city.clone(),
                dc.location.country.clone(),
            ]);
        }
        Ok(Render::Sequence(vec![Render::Details(details), Render::Table(locations)]))
    }
}

impl ResourceHandler for ProjectHandler {
    fn describe(&self) -> CommandNode {
        CommandNode::new("project", "Show and switch projects")
            .sub(SubcommandSpec::new("resources", "project resources").summary("List resources of the active project"))
            .sub(SubcommandSpec::new("list", "project list").summary("List configured projects"))
            .sub(
                SubcommandSpec::new("switch", "project switch <key|number>")
                    .exactly(1)
                    .summary("Make another project active"),
            )
            .sub(SubcommandSpec::new("info", "project info").summary("Show the active project and its connection"))
            .default_sub("resources")
    }

    fn execute(&self, ctx: &mut ExecContext<'_>, sub: &str, args: &[String]) -> Outcome {
        let session = &mut *ctx.session;
        finish(match (sub, args) {
            ("resources", _) => self.resources(session),
            ("list", _) => Ok(self.list(session)),
            ("switch", [target]) => self.switch(session, target),
            ("info", _) => self.info(session),
            _ => Err(CommandError::Usage(format!("Unknown project subcommand: {sub}")).into()),
        })
    }
}
