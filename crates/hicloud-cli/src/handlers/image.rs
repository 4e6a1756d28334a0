//! `image`: system, app, snapshot and backup images.

use super::{
    finish, found, id_candidates, or_dash, parse_id, precheck, rest, short_date, words, yes_no,
    CommandError,
};
use anyhow::Result;
use hicloud_api::CloudApi;
use hicloud_console::{
    Candidate, CommandNode, Details, ExecContext, IdCache, LookupError, Outcome, Render,
    ResourceHandler, ResourceKind, SubcommandSpec, Table,
};
use std::rc::Rc;

const IMAGE_TYPES: [&str; 4] = ["system", "app", "snapshot", "backup"];

pub struct ImageHandler {
    api: Rc<CloudApi>,
}

impl ImageHandler {
    pub fn new(api: Rc<CloudApi>) -> Self {
        Self { api }
    }

    fn list(&self, kind: Option<&str>) -> Result<Render> {
        if let Some(k) = kind {
            if !IMAGE_TYPES.contains(&k) {
                return Err(CommandError::InvalidArgument(format!(
                    "Invalid image type '{k}'. Must be one of: {}",
                    IMAGE_TYPES.join(", ")
                ))
                .into());
            }
        }
        let images = self.api.list_images(kind)?;
        if images.is_empty() {
            return Ok(Render::message("No images found"));
        }
        let mut table = Table::new(["ID", "Name", "Type", "Status", "OS", "Created"]).titled("Images");
        for i in &images {
            table.row([
                i.id.to_string(),
                i.label().to_string(),
                i.image_type.clone(),
                i.status.clone(),
                format!("{} {}", i.os_flavor, i.os_version.as_deref().unwrap_or("")).trim().to_string(),
                short_date(&i.created),
            ]);
        }
        Ok(Render::Table(table))
    }

    fn info(&self, raw: &str) -> Result<Render> {
        let id = parse_id(raw, "image")?;
        let i = found(self.api.get_image(id), "Image", id)?;
        let mut details = Details::new(format!("Image Information: {} (ID: {id})", i.label()))
            .field("Type", &i.image_type)
            .field("Status", &i.status)
            .field("Description", or_dash(Some(&i.description)))
            .field("OS Flavor", or_dash(Some(&i.os_flavor)))
            .field("OS Version", or_dash(i.os_version.as_deref()))
            .field("Disk Size", format!("{} GB", i.disk_size))
            .field("Created", short_date(&i.created));
        if let Some(size) = i.image_size {
            details.push("Image Size", format!("{size:.2} GB"));
        }
        if let Some(from) = &i.created_from {
            details.push("Created From", format!("{} (ID: {})", from.name, from.id));
        }
        if let Some(server) = i.bound_to {
            details.push("Bound To", server);
        }
        details.push("Delete Protection", yes_no(i.protection.delete));
        Ok(Render::Details(details))
    }

    fn update(&self, raw: &str, description: &[String]) -> Result<Render> {
        let id = parse_id(raw, "image")?;
        let description = description.join(" ");
        found(self.api.update_image(id, &description), "Image", id)?;
        Ok(Render::message(format!("Image {id} description set to '{description}'")))
    }

    fn import(&self, name: &str, url: &str, description: &[String]) -> Result<Render> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(CommandError::InvalidArgument(format!(
                "Invalid image URL: {url} (must start with http:// or https://)"
            ))
            .into());
        }
        let id = self.api.import_image(name, url, rest(description).as_deref())?;
        Ok(Render::message(format!("Image '{name}' imported with ID {id}")))
    }

    fn delete(&self, raw: &str) -> Result<Render> {
        let id = parse_id(raw, "image")?;
        found(self.api.delete_image(id), "Image", id)?;
        Ok(Render::message(format!("Image {id} deleted")))
    }
}

impl ResourceHandler for ImageHandler {
    fn describe(&self) -> CommandNode {
        CommandNode::new("image", "Manage images")
            .sub(
                SubcommandSpec::new("list", "image list [system|app|snapshot|backup]")
                    .args(0, Some(1))
                    .summary("List images, optionally of one type"),
            )
            .sub(SubcommandSpec::new("info", "image info <id>").exactly(1).summary("Show image details"))
            .sub(
                SubcommandSpec::new("update", "image update <id> <description...>")
                    .args(2, None)
                    .summary("Change an image description"),
            )
            .sub(
                SubcommandSpec::new("import", "image import <name> <url> [description...]")
                    .args(2, None)
                    .summary("Import an image from a disk image URL"),
            )
            .sub(
                SubcommandSpec::new("delete", "image delete <id>")
                    .exactly(1)
                    .destructive()
                    .summary("Delete an image"),
            )
    }

    fn execute(&self, _ctx: &mut ExecContext<'_>, sub: &str, args: &[String]) -> Outcome {
        finish(match (sub, args) {
            ("list", []) => self.list(None),
            ("list", [kind]) => self.list(Some(kind.as_str())),
            ("info", [id]) => self.info(id),
            ("update", [id, rest @ ..]) if !rest.is_empty() => self.update(id, rest),
            ("import", [name, url, desc @ ..]) => self.import(name, url, desc),
            ("delete", [id]) => self.delete(id),
            _ => Err(CommandError::Usage(format!("Unknown image subcommand: {sub}")).into()),
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
            ("list", 0) => Ok(words(&IMAGE_TYPES)),
            ("info" | "update" | "delete", 0) => id_candidates(cache, &self.api, ResourceKind::Image),
            _ => Ok(Vec::new()),
        }
    }

    fn confirm_prompt(&self, sub: &str, args: &[String]) -> Option<String> {
        match (sub, args) {
            ("delete", [id]) => Some(format!("Delete image {id}? This cannot be undone.")),
            _ => None,
        }
    }

    fn check(&self, sub: &str, args: &[String]) -> Result<(), Outcome> {
        precheck(match (sub, args) {
            ("delete", [id]) => parse_id(id, "image").map(drop),
            _ => Ok(()),
        })
    }
}
