//! `config`: inspect and validate the configuration file.

use super::{finish, yes_no, CommandError, Credentials};
use crate::config::{self, Config, ValidationReport};
use anyhow::Result;
use hicloud_console::{
    CommandNode, Details, ExecContext, Outcome, Render, ResourceHandler, SessionState,
    SubcommandSpec,
};
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Shows only enough of a token to tell two apart.
fn token_preview(token: Option<&str>) -> String {
    match token {
        Some(t) if t.chars().count() > 8 => format!("{}...", t.chars().take(8).collect::<String>()),
        Some(t) if !t.is_empty() => "(set)".to_string(),
        _ => "(none)".to_string(),
    }
}

fn report_render(path: &Path, report: &ValidationReport) -> Render {
    let mut parts = vec![Render::message(format!("Validating config: {}", path.display()))];
    if !report.warnings.is_empty() {
        let mut d = Details::new("Warnings");
        for (n, w) in report.warnings.iter().enumerate() {
            d.push(format!("{}", n + 1), w);
        }
        parts.push(Render::Details(d));
    }
    if !report.errors.is_empty() {
        let mut d = Details::new("Errors");
        for (n, e) in report.errors.iter().enumerate() {
            d.push(format!("{}", n + 1), e);
        }
        parts.push(Render::Details(d));
    }
    parts.push(Render::message(report.summary()));
    Render::Sequence(parts)
}

pub struct ConfigHandler {
    path: Option<PathBuf>,
    credentials: Rc<Credentials>,
}

impl ConfigHandler {
    pub fn new(path: Option<PathBuf>, credentials: Rc<Credentials>) -> Self {
        Self { path, credentials }
    }

    fn effective_path(&self) -> Option<PathBuf> {
        self.path.clone().or_else(config::default_config_path)
    }

    fn info(&self, session: &SessionState) -> Result<Render> {
        let mut details = Details::new("Configuration");
        match self.effective_path() {
            Some(path) => {
                let exists = path.exists();
                details.push("Config Path", path.display());
                details.push("File Exists", yes_no(exists));
                if exists {
                    if let Some(mode) = config::file_mode(&path) {
                        let verdict = if mode == 0o600 { "OK" } else { "WARNING: should be 0o600" };
                        details.push("Permissions", format!("{mode:#o} ({verdict})"));
                    }
                    match Config::load(&path) {
                        Ok(cfg) => {
                            let keys: Vec<&str> = cfg.projects.iter().map(|(k, _)| k.as_str()).collect();
                            details.push(
                                format!("Projects ({})", keys.len()),
                                if keys.is_empty() { "(none)".to_string() } else { keys.join(", ") },
                            );
                        }
                        Err(e) => details.push("Load Error", e),
                    }
                }
            }
            None => details.push("Config Path", "(no home directory)"),
        }
        let active = session.active_project();
        details.push("Active Project", format!("{} ({})", active.name, active.key));
        details.push("API Token", token_preview(self.credentials.token(&active.key)));
        Ok(Render::Details(details))
    }

    fn validate(&self, path: Option<&String>) -> Result<Render> {
        let path = match path {
            Some(p) => PathBuf::from(p),
            None => self.effective_path().ok_or_else(|| {
                CommandError::InvalidArgument("No config path given and no home directory found".to_string())
            })?,
        };
        let report = config::validate(&path);
        tracing::debug!(path = %path.display(), errors = report.errors.len(), warnings = report.warnings.len(), "validated configuration");
        Ok(report_render(&path, &report))
    }
}

impl ResourceHandler for ConfigHandler {
    fn describe(&self) -> CommandNode {
        CommandNode::new("config", "Inspect the configuration file")
            .sub(SubcommandSpec::new("info", "config info").summary("Show config path, projects and active token"))
            .sub(
                SubcommandSpec::new("validate", "config validate [path]")
                    .args(0, Some(1))
                    .summary("Check a configuration file for problems"),
            )
    }

    fn execute(&self, ctx: &mut ExecContext<'_>, sub: &str, args: &[String]) -> Outcome {
        finish(match sub {
            "info" => self.info(ctx.session),
            "validate" => self.validate(args.first()),
            _ => Err(CommandError::Usage(format!("Unknown config subcommand: {sub}")).into()),
        })
    }
}
