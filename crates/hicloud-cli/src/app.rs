//! Startup wiring: configuration → projects → session, handlers → registry.
//!
//! Everything here is independent of the terminal so the whole console can be
//! assembled in tests around a [`MockTransport`](hicloud_api::MockTransport).

use crate::config::{Config, ConfigError, ConsoleSettings};
use crate::handlers::{all_handlers, Credentials, HandlerContext};
use anyhow::{anyhow, Context, Result};
use colored::Colorize;
use hicloud_api::{CloudApi, Transport};
use hicloud_console::{
    CompletionEngine, Console, History, IdCache, LineSource, Project, Registry, RegistryBuilder,
    SessionState,
};
use std::cell::RefCell;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

/// Project key used when the token comes from the command line.
pub const TOKEN_PROJECT: &str = "default";

/// Resolved startup inputs.
#[derive(Debug, Clone)]
pub struct Startup {
    pub settings: ConsoleSettings,
    /// `(project, api token)` in configuration order.
    pub projects: Vec<(Project, String)>,
    pub active: String,
    pub config_path: Option<PathBuf>,
}

impl Startup {
    /// `--token` wins over everything, then `--project`, then `default`, then
    /// the first project in the file.
    pub fn resolve(config_path: Option<&Path>, project: Option<&str>, token: Option<&str>) -> Result<Self> {
        if let Some(token) = token {
            // Console settings still come from the file when there is a usable one.
            let settings = config_path
                .filter(|p| p.exists())
                .and_then(|p| Config::load(p).ok())
                .map(|c| c.console)
                .unwrap_or_default();
            let key = project.unwrap_or(TOKEN_PROJECT);
            return Ok(Self {
                settings,
                projects: vec![(Project::new(key, key), token.to_string())],
                active: key.to_string(),
                config_path: config_path.map(Path::to_path_buf),
            });
        }

        let path = config_path.ok_or_else(|| anyhow!("cannot locate a home directory; pass --config or --token"))?;
        let config = Config::load(path).map_err(|e| match e {
            ConfigError::NotFound(p) => anyhow!(
                "no configuration file at {}. Create one with `hicloud --gen-config {}` or pass --token",
                p.display(),
                p.display()
            ),
            other => anyhow::Error::new(other),
        })?;
        let (active, _) = config.select(project)?;
        let active = active.to_string();

        let mut projects = Vec::with_capacity(config.projects.len());
        for (key, p) in &config.projects {
            if p.api_token.trim().is_empty() {
                tracing::warn!(project = %key, "project has an empty api_token");
            }
            projects.push((Project::new(key.clone(), p.display_name(key)), p.api_token.clone()));
        }
        Ok(Self {
            settings: config.console,
            projects,
            active,
            config_path: Some(path.to_path_buf()),
        })
    }

    pub fn active_token(&self) -> Result<&str> {
        self.projects
            .iter()
            .find(|(p, _)| p.key == self.active)
            .map(|(_, t)| t.as_str())
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| anyhow!("no API token configured for project `{}`", self.active))
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.projects.iter().map(|(p, t)| (p.key.clone(), t.clone())))
    }

    /// History from the configured file, or in memory with `--no-history` or
    /// when the file cannot be read.
    pub fn history(&self, persistent: bool) -> History {
        let bound = self.settings.history_bound();
        if !persistent {
            return History::new(bound);
        }
        match self.settings.history_path() {
            Some(path) => History::load(&path, bound).unwrap_or_else(|e| {
                tracing::warn!("history disabled: {e}");
                History::new(bound)
            }),
            None => History::new(bound),
        }
    }
}

/// The assembled console: shared registry, session and API client.
pub struct App {
    pub api: Rc<CloudApi>,
    pub registry: Rc<Registry>,
    pub session: Rc<RefCell<SessionState>>,
}

impl App {
    pub fn new(startup: &Startup, transport: Rc<dyn Transport>, persistent_history: bool) -> Result<Self> {
        let api = Rc::new(CloudApi::new(transport));
        Self::with_api(startup, api, persistent_history)
    }

    pub fn with_api(startup: &Startup, api: Rc<CloudApi>, persistent_history: bool) -> Result<Self> {
        api.set_token(startup.active_token()?);

        let ctx = HandlerContext {
            api: api.clone(),
            credentials: Rc::new(startup.credentials()),
            config_path: startup.config_path.clone(),
        };
        let registry = all_handlers(&ctx)
            .into_iter()
            .fold(RegistryBuilder::new(), RegistryBuilder::boxed)
            .build()
            .context("invalid command registry")?;

        let session = SessionState::new(
            startup.projects.iter().map(|(p, _)| p.clone()).collect(),
            &startup.active,
            startup.history(persistent_history),
            IdCache::new(Duration::from_secs(startup.settings.completion_cache_secs)),
        )?;

        Ok(Self {
            api,
            registry: Rc::new(registry),
            session: Rc::new(RefCell::new(session)),
        })
    }

    pub fn completion_engine(&self) -> CompletionEngine {
        CompletionEngine::new(self.registry.clone(), self.session.clone())
    }

    pub fn banner(&self) -> String {
        let session = self.session.borrow();
        let project = session.active_project();
        format!(
            "{}\nActive project: {} ({})\nType 'help' for available commands, 'exit' to quit.",
            format!("hicloud Interactive Console v{}", env!("CARGO_PKG_VERSION")).bold(),
            project.name.green(),
            project.key
        )
    }

    /// One cheap read to tell the operator whether the token works.
    pub fn connection_status(&self) -> String {
        match self.api.list_datacenters() {
            Ok(dcs) => format!("Connected ({} datacenters available)", dcs.len())
                .green()
                .to_string(),
            Err(e) => {
                tracing::warn!("connection check failed: {e}");
                format!("Connection failed: {e}").red().to_string()
            }
        }
    }

    pub fn console<L: LineSource, W: Write>(&self, input: L, out: W) -> Console<L, W> {
        Console::new(self.registry.clone(), self.session.clone(), input, out).with_banner(self.banner())
    }
}
