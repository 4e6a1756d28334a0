//! hicloud: interactive console for Hetzner Cloud projects.

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use hicloud_api::HttpTransport;
use hicloud_cli::config::{self, write_sample};
use hicloud_cli::{App, Startup};
use std::io;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hicloud")]
#[command(author, version, about = "Interactive console for Hetzner Cloud projects")]
struct Cli {
    /// Configuration file (default: ~/.hicloud.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write a sample configuration file to PATH and exit
    #[arg(long, value_name = "PATH")]
    gen_config: Option<PathBuf>,

    /// Project key from the configuration file
    #[arg(short, long)]
    project: Option<String>,

    /// API token to use instead of the configuration file
    #[arg(long)]
    token: Option<String>,

    /// Debug logging on stderr
    #[arg(long)]
    debug: bool,

    /// Keep command history in memory only
    #[arg(long)]
    no_history: bool,
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    if let Some(path) = &cli.gen_config {
        write_sample(path)?;
        println!("Sample configuration written to {}", path.display());
        println!("Edit it and add your API tokens, then start hicloud.");
        return Ok(());
    }

    let config_path = cli.config.clone().or_else(config::default_config_path);
    let startup = Startup::resolve(config_path.as_deref(), cli.project.as_deref(), cli.token.as_deref())?;

    let transport = HttpTransport::new(
        &startup.settings.api_base_url,
        startup.active_token()?,
        Duration::from_secs(startup.settings.request_timeout_secs),
    )
    .context("failed to set up the HTTP client")?;
    let app = App::new(&startup, Rc::new(transport), !cli.no_history)?;

    println!("{}", app.connection_status());

    #[cfg(feature = "repl-rustyline")]
    let input = {
        let mut source = hicloud_console::RustylineSource::new(app.completion_engine())?;
        source.preload(app.session.borrow().history.iter());
        source
    };
    #[cfg(not(feature = "repl-rustyline"))]
    let input = hicloud_console::StdinSource::new();

    app.console(input, io::stdout()).run()
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug);
    if let Err(e) = run(cli) {
        eprintln!("{} {e:#}", "error:".red().bold());
        std::process::exit(1);
    }
}
