//! passvault - Command-line client for a remote password vault
//!
//! Logs in once, keeps the session on disk, and drives the vault's
//! operations one command at a time. Failures are reported as
//! notifications; recoverable ones offer a retry on a terminal.

mod cli;

use anyhow::Result;
use clap::Parser;
use passvault::{App, Config, Paths};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

fn main() -> Result<ExitCode> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let paths = Paths::new();
    let config = Config::load(&paths)?;

    let rt = tokio::runtime::Runtime::new()?;
    let ok = rt.block_on(async move {
        let app = App::from_config(&config, &paths)?;
        let ok = run_command(&app, cli.command).await;
        app.notifier.shutdown().await;
        ok
    })?;

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

async fn run_command(app: &App, command: Commands) -> Result<bool> {
    match command {
        Commands::Register {
            username,
            email,
            password,
        } => cli::cmd_register(app, username, email, password).await,
        Commands::Login { username, password } => cli::cmd_login(app, username, password).await,
        Commands::Logout => cli::cmd_logout(app).await,
        Commands::Whoami { json } => cli::cmd_whoami(app, json).await,
        Commands::List { category, json } => cli::cmd_list(app, category, json).await,
        Commands::Show { id, json } => cli::cmd_show(app, id, json).await,
        Commands::Reveal { id } => cli::cmd_reveal(app, id).await,
        Commands::Generate { kind } => cli::cmd_generate(app, kind).await,
        Commands::Add { label, fields } => cli::cmd_add(app, label, fields).await,
        Commands::Edit { id, label, fields } => cli::cmd_edit(app, id, label, fields).await,
        Commands::Delete { id } => cli::cmd_delete(app, id).await,
        Commands::Categories { json } => cli::cmd_categories(app, json).await,
    }
}
