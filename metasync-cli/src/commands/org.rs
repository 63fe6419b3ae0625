//! `metasync org list|add|update|remove`

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use metasync_core::connections::{self, ConnectionUpdate, NewConnection, OrgConnectionTarget};

use super::open_project;

/// Manage the org connection targets used by `metasync deploy`.
#[derive(Subcommand, Debug)]
pub enum OrgCommand {
    /// List connection targets.
    List {
        /// Emit machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Add a connection target.
    Add(AddArgs),

    /// Change a connection target, by name or id.
    Update(UpdateArgs),

    /// Remove a connection target, by name or id.
    Remove {
        key: String,
    },
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Unique name, e.g. "staging".
    pub name: String,

    #[arg(long)]
    pub instance_url: String,

    #[arg(long)]
    pub access_token: Option<String>,

    #[arg(long)]
    pub refresh_token: Option<String>,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Name or id of the target.
    pub key: String,

    #[arg(long)]
    pub name: Option<String>,

    #[arg(long)]
    pub instance_url: Option<String>,

    #[arg(long)]
    pub access_token: Option<String>,

    #[arg(long)]
    pub refresh_token: Option<String>,
}

pub fn run(project: Option<&Path>, cmd: OrgCommand) -> Result<ExitCode> {
    let project = open_project(project)?;
    match cmd {
        OrgCommand::List { json } => {
            let targets = connections::list_connections(&project)
                .context("failed to read org connections")?;
            if json {
                print_json(&targets)?;
            } else {
                print_table(&targets);
            }
        }
        OrgCommand::Add(args) => {
            let target = connections::add_connection(
                &project,
                NewConnection {
                    name: args.name,
                    instance_url: args.instance_url,
                    access_token: args.access_token,
                    refresh_token: args.refresh_token,
                },
            )
            .context("failed to add org connection")?;
            println!("✓ Added '{}' ({})", target.name, target.id);
        }
        OrgCommand::Update(args) => {
            let key = args.key;
            let target = connections::update_connection(
                &project,
                &key,
                ConnectionUpdate {
                    name: args.name,
                    instance_url: args.instance_url,
                    access_token: args.access_token,
                    refresh_token: args.refresh_token,
                },
            )
            .with_context(|| format!("failed to update org connection '{key}'"))?;
            println!("✓ Updated '{}' ({})", target.name, target.id);
        }
        OrgCommand::Remove { key } => {
            let target = connections::remove_connection(&project, &key)
                .with_context(|| format!("failed to remove org connection '{key}'"))?;
            println!("✓ Removed '{}' ({})", target.name, target.id);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn auth_label(target: &OrgConnectionTarget) -> &'static str {
    match (&target.access_token, &target.refresh_token) {
        (Some(_), _) => "access token",
        (None, Some(_)) => "refresh token",
        (None, None) => "none",
    }
}

/// Credentials never leave the connection store.
#[derive(Serialize)]
struct TargetJson<'a> {
    id: &'a str,
    name: &'a str,
    instance_url: &'a str,
    auth: &'static str,
}

#[derive(Tabled)]
struct TargetRow {
    #[tabled(rename = "name")]
    name: String,
    #[tabled(rename = "instance")]
    instance_url: String,
    #[tabled(rename = "auth")]
    auth: String,
    #[tabled(rename = "id")]
    id: String,
}

fn print_json(targets: &[OrgConnectionTarget]) -> Result<()> {
    let payload: Vec<TargetJson<'_>> = targets
        .iter()
        .map(|t| TargetJson {
            id: &t.id,
            name: &t.name,
            instance_url: &t.instance_url,
            auth: auth_label(t),
        })
        .collect();
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize connections")?
    );
    Ok(())
}

fn print_table(targets: &[OrgConnectionTarget]) {
    if targets.is_empty() {
        println!("No org connections.");
        println!("Run: metasync org add <name> --instance-url <url> --access-token <token>");
        return;
    }
    let rows: Vec<TargetRow> = targets
        .iter()
        .map(|t| TargetRow {
            name: t.name.clone(),
            instance_url: t.instance_url.clone(),
            auth: auth_label(t).to_owned(),
            id: t.id.clone(),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}
