//! `metasync index [--json]`: read-only view of the local index.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::SecondsFormat;
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use metasync_sync::local_index::{self, LocalIndexFile};
use metasync_sync::SyncState;

use super::open_project;

#[derive(Args, Debug)]
pub struct IndexArgs {
    /// Emit the stored document as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct EntryRow {
    #[tabled(rename = "key")]
    key: String,
    #[tabled(rename = "type")]
    type_name: String,
    #[tabled(rename = "id")]
    id: String,
    #[tabled(rename = "last modified")]
    last_modified: String,
    #[tabled(rename = "state")]
    state: String,
}

impl IndexArgs {
    pub fn run(self, project: Option<&Path>) -> Result<ExitCode> {
        let project = open_project(project)?;
        let path = project.local_store_path();
        let stored = local_index::load_at(&path)
            .with_context(|| format!("failed to read local index '{}'", path.display()))?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&stored).context("failed to serialize index")?
            );
        } else {
            print_table(&stored);
        }
        Ok(ExitCode::SUCCESS)
    }
}

fn print_table(stored: &LocalIndexFile) {
    if stored.entries.is_empty() {
        println!("Local index is empty.");
        println!("Run: metasync clean");
        return;
    }
    let rows: Vec<EntryRow> = stored
        .entries
        .iter()
        .map(|(key, entry)| EntryRow {
            key: key.to_string(),
            type_name: entry.type_name.clone(),
            id: entry
                .id
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "-".to_owned()),
            last_modified: entry
                .last_modified_date
                .to_rfc3339_opts(SecondsFormat::Secs, true),
            state: match entry.sync_state {
                SyncState::Clean => "clean".green().to_string(),
                SyncState::Conflicted => "conflicted".red().to_string(),
            },
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    println!(
        "{} entr{} (synced {})",
        stored.entries.len(),
        if stored.entries.len() == 1 { "y" } else { "ies" },
        stored.synced_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    );
}
