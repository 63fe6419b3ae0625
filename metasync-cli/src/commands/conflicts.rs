//! `metasync conflicts <paths…>`: point-read the server copies and diff.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use metasync_sync::conflict::{self, ConflictStatus};

use super::sync::absolute_paths;
use super::{connect, exit_code, open_project, runtime};

#[derive(Args, Debug)]
pub struct ConflictsArgs {
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Only list keys; skip the diffs.
    #[arg(long)]
    pub quiet: bool,
}

impl ConflictsArgs {
    pub fn run(self, project: Option<&Path>) -> Result<ExitCode> {
        let project = open_project(project)?;
        let paths = absolute_paths(&self.paths)?;
        let statuses = runtime()?.block_on(async move {
            let ctx = connect(project)?;
            let artifacts = ctx.resolve(&paths).context("failed to resolve paths")?;
            conflict::check_all(&ctx, &artifacts)
                .await
                .context("conflict check failed")
        })?;

        let mut conflicted = 0;
        for status in &statuses {
            match status {
                ConflictStatus::InSync { key } => println!("{} {key}", "✓".green()),
                ConflictStatus::RemoteMissing { key } => {
                    println!("{} {key} (not on the server)", "?".yellow())
                }
                ConflictStatus::Unsupported { key, xml_name } => {
                    println!("{} {key} ({xml_name} cannot be point-read)", "-".bright_black())
                }
                ConflictStatus::Conflict(found) => {
                    conflicted += 1;
                    println!(
                        "{} {} (server copy from {})",
                        "✗".red(),
                        found.key,
                        found.remote_last_modified.to_rfc3339()
                    );
                    if !self.quiet {
                        print!("{}", found.diff);
                    }
                }
            }
        }
        Ok(exit_code(conflicted == 0))
    }
}
