//! `metasync compile|create|delete|refresh <paths…>` and `metasync clean`.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use metasync_remote::{DeployMessage, DeployResult};
use metasync_sync::pipeline::{self, Intent, OperationDetails, OperationResult, TargetOutcome};
use metasync_sync::{RetrieveOutcome, ToolingCompileResult};

use super::{connect, exit_code, open_project, runtime};

/// Arguments for `metasync compile`.
#[derive(Args, Debug)]
pub struct CompileArgs {
    /// Files to save.
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Skip the check for newer server copies.
    #[arg(long)]
    pub force: bool,
}

/// Arguments for commands that act on a list of files.
#[derive(Args, Debug)]
pub struct PathsArgs {
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy)]
pub enum Action {
    Create,
    Delete,
    Refresh,
}

impl CompileArgs {
    pub fn run(self, project: Option<&Path>) -> Result<ExitCode> {
        let paths = absolute_paths(&self.paths)?;
        execute(project, Intent::Compile { force: self.force }, paths)
    }
}

impl PathsArgs {
    pub fn run(self, project: Option<&Path>, action: Action) -> Result<ExitCode> {
        let intent = match action {
            Action::Create => Intent::Create,
            Action::Delete => Intent::Delete,
            Action::Refresh => Intent::Refresh,
        };
        execute(project, intent, absolute_paths(&self.paths)?)
    }
}

pub fn clean(project: Option<&Path>) -> Result<ExitCode> {
    execute(project, Intent::Clean, Vec::new())
}

/// Run one intent against the project's org and print the outcome.
pub fn execute(project: Option<&Path>, intent: Intent, paths: Vec<PathBuf>) -> Result<ExitCode> {
    let project = open_project(project)?;
    let name = intent.name();
    let result = runtime()?.block_on(async move {
        let ctx = connect(project)?;
        pipeline::run(&ctx, intent, &paths)
            .await
            .with_context(|| format!("{name} failed"))
    })?;
    print_result(&result);
    Ok(exit_code(result.success))
}

/// Paths given on the command line are relative to the working directory.
pub fn absolute_paths(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let cwd = std::env::current_dir().context("could not determine working directory")?;
    Ok(paths
        .iter()
        .map(|p| if p.is_absolute() { p.clone() } else { cwd.join(p) })
        .collect())
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

pub fn print_result(result: &OperationResult) {
    match &result.details {
        OperationDetails::Tooling(compile) => print_tooling(compile),
        OperationDetails::Deploy(deploy) => print_deploy(deploy),
        OperationDetails::Conflicts(conflicts) => {
            for conflict in conflicts {
                println!(
                    "{} {} changed on the server at {}{}",
                    "✗".red(),
                    conflict.key.to_string().bold(),
                    conflict.remote_last_modified.to_rfc3339(),
                    conflict
                        .remote_last_modified_by_id
                        .as_deref()
                        .map(|by| format!(" by {by}"))
                        .unwrap_or_default(),
                );
                print!("{}", conflict.diff);
            }
            println!("Refresh first, or rerun with --force to overwrite.");
        }
        OperationDetails::Deleted {
            result: deploy,
            removed_files,
            removed_index_entries,
        } => {
            print_deploy(deploy);
            if deploy.success {
                for path in removed_files {
                    println!("  removed {}", path.display());
                }
                println!("  index entries dropped: {removed_index_entries}");
            }
        }
        OperationDetails::Retrieve { outcome, .. } => print_retrieve(outcome),
        OperationDetails::Targets(outcomes) => print_targets(outcomes),
    }
}

fn print_failures(failures: &[DeployMessage]) {
    for failure in failures {
        println!("  {} {failure}", "✗".red());
    }
}

fn print_tooling(result: &ToolingCompileResult) {
    if result.success {
        println!("{} compile succeeded", "✓".green());
    } else {
        println!(
            "{} compile failed: {}",
            "✗".red(),
            result.error_message.as_deref().unwrap_or("see component errors")
        );
        for failure in &result.member_failures {
            println!("  {} {}: {}", "✗".red(), failure.key, failure.message);
        }
        print_failures(&result.component_failures);
    }
    if let Some(err) = &result.cleanup_error {
        println!(
            "  {} container {} could not be deleted: {err}",
            "!".yellow(),
            result.container_id
        );
    }
}

fn print_deploy(result: &DeployResult) {
    if result.success {
        println!(
            "{} deployed {}/{} component(s)",
            "✓".green(),
            result.number_components_deployed,
            result.number_components_total
        );
    } else {
        println!(
            "{} deploy {:?}: {}",
            "✗".red(),
            result.status,
            result.error_message.as_deref().unwrap_or("see component errors")
        );
        print_failures(&result.component_failures);
    }
    for warning in &result.code_coverage_warnings {
        println!("  {} {}", "!".yellow(), warning.message);
    }
}

fn print_retrieve(outcome: &RetrieveOutcome) {
    if !outcome.success() {
        println!(
            "{} retrieve failed: {}",
            "✗".red(),
            outcome.result.error_message.as_deref().unwrap_or("unknown error")
        );
        for message in &outcome.result.messages {
            println!("  {} {}: {}", "✗".red(), message.file_name, message.problem);
        }
        return;
    }
    let written = outcome.merged.iter().filter(|w| w.is_written()).count();
    println!(
        "{} retrieved {} file(s) ({} written, {} unchanged)",
        "✓".green(),
        outcome.files.len(),
        written,
        outcome.merged.len() - written
    );
    for write in outcome.merged.iter().filter(|w| w.is_written()) {
        println!("  wrote {}", write.path().display());
    }
    if outcome.index_update.skipped > 0 {
        println!(
            "  {} {} record(s) not indexed",
            "!".yellow(),
            outcome.index_update.skipped
        );
    }
}

#[derive(Tabled)]
struct TargetRow {
    #[tabled(rename = "target")]
    target: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "detail")]
    detail: String,
}

fn print_targets(outcomes: &[TargetOutcome]) {
    let rows: Vec<TargetRow> = outcomes
        .iter()
        .map(|outcome| {
            let (status, detail) = match &outcome.result {
                Ok(result) if result.success => (
                    "ok".green().to_string(),
                    format!(
                        "{}/{} deployed",
                        result.number_components_deployed, result.number_components_total
                    ),
                ),
                Ok(result) => (
                    "failed".red().to_string(),
                    result
                        .component_failures
                        .first()
                        .map(ToString::to_string)
                        .or_else(|| result.error_message.clone())
                        .unwrap_or_else(|| format!("{:?}", result.status)),
                ),
                Err(err) => ("error".red().to_string(), err.to_string()),
            };
            TargetRow {
                target: outcome.target.name.clone(),
                status,
                detail,
            }
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}
