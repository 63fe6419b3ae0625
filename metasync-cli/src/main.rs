//! Metasync: keep a local metadata project in sync with its org.
//!
//! # Usage
//!
//! ```text
//! metasync init [<path>] --name <name> --instance-url <url> [--api-version <v>]
//! metasync compile <paths…> [--force]
//! metasync create|delete|refresh <paths…>
//! metasync clean
//! metasync deploy --target <name>… [--check-only] [--test-level <level>]
//!                 [--run-test <class>…] [--ignore-warnings] [<paths…>]
//! metasync conflicts <paths…> [--quiet]
//! metasync org list|add|update|remove
//! metasync index [--json]
//! metasync describe
//! ```
//!
//! Global flags: `--project <dir>` (default: nearest enclosing project) and
//! `-v` (debug logging, full error chains).

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};

use commands::{
    conflicts::ConflictsArgs, deploy::DeployArgs, describe::DescribeArgs, index::IndexArgs,
    init::InitArgs, org::OrgCommand, sync::CompileArgs, sync::PathsArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "metasync",
    version,
    about = "Deploy, retrieve and incrementally compile org metadata",
    long_about = None,
)]
struct Cli {
    /// Project directory (defaults to the nearest enclosing project).
    #[arg(long, global = true, value_name = "DIR")]
    project: Option<PathBuf>,

    /// Debug logging and full error chains.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a project skeleton and its settings.
    Init(InitArgs),

    /// Save local changes to the org.
    Compile(CompileArgs),

    /// Create new artifacts on the org and add them to the project manifest.
    Create(PathsArgs),

    /// Delete artifacts from the org, the project and the local index.
    Delete(PathsArgs),

    /// Overwrite local files with the org's copies.
    Refresh(PathsArgs),

    /// Retrieve the whole project manifest and rebuild the local index.
    Clean,

    /// Deploy the project (or the given paths) to other orgs.
    Deploy(DeployArgs),

    /// Compare local files with the org's copies.
    Conflicts(ConflictsArgs),

    /// Manage org connection targets.
    Org {
        #[command(subcommand)]
        command: OrgCommand,
    },

    /// Show the local index.
    Index(IndexArgs),

    /// Fetch the org's type describe and cache it in the project.
    Describe(DescribeArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let verbose = cli.verbose > 0;
    match dispatch(cli) {
        Ok(code) => code,
        Err(err) => {
            if verbose {
                eprintln!("error: {err:?}");
            } else {
                eprintln!("error: {err:#}");
            }
            std::process::ExitCode::FAILURE
        }
    }
}

fn dispatch(cli: Cli) -> Result<std::process::ExitCode> {
    let project = cli.project.as_deref();
    match cli.command {
        Commands::Init(args) => args.run(project),
        Commands::Compile(args) => args.run(project),
        Commands::Create(args) => args.run(project, commands::sync::Action::Create),
        Commands::Delete(args) => args.run(project, commands::sync::Action::Delete),
        Commands::Refresh(args) => args.run(project, commands::sync::Action::Refresh),
        Commands::Clean => commands::sync::clean(project),
        Commands::Deploy(args) => args.run(project),
        Commands::Conflicts(args) => args.run(project),
        Commands::Org { command } => commands::org::run(project, command),
        Commands::Index(args) => args.run(project),
        Commands::Describe(args) => args.run(project),
    }
}

fn init_tracing(verbose: u8) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose > 0 { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
