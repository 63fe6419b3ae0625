//! `metasync init [<path>] --name <name> --instance-url <url>`

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;

use metasync_core::project::{init_at, settings_path_at};
use metasync_core::ProjectSettings;

/// Create a project skeleton and its settings.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Project root; created when missing. Defaults to `--project` or `.`.
    pub path: Option<PathBuf>,

    /// Project name.
    #[arg(long, short = 'n')]
    pub name: String,

    /// Org instance URL, e.g. https://acme.my.salesforce.com
    #[arg(long)]
    pub instance_url: String,

    /// Pin the API version for this project.
    #[arg(long)]
    pub api_version: Option<String>,

    #[arg(long)]
    pub username: Option<String>,
}

impl InitArgs {
    pub fn run(self, project: Option<&Path>) -> Result<ExitCode> {
        let target = self
            .path
            .clone()
            .or_else(|| project.map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));
        std::fs::create_dir_all(&target)
            .with_context(|| format!("cannot create '{}'", target.display()))?;
        let root = target
            .canonicalize()
            .with_context(|| format!("cannot resolve path '{}'", target.display()))?;

        let existed = settings_path_at(&root).exists();
        let mut settings = ProjectSettings::new(self.name.clone(), self.instance_url);
        settings.api_version = self.api_version;
        settings.username = self.username;
        let project = init_at(&root, settings)
            .with_context(|| format!("failed to init project at '{}'", root.display()))?;

        if existed {
            println!(
                "✓ '{}' is already a project ({})",
                root.display(),
                project.settings.name
            );
        } else {
            println!("✓ Initialized project '{}' at {}", self.name, root.display());
            println!("  Settings: {}", project.settings_path().display());
            println!("  Sources:  {}", project.source_root().display());
        }
        Ok(ExitCode::SUCCESS)
    }
}
