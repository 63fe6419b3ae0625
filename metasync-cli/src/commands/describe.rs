//! `metasync describe`: refresh the cached type catalog from the org.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;

use super::{connect, open_project, runtime};

#[derive(Args, Debug)]
pub struct DescribeArgs {}

impl DescribeArgs {
    pub fn run(self, project: Option<&Path>) -> Result<ExitCode> {
        let project = open_project(project)?;
        let cache = project.describe_cache_path();
        let types = runtime()?.block_on(async move {
            let mut ctx = connect(project)?;
            ctx.refresh_catalog().await.context("describe failed")
        })?;
        tracing::debug!(path = %cache.display(), "describe cache written");
        println!("✓ Cached {types} metadata type(s) in {}", cache.display());
        Ok(ExitCode::SUCCESS)
    }
}
