//! `metasync deploy --target <name>… [<paths…>]`

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;

use anyhow::Result;
use clap::Args;

use metasync_remote::{DeployOptions, TestLevel};
use metasync_sync::pipeline::Intent;

use super::sync::{absolute_paths, execute};

/// Thin wrapper so clap can parse [`TestLevel`].
#[derive(Debug, Clone, Copy)]
pub struct TestLevelArg(pub TestLevel);

impl FromStr for TestLevelArg {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "notestrun" | "none" => Ok(Self(TestLevel::NoTestRun)),
            "runspecifiedtests" | "specified" => Ok(Self(TestLevel::RunSpecifiedTests)),
            "runlocaltests" | "local" => Ok(Self(TestLevel::RunLocalTests)),
            "runalltestsinorg" | "all" => Ok(Self(TestLevel::RunAllTestsInOrg)),
            other => Err(format!(
                "unknown test level '{other}'; expected: none, specified, local, all"
            )),
        }
    }
}

impl fmt::Display for TestLevelArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

/// Deploy the project, or only the given paths, to one or more org targets.
#[derive(Args, Debug)]
pub struct DeployArgs {
    /// Connection name or id; repeat for several orgs.
    #[arg(long = "target", short = 't', required = true, value_name = "NAME")]
    pub targets: Vec<String>,

    /// Validate without saving.
    #[arg(long)]
    pub check_only: bool,

    /// none | specified | local | all
    #[arg(long, value_name = "LEVEL")]
    pub test_level: Option<TestLevelArg>,

    /// Test classes to run (implies `--test-level specified`).
    #[arg(long = "run-test", value_name = "CLASS")]
    pub run_tests: Vec<String>,

    #[arg(long)]
    pub ignore_warnings: bool,

    /// Limit the deploy to these files.
    pub paths: Vec<PathBuf>,
}

impl DeployArgs {
    pub fn run(self, project: Option<&Path>) -> Result<ExitCode> {
        let test_level = match (self.test_level, self.run_tests.is_empty()) {
            (Some(level), _) => Some(level.0),
            (None, false) => Some(TestLevel::RunSpecifiedTests),
            (None, true) => None,
        };
        let options = DeployOptions {
            check_only: self.check_only,
            rollback_on_error: true,
            test_level,
            run_tests: self.run_tests,
            single_package: true,
            ignore_warnings: self.ignore_warnings,
            ..DeployOptions::default()
        };
        let intent = Intent::DeployToTargets {
            targets: self.targets,
            options,
        };
        execute(project, intent, absolute_paths(&self.paths)?)
    }
}
