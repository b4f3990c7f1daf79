use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::debug;
use luabundle::{
    config::Config,
    dirs::SystemEnvironment,
    orchestrator::{BundleOrchestrator, BundleRequest},
    syntax::{LuacChecker, SyntaxChecker},
};

#[derive(Parser, Debug)]
#[command(
    name = "luabundle",
    version,
    about = "Bundle a multi-module Lua project into one script and deploy it"
)]
struct Cli {
    /// Increase log verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bundle the project rooted at PROJECT_DIR and deploy the result.
    /// A non-main entry file is deployed on its own without bundling.
    Bundle {
        /// Folder containing Main.lua; all requires resolve from here
        project_dir: PathBuf,

        /// Entry file name inside the project (defaults to Main.lua, any casing)
        #[arg(long)]
        entry: Option<String>,

        /// Build output directory, absolute or relative to PROJECT_DIR
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Deployment directory, absolute or relative to PROJECT_DIR
        #[arg(long)]
        deploy_dir: Option<PathBuf>,

        #[command(flatten)]
        checks: CheckOptions,
    },

    /// Check a file's syntax, or with --bundle test that its project bundles
    Check {
        /// Lua file to check; pass Main.lua with --bundle for a project check
        file: PathBuf,

        /// Dry-run the bundle instead of a plain syntax check
        #[arg(long)]
        bundle: bool,

        #[command(flatten)]
        checks: CheckOptions,
    },
}

#[derive(Args, Debug)]
struct CheckOptions {
    /// Lua compiler used for syntax checks
    #[arg(long)]
    luac: Option<PathBuf>,

    /// Skip syntax checks entirely
    #[arg(long)]
    skip_syntax_check: bool,

    /// Deadline in seconds for the whole operation
    #[arg(long)]
    timeout: Option<u64>,
}

impl CheckOptions {
    fn apply(&self, config: &mut Config, syntax_only: bool) {
        if let Some(luac) = &self.luac {
            config.luac = Some(luac.clone());
        }
        if self.skip_syntax_check {
            config.skip_syntax_check = true;
        }
        if let Some(timeout) = self.timeout {
            if syntax_only {
                config.syntax_timeout = timeout;
            } else {
                config.bundle_timeout = timeout;
            }
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let message = match &cli.command {
        Command::Bundle {
            project_dir,
            entry,
            output,
            deploy_dir,
            checks,
        } => {
            let mut config = load_config(project_dir)?;
            checks.apply(&mut config, false);
            let request = BundleRequest {
                project_dir: project_dir.clone(),
                entry_file: entry.clone(),
                output_dir: output.clone(),
                deploy_dir: deploy_dir.clone(),
            };
            run_with_checker(config, |orchestrator| {
                let report = orchestrator.bundle(&request).context("Bundle failed")?;
                Ok(format!("Bundle successful:\n{report}"))
            })?
        }
        Command::Check {
            file,
            bundle,
            checks,
        } => {
            let project_dir = file.parent().unwrap_or_else(|| Path::new("."));
            let mut config = load_config(project_dir)?;
            checks.apply(&mut config, !bundle);
            run_with_checker(config, |orchestrator| {
                if *bundle {
                    let report = orchestrator
                        .validate(file)
                        .context("Bundle check failed")?;
                    Ok(report.to_string())
                } else {
                    let report = orchestrator
                        .check_syntax(file)
                        .context("Lua syntax check failed")?;
                    Ok(report.to_string())
                }
            })?
        }
    };

    print_message(&message);
    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn load_config(project_dir: &Path) -> Result<Config> {
    Config::load(project_dir)
        .with_context(|| format!("Failed to load configuration for {}", project_dir.display()))
}

/// Build the orchestrator with a discovered compiler unless syntax checks are off
fn run_with_checker<F>(config: Config, run: F) -> Result<String>
where
    F: FnOnce(&BundleOrchestrator<'_>) -> Result<String>,
{
    let env = SystemEnvironment;
    let checker = if config.skip_syntax_check {
        None
    } else {
        Some(LuacChecker::discover(config.luac.as_deref(), &env)?)
    };
    if let Some(checker) = &checker {
        debug!("Syntax checks use {}", checker.program().display());
    }

    let checker: Option<&dyn SyntaxChecker> = match &checker {
        Some(checker) => Some(checker),
        None => None,
    };
    let orchestrator = BundleOrchestrator::new(config, &env, checker);
    run(&orchestrator)
}

#[allow(clippy::print_stdout)]
fn print_message(message: &str) {
    println!("{message}");
}
