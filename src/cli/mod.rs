//! Command line interface
//!
//! - `platforms`: list the platform matrix
//! - `plan`: dry run of one platform
//! - `run`: execute one or more platforms concurrently
//! - `completions`: generate shell completions

pub mod completions;

use anyhow::{Context, Result};
use binarydist::executor::{Collaborators, Orchestrator, RunReport, StopSignal, TriggerInput};
use binarydist::infrastructure::{Config, init_logging};
use binarydist::pipeline::RunStatus;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;

/// Exit code of a run that finished with non-fatal step failures
const EXIT_WARNINGS: u8 = 2;

/// CLI arguments for binarydist
#[derive(Parser, Debug)]
#[command(name = "binarydist")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// YAML configuration file (built-in defaults if omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List configured platforms
    Platforms,

    /// Show the steps a run would execute, without running anything
    Plan {
        /// Platform key
        platform: String,
        #[command(flatten)]
        source: SourceArgs,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Build, package and publish
    Run {
        /// Platform keys, run concurrently
        #[arg(required = true)]
        platforms: Vec<String>,
        #[command(flatten)]
        source: SourceArgs,
        /// Workspace root for local agents
        #[arg(short, long)]
        workspace: Option<PathBuf>,
        /// Print reports as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: ShellArg,
        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug)]
struct SourceArgs {
    /// Repository to build instead of the configured one
    #[arg(long)]
    repository: Option<String>,
    /// Branch to build instead of the configured one
    #[arg(long)]
    branch: Option<String>,
}

impl SourceArgs {
    fn trigger(&self, platform: &str) -> TriggerInput {
        TriggerInput {
            platform: platform.to_string(),
            repository: self.repository.clone(),
            branch: self.branch.clone(),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ShellArg {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => Ok(Config::default()),
    }
}

/// Process exit code for a set of run results
fn exit_code(results: &[Result<RunReport, binarydist::pipeline::PipelineError>]) -> ExitCode {
    let halted = results.iter().any(|r| match r {
        Ok(report) => report.status.is_halted(),
        Err(_) => true,
    });
    if halted {
        return ExitCode::FAILURE;
    }
    let warnings = results
        .iter()
        .flatten()
        .any(|report| report.status == RunStatus::FailedContinued);
    if warnings {
        ExitCode::from(EXIT_WARNINGS)
    } else {
        ExitCode::SUCCESS
    }
}

/// Parse and execute CLI arguments
pub fn run() -> Result<ExitCode> {
    let args = Args::parse();

    if let Command::Completions { shell, output } = &args.command {
        let completions = completions::generate_completions((*shell).into())?;
        if let Some(output_path) = output {
            completions::save_completions(&completions, output_path)?;
        } else {
            println!("{completions}");
        }
        return Ok(ExitCode::SUCCESS);
    }

    let mut config = load_config(args.config.as_ref())?;
    init_logging(if args.verbose {
        "debug"
    } else {
        config.log_level.as_str()
    });

    match args.command {
        Command::Platforms => {
            let matrix = config.matrix()?;
            for platform in matrix.iter() {
                let publish = if platform.publish_eligible { "publish" } else { "build-only" };
                println!(
                    "{:<24} {:<20} {:<8} {:<8} {:<11} {}",
                    platform.key, platform.agent, platform.os, platform.arch, publish, platform.flags
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Plan {
            platform,
            source,
            json,
        } => {
            let orchestrator = Orchestrator::new(&config, Collaborators::local(&config))?;
            let plan = orchestrator.plan(&source.trigger(&platform))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                print!("{plan}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Run {
            platforms,
            source,
            workspace,
            json,
        } => {
            if let Some(workspace) = workspace {
                config.workspace_root = workspace;
            }
            let orchestrator = Orchestrator::new(&config, Collaborators::local(&config))?;
            let inputs: Vec<TriggerInput> = platforms.iter().map(|p| source.trigger(p)).collect();

            let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
            let results = runtime.block_on(async {
                let (handle, stop) = StopSignal::channel();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        tracing::warn!("Interrupted, stopping runs");
                        handle.stop();
                    }
                });
                orchestrator.run_many(&inputs, &stop).await
            });

            for (input, result) in inputs.iter().zip(&results) {
                match result {
                    Ok(report) if json => println!("{}", serde_json::to_string_pretty(report)?),
                    Ok(report) => print!("{report}"),
                    Err(e) => eprintln!("{}: {e}", input.platform),
                }
            }
            Ok(exit_code(&results))
        }
        Command::Completions { .. } => Ok(ExitCode::SUCCESS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let args = Args::try_parse_from([
            "binarydist",
            "run",
            "package_linux64",
            "package_win64",
            "--branch",
            "release-0.6",
        ])
        .unwrap();
        let Command::Run { platforms, source, .. } = args.command else {
            panic!("expected run");
        };
        assert_eq!(platforms, vec!["package_linux64", "package_win64"]);
        let input = source.trigger("package_win64");
        assert_eq!(input.branch.as_deref(), Some("release-0.6"));
        assert!(input.repository.is_none());
    }

    #[test]
    fn test_run_requires_platform() {
        assert!(Args::try_parse_from(["binarydist", "run"]).is_err());
    }

    #[test]
    fn test_exit_code_mapping() {
        use binarydist::pipeline::PipelineError;

        let report = |status| RunReport {
            id: uuid::Uuid::new_v4(),
            platform: "package_linux64".into(),
            status,
            outcomes: Vec::new(),
            properties: std::collections::BTreeMap::new(),
            trigger: None,
        };
        assert_eq!(exit_code(&[Ok(report(RunStatus::Succeeded))]), ExitCode::SUCCESS);
        assert_eq!(
            exit_code(&[Ok(report(RunStatus::Succeeded)), Ok(report(RunStatus::FailedContinued))]),
            ExitCode::from(EXIT_WARNINGS)
        );
        assert_eq!(
            exit_code(&[
                Ok(report(RunStatus::FailedContinued)),
                Ok(report(RunStatus::FailedHalted))
            ]),
            ExitCode::FAILURE
        );
        assert_eq!(
            exit_code(&[Err(PipelineError::UnknownPlatform("x".into()))]),
            ExitCode::FAILURE
        );
    }
}
