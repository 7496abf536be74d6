//! Command-line front-end (spec §6): `run`/`list`/`status`/`init`. Grounded
//! on `vwf_cli::main`'s `Cli`/`Cmd` shape and its
//! `tracing_subscriber::fmt().with_env_filter(...)` startup, generalized to
//! drive `bioflow_core::Engine` instead of `vwf_core::Runner` and to exit
//! with the status-specific codes the loop framework doesn't have a notion
//! of.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use bioflow_core::{Engine, EngineError, RunOptions, StepOverride, TimeLimitPolicy};
use bioflow_runtime::{ContainerDriver, MockContainerDriver, ProcessContainerDriver};
use bioflow_store::{SqliteStateRepository, StateRepository};
use bioflow_types::Status;
use clap::{Parser, Subcommand};
use indexmap::IndexMap;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "bioflow", version, about = "BioinfoFlow workflow engine CLI")]
struct Cli {
    /// Directory that holds the state database and run directories.
    #[arg(long, global = true, default_value = "./bioflow-data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Run a workflow definition.
    Run {
        /// Path to the workflow YAML document.
        workflow: PathBuf,
        /// Input override: `--input key=value`, repeatable.
        #[arg(long = "input", value_parser = parse_key_val, num_args = 0..)]
        input: Vec<(String, String)>,
        /// Maximum number of concurrently running steps.
        #[arg(long, default_value_t = 4)]
        parallel: usize,
        /// Default wall-clock time limit applied to steps without one (e.g. `30m`).
        #[arg(long)]
        default_time_limit: Option<String>,
        /// Disable the default time limit entirely; only explicit `time_limit`s apply.
        #[arg(long)]
        disable_time_limits: bool,
        /// Directory the run tree is written under (overrides `--data-dir`'s default).
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Use the in-memory mock container driver instead of a real daemon.
        #[arg(long)]
        dry_run: bool,
    },
    /// List recorded runs.
    List {
        /// Restrict to runs of this workflow name.
        #[arg(long)]
        workflow: Option<String>,
        /// Maximum number of runs to print, most recent first.
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Print a run's status and per-step state.
    Status {
        run_id: String,
    },
    /// Resume a prior run, re-scheduling everything but its completed steps.
    Resume {
        run_id: String,
        #[arg(long)]
        dry_run: bool,
        /// Per-step override: `--override step=key=value`, repeatable.
        /// `key` is one of `command`, `cpu`, `memory`, `time_limit`.
        #[arg(long = "override", value_parser = parse_override, num_args = 0..)]
        r#override: Vec<(String, String, String)>,
    },
    /// Write a template workflow document.
    Init {
        name: String,
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    let (k, v) = s.split_once('=').ok_or("expected key=value")?;
    Ok((k.to_string(), v.to_string()))
}

fn parse_override(s: &str) -> std::result::Result<(String, String, String), String> {
    let (step, rest) = s.split_once('=').ok_or("expected step=key=value")?;
    let (key, value) = rest.split_once('=').ok_or("expected step=key=value")?;
    Ok((step.to_string(), key.to_string(), value.to_string()))
}

/// Folds `--override step=key=value` triples into one [`StepOverride`] per
/// step (spec §4.3 resume).
fn build_overrides(
    entries: &[(String, String, String)],
) -> Result<std::collections::HashMap<String, StepOverride>> {
    let mut overrides: std::collections::HashMap<String, StepOverride> = std::collections::HashMap::new();
    for (step, key, value) in entries {
        let entry = overrides.entry(step.clone()).or_default();
        match key.as_str() {
            "command" => entry.command = Some(value.clone()),
            "cpu" => {
                entry.cpu = Some(
                    value
                        .parse()
                        .with_context(|| format!("override `{step}.cpu` is not an integer: {value}"))?,
                )
            }
            "memory" => entry.memory = Some(value.clone()),
            "time_limit" => entry.time_limit = Some(value.clone()),
            other => anyhow::bail!("unknown override key `{other}` for step `{step}`"),
        }
    }
    Ok(overrides)
}

fn template(name: &str) -> String {
    format!(
        "name: {name}\nversion: \"1\"\ndescription: \"\"\nconfig: {{}}\ninputs: {{}}\nsteps:\n  first:\n    container: alpine:3\n    command: \"echo hello\"\n    resources:\n      cpu: 1\n      memory: 512m\n      time_limit: 10m\n"
    )
}

async fn build_engine(cli: &Cli, dry_run: bool) -> Result<Engine> {
    std::fs::create_dir_all(&cli.data_dir)
        .with_context(|| format!("create {}", cli.data_dir.display()))?;
    let db_path = cli.data_dir.join("state.sqlite3");
    let pool = bioflow_store::open(&db_path.to_string_lossy()).await?;
    let store: Arc<dyn StateRepository> = Arc::new(SqliteStateRepository::new(pool));
    let driver: Arc<dyn ContainerDriver> = if dry_run {
        Arc::new(MockContainerDriver::new())
    } else {
        Arc::new(ProcessContainerDriver::default())
    };
    Ok(Engine::new(cli.data_dir.join("runs-base"), store, driver))
}

fn exit_code_for_status(status: Status) -> u8 {
    match status {
        Status::Completed | Status::Skipped => 0,
        _ => 1,
    }
}

fn exit_for_status(status: Status) -> ExitCode {
    ExitCode::from(exit_code_for_status(status))
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let cli = Cli::parse();

    match &cli.cmd {
        Cmd::Init { name, output } => {
            let doc = template(name);
            match output {
                Some(path) => {
                    std::fs::write(path, doc).with_context(|| format!("write {}", path.display()))?;
                    println!("wrote {}", path.display());
                }
                None => print!("{doc}"),
            }
            Ok(ExitCode::from(0))
        }
        Cmd::Run {
            workflow,
            input,
            parallel,
            default_time_limit,
            disable_time_limits,
            output_dir,
            dry_run,
        } => {
            let engine = Arc::new(build_engine(&cli, *dry_run).await?);

            let time_limit_policy = if *disable_time_limits {
                TimeLimitPolicy::Disabled
            } else if let Some(d) = default_time_limit {
                let secs = bioflow_config::duration::parse_duration_secs(d)?;
                TimeLimitPolicy::Default(std::time::Duration::from_secs(secs))
            } else {
                TimeLimitPolicy::default()
            };

            let mut inputs = IndexMap::new();
            for (k, v) in input {
                inputs.insert(k.clone(), v.clone());
            }

            let opts = RunOptions {
                inputs,
                parallel: *parallel,
                time_limit_policy,
                output_dir: output_dir.clone(),
            };
            let cwd = std::env::current_dir()?;

            let engine_for_signal = engine.clone();
            let run_fut = engine.run(workflow, &cwd, opts);
            tokio::pin!(run_fut);

            tokio::select! {
                result = &mut run_fut => {
                    match result {
                        Ok(outcome) => {
                            println!("{}", serde_json::to_string_pretty(&to_json(&outcome))?);
                            Ok(exit_for_status(outcome.status))
                        }
                        Err(EngineError::InvalidWorkflow(e)) => {
                            eprintln!("invalid workflow: {e}");
                            Ok(ExitCode::from(2))
                        }
                        Err(EngineError::Parse(e)) => {
                            eprintln!("invalid workflow: {e}");
                            Ok(ExitCode::from(2))
                        }
                        Err(e) => {
                            eprintln!("run failed: {e}");
                            Ok(ExitCode::from(1))
                        }
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    eprintln!("interrupted, cancelling run");
                    engine_for_signal.cancel_all();
                    Ok(ExitCode::from(130))
                }
            }
        }
        Cmd::Resume { run_id, dry_run, r#override } => {
            let engine = build_engine(&cli, *dry_run).await?;
            let overrides = build_overrides(r#override)?;
            match engine.resume(run_id, overrides).await {
                Ok(outcome) => {
                    println!("{}", serde_json::to_string_pretty(&to_json(&outcome))?);
                    Ok(exit_for_status(outcome.status))
                }
                Err(e) => {
                    eprintln!("resume failed: {e}");
                    Ok(ExitCode::from(1))
                }
            }
        }
        Cmd::List { workflow, limit } => {
            let engine = build_engine(&cli, false).await?;
            let mut runs = engine.list(None).await?;
            if let Some(name) = workflow {
                runs.retain(|r| &r.workflow_name == name);
            }
            runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            runs.truncate(*limit);
            for r in runs {
                println!(
                    "{}\t{}\t{}/{}\t{}",
                    r.id, r.status, r.workflow_name, r.workflow_version, r.created_at
                );
            }
            Ok(ExitCode::from(0))
        }
        Cmd::Status { run_id } => {
            let engine = build_engine(&cli, false).await?;
            match engine.status(run_id).await? {
                Some(status) => {
                    println!("{}", serde_json::to_string_pretty(&status)?);
                    Ok(ExitCode::from(0))
                }
                None => {
                    eprintln!("no such run: {run_id}");
                    Ok(ExitCode::from(1))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_key_val() {
        assert_eq!(
            parse_key_val("reads=*.fastq").unwrap(),
            ("reads".to_string(), "*.fastq".to_string())
        );
        assert!(parse_key_val("no-equals-sign").is_err());
    }

    #[test]
    fn template_embeds_the_given_name() {
        let doc = template("align-reads");
        assert!(doc.contains("name: align-reads"));
        let parsed: bioflow_config::WorkflowDocument = serde_yaml::from_str(&doc).unwrap();
        assert_eq!(parsed.name, "align-reads");
    }

    #[test]
    fn parses_override_triple() {
        assert_eq!(
            parse_override("align=command=echo hi").unwrap(),
            ("align".to_string(), "command".to_string(), "echo hi".to_string())
        );
        assert!(parse_override("align").is_err());
        assert!(parse_override("align=command").is_err());
    }

    #[test]
    fn build_overrides_merges_keys_for_the_same_step() {
        let entries = vec![
            ("align".to_string(), "cpu".to_string(), "8".to_string()),
            ("align".to_string(), "memory".to_string(), "4g".to_string()),
        ];
        let overrides = build_overrides(&entries).unwrap();
        let over = &overrides["align"];
        assert_eq!(over.cpu, Some(8));
        assert_eq!(over.memory, Some("4g".to_string()));
        assert_eq!(over.command, None);
    }

    #[test]
    fn build_overrides_rejects_unknown_key() {
        let entries = vec![("align".to_string(), "bogus".to_string(), "x".to_string())];
        assert!(build_overrides(&entries).is_err());
    }

    #[test]
    fn exit_codes_match_terminal_status() {
        assert_eq!(exit_code_for_status(Status::Completed), 0);
        assert_eq!(exit_code_for_status(Status::Skipped), 0);
        assert_eq!(exit_code_for_status(Status::Failed), 1);
        assert_eq!(exit_code_for_status(Status::Error), 1);
    }
}

fn to_json(outcome: &bioflow_core::EngineRunOutcome) -> serde_json::Value {
    serde_json::json!({
        "run_id": outcome.run_id,
        "status": outcome.status.to_string(),
        "steps": outcome.steps.iter().map(|(name, s)| {
            (name.clone(), serde_json::json!({
                "status": s.status.to_string(),
                "start_time": s.start_time,
                "end_time": s.end_time,
                "exit_code": s.exit_code,
                "error": s.error,
                "log_path": s.log_path,
                "produced_files": s.produced_files,
            }))
        }).collect::<std::collections::HashMap<_, _>>(),
    })
}
