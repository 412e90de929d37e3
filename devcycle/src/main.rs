//! `devcycle` CLI.
//!
//! `devcycle run <goal>` drives the full plan/implement/review/test/ops cycle
//! and writes a transcript log. The role subcommands forward their arguments
//! to a single agent role.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use devcycle::core::classifier::MarkerClassifier;
use devcycle::core::types::Role;
use devcycle::cycle::{CycleAborted, CycleConfig, CycleOutcome, run_dev_cycle};
use devcycle::exit_codes;
use devcycle::io::config::{DEFAULT_CONFIG_PATH, DevCycleConfig, init_config, load_config};
use devcycle::io::invoker::CopilotInvoker;
use devcycle::logging;
use devcycle::passthrough::run_role;
use devcycle::step::{LaunchError, StepTimeoutError};
use tracing::debug;

#[derive(Parser)]
#[command(
    name = "devcycle",
    version,
    about = "Plan, implement, review, test and ship a goal through agent roles"
)]
struct Cli {
    /// Config file (missing file means defaults). Must precede the subcommand.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Raise diagnostic logging (-v info, -vv debug). `RUST_LOG` overrides.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the default config file if missing.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Run the full dev cycle for a goal.
    Run(RunArgs),
    /// Invoke the planner role.
    Plan(RoleArgs),
    /// Invoke the implementer role.
    Implement(RoleArgs),
    /// Invoke the reviewer role.
    Review(RoleArgs),
    /// Invoke the tester role.
    Test(RoleArgs),
    /// Invoke the ops role.
    Ops(RoleArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Goal text handed to every role.
    goal: String,

    /// Upper bound on review/test iterations.
    #[arg(long)]
    max_iterations: Option<u32>,

    /// Transcript log path (truncated at start).
    #[arg(long)]
    log: Option<PathBuf>,

    /// Per-step timeout in seconds.
    #[arg(long)]
    step_timeout_secs: Option<u64>,

    /// Exit with a distinct code when review/test never both passed.
    #[arg(long)]
    strict: bool,

    /// Also write the run outcome as JSON.
    #[arg(long)]
    json_summary: Option<PathBuf>,
}

#[derive(Args)]
struct RoleArgs {
    /// Arguments forwarded verbatim to the role, flags included. Put
    /// `--config` and `-v` before the subcommand.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {:#}", err);
            std::process::exit(exit_code_for(&err));
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Run(args) => cmd_run(&cli.config, args),
        Command::Plan(args) => cmd_role(&cli.config, Role::Planner, &args.args),
        Command::Implement(args) => cmd_role(&cli.config, Role::Implementer, &args.args),
        Command::Review(args) => cmd_role(&cli.config, Role::Reviewer, &args.args),
        Command::Test(args) => cmd_role(&cli.config, Role::Tester, &args.args),
        Command::Ops(args) => cmd_role(&cli.config, Role::Ops, &args.args),
    }
}

fn cmd_init(config_path: &Path, force: bool) -> Result<i32> {
    if init_config(config_path, force)? {
        println!("init: wrote {}", config_path.display());
    } else {
        println!(
            "init: {} exists (use --force to overwrite)",
            config_path.display()
        );
    }
    Ok(exit_codes::OK)
}

fn cmd_role(config_path: &Path, role: Role, args: &[String]) -> Result<i32> {
    let cfg = load_config(config_path)?;
    run_role(&cfg, role, args)
}

fn cmd_run(config_path: &Path, args: RunArgs) -> Result<i32> {
    if args.goal.trim().is_empty() {
        bail!("goal must not be empty");
    }
    let cfg = apply_overrides(load_config(config_path)?, &args)?;
    debug!(?cfg, "resolved config");

    let invoker = CopilotInvoker::new(cfg.agent.clone());
    let classifier = MarkerClassifier::new(cfg.pass_markers.iter().cloned());
    let cycle_config = CycleConfig::from(&cfg);

    let outcome = run_dev_cycle(
        &args.goal,
        &invoker,
        &classifier,
        &cycle_config,
        |record, verdict| match verdict {
            Some(verdict) => println!(
                "step: [{}] {} exit={} verdict={}",
                record.index,
                record.name,
                display_exit(record.exit_code),
                verdict
            ),
            None => println!(
                "step: [{}] {} exit={}",
                record.index,
                record.name,
                display_exit(record.exit_code)
            ),
        },
    )?;

    println!(
        "cycle: {} steps={} log={}",
        outcome.stop,
        outcome.transcript.len(),
        cycle_config.log_path.display()
    );
    if let Some(path) = &args.json_summary {
        write_summary(path, &outcome)?;
    }

    if args.strict && !outcome.stop.converged() {
        return Ok(exit_codes::NOT_CONVERGED);
    }
    Ok(exit_codes::OK)
}

fn apply_overrides(mut cfg: DevCycleConfig, args: &RunArgs) -> Result<DevCycleConfig> {
    if let Some(max) = args.max_iterations {
        cfg.max_iterations = max;
    }
    if let Some(log) = &args.log {
        cfg.log_path = log.clone();
    }
    if let Some(secs) = args.step_timeout_secs {
        cfg.step_timeout_secs = secs;
    }
    cfg.validate().context("invalid command-line overrides")?;
    Ok(cfg)
}

fn display_exit(code: Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |code| code.to_string())
}

/// Serialize the outcome to pretty-printed JSON with trailing newline.
fn write_summary(path: &Path, outcome: &CycleOutcome) -> Result<()> {
    let mut payload = serde_json::to_string_pretty(outcome).context("serialize summary")?;
    payload.push('\n');
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(path, payload).with_context(|| format!("write {}", path.display()))
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let cause = err
        .downcast_ref::<CycleAborted>()
        .map_or(err, |aborted| &aborted.error);
    if cause.downcast_ref::<LaunchError>().is_some() {
        exit_codes::LAUNCH_FAILED
    } else if cause.downcast_ref::<StepTimeoutError>().is_some() {
        exit_codes::TIMED_OUT
    } else {
        exit_codes::INVALID
    }
}
