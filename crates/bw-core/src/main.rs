//! Bulwark Core - macOS hardening orchestrator
//!
//! The main entry point for bw-core, handling:
//! - Preflight-gated dispatch of hardening scripts and baseline actions
//! - Standalone preflight and doctor diagnostics
//! - Rollback point management (list, restore, cleanup)

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use bw_common::error::format_error_human;
use bw_common::{Error, OutputFormat, RollbackId};
use bw_config::{ConfigResolver, HardeningConfig};
use bw_core::baseline::run_baseline_action;
use bw_core::doctor::run_doctor;
use bw_core::exit_codes::ExitCode;
use bw_core::gate::{
    maybe_run_preflight, BaselineAction, GateDecision, GateOverrides, HardenComponent, Operation,
};
use bw_core::logging::{generate_run_id, init_logging, LogConfig};
use bw_core::preflight::{format_preflight_report, Evaluator, PreflightOptions, PreflightSummary};
use bw_core::probe::Prober;
use bw_core::rollback::RollbackManager;
use bw_core::script::{
    capture_tracked_settings, run_fetch_script, run_hardening_script, FetchTask, ScriptOutcome,
};
use tracing::info;

/// Bulwark Core - preflight-gated macOS hardening with rollback journal
#[derive(Parser)]
#[command(name = "bw-core")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Path to config.yaml
    #[arg(long, global = true, env = "BW_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "text")]
    format: OutputFormat,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease verbosity (errors only)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Forward --dry-run to scripts; never mutate
    #[arg(long, global = true)]
    dry_run: bool,

    /// Override the configured minimum macOS version (e.g., 26.3)
    #[arg(long, global = true)]
    min_macos_version: Option<String>,

    /// Fail gated commands when below the minimum macOS version
    #[arg(long, global = true)]
    enforce_min_version: bool,
}

impl GlobalOpts {
    fn gate_overrides(&self) -> GateOverrides {
        GateOverrides {
            min_macos_version: self.min_macos_version.clone(),
            enforce_min_version: self.enforce_min_version.then_some(true),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run a hardening script (gated: requires elevation)
    Harden(HardenArgs),

    /// Fetch advisories or update listings (read-only, never gated)
    Fetch(FetchArgs),

    /// Run a baseline rule-engine action (gated: requires rules)
    Baseline(BaselineArgs),

    /// Run environment/dependency checks
    Preflight(PreflightArgs),

    /// Run consolidated diagnostics (config schema, deps, scripts, policy)
    Doctor,

    /// Manage rollback points
    Rollback(RollbackArgs),

    /// Print version information
    Version,
}

#[derive(Args, Debug)]
struct HardenArgs {
    /// Hardening component to run
    #[arg(value_enum)]
    component: HardenComponent,

    /// Extra arguments forwarded to the script
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    script_args: Vec<String>,
}

#[derive(Args, Debug)]
struct FetchArgs {
    /// Fetch task to run
    #[arg(value_enum)]
    task: FetchTask,
}

#[derive(Args, Debug)]
struct BaselineArgs {
    /// Rule-engine action
    #[arg(value_enum)]
    action: BaselineAction,

    /// Keyword tag selecting the rule set
    #[arg(short, long)]
    keyword: String,
}

#[derive(Args, Debug)]
struct PreflightArgs {
    /// Treat sudo/root as required
    #[arg(long)]
    require_sudo: bool,

    /// Require local rule YAML files
    #[arg(long)]
    require_rules: bool,
}

#[derive(Args, Debug)]
struct RollbackArgs {
    #[command(subcommand)]
    command: RollbackCommands,
}

#[derive(Subcommand, Debug)]
enum RollbackCommands {
    /// List available rollback points, newest first
    List,

    /// Restore a rollback point (entries replay in reverse capture order)
    Restore {
        /// Rollback point id
        rollback_id: String,
    },

    /// Remove old rollback points, keeping the N most recent
    Cleanup {
        /// How many points to keep (default from config)
        #[arg(long)]
        keep: Option<usize>,
    },
}

fn main() {
    let cli = Cli::parse();

    init_logging(&LogConfig::from_env(cli.global.verbose, cli.global.quiet));
    let run_id = generate_run_id();
    info!(run_id = %run_id, "bw-core starting");

    let use_color = !cli.global.no_color;
    let config = match ConfigResolver::new(cli.global.config.clone()).load() {
        Ok((config, source)) => {
            info!(
                source = %source.resolution,
                path = source.path.as_deref().unwrap_or("<defaults>"),
                "configuration loaded"
            );
            config
        }
        Err(e) => {
            eprintln!("{}", format_error_human(&e, use_color));
            ExitCode::ConfigError.exit();
        }
    };

    let prober = Prober::with_defaults();
    let code = match cli.command {
        Commands::Harden(args) => cmd_harden(&prober, &config, &cli.global, &args),
        Commands::Fetch(args) => cmd_fetch(&prober, &config, &cli.global, &args),
        Commands::Baseline(args) => cmd_baseline(&prober, &config, &cli.global, &args),
        Commands::Preflight(args) => cmd_preflight(&prober, &config, &cli.global, &args),
        Commands::Doctor => cmd_doctor(&prober, &config, &cli.global),
        Commands::Rollback(args) => cmd_rollback(&prober, &config, &cli.global, &args),
        Commands::Version => {
            println!("bw-core {}", env!("CARGO_PKG_VERSION"));
            ExitCode::Clean
        }
    };
    code.exit();
}

/// Run the gate for a mutating operation. Returns None when the command
/// may proceed; Some(exit) when it must stop here.
fn gate_or_abort(
    prober: &Prober,
    config: &HardeningConfig,
    global: &GlobalOpts,
    operation: Operation,
) -> Option<ExitCode> {
    let decision = maybe_run_preflight(prober, operation, config, &global.gate_overrides());
    match decision {
        GateDecision::Skipped => None,
        GateDecision::Passed(summary) => {
            // Operators see the full report even on pass.
            if !global.format.is_json() {
                println!("{}", format_preflight_report(&summary));
            }
            None
        }
        GateDecision::Blocked(summary) => {
            if global.format.is_json() {
                print_json(&serde_json::json!({
                    "command": "preflight_gate",
                    "success": false,
                    "error": "Aborting because preflight failed required checks.",
                    "summary": summary,
                }));
            } else {
                println!("{}", format_preflight_report(&summary));
                eprintln!("Aborting because preflight failed required checks.");
            }
            Some(ExitCode::Failed)
        }
    }
}

fn cmd_harden(
    prober: &Prober,
    config: &HardeningConfig,
    global: &GlobalOpts,
    args: &HardenArgs,
) -> ExitCode {
    if let Some(code) = gate_or_abort(
        prober,
        config,
        global,
        Operation::Harden(args.component),
    ) {
        return code;
    }

    // Snapshot before mutation. Dry runs mutate nothing, so they get no
    // rollback point either.
    if !global.dry_run {
        let manager = RollbackManager::new(&config.rollback, prober);
        match manager.create_rollback_point(
            args.component.name(),
            &format!("Before {} hardening", args.component.name()),
        ) {
            Ok(id) if !id.is_disabled() => {
                let captured = capture_tracked_settings(&manager, &id, args.component);
                if !global.format.is_json() {
                    println!(
                        "Created rollback point {} ({} setting(s) captured)",
                        id, captured
                    );
                }
            }
            Ok(_) => {}
            Err(e) => {
                // Cannot even create the backup root: that is the one
                // rollback failure that stops a hardening run.
                eprintln!(
                    "{}",
                    format_error_human(
                        &Error::BackupStoreUnavailable(e.to_string()),
                        !global.no_color
                    )
                );
                return ExitCode::Failed;
            }
        }
    }

    match run_hardening_script(
        prober,
        &config.scripts,
        args.component,
        &args.script_args,
        global.dry_run,
    ) {
        Ok(outcome) => report_script_outcome(global, &outcome),
        Err(e) => {
            eprintln!("{}", format_error_human(&e, !global.no_color));
            ExitCode::Failed
        }
    }
}

fn cmd_fetch(
    prober: &Prober,
    config: &HardeningConfig,
    global: &GlobalOpts,
    args: &FetchArgs,
) -> ExitCode {
    match run_fetch_script(prober, &config.scripts, args.task) {
        Ok(outcome) => report_script_outcome(global, &outcome),
        Err(e) => {
            eprintln!("{}", format_error_human(&e, !global.no_color));
            ExitCode::Failed
        }
    }
}

fn cmd_baseline(
    prober: &Prober,
    config: &HardeningConfig,
    global: &GlobalOpts,
    args: &BaselineArgs,
) -> ExitCode {
    if let Some(code) = gate_or_abort(
        prober,
        config,
        global,
        Operation::Baseline(args.action),
    ) {
        return code;
    }

    match run_baseline_action(
        prober,
        &config.scripts,
        args.action,
        &args.keyword,
        global.dry_run,
    ) {
        Ok(outcome) => report_script_outcome(global, &outcome),
        Err(e) => {
            eprintln!("{}", format_error_human(&e, !global.no_color));
            ExitCode::Failed
        }
    }
}

fn cmd_preflight(
    prober: &Prober,
    config: &HardeningConfig,
    global: &GlobalOpts,
    args: &PreflightArgs,
) -> ExitCode {
    let mut opts = PreflightOptions::from_config(config, args.require_sudo, args.require_rules);
    if let Some(ref min) = global.min_macos_version {
        opts.min_macos_version = min.clone();
    }
    if global.enforce_min_version {
        opts.enforce_min_version = true;
    }

    let summary = Evaluator::new(prober).run(&opts);
    print_preflight(global, &summary);

    if summary.passed {
        ExitCode::Clean
    } else {
        ExitCode::Failed
    }
}

fn cmd_doctor(prober: &Prober, config: &HardeningConfig, global: &GlobalOpts) -> ExitCode {
    let report = run_doctor(prober, config);
    if global.format.is_json() {
        println!("{}", report.to_json());
    } else {
        println!("{}", report.format_text());
    }
    if report.success() {
        ExitCode::Clean
    } else {
        ExitCode::Failed
    }
}

fn cmd_rollback(
    prober: &Prober,
    config: &HardeningConfig,
    global: &GlobalOpts,
    args: &RollbackArgs,
) -> ExitCode {
    let manager = RollbackManager::new(&config.rollback, prober);

    match &args.command {
        RollbackCommands::List => {
            let points = manager.list_rollback_points();
            if global.format.is_json() {
                print_json(&serde_json::json!({
                    "command": "rollback_list",
                    "points": points,
                }));
            } else if points.is_empty() {
                println!("No rollback points found.");
            } else {
                println!("Available Rollback Points:");
                println!("{}", "=".repeat(50));
                for point in &points {
                    println!("ID: {}", point.rollback_id);
                    println!("Component: {}", point.component);
                    println!("Description: {}", point.description);
                    println!("Created: {}", point.created_at);
                    println!("Backups: {}", point.backups.len());
                    println!("{}", "-".repeat(30));
                }
            }
            ExitCode::Clean
        }

        RollbackCommands::Restore { rollback_id } => {
            let Some(id) = RollbackId::parse(rollback_id) else {
                eprintln!("Invalid rollback id: {}", rollback_id);
                return ExitCode::Failed;
            };
            match manager.restore(&id, global.dry_run) {
                Ok(report) => {
                    if global.format.is_json() {
                        print_json(&serde_json::json!({
                            "command": "rollback_restore",
                            "success": report.success(),
                            "report": report,
                        }));
                    } else {
                        println!("{}", report.format_text());
                    }
                    if report.success() {
                        ExitCode::Clean
                    } else {
                        ExitCode::Failed
                    }
                }
                Err(e) => {
                    if e.kind() == bw_common::ErrorKind::NotFound {
                        eprintln!(
                            "{}",
                            format_error_human(
                                &Error::RollbackPointNotFound {
                                    rollback_id: rollback_id.clone()
                                },
                                !global.no_color
                            )
                        );
                    } else {
                        eprintln!("Restore failed: {}", e);
                    }
                    ExitCode::Failed
                }
            }
        }

        RollbackCommands::Cleanup { keep } => {
            let keep_count = keep.unwrap_or(config.rollback.keep_count);
            let removed = manager.cleanup_old_rollback_points(keep_count);
            if global.format.is_json() {
                print_json(&serde_json::json!({
                    "command": "rollback_cleanup",
                    "kept": keep_count,
                    "removed": removed,
                }));
            } else {
                println!("Removed {} old rollback points.", removed);
            }
            ExitCode::Clean
        }
    }
}

fn print_preflight(global: &GlobalOpts, summary: &PreflightSummary) {
    if global.format.is_json() {
        println!("{}", summary.to_json());
    } else {
        println!("{}", format_preflight_report(summary));
    }
}

fn report_script_outcome(global: &GlobalOpts, outcome: &ScriptOutcome) -> ExitCode {
    if global.format.is_json() {
        print_json(&serde_json::json!({
            "command": "script",
            "script": outcome.script,
            "args": outcome.args,
            "success": outcome.success,
            "returncode": outcome.returncode,
            "stdout": outcome.stdout,
            "stderr": outcome.stderr,
        }));
    } else if outcome.success {
        if !outcome.stdout.is_empty() {
            println!("{}", outcome.stdout);
        }
    } else {
        eprintln!("Error running {}:\n{}", outcome.script, outcome.details());
    }

    if outcome.success {
        ExitCode::Clean
    } else {
        ExitCode::Failed
    }
}

fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
    );
}
