//! shiplane CLI
//!
//! Entry point for the `shiplane` command-line tool.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use sha2::{Digest, Sha256};

use shiplane::action::process::ProcessActionRunner;
use shiplane::inventory::ReleaseInventory;
use shiplane::lane::{self, LaneExecutor};
use shiplane::plan::LanePlan;
use shiplane::settings::LaneEnv;
use shiplane::signal::SignalHandler;
use shiplane::summary::ExitCode;

#[derive(Parser)]
#[command(name = "shiplane")]
#[command(about = "Data-driven release lane runner for iOS apps", version)]
struct Cli {
    /// Enable debug diagnostics (overridden by RUST_LOG)
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a release lane
    Run {
        /// Lane name
        lane: String,

        /// App the lane belongs to (required when the name is ambiguous)
        #[arg(long)]
        app: Option<String>,

        /// Path to the inventory file (default: shiplane.toml)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Directory the exported bundle is written to (default: current directory)
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// External tool binary (overrides the [runner] table)
        #[arg(long)]
        tool: Option<String>,

        /// Print the plan without executing anything
        #[arg(long)]
        dry_run: bool,

        /// Print the plan or final summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// List configured lanes
    Lanes {
        /// Path to the inventory file (default: shiplane.toml)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Verify the inventory and the signing environment
    Verify {
        /// Path to the inventory file (default: shiplane.toml)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run {
            lane,
            app,
            config,
            output_dir,
            tool,
            dry_run,
            json,
        } => {
            run_lane(lane, app, config, output_dir, tool, dry_run, json);
        }
        Commands::Lanes { config, json } => {
            run_lanes(config, json);
        }
        Commands::Verify { config } => {
            run_verify(config);
        }
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;

    let default_filter = if verbose { "shiplane=debug,info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn load_inventory(config: Option<PathBuf>) -> (ReleaseInventory, PathBuf) {
    let path = config.unwrap_or_else(ReleaseInventory::default_path);
    match ReleaseInventory::load(&path) {
        Ok(inventory) => (inventory, path),
        Err(e) => {
            eprintln!("Configuration error: {e}");
            process::exit(ExitCode::Config.as_i32());
        }
    }
}

fn run_lane(
    lane_name: String,
    app: Option<String>,
    config: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    tool: Option<String>,
    dry_run: bool,
    json: bool,
) {
    let (inventory, config_path) = load_inventory(config);

    let selection = match inventory.select(app.as_deref(), &lane_name) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            process::exit(ExitCode::Config.as_i32());
        }
    };

    // All required variables are collected up front so one invocation
    // reports every missing name
    let env = match LaneEnv::from_env(selection.lane.upload) {
        Ok(env) => env,
        Err(e) => {
            eprintln!("Environment error: {e}");
            process::exit(ExitCode::Environment.as_i32());
        }
    };

    let mut runner_settings = inventory.runner.clone();
    if let Some(bin) = tool {
        runner_settings.bin = bin;
    }
    let tool_desc = if runner_settings.args.is_empty() {
        runner_settings.bin.clone()
    } else {
        format!("{} {}", runner_settings.bin, runner_settings.args.join(" "))
    };

    let output_dir = output_dir.unwrap_or_else(|| PathBuf::from("."));
    let run_id = lane::new_run_id();

    let plan = match LanePlan::build(&selection, &env, &output_dir, &run_id, &tool_desc) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Environment error: {e}");
            process::exit(ExitCode::Environment.as_i32());
        }
    };

    if dry_run {
        if json {
            match plan.to_json() {
                Ok(j) => println!("{j}"),
                Err(e) => {
                    eprintln!("Error serializing plan: {e}");
                    process::exit(ExitCode::Config.as_i32());
                }
            }
        } else {
            print!("{plan}");
        }
        process::exit(ExitCode::Success.as_i32());
    }

    let run_dir = match lane::prepare_run_dir(&lane::default_runs_root(), &run_id) {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("Failed to create run directory: {e}");
            process::exit(ExitCode::Environment.as_i32());
        }
    };
    eprintln!("Run directory: {}", run_dir.display());

    let signal_handler = SignalHandler::new();
    if let Err(e) = signal_handler.install() {
        eprintln!("Failed to install signal handler: {e}");
        process::exit(ExitCode::Environment.as_i32());
    }
    let cancel = signal_handler.state().cancel_flag();

    let runner = ProcessActionRunner::new(&runner_settings, &run_dir, Path::new("."))
        .with_cancel_flag(Arc::clone(&cancel));

    let config_digest = fs::read(&config_path)
        .ok()
        .map(|bytes| hex::encode(Sha256::digest(&bytes)));

    let executor = LaneExecutor::with_cancel_flag(&runner, cancel);
    let summary = match executor.execute(&plan, &run_dir, config_digest.as_deref()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Lane execution error: {e}");
            process::exit(ExitCode::Environment.as_i32());
        }
    };

    if json {
        match summary.to_json() {
            Ok(j) => println!("{j}"),
            Err(e) => {
                eprintln!("Error serializing summary: {e}");
                process::exit(ExitCode::Environment.as_i32());
            }
        }
    } else {
        println!("{}", summary.human_summary);
        if let Some(ref artifact) = summary.artifact {
            println!(
                "Artifact: {} (sha256 {}, {} bytes)",
                artifact.path.display(),
                artifact.sha256,
                artifact.size_bytes
            );
        }
        println!("Run artifacts: {}", run_dir.display());
    }

    process::exit(summary.exit_code);
}

fn run_lanes(config: Option<PathBuf>, json_output: bool) {
    let (inventory, _path) = load_inventory(config);

    if json_output {
        let output: Vec<serde_json::Value> = inventory
            .apps
            .iter()
            .flat_map(|app| {
                app.lanes.iter().map(move |lane| {
                    serde_json::json!({
                        "app": app.name,
                        "lane": lane.name,
                        "description": lane.description,
                        "variant": lane.variant,
                        "upload": lane.upload,
                        "run_tests": lane.run_tests,
                    })
                })
            })
            .collect();

        match serde_json::to_string_pretty(&output) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error serializing output: {e}");
                process::exit(ExitCode::Config.as_i32());
            }
        }
        return;
    }

    let total: usize = inventory.apps.iter().map(|a| a.lanes.len()).sum();
    if total == 0 {
        println!("No lanes configured.");
        return;
    }

    println!("Configured lanes ({total} total):\n");
    for app in &inventory.apps {
        for lane in &app.lanes {
            let mut notes = Vec::new();
            if !lane.upload {
                notes.push("no upload");
            }
            if lane.run_tests {
                notes.push("runs tests");
            }
            let notes = if notes.is_empty() {
                String::new()
            } else {
                format!(" ({})", notes.join(", "))
            };

            println!("  {}/{}", app.name, lane.name);
            println!("    {}", lane.description);
            println!("    Variant: {}{notes}", lane.variant);
            println!();
        }
    }
}

fn run_verify(config: Option<PathBuf>) {
    let (inventory, path) = load_inventory(config);

    println!("Inventory valid: {}", path.display());
    let variants: usize = inventory.apps.iter().map(|a| a.variants.len()).sum();
    let lanes: usize = inventory.apps.iter().map(|a| a.lanes.len()).sum();
    println!(
        "  Apps: {}, variants: {variants}, lanes: {lanes}",
        inventory.apps.len()
    );

    for app in &inventory.apps {
        for variant in app.unreferenced_variants() {
            println!(
                "  Warning: variant '{}/{}' is not referenced by any lane",
                app.name, variant.name
            );
        }
    }

    let needs_upload = inventory
        .apps
        .iter()
        .any(|a| a.lanes.iter().any(|l| l.upload));
    let env = match LaneEnv::from_env(needs_upload) {
        Ok(env) => env,
        Err(e) => {
            eprintln!("Environment error: {e}");
            process::exit(ExitCode::Environment.as_i32());
        }
    };

    let mut missing = Vec::new();
    for app in &inventory.apps {
        for variant in &app.variants {
            let certificate = env.certificate_path(&variant.certificate);
            if !certificate.exists() {
                missing.push(certificate);
            }
            let profile = env.profile_path(&variant.provisioning_profile);
            if !profile.exists() {
                missing.push(profile);
            }
        }
    }
    missing.sort();
    missing.dedup();

    if !missing.is_empty() {
        eprintln!("Missing signing files:");
        for file in &missing {
            eprintln!("  {}", file.display());
        }
        process::exit(ExitCode::Environment.as_i32());
    }

    println!("Signing environment OK");
}
