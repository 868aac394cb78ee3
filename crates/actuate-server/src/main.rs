//! Actuate: agent action dispatcher.
//!
//! Reads one batch of actions per stdin line, dispatches it through the
//! configured connectors and prints each outcome as a JSON line.

use std::path::PathBuf;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use actuate_core::RuntimeConfig;
use actuate_plugins::{load_actions, load_backgrounds, PluginContext};
use actuate_runtime::{ActionOrchestrator, BackgroundOrchestrator};

mod cycle;

fn resolve_config_path(arg: Option<&String>) -> PathBuf {
    arg.map(PathBuf::from)
        .or_else(|| std::env::var("ACTUATE_CONFIG").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("actuate.json"))
}

fn print_usage() {
    println!("Actuate, agent action dispatcher");
    println!();
    println!("Usage: actuate [command] [config]");
    println!();
    println!("Commands:");
    println!("  run [config]        Dispatch action batches read from stdin (default)");
    println!("  validate [config]   Check a configuration file and exit");
    println!("  help                Show this help message");
    println!();
    println!("The config path defaults to $ACTUATE_CONFIG, then ./actuate.json.");
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1).map(String::as_str) {
        Some("--help" | "-h" | "help") => {
            print_usage();
            return Ok(());
        }
        Some("--validate" | "validate") => {
            let path = resolve_config_path(args.get(2));
            match RuntimeConfig::load(&path) {
                Ok(config) => {
                    println!(
                        "{}: ok ({} actions, {} backgrounds, mode {})",
                        path.display(),
                        config.agent_actions.len(),
                        config.backgrounds.len(),
                        config.action_execution_mode
                    );
                    return Ok(());
                }
                Err(e) => {
                    eprintln!("{}: {}", path.display(), e);
                    std::process::exit(1);
                }
            }
        }
        Some("run") => resolve_config_path(args.get(2)),
        Some(other) if other.starts_with('-') => {
            eprintln!("Unknown command: {}. Use 'actuate help' for usage.", other);
            std::process::exit(1);
        }
        _ => resolve_config_path(args.get(1)),
    };

    info!("Config: {}", config_path.display());
    let config = RuntimeConfig::load(&config_path)
        .map_err(|e| anyhow::anyhow!("Failed to load {}: {}", config_path.display(), e))?;

    let ctx = PluginContext::new();
    let registry = load_actions(&config, &ctx)?;
    let backgrounds = load_backgrounds(&config, &ctx)?;

    let mut actions = ActionOrchestrator::new(&config, registry)?;
    let mut background = BackgroundOrchestrator::new(&config, backgrounds)?;
    actions.start();
    background.start();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = &mut interrupt => {
                info!("Interrupted");
                None
            }
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let batch = match cycle::parse_batch(&line) {
            Ok(batch) => batch,
            Err(e) => {
                warn!("Skipping malformed batch: {}", e);
                continue;
            }
        };

        let Some(outcomes) = cycle::run_cycle_until(&mut actions, batch, &mut interrupt).await else {
            warn!(
                "Interrupted during cycle {}, abandoning its outstanding actions",
                actions.cycle()
            );
            break;
        };
        for outcome in outcomes {
            println!("{}", serde_json::to_string(&outcome)?);
        }
    }

    info!("Shutting down");
    actions.stop();
    background.stop();
    info!(
        "Stopped after {} cycles, odometry updates: {}",
        actions.cycle(),
        ctx.odom_store.updates()
    );

    Ok(())
}
