use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use cuelight_core::{ConfigManager, LightingEngine, ShowLibrary, ShowStore, WledTransport};
use cuelight_devices::DeviceId;

/// Cue playback for WLED fixtures.
#[derive(Parser, Debug)]
#[command(name = "cuelight")]
#[command(about = "Run lighting cues on WLED devices")]
struct Args {
    /// Settings file (defaults to the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Show file with devices, cues and presets
    #[arg(long)]
    show: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute a cue and wait for it to finish. Ctrl-C stops it.
    Run { cue_id: u32 },
    /// Probe every device and print its connection status
    Status,
    /// Apply a preset to one or more devices
    Preset {
        preset_id: u32,
        #[arg(required = true)]
        device_ids: Vec<DeviceId>,
    },
    /// List the cues in the show
    Cues,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut config = ConfigManager::new(args.config);
    let settings = config
        .load()
        .with_context(|| format!("failed to load {}", config.config_path().display()))?;

    let library = Arc::new(ShowLibrary::load(&args.show)?);
    let transport = Arc::new(WledTransport::from_settings(&settings));
    transport.register_devices(&library.devices().await?);

    let engine = LightingEngine::new(library.clone(), transport, &settings);

    match args.command {
        Command::Run { cue_id } => run_cue(&engine, cue_id).await?,
        Command::Status => {
            for status in engine.get_all_connection_statuses().await {
                println!(
                    "device {:>4}  {:<12}  errors: {}",
                    status.device_id,
                    if status.is_connected {
                        "connected"
                    } else {
                        "disconnected"
                    },
                    status.error_count
                );
            }
        }
        Command::Preset {
            preset_id,
            device_ids,
        } => {
            for result in engine.apply_preset_to_devices(preset_id, &device_ids).await? {
                match result.error {
                    None => println!("device {:>4}  ok", result.device_id),
                    Some(error) => println!("device {:>4}  failed: {}", result.device_id, error),
                }
            }
        }
        Command::Cues => {
            let show = library.show();
            println!("{} ({} cues)", show.name, show.cues.len());
            for cue in &show.cues {
                println!(
                    "{:>4}  {:<32} {} step(s), {:.1}s",
                    cue.id,
                    cue.name,
                    cue.steps.len(),
                    cue.total_duration().as_secs_f64()
                );
            }
        }
    }

    Ok(())
}

async fn run_cue(engine: &LightingEngine, cue_id: u32) -> Result<(), anyhow::Error> {
    engine.initialize();
    engine.execute_cue(cue_id).await?;

    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("Could not listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };
    if wait_until_idle(engine, interrupt).await {
        log::info!("Interrupted, stopping cue {}", cue_id);
    } else {
        log::info!("Cue {} finished", cue_id);
    }

    engine.shutdown();
    Ok(())
}

/// Poll until the engine goes idle. Returns `true` if `interrupt` fired first.
async fn wait_until_idle<F>(engine: &LightingEngine, interrupt: F) -> bool
where
    F: Future<Output = ()>,
{
    tokio::pin!(interrupt);
    let mut poll = tokio::time::interval(Duration::from_millis(250));
    loop {
        tokio::select! {
            _ = poll.tick() => {
                if !engine.is_executing() {
                    return false;
                }
            }
            _ = &mut interrupt => return true,
        }
    }
}
