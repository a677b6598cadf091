//! koe - chord extraction service and CLI
//!
//! Subcommands:
//! - `koe serve` - Run the HTTP service
//! - `koe analyze <file>` - Extract chords from a local file and print JSON
//! - `koe config` - Print the effective configuration

use std::path::PathBuf;

use anyhow::{Context, Result};
use chord_analysis::{Cancellation, TrackSelection};
use clap::{Parser, Subcommand};
use koe::{telemetry, ChordService};
use koe_conf::KoeConfig;

#[derive(Parser)]
#[command(name = "koe")]
#[command(about = "Chord extraction and MIDI track generation")]
#[command(version)]
struct Cli {
    /// Config file, read in place of ./koe.toml
    #[arg(short, long, global = true, env = "KOE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service
    Serve {
        /// HTTP port to bind (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind (overrides config)
        #[arg(long)]
        host: Option<String>,
    },

    /// Extract chords from a local audio file
    Analyze {
        /// Audio file (WAV, MP3, FLAC, OGG, ...)
        file: PathBuf,

        /// Tracks to generate, comma-separated (chords,bass,melody)
        #[arg(short, long)]
        tracks: Option<TrackSelection>,

        /// Write the MIDI file here
        #[arg(short, long)]
        midi: Option<PathBuf>,

        /// Print the chord progression only, without note tracks
        #[arg(long)]
        brief: bool,
    },

    /// Print the effective configuration as TOML
    Config {
        /// Also list which files and environment variables contributed
        #[arg(long)]
        sources: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (mut config, sources) = KoeConfig::load_with_sources_from(cli.config.as_deref())
        .context("Failed to load configuration")?;

    match cli.command {
        Commands::Config { sources: show_sources } => {
            if show_sources {
                for file in &sources.files {
                    println!("# file: {}", file.display());
                }
                for var in &sources.env_overrides {
                    println!("# env: {}", var);
                }
            }
            print!("{}", config.to_toml());
            Ok(())
        }

        Commands::Serve { port, host } => {
            if let Some(port) = port {
                config.server.http_port = port;
            }
            if let Some(host) = host {
                config.server.host = host;
            }
            let _telemetry = telemetry::init(
                &config.telemetry.log_level,
                config.telemetry.otlp_endpoint.as_deref(),
            )?;
            koe::serve::run(config).await
        }

        Commands::Analyze {
            file,
            tracks,
            midi,
            brief,
        } => {
            let _telemetry = telemetry::init(
                &config.telemetry.log_level,
                config.telemetry.otlp_endpoint.as_deref(),
            )?;
            let service = ChordService::from_config(&config)?;
            let audio = service
                .decode(file.clone())
                .await
                .with_context(|| format!("Failed to decode {}", file.display()))?;
            let extraction = service
                .extract(audio, tracks.unwrap_or_default(), Cancellation::new())
                .await?;

            if let Some(path) = midi {
                std::fs::write(&path, &extraction.midi)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                tracing::info!(path = %path.display(), "MIDI written");
            }

            let json = if brief {
                serde_json::to_string_pretty(&serde_json::json!({
                    "method": extraction.result.method,
                    "fallback_reason": extraction.result.fallback_reason,
                    "tempo": extraction.result.tempo,
                    "estimated_key": extraction.result.estimated_key.label(),
                    "chord_progression": extraction
                        .result
                        .chord_progression
                        .iter()
                        .map(|c| (c.time, c.chord_name.as_str()))
                        .collect::<Vec<_>>(),
                }))?
            } else {
                serde_json::to_string_pretty(&extraction.result)?
            };
            println!("{}", json);
            Ok(())
        }
    }
}
