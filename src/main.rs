use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use tokio::sync::watch;

use playlist_transfer::{
    batch::BatchScheduler,
    catalog::{SpotifyCatalog, TidalCatalog},
    config::Config,
    logging::setup_logging,
    model::{AlbumRef, ArtistCredit, Track},
    resolver,
    retry::{RetryExecutor, TokioSleeper},
    sync::{Checkpoint, JsonFileCheckpoint, SyncContext, SyncExecutor},
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The config file to use
    #[arg(short, long, env = "PLAYLIST_TRANSFER_CONFIG")]
    config: Option<PathBuf>,

    /// Console log level
    #[arg(long, default_value = "info", global = true, env = "LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// File log level (default: debug)
    #[arg(long, default_value = "debug", global = true)]
    log_file_level: log::LevelFilter,

    /// Path to log file
    #[arg(long, env = "PLAYLIST_TRANSFER_LOG_FILE", global = true)]
    log_file: Option<PathBuf>,

    /// Spotify access token, overrides the config file
    #[arg(long, env = "SPOTIFY_ACCESS_TOKEN", global = true, hide_env_values = true)]
    spotify_token: Option<String>,

    /// TIDAL access token, overrides the config file
    #[arg(long, env = "TIDAL_ACCESS_TOKEN", global = true, hide_env_values = true)]
    tidal_token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Copy Spotify playlists into TIDAL
    Sync {
        /// Plan only, don't write anything
        #[arg(long)]
        dry_run: bool,

        /// Only sync playlists with this name (repeatable)
        #[arg(short, long = "playlist")]
        playlists: Vec<String>,

        /// Write the run summary as JSON to this file
        #[arg(long)]
        report: Option<PathBuf>,

        /// Ignore progress saved by an interrupted run
        #[arg(long)]
        fresh: bool,
    },
    /// Show what a sync would do for every playlist
    Plan,
    /// Look up a single track in TIDAL
    Resolve {
        #[arg(long)]
        title: String,

        #[arg(long)]
        artist: String,

        #[arg(long)]
        album: Option<String>,

        #[arg(long)]
        duration_ms: Option<u64>,
    },
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Create a default config file, if it doesn't exist
    CreateDefault,
    /// Print the path to the config file
    Path,
}

fn token(flag: Option<String>, configured: Option<String>, service: &str) -> Result<String> {
    flag.or(configured)
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| {
            eyre!(
                "No {} access token; set it in the config file or pass it on the command line",
                service
            )
        })
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    log::debug!("Loading configuration");
    match path {
        Some(path) => Config::from_file(path),
        None => Config::load(),
    }
    .wrap_err("Failed to load playlist-transfer config")
}

fn tidal_client(config: &Config, flag: Option<String>) -> Result<TidalCatalog> {
    Ok(TidalCatalog::new(
        token(flag, config.tidal.access_token.clone(), "TIDAL")?,
        config.tidal.country_code.clone(),
        config.tidal.requests_per_second,
    ))
}

fn spotify_client(config: &Config, flag: Option<String>) -> Result<SpotifyCatalog> {
    Ok(SpotifyCatalog::new(token(
        flag,
        config.spotify.access_token.clone(),
        "Spotify",
    )?))
}

fn retry_executor(config: &Config) -> RetryExecutor {
    RetryExecutor::new(Arc::new(config.retry.clone()), Arc::new(TokioSleeper))
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    setup_logging(args.log_level, args.log_file.clone(), args.log_file_level)?;

    match args.command {
        Commands::Sync {
            dry_run,
            playlists,
            report,
            fresh,
        } => {
            let config = load_config(args.config.as_ref())?;
            let spotify = spotify_client(&config, args.spotify_token)?;
            let tidal = tidal_client(&config, args.tidal_token)?;
            let retry = retry_executor(&config);
            let scheduler = BatchScheduler::new(
                retry.clone(),
                config.sync.batch_size,
                config.sync.inter_batch_delay(),
            );
            let mut options = config.sync.options();
            options.dry_run = dry_run;
            options.playlist_filter = playlists;
            let executor = SyncExecutor::new(&spotify, &tidal, retry, scheduler, options);

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::warn!("Ctrl-C received, finishing the current playlist");
                    let _ = shutdown_tx.send(true);
                }
            });

            let checkpoint = config.checkpoint_path().map(JsonFileCheckpoint::new);
            let mut ctx = SyncContext::new(shutdown_rx);
            if !dry_run {
                if let Some(checkpoint) = &checkpoint {
                    if fresh {
                        checkpoint.clear().await?;
                    }
                    ctx = ctx.with_checkpoint(checkpoint).await;
                }
            }

            let summary = executor.run(ctx).await?;
            print!("{}", summary);

            if let Some(path) = report {
                let json = serde_json::to_vec_pretty(&summary)?;
                std::fs::write(&path, json)
                    .wrap_err_with(|| format!("Failed to write report {}", path.display()))?;
                log::info!("Wrote report to {}", path.display());
            }
        }
        Commands::Plan => {
            let config = load_config(args.config.as_ref())?;
            let spotify = spotify_client(&config, args.spotify_token)?;
            let tidal = tidal_client(&config, args.tidal_token)?;
            let retry = retry_executor(&config);
            let scheduler = BatchScheduler::new(
                retry.clone(),
                config.sync.batch_size,
                config.sync.inter_batch_delay(),
            );
            let executor =
                SyncExecutor::new(&spotify, &tidal, retry, scheduler, config.sync.options());

            for comparison in executor.plan().await? {
                println!(
                    "{:<6} {} ({})",
                    format!("{:?}", comparison.action).to_lowercase(),
                    comparison.source.name,
                    comparison.reason
                );
            }
        }
        Commands::Resolve {
            title,
            artist,
            album,
            duration_ms,
        } => {
            let config = load_config(args.config.as_ref())?;
            let tidal = tidal_client(&config, args.tidal_token)?;
            let retry = retry_executor(&config);
            let track = Track {
                id: "query".to_string(),
                title,
                artists: vec![ArtistCredit {
                    id: String::new(),
                    name: artist,
                }],
                album: AlbumRef {
                    id: String::new(),
                    name: album.unwrap_or_default(),
                },
                duration_ms: duration_ms.unwrap_or(0),
                isrc: None,
                explicit: None,
                popularity: None,
            };

            let result = resolver::resolve(&track, &tidal, &retry).await?;
            match &result.resolved_track {
                Some(found) => println!(
                    "{} [{}] {} ({:.3})",
                    found.display_name(),
                    found.id,
                    found.album.name,
                    result.confidence
                ),
                None => println!("Not found: {}", track.display_name()),
            }
            for query in &result.attempted_queries {
                println!("  tried: {}", query);
            }
        }
        Commands::Config(command) => match command {
            ConfigCommands::CreateDefault => {
                log::debug!("Creating default config");
                let path = Config::create_default()?;
                log::info!("Default config at {}", path.display());
            }
            ConfigCommands::Path => match Config::config_path() {
                Some(path) => println!("{}", path.display()),
                None => println!("No default config path found"),
            },
        },
    }

    Ok(())
}
