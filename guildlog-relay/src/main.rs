/*!
guildlog: relay guild events to a per-guild log channel
*/

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Arg, ArgAction, Command};
use guildlog_platform::{GuildApi, RestClient};
use guildlog_relay::core::output_plugins::OutputManager;
use guildlog_relay::{
    EventCorrelator, EventSource, RelayConfig, RelayError, RelayService, RelayStats, Stores,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

async fn load_config(path: Option<PathBuf>) -> Result<RelayConfig, Box<dyn std::error::Error>> {
    match path.or_else(|| RelayConfig::default_path().filter(|p| p.exists())) {
        Some(path) => Ok(RelayConfig::from_file(&path).await?),
        None => Ok(RelayConfig::from_toml("")?),
    }
}

/// Replay a JSON-lines file, or follow stdin when no file is given. Ctrl-C stops
/// reading; events already being handled run to completion.
async fn relay_events(service: &RelayService, events: Option<&String>) -> Result<RelayStats, RelayError> {
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };
    match events {
        Some(path) => {
            let source = EventSource::open(path).await?;
            service.run_until(source.into_stream(), shutdown).await
        }
        None => service.run_until(EventSource::stdin().into_stream(), shutdown).await,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = Command::new("guildlog")
        .version(clap::crate_version!())
        .about("Relays guild membership, voice, channel and invite events to a log channel")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help("Path to the TOML configuration file")
                .value_name("PATH"),
        )
        .arg(
            Arg::new("events")
                .short('e')
                .long("events")
                .help("Read JSON-lines gateway events from this file instead of stdin")
                .value_name("PATH"),
        )
        .arg(
            Arg::new("print-config")
                .long("print-config")
                .help("Print the effective configuration and exit")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let config = load_config(matches.get_one::<String>("config").map(PathBuf::from)).await?;

    if matches.get_flag("print-config") {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    let api: Arc<dyn GuildApi> = Arc::new(RestClient::with_base(
        config.discord.api_base.clone(),
        config.resolve_token()?,
    ));

    let mut outputs = OutputManager::new(&config.outputs, api.clone());
    outputs.initialize().await?;

    let correlator = EventCorrelator::new(api, Stores::from_config(&config), &config, outputs);
    let service = RelayService::new(correlator);

    let stats = relay_events(&service, matches.get_one::<String>("events")).await?;
    info!("Processed {} events", stats.events_processed);

    Ok(())
}
