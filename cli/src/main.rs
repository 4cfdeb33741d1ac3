//! park-watch - terminal watcher for parking-system live topics
//!
//! # Usage
//!
//! ```bash
//! # Dashboard and alerts of lots 1 and 2
//! park-watch -u http://localhost:8080 --lot 1 --lot 2
//!
//! # Everything listed in a config file, as JSON lines
//! park-watch --config park-link.toml --json
//!
//! # Vehicle entries/exits, stop after 10 messages
//! park-watch -u ws://broker:8080/ws --sessions -n 10
//! ```

use std::collections::HashSet;
use std::process::ExitCode;

use clap::Parser;
use futures_util::stream::{self, StreamExt};

use park_link::{EventHandlers, ParkLinkClient, ParkLinkConfig, ParkLinkError, Result, Topic};

mod args;
mod formatter;

use args::Cli;
use formatter::format_message;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("park-watch: {}", e);
            ExitCode::FAILURE
        },
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "park_link=debug,park_watch=debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .init();
}

/// Config file (if any), then `PARKLINK_*` variables, then flags.
fn load_config(cli: &Cli) -> Result<ParkLinkConfig> {
    let mut config = match &cli.config {
        Some(path) => ParkLinkConfig::from_file(path)?,
        None => ParkLinkConfig::default(),
    };
    config.apply_env_overrides()?;

    if let Some(url) = &cli.url {
        config.connection.endpoint = url.clone();
    }
    if let Some(login) = &cli.login {
        config.auth.login = Some(login.clone());
        config.auth.passcode = cli.passcode.clone();
    }
    config.validate()?;
    Ok(config)
}

/// Topics from the flags when any are given, otherwise from the config.
fn select_topics(cli: &Cli, config: &ParkLinkConfig) -> Result<Vec<Topic>> {
    let from_flags = !cli.topics.is_empty() || !cli.lots.is_empty() || cli.sessions || cli.reservations;
    if !from_flags {
        return config.topics();
    }

    let mut topics = Vec::new();
    for raw in &cli.topics {
        topics.push(Topic::new(raw.as_str())?);
    }
    for &lot in &cli.lots {
        topics.push(Topic::lot_dashboard(lot));
        topics.push(Topic::lot_alerts(lot));
        if cli.slots {
            topics.push(Topic::lot_slots(lot));
        }
    }
    if cli.sessions {
        topics.push(Topic::session_entries());
        topics.push(Topic::session_exits());
    }
    if cli.reservations {
        topics.push(Topic::reservations());
    }
    let mut seen = HashSet::new();
    topics.retain(|topic| seen.insert(topic.clone()));
    Ok(topics)
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let topics = select_topics(&cli, &config)?;
    if topics.is_empty() {
        return Err(ParkLinkError::ConfigurationError(
            "no topics to watch; pass --topic/--lot or list them under [subscriptions]".into(),
        ));
    }

    let client = ParkLinkClient::builder()
        .endpoint(config.connection.endpoint.clone())
        .credentials(config.credentials())
        .timeouts(config.timeouts())
        .connection_options(config.connection_options())
        .event_handlers(
            EventHandlers::new()
                .on_connect(|| log::info!("Connected"))
                .on_disconnect(|reason| log::warn!("Disconnected: {}", reason))
                .on_error(|error| log::warn!("{}", error)),
        )
        .build()?;

    for topic in &topics {
        log::info!("Watching {}", topic);
    }
    let mut messages = stream::select_all(
        topics
            .into_iter()
            .map(|topic| client.subscribe(topic).into_stream().boxed()),
    );
    client.connect().await?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut printed = 0u64;

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                log::info!("Interrupted");
                break;
            },
            item = messages.next() => match item {
                Some(Ok(message)) => {
                    println!("{}", format_message(&message, cli.json)?);
                    printed += 1;
                    if cli.count == Some(printed) {
                        break;
                    }
                },
                Some(Err(e)) => eprintln!("park-watch: {}", e),
                None => break,
            },
        }
    }

    client.disconnect().await
}
