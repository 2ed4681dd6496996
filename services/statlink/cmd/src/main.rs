//! Command-line client for the statlink server query protocol.
//!
//! Connects to the server, sends one request, prints the reply and closes
//! the connection.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use statlink_session::{Client, ClientEvent};
use statlink_wire::{MessageType, StatusCode};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

mod config;
mod display;
mod logging;

use config::{parse_magic, StatlinkConfig};
use logging::StatlinkLogFormatter;

/// Query or command a statlink server
#[derive(Parser, Debug)]
#[command(name = "statlink", version, about = "Query or command a statlink server")]
struct Args {
    /// Server host, overrides the config file
    #[arg(long)]
    host: Option<String>,

    /// Server port, overrides the config file
    #[arg(long)]
    port: Option<u16>,

    /// Header magic, hex (0xA55A) or decimal
    #[arg(long)]
    magic: Option<String>,

    /// Time to wait for the reply, e.g. 5s
    #[arg(long)]
    timeout: Option<humantime::Duration>,

    /// Time allowed for the connection attempt, e.g. 3s
    #[arg(long)]
    connect_timeout: Option<humantime::Duration>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Configuration file path
    #[arg(long, default_value = "statlink.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    request: Request,
}

/// Request to send
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Request {
    /// Fetch the server time
    Time,
    /// Fetch free storage on the server
    FreeSpace,
    /// Fetch server statistics
    Stats,
    /// Store text on the server
    Set {
        /// Text to store
        text: String,
    },
    /// Clear stored data
    Clear,
}

impl Request {
    fn message_type(&self) -> MessageType {
        match self {
            Request::Time => MessageType::GetTime,
            Request::FreeSpace => MessageType::GetFreeSpace,
            Request::Stats => MessageType::GetStats,
            Request::Set { .. } => MessageType::SetData,
            Request::Clear => MessageType::ClearData,
        }
    }

    fn text(&self) -> Option<&str> {
        match self {
            Request::Set { text } => Some(text),
            _ => None,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env_filter = EnvFilter::new("warn")
        .add_directive(format!("statlink={}", args.log_level).parse()?)
        .add_directive(format!("statlink_session={}", args.log_level).parse()?)
        .add_directive(format!("statlink_wire={}", args.log_level).parse()?);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .event_format(StatlinkLogFormatter::new("statlink".to_string()))
        .init();

    let mut config = StatlinkConfig::load_from_file(&args.config)?;
    apply_args(&mut config, &args)?;
    info!(
        component = "cli",
        "Using server {}:{} (magic {:#06x})", config.host, config.port, config.magic
    );

    let (mut client, mut events) = Client::new(config.client_config());
    client.connect(&config.host, config.port)?;

    let line = tokio::time::timeout(
        config.response_timeout,
        exchange(&client, &mut events, &args.request),
    )
    .await
    .with_context(|| {
        format!(
            "no reply from {}:{} within {:?}",
            config.host, config.port, config.response_timeout
        )
    })??;
    println!("{}", line);

    client.disconnect();
    close(&mut events, config.response_timeout).await;
    Ok(())
}

/// Apply command-line overrides on top of file and environment settings
fn apply_args(config: &mut StatlinkConfig, args: &Args) -> anyhow::Result<()> {
    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(magic) = &args.magic {
        config.magic = parse_magic(magic)?;
    }
    if let Some(timeout) = &args.timeout {
        config.response_timeout = **timeout;
    }
    if let Some(timeout) = &args.connect_timeout {
        config.connect_timeout = Some(**timeout);
    }
    Ok(())
}

/// Send the request once connected and return the rendered reply
///
/// A reply whose header carries a non-success status is an error.
async fn exchange(
    client: &Client,
    events: &mut mpsc::Receiver<ClientEvent>,
    request: &Request,
) -> anyhow::Result<String> {
    let mut refused: Option<StatusCode> = None;
    while let Some(event) = events.recv().await {
        match event {
            ClientEvent::ConnectionEstablished { peer } => {
                info!(component = "cli", "Connected to {}", peer);
                match request.text() {
                    Some(text) => client.send_data(request.message_type(), text)?,
                    None => client.send_request(request.message_type())?,
                }
            }
            ClientEvent::ConnectionFailed { code, reason } => {
                bail!("connection failed ({:?}): {}", code, reason)
            }
            ClientEvent::Disconnected => bail!("server closed the connection before replying"),
            ClientEvent::ProtocolError(e) => bail!("protocol error: {}", e),
            ClientEvent::ErrorStatus { status, .. } => refused = Some(status),
            other => {
                if let Some(line) = display::format_response(&other) {
                    if let Some(status) = refused {
                        bail!("server reported {:?}: {}", status, line);
                    }
                    return Ok(line);
                }
            }
        }
    }
    bail!("client stopped before a reply arrived")
}

/// Wait for the connection to finish closing
async fn close(events: &mut mpsc::Receiver<ClientEvent>, limit: Duration) {
    let drained = tokio::time::timeout(limit, async {
        while let Some(event) = events.recv().await {
            if event == ClientEvent::Disconnected {
                break;
            }
            debug!(component = "cli", "Ignoring {:?} while closing", event);
        }
    })
    .await;

    if drained.is_err() {
        debug!(component = "cli", "Connection did not close within {:?}", limit);
    }
}
