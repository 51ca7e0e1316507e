//! IoT Hub adapter - main entry point
//!
//! Runs the adapter against a real hub. Device-bus commands are read one per
//! line from stdin and answered on stdout; status changes are printed as they
//! happen.

use clap::{Parser, Subcommand};
use iothub_adapter::adapter::{CloudAdapter, Command, CommandResponse, ConnectionStatus};
use iothub_adapter::error::AdapterError;
use iothub_adapter::config::AdapterConfig;
use iothub_adapter::device::{
    AlwaysConnected, CredentialStore, FileCredentialStore, InterfaceLink, LinkLayer,
    NullCredentialStore,
};
use iothub_adapter::observability::{init_default_logging, metrics};
use iothub_adapter::protocol::decode_numeric_vec;
use iothub_adapter::runtime::{AdapterHandle, AdapterRuntime, MethodTable};
use iothub_adapter::transport::MqttTransport;
use std::path::PathBuf;
use std::process;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

#[derive(Parser)]
#[command(name = "iothub-adapter")]
#[command(about = "Connect a device to an IoT Hub over MQTT")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "IOTHUB_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the adapter, reading device-bus commands from stdin
    Run,
    /// Validate configuration
    Config {
        /// Print the effective configuration
        #[arg(long)]
        show: bool,
    },
}

/// One line of stdin input
#[derive(Debug, PartialEq)]
enum BusLine {
    Command(Command),
    Record { label: String, values: Vec<f64> },
    Metrics,
}

#[derive(Debug, Error)]
enum BusLineError {
    #[error("{0}")]
    Usage(String),
    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    let config = match AdapterConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_adapter(config).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }
}

fn handle_config_command(
    config: &AdapterConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("{}", toml::to_string_pretty(config)?);
    }
    info!("Configuration is valid");
    Ok(())
}

async fn run_adapter(config: AdapterConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting iothub-adapter v{}", env!("CARGO_PKG_VERSION"));

    let (transport, events_rx) =
        MqttTransport::new(config.reconnect_delay(), config.mqtt.queue_capacity);

    let link: Box<dyn LinkLayer> = match &config.mqtt.link_interface {
        Some(interface) => Box::new(InterfaceLink::new(interface)),
        None => Box::new(AlwaysConnected),
    };
    let store: Box<dyn CredentialStore> = match &config.device.credentials_file {
        Some(path) => Box::new(FileCredentialStore::new(path)),
        None => Box::new(NullCredentialStore),
    };

    let (status_tx, status_rx) = mpsc::unbounded_channel();
    let mut adapter = CloudAdapter::new(transport, link, config.adapter_options()?)
        .with_store(store)
        .with_status_sender(status_tx);

    match adapter.restore_credentials() {
        Ok(true) => info!("Restored stored connection string"),
        Ok(false) => debug!("No stored connection string"),
        Err(e) => warn!("Ignoring stored connection string: {}", e),
    }
    if let Some(conn_str) = config.connection_string()? {
        if let Err(e) = adapter.set_credentials(conn_str.as_bytes()) {
            warn!("Connection string from environment rejected: {}", e);
        }
    }

    let dispatcher = MethodTable::new()
        .register("echo", |args: &[f64]| Ok(args.to_vec()))
        .register("ping", |_: &[f64]| Ok(Vec::new()));
    let (runtime, handle) = AdapterRuntime::new(adapter, events_rx, config.tick_interval());
    let runtime = runtime.with_dispatcher(Box::new(dispatcher));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(print_status_changes(status_rx));
    tokio::spawn(serve_stdin(handle));
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(name) => info!("Received {}, shutting down gracefully...", name),
            Err(e) => error!("Signal handling failed: {}", e),
        }
        request_shutdown(&shutdown_tx);
    });

    runtime.run(shutdown_rx).await?;
    info!("Application shutdown complete");
    Ok(())
}

/// Ask the runtime to stop; returns whether it was still listening
fn request_shutdown(shutdown_tx: &watch::Sender<bool>) -> bool {
    if shutdown_tx.send(true).is_err() {
        debug!("Runtime already stopped before the shutdown signal");
        return false;
    }
    true
}

async fn wait_for_signal() -> std::io::Result<&'static str> {
    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => Ok("SIGINT"),
        _ = sigterm.recv() => Ok("SIGTERM"),
    }
}

async fn print_status_changes(mut status_rx: mpsc::UnboundedReceiver<ConnectionStatus>) {
    while let Some(status) = status_rx.recv().await {
        println!("event status {} {}", status.code(), status.name());
    }
}

async fn serve_stdin(handle: AdapterHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("stdin closed, no more device-bus commands");
                return;
            }
            Err(e) => {
                warn!("Failed to read stdin: {}", e);
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let reply = match parse_bus_line(&line) {
            Ok(BusLine::Command(command)) => match handle.execute(command).await {
                Ok(response) => format_response(&response),
                Err(e) => format!("error {}: {}", e.code(), e),
            },
            Ok(BusLine::Record { label, values }) => match handle.record(label, values).await {
                Ok(()) => "ok".to_string(),
                Err(e) => format!("error {}: {}", e.code(), e),
            },
            Ok(BusLine::Metrics) => serde_json::to_string(&metrics().get_metrics())
                .unwrap_or_else(|e| format!("error: {e}")),
            Err(BusLineError::Adapter(e)) => format!("error {}: {}", e.code(), e),
            Err(e) => format!("error: {e}"),
        };
        println!("{reply}");
    }
}

fn format_response(response: &CommandResponse) -> String {
    match response {
        CommandResponse::Ack => "ok".to_string(),
        CommandResponse::Text(text) => text.clone(),
        CommandResponse::Status(status) => format!("{} {}", status.code(), status.name()),
        CommandResponse::Period(ms) => ms.to_string(),
    }
}

fn parse_bus_line(line: &str) -> Result<BusLine, BusLineError> {
    let line = line.trim();
    let (verb, rest) = line
        .split_once(char::is_whitespace)
        .map(|(verb, rest)| (verb, rest.trim()))
        .unwrap_or((line, ""));

    let command = match verb {
        "set-credentials" => Command::SetCredentials(rest.as_bytes().to_vec()),
        "clear" => Command::SetCredentials(Vec::new()),
        "connect" => Command::Connect,
        "disconnect" => Command::Disconnect,
        "hub-name" => Command::GetHubName,
        "device-id" => Command::GetDeviceId,
        "status" => Command::GetStatus,
        "push-period" if rest.is_empty() => Command::GetPushPeriod,
        "push-period" => Command::SetPushPeriod(parse_ms(rest)?),
        "watchdog" if rest.is_empty() => Command::GetWatchdogPeriod,
        "watchdog" => Command::SetWatchdogPeriod(parse_ms(rest)?),
        "upload" => {
            let (label, values) = parse_labelled_values(rest)?;
            Command::Upload { label, values }
        }
        "record" => {
            let (label, values) = parse_labelled_values(rest)?;
            return Ok(BusLine::Record { label, values });
        }
        "metrics" => return Ok(BusLine::Metrics),
        other => return Err(BusLineError::Usage(format!("unknown command '{other}'"))),
    };
    Ok(BusLine::Command(command))
}

fn parse_ms(raw: &str) -> Result<u32, BusLineError> {
    raw.parse()
        .map_err(|_| BusLineError::Usage(format!("'{raw}' is not a period in milliseconds")))
}

fn parse_labelled_values(rest: &str) -> Result<(String, Vec<f64>), BusLineError> {
    let (label, values) = rest
        .split_once(char::is_whitespace)
        .ok_or_else(|| BusLineError::Usage("expected <label> <values>".to_string()))?;
    let values = decode_numeric_vec(values.as_bytes())
        .map_err(|partial| AdapterError::from(partial.error))?;
    Ok((label.to_string(), values))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_register_commands() {
        assert_eq!(
            parse_bus_line("status").unwrap(),
            BusLine::Command(Command::GetStatus)
        );
        assert_eq!(
            parse_bus_line("push-period").unwrap(),
            BusLine::Command(Command::GetPushPeriod)
        );
        assert_eq!(
            parse_bus_line("  watchdog 30000 ").unwrap(),
            BusLine::Command(Command::SetWatchdogPeriod(30000))
        );
        assert_eq!(
            parse_bus_line("clear").unwrap(),
            BusLine::Command(Command::SetCredentials(Vec::new()))
        );
    }

    #[test]
    fn test_parse_set_credentials_keeps_raw_string() {
        assert_eq!(
            parse_bus_line("set-credentials HostName=h;DeviceId=d;SharedAccessKey=k=").unwrap(),
            BusLine::Command(Command::SetCredentials(
                b"HostName=h;DeviceId=d;SharedAccessKey=k=".to_vec()
            ))
        );
    }

    #[test]
    fn test_parse_values() {
        assert_eq!(
            parse_bus_line("upload temp [21.5, 3]").unwrap(),
            BusLine::Command(Command::Upload {
                label: "temp".to_string(),
                values: vec![21.5, 3.0],
            })
        );
        assert_eq!(
            parse_bus_line("record hum 40 41").unwrap(),
            BusLine::Record {
                label: "hum".to_string(),
                values: vec![40.0, 41.0],
            }
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_bus_line("reboot").is_err());
        assert!(parse_bus_line("push-period soon").is_err());
        assert!(parse_bus_line("upload temp").is_err());
        assert!(parse_bus_line("upload temp [x]").is_err());
    }

    #[test]
    fn test_malformed_values_report_bus_code() {
        match parse_bus_line("upload temp [1, x]") {
            Err(BusLineError::Adapter(e)) => {
                assert!(matches!(
                    &e,
                    AdapterError::MalformedNumericPayload(err) if err.decoded == 1
                ));
                assert_eq!(e.code(), -4);
            }
            other => panic!("expected malformed payload, got {other:?}"),
        }
        assert!(matches!(
            parse_bus_line("upload temp"),
            Err(BusLineError::Usage(_))
        ));
    }

    #[test]
    fn test_request_shutdown() {
        let (tx, rx) = watch::channel(false);
        assert!(request_shutdown(&tx));
        assert!(*rx.borrow());

        drop(rx);
        assert!(!request_shutdown(&tx));
    }

    #[test]
    fn test_format_response() {
        assert_eq!(format_response(&CommandResponse::Ack), "ok");
        assert_eq!(
            format_response(&CommandResponse::Status(ConnectionStatus::Connecting)),
            "3 CONNECTING"
        );
        assert_eq!(format_response(&CommandResponse::Period(5000)), "5000");
    }
}
