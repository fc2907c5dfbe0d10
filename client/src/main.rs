use clap::Parser;
use client::{ConnectionRegistry, PanelCredentials, TelemetryConfig, TelemetryStore, WebSocketConnector};
use log::info;
use serde_json::json;
use shared::format_bytes;
use std::time::Duration;
use tokio::time::interval;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Base URL of the dashboard backend serving /credential/{id}
    #[arg(short = 'p', long)]
    panel_url: String,

    /// Server id to monitor (repeatable)
    #[arg(short = 's', long = "server", required = true)]
    servers: Vec<String>,

    /// Delay before reconnecting a closed connection (at least 100)
    #[arg(long, default_value = "5000")]
    reconnect_delay_ms: u64,

    /// Seconds between printed snapshots
    #[arg(short = 'i', long, default_value = "2")]
    print_interval_secs: u64,

    /// Origin header sent on the WebSocket upgrade
    #[arg(long)]
    origin: Option<String>,

    /// Session cookie forwarded to the backend
    #[arg(long)]
    cookie: Option<String>,

    /// Print snapshots as JSON lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let mut credentials = PanelCredentials::new(&args.panel_url);
    if let Some(cookie) = &args.cookie {
        credentials = credentials.with_session_cookie(cookie.clone());
    }

    let mut connector = WebSocketConnector::new();
    if let Some(origin) = &args.origin {
        connector = connector.with_origin(origin.clone());
    }

    let config = TelemetryConfig::default()
        .with_reconnect_delay(Duration::from_millis(args.reconnect_delay_ms));

    info!("Monitoring {} server(s) via {}", args.servers.len(), args.panel_url);

    let mut registry = ConnectionRegistry::new(credentials, connector, config);
    registry.reconcile(args.servers.iter().cloned());

    let mut print_interval = interval(Duration::from_secs(args.print_interval_secs.max(1)));

    loop {
        tokio::select! {
            _ = print_interval.tick() => {
                print_snapshot(registry.store(), &registry.monitored_ids(), args.json)?;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    registry.dispose_all();

    Ok(())
}

fn print_snapshot(
    store: &TelemetryStore,
    server_ids: &[String],
    as_json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if as_json {
        let snapshot = json!({
            "statuses": store.statuses(),
            "metrics": store.metrics(),
        });
        println!("{}", serde_json::to_string(&snapshot)?);
        return Ok(());
    }

    for server_id in server_ids {
        let status = store.status(server_id);
        let metrics = store.server_metrics(server_id);
        let phase = store
            .connection(server_id)
            .map(|state| state.phase.to_string())
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{:<12} {:<9} cpu {:>6.2}%  mem {:>10}  disk {:>10}  [{}]",
            server_id,
            status,
            metrics.cpu_percent,
            format_bytes(metrics.memory_bytes),
            format_bytes(metrics.disk_bytes),
            phase
        );
    }

    Ok(())
}
