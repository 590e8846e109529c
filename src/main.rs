//! Binary entrypoint for the zbgate CLI.
//!
//! Commands:
//! - `start [--port <path>] [--baud <rate>]` - run the gateway with an
//!   interactive console
//! - `init` - create a starter `config.toml`
//!
//! See the library crate docs for module-level details: `zbgate::`.
use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::collections::HashMap;
use tokio::io::{AsyncBufReadExt, BufReader};

use zbgate::config::Config;
use zbgate::logutil::escape_log;
use zbgate::radio::{DeviceType, LongAddress, NodeRecord, RadioController, RadioEvent, RadioHandle};

#[derive(Parser)]
#[command(name = "zbgate")]
#[command(about = "A serial gateway for XBee ZB mesh radio networks")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway
    Start {
        /// Serial device port (e.g., /dev/ttyUSB0), overrides the config
        #[arg(short, long)]
        port: Option<String>,

        /// Baud rate, overrides the config
        #[arg(short, long)]
        baud: Option<u32>,
    },
    /// Initialize a new gateway configuration
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            init_logging(None, cli.verbose);
            Config::create_default(&cli.config).await?;
            info!("Wrote starter configuration to {}", cli.config);
            Ok(())
        }
        Commands::Start { port, baud } => {
            let mut config = Config::load(&cli.config).await.unwrap_or_else(|e| {
                eprintln!("{:#} - using defaults", e);
                Config::default()
            });
            if let Some(port) = port {
                config.serial.port = port;
            }
            if let Some(baud) = baud {
                config.serial.baud = baud;
            }
            init_logging(Some(&config), cli.verbose);
            config.validate()?;
            run_gateway(config).await
        }
    }
}

fn init_logging(config: Option<&Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    let level = match verbosity {
        0 => config
            .map(|c| c.logging.level.parse().unwrap_or(log::LevelFilter::Info))
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(level);
    builder.format(|fmt, record| {
        writeln!(
            fmt,
            "{} [{}] {}",
            fmt.timestamp_seconds(),
            record.level(),
            record.args()
        )
    });
    let _ = builder.try_init();
}

async fn run_gateway(config: Config) -> Result<()> {
    info!("Starting zbgate v{}", env!("CARGO_PKG_VERSION"));

    let (mut controller, events) = RadioController::new(&config.gateway);
    controller.open_device(&config.serial)?;
    controller.start_run_loop()?;
    info!(
        "Connected to {} at {} baud",
        config.serial.port, config.serial.baud
    );

    // node ids the config wants enforced after each sweep
    let desired_ids: HashMap<LongAddress, String> = config
        .nodes
        .iter()
        .filter_map(|entry| Some((entry.address()?, entry.node_id.clone())))
        .collect();

    let event_task = tokio::spawn(event_loop(events, controller.handle(), desired_ids));

    console_loop(controller.handle()).await?;

    controller.close_device().await;
    event_task.abort();
    info!("Exiting");
    Ok(())
}

/// Print events as they arrive and reconcile configured node identifiers
/// after each completed discovery sweep.
async fn event_loop(
    mut events: tokio::sync::mpsc::UnboundedReceiver<RadioEvent>,
    handle: RadioHandle,
    desired_ids: HashMap<LongAddress, String>,
) {
    while let Some(event) = events.recv().await {
        match event {
            RadioEvent::DataReceived { address, payload } => {
                info!("Data from {:016X}: {} bytes", address, payload.len());
            }
            RadioEvent::LocalAddressKnown(address) => {
                info!("Local radio address: {:016X}", address);
            }
            RadioEvent::DiscoveryCompleted(nodes) => {
                info!("Discovery finished: {} nodes", nodes.len());
                for node in &nodes {
                    if node.device_type == DeviceType::LocalRadio {
                        continue;
                    }
                    if let Some(wanted) = desired_ids.get(&node.address) {
                        if *wanted != node.node_id {
                            info!(
                                "Renaming {:016X} from '{}' to '{}'",
                                node.address,
                                escape_log(&node.node_id),
                                wanted
                            );
                            handle.request_node_id_change(node.address, wanted);
                        }
                    }
                }
            }
        }
    }
}

fn show_stats(stats: &[NodeRecord]) {
    println!("         Address                Node ID  Type         TX Count  RX Count");
    println!("----------------  ---------------------  -----------  --------  --------");
    for node in stats {
        let marker = if node.device_type == DeviceType::LocalRadio {
            '*'
        } else {
            ' '
        };
        println!(
            "{:016X}{} {:>21}  {:<11}  {:>8}  {:>8}",
            node.address,
            marker,
            escape_log(&node.node_id),
            format!("{:?}", node.device_type),
            node.tx_count,
            node.rx_count
        );
    }
}

fn show_help() {
    println!("Commands:");
    println!("  s                  - show radio stats");
    println!("  d                  - run a node discovery sweep");
    println!("  n <addr> <name>    - change a node's identifier");
    println!("  t <addr> <text>    - send a test payload to a node");
    println!("  h                  - show this help");
    println!("  x                  - exit");
}

fn parse_address(raw: &str) -> Option<LongAddress> {
    let raw = raw.trim_start_matches("0x").trim_start_matches("0X");
    LongAddress::from_str_radix(raw, 16).ok()
}

async fn console_loop(handle: RadioHandle) -> Result<()> {
    show_help();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("s") | Some("S") => show_stats(&handle.stats()),
            Some("d") | Some("D") => handle.request_node_discover(),
            Some("n") | Some("N") => {
                match (parts.next().and_then(parse_address), parts.next()) {
                    (Some(address), Some(name)) => handle.request_node_id_change(address, name),
                    _ => println!("usage: n <hex-address> <name>"),
                }
            }
            Some("t") | Some("T") => match parts.next().and_then(parse_address) {
                Some(address) => {
                    let payload = parts.collect::<Vec<_>>().join(" ");
                    if let Err(e) = handle.send_data(address, payload.as_bytes()) {
                        warn!("Send failed: {}", e);
                    }
                }
                None => println!("usage: t <hex-address> <text>"),
            },
            Some("h") | Some("H") => show_help(),
            Some("x") | Some("X") => break,
            Some(other) => println!("unknown command '{}', h for help", other),
            None => {}
        }
    }
    Ok(())
}
