//! resilmeshd binary

use clap::{Arg, Command};
use resil_gateway::{Gateway, GatewayConfig};
use std::process;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "resil_gateway=info,resil_control=info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse command line arguments
    let matches = Command::new("resilmeshd")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Predictive failover gateway for tiered forwarding fabrics")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path"),
        )
        .arg(
            Arg::new("bind")
                .short('b')
                .long("bind")
                .value_name("ADDRESS")
                .help("Bind address"),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("HTTP server port")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("topology")
                .short('t')
                .long("topology")
                .value_name("FILE")
                .help("Topology descriptor path"),
        )
        .arg(
            Arg::new("routing")
                .long("routing")
                .value_name("MODE")
                .help("Routing mode: physical or virtual"),
        )
        .get_matches();

    // Load configuration, then apply CLI overrides
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => match GatewayConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load configuration from {}: {}", path, e);
                process::exit(1);
            }
        },
        None => GatewayConfig::default(),
    };

    if let Some(bind) = matches.get_one::<String>("bind") {
        config.bind_address = bind.clone();
    }
    if let Some(port) = matches.get_one::<u16>("port") {
        config.port = *port;
    }
    if let Some(topology) = matches.get_one::<String>("topology") {
        config.topology_path = topology.into();
    }
    if let Some(routing) = matches.get_one::<String>("routing") {
        match routing.parse() {
            Ok(mode) => config.routing_mode = mode,
            Err(e) => {
                error!("Invalid routing mode: {}", e);
                process::exit(1);
            }
        }
    }

    info!(
        addr = %config.listen_addr(),
        topology = %config.topology_path.display(),
        routing = %config.routing_mode,
        "starting resilmeshd"
    );

    // Topology load failure is fatal to startup.
    let gateway = match Gateway::new(config) {
        Ok(gateway) => gateway,
        Err(e) => {
            error!("Failed to start gateway: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = gateway.serve().await {
        error!("Gateway exited with error: {}", e);
        process::exit(1);
    }
    info!("resilmeshd stopped");
}
