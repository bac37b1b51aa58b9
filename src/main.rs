//! daqgw CLI entry point.
//!
//! Utility surface for the gateway library: protocol discovery and example
//! source descriptors for the supported tags.

use clap::{Parser, Subcommand};

use daqgw::{registry, Protocol, SourceDescriptor};

/// Data Acquisition Gateway - uniform access to industrial data sources
#[derive(Parser, Debug)]
#[command(name = "daqgw", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List known protocols and whether an adapter is implemented
    ListProtocols,

    /// Print an example source descriptor as JSON
    Example {
        /// Protocol tag to generate an example for
        #[arg(default_value = "OPC_UA")]
        protocol: String,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::ListProtocols => list_protocols(),
        Commands::Example { protocol } => generate_example(&protocol),
    }
}

fn list_protocols() {
    println!("Known protocols:");
    println!();

    for entry in registry().protocols() {
        let status = if entry.implemented {
            "implemented"
        } else {
            "registered, no adapter"
        };
        println!("  {} ({}) - {}", entry.protocol.tag(), entry.display_name, status);
        println!("    {}", entry.description);
        if !entry.default_config.is_empty() {
            println!("    Defaults:");
            for (key, value) in entry.default_config.iter() {
                println!("      {} = {}", key, value);
            }
        }
        println!();
    }
}

fn generate_example(tag: &str) {
    let protocol: Protocol = match tag.parse() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!(
                "Available: {}",
                registry()
                    .protocols()
                    .iter()
                    .map(|p| p.protocol.tag())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            return;
        }
    };

    let descriptor = match protocol {
        Protocol::OpcUa => {
            SourceDescriptor::new("plc1", protocol, "opc.tcp://192.168.1.100:4840")
                .with_credentials("admin", "secret")
                .with_config(
                    daqgw::ProtocolConfig::new()
                        .with("namespace_index", 2)
                        .with("data_type", "double"),
                )
        }
        Protocol::WebSocket => {
            SourceDescriptor::new("stream1", protocol, "ws://192.168.1.200:9000/data")
                .with_config(daqgw::ProtocolConfig::new().with("connect_timeout_ms", 5_000u64))
        }
        Protocol::OpcClassic => {
            SourceDescriptor::new("legacy1", protocol, "opcda://WORKSTATION01")
                .with_config(daqgw::ProtocolConfig::new().with("prog_id", "Matrikon.OPC.Simulation"))
        }
        other => SourceDescriptor::new("example", other, "tcp://host:0"),
    };

    match serde_json::to_string_pretty(&descriptor) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("failed to render example: {}", e),
    }
}
