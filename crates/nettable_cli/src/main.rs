//! nettable CLI
//!
//! Command-line server and client for nettable.
//!
//! # Commands
//!
//! - `serve` - Run a table server
//! - `get` - Print one entry
//! - `keys` - List entries under a prefix
//! - `put` - Write one entry
//! - `delete` - Delete one entry
//! - `watch` - Print changes as they happen

mod commands;

use clap::{Parser, Subcommand};
use commands::put::ValueType;
use commands::{ConnectArgs, OutputFormat, RevisionArg};
use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

/// nettable command-line tools.
#[derive(Parser)]
#[command(name = "nettable")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    /// Output format
    #[arg(global = true, short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a table server until Ctrl-C
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "0.0.0.0:1735")]
        bind: SocketAddr,

        /// Identity announced to revision 3.0 clients
        #[arg(long, default_value = "nettable")]
        identity: String,

        /// Newest protocol revision to accept
        #[arg(long, value_enum, default_value = "3")]
        max_revision: RevisionArg,

        /// Print every change
        #[arg(short, long)]
        watch: bool,
    },

    /// Print the value of one key
    Get {
        #[command(flatten)]
        connect: ConnectArgs,

        /// Full key, e.g. /t1/speed
        key: String,
    },

    /// List keys under a prefix
    Keys {
        #[command(flatten)]
        connect: ConnectArgs,

        /// Key prefix
        #[arg(default_value = "/")]
        prefix: String,

        /// Print values as well
        #[arg(long)]
        values: bool,
    },

    /// Write one key
    Put {
        #[command(flatten)]
        connect: ConnectArgs,

        /// Value type
        #[arg(short = 't', long = "type", value_enum, default_value = "string")]
        value_type: ValueType,

        /// Mark the entry persistent
        #[arg(long)]
        persistent: bool,

        /// Full key
        key: String,

        /// Value; arrays are comma-separated, raw values hex-encoded
        value: String,
    },

    /// Delete one key
    Delete {
        #[command(flatten)]
        connect: ConnectArgs,

        /// Full key
        key: String,
    },

    /// Print entries under a prefix, then every change
    Watch {
        #[command(flatten)]
        connect: ConnectArgs,

        /// Key prefix
        #[arg(default_value = "/")]
        prefix: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve {
            bind,
            identity,
            max_revision,
            watch,
        } => commands::serve::run(bind, &identity, max_revision, watch, cli.format)?,
        Commands::Get { connect, key } => commands::get::run_get(&connect, &key, cli.format)?,
        Commands::Keys {
            connect,
            prefix,
            values,
        } => commands::get::run_keys(&connect, &prefix, values, cli.format)?,
        Commands::Put {
            connect,
            value_type,
            persistent,
            key,
            value,
        } => {
            let value = commands::put::parse_value(value_type, &value)?;
            commands::put::run_put(&connect, &key, value, persistent)?;
        }
        Commands::Delete { connect, key } => commands::put::run_delete(&connect, &key)?,
        Commands::Watch { connect, prefix } => {
            commands::watch::run(&connect, &prefix, cli.format)?
        }
    }

    Ok(())
}
