//! Command line interface for the `streamwire` binary.
//!
//! Kept free of library types so the build script can render the man page
//! from it.

use std::net::SocketAddr;

use clap::{Args, Parser, Subcommand};

/// Command line arguments for the `streamwire` binary.
#[derive(Debug, Parser)]
#[command(
    name = "streamwire",
    version,
    about = "Serve or send streamed requests over TCP"
)]
pub struct Cli {
    /// Connection settings shared by every command.
    #[command(flatten)]
    pub connection: ConnectionArgs,
    /// Action to perform.
    #[command(subcommand)]
    pub command: Command,
}

/// Per-connection settings.
#[derive(Debug, Args)]
pub struct ConnectionArgs {
    /// Largest payload written in a single frame, in bytes.
    #[arg(long, global = true, default_value_t = 4096)]
    pub max_payload: usize,
    /// Milliseconds to wait for a response before giving up.
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,
}

/// Subcommands of the `streamwire` binary.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Accept connections and echo every request back to its sender.
    Serve {
        /// Address to listen on.
        #[arg(short, long, default_value = "127.0.0.1:7878")]
        listen: SocketAddr,
    },
    /// Send one request and print the response.
    Request {
        /// Address of the serving peer.
        #[arg(short, long, default_value = "127.0.0.1:7878")]
        connect: SocketAddr,
        /// Request verb.
        #[arg(long, default_value = "GET")]
        verb: String,
        /// Request path.
        path: String,
        /// Text attached to the request.
        #[arg(short, long)]
        body: Option<String>,
    },
}
