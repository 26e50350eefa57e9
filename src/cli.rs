//! Command line interface for the `wiregate` binary.
//!
//! Also compiled by the build script to render the man page, so it depends on
//! nothing but `clap` and `std`.

use std::net::SocketAddr;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Command line arguments for the `wiregate` binary.
#[derive(Debug, Parser)]
#[command(
    name = "wiregate",
    version,
    about = "Multi-protocol TCP services and an API gateway"
)]
pub struct Cli {
    /// Serve Prometheus metrics on this address.
    #[arg(long, global = true, value_name = "ADDR")]
    pub metrics_addr: Option<SocketAddr>,

    /// What to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Wire protocol selectable on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Protocol {
    /// 4-byte big-endian length prefix.
    Stream,
    /// HTTP/1.1 with `Content-Length` bodies.
    Http,
    /// RFC 6455 WebSocket.
    Websocket,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the API gateway.
    Gateway(GatewayArgs),
    /// Run the user service provider and attach it to a gateway.
    Provider(ProviderArgs),
    /// Run a service answering every request with `this is <name>.`.
    Serve(ServeArgs),
    /// Send one message to a service and print the reply.
    Client(ClientArgs),
}

/// Options for `wiregate gateway`.
#[derive(Debug, Args)]
pub struct GatewayArgs {
    /// Address providers connect to.
    #[arg(long, default_value = "127.0.0.1:9501")]
    pub inner_addr: SocketAddr,

    /// Address external HTTP clients connect to.
    #[arg(long, default_value = "127.0.0.1:9502")]
    pub open_addr: SocketAddr,

    /// Seconds between heartbeat pings.
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    pub heartbeat_secs: u64,
}

/// Options for `wiregate provider`.
#[derive(Debug, Args)]
pub struct ProviderArgs {
    /// Gateway inner address.
    #[arg(long, default_value = "127.0.0.1:9501")]
    pub gateway: SocketAddr,

    /// Name announced at registration.
    #[arg(long, default_value = "stream-client-user")]
    pub name: String,
}

/// Options for `wiregate serve`.
#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Protocol to speak.
    #[arg(short, long, value_enum, default_value_t = Protocol::Stream)]
    pub protocol: Protocol,

    /// Listening address.
    #[arg(short, long, default_value = "127.0.0.1:9501")]
    pub addr: SocketAddr,

    /// Service name used in replies; defaults to `<protocol>-service`.
    #[arg(short, long)]
    pub name: Option<String>,

    /// Maximum simultaneous connections.
    #[arg(long, default_value_t = 1024)]
    pub max_connections: usize,
}

/// Options for `wiregate client`.
#[derive(Debug, Args)]
pub struct ClientArgs {
    /// Protocol to speak.
    #[arg(short, long, value_enum, default_value_t = Protocol::Stream)]
    pub protocol: Protocol,

    /// Service address.
    #[arg(short, long, default_value = "127.0.0.1:9501")]
    pub addr: SocketAddr,

    /// Message to send; for HTTP, the request target.
    #[arg(short, long, default_value = "hello")]
    pub message: String,
}
