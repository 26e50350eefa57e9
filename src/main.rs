//! `wiregate` binary: services, gateway, provider and a one-shot client.

mod cli;
mod console;

use std::{sync::Arc, time::Duration};

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use wiregate::{
    DefaultHandler,
    ProtocolCodec,
    client,
    codec::{HttpCodec, StreamCodec, WebSocketCodec},
    config::{GatewayConfig, ServiceConfig},
    connection::ConnectionHandler,
    gateway::Gateway,
    provider::{self, user::user_provider},
    server::Server,
};

use crate::{
    cli::{ClientArgs, Cli, Command, GatewayArgs, Protocol, ProviderArgs, ServeArgs},
    console::OneShot,
};

#[tokio::main]
async fn main() -> wiregate::Result<()> {
    // Applications embedding the library install their own subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    install_metrics(cli.metrics_addr)?;

    match cli.command {
        Command::Gateway(args) => run_gateway(args).await,
        Command::Provider(args) => run_provider(args).await,
        Command::Serve(args) => match args.protocol {
            Protocol::Stream => serve::<StreamCodec>(args).await,
            Protocol::Http => serve::<HttpCodec>(args).await,
            Protocol::Websocket => serve::<WebSocketCodec>(args).await,
        },
        Command::Client(args) => match args.protocol {
            Protocol::Stream => run_client(&args, StreamCodec::new()).await,
            Protocol::Http => run_client(&args, HttpCodec::new()).await,
            Protocol::Websocket => run_client(&args, WebSocketCodec::client()).await,
        },
    }
}

#[cfg(feature = "metrics")]
fn install_metrics(addr: Option<std::net::SocketAddr>) -> wiregate::Result<()> {
    if let Some(addr) = addr {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;
        info!(%addr, "prometheus exporter listening");
    }
    Ok(())
}

#[cfg(not(feature = "metrics"))]
fn install_metrics(addr: Option<std::net::SocketAddr>) -> wiregate::Result<()> {
    if addr.is_some() {
        warn!("built without the metrics feature; --metrics-addr ignored");
    }
    Ok(())
}

async fn run_gateway(args: GatewayArgs) -> wiregate::Result<()> {
    let config = GatewayConfig::default()
        .with_inner_addr(args.inner_addr)
        .with_open_addr(args.open_addr)
        .with_heartbeat_interval(Duration::from_secs(args.heartbeat_secs));
    let bound = Gateway::new(config).bind().await?;
    info!(
        inner = %args.inner_addr,
        open = %args.open_addr,
        "gateway listening"
    );
    bound.run().await?;
    Ok(())
}

async fn run_provider(args: ProviderArgs) -> wiregate::Result<()> {
    let provider = Arc::new(user_provider(args.name.as_str()));
    let config = ServiceConfig::new(args.name, args.gateway);
    let token = CancellationToken::new();
    let conn = provider::connect(provider, &config, token.clone()).await?;
    tokio::select! {
        result = conn.join() => result?,
        _ = tokio::signal::ctrl_c() => {
            token.cancel();
        }
    }
    Ok(())
}

async fn serve<C>(args: ServeArgs) -> wiregate::Result<()>
where
    C: ProtocolCodec + Default,
    DefaultHandler: ConnectionHandler<C>,
{
    let name = args
        .name
        .unwrap_or_else(|| format!("{}-service", C::KIND));
    let config = ServiceConfig::new(name.as_str(), args.addr).with_max_connections(args.max_connections);
    let handler = Arc::new(DefaultHandler::new(name));
    Server::<C, _>::bind(config, handler).await?.run().await?;
    Ok(())
}

async fn run_client<C>(args: &ClientArgs, codec: C) -> wiregate::Result<()>
where
    C: ProtocolCodec,
    OneShot: ConnectionHandler<C>,
{
    let config = ServiceConfig::new("console-client", args.addr);
    let handler = Arc::new(OneShot::new(args.message.as_str()));
    let conn = client::connect(&config, codec, handler, CancellationToken::new()).await?;
    if let Err(err) = conn.join().await {
        warn!(error = %err, "connection ended with an error");
        return Err(err.into());
    }
    Ok(())
}
