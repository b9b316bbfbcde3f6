//! tdlink CLI - log in to an engine session from the console.
//!
//! Connects to an engine over the length-prefixed TCP transport, drives the
//! login handshake with the selected authorizer and closes the session.

mod interactor;
mod parameters;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Map;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tdlink_core::auth::{
    self, client_authorizer, qr_authorizer, AuthorizationStateHandler, BotAuthorizer,
};
use tdlink_core::transport::TcpTransport;
use tdlink_core::{Client, Object};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "tdlink")]
#[command(about = "Log in to an engine session")]
struct Args {
    /// Engine address
    #[arg(long, default_value = "127.0.0.1:7010")]
    addr: SocketAddr,

    /// JSON file with the startup parameters
    #[arg(short, long)]
    params: Option<PathBuf>,

    /// Log in as a bot with this token
    #[arg(long, env = "TDLINK_BOT_TOKEN", conflicts_with = "qr")]
    bot_token: Option<String>,

    /// Log in by confirming a link on another device
    #[arg(long)]
    qr: bool,

    /// Only resume an existing session, never prompt
    #[arg(long, conflicts_with_all = ["bot_token", "qr"])]
    resume: bool,

    /// Route the engine through a SOCKS5 proxy, as [user:password@]host:port
    #[arg(long)]
    socks5: Option<String>,

    /// Seconds to wait for the engine to confirm Closed
    #[arg(long, default_value = "10")]
    close_timeout: u64,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let parameters = match &args.params {
        Some(path) => parameters::load(path).await?,
        None => Map::new(),
    };

    let proxy = args.socks5.as_deref().map(parameters::socks5).transpose()?;

    info!("Connecting to {}", args.addr);
    let (transport, inbound, diagnostics) = TcpTransport::connect(args.addr).await?;
    let mut builder = Client::builder(parameters).with_diagnostics(diagnostics);
    if let Some(proxy) = proxy {
        builder = builder.with_proxy(proxy);
    }
    let client = builder.start(Arc::new(transport), inbound)?;
    client.on_result(|object| {
        if let Object::UpdateConnectionState(update) = object {
            debug!("Connection state: {:?}", update.state);
        }
    });

    tokio::select! {
        result = login(&client, &args) => result?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, closing session");
        }
    }

    info!(
        "Admission rate: {:.2} requests/s",
        client.rate_limiter().current_rate()
    );

    if !client.is_closed() {
        client.close().await.context("Failed to close session")?;
        if tokio::time::timeout(Duration::from_secs(args.close_timeout), client.closed())
            .await
            .is_err()
        {
            warn!("Engine did not confirm close, shutting down locally");
            client.shutdown();
        }
    }
    info!("Session closed");

    Ok(())
}

async fn login(client: &Client, args: &Args) -> Result<()> {
    if args.resume {
        auth::authorize(client).await?;
        info!("Session resumed");
        return Ok(());
    }

    if let Some(token) = &args.bot_token {
        let mut bot = BotAuthorizer::new(token.as_str());
        auth::authorize_with(client, &mut bot).await?;
    } else if args.qr {
        let (mut authorizer, password) = qr_authorizer(interactor::show_link);
        let prompts = tokio::spawn(interactor::drive_password(
            client.authorization_updates(),
            password,
        ));
        let result = auth::authorize_with(client, &mut authorizer).await;
        authorizer.close();
        prompts.abort();
        result?;
    } else {
        let (mut authorizer, inputs) = client_authorizer();
        let prompts = tokio::spawn(interactor::drive(inputs));
        let result = auth::authorize_with(client, &mut authorizer).await;
        authorizer.close();
        prompts.abort();
        result?;
    }

    info!("Logged in");
    Ok(())
}
