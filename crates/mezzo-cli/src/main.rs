//! Mezzo demo binary.
//!
//! Three modes:
//!
//! ```bash
//! # Host a scripted signaling router over TCP
//! mezzo --listen 127.0.0.1:4500
//!
//! # Drive a full session against a signaling server, with the loopback
//! # engine standing in for a real media stack
//! mezzo --connect 127.0.0.1:4500 --kind video --simulcast 100000,300000,900000
//!
//! # No flags: run both ends in-process and replay the whole flow,
//! # including a server-pushed subscribe
//! mezzo
//! ```

use clap::{Parser, ValueEnum};
use mezzo_client::{
    MediaKind, PublishOptions, Session, SessionConfig, SessionError, SessionEvents,
    SignalingConnection, TcpSignaling,
};
use mezzo_harness::{
    LoopbackEngine, LoopbackSource, SimRouter, SimServer, SimServerConfig, memory_link,
    serve_tcp, shared_router,
};
use tokio::net::TcpListener;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
    Video,
    Audio,
}

impl From<KindArg> for MediaKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Video => Self::Video,
            KindArg::Audio => Self::Audio,
        }
    }
}

/// Mezzo session client demo
#[derive(Parser, Debug)]
#[command(name = "mezzo")]
#[command(about = "Drive a Mezzo signaling session with a loopback engine")]
#[command(version)]
struct Args {
    /// Host a scripted signaling router on this address
    #[arg(long, conflicts_with = "connect")]
    listen: Option<String>,

    /// Connect to a signaling server at this address
    #[arg(long)]
    connect: Option<String>,

    /// Media kind to publish
    #[arg(long, value_enum, default_value_t = KindArg::Video)]
    kind: KindArg,

    /// Simulcast bitrate ceilings, low to high (e.g. 100000,300000,900000)
    #[arg(long, value_delimiter = ',')]
    simulcast: Vec<u32>,

    /// Restrict ICE to TCP candidates
    #[arg(long)]
    force_tcp: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn session_config(&self) -> SessionConfig {
        SessionConfig { force_tcp: self.force_tcp, ..SessionConfig::default() }
    }

    fn publish_options(&self) -> PublishOptions {
        PublishOptions {
            simulcast: if self.simulcast.is_empty() { None } else { Some(self.simulcast.clone()) },
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    if let Some(address) = args.listen.clone() {
        let listener = TcpListener::bind(&address).await?;
        tracing::info!(%address, "signaling router listening");
        serve_tcp(listener, shared_router(SimRouter::new())).await?;
        return Ok(());
    }

    if let Some(address) = args.connect.clone() {
        tracing::info!(%address, "connecting to signaling server");
        let conn = TcpSignaling::connect(address.as_str()).await?;
        let (session, events) = start_session(conn, &args);
        run_flow(&session, events, &args, None).await?;
        return Ok(());
    }

    // In-process demo: both ends in one process.
    tracing::info!("running in-process demo");
    let (client_end, server_end) = memory_link();
    let server =
        SimServer::spawn(server_end, shared_router(SimRouter::new()), SimServerConfig::default());

    let (session, events) = start_session(client_end, &args);
    run_flow(&session, events, &args, Some(server)).await?;
    Ok(())
}

fn start_session<C: SignalingConnection>(
    conn: C,
    args: &Args,
) -> (Session<LoopbackEngine, LoopbackSource>, SessionEvents) {
    Session::start(conn, LoopbackEngine::new(), LoopbackSource::new(), args.session_config())
}

async fn run_flow(
    session: &Session<LoopbackEngine, LoopbackSource>,
    mut events: SessionEvents,
    args: &Args,
    server: Option<SimServer>,
) -> Result<(), SessionError> {
    session.connect().await?;
    tracing::info!("capabilities negotiated");

    let producer = session.publish_with(args.kind.into(), args.publish_options()).await?;
    tracing::info!(id = %producer.id(), kind = %producer.kind(), "published");

    let consumer = session.subscribe().await?;
    tracing::info!(
        id = %consumer.id(),
        tracks = consumer.stream().tracks().len(),
        "subscribed"
    );

    // With the in-process router we can also demonstrate the push path:
    // the server announces a producer and the session subscribes itself.
    if let Some(server) = server {
        let _ = events.streams.try_recv(); // drain the manual subscribe's stream
        server.push_new_producer().await;
        if let Some(stream) = events.streams.recv().await {
            tracing::info!(tracks = stream.tracks().len(), "push-triggered stream arrived");
        }
    }

    let status = events.status.borrow().clone();
    tracing::info!(?status, "final status");

    session.close().await;
    Ok(())
}
