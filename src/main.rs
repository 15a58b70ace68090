//! `streamwire` command line tool.
//!
//! `serve` answers every request with its own path and body; `request` sends
//! one request to such a server and prints the reply.

mod cli;

use std::{sync::Arc, time::Duration};

use clap::Parser;
use cli::{Cli, Command, ConnectionArgs};
use streamwire::{
    BoxError,
    ProtocolAdapter,
    ProtocolConfig,
    ReceiveRequest,
    StreamTransport,
    StreamingRequest,
    StreamingResponse,
};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{error, info};

async fn echo(request: ReceiveRequest) -> Result<StreamingResponse, BoxError> {
    let path = request.path().to_owned();
    let body = request.read_body_as_string().await?.unwrap_or_default();
    Ok(StreamingResponse::ok().with_text_body(format!("{path} {body}")))
}

fn protocol_config(args: &ConnectionArgs) -> ProtocolConfig {
    ProtocolConfig::default()
        .max_payload_length(args.max_payload)
        .request_timeout(args.timeout_ms.map(Duration::from_millis))
}

async fn serve(listen: std::net::SocketAddr, config: ProtocolConfig) -> Result<(), BoxError> {
    let listener = TcpListener::bind(listen).await?;
    info!(address = %listener.local_addr()?, "listening");
    let shutdown = CancellationToken::new();
    let connections = TaskTracker::new();
    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => accepted?,
            _ = tokio::signal::ctrl_c() => break,
        };
        let adapter = ProtocolAdapter::new(echo, config);
        match adapter.connect(Arc::new(StreamTransport::new(stream))) {
            Ok(_) => {
                info!(%peer, "accepted connection");
                connections.spawn(connection(adapter, shutdown.clone()));
            }
            Err(err) => error!(%peer, error = %err, "failed to start connection"),
        }
    }

    info!(open = connections.len(), "shutting down");
    shutdown.cancel();
    connections.close();
    connections.wait().await;
    Ok(())
}

async fn connection(adapter: ProtocolAdapter, shutdown: CancellationToken) {
    tokio::select! {
        () = adapter.closed() => return,
        () = shutdown.cancelled() => {}
    }
    adapter.disconnect();
    adapter.closed().await;
}

async fn request(
    connect: std::net::SocketAddr,
    request: StreamingRequest,
    config: ProtocolConfig,
) -> Result<(), BoxError> {
    let stream = TcpStream::connect(connect).await?;
    let adapter = ProtocolAdapter::new(
        |_request: ReceiveRequest| async { Ok::<_, BoxError>(StreamingResponse::not_found()) },
        config,
    );
    adapter.connect(Arc::new(StreamTransport::new(stream)))?;

    let response = adapter
        .send_request(&request, &CancellationToken::new())
        .await?;
    let status = response.status_code();
    let body = response.read_body_as_string().await?;
    println!("{status} {}", body.unwrap_or_default());

    adapter.disconnect();
    adapter.closed().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = protocol_config(&cli.connection);
    match cli.command {
        Command::Serve { listen } => serve(listen, config).await,
        Command::Request {
            connect,
            verb,
            path,
            body,
        } => {
            let mut outgoing = StreamingRequest::new(verb, path);
            if let Some(body) = body {
                outgoing = outgoing.with_text_body(body);
            }
            request(connect, outgoing, config).await
        }
    }
}
