use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::ServerConfig;
use crate::context::ServerContext;
use crate::handlers::build_router;
use crate::protocol::frame::{read_frame, write_frame};
use crate::protocol::handshake::write_banner;
use crate::protocol::ProtocolError;
use crate::router::Router;
use crate::session::Session;

pub async fn run(config: ServerConfig, shutdown: CancellationToken) -> anyhow::Result<()> {
    config.ensure_directories()?;
    let addr = config.listen_addr()?;
    let listener = TcpListener::bind(addr).await?;
    info!("Server listening on {}", addr);
    info!("Storage directory: {:?}", config.storage_dir);

    serve(listener, ServerContext::new(config), shutdown).await
}

/// Accept until `shutdown` fires, then wait for every connection to finish
/// its cleanup.
pub async fn serve(
    listener: TcpListener,
    ctx: ServerContext,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let router = Arc::new(build_router());
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((socket, peer)) => {
                    info!("New connection from {}", peer);
                    let ctx = ctx.clone();
                    let router = Arc::clone(&router);
                    let shutdown = shutdown.clone();
                    connections.spawn(async move {
                        let mut socket = socket;
                        match serve_connection(&mut socket, &ctx, &router, &shutdown).await {
                            Ok(()) => info!("Session completed for {}", peer),
                            Err(e) => error!("Session error for {}: {}", peer, e),
                        }
                    });
                }
                Err(e) => error!("Failed to accept connection: {}", e),
            },
            Some(joined) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = joined {
                    error!("Connection task failed: {}", e);
                }
            }
        }
    }

    info!("Shutting down, waiting for {} connection(s)", connections.len());
    while let Some(joined) = connections.join_next().await {
        if let Err(e) = joined {
            error!("Connection task failed: {}", e);
        }
    }
    info!("Server stopped");
    Ok(())
}

/// Drive one connection to completion. Session state is released on every
/// exit path, including cancellation and transport errors.
pub async fn serve_connection<S>(
    stream: &mut S,
    ctx: &ServerContext,
    router: &Router,
    shutdown: &CancellationToken,
) -> Result<(), ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut session = Session::new();
    let result = connection_loop(stream, ctx, router, shutdown, &mut session).await;
    session.cleanup().await;
    result
}

async fn connection_loop<S>(
    stream: &mut S,
    ctx: &ServerContext,
    router: &Router,
    shutdown: &CancellationToken,
    session: &mut Session,
) -> Result<(), ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    write_banner(stream).await?;

    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("Connection stopping on shutdown");
                return Ok(());
            }
            frame = read_frame(stream) => frame,
        };

        let payload = match frame {
            Ok(payload) => payload,
            Err(ProtocolError::ConnectionClosed) => return Ok(()),
            Err(e) => return Err(e),
        };

        let reply = router.handle(ctx, session, &payload).await;
        write_frame(stream, &reply).await?;
    }
}
