//! Line-oriented TCP front-end and sweep driver.
//!
//! Each connected session gets its own task reading newline-terminated
//! commands and writing responses. A background task runs the match sweep
//! on a fixed interval and pushes trade prints into a broadcast channel;
//! every session task forwards the feed to its socket. A session that lags
//! behind the feed capacity skips the dropped prints and keeps going, so a
//! slow receiver never blocks the sweep.

use crate::config::{AppConfig, MatchingConfig};
use crate::engine::Engine;
use crate::order::{ClientId, Side};
use crate::protocol::{self, Command};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Bind the configured listen address and serve trading sessions until the
/// cancellation token fires.
pub async fn start(
    cfg: &AppConfig,
    engine: Arc<Engine>,
    cancellation_token: CancellationToken,
) -> Result<(), Error> {
    let listener = TcpListener::bind((cfg.server.host.as_str(), cfg.server.port)).await?;
    info!(addr = %listener.local_addr()?, "trading server listening");
    serve(listener, cfg.matching, engine, cancellation_token).await
}

/// Accept loop over an already-bound listener. Split out from [`start`] so
/// tests can bind an ephemeral port.
async fn serve(
    listener: TcpListener,
    cfg: MatchingConfig,
    engine: Arc<Engine>,
    cancellation_token: CancellationToken,
) -> Result<(), Error> {
    let (feed, _) = broadcast::channel(cfg.feed_capacity);

    let sweeper = tokio::spawn(sweep_loop(
        Arc::clone(&engine),
        feed.clone(),
        Duration::from_millis(cfg.sweep_interval_ms),
        cancellation_token.clone(),
    ));

    let mut next_client_id: ClientId = 0;
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((socket, peer)) => {
                        next_client_id += 1;
                        let client_id = next_client_id;
                        info!(client_id, %peer, "session connected");
                        tokio::spawn(session(
                            socket,
                            client_id,
                            Arc::clone(&engine),
                            feed.subscribe(),
                            cancellation_token.clone(),
                        ));
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                }
            }
            _ = cancellation_token.cancelled() => break,
        }
    }

    let _ = sweeper.await;
    info!("trading server stopped");
    Ok(())
}

/// Periodic match-sweep driver. Submissions never match inline; crossing
/// orders rest until the next tick.
async fn sweep_loop(
    engine: Arc<Engine>,
    feed: broadcast::Sender<String>,
    interval: Duration,
    cancellation_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let trades = engine.match_sweep();
                if trades.is_empty() {
                    continue;
                }
                debug!(trades = trades.len(), "sweep produced trades");
                for trade in &trades {
                    // Send only fails when no session is connected; the
                    // prints are not retained for future sessions.
                    let _ = feed.send(protocol::trade_print(trade));
                }
            }
            _ = cancellation_token.cancelled() => break,
        }
    }
}

async fn session(
    socket: TcpStream,
    client_id: ClientId,
    engine: Arc<Engine>,
    feed: broadcast::Receiver<String>,
    cancellation_token: CancellationToken,
) {
    if let Err(e) = drive_session(socket, client_id, &engine, feed, cancellation_token).await {
        debug!(client_id, error = %e, "session transport error");
    }
    // Resting orders deliberately outlive their session; only the
    // connection state goes away here.
    info!(client_id, "session disconnected");
}

async fn drive_session(
    socket: TcpStream,
    client_id: ClientId,
    engine: &Engine,
    mut feed: broadcast::Receiver<String>,
    cancellation_token: CancellationToken,
) -> io::Result<()> {
    let (read_half, mut write_half) = socket.into_split();
    let mut lines = BufReader::new(read_half).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    return Ok(());
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let reply = dispatch(line, client_id, engine);
                write_half.write_all(reply.as_bytes()).await?;
                write_half.write_all(b"\n").await?;
            }
            print = feed.recv() => {
                match print {
                    Ok(message) => {
                        write_half.write_all(message.as_bytes()).await?;
                        write_half.write_all(b"\n").await?;
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(client_id, missed, "session lagged behind the trade feed");
                    }
                    // The feed only closes on shutdown.
                    Err(broadcast::error::RecvError::Closed) => return Ok(()),
                }
            }
            _ = cancellation_token.cancelled() => return Ok(()),
        }
    }
}

/// Parse one command line and execute it against the engine, producing the
/// response line. Errors are reported to this session only; the book is
/// unchanged by any rejected command.
fn dispatch(line: &str, client_id: ClientId, engine: &Engine) -> String {
    let command = match Command::parse(line) {
        Ok(command) => command,
        Err(e) => return protocol::error_line(&e),
    };

    match command {
        Command::Buy { quantity, price } => {
            match engine.submit(Side::Bid, quantity, price, client_id) {
                Ok(id) => {
                    info!(client_id, order_id = id, %price, quantity, "bid accepted");
                    protocol::order_accepted(id)
                }
                Err(e) => protocol::error_line(&e),
            }
        }
        Command::Sell { quantity, price } => {
            match engine.submit(Side::Ask, quantity, price, client_id) {
                Ok(id) => {
                    info!(client_id, order_id = id, %price, quantity, "ask accepted");
                    protocol::order_accepted(id)
                }
                Err(e) => protocol::error_line(&e),
            }
        }
        Command::Cancel { id } => match engine.cancel(id) {
            Ok(()) => {
                info!(client_id, order_id = id, "order canceled");
                protocol::cancel_accepted(id)
            }
            Err(e) => protocol::error_line(&e),
        },
        Command::Status => protocol::status_line(&engine.status()),
    }
}
