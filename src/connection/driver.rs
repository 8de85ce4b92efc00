//! Connection task: socket I/O, commands and reconnects.
//!
//! One task owns the [`FeedConnection`] and the socket. It multiplexes three
//! kinds of work with `tokio::select!`:
//!
//! ```text
//! Publisher ── mpsc::Sender<Command> ──┐
//!                                      ├─► Connection Task ─► TcpStream
//! TcpStream (read half) ───────────────┘          │
//!                                                 └─► watch::Sender<ConnectionStatus>
//! ```
//!
//! Writes run after `select!` has returned, so a frame is never cancelled
//! halfway. The task only ends when the publisher asks it to or drops its
//! side of the command channel; every transport or protocol error leads to
//! a reset and, after `reconnect_timeout`, a new connection.

use std::future::Future;
use std::path::PathBuf;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tracing::Instrument;

use super::{ConnectionStatus, FeedConnection};
use crate::config::FeedConfig;
use crate::error::{FeedError, Result};

/// Socket read size.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Most transmit units written before the loop looks at the socket again.
const MAX_BATCH_SIZE: usize = 64;

/// Work handed from the publisher to the connection task.
#[derive(Debug)]
pub(crate) enum Command {
    /// Encoded PUBLISH frame.
    Publish(Bytes),
    /// File to stream on the file channel.
    SendFile(PathBuf),
    /// Close the socket and stop.
    Shutdown,
}

/// One wakeup of the session loop.
enum Event {
    Read(std::io::Result<usize>),
    Command(Option<Command>),
    Transmit,
}

/// Why a session ended.
enum SessionEnd {
    Shutdown,
    Lost(FeedError),
}

/// Run the connection task until shutdown.
pub(crate) async fn run(
    config: FeedConfig,
    commands: mpsc::Receiver<Command>,
    status: watch::Sender<ConnectionStatus>,
) {
    let span = tracing::info_span!(
        "hpfeeds",
        server = %config.server,
        port = config.port,
        ident = %config.ident
    );
    drive(config, commands, status).instrument(span).await
}

async fn drive(
    config: FeedConfig,
    mut commands: mpsc::Receiver<Command>,
    status: watch::Sender<ConnectionStatus>,
) {
    let mut conn = FeedConnection::new(&config);
    let mut first_attempt = true;

    loop {
        if !first_attempt {
            tracing::debug!(delay = ?config.reconnect_timeout, "reconnect scheduled");
            let delay = tokio::time::sleep(config.reconnect_timeout);
            if serve_commands_until(&mut conn, &mut commands, &status, delay)
                .await
                .is_none()
            {
                break;
            }
        }
        first_attempt = false;

        if let Err(e) = conn.begin_connect() {
            tracing::error!("{}", e);
            conn.reset_connection_state();
            continue;
        }
        publish_status(&status, &conn);

        let connect = TcpStream::connect(config.address());
        let stream = match serve_commands_until(&mut conn, &mut commands, &status, connect).await {
            None => break,
            Some(Ok(stream)) => stream,
            Some(Err(e)) => {
                tracing::warn!("connection to {} failed: {}", config.address(), e);
                conn.reset_connection_state();
                publish_status(&status, &conn);
                continue;
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("unable to set TCP_NODELAY: {}", e);
        }
        if let Err(e) = conn.on_established() {
            tracing::error!("{}", e);
            conn.reset_connection_state();
            continue;
        }
        tracing::info!("connected to {}", config.address());

        let (reader, writer) = stream.into_split();
        match session(&mut conn, reader, writer, &mut commands, &status).await {
            SessionEnd::Shutdown => break,
            SessionEnd::Lost(FeedError::ConnectionClosed) => {
                tracing::info!("connection closed by broker");
            }
            SessionEnd::Lost(e @ FeedError::ProtocolViolation(_)) => {
                tracing::error!("dropping connection: {}", e);
            }
            SessionEnd::Lost(e) => {
                tracing::warn!("connection lost: {}", e);
            }
        }
        conn.reset_connection_state();
        publish_status(&status, &conn);
    }

    conn.reset_connection_state();
    publish_status(&status, &conn);
    tracing::debug!("connection task stopped");
}

/// Keep accepting commands while `fut` is pending.
///
/// Returns `None` if shutdown was requested before `fut` completed.
async fn serve_commands_until<F: Future>(
    conn: &mut FeedConnection,
    commands: &mut mpsc::Receiver<Command>,
    status: &watch::Sender<ConnectionStatus>,
    fut: F,
) -> Option<F::Output> {
    tokio::pin!(fut);
    loop {
        tokio::select! {
            output = &mut fut => return Some(output),
            command = commands.recv() => {
                match command {
                    None | Some(Command::Shutdown) => return None,
                    Some(command) => apply(conn, command).await,
                }
                publish_status(status, conn);
            }
        }
    }
}

/// Serve one established connection until it breaks or shutdown is requested.
async fn session<R, W>(
    conn: &mut FeedConnection,
    mut reader: R,
    mut writer: W,
    commands: &mut mpsc::Receiver<Command>,
    status: &watch::Sender<ConnectionStatus>,
) -> SessionEnd
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        publish_status(status, conn);

        let event = tokio::select! {
            read = reader.read(&mut buf) => Event::Read(read),
            command = commands.recv() => Event::Command(command),
            _ = std::future::ready(()), if conn.has_transmit() => Event::Transmit,
        };

        let step = match event {
            Event::Read(Ok(0)) => Err(FeedError::ConnectionClosed),
            Event::Read(Ok(n)) => conn.handle_inbound(&buf[..n]),
            Event::Read(Err(e)) => Err(FeedError::Io(e)),
            Event::Command(None | Some(Command::Shutdown)) => {
                if let Err(e) = writer.shutdown().await {
                    tracing::debug!("error closing socket: {}", e);
                }
                return SessionEnd::Shutdown;
            }
            Event::Command(Some(command)) => {
                apply(conn, command).await;
                Ok(())
            }
            Event::Transmit => write_ready(conn, &mut writer).await,
        };

        if let Err(e) = step {
            return SessionEnd::Lost(e);
        }
    }
}

/// Write up to [`MAX_BATCH_SIZE`] transmit units, then flush.
async fn write_ready<W: AsyncWrite + Unpin>(
    conn: &mut FeedConnection,
    writer: &mut W,
) -> Result<()> {
    for _ in 0..MAX_BATCH_SIZE {
        let Some(bytes) = conn.next_transmit().await? else {
            break;
        };
        writer.write_all(&bytes).await?;
        conn.record_written(bytes.len());
    }
    writer.flush().await?;
    Ok(())
}

async fn apply(conn: &mut FeedConnection, command: Command) {
    match command {
        Command::Publish(frame) => conn.publish_frame(frame),
        Command::SendFile(path) => {
            if let Err(e) = conn.send_file(path).await {
                tracing::warn!("unable to send file: {}", e);
            }
        }
        Command::Shutdown => {}
    }
}

fn publish_status(status: &watch::Sender<ConnectionStatus>, conn: &FeedConnection) {
    let current = conn.status();
    status.send_if_modified(|seen| {
        if *seen == current {
            return false;
        }
        *seen = current;
        true
    });
}
