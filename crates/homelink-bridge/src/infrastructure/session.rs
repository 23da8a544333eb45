//! Per-connection protocol state machine.
//!
//! Each accepted TCP connection runs one session through the phases
//!
//! ```text
//! Connecting → Authenticating (optional) → Syncing → Streaming → Closed
//! ```
//!
//! The handshake phases write directly on the socket. Once streaming begins
//! the session splits into two tasks:
//!
//! - a **reader** that splits the inbound byte stream on newlines, parses
//!   each line independently, and dispatches it (ping, command, errors);
//! - a **writer** that owns the write half and drains two queues: the
//!   session's broadcast sink (registered with the bus) and a small reply
//!   queue fed by the reader.
//!
//! The parent waits for either task — or the server-wide shutdown signal —
//! then aborts the other, which drops both socket halves and closes the
//! connection. Deregistration from the bus happens exactly once, after that
//! single join point, regardless of which path ended the session.
//!
//! # Error policy
//!
//! Malformed JSON is fatal only during the handshake; once streaming, the
//! session answers `error{bad_json}` and keeps going. Every transport-level
//! failure — reset, abort, broken pipe, EOF — is treated identically as
//! connection termination and logged at debug. Nothing a single client does
//! can reach past its own session.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tracing::{debug, error, info};
use uuid::Uuid;

use homelink_core::{encode_line, parse_line, BridgeMessage, ErrorCode, ProtocolError};

use crate::application::{CommandExecutor, EntitySnapshotProvider, InitialStateProvider};
use crate::domain::BridgeConfig;
use crate::infrastructure::broadcast::BroadcastBus;

/// Depth of the reply queue between reader and writer. Small on purpose: a
/// client flooding pings only backpressures itself.
const REPLY_QUEUE_DEPTH: usize = 16;

/// Everything a session needs, handed over by the listener.
pub(crate) struct SessionContext {
    pub config: Arc<BridgeConfig>,
    pub bus: Arc<BroadcastBus>,
    pub entities: Arc<dyn EntitySnapshotProvider>,
    pub commands: Arc<dyn CommandExecutor>,
    pub initial_state: Option<Arc<dyn InitialStateProvider>>,
    pub shutdown: watch::Receiver<bool>,
}

/// Entry point for the per-session task spawned by the accept loop.
///
/// Wraps [`run_session`] and logs the outcome, so the session body can use
/// `?` freely while errors stay contained here.
pub(crate) async fn handle_connection(stream: TcpStream, peer: SocketAddr, ctx: SessionContext) {
    match run_session(stream, peer, ctx).await {
        Ok(()) => info!("client disconnected: {peer}"),
        Err(e) => debug!("session {peer} closed with error: {e:#}"),
    }
}

/// Outcome of the authentication phase.
enum AuthOutcome {
    Accepted,
    Rejected,
}

/// Runs the complete lifecycle of one session.
async fn run_session(
    stream: TcpStream,
    peer: SocketAddr,
    mut ctx: SessionContext,
) -> anyhow::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    // ── Connecting: hello ─────────────────────────────────────────────────────
    let hello = BridgeMessage::hello(ctx.config.auth_enabled());
    send_direct(&mut write_half, &hello)
        .await
        .with_context(|| format!("session {peer}: hello failed"))?;

    // ── Authenticating (when a token is configured) ───────────────────────────
    if let Some(expected) = ctx.config.auth_token.clone() {
        let outcome = authenticate(&mut reader, &mut write_half, &expected, &ctx.config, peer)
            .await
            .with_context(|| format!("session {peer}: auth phase failed"))?;
        if matches!(outcome, AuthOutcome::Rejected) {
            return Ok(());
        }
    }

    // ── Syncing: entity list reflects the provider at handshake time ──────────
    let entities = ctx.entities.entities();
    send_direct(&mut write_half, &BridgeMessage::EntityList { entities })
        .await
        .with_context(|| format!("session {peer}: entity list failed"))?;

    let session_id = Uuid::new_v4();
    let bcast_rx = ctx.bus.register(session_id);

    // Initial-state replay. Best-effort: a failed write does not abort the
    // session (the read loop will notice a dead socket on its own), and
    // broadcasts arriving meanwhile queue up in the sink behind us, so
    // replayed events always reach the hub before live traffic.
    if let Some(provider) = ctx.initial_state.clone() {
        tokio::time::sleep(ctx.config.settle_delay).await;
        for event in provider.initial_states() {
            match encode_line(&event) {
                Ok(line) => {
                    let _ = write_half.write_all(line.as_bytes()).await;
                }
                Err(e) => error!("session {peer}: unencodable replay event: {e}"),
            }
        }
    }

    // ── Streaming ─────────────────────────────────────────────────────────────
    let (reply_tx, reply_rx) = mpsc::channel(REPLY_QUEUE_DEPTH);

    let mut writer_task = tokio::spawn(write_loop(write_half, bcast_rx, reply_rx, peer));
    let mut reader_task = tokio::spawn(read_loop(
        reader,
        reply_tx,
        Arc::clone(&ctx.commands),
        peer,
    ));

    // First terminal event wins: reader done (EOF / transport error), writer
    // done (write error / bus eviction), or server shutdown.
    tokio::select! {
        _ = ctx.shutdown.changed() => debug!("session {peer}: server shutdown"),
        _ = &mut writer_task => debug!("session {peer}: writer finished"),
        _ = &mut reader_task => debug!("session {peer}: reader finished"),
    }

    // Aborting drops the socket halves, which closes the connection.
    writer_task.abort();
    reader_task.abort();

    ctx.bus.deregister(&session_id);
    Ok(())
}

/// Authenticating phase: one line, bounded wait.
///
/// - timeout or EOF → silent close;
/// - malformed JSON → `error{bad_json}`, close (fatal during the handshake);
/// - anything but a matching `auth` → `error{unauthorized}`, close;
/// - matching token → `auth_ok`.
async fn authenticate(
    reader: &mut BufReader<OwnedReadHalf>,
    write_half: &mut OwnedWriteHalf,
    expected: &str,
    config: &BridgeConfig,
    peer: SocketAddr,
) -> anyhow::Result<AuthOutcome> {
    let mut buf = Vec::new();
    let read = match timeout(config.auth_timeout, reader.read_until(b'\n', &mut buf)).await {
        Err(_) => {
            debug!("session {peer}: no auth within {:?}", config.auth_timeout);
            return Ok(AuthOutcome::Rejected);
        }
        Ok(result) => result.context("auth read failed")?,
    };
    if read == 0 {
        debug!("session {peer}: closed before auth");
        return Ok(AuthOutcome::Rejected);
    }

    let line = String::from_utf8_lossy(&buf);
    match parse_line(&line) {
        Err(ProtocolError::Json(e)) => {
            debug!("session {peer}: malformed auth line: {e}");
            send_direct(write_half, &BridgeMessage::error(ErrorCode::BadJson)).await?;
            Ok(AuthOutcome::Rejected)
        }
        Ok(BridgeMessage::Auth { token }) if token == expected => {
            send_direct(write_half, &BridgeMessage::AuthOk).await?;
            Ok(AuthOutcome::Accepted)
        }
        _ => {
            debug!("session {peer}: rejected auth attempt");
            send_direct(write_half, &BridgeMessage::error(ErrorCode::Unauthorized)).await?;
            Ok(AuthOutcome::Rejected)
        }
    }
}

/// Writer task: owns the write half for the streaming phase, draining the
/// broadcast sink and the reader's reply queue. Ends on the first write
/// failure, on bus eviction (sink closed), or when the reader goes away.
async fn write_loop(
    mut write_half: OwnedWriteHalf,
    mut bcast_rx: mpsc::Receiver<String>,
    mut reply_rx: mpsc::Receiver<BridgeMessage>,
    peer: SocketAddr,
) {
    loop {
        tokio::select! {
            maybe = reply_rx.recv() => match maybe {
                Some(msg) => match encode_line(&msg) {
                    Ok(line) => {
                        if write_half.write_all(line.as_bytes()).await.is_err() {
                            debug!("session {peer}: reply write failed");
                            break;
                        }
                    }
                    Err(e) => error!("session {peer}: unencodable reply: {e}"),
                },
                None => break, // reader is gone; session is over
            },
            maybe = bcast_rx.recv() => match maybe {
                Some(line) => {
                    if write_half.write_all(line.as_bytes()).await.is_err() {
                        debug!("session {peer}: broadcast write failed");
                        break;
                    }
                }
                None => {
                    debug!("session {peer}: evicted from broadcast bus");
                    break;
                }
            },
        }
    }
}

/// Reader task: splits the stream on newlines and dispatches each complete
/// line independently. Ends on EOF or any transport error — all treated
/// identically as connection termination.
async fn read_loop(
    mut reader: BufReader<OwnedReadHalf>,
    reply_tx: mpsc::Sender<BridgeMessage>,
    commands: Arc<dyn CommandExecutor>,
    peer: SocketAddr,
) {
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => {
                debug!("session {peer}: end of stream");
                break;
            }
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                if line.trim().is_empty() {
                    continue;
                }
                if dispatch_line(&line, &reply_tx, &commands, peer).await.is_err() {
                    break; // writer is gone
                }
            }
            Err(e) => {
                debug!("session {peer}: read failed: {e}");
                break;
            }
        }
    }
}

/// Handles one complete inbound line during the streaming phase.
///
/// Returns `Err` only when the reply queue is closed, i.e. the writer task
/// has ended and the session is shutting down.
async fn dispatch_line(
    line: &str,
    reply_tx: &mpsc::Sender<BridgeMessage>,
    commands: &Arc<dyn CommandExecutor>,
    peer: SocketAddr,
) -> Result<(), ()> {
    match parse_line(line) {
        Ok(BridgeMessage::Ping) => reply(reply_tx, BridgeMessage::Pong).await,

        Ok(BridgeMessage::Command {
            entity_id,
            command,
            args,
        }) => {
            debug!("session {peer}: command {command} for {entity_id}");
            // Fire and forget: the next line must not wait for the platform.
            let executor = Arc::clone(commands);
            tokio::spawn(async move {
                if let Err(e) = executor.execute(&entity_id, &command, args).await {
                    debug!("session {peer}: command rejected by executor: {e}");
                }
            });
            Ok(())
        }

        // Permissive by design: unknown or out-of-place message kinds are
        // ignored so older bridges keep working with newer hubs.
        Ok(other) => {
            debug!("session {peer}: ignoring {} message", other.kind());
            Ok(())
        }

        Err(ProtocolError::Json(e)) => {
            debug!("session {peer}: bad JSON: {e}");
            reply(reply_tx, BridgeMessage::error(ErrorCode::BadJson)).await
        }

        Err(ProtocolError::BadCommand(reason)) => {
            debug!("session {peer}: bad command: {reason}");
            reply(reply_tx, BridgeMessage::error(ErrorCode::BadCommand)).await
        }
    }
}

async fn reply(reply_tx: &mpsc::Sender<BridgeMessage>, msg: BridgeMessage) -> Result<(), ()> {
    reply_tx.send(msg).await.map_err(|_| ())
}

/// Writes one message directly on the socket (handshake and replay phases,
/// before the writer task takes ownership of the write half).
async fn send_direct(
    write_half: &mut OwnedWriteHalf,
    msg: &BridgeMessage,
) -> anyhow::Result<()> {
    let line = encode_line(msg).context("encode failed")?;
    write_half
        .write_all(line.as_bytes())
        .await
        .context("write failed")?;
    Ok(())
}
