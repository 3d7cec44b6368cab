// WebSocket front door for draft sessions.
//
// Accepts connections, performs the handshake, requires a `hello` frame to
// authenticate, then pumps commands into the per-draft session actor and
// outgoing frames back onto the socket. No draft state lives here.

use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream, Stream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

use crate::protocol::{parse_command, ClientCommand, ErrorCode, ServerFrame};
use crate::session::{ConnId, SessionHandle, SessionManager};

/// Run the WebSocket server on `listener`, serving each connection on its
/// own task. Runs until the listener fails (or the task is cancelled).
pub async fn run(listener: TcpListener, manager: Arc<SessionManager>) -> anyhow::Result<()> {
    let local_addr = listener.local_addr()?;
    info!("WebSocket server listening on {local_addr}");

    loop {
        let (stream, addr) = listener.accept().await?;
        let addr_str = addr.to_string();
        debug!("Accepted TCP connection from {addr_str}");
        let manager = manager.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_connection(stream, &addr_str, manager).await {
                debug!("connection {addr_str} closed: {e}");
            }
        });
    }
}

/// Handshake + authenticate + pump one connection until it closes.
async fn serve_connection(
    stream: TcpStream,
    addr: &str,
    manager: Arc<SessionManager>,
) -> anyhow::Result<()> {
    let ws_stream = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake failed for {addr}: {e}");
            return Ok(());
        }
    };
    let (mut write, mut read) = ws_stream.split();

    // The first text frame must be a hello carrying draft id and token.
    let (handle, role) = match await_hello(&mut read, &manager, addr).await {
        Ok(Some(authenticated)) => authenticated,
        Ok(None) => return Ok(()),
        Err(frame) => {
            let _ = write.send(Message::Text(frame.to_json().into())).await;
            let _ = write.send(Message::Close(None)).await;
            return Ok(());
        }
    };

    let conn = manager.next_conn_id();
    let (frame_tx, frame_rx) = mpsc::channel::<ServerFrame>(64);

    info!(
        "connection {conn} ({addr}) attached to draft {} as {role:?}",
        handle.draft_id()
    );

    let writer = tokio::spawn(write_frames(frame_rx, write));

    handle.attach(conn, role, frame_tx).await;
    pump_commands(&mut read, &handle, conn, addr).await;
    handle.detach(conn).await;

    // Let the writer drain whatever the actor already queued (including a
    // session_replaced notice), then stop it.
    let _ = writer.await;
    info!("connection {conn} ({addr}) closed");
    Ok(())
}

/// Wait for the authenticating hello frame. `Ok(None)` means the socket
/// closed first; `Err(frame)` is a rejection to send before closing.
async fn await_hello<S>(
    read: &mut SplitStream<WebSocketStream<S>>,
    manager: &SessionManager,
    addr: &str,
) -> Result<Option<(SessionHandle, crate::session::Role)>, ServerFrame>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                return match parse_command(&text) {
                    Ok(ClientCommand::Hello { draft_id, token }) => {
                        match manager.authenticate(&draft_id, &token).await {
                            Some(authenticated) => Ok(Some(authenticated)),
                            None => Err(ServerFrame::error(
                                ErrorCode::Unauthorized,
                                "unknown draft or token",
                            )),
                        }
                    }
                    Ok(_) => Err(ServerFrame::error(
                        ErrorCode::BadMessage,
                        "expected a hello frame first",
                    )),
                    Err(e) => Err(ServerFrame::error(ErrorCode::BadMessage, e.to_string())),
                };
            }
            Ok(Message::Close(_)) => {
                debug!("client {addr} closed before hello");
                return Ok(None);
            }
            Err(e) => {
                warn!("WebSocket error from {addr} before hello: {e}");
                return Ok(None);
            }
            _ => {
                // Ignore Binary, Ping, Pong, Frame variants.
            }
        }
    }
    Ok(None)
}

/// Drain outgoing frames onto the socket. After delivering a
/// `session_replaced` notice the socket is closed: the connection is inert
/// and must not be serviced further.
async fn write_frames<S>(
    mut frame_rx: mpsc::Receiver<ServerFrame>,
    mut write: SplitSink<WebSocketStream<S>, Message>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(frame) = frame_rx.recv().await {
        let replaced = matches!(frame, ServerFrame::SessionReplaced { .. });
        if write
            .send(Message::Text(frame.to_json().into()))
            .await
            .is_err()
        {
            break;
        }
        if replaced {
            let _ = write.send(Message::Close(None)).await;
            break;
        }
    }
}

/// Forward incoming text frames as commands to the session actor until the
/// socket closes.
///
/// This function is generic over the stream type so it can be tested with
/// in-memory streams without opening TCP ports.
pub async fn pump_commands<St>(stream: &mut St, handle: &SessionHandle, conn: ConnId, addr: &str)
where
    St: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(msg_result) = stream.next().await {
        match msg_result {
            Ok(Message::Text(text)) => match parse_command(&text) {
                Ok(cmd) => handle.command(conn, cmd).await,
                Err(e) => {
                    debug!("bad frame from {addr}: {e}");
                    handle.invalid(conn, e.to_string()).await;
                }
            },
            Ok(Message::Close(_)) => {
                info!("client {addr} sent close frame");
                break;
            }
            Err(e) => {
                warn!("WebSocket error from {addr}: {e}");
                break;
            }
            _ => {
                // Ignore Binary, Ping, Pong, Frame variants.
            }
        }
    }
}
