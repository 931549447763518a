//! TCP control server
//!
//! Accepts loopback connections and serves the line protocol, one task per
//! connection. Commands are executed on the blocking pool because a driver
//! call may sit on the I2C bus while holding the radio lock.

use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::constants::{CONTROL_BACKLOG, MAX_COMMAND_LEN};
use crate::control::protocol::{parse_line, Rejection, Reply};
use crate::control::state::RadioController;
use crate::error::ControlError;

/// Listening control endpoint bound to a radio controller
pub struct ControlServer {
    listener: TcpListener,
    controller: Arc<RadioController>,
}

impl ControlServer {
    /// Bind with `SO_REUSEADDR`; must be called inside a tokio runtime
    pub async fn bind(addr: SocketAddr, controller: Arc<RadioController>) -> Result<Self, ControlError> {
        let listener = listen(addr).map_err(|e| ControlError::BindFailed(format!("{addr}: {e}")))?;
        Ok(Self {
            listener,
            controller,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn controller(&self) -> &Arc<RadioController> {
        &self.controller
    }

    /// Serve until `shutdown` flips to true (or its sender is dropped)
    ///
    /// Waits for every connection task to finish before returning.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut connections = JoinSet::new();

        if let Ok(addr) = self.local_addr() {
            tracing::info!("control server listening on {}", addr);
        }

        while !*shutdown.borrow() {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tracing::debug!(%peer, "control connection opened");
                        let controller = self.controller.clone();
                        let shutdown = shutdown.clone();
                        connections.spawn(async move {
                            if let Err(e) = serve_connection(stream, controller, shutdown).await {
                                tracing::debug!(%peer, "control connection ended: {}", e);
                            }
                            tracing::debug!(%peer, "control connection closed");
                        });
                    }
                    Err(e) => {
                        tracing::warn!("Accept failed: {}", e);
                    }
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        tracing::info!("control server shutting down");
        drop(self.listener);
        while connections.join_next().await.is_some() {}
    }
}

fn listen(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(CONTROL_BACKLOG)?;
    socket.set_nonblocking(true)?;
    TcpListener::from_std(socket.into())
}

/// Read commands until the peer hangs up or shutdown is signalled
///
/// At most `MAX_COMMAND_LEN + 1` bytes of a line are buffered. A longer line
/// is answered with `ERR unknown` as soon as the limit is hit and the rest of
/// it is skipped.
async fn serve_connection(
    stream: TcpStream,
    controller: Arc<RadioController>,
    mut shutdown: watch::Receiver<bool>,
) -> io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(MAX_COMMAND_LEN + 1);

    loop {
        buf.clear();
        let mut limited = (&mut reader).take(MAX_COMMAND_LEN as u64 + 1);
        let n = tokio::select! {
            _ = shutdown.changed() => break,
            n = limited.read_until(b'\n', &mut buf) => n?,
        };
        if n == 0 {
            break;
        }

        if buf.len() > MAX_COMMAND_LEN {
            writer.write_all(Reply::Error(Rejection::Unknown).to_line().as_bytes()).await?;
            if buf.last() != Some(&b'\n') {
                let found_end = tokio::select! {
                    _ = shutdown.changed() => break,
                    found = skip_line(&mut reader) => found?,
                };
                if !found_end {
                    break;
                }
            }
            continue;
        }

        let line = String::from_utf8_lossy(&buf);
        let reply = match parse_line(&line) {
            None => None,
            Some(Err(reason)) => Some(Reply::Error(reason)),
            Some(Ok(command)) => {
                let controller = controller.clone();
                let reply = tokio::task::spawn_blocking(move || controller.execute(command))
                    .await
                    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
                Some(reply)
            }
        };

        if let Some(reply) = reply {
            tracing::trace!(command = %line.trim_end(), %reply, "control command");
            writer.write_all(reply.to_line().as_bytes()).await?;
        }
    }

    Ok(())
}

/// Consume input through the next newline without buffering it
///
/// Returns `false` if the peer closed the connection first.
async fn skip_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> io::Result<bool> {
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(false);
        }
        match available.iter().position(|&b| b == b'\n') {
            Some(end) => {
                reader.consume(end + 1);
                return Ok(true);
            }
            None => {
                let n = available.len();
                reader.consume(n);
            }
        }
    }
}
