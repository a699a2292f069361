//! Unix socket server answering highlight requests.

use std::io;
use std::path::{Path, PathBuf};

use notify::event::ModifyKind;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::protocol::{Response, DELIMITER};

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("{}: socket already exists", .0.display())]
    SocketExists(PathBuf),

    #[error("failed to bind {}: {source}", path.display())]
    Bind { path: PathBuf, source: io::Error },

    #[error("failed to signal {}: {source}", path.display())]
    Ready { path: PathBuf, source: io::Error },

    #[error("failed to watch {}: {source}", path.display())]
    Watch {
        path: PathBuf,
        source: notify::Error,
    },

    #[error("failed to accept connection: {0}")]
    Accept(#[source] io::Error),

    #[error("unexpected EOF before null terminator")]
    UnexpectedEof,

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A bound highlighting server. The socket file is removed when the server
/// is dropped.
///
/// Removal of the socket is watched from `bind` on, so a supervisor may
/// delete it as soon as readiness has been signalled.
pub struct Server {
    listener: UnixListener,
    socket: PathBuf,
    _watcher: RecommendedWatcher,
    removed: mpsc::UnboundedReceiver<()>,
}

impl Server {
    /// Bind a listening socket at `socket`.
    ///
    /// Refuses to start if anything already exists at that path: a stale
    /// socket may still belong to a live server.
    pub fn bind(socket: impl Into<PathBuf>) -> Result<Self, ServerError> {
        let socket = socket.into();
        if std::fs::symlink_metadata(&socket).is_ok() {
            return Err(ServerError::SocketExists(socket));
        }

        let (watcher, removed) = watch_removal(&socket)?;
        let listener = UnixListener::bind(&socket).map_err(|source| ServerError::Bind {
            path: socket.clone(),
            source,
        })?;
        info!("listening on {}", socket.display());

        Ok(Self {
            listener,
            socket,
            _watcher: watcher,
            removed,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket
    }

    /// Serve connections until the socket file is removed.
    ///
    /// Each connection gets its own task and is answered strictly in order;
    /// separate connections proceed in parallel.
    pub async fn run(mut self) -> Result<(), ServerError> {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, _) = accepted.map_err(ServerError::Accept)?;
                    tokio::spawn(async move {
                        if let Err(err) = serve_connection(stream).await {
                            warn!("connection closed: {err}");
                        }
                    });
                }
                Some(()) = self.removed.recv() => {
                    info!("{} removed, shutting down", self.socket.display());
                    return Ok(());
                }
            }
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        remove_socket(&self.socket);
    }
}

/// Remove the socket file, tolerating it already being gone.
pub fn remove_socket(socket: &Path) {
    match std::fs::remove_file(socket) {
        Ok(()) => debug!("removed {}", socket.display()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => warn!("failed to remove {}: {err}", socket.display()),
    }
}

/// Tell a waiting supervisor that the server is ready by opening `fifo` for
/// writing and closing it again.
pub async fn signal_ready(fifo: &Path) -> Result<(), ServerError> {
    info!("signaling {}", fifo.display());
    tokio::fs::OpenOptions::new()
        .write(true)
        .open(fifo)
        .await
        .map(drop)
        .map_err(|source| ServerError::Ready {
            path: fifo.to_path_buf(),
            source,
        })
}

/// Watch the socket's directory and report once the socket is gone.
fn watch_removal(
    socket: &Path,
) -> Result<(RecommendedWatcher, mpsc::UnboundedReceiver<()>), ServerError> {
    let dir = match socket.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let name = socket.file_name().map(|n| n.to_os_string());
    let target = socket.to_path_buf();

    let (tx, rx) = mpsc::unbounded_channel();
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| {
            let Ok(event) = res else { return };
            let relevant = matches!(
                event.kind,
                EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_))
            );
            let touches_socket = event
                .paths
                .iter()
                .any(|p| p.file_name() == name.as_deref());
            if relevant && touches_socket && std::fs::symlink_metadata(&target).is_err() {
                let _ = tx.send(());
            }
        },
        notify::Config::default(),
    )
    .map_err(|source| ServerError::Watch {
        path: dir.clone(),
        source,
    })?;

    watcher
        .watch(&dir, RecursiveMode::NonRecursive)
        .map_err(|source| ServerError::Watch {
            path: dir.clone(),
            source,
        })?;

    Ok((watcher, rx))
}

/// Answer requests on one connection until the peer hangs up.
async fn serve_connection(stream: UnixStream) -> Result<(), ServerError> {
    let (read, write) = stream.into_split();
    let mut reader = BufReader::new(read);
    let mut writer = BufWriter::new(write);
    let mut frame = Vec::new();

    loop {
        frame.clear();
        if reader.read_until(DELIMITER, &mut frame).await? == 0 {
            return Ok(());
        }
        if frame.pop() != Some(DELIMITER) {
            return Err(ServerError::UnexpectedEof);
        }

        let response = respond(std::mem::take(&mut frame)).await;
        writer.write_all(&response.encode()).await?;
        writer.flush().await?;
    }
}

async fn respond(frame: Vec<u8>) -> Response {
    let handled = tokio::task::spawn_blocking(move || crate::handle_request(&frame)).await;
    match handled {
        Ok(Ok(html)) => Response::Html(html),
        Ok(Err(err)) => {
            debug!("request failed: {err}");
            Response::Error(err.to_string())
        }
        Err(err) => Response::Error(format!("highlighter task failed: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_refuses_existing_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taken.sock");
        std::fs::write(&path, b"").unwrap();

        let err = Server::bind(&path).err().expect("bind should fail");
        assert!(matches!(err, ServerError::SocketExists(_)));
        assert!(err.to_string().contains("socket already exists"));
        // The blocking file is left untouched.
        assert!(path.is_file());
    }

    #[tokio::test]
    async fn drop_removes_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hl.sock");

        let server = Server::bind(&path).unwrap();
        assert!(std::fs::symlink_metadata(&path).is_ok());
        drop(server);
        assert!(std::fs::symlink_metadata(&path).is_err());
    }

    #[tokio::test]
    async fn removal_right_after_ready_is_noticed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hl.sock");
        let ready = dir.path().join("ready");
        std::fs::write(&ready, b"").unwrap();

        let server = Server::bind(&path).unwrap();
        signal_ready(&ready).await.unwrap();
        std::fs::remove_file(&path).unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(3), server.run())
            .await
            .expect("server should stop after its socket is removed")
            .unwrap();
    }

    #[tokio::test]
    async fn signal_ready_opens_and_closes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ready");
        std::fs::write(&path, b"").unwrap();
        signal_ready(&path).await.unwrap();

        let missing = dir.path().join("missing");
        assert!(matches!(
            signal_ready(&missing).await,
            Err(ServerError::Ready { .. })
        ));
    }
}
