//! Line-oriented TCP API
//!
//! Every line a client sends is queued as one command; the result comes back
//! as one line on the same connection.

use super::{ApiServer, CommandSender, CommandSource, InboundCommand, SubsystemError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

struct Running {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    accept_loop: JoinHandle<()>,
}

pub struct TcpApiServer {
    host: String,
    port: u16,
    commands: CommandSender,
    running: Mutex<Option<Running>>,
}

impl TcpApiServer {
    /// Port `0` binds an ephemeral port; see [`local_addr`](Self::local_addr)
    pub fn new(host: impl Into<String>, port: u16, commands: CommandSender) -> Self {
        Self {
            host: host.into(),
            port,
            commands,
            running: Mutex::new(None),
        }
    }

    /// Address the server is bound to while running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().as_ref().map(|r| r.local_addr)
    }
}

async fn accept_connections(
    listener: TcpListener,
    commands: CommandSender,
    mut shutdown: watch::Receiver<bool>,
) {
    // Dropping the set aborts open connections
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "API client connected");
                    connections.spawn(serve_connection(stream, commands.clone()));
                }
                Err(e) => warn!("API accept failed: {}", e),
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }
}

async fn serve_connection(stream: TcpStream, commands: CommandSender) {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let text = line.trim();
        if text.is_empty() {
            continue;
        }

        let (command, reply) = InboundCommand::new(text, CommandSource::Api).with_reply();
        if commands.send(command).await.is_err() {
            break;
        }

        let response = reply
            .await
            .unwrap_or_else(|_| "Sorry, the assistant is shutting down.".to_string());
        if write_half
            .write_all(format!("{}\n", response).as_bytes())
            .await
            .is_err()
        {
            break;
        }
    }
}

#[async_trait]
impl ApiServer for TcpApiServer {
    async fn start(&self) -> Result<(), SubsystemError> {
        if self.running.lock().is_some() {
            return Ok(());
        }

        let listener = TcpListener::bind((self.host.as_str(), self.port)).await?;
        let local_addr = listener.local_addr()?;
        let (shutdown, shutdown_rx) = watch::channel(false);
        let accept_loop = tokio::spawn(accept_connections(
            listener,
            self.commands.clone(),
            shutdown_rx,
        ));

        *self.running.lock() = Some(Running {
            local_addr,
            shutdown,
            accept_loop,
        });
        info!(%local_addr, "API server listening");
        Ok(())
    }

    async fn stop(&self) -> Result<(), SubsystemError> {
        let running = self.running.lock().take();
        let Some(running) = running else {
            return Ok(());
        };

        let _ = running.shutdown.send(true);
        if let Err(e) = running.accept_loop.await {
            if !e.is_cancelled() {
                return Err(SubsystemError::Io(format!("API accept loop panicked: {}", e)));
            }
        }
        info!("API server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_round_trip_over_tcp() {
        let (tx, mut rx) = mpsc::channel::<InboundCommand>(8);
        let server = TcpApiServer::new("127.0.0.1", 0, tx);
        server.start().await.unwrap();
        let addr = server.local_addr().expect("bound");

        // Answer every command with its upper-cased text
        let responder = tokio::spawn(async move {
            while let Some(cmd) = rx.recv().await {
                assert_eq!(cmd.source, CommandSource::Api);
                if let Some(reply) = cmd.reply {
                    let _ = reply.send(cmd.text.to_uppercase());
                }
            }
        });

        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        write_half.write_all(b"lights on\n\n").await.unwrap();
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("LIGHTS ON"));

        server.stop().await.unwrap();
        assert!(server.local_addr().is_none());
        drop(server);
        responder.abort();
    }

    #[tokio::test]
    async fn test_stop_without_start() {
        let (tx, _rx) = mpsc::channel(1);
        let server = TcpApiServer::new("127.0.0.1", 0, tx);
        server.stop().await.unwrap();
    }
}
