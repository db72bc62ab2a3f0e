//! TCP command server for operators

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info};
use memsync_core::Store;
use memsync_protocol::Response;

use crate::error::TransportResult;
use crate::handler::{CommandHandler, GOODBYE};
use crate::session::SessionRegistry;

/// TCP server speaking the operator command protocol
pub struct TcpServer {
    store: Arc<Store>,
    sessions: Arc<SessionRegistry>,
    client_counter: AtomicU64,
}

impl TcpServer {
    pub fn new(store: Arc<Store>, sessions: Arc<SessionRegistry>) -> Self {
        Self {
            store,
            sessions,
            client_counter: AtomicU64::new(0),
        }
    }

    /// Bind `addr` and serve until the task is dropped
    pub async fn run(&self, addr: SocketAddr) -> TransportResult<()> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %addr, "memsync command server listening");
        self.serve(listener).await
    }

    pub async fn serve(&self, listener: TcpListener) -> TransportResult<()> {
        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    let client_id = format!(
                        "tcp:{}:{}",
                        peer_addr,
                        self.client_counter.fetch_add(1, Ordering::Relaxed)
                    );
                    let handler =
                        CommandHandler::new(client_id.clone(), self.store.clone(), self.sessions.clone());

                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_connection(stream, handler).await {
                            error!(client = %client_id, error = %e, "Connection error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    async fn handle_connection(
        mut stream: TcpStream,
        mut handler: CommandHandler,
    ) -> TransportResult<()> {
        info!(client = %handler.client_id, "Client connected");
        let mut buf = vec![0u8; 4096];

        loop {
            let n = stream.read(&mut buf).await?;
            if n == 0 {
                info!(client = %handler.client_id, "Client disconnected");
                return Ok(());
            }

            for response in handler.process(&buf[..n]).await {
                stream.write_all(&response.encode()).await?;

                if matches!(response, Response::Ok(Some(ref msg)) if msg == GOODBYE) {
                    info!(client = %handler.client_id, "Client quit");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader};

    async fn start() -> (SocketAddr, Arc<Store>) {
        let store = Arc::new(Store::new());
        let server = TcpServer::new(store.clone(), Arc::new(SessionRegistry::new()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { server.serve(listener).await });
        (addr, store)
    }

    #[tokio::test]
    async fn test_tcp_ping_pong() {
        let (addr, _) = start().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(b"PING\r\n").await.unwrap();

        let mut reader = BufReader::new(&mut client);
        let mut response = String::new();
        reader.read_line(&mut response).await.unwrap();
        assert_eq!(response.trim(), "+PONG");
    }

    #[tokio::test]
    async fn test_set_reaches_store_and_quit_closes() {
        let (addr, store) = start().await;
        let client = TcpStream::connect(addr).await.unwrap();
        let mut reader = BufReader::new(client);

        reader.get_mut().write_all(b"SET test present\r\n").await.unwrap();
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        assert!(line.starts_with("+OK 1@"));
        assert_eq!(store.read("test").await, Some(bytes::Bytes::from("present")));

        reader.get_mut().write_all(b"QUIT\r\n").await.unwrap();
        line.clear();
        reader.read_line(&mut line).await.unwrap();
        assert_eq!(line.trim(), "+OK Goodbye");

        line.clear();
        assert_eq!(reader.read_line(&mut line).await.unwrap(), 0);
    }
}
