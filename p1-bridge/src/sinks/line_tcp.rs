use std::{io, time::Duration};

use tokio::{io::AsyncWriteExt, net::TcpStream, sync::Mutex};

use crate::sinks::{SinkClient, SinkError};

/// Line protocol over a plain TCP socket (Telegraf `socket_listener`,
/// QuestDB ILP and similar).
///
/// The connection is opened lazily and dropped after a failed write; the next
/// attempt reconnects. A successful write only means the bytes were handed to
/// the socket, the receiver sends no acknowledgement.
///
/// Connecting and writing are each bounded by `timeout`; a stalled receiver
/// fails the write with `TimedOut` instead of holding the connection forever.
pub struct LineTcpClient {
    addr: String,
    timeout: Duration,
    stream: Mutex<Option<TcpStream>>,
}

impl LineTcpClient {
    pub fn new(host: &str, port: u16, timeout: Duration) -> Self {
        Self {
            addr: format!("{host}:{port}"),
            timeout,
            stream: Mutex::new(None),
        }
    }

    async fn connect(&self) -> Result<TcpStream, SinkError> {
        let stream = tokio::time::timeout(self.timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| timed_out("connect", self.timeout))??;
        let _ = stream.set_nodelay(true);
        tracing::info!(addr = %self.addr, "connected to line protocol listener");
        Ok(stream)
    }
}

#[async_trait::async_trait]
impl SinkClient for LineTcpClient {
    async fn write_lines(&self, payload: String) -> Result<(), SinkError> {
        let mut guard = self.stream.lock().await;
        let mut stream = match guard.take() {
            Some(stream) => stream,
            None => self.connect().await?,
        };

        let write = async {
            stream.write_all(payload.as_bytes()).await?;
            stream.flush().await
        };
        let res = match tokio::time::timeout(self.timeout, write).await {
            Ok(res) => res,
            Err(_) => Err(timed_out("write", self.timeout)),
        };

        match res {
            Ok(()) => {
                *guard = Some(stream);
                Ok(())
            }
            Err(e) => {
                tracing::debug!(error = %e, addr = %self.addr, "dropping line protocol connection");
                Err(SinkError::Io(e))
            }
        }
    }
}

fn timed_out(op: &str, after: Duration) -> io::Error {
    io::Error::new(
        io::ErrorKind::TimedOut,
        format!("line protocol {op} timed out after {after:?}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn client_for(addr: std::net::SocketAddr, timeout: Duration) -> LineTcpClient {
        LineTcpClient::new(&addr.ip().to_string(), addr.port(), timeout)
    }

    #[tokio::test]
    async fn writes_payload_over_one_connection() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = String::new();
            socket.read_to_string(&mut received).await.unwrap();
            received
        });

        let client = client_for(addr, Duration::from_secs(5));
        client.write_lines("a f=1 1\n".to_string()).await.unwrap();
        client.write_lines("a f=2 2\n".to_string()).await.unwrap();
        drop(client);

        assert_eq!(server.await.unwrap(), "a f=1 1\na f=2 2\n");
    }

    #[tokio::test]
    async fn connection_refused_is_an_io_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = client_for(addr, Duration::from_secs(5));
        let err = client.write_lines("a f=1 1\n".to_string()).await.unwrap_err();
        assert!(matches!(err, SinkError::Io(_)));
    }

    #[tokio::test]
    async fn stalled_receiver_times_out_and_drops_the_connection() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accepts and keeps the socket open without ever reading from it.
        let _server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(60)).await;
            drop(socket);
        });

        let client = client_for(addr, Duration::from_millis(200));
        let payload = "a".repeat(32 * 1024 * 1024);

        let res = tokio::time::timeout(Duration::from_secs(10), client.write_lines(payload))
            .await
            .expect("write must not outlive its own timeout");

        match res {
            Err(SinkError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::TimedOut),
            other => panic!("expected a timed out write, got {other:?}"),
        }
        assert!(client.stream.lock().await.is_none());
    }
}
