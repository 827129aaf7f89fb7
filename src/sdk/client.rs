use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio::net::TcpStream;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use crate::{BackendResult, BackendError, KvBackend};
use crate::engine::scan::{self, ScanPage, SCAN_PAGE_SIZE};
use crate::server::{decode_arg, encode_arg};
use tokio::sync::Mutex;

/// Remote key-value backend speaking the daemon's line protocol.
///
/// Connects lazily. A command that fails or is cancelled mid-flight drops the connection;
/// the command is never resent and the next call reconnects.
pub struct Client {
    addr: String,
    inner: Mutex<Option<ClientInner>>,
}

struct ClientInner {
    reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    writer: tokio::net::tcp::OwnedWriteHalf,
}

impl Client {
    pub async fn connect(addr: &str) -> BackendResult<Self> {
        let inner = Client::connect_inner(addr).await?;
        Ok(Self {
            addr: addr.to_string(),
            inner: Mutex::new(Some(inner)),
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub async fn ping(&self) -> BackendResult<()> {
        match self.send_and_receive("PING".to_string()).await?.as_str() {
            "PONG" => Ok(()),
            other => Err(BackendError::Protocol(format!("unexpected reply to PING: {}", other))),
        }
    }

    async fn send_and_receive(&self, cmd: String) -> BackendResult<String> {
        let mut inner_guard = self.inner.lock().await;

        // Checked out for the round trip: if this future is dropped before the reply line
        // is read, the half-used connection goes with it and the next call reconnects.
        let mut inner = match inner_guard.take() {
            Some(inner) => inner,
            None => Client::connect_inner(&self.addr).await?,
        };

        inner.writer.write_all(format!("{}\n", cmd).as_bytes()).await?;

        let mut resp = String::new();
        if inner.reader.read_line(&mut resp).await? == 0 {
            return Err(BackendError::Closed);
        }
        *inner_guard = Some(inner);

        let resp = resp.trim();
        if let Some(msg) = resp.strip_prefix("ERR") {
            return Err(BackendError::Remote(msg.trim().to_string()));
        }
        Ok(resp.to_string())
    }

    async fn connect_inner(addr: &str) -> BackendResult<ClientInner> {
        let stream = TcpStream::connect(addr).await?;
        let (reader, writer) = stream.into_split();
        Ok(ClientInner {
            reader: BufReader::new(reader),
            writer,
        })
    }

    async fn expect_ok(&self, cmd: String) -> BackendResult<()> {
        let resp = self.send_and_receive(cmd).await?;
        if resp == "OK" {
            Ok(())
        } else {
            Err(BackendError::Protocol(format!("invalid response: {}", resp)))
        }
    }

    /// Fetches one page of keys with `prefix` after the `after` cursor.
    pub async fn scan_page(
        &self,
        prefix: &str,
        after: Option<&str>,
        count: usize,
    ) -> BackendResult<ScanPage> {
        let mut cmd = format!("SCAN {} {}", count, encode_arg(prefix.as_bytes()));
        if let Some(after) = after {
            cmd.push(' ');
            cmd.push_str(&encode_arg(after.as_bytes()));
        }
        let resp = self.send_and_receive(cmd).await?;
        let json_data = resp
            .strip_prefix("OK ")
            .ok_or_else(|| BackendError::Protocol(format!("invalid response: {}", resp)))?;
        Ok(serde_json::from_str(json_data)?)
    }
}

#[async_trait]
impl KvBackend for Client {
    async fn set(&self, key: &str, value: Vec<u8>) -> BackendResult<()> {
        self.expect_ok(format!("SET {} {}", encode_arg(key.as_bytes()), encode_arg(&value))).await
    }

    async fn get(&self, key: &str) -> BackendResult<Option<Vec<u8>>> {
        let resp = self.send_and_receive(format!("GET {}", encode_arg(key.as_bytes()))).await?;
        if resp == "NIL" {
            return Ok(None);
        }
        resp.strip_prefix("OK ")
            .and_then(decode_arg)
            .map(Some)
            .ok_or_else(|| BackendError::Protocol(format!("invalid response: {}", resp)))
    }

    async fn delete(&self, key: &str) -> BackendResult<()> {
        self.expect_ok(format!("DEL {}", encode_arg(key.as_bytes()))).await
    }

    fn scan_prefix<'a>(&'a self, prefix: &str) -> BoxStream<'a, BackendResult<String>> {
        scan::paged(prefix, move |prefix, after| async move {
            self.scan_page(&prefix, after.as_deref(), SCAN_PAGE_SIZE).await
        })
    }
}
