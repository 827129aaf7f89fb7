use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use crate::{BackendResult, KvBackend};
use crate::engine::MemStore;
use crate::engine::scan::SCAN_PAGE_SIZE;
use crate::server::{decode_arg, decode_text_arg, encode_arg};
use log::{info, error};
use tokio::sync::Semaphore;

/// Largest page a single `SCAN` may ask for.
pub const MAX_SCAN_COUNT: usize = 1024;

/// Serves a [`MemStore`] over the line protocol.
pub struct Router {
    backend: Arc<MemStore>,
    semaphore: Arc<Semaphore>,
}

impl Router {
    pub fn new(backend: Arc<MemStore>) -> Self {
        Self {
            backend,
            semaphore: Arc::new(Semaphore::new(100)),
        }
    }

    pub async fn listen(&self, port: &str) -> BackendResult<()> {
        let listener = TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
        info!("Celerix Objects listening on port {}", port);
        self.serve(listener).await
    }

    /// Accepts connections on an already bound listener until accepting fails.
    pub async fn serve(&self, listener: TcpListener) -> BackendResult<()> {
        loop {
            let (socket, _) = listener.accept().await?;
            let backend = self.backend.clone();
            let sem = self.semaphore.clone();

            tokio::spawn(async move {
                let _permit = match sem.try_acquire() {
                    Ok(p) => p,
                    Err(_) => {
                        error!("Server busy: too many concurrent connections. Rejecting...");
                        let mut socket = socket;
                        let _ = socket.shutdown().await;
                        return;
                    }
                };

                if let Err(e) = handle_connection(socket, backend).await {
                    error!("Connection error: {}", e);
                }
            });
        }
    }
}

fn err_response(e: impl std::fmt::Display) -> String {
    format!("ERR {}", e.to_string().to_lowercase())
}

pub async fn handle_connection(mut socket: TcpStream, backend: Arc<MemStore>) -> BackendResult<()> {
    let (reader, mut writer) = socket.split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            break;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }

        let command = parts[0].to_uppercase();
        let response = match command.as_str() {
            "SET" => {
                if parts.len() < 3 {
                    "ERR missing arguments".to_string()
                } else {
                    match (decode_text_arg(parts[1]), decode_arg(parts[2])) {
                        (Some(key), Some(value)) => match backend.set(&key, value).await {
                            Ok(_) => "OK".to_string(),
                            Err(e) => err_response(e),
                        },
                        _ => "ERR invalid argument encoding".to_string(),
                    }
                }
            }
            "GET" => {
                if parts.len() < 2 {
                    "ERR missing arguments".to_string()
                } else {
                    match decode_text_arg(parts[1]) {
                        Some(key) => match backend.get(&key).await {
                            Ok(Some(value)) => format!("OK {}", encode_arg(&value)),
                            Ok(None) => "NIL".to_string(),
                            Err(e) => err_response(e),
                        },
                        None => "ERR invalid argument encoding".to_string(),
                    }
                }
            }
            "DEL" => {
                if parts.len() < 2 {
                    "ERR missing arguments".to_string()
                } else {
                    match decode_text_arg(parts[1]) {
                        Some(key) => match backend.delete(&key).await {
                            Ok(_) => "OK".to_string(),
                            Err(e) => err_response(e),
                        },
                        None => "ERR invalid argument encoding".to_string(),
                    }
                }
            }
            "SCAN" => {
                if parts.len() < 3 {
                    "ERR missing arguments".to_string()
                } else {
                    let count = parts[1].parse::<usize>().ok().map(|c| {
                        if c == 0 { SCAN_PAGE_SIZE } else { c.min(MAX_SCAN_COUNT) }
                    });
                    let prefix = decode_text_arg(parts[2]);
                    let after = match parts.get(3) {
                        Some(arg) => decode_text_arg(arg).map(Some),
                        None => Some(None),
                    };
                    match (count, prefix, after) {
                        (Some(count), Some(prefix), Some(after)) => {
                            match backend.scan_page(&prefix, after.as_deref(), count) {
                                Ok(page) => format!("OK {}", serde_json::to_string(&page)?),
                                Err(e) => err_response(e),
                            }
                        }
                        _ => "ERR invalid argument encoding".to_string(),
                    }
                }
            }
            "PING" => "PONG".to_string(),
            "QUIT" => break,
            _ => "ERR unknown command".to_string(),
        };

        writer.write_all(format!("{}\n", response).as_bytes()).await?;
    }
    Ok(())
}
