//! RESP-speaking store client (Redis, SpinelDB and compatible servers).
//!
//! One TCP connection is opened lazily and reused; any I/O or protocol
//! failure drops it so the next call reconnects. The connection is taken
//! out of its slot for the whole request/reply exchange and only put back
//! once the reply has been read, so a caller cancelled mid-exchange leaves
//! no unread reply behind for the next caller.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::codec::{Decoder, Encoder, Framed};

use crate::cache::store::{KeyValueStore, StoreError};

const CRLF: &[u8] = b"\r\n";
const MAX_DEPTH: usize = 8;
const MAX_PREALLOC: usize = 64;

/// A decoded server reply.
#[derive(Debug, Clone, PartialEq)]
pub enum RespFrame {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    Null,
    Array(Vec<RespFrame>),
}

/// Encodes commands as arrays of bulk strings and decodes replies.
#[derive(Debug, Default)]
pub struct RespCodec;

impl Encoder<Vec<Bytes>> for RespCodec {
    type Error = StoreError;

    fn encode(&mut self, args: Vec<Bytes>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(format!("*{}\r\n", args.len()).as_bytes());
        for arg in args {
            dst.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
            dst.extend_from_slice(&arg);
            dst.extend_from_slice(CRLF);
        }
        Ok(())
    }
}

impl Decoder for RespCodec {
    type Item = RespFrame;
    type Error = StoreError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let mut cursor = &src[..];
        match parse_frame(&mut cursor, 0)? {
            Some(frame) => {
                let consumed = src.len() - cursor.len();
                src.advance(consumed);
                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }
}

/// Parse one frame, advancing `bytes`. `Ok(None)` means more data is needed.
fn parse_frame(bytes: &mut &[u8], depth: usize) -> Result<Option<RespFrame>, StoreError> {
    if depth > MAX_DEPTH {
        return Err(StoreError::Protocol("reply nested too deeply".into()));
    }
    let Some((&tag, rest)) = bytes.split_first() else {
        return Ok(None);
    };
    let Some(pos) = rest.windows(2).position(|w| w == CRLF) else {
        return Ok(None);
    };
    let line = String::from_utf8_lossy(&rest[..pos]).into_owned();
    let after_line = &rest[pos + 2..];

    let frame = match tag {
        b'+' => {
            *bytes = after_line;
            RespFrame::Simple(line)
        }
        b'-' => {
            *bytes = after_line;
            RespFrame::Error(line)
        }
        b':' => {
            *bytes = after_line;
            RespFrame::Integer(parse_len(&line)?)
        }
        b'$' => {
            let len = parse_len(&line)?;
            if len < 0 {
                *bytes = after_line;
                return Ok(Some(RespFrame::Null));
            }
            let len = usize::try_from(len)
                .map_err(|_| StoreError::Protocol(format!("bulk length {} out of range", len)))?;
            if after_line.len() < len.saturating_add(2) {
                return Ok(None);
            }
            if &after_line[len..len + 2] != CRLF {
                return Err(StoreError::Protocol("bulk string not terminated".into()));
            }
            let data = Bytes::copy_from_slice(&after_line[..len]);
            *bytes = &after_line[len + 2..];
            RespFrame::Bulk(data)
        }
        b'*' => {
            let len = parse_len(&line)?;
            if len < 0 {
                *bytes = after_line;
                return Ok(Some(RespFrame::Null));
            }
            let mut cursor = after_line;
            let mut items = Vec::with_capacity((len as usize).min(MAX_PREALLOC));
            for _ in 0..len {
                match parse_frame(&mut cursor, depth + 1)? {
                    Some(item) => items.push(item),
                    None => return Ok(None),
                }
            }
            *bytes = cursor;
            RespFrame::Array(items)
        }
        other => {
            return Err(StoreError::Protocol(format!(
                "unexpected reply type byte {:#04x}",
                other
            )))
        }
    };
    Ok(Some(frame))
}

fn parse_len(line: &str) -> Result<i64, StoreError> {
    line.parse()
        .map_err(|_| StoreError::Protocol(format!("invalid integer '{}'", line)))
}

/// Store client for a RESP server.
pub struct RedisStore {
    address: String,
    timeout: Duration,
    conn: Mutex<Option<Framed<TcpStream, RespCodec>>>,
}

impl RedisStore {
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
            conn: Mutex::new(None),
        }
    }

    async fn connect(&self) -> Result<Framed<TcpStream, RespCodec>, StoreError> {
        let stream = tokio::time::timeout(self.timeout, TcpStream::connect(&self.address))
            .await
            .map_err(|_| StoreError::Timeout(self.timeout.as_millis() as u64))??;
        stream.set_nodelay(true)?;
        tracing::info!(address = %self.address, "Connected to cache store");
        Ok(Framed::new(stream, RespCodec))
    }

    /// Send one command and wait for its reply.
    pub async fn command(&self, args: Vec<Bytes>) -> Result<RespFrame, StoreError> {
        let mut guard = self.conn.lock().await;
        let mut framed = match guard.take() {
            Some(framed) => framed,
            None => self.connect().await?,
        };

        let exchange = async {
            framed.send(args).await?;
            match framed.next().await {
                Some(reply) => reply,
                None => Err(StoreError::Protocol("connection closed by server".into())),
            }
        };

        let reply = match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result?,
            Err(_) => return Err(StoreError::Timeout(self.timeout.as_millis() as u64)),
        };

        // Reply consumed, the connection is in step again.
        *guard = Some(framed);
        match reply {
            RespFrame::Error(message) => Err(StoreError::Server(message)),
            frame => Ok(frame),
        }
    }
}

fn arg(value: impl Into<Bytes>) -> Bytes {
    value.into()
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        match self.command(vec![arg("GET"), arg(key.to_string())]).await? {
            RespFrame::Bulk(data) => Ok(Some(data)),
            RespFrame::Null => Ok(None),
            other => Err(StoreError::Protocol(format!("unexpected GET reply {:?}", other))),
        }
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), StoreError> {
        let secs = ttl.as_secs().max(1);
        self.command(vec![
            arg("SET"),
            arg(key.to_string()),
            value,
            arg("EX"),
            arg(secs.to_string()),
        ])
        .await?;
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut args = Vec::with_capacity(keys.len() + 1);
        args.push(arg("DEL"));
        args.extend(keys.iter().map(|k| arg(k.clone())));
        match self.command(args).await? {
            RespFrame::Integer(n) => Ok(n.max(0) as u64),
            other => Err(StoreError::Protocol(format!("unexpected DEL reply {:?}", other))),
        }
    }

    async fn flush_all(&self) -> Result<(), StoreError> {
        self.command(vec![arg("FLUSHDB")]).await?;
        Ok(())
    }
}
