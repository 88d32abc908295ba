use hyper::body::Bytes;
use tokio::io::AsyncReadExt;

use crate::domain::{Connection, ProxyError, Result};

pub const MAX_HEAD_SIZE: usize = 64 * 1024;
const MAX_HEADERS: usize = 100;
const READ_CHUNK: usize = 4096;

/// Method and request target of the first request on a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    pub target: String,
}

impl RequestHead {
    pub fn is_connect(&self) -> bool {
        self.method.eq_ignore_ascii_case("CONNECT")
    }
}

/// Buffers the first request head of a connection without taking the bytes
/// away from whoever serves the connection afterwards.
pub struct HeadReader {
    conn: Connection,
    buf: Vec<u8>,
    head_len: usize,
}

impl HeadReader {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn,
            buf: Vec::with_capacity(READ_CHUNK),
            head_len: 0,
        }
    }

    pub async fn read_head(&mut self) -> Result<RequestHead> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(head) = self.parse()? {
                return Ok(head);
            }
            if self.buf.len() >= MAX_HEAD_SIZE {
                return Err(ProxyError::MalformedRequest(format!(
                    "request head exceeds {} bytes",
                    MAX_HEAD_SIZE
                )));
            }

            let want = READ_CHUNK.min(MAX_HEAD_SIZE - self.buf.len());
            let n = self.conn.read(&mut chunk[..want]).await?;
            if n == 0 {
                return Err(ProxyError::MalformedRequest(
                    "connection closed before end of request head".to_string(),
                ));
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    fn parse(&mut self) -> Result<Option<RequestHead>> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut headers);
        match req.parse(&self.buf) {
            Ok(httparse::Status::Complete(len)) => {
                let head = RequestHead {
                    method: req.method.unwrap_or_default().to_string(),
                    target: req.path.unwrap_or_default().to_string(),
                };
                self.head_len = len;
                Ok(Some(head))
            }
            Ok(httparse::Status::Partial) => Ok(None),
            Err(e) => Err(ProxyError::MalformedRequest(e.to_string())),
        }
    }

    /// Hand over the raw connection, replaying only the bytes that were read
    /// past the end of the head.
    pub fn detach(mut self) -> Connection {
        let rest = self.buf.split_off(self.head_len);
        self.conn.prefixed(Bytes::from(rest))
    }

    /// Hand over the raw connection with everything read so far, head included.
    pub fn into_replay(self) -> Connection {
        self.conn.prefixed(Bytes::from(self.buf))
    }
}
