//! HTTP polling transport for a second-generation hub.
//!
//! The Hub2 has no streaming interface: commands are submitted as HTTP
//! POSTs and received traffic sits in a fixed buffer exposed by
//! `GET /buffstatus.xml`. This adapter turns that request/poll surface into
//! the same duplex stream the serial and TCP channels provide:
//!
//! - `write` hands the command bytes to a submit task that issues
//!   `POST /3?<hex>=I=3`
//! - `read` is backed by an in-memory pipe fed by a ticker task that polls
//!   `buffstatus.xml` every 500 ms, pushes whatever the hub buffered, and
//!   clears the hub buffer with `POST /1?XB=M=1`
//!
//! The ticker starts lazily on the first read and both tasks stop when the
//! transport is shut down or dropped.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::error::{InsteonError, Result};

/// How often the hub buffer is polled.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Offset of the buffer-length byte in the decoded `<BS>` payload.
///
/// The byte holds the valid length in nibbles; the byte length is half
/// that. The offset is empirical but stable across firmware revisions.
const BUFFER_LENGTH_OFFSET: usize = 100;

/// Capacity of the in-memory pipe between the ticker and `read`.
const PIPE_CAPACITY: usize = 4096;

struct HubEndpoint {
    client: reqwest::Client,
    address: String,
    username: String,
    password: String,
}

impl HubEndpoint {
    async fn get(&self, uri: &str) -> Result<String> {
        let rsp = self
            .client
            .get(format!("{}{}", self.address, uri))
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?
            .error_for_status()?;
        Ok(rsp.text().await?)
    }

    async fn post(&self, uri: &str) -> Result<()> {
        self.client
            .post(format!("{}{}", self.address, uri))
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Duplex adapter over the Hub2 REST endpoints.
pub struct HttpTransport {
    reader: DuplexStream,
    submit_tx: mpsc::UnboundedSender<Vec<u8>>,
    /// Consumed when the ticker is started on first read.
    ticker_seed: Option<(Arc<HubEndpoint>, DuplexStream)>,
    ticker: Option<JoinHandle<()>>,
    submit_task: JoinHandle<()>,
}

impl HttpTransport {
    /// Create a transport for the hub at `address` (scheme, host and port,
    /// e.g. `http://192.168.1.5:25105`) with HTTP Basic credentials.
    pub fn new(
        address: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let endpoint = Arc::new(HubEndpoint {
            client: reqwest::Client::new(),
            address: address.into(),
            username: username.into(),
            password: password.into(),
        });

        let (submit_tx, submit_rx) = mpsc::unbounded_channel();
        let submit_task = tokio::spawn(submit_loop(endpoint.clone(), submit_rx));

        let (reader, pipe) = tokio::io::duplex(PIPE_CAPACITY);

        Self {
            reader,
            submit_tx,
            ticker_seed: Some((endpoint, pipe)),
            ticker: None,
            submit_task,
        }
    }
}

impl AsyncRead for HttpTransport {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if let Some((endpoint, pipe)) = self.ticker_seed.take() {
            self.ticker = Some(tokio::spawn(poll_loop(endpoint, pipe)));
        }
        Pin::new(&mut self.reader).poll_read(cx, buf)
    }
}

impl AsyncWrite for HttpTransport {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.submit_tx.send(buf.to_vec()) {
            Ok(()) => Poll::Ready(Ok(buf.len())),
            Err(_) => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "hub submit task stopped",
            ))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
        self.ticker_seed = None;
        self.submit_task.abort();
        Poll::Ready(Ok(()))
    }
}

impl Drop for HttpTransport {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
        self.submit_task.abort();
    }
}

/// Forward queued commands to the hub, one POST per command.
async fn submit_loop(endpoint: Arc<HubEndpoint>, mut rx: mpsc::UnboundedReceiver<Vec<u8>>) {
    while let Some(cmd) = rx.recv().await {
        trace!(bytes = cmd.len(), "submitting command to hub");
        if let Err(err) = endpoint.post(&command_uri(&cmd)).await {
            warn!(%err, "hub command submit failed");
            return;
        }
    }
}

/// Poll the hub buffer and feed the pipe until either side goes away.
async fn poll_loop(endpoint: Arc<HubEndpoint>, mut pipe: DuplexStream) {
    let mut tick = tokio::time::interval(POLL_INTERVAL);
    loop {
        tick.tick().await;

        let body = match endpoint.get("/buffstatus.xml").await {
            Ok(body) => body,
            Err(err) => {
                warn!(%err, "hub buffer poll failed");
                return;
            }
        };
        let bytes = match parse_buffer_status(&body) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(%err, "hub buffer status unreadable");
                return;
            }
        };
        if bytes.is_empty() {
            continue;
        }

        debug!(bytes = bytes.len(), "drained hub buffer");
        if pipe.write_all(&bytes).await.is_err() {
            // Reader side is gone; the transport was closed.
            return;
        }
        if let Err(err) = endpoint.post("/1?XB=M=1").await {
            warn!(%err, "hub buffer clear failed");
            return;
        }
    }
}

/// URI for submitting a raw PLM command.
fn command_uri(cmd: &[u8]) -> String {
    format!("/3?{}=I=3", hex::encode_upper(cmd))
}

/// Extract the buffered PLM bytes from a `buffstatus.xml` body.
///
/// The `<BS>` element hex-decodes to the raw hub buffer; the byte at offset
/// 100 holds the valid length in nibbles. A length claim past the end of
/// the decoded payload is silently truncated.
fn parse_buffer_status(body: &str) -> Result<Vec<u8>> {
    let start = body
        .find("<BS>")
        .ok_or_else(|| InsteonError::BufferStatus("missing <BS> element".into()))?
        + "<BS>".len();
    let end = body[start..]
        .find("</BS>")
        .ok_or_else(|| InsteonError::BufferStatus("unterminated <BS> element".into()))?;

    let decoded = hex::decode(body[start..start + end].trim())
        .map_err(|err| InsteonError::BufferStatus(format!("bad hex payload: {err}")))?;

    if decoded.len() <= BUFFER_LENGTH_OFFSET {
        return Err(InsteonError::BufferStatus(format!(
            "payload too short: {} bytes",
            decoded.len()
        )));
    }

    let len = (usize::from(decoded[BUFFER_LENGTH_OFFSET]) / 2).min(decoded.len());
    Ok(decoded[..len].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffstatus_body(buffer: &[u8], nibbles: u8) -> String {
        let mut raw = vec![0u8; 202];
        raw[..buffer.len()].copy_from_slice(buffer);
        raw[BUFFER_LENGTH_OFFSET] = nibbles;
        format!(
            "<response><BS>{}</BS></response>",
            hex::encode_upper(&raw)
        )
    }

    #[test]
    fn command_uri_is_uppercase_hex() {
        assert_eq!(command_uri(&[0x02, 0x6D]), "/3?026D=I=3");
        assert_eq!(
            command_uri(&[0x02, 0x62, 0x01, 0x02, 0x03, 0x0F, 0x11, 0xFF]),
            "/3?02620102030F11FF=I=3"
        );
    }

    #[test]
    fn buffer_status_uses_nibble_length_at_offset_100() {
        let body = buffstatus_body(&[0x02, 0x6D, 0x06, 0xAA, 0xBB], 6);
        let bytes = parse_buffer_status(&body).unwrap();
        // 6 nibbles = 3 bytes; trailing garbage ignored.
        assert_eq!(bytes, vec![0x02, 0x6D, 0x06]);
    }

    #[test]
    fn buffer_status_empty_buffer() {
        let body = buffstatus_body(&[], 0);
        assert!(parse_buffer_status(&body).unwrap().is_empty());
    }

    #[test]
    fn buffer_status_truncates_oversized_length_claim() {
        let body = buffstatus_body(&[0x01; 10], 0xFF);
        let bytes = parse_buffer_status(&body).unwrap();
        assert_eq!(bytes.len(), 127);
    }

    #[test]
    fn buffer_status_rejects_missing_element() {
        assert!(matches!(
            parse_buffer_status("<response></response>"),
            Err(InsteonError::BufferStatus(_))
        ));
    }

    #[test]
    fn buffer_status_rejects_bad_hex() {
        assert!(matches!(
            parse_buffer_status("<response><BS>zz</BS></response>"),
            Err(InsteonError::BufferStatus(_))
        ));
    }

    #[test]
    fn buffer_status_rejects_short_payload() {
        let body = format!("<response><BS>{}</BS></response>", hex::encode([0u8; 50]));
        assert!(matches!(
            parse_buffer_status(&body),
            Err(InsteonError::BufferStatus(_))
        ));
    }
}
