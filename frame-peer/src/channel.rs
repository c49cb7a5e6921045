//! The request/response loop over one framed connection.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt},
    net::TcpStream,
};
use tokio_util::{codec::Framed, sync::CancellationToken};

use crate::codec::{Frame, FrameCodec};
use crate::config::InvalidUtf8;
use crate::error::ChannelError;

/// Knobs of the receive side and the loop.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelOptions {
    pub max_frame_length: Option<usize>,
    pub reply_timeout: Option<Duration>,
    pub on_invalid_utf8: InvalidUtf8,
}

/// Why a run ended.
#[derive(Debug)]
pub enum Termination {
    /// The peer closed its side on a frame boundary.
    PeerClosed,
    /// The cancellation token fired.
    Interrupted,
    Failed(ChannelError),
}

impl Termination {
    pub fn is_graceful(&self) -> bool {
        !matches!(self, Termination::Failed(_))
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::PeerClosed => write!(f, "No response from server. Closing connection."),
            Termination::Interrupted => write!(f, "Stopped by user."),
            Termination::Failed(e) if e.is_connection_lost() => {
                write!(f, "Connection failed or was reset by server: {e}")
            }
            Termination::Failed(e) => write!(f, "{e}"),
        }
    }
}

#[derive(Debug)]
pub struct RunReport {
    /// Completed send/receive pairs.
    pub exchanges: u64,
    pub termination: Termination,
}

/// Owns one byte stream and speaks the length-prefixed protocol over it.
///
/// Sending and receiving both need `&mut self`, so at most one operation is
/// ever outstanding on the connection.
pub struct FramedChannel<S> {
    framed: Framed<S, FrameCodec>,
    options: ChannelOptions,
}

impl FramedChannel<TcpStream> {
    pub async fn connect(host: &str, port: u16, options: ChannelOptions) -> Result<Self, ChannelError> {
        let addr = format!("{host}:{port}");
        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|source| ChannelError::ConnectionFailure {
                addr: addr.clone(),
                source,
            })?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("cannot set TCP_NODELAY on {addr}: {e}");
        }
        tracing::info!("Connected to server {addr}.");
        Ok(FramedChannel::new(stream, options))
    }
}

impl<S> FramedChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, options: ChannelOptions) -> Self {
        let codec = match options.max_frame_length {
            Some(max) => FrameCodec::with_max_frame_length(max),
            None => FrameCodec::new(),
        };
        FramedChannel {
            framed: Framed::new(stream, codec),
            options,
        }
    }

    /// Writes `length ‖ payload` as one buffer and flushes it.
    pub async fn send_frame(&mut self, payload: impl Into<Bytes>) -> Result<u32, ChannelError> {
        let frame = Frame::new(payload).map_err(ChannelError::StreamWriteFailure)?;
        let len = frame.len();
        self.framed
            .send(frame)
            .await
            .map_err(ChannelError::StreamWriteFailure)?;
        Ok(len)
    }

    /// Waits for one complete frame. `Ok(None)` means the peer closed the
    /// stream cleanly before sending a new length prefix.
    pub async fn receive_frame(&mut self) -> Result<Option<Frame>, ChannelError> {
        let next = match self.options.reply_timeout {
            Some(limit) => tokio::time::timeout(limit, self.framed.next())
                .await
                .map_err(|_| ChannelError::ReplyTimeout(limit))?,
            None => self.framed.next().await,
        };
        match next {
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(e)) => Err(ChannelError::StreamReadFailure(e)),
            None => Ok(None),
        }
    }

    /// Shuts down the write side and drops the stream.
    pub async fn close(self) {
        let mut stream = self.framed.into_inner();
        if let Err(e) = stream.shutdown().await {
            tracing::debug!("shutdown after run: {e}");
        }
    }

    /// Sends `message`, waits for the reply, pauses for `interval` and
    /// repeats until a failure, a clean close by the peer, or `cancel`.
    ///
    /// The channel is consumed and closed exactly once whatever the outcome.
    pub async fn run_loop(
        mut self,
        message: &str,
        interval: Duration,
        cancel: &CancellationToken,
    ) -> RunReport {
        let payload = Bytes::copy_from_slice(message.as_bytes());
        let mut exchanges = 0u64;
        let termination = loop {
            if cancel.is_cancelled() {
                break Termination::Interrupted;
            }

            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Termination::Interrupted,
                r = self.send_frame(payload.clone()) => r,
            };
            match sent {
                Ok(len) => tracing::info!("Sent: {message} (Length: {len})"),
                Err(e) => break Termination::Failed(e),
            }

            let received = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Termination::Interrupted,
                r = self.receive_frame() => r,
            };
            let frame = match received {
                Ok(Some(frame)) => frame,
                Ok(None) => break Termination::PeerClosed,
                Err(e) => break Termination::Failed(e),
            };
            exchanges += 1;

            match frame.text() {
                Ok(text) => tracing::info!("Received: {text} (Length: {})", frame.len()),
                Err(e) => match self.options.on_invalid_utf8 {
                    InvalidUtf8::Skip => tracing::warn!(
                        "Received: {} (Length: {}), skipped: {e}",
                        String::from_utf8_lossy(frame.payload()),
                        frame.len()
                    ),
                    InvalidUtf8::Abort => break Termination::Failed(e),
                },
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break Termination::Interrupted,
                _ = tokio::time::sleep(interval) => {}
            }
        };

        self.close().await;
        RunReport {
            exchanges,
            termination,
        }
    }
}

impl<S> fmt::Debug for FramedChannel<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FramedChannel")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
