use std::io::Error as StdError;
use std::str::Utf8Error;
use std::time::Duration;

use thiserror::Error;

/// Failures while moving frames through the codec.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("I/O error: {0}")]
    Io(#[from] StdError),

    /// The stream ended in the middle of a frame.
    #[error("incomplete frame: stream closed with {received} of {expected} bytes buffered")]
    Incomplete { expected: usize, received: usize },

    #[error("frame too large: {length} bytes (max: {max})")]
    TooLarge { length: usize, max: usize },
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("cannot connect to {addr}: {source}")]
    ConnectionFailure { addr: String, source: StdError },

    #[error("write to stream failed: {0}")]
    StreamWriteFailure(#[source] FrameError),

    #[error("read from stream failed: {0}")]
    StreamReadFailure(#[source] FrameError),

    #[error("no reply within {0:?}")]
    ReplyTimeout(Duration),

    #[error("payload of {length} bytes is not valid UTF-8: {source}")]
    DecodeFailure { length: u32, source: Utf8Error },
}

impl ChannelError {
    /// Whether the peer refused or reset the connection, as opposed to a
    /// protocol level problem.
    pub fn is_connection_lost(&self) -> bool {
        use std::io::ErrorKind;
        let io = match self {
            ChannelError::ConnectionFailure { source, .. } => Some(source),
            ChannelError::StreamWriteFailure(FrameError::Io(e))
            | ChannelError::StreamReadFailure(FrameError::Io(e)) => Some(e),
            _ => None,
        };
        matches!(
            io.map(StdError::kind),
            Some(
                ErrorKind::ConnectionRefused
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::BrokenPipe
            )
        )
    }
}
