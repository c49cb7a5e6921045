//! A client that keeps one TCP connection open and repeatedly exchanges
//! length-prefixed frames with the server on the other end.

pub mod channel;
pub mod codec;
pub mod config;
pub mod error;
pub mod logging;

pub use channel::{ChannelOptions, FramedChannel, RunReport, Termination};
pub use codec::{Frame, FrameCodec};
pub use config::{Config, InvalidUtf8};
pub use error::{ChannelError, FrameError};
