//! Delivering the single input payload to a running sandbox.
//!
//! An attach stream exposes one of a small set of write capabilities. The
//! capability is resolved once, when the stream is opened, and every variant
//! is driven through the same `write` / `signal_end` / `close` interface.
//!
//! The Docker backend only hands out a writer, so `Socket` is built by the
//! scripted backend in tests and by any runtime that exposes a raw socket.

use async_trait::async_trait;
use std::io;
use std::pin::Pin;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use super::error::SandboxError;

/// Boxed writer for streams that accept writes directly.
pub(crate) type InputWriter = Pin<Box<dyn AsyncWrite + Send>>;

/// A lower-level socket sitting beneath an attach stream.
#[async_trait]
pub(crate) trait RawSocket: Send {
    /// Writes the whole buffer.
    async fn send_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Whether the write side can be shut down independently.
    fn supports_half_close(&self) -> bool;

    /// Shuts down the write side, leaving the read side open.
    async fn shutdown_write(&mut self) -> io::Result<()>;
}

#[cfg(unix)]
#[async_trait]
impl RawSocket for tokio::net::UnixStream {
    async fn send_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.write_all(data).await?;
        self.flush().await
    }

    fn supports_half_close(&self) -> bool {
        true
    }

    async fn shutdown_write(&mut self) -> io::Result<()> {
        AsyncWriteExt::shutdown(self).await
    }
}

/// Input side of an attach stream.
pub(crate) enum StdinChannel {
    /// Wrapped socket with its own send primitive.
    // Only the scripted test backend constructs this today.
    #[cfg_attr(not(test), allow(dead_code))]
    Socket(Box<dyn RawSocket>),
    /// Stream with a direct write capability.
    Writer(InputWriter),
    /// Nothing can be written.
    Unwritable,
    /// Released.
    Closed,
}

/// How end-of-input was communicated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EndOfInput {
    /// Write side shut down, stream still open.
    HalfClosed,
    /// Whole stream released.
    Closed,
    /// Left to the final close of the stream.
    Deferred,
}

/// Outcome of the injection step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Delivered(EndOfInput),
    /// No write pathway; the program sees no input.
    Skipped,
    /// The write was refused, usually because the program already exited.
    Refused,
}

impl StdinChannel {
    /// Short name of the resolved capability.
    pub fn capability(&self) -> &'static str {
        match self {
            Self::Socket(_) => "socket",
            Self::Writer(_) => "writer",
            Self::Unwritable => "none",
            Self::Closed => "closed",
        }
    }

    /// Writes `data` through whichever pathway the stream has.
    ///
    /// Returns `Ok(false)` without writing when there is none.
    pub async fn write(&mut self, data: &[u8]) -> io::Result<bool> {
        match self {
            Self::Socket(socket) => {
                socket.send_all(data).await?;
                Ok(true)
            }
            Self::Writer(writer) => {
                writer.write_all(data).await?;
                writer.flush().await?;
                Ok(true)
            }
            Self::Unwritable | Self::Closed => Ok(false),
        }
    }

    /// Tells the program no more input is coming.
    ///
    /// A failed half-close on a writer falls back to closing the stream.
    pub async fn signal_end(&mut self) -> EndOfInput {
        match self {
            Self::Socket(socket) => {
                if !socket.supports_half_close() {
                    return EndOfInput::Deferred;
                }
                let result = socket.shutdown_write().await;
                match result {
                    Ok(()) => EndOfInput::HalfClosed,
                    Err(e) => {
                        debug!("Socket half-close failed: {}. Closing stream.", e);
                        self.close();
                        EndOfInput::Closed
                    }
                }
            }
            Self::Writer(writer) => {
                let result = writer.shutdown().await;
                match result {
                    Ok(()) => EndOfInput::HalfClosed,
                    Err(e) => {
                        debug!("Writer half-close failed: {}. Closing stream.", e);
                        self.close();
                        EndOfInput::Closed
                    }
                }
            }
            Self::Unwritable | Self::Closed => EndOfInput::Deferred,
        }
    }

    /// Releases the stream. Safe to call more than once.
    pub fn close(&mut self) {
        *self = Self::Closed;
    }

    /// Returns true once the stream has been released.
    #[cfg(test)]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl std::fmt::Debug for StdinChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StdinChannel({})", self.capability())
    }
}

/// Appends the single trailing newline every payload carries.
pub(crate) fn payload(input: &str) -> String {
    format!("{input}\n")
}

/// Writes `input` plus a newline and signals end-of-input, all within `limit`.
///
/// Exactly one write pathway is tried. A stream without one, or one that
/// refuses the write, is a degraded delivery and the run still completes.
/// Only a write that does not finish within `limit` is an error.
pub(crate) async fn inject(
    channel: &mut StdinChannel,
    input: &str,
    limit: Duration,
) -> Result<Delivery, SandboxError> {
    let data = payload(input);
    let capability = channel.capability();

    let step = async {
        if !channel.write(data.as_bytes()).await? {
            return Ok::<_, io::Error>(Delivery::Skipped);
        }
        Ok(Delivery::Delivered(channel.signal_end().await))
    };

    let outcome = tokio::time::timeout(limit, step).await;
    match outcome {
        Ok(Ok(Delivery::Skipped)) => {
            warn!("Attached stream has no write capability. Program will not receive input.");
            Ok(Delivery::Skipped)
        }
        Ok(Ok(delivery)) => {
            debug!(
                "Sent {} bytes via {} ({:?})",
                data.len(),
                capability,
                delivery
            );
            Ok(delivery)
        }
        Ok(Err(e)) => {
            warn!(
                "Input not delivered via {}: {}. Collecting output anyway.",
                capability, e
            );
            channel.close();
            Ok(Delivery::Refused)
        }
        Err(_) => Err(SandboxError::input_delivery(format!(
            "write did not finish within {} seconds",
            limit.as_secs()
        ))),
    }
}
