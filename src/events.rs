//! Lifecycle notifications for an output stream.

use uuid::Uuid;

/// Best-effort lifecycle notifications, delivered through the bounded
/// channel returned by [`OutputStream::events`]. Events raised on the
/// real-time thread are dropped rather than blocking when the channel is
/// full.
///
/// [`OutputStream::events`]: crate::stream::OutputStream::events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A source was handed to `play` and is now active.
    SourceStarted { source_id: Uuid },
    /// A source finished its play cycle gracefully (exhaustion or a
    /// per-source `stop`).
    SourceCompleted { source_id: Uuid },
    /// A source was dropped abruptly by `stop_audios`/`stop_stream`; its
    /// finish callback was not invoked.
    SourceDropped { source_id: Uuid },
    /// The active set drained to empty; `wait` on the stream now returns.
    StreamSilent,
    /// The device was stopped via `stop_stream`.
    StreamStopped,
}

impl StreamEvent {
    pub fn source_id(&self) -> Option<Uuid> {
        match self {
            Self::SourceStarted { source_id }
            | Self::SourceCompleted { source_id }
            | Self::SourceDropped { source_id } => Some(*source_id),
            Self::StreamSilent | Self::StreamStopped => None,
        }
    }

    pub fn is_source_event(&self) -> bool {
        self.source_id().is_some()
    }
}
