//! Windows that envelopes are posted to.

use tokio::sync::mpsc;

/// A window that receives serialized envelopes.
///
/// `post` is fire-and-forget: success means the text was handed over, not
/// that the other side acted on it.
pub trait Target: Send + Sync {
    /// Short name used in logs (e.g. "parent", "opener").
    fn label(&self) -> &str;

    /// Post serialized envelope text.
    fn post(&self, text: &str) -> Result<(), TransportError>;
}

/// A failed post.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("target closed")]
    Closed,
    #[error("post failed: {0}")]
    Post(String),
}

/// Target backed by an in-process channel.
pub struct ChannelTarget {
    label: String,
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelTarget {
    pub fn new(label: impl Into<String>, tx: mpsc::UnboundedSender<String>) -> Self {
        Self {
            label: label.into(),
            tx,
        }
    }

    /// A target plus the receiver that observes what was posted.
    pub fn pair(label: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(label, tx), rx)
    }
}

impl Target for ChannelTarget {
    fn label(&self) -> &str {
        &self.label
    }

    fn post(&self, text: &str) -> Result<(), TransportError> {
        self.tx
            .send(text.to_string())
            .map_err(|_| TransportError::Closed)
    }
}
