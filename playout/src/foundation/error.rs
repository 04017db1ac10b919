/// Convenience alias used across the crate.
pub type PlayoutResult<T> = Result<T, PlayoutError>;

/// Error kinds surfaced by the pipeline.
///
/// A producer that simply has no frame ready this tick is *not* an error; it
/// hands back the empty frame. The variants here are the faults that actually
/// interrupt something: a producer raising from `receive`, a failed draw, a
/// lost GPU device, or a shutdown racing a blocking queue.
#[derive(thiserror::Error, Debug)]
pub enum PlayoutError {
    /// Invalid input at an API boundary.
    #[error("validation error: {0}")]
    Validation(String),

    /// A producer failed while producing a frame.
    #[error("producer error: {0}")]
    Producer(String),

    /// A consumer failed to accept or deliver a frame.
    #[error("consumer error: {0}")]
    Consumer(String),

    /// A single bundle's draw failed; the bundle is dropped.
    #[error("mixer draw error: {0}")]
    MixerDraw(String),

    /// The graphics device itself failed (shader link, device lost).
    #[error("gpu device error: {0}")]
    GpuDevice(String),

    /// A blocking operation was interrupted by shutdown.
    #[error("aborted: {0}")]
    Aborted(String),

    /// Anything else, carried through transparently.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PlayoutError {
    /// Build a [`PlayoutError::Validation`].
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`PlayoutError::Producer`].
    pub fn producer(msg: impl Into<String>) -> Self {
        Self::Producer(msg.into())
    }

    /// Build a [`PlayoutError::Consumer`].
    pub fn consumer(msg: impl Into<String>) -> Self {
        Self::Consumer(msg.into())
    }

    /// Build a [`PlayoutError::MixerDraw`].
    pub fn mixer_draw(msg: impl Into<String>) -> Self {
        Self::MixerDraw(msg.into())
    }

    /// Build a [`PlayoutError::GpuDevice`].
    pub fn gpu(msg: impl Into<String>) -> Self {
        Self::GpuDevice(msg.into())
    }

    /// Build a [`PlayoutError::Aborted`].
    pub fn aborted(msg: impl Into<String>) -> Self {
        Self::Aborted(msg.into())
    }

    /// Return `true` when this error is a shutdown signal rather than a fault.
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Aborted(_))
    }
}
