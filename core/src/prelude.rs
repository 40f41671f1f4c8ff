pub use crate::config::DeviceConfig;

/// Common error type for the acquisition and streaming core.
#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("sampler failure: {0}")]
    Sampler(#[from] crate::acquisition::SamplerError),
    #[error("network failure: {0}")]
    Network(#[from] std::io::Error),
    #[error("packet layout mismatch: expected {expected} bytes, got {actual}")]
    PacketLength { expected: usize, actual: usize },
    #[error("malformed selection message: {0}")]
    Selection(String),
    #[error("session already selected by {0}")]
    AlreadySelected(std::net::SocketAddr),
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Single-channel filter operating on one full channel buffer per call.
///
/// Implementations keep their delay lines between calls, so applying the
/// same input twice generally yields different output.
pub trait ChannelFilter {
    fn apply(&mut self, input: &[f32], output: &mut [f32]);
    fn reset(&mut self);
}

/// Lifecycle seam used by discovery to (re)start the streaming tasks.
pub trait StreamControl: Send + Sync {
    fn restart(&self) -> CoreResult<()>;
    fn stop(&self);
}
