use thiserror::Error;

/// Errors raised by the synthesis pipeline.
///
/// `QueueFull` and `QueueEmpty` are the steady-state signals every queue
/// operation reports; callers back off or retry. The load/config variants are
/// only produced while a pipeline is being assembled and abort startup.
#[derive(Debug, Error)]
pub enum SynthError {
    #[error("queue is full")]
    QueueFull,

    #[error("queue is empty")]
    QueueEmpty,

    #[error("failed to load engine configuration: {0}")]
    ConfigLoad(String),

    #[error("interpolation weights mismatch: {0}")]
    InterpolationMismatch(String),

    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid label: {0}")]
    InvalidLabel(String),

    #[error("engine error: {0}")]
    Engine(String),

    #[error("audio encoding failed: {0}")]
    Encode(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SynthError {
    /// True for failures a tick or loop iteration can simply retry or skip.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SynthError::QueueFull
                | SynthError::QueueEmpty
                | SynthError::InvalidLabel(_)
                | SynthError::Engine(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SynthError>;
