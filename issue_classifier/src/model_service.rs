use ndarray::{Array, Ix4};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("session mutex poisoned: {0}")]
    Poisoned(String),
    #[error("failed to build tensor: {0}")]
    Tensor(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("failed to extract tensor: {0}")]
    Extract(String),
}

/// A loaded classifier. Implementations must be safe to call from several
/// blocking tasks at once.
pub trait ModelService: Send + Sync + 'static {
    /// Runs one forward pass on a batch of one and returns the per-class scores.
    fn predict(&self, input: &Array<f32, Ix4>) -> Result<Vec<f32>, ModelError>;
}
