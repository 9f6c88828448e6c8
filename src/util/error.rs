//! Error types for texstats.

use thiserror::Error;

/// Result alias for texstats operations.
pub type TexStatsResult<T> = std::result::Result<T, TexStatsError>;

/// Errors that can occur when computing texture statistics or pooling windows.
#[derive(Debug, Error, PartialEq)]
pub enum TexStatsError {
    /// A construction parameter is invalid.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: &'static str },
    /// The input image does not match the shape the model was built for.
    #[error("invalid image shape: expected spatial dims ({expected_h}, {expected_w}), got {got:?}")]
    InvalidImageShape {
        expected_h: usize,
        expected_w: usize,
        got: Vec<usize>,
    },
    /// A representation vector has the wrong length for the requested conversion.
    ///
    /// This happens when a vector was previously subsetted by scale; such
    /// vectors cannot be converted back into the block dictionary.
    #[error(
        "representation vector is the wrong length (expected {expected} but got {got}); \
         was it subsetted by scale?"
    )]
    RepresentationLength { expected: usize, got: usize },
    /// A spatial dimension cannot be resampled by the requested factor.
    #[error("spatial size {size} is not divisible by {required} (shrink factor {factor})")]
    NotDivisible {
        size: usize,
        factor: usize,
        required: usize,
    },
    /// A tensor handed to an engine has an unexpected rank or band layout.
    #[error("unexpected tensor shape in {context}: got {got:?}")]
    UnexpectedShape {
        context: &'static str,
        got: Vec<usize>,
    },
    /// The pyramid collaborator violated its shape contract.
    #[error("pyramid contract violation: {context}")]
    PyramidContract { context: &'static str },
    /// A pooling window count came out non-integral where an integer is required.
    #[error("polar window count must be an integer, got {requested}")]
    NonIntegralWindowCount { requested: f64 },
    /// A single polar-angle window cannot tile the circle correctly.
    #[error("cannot construct exactly one polar-angle window")]
    SinglePolarWindow,
    /// A scale index is out of range for the stored window set.
    #[error("scale index {index} out of bounds for {len} window scales")]
    ScaleOutOfBounds { index: usize, len: usize },
}
