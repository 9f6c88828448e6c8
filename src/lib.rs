//! TexStats extracts Portilla-Simoncelli texture statistics from images.
//!
//! This crate computes the fixed-order statistic vector over complex
//! steerable-pyramid coefficients (marginal moments, windowed
//! autocorrelations, cross-orientation and cross-scale correlations), with a
//! lossless vector/dictionary codec and coarse-to-fine scale masking. It also
//! builds the log-polar raised-cosine pooling windows used to spatially
//! average such statistics.

pub mod autocorr;
pub mod crosscorr;
pub mod encoder;
pub mod pooling;
pub mod pyramid;
pub mod recon;
pub mod signal;
pub mod stats;
pub(crate) mod trace;
pub mod util;

pub use autocorr::AutocorrelationEngine;
pub use crosscorr::CrossCorrelationEngine;
pub use encoder::{PortillaSimoncelli, PortillaSimoncelliConfig, PsStatistics, ScaleLabel};
pub use pooling::{PoolingWindows, WindowWidths};
pub use pyramid::{BandDict, BandKey, PyramidBands, ReconLevels, SteerablePyramid};
pub use recon::reconstruct_lowpass_at_each_scale;
pub use util::{TexStatsError, TexStatsResult};
