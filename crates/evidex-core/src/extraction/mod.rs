//! Geometric extraction of tables and figures.

pub mod color;
pub mod figures;
pub mod tables;

use thiserror::Error;

use crate::source::ColorSpace;

pub use figures::{FigureDiagnostics, FigureExtractor};
pub use tables::TableDetector;

/// Reasons an image paint operation cannot become a figure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FigureError {
    /// The operation names a resource the page does not have.
    #[error("Image resource '{0}' not found")]
    MissingResource(String),

    /// Sample data does not match the declared dimensions.
    #[error("Image buffer holds {actual} bytes, expected {expected}")]
    BufferLength {
        /// Bytes implied by width, height and depth.
        expected: usize,
        /// Bytes present.
        actual: usize,
    },

    /// The bit depth is not supported for this color space.
    #[error("Unsupported bit depth {bits} for {color_space:?}")]
    UnsupportedBitDepth {
        /// Bits per component.
        bits: u8,
        /// Declared color space.
        color_space: ColorSpace,
    },

    /// The image has zero width or height.
    #[error("Image has no pixels")]
    EmptyImage,

    /// The current transform collapses the image to a line or point.
    #[error("Degenerate transform")]
    DegenerateTransform,
}
