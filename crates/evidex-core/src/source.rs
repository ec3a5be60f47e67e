//! Boundary to the page rendering collaborator.
//!
//! Rendering itself lives outside this workspace. The extraction stages only
//! need two reads per page: positioned text and the list of drawing operations
//! with the image resources they reference.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::types::PageText;

/// Errors reported by a [`PageSource`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The page does not exist in the document.
    #[error("Page {0} not found")]
    PageNotFound(u32),

    /// The page exists but could not be read.
    #[error("Failed to read page {page}: {message}")]
    ReadFailed {
        /// 1-based page number.
        page: u32,
        /// Collaborator message.
        message: String,
    },
}

/// Page dimensions in page space (origin bottom-left, y grows upward).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    /// Page width.
    pub width: f64,
    /// Page height.
    pub height: f64,
}

/// Color model of a raster image's samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorSpace {
    /// One gray sample per pixel.
    Gray,
    /// Three samples per pixel.
    Rgb,
    /// Four subtractive samples per pixel.
    Cmyk,
    /// Three samples plus alpha.
    Rgba,
}

impl ColorSpace {
    /// Samples per pixel.
    #[must_use]
    pub const fn components(self) -> usize {
        match self {
            Self::Gray => 1,
            Self::Rgb => 3,
            Self::Cmyk | Self::Rgba => 4,
        }
    }
}

/// A decoded raster image as handed over by the renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RasterImage {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Sample layout.
    pub color_space: ColorSpace,
    /// Bits per sample (1 or 8 are supported).
    pub bits_per_component: u8,
    /// Packed sample data, rows padded to whole bytes.
    pub data: Vec<u8>,
}

/// One drawing operation in content-stream order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DrawingOp {
    /// Push the current graphics state.
    Save,
    /// Pop the graphics state.
    Restore,
    /// Concatenate `[a, b, c, d, e, f]` onto the current transform.
    Transform([f64; 6]),
    /// Paint a named image resource.
    PaintImage {
        /// Resource name.
        name: String,
    },
    /// Paint a named stencil mask resource.
    PaintImageMask {
        /// Resource name.
        name: String,
    },
    /// Paint an image carried inline in the content stream.
    PaintInlineImage(RasterImage),
    /// Anything the extractors ignore.
    Other(String),
}

/// Everything the figure extractor needs from one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageDrawing {
    /// Page size.
    pub geometry: PageGeometry,
    /// Operations in paint order.
    pub operations: Vec<DrawingOp>,
    /// Image resources by name.
    pub resources: HashMap<String, RasterImage>,
}

/// Read access to a rendered document.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Returns the positioned text of a 1-based page.
    async fn page_text(&self, page_number: u32) -> Result<PageText, SourceError>;

    /// Returns the drawing operations and resources of a 1-based page.
    async fn drawing_operations(&self, page_number: u32) -> Result<PageDrawing, SourceError>;
}
