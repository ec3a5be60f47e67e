//! Evidex Core - geometric evidence extraction from rendered research papers.
//!
//! This crate provides the deterministic half of Evidex:
//! - Table detection from positioned text glyphs
//! - Figure extraction from drawing operations
//! - Keyword classification of table content
//! - A bounded page-text cache and the page source boundary
//! - Provenance tracking, configuration, and logging setup
//!
//! # Example
//!
//! ```rust,no_run
//! use evidex_core::{config::load_config, extraction::TableDetector};
//!
//! fn main() -> evidex_core::Result<()> {
//!     let config = load_config(std::path::Path::new("."))?;
//!     let detector = TableDetector::new(config.tables);
//!     let tables = detector.detect(1, &[]);
//!     assert!(tables.is_empty());
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod classifier;
pub mod config;
pub mod error;
pub mod extraction;
pub mod logging;
pub mod provenance;
pub mod source;
pub mod types;

pub use cache::{BoundedCache, CacheStats, CachedPageText};
pub use classifier::ContentClassifier;
pub use config::{EvidexConfig, load_config};
pub use error::{ConfigError, CoreError, Result};
pub use extraction::{FigureDiagnostics, FigureError, FigureExtractor, TableDetector};
pub use logging::init_logging;
pub use provenance::{Extraction, ExtractionMethod, ProvenanceTracker};
pub use source::{ColorSpace, DrawingOp, PageDrawing, PageGeometry, PageSource, RasterImage, SourceError};
pub use types::{
    BoundingBox, ClassifiedTable, ClinicalDataType, ExtractedFigure, ExtractedTable, PageText, TextGlyph,
};
