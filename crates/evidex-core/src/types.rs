//! Core data types shared by the extraction stages.

use image::{ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;

/// One positioned text fragment produced by the rendering collaborator.
///
/// Coordinates are in viewport space: origin at the top-left, y grows downward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextGlyph {
    /// The text content.
    pub text: String,
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Advance width.
    pub width: f64,
    /// Glyph height.
    pub height: f64,
    /// 1-based page number.
    pub page_number: u32,
}

impl TextGlyph {
    /// Creates a glyph.
    #[must_use]
    pub fn new(text: impl Into<String>, x: f64, y: f64, width: f64, height: f64, page_number: u32) -> Self {
        Self { text: text.into(), x, y, width, height, page_number }
    }

    /// Right edge.
    #[must_use]
    pub fn right(&self) -> f64 {
        self.x + self.width
    }
}

/// The text content of one page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageText {
    /// Concatenated page text.
    pub full_text: String,
    /// Positioned glyphs in content-stream order.
    pub items: Vec<TextGlyph>,
}

/// Axis-aligned rectangle in viewport space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Width.
    pub width: f64,
    /// Height.
    pub height: f64,
}

impl BoundingBox {
    /// Creates a bounding box.
    #[must_use]
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Builds the box spanning two corners.
    #[must_use]
    pub fn from_corners(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self { x: min_x, y: min_y, width: max_x - min_x, height: max_y - min_y }
    }

    /// Area in square pixels.
    #[must_use]
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Smallest box containing both boxes.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self::from_corners(
            self.x.min(other.x),
            self.y.min(other.y),
            (self.x + self.width).max(other.x + other.width),
            (self.y + self.height).max(other.y + other.height),
        )
    }
}

/// A table detected from glyph geometry.
///
/// Only constructed for regions that pass structural validation: at least four
/// rows, each with at least two distinct column segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedTable {
    /// Stable identifier (`table-p{page}-{n}`).
    pub id: String,
    /// Page the table was found on.
    pub page_number: u32,
    /// Region covered by the table's glyphs.
    pub bounding_box: BoundingBox,
    /// Cell text by row, then column.
    pub rows: Vec<Vec<String>>,
}

impl ExtractedTable {
    /// Number of columns (width of the widest row).
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Renders the cell grid as tab-separated lines.
    #[must_use]
    pub fn to_tsv(&self) -> String {
        self.rows.iter().map(|row| row.join("\t")).collect::<Vec<_>>().join("\n")
    }
}

/// Coarse clinical category of a table's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClinicalDataType {
    /// Patient counts and demographics.
    PatientData,
    /// Mortality, survival and other outcome measures.
    Outcomes,
    /// Imaging modalities and findings.
    Imaging,
    /// Surgical procedures.
    Surgical,
    /// Study design descriptors.
    StudyDesign,
    /// Statistical predictors (odds ratios, regressions).
    Predictor,
    /// No keyword set matched well enough.
    Unknown,
}

impl ClinicalDataType {
    /// The kebab-case label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PatientData => "patient-data",
            Self::Outcomes => "outcomes",
            Self::Imaging => "imaging",
            Self::Surgical => "surgical",
            Self::StudyDesign => "study-design",
            Self::Predictor => "predictor",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ClinicalDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A table with its content label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedTable {
    /// The detected table.
    #[serde(flatten)]
    pub table: ExtractedTable,
    /// The assigned category.
    pub clinical_data_type: ClinicalDataType,
}

/// A raster figure reconstructed from a page's image paint operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFigure {
    /// Identifier (`figure-p{page}-{n}`).
    pub id: String,
    /// Page the figure was painted on.
    pub page_number: u32,
    /// Placement on the page in viewport coordinates.
    pub bounding_box: BoundingBox,
    /// Source image width in pixels.
    pub pixel_width: u32,
    /// Source image height in pixels.
    pub pixel_height: u32,
    /// RGBA8 pixel buffer, row-major.
    #[serde(skip)]
    pub pixel_data: Vec<u8>,
    /// Size of the pixel buffer in bytes.
    pub size_bytes: usize,
}

impl ExtractedFigure {
    /// Encodes the pixel buffer as PNG.
    ///
    /// # Errors
    /// Returns an error if the buffer does not match the pixel dimensions or
    /// encoding fails.
    pub fn to_png(&self) -> Result<Vec<u8>, image::ImageError> {
        let img = RgbaImage::from_raw(self.pixel_width, self.pixel_height, self.pixel_data.clone())
            .ok_or_else(|| {
                image::ImageError::Parameter(image::error::ParameterError::from_kind(
                    image::error::ParameterErrorKind::DimensionMismatch,
                ))
            })?;
        let mut bytes = Cursor::new(Vec::new());
        img.write_to(&mut bytes, ImageFormat::Png)?;
        Ok(bytes.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounding_box_union_and_area() {
        let a = BoundingBox::new(10.0, 10.0, 20.0, 10.0);
        let b = BoundingBox::new(25.0, 5.0, 10.0, 30.0);
        let u = a.union(&b);
        assert_eq!(u, BoundingBox::new(10.0, 5.0, 25.0, 30.0));
        assert!((a.area() - 200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_table_tsv() {
        let table = ExtractedTable {
            id: "table-p1-0".into(),
            page_number: 1,
            bounding_box: BoundingBox::default(),
            rows: vec![vec!["A".into(), "B".into()], vec!["1".into(), "2".into()]],
        };
        assert_eq!(table.to_tsv(), "A\tB\n1\t2");
        assert_eq!(table.column_count(), 2);
    }

    #[test]
    fn test_clinical_data_type_serde() {
        let json = serde_json::to_string(&ClinicalDataType::StudyDesign).unwrap();
        assert_eq!(json, "\"study-design\"");
        assert_eq!(ClinicalDataType::PatientData.to_string(), "patient-data");
    }

    #[test]
    fn test_figure_png_encoding() {
        let figure = ExtractedFigure {
            id: "figure-p1-0".into(),
            page_number: 1,
            bounding_box: BoundingBox::new(0.0, 0.0, 60.0, 60.0),
            pixel_width: 2,
            pixel_height: 1,
            pixel_data: vec![255, 0, 0, 255, 0, 255, 0, 255],
            size_bytes: 8,
        };
        let png = figure.to_png().unwrap();
        assert_eq!(&png[1..4], b"PNG");

        let broken = ExtractedFigure { pixel_width: 5, ..figure };
        assert!(broken.to_png().is_err());
    }
}
