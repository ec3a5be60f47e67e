//! Figure extraction from a page's drawing operations.
//!
//! The current transform is tracked through save/restore/transform, exactly as
//! a renderer would, so every image paint can be placed on the page: images
//! occupy the unit square in their own space, and the transform maps that
//! square to page space.

use serde::Serialize;
use std::time::Instant;
use tracing::{debug, warn};

use super::FigureError;
use super::color::{mask_to_rgba, to_rgba};
use crate::config::FigureSection;
use crate::source::{DrawingOp, PageDrawing, RasterImage};
use crate::types::{BoundingBox, ExtractedFigure};

/// Affine transform `[a, b, c, d, e, f]` mapping `(x, y)` to
/// `(a*x + c*y + e, b*x + d*y + f)`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Transform([f64; 6]);

impl Transform {
    const IDENTITY: Self = Self([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    /// `m` applied first, then `self`.
    fn pre_concat(self, m: [f64; 6]) -> Self {
        let [a, b, c, d, e, f] = self.0;
        let [ma, mb, mc, md, me, mf] = m;
        Self([
            ma * a + mb * c,
            ma * b + mb * d,
            mc * a + md * c,
            mc * b + md * d,
            me * a + mf * c + e,
            me * b + mf * d + f,
        ])
    }

    fn apply(self, x: f64, y: f64) -> (f64, f64) {
        let [a, b, c, d, e, f] = self.0;
        (a * x + c * y + e, b * x + d * y + f)
    }

    fn determinant(self) -> f64 {
        let [a, b, c, d, ..] = self.0;
        a * d - b * c
    }
}

/// Counters reported alongside the figures of one page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FigureDiagnostics {
    /// Wall time spent on the page.
    pub processing_time_ms: u64,
    /// Image paint operations seen.
    pub regions_considered: usize,
    /// Figures emitted.
    pub regions_accepted: usize,
    /// Paint operations skipped as malformed.
    pub regions_skipped: usize,
}

/// Extracts figures from image paint operations.
#[derive(Debug, Clone, Default)]
pub struct FigureExtractor {
    config: FigureSection,
}

impl FigureExtractor {
    /// Creates an extractor with the given thresholds.
    #[must_use]
    pub fn new(config: FigureSection) -> Self {
        Self { config }
    }

    /// Extracts every figure on the page in paint order.
    ///
    /// Malformed paint operations are logged and skipped. Placements smaller
    /// than the minimum figure area are dropped.
    #[must_use]
    pub fn extract(&self, page_number: u32, drawing: &PageDrawing) -> (Vec<ExtractedFigure>, FigureDiagnostics) {
        let started = Instant::now();
        let mut diagnostics = FigureDiagnostics::default();
        let mut figures = Vec::new();

        let mut ctm = Transform::IDENTITY;
        let mut stack: Vec<Transform> = Vec::new();

        for op in &drawing.operations {
            let painted = match op {
                DrawingOp::Save => {
                    stack.push(ctm);
                    continue;
                }
                DrawingOp::Restore => {
                    match stack.pop() {
                        Some(saved) => ctm = saved,
                        None => debug!(page_number, "Restore without matching save"),
                    }
                    continue;
                }
                DrawingOp::Transform(m) => {
                    ctm = ctm.pre_concat(*m);
                    continue;
                }
                DrawingOp::Other(_) => continue,
                DrawingOp::PaintImage { name } => lookup(drawing, name).and_then(to_rgba_with_size),
                DrawingOp::PaintImageMask { name } => lookup(drawing, name).and_then(|image| {
                    mask_to_rgba(image).map(|data| (data, image.width, image.height))
                }),
                DrawingOp::PaintInlineImage(image) => to_rgba_with_size(image),
            };

            diagnostics.regions_considered += 1;

            let placed = painted.and_then(|(data, w, h)| {
                place(ctm, drawing.geometry.height).map(|bbox| (data, w, h, bbox))
            });
            let (pixel_data, pixel_width, pixel_height, bounding_box) = match placed {
                Ok(placed) => placed,
                Err(e) => {
                    warn!(page_number, error = %e, "Skipping malformed image operation");
                    diagnostics.regions_skipped += 1;
                    continue;
                }
            };

            if bounding_box.area() < self.config.min_figure_area {
                debug!(page_number, area = bounding_box.area(), "Image below minimum figure area");
                continue;
            }

            let id = format!("figure-p{}-{}", page_number, figures.len());
            figures.push(ExtractedFigure {
                id,
                page_number,
                bounding_box,
                pixel_width,
                pixel_height,
                size_bytes: pixel_data.len(),
                pixel_data,
            });
        }

        diagnostics.regions_accepted = figures.len();
        diagnostics.processing_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        debug!(
            page_number,
            considered = diagnostics.regions_considered,
            accepted = diagnostics.regions_accepted,
            "Figure extraction finished"
        );

        (figures, diagnostics)
    }
}

fn lookup<'a>(drawing: &'a PageDrawing, name: &str) -> Result<&'a RasterImage, FigureError> {
    drawing.resources.get(name).ok_or_else(|| FigureError::MissingResource(name.to_string()))
}

fn to_rgba_with_size(image: &RasterImage) -> Result<(Vec<u8>, u32, u32), FigureError> {
    to_rgba(image).map(|data| (data, image.width, image.height))
}

/// Maps the unit square through `ctm` and flips it into viewport coordinates.
fn place(ctm: Transform, page_height: f64) -> Result<BoundingBox, FigureError> {
    if ctm.determinant().abs() < f64::EPSILON {
        return Err(FigureError::DegenerateTransform);
    }

    let corners = [ctm.apply(0.0, 0.0), ctm.apply(1.0, 0.0), ctm.apply(0.0, 1.0), ctm.apply(1.0, 1.0)];
    let min_x = corners.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
    let max_x = corners.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max);
    let min_y = corners.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
    let max_y = corners.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);

    Ok(BoundingBox::from_corners(min_x, page_height - max_y, max_x, page_height - min_y))
}
