//! Table detection from positioned text.
//!
//! Glyphs are grouped into rows by vertical proximity, rows into text segments
//! by horizontal gaps, and consecutive multi-segment rows into candidate
//! regions. Segment x-starts are clustered into columns, and a candidate only
//! becomes an [`ExtractedTable`] if it passes
//! [`TableDetector::has_valid_table_structure`].

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use tracing::debug;

use crate::config::TableSection;
use crate::types::{BoundingBox, ExtractedTable, TextGlyph};

/// Fewest rows any table may have, whatever the configuration says.
const MIN_TABLE_ROWS: usize = 4;

// Bullets, dashes, and enumerators such as "1.", "(a)", "iv)"
static LIST_MARKER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:[•·▪‣◦●○■□\-–—*]|\(?(?:\d{1,3}|[a-zA-Z]|[ivxlcIVXLC]{1,5})[.)])(?:\s|$)")
        .expect("List marker regex should be valid")
});

/// A run of horizontally adjacent glyphs.
#[derive(Debug, Clone)]
struct Segment {
    text: String,
    left: f64,
    right: f64,
    top: f64,
    bottom: f64,
}

#[derive(Debug, Clone)]
struct Row {
    segments: Vec<Segment>,
    top: f64,
    bottom: f64,
}

/// Detects tables in a page's glyphs.
#[derive(Debug, Clone, Default)]
pub struct TableDetector {
    config: TableSection,
}

impl TableDetector {
    /// Creates a detector with the given thresholds.
    #[must_use]
    pub fn new(config: TableSection) -> Self {
        Self { config }
    }

    /// Finds every table on one page.
    ///
    /// Output order follows the page top to bottom, and ids are numbered in
    /// that order, so identical input always gives identical output.
    #[must_use]
    pub fn detect(&self, page_number: u32, glyphs: &[TextGlyph]) -> Vec<ExtractedTable> {
        let mut visible: Vec<&TextGlyph> = glyphs.iter().filter(|g| !g.text.trim().is_empty()).collect();
        if visible.is_empty() {
            return Vec::new();
        }

        visible.sort_by(|a, b| a.y.total_cmp(&b.y).then(a.x.total_cmp(&b.x)));

        let max_row_gap = self.config.row_gap_factor * median_height(&visible);
        let rows = self.group_rows(&visible);
        let min_rows = self.config.min_rows.max(MIN_TABLE_ROWS);

        let mut tables = Vec::new();
        for run in split_runs(&rows, max_row_gap) {
            if run.len() < min_rows {
                continue;
            }

            let grid = self.build_grid(run);
            if !self.has_valid_table_structure(&grid) {
                debug!(page_number, rows = run.len(), "Rejected table candidate");
                continue;
            }

            let bounding_box = run_bounds(run);
            let id = format!("table-p{}-{}", page_number, tables.len());
            debug!(page_number, %id, rows = grid.len(), "Detected table");
            tables.push(ExtractedTable { id, page_number, bounding_box, rows: grid });
        }

        tables
    }

    /// Structural check applied to every candidate grid.
    ///
    /// `rows` holds one entry per column group, with an empty string where a
    /// row has nothing in that column. A grid passes only if it has at least
    /// four rows, every row fills at least two columns with at least two
    /// distinct texts, and most rows do not start with a list marker.
    #[must_use]
    pub fn has_valid_table_structure(&self, rows: &[Vec<String>]) -> bool {
        if rows.len() < self.config.min_rows.max(MIN_TABLE_ROWS) {
            return false;
        }

        for row in rows {
            let occupied: Vec<&str> =
                row.iter().map(|cell| cell.trim()).filter(|cell| !cell.is_empty()).collect();
            if occupied.len() < 2 {
                return false;
            }
            let distinct: HashSet<&str> = occupied.iter().copied().collect();
            if distinct.len() < 2 {
                return false;
            }
        }

        let list_rows = rows
            .iter()
            .filter(|row| {
                row.iter()
                    .find(|cell| !cell.trim().is_empty())
                    .is_some_and(|first| LIST_MARKER_REGEX.is_match(first))
            })
            .count();

        list_rows * 2 <= rows.len()
    }

    fn group_rows(&self, sorted: &[&TextGlyph]) -> Vec<Row> {
        let mut groups: Vec<Vec<&TextGlyph>> = Vec::new();
        let mut anchor_y = f64::NEG_INFINITY;

        for &glyph in sorted {
            let same_row = (glyph.y - anchor_y).abs() <= self.config.row_tolerance;
            if let Some(group) = groups.last_mut().filter(|_| same_row) {
                group.push(glyph);
                continue;
            }
            anchor_y = glyph.y;
            groups.push(vec![glyph]);
        }

        groups.into_iter().map(|group| self.merge_segments(group)).collect()
    }

    fn merge_segments(&self, mut glyphs: Vec<&TextGlyph>) -> Row {
        glyphs.sort_by(|a, b| a.x.total_cmp(&b.x));

        let mut segments: Vec<Segment> = Vec::new();
        for glyph in glyphs {
            let text = glyph.text.trim();
            if let Some(seg) = segments.last_mut().filter(|seg| glyph.x - seg.right < self.config.segment_gap) {
                if glyph.x - seg.right > 0.5 {
                    seg.text.push(' ');
                }
                seg.text.push_str(text);
                seg.right = seg.right.max(glyph.right());
                seg.top = seg.top.min(glyph.y);
                seg.bottom = seg.bottom.max(glyph.y + glyph.height);
                continue;
            }
            segments.push(Segment {
                text: text.to_string(),
                left: glyph.x,
                right: glyph.right(),
                top: glyph.y,
                bottom: glyph.y + glyph.height,
            });
        }

        let top = segments.iter().map(|s| s.top).fold(f64::INFINITY, f64::min);
        let bottom = segments.iter().map(|s| s.bottom).fold(f64::NEG_INFINITY, f64::max);
        Row { segments, top, bottom }
    }

    /// Assigns every segment to a column group and lays the run out as a grid.
    fn build_grid(&self, run: &[Row]) -> Vec<Vec<String>> {
        let mut starts: Vec<f64> = run.iter().flat_map(|row| row.segments.iter().map(|s| s.left)).collect();
        starts.sort_by(f64::total_cmp);

        // Left edge of each column group
        let mut columns: Vec<f64> = Vec::new();
        for x in starts {
            if columns.last().is_none_or(|&col| x - col > self.config.column_tolerance) {
                columns.push(x);
            }
        }

        run.iter()
            .map(|row| {
                let mut cells = vec![String::new(); columns.len()];
                for seg in &row.segments {
                    let idx = columns.partition_point(|&col| col <= seg.left).saturating_sub(1);
                    let cell = &mut cells[idx];
                    if !cell.is_empty() {
                        cell.push(' ');
                    }
                    cell.push_str(&seg.text);
                }
                cells
            })
            .collect()
    }
}

/// Splits rows into maximal runs of multi-segment rows with no large gap.
fn split_runs(rows: &[Row], max_row_gap: f64) -> Vec<&[Row]> {
    let mut runs = Vec::new();
    let mut start: Option<usize> = None;

    for (i, row) in rows.iter().enumerate() {
        let tabular = row.segments.len() >= 2;
        let connected = i > 0 && row.top - rows[i - 1].bottom <= max_row_gap;

        if let Some(s) = start {
            if tabular && connected {
                continue;
            }
            runs.push(&rows[s..i]);
        }
        start = tabular.then_some(i);
    }

    if let Some(s) = start {
        runs.push(&rows[s..]);
    }
    runs
}

fn run_bounds(run: &[Row]) -> BoundingBox {
    let mut min_x = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    for seg in run.iter().flat_map(|row| &row.segments) {
        min_x = min_x.min(seg.left);
        max_x = max_x.max(seg.right);
    }
    let min_y = run.iter().map(|r| r.top).fold(f64::INFINITY, f64::min);
    let max_y = run.iter().map(|r| r.bottom).fold(f64::NEG_INFINITY, f64::max);
    BoundingBox::from_corners(min_x, min_y, max_x, max_y)
}

fn median_height(glyphs: &[&TextGlyph]) -> f64 {
    let mut heights: Vec<f64> = glyphs.iter().map(|g| g.height).collect();
    heights.sort_by(f64::total_cmp);
    heights[heights.len() / 2]
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINE: f64 = 14.0;

    fn grid(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter().map(|r| r.iter().map(|c| (*c).to_string()).collect()).collect()
    }

    /// One glyph per cell; empty strings leave the cell out.
    fn table_glyphs(page: u32, top: f64, cells: &[&[&str]], column_xs: &[f64]) -> Vec<TextGlyph> {
        let mut glyphs = Vec::new();
        for (r, row) in cells.iter().enumerate() {
            for (c, text) in row.iter().enumerate() {
                if text.is_empty() {
                    continue;
                }
                let y = top + r as f64 * LINE;
                glyphs.push(TextGlyph::new(*text, column_xs[c], y, 40.0, 10.0, page));
            }
        }
        glyphs
    }

    #[test]
    fn test_single_column_rejected_regardless_of_rows() {
        let detector = TableDetector::default();
        let rows: Vec<Vec<String>> = (0..20).map(|i| vec![format!("item {}", i)]).collect();
        assert!(!detector.has_valid_table_structure(&rows));

        let sparse: Vec<Vec<String>> = (0..20).map(|i| vec![format!("item {}", i), String::new()]).collect();
        assert!(!detector.has_valid_table_structure(&sparse));
    }

    #[test]
    fn test_four_by_two_distinct_text_accepted() {
        let detector = TableDetector::default();
        let rows = grid(&[&["Age", "62"], &["Male", "14"], &["GCS", "8"], &["ICH", "5"]]);
        assert!(detector.has_valid_table_structure(&rows));
    }

    #[test]
    fn test_three_rows_always_rejected() {
        let detector = TableDetector::new(TableSection { min_rows: 3, ..TableSection::default() });
        let rows = grid(&[&["A", "B", "C"], &["1", "2", "3"], &["4", "5", "6"]]);
        assert!(!detector.has_valid_table_structure(&rows));
    }

    #[test]
    fn test_repeated_text_row_rejected() {
        let detector = TableDetector::default();
        let rows = grid(&[&["A", "B"], &["x", "x"], &["1", "2"], &["3", "4"]]);
        assert!(!detector.has_valid_table_structure(&rows));
    }

    #[test]
    fn test_bulleted_list_rejected() {
        let detector = TableDetector::default();
        let bullets = grid(&[
            &["•", "Decompressive craniectomy"],
            &["•", "External ventricular drain"],
            &["•", "Suboccipital approach"],
            &["•", "Conservative management"],
        ]);
        assert!(!detector.has_valid_table_structure(&bullets));

        let numbered = grid(&[&["1.", "First"], &["2.", "Second"], &["3.", "Third"], &["4.", "Fourth"]]);
        assert!(!detector.has_valid_table_structure(&numbered));
    }

    #[test]
    fn test_numeric_first_column_is_not_a_list() {
        let detector = TableDetector::default();
        let rows = grid(&[&["1", "Smith 2010"], &["2", "Lee 2012"], &["3", "Kim 2015"], &["4", "Ng 2019"]]);
        assert!(detector.has_valid_table_structure(&rows));
    }

    #[test]
    fn test_detects_five_by_three_table() {
        let cells: &[&[&str]] = &[
            &["Variable", "Survivors", "Deaths"],
            &["Age", "61", "70"],
            &["GCS", "12", "6"],
            &["Volume", "18", "34"],
            &["Hydrocephalus", "4", "11"],
        ];
        let glyphs = table_glyphs(2, 100.0, cells, &[50.0, 200.0, 300.0]);

        let tables = TableDetector::default().detect(2, &glyphs);
        assert_eq!(tables.len(), 1);

        let table = &tables[0];
        assert_eq!(table.id, "table-p2-0");
        assert_eq!(table.page_number, 2);
        assert_eq!(table.rows.len(), 5);
        assert_eq!(table.column_count(), 3);
        assert_eq!(table.rows[0], vec!["Variable", "Survivors", "Deaths"]);
        assert_eq!(table.rows[4][0], "Hydrocephalus");
        assert!((table.bounding_box.x - 50.0).abs() < f64::EPSILON);
        assert!((table.bounding_box.y - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_unoccupied_cells_are_empty_strings() {
        let cells: &[&[&str]] = &[
            &["Outcome", "n", "%"],
            &["mRS 0-2", "", "40"],
            &["mRS 3-5", "12", "35"],
            &["Death", "9", "25"],
        ];
        let glyphs = table_glyphs(1, 200.0, cells, &[50.0, 200.0, 300.0]);

        let tables = TableDetector::default().detect(1, &glyphs);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].rows[1], vec!["mRS 0-2", "", "40"]);
    }

    #[test]
    fn test_prose_lines_are_not_tables() {
        // Words 4px apart merge into a single segment per line
        let mut glyphs = Vec::new();
        for line in 0..10 {
            let mut x = 50.0;
            for word in ["Patients", "with", "cerebellar", "infarction", "were", "included"] {
                let width = word.len() as f64 * 5.0;
                glyphs.push(TextGlyph::new(word, x, 100.0 + f64::from(line) * LINE, width, 10.0, 1));
                x += width + 4.0;
            }
        }
        assert!(TableDetector::default().detect(1, &glyphs).is_empty());
    }

    #[test]
    fn test_large_vertical_gap_splits_tables() {
        let cells: &[&[&str]] = &[&["A", "B"], &["1", "2"], &["3", "4"], &["5", "6"]];
        let mut glyphs = table_glyphs(1, 100.0, cells, &[50.0, 200.0]);
        glyphs.extend(table_glyphs(1, 400.0, cells, &[50.0, 200.0]));

        let tables = TableDetector::default().detect(1, &glyphs);
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].id, "table-p1-0");
        assert_eq!(tables[1].id, "table-p1-1");
        assert!(tables[0].bounding_box.y < tables[1].bounding_box.y);
    }

    #[test]
    fn test_glyphs_within_row_tolerance_share_a_row() {
        let mut glyphs = Vec::new();
        for r in 0..4 {
            let y = 100.0 + f64::from(r) * 20.0;
            glyphs.push(TextGlyph::new(format!("label{}", r), 50.0, y, 40.0, 10.0, 1));
            // Baseline jitter below the 7px tolerance
            glyphs.push(TextGlyph::new(format!("{}", r * 10), 200.0, y + 3.0, 20.0, 10.0, 1));
        }
        let tables = TableDetector::default().detect(1, &glyphs);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].rows.len(), 4);
        assert_eq!(tables[0].column_count(), 2);
    }

    #[test]
    fn test_detection_is_deterministic() {
        let cells: &[&[&str]] = &[&["A", "B", "C"], &["1", "2", "3"], &["4", "5", "6"], &["7", "8", "9"]];
        let glyphs = table_glyphs(3, 50.0, cells, &[50.0, 150.0, 250.0]);
        let detector = TableDetector::default();

        let first = serde_json::to_string(&detector.detect(3, &glyphs)).unwrap();
        let second = serde_json::to_string(&detector.detect(3, &glyphs)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_blank_glyphs_ignored() {
        let glyphs = vec![TextGlyph::new("   ", 0.0, 0.0, 10.0, 10.0, 1)];
        assert!(TableDetector::default().detect(1, &glyphs).is_empty());
    }
}
