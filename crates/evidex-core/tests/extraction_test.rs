//! Multi-page extraction over an in-memory document.

use async_trait::async_trait;
use evidex_core::{
    BoundedCache, CachedPageText, ClinicalDataType, ContentClassifier, PageDrawing, PageGeometry, PageSource,
    PageText, SourceError, TableDetector, TextGlyph,
};
use std::collections::HashMap;
use std::sync::Arc;

const LINE: f64 = 14.0;

struct InMemoryDocument {
    pages: HashMap<u32, Vec<TextGlyph>>,
}

#[async_trait]
impl PageSource for InMemoryDocument {
    async fn page_text(&self, page_number: u32) -> Result<PageText, SourceError> {
        let items = self.pages.get(&page_number).cloned().ok_or(SourceError::PageNotFound(page_number))?;
        let full_text = items.iter().map(|g| g.text.as_str()).collect::<Vec<_>>().join(" ");
        Ok(PageText { full_text, items })
    }

    async fn drawing_operations(&self, _page_number: u32) -> Result<PageDrawing, SourceError> {
        Ok(PageDrawing {
            geometry: PageGeometry { width: 612.0, height: 792.0 },
            operations: Vec::new(),
            resources: HashMap::new(),
        })
    }
}

/// Appends a list block starting at `top` and returns the y below it.
fn list_block(glyphs: &mut Vec<TextGlyph>, page: u32, top: f64, style: usize) -> f64 {
    let items = ["Headache", "Vertigo", "Nausea and vomiting", "Ataxia", "Dysarthria"];
    for (i, item) in items.iter().enumerate() {
        let y = top + i as f64 * LINE;
        match style % 3 {
            0 => glyphs.push(TextGlyph::new(*item, 72.0, y, 90.0, 10.0, page)),
            1 => {
                glyphs.push(TextGlyph::new("•", 72.0, y, 4.0, 10.0, page));
                glyphs.push(TextGlyph::new(*item, 90.0, y, 90.0, 10.0, page));
            }
            _ => {
                glyphs.push(TextGlyph::new(format!("{}.", i + 1), 72.0, y, 8.0, 10.0, page));
                glyphs.push(TextGlyph::new(*item, 95.0, y, 90.0, 10.0, page));
            }
        }
    }
    top + items.len() as f64 * LINE + 40.0
}

fn outcome_table(glyphs: &mut Vec<TextGlyph>, page: u32, top: f64) {
    let rows: [[&str; 3]; 5] = [
        ["Outcome", "Surgery", "Conservative"],
        ["Mortality", "12%", "31%"],
        ["mRS 0-2", "44%", "20%"],
        ["mRS 3-5", "38%", "41%"],
        ["Deaths", "7", "15"],
    ];
    for (r, row) in rows.iter().enumerate() {
        for (c, text) in row.iter().enumerate() {
            let x = 72.0 + c as f64 * 150.0;
            glyphs.push(TextGlyph::new(*text, x, top + r as f64 * LINE, 60.0, 10.0, page));
        }
    }
}

fn nine_page_document() -> InMemoryDocument {
    let mut pages = HashMap::new();
    let mut block = 0;
    for page in 1..=9 {
        let mut glyphs = Vec::new();
        let mut y = 60.0;
        for _ in 0..5 {
            y = list_block(&mut glyphs, page, y, block);
            block += 1;
        }
        if page == 5 {
            outcome_table(&mut glyphs, page, y);
        }
        pages.insert(page, glyphs);
    }
    assert!(block >= 40);
    InMemoryDocument { pages }
}

#[tokio::test]
async fn test_lists_are_not_tables_across_nine_pages() {
    let source: Arc<dyn PageSource> = Arc::new(nine_page_document());
    let cached = CachedPageText::new(source, 50);
    let detector = TableDetector::default();
    let classifier = ContentClassifier::default();

    let mut tables = Vec::new();
    for page in 1..=9 {
        let text = cached.page_text(page).await.unwrap();
        tables.extend(detector.detect(page, &text.items));
    }

    assert_eq!(tables.len(), 1, "found {} tables", tables.len());
    let table = &tables[0];
    assert_eq!(table.id, "table-p5-0");
    assert_eq!(table.page_number, 5);
    assert_eq!(table.rows.len(), 5);
    assert_eq!(table.column_count(), 3);
    assert_eq!(classifier.classify(table).clinical_data_type, ClinicalDataType::Outcomes);
}

#[tokio::test]
async fn test_repeated_extraction_is_byte_identical() {
    let source: Arc<dyn PageSource> = Arc::new(nine_page_document());
    let cached = CachedPageText::new(Arc::clone(&source), 50);
    let detector = TableDetector::default();

    let mut runs = Vec::new();
    for _ in 0..2 {
        let mut tables = Vec::new();
        for page in 1..=9 {
            let text = cached.page_text(page).await.unwrap();
            tables.extend(detector.detect(page, &text.items));
        }
        runs.push(serde_json::to_vec(&tables).unwrap());
    }

    assert_eq!(runs[0], runs[1]);
    assert_eq!(cached.stats().hits, 9);
    assert_eq!(cached.stats().misses, 9);

    // Bypassing the cache gives the same bytes
    let uncached = source.page_text(5).await.unwrap();
    let page_five: Vec<_> = serde_json::from_slice::<Vec<serde_json::Value>>(&runs[0])
        .unwrap()
        .into_iter()
        .filter(|t| t["page_number"] == 5)
        .collect();
    assert_eq!(
        serde_json::to_value(detector.detect(5, &uncached.items)).unwrap(),
        serde_json::Value::Array(page_five)
    );
}

#[tokio::test]
async fn test_missing_page_fails_only_that_page() {
    let source: Arc<dyn PageSource> = Arc::new(nine_page_document());
    let cached = CachedPageText::new(source, 4);

    assert_eq!(cached.page_text(10).await.unwrap_err(), SourceError::PageNotFound(10));
    assert!(cached.page_text(1).await.is_ok());
}

#[test]
fn test_bounded_cache_shared_across_threads() {
    let cache: Arc<BoundedCache<u32, String>> = Arc::new(BoundedCache::new(3));
    std::thread::scope(|scope| {
        for t in 0..3u32 {
            let cache = Arc::clone(&cache);
            scope.spawn(move || cache.put(t, t.to_string()));
        }
    });
    assert_eq!(cache.len(), 3);
}
