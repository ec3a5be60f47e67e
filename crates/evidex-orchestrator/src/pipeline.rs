//! Page-level pipeline: geometry, classification, enhancement, provenance.

use evidex_abstraction::{BackendError, ExpertBackend};
use evidex_core::config::BackendSection;
use evidex_core::{
    BoundingBox, CacheStats, CachedPageText, ClassifiedTable, ContentClassifier, EvidexConfig, ExtractedFigure,
    ExtractionMethod, FigureExtractor, PageSource, ProvenanceTracker, SourceError, TableDetector,
};
use evidex_models::{BackendConfig, BackendFactory, BackendType};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::orchestrator::{AgentOrchestrator, Enhanced, EnhancedFigure, EnhancedTable, PipelineStats};
use crate::resilience::{BreakerRegistry, CircuitStatus};

/// A page whose text could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageFailure {
    /// 1-based page number.
    pub page: u32,
    /// Rendered source error.
    pub error: String,
}

/// Output of one [`ExtractionPipeline::run`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Enhanced tables in page order.
    pub tables: Vec<EnhancedTable>,
    /// Enhanced figures in page order.
    pub figures: Vec<EnhancedFigure>,
    /// Counts and confidence over the whole run.
    pub stats: PipelineStats,
    /// Pages whose text could not be read.
    pub failed_pages: Vec<PageFailure>,
}

/// Enhanced items of a single page.
#[derive(Debug, Clone, Default)]
pub struct PageOutput {
    /// Enhanced tables of the page.
    pub tables: Vec<EnhancedTable>,
    /// Enhanced figures of the page, empty when drawing operations were unreadable.
    pub figures: Vec<EnhancedFigure>,
}

/// Runs geometric extraction and agent enhancement over the pages of one document.
#[derive(Debug)]
pub struct ExtractionPipeline {
    pages: CachedPageText,
    table_detector: TableDetector,
    figure_extractor: FigureExtractor,
    classifier: ContentClassifier,
    orchestrator: AgentOrchestrator,
    provenance: Arc<ProvenanceTracker>,
}

impl ExtractionPipeline {
    /// Creates a pipeline over `source`, calling agents through `backend`.
    #[must_use]
    pub fn new(source: Arc<dyn PageSource>, backend: Arc<dyn ExpertBackend>, config: &EvidexConfig) -> Self {
        let breakers = Arc::new(BreakerRegistry::from_config(&config.resilience));
        Self {
            pages: CachedPageText::new(source, config.cache.max_cache_size),
            table_detector: TableDetector::new(config.tables.clone()),
            figure_extractor: FigureExtractor::new(config.figures.clone()),
            classifier: ContentClassifier::new(config.classifier.clone()),
            orchestrator: AgentOrchestrator::new(backend, breakers, config.agents.clone()),
            provenance: Arc::new(ProvenanceTracker::new()),
        }
    }

    /// Creates a pipeline whose backend is built from the `[backend]` section.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or the primary backend
    /// cannot be created.
    pub fn from_config(source: Arc<dyn PageSource>, config: &EvidexConfig) -> Result<Self> {
        config.validate()?;
        let backend = backend_from_config(&config.backend)?;
        info!(backend = backend.backend_id(), "Extraction pipeline ready");
        Ok(Self::new(source, backend, config))
    }

    /// Shares the provenance log with callers.
    #[must_use]
    pub fn with_provenance(mut self, provenance: Arc<ProvenanceTracker>) -> Self {
        self.provenance = provenance;
        self
    }

    /// The provenance log.
    pub fn provenance(&self) -> &Arc<ProvenanceTracker> {
        &self.provenance
    }

    /// Page-text cache statistics.
    pub fn cache_stats(&self) -> CacheStats {
        self.pages.stats()
    }

    /// Breaker status of every agent called so far.
    pub fn breaker_statuses(&self) -> Vec<(String, CircuitStatus)> {
        self.orchestrator.breakers().statuses()
    }

    /// Extracts and enhances one page.
    ///
    /// # Errors
    /// Only a failed page-text read is an error. Drawing operations that
    /// cannot be read cost the page its figures, nothing more.
    pub async fn process_page(&self, page: u32) -> std::result::Result<PageOutput, SourceError> {
        let (text, drawing) = tokio::join!(self.pages.page_text(page), self.pages.source().drawing_operations(page));
        let text = text?;

        let tables: Vec<ClassifiedTable> = self
            .table_detector
            .detect(page, &text.items)
            .iter()
            .map(|table| self.classifier.classify(table))
            .collect();

        let figures = match drawing {
            Ok(drawing) => {
                let (figures, diagnostics) = self.figure_extractor.extract(page, &drawing);
                debug!(
                    page,
                    considered = diagnostics.regions_considered,
                    accepted = diagnostics.regions_accepted,
                    skipped = diagnostics.regions_skipped,
                    "Figures extracted"
                );
                figures
            }
            Err(e) => {
                warn!(page, error = %e, "Drawing operations unavailable, skipping figures");
                Vec::new()
            }
        };

        debug!(page, tables = tables.len(), figures = figures.len(), "Page geometry extracted");
        for table in &tables {
            self.provenance.record(
                &table.table.id,
                table.table.to_tsv(),
                page,
                table.table.bounding_box,
                ExtractionMethod::Geometric,
            );
        }
        for figure in &figures {
            self.provenance.record(
                &figure.id,
                figure_summary(figure),
                page,
                figure.bounding_box,
                ExtractionMethod::Geometric,
            );
        }

        let context = text.full_text.clone();
        let (tables, figures) = self
            .orchestrator
            .enhance_items(tables.into_iter().map(|table| (table, context.clone())).collect(), figures)
            .await;

        for enhanced in &tables {
            let table = &enhanced.item.table;
            self.record_consensus(enhanced, &table.id, table.to_tsv(), page, table.bounding_box);
        }
        for enhanced in &figures {
            let figure = &enhanced.item;
            self.record_consensus(enhanced, &figure.id, figure_summary(figure), page, figure.bounding_box);
        }

        Ok(PageOutput { tables, figures })
    }

    /// Records the primary agent's extraction when consensus was reached.
    fn record_consensus<T>(
        &self,
        enhanced: &Enhanced<T>,
        field_name: &str,
        fallback_text: String,
        page: u32,
        coordinates: BoundingBox,
    ) {
        let Some(primary) = enhanced.primary_result() else {
            return;
        };
        let text = primary.source_quote.clone().unwrap_or(fallback_text);
        self.provenance.record(
            field_name,
            text,
            page,
            coordinates,
            ExtractionMethod::Agent(primary.agent_name.clone()),
        );
    }

    /// Processes `pages` concurrently.
    ///
    /// Always completes: pages whose text cannot be read are reported in
    /// `failed_pages`. Items come back in page order.
    pub async fn run(&self, pages: &[u32]) -> PipelineRun {
        let started = Instant::now();
        info!(pages = pages.len(), "Starting extraction run");

        let outcomes = join_all(pages.iter().map(|&page| async move { (page, self.process_page(page).await) })).await;

        let mut tables = Vec::new();
        let mut figures = Vec::new();
        let mut failed_pages = Vec::new();
        for (page, outcome) in outcomes {
            match outcome {
                Ok(output) => {
                    tables.extend(output.tables);
                    figures.extend(output.figures);
                }
                Err(e) => {
                    warn!(page, error = %e, "Page failed");
                    failed_pages.push(PageFailure { page, error: e.to_string() });
                }
            }
        }

        let stats = PipelineStats::compute(&tables, &figures, started.elapsed().as_millis() as u64);
        info!(
            tables = stats.tables_processed,
            figures = stats.figures_processed,
            failed_pages = failed_pages.len(),
            average_confidence = stats.average_confidence,
            elapsed_ms = stats.total_processing_time_ms,
            "Extraction run complete"
        );

        PipelineRun { tables, figures, stats, failed_pages }
    }
}

fn figure_summary(figure: &ExtractedFigure) -> String {
    format!("{}x{} px figure", figure.pixel_width, figure.pixel_height)
}

/// Builds the primary backend, with failover when a fallback is configured.
///
/// # Errors
/// Returns an error for unknown backend names or when the primary backend
/// has no API key.
pub fn backend_from_config(section: &BackendSection) -> std::result::Result<Arc<dyn ExpertBackend>, BackendError> {
    let primary = backend_config(section, section.primary.parse()?, &section.primary_model);
    let fallback = match section.fallback.as_deref() {
        Some(name) => Some(backend_config(section, name.parse()?, &section.fallback_model)),
        None => None,
    };
    BackendFactory::create_with_fallback(primary, fallback)
}

fn backend_config(section: &BackendSection, backend_type: BackendType, model_id: &str) -> BackendConfig {
    let config = BackendConfig::new(backend_type, model_id);
    let key = match backend_type {
        BackendType::Gemini => section.resolve_gemini_key(),
        BackendType::Anthropic => section.resolve_anthropic_key(),
        BackendType::Mock => None,
    };
    match key {
        Some(key) => config.with_api_key(key),
        None => config,
    }
}
