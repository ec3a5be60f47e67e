//! Fans items out to their expert agents and merges the answers.

use evidex_abstraction::{BackendRequest, ExpertBackend, UserContent};
use evidex_core::config::AgentSection;
use evidex_core::{ClassifiedTable, ExtractedFigure};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::agents::{AgentKind, AgentResult, FIGURE_AGENTS, agents_for_table};
use crate::consensus::{ConsensusBuilder, ConsensusData, ReviewStatus};
use crate::error::FailureReason;
use crate::resilience::BreakerRegistry;

/// An item with its agent results and consensus.
///
/// Built once after every agent call for the item has settled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enhanced<T> {
    /// The original record.
    #[serde(flatten)]
    pub item: T,
    /// One result per dispatched agent, in dispatch order.
    pub agent_results: Vec<AgentResult>,
    /// Mean confidence of the validated results.
    pub overall_confidence: f64,
    /// Primary agent and agreement, absent when nothing validated.
    pub consensus_data: Option<ConsensusData>,
    /// Whether a human needs to look at the item.
    pub review_status: ReviewStatus,
}

impl<T> Enhanced<T> {
    fn new(item: T, agent_results: Vec<AgentResult>) -> Self {
        let consensus = ConsensusBuilder::build(&agent_results);
        Self {
            item,
            agent_results,
            overall_confidence: consensus.overall_confidence,
            consensus_data: consensus.consensus_data,
            review_status: consensus.review_status,
        }
    }

    /// The primary agent's result, when consensus was reached.
    pub fn primary_result(&self) -> Option<&AgentResult> {
        let primary = &self.consensus_data.as_ref()?.primary_agent;
        self.agent_results.iter().find(|r| &r.agent_name == primary)
    }
}

/// A classified table after agent enhancement.
pub type EnhancedTable = Enhanced<ClassifiedTable>;

/// A figure after agent enhancement.
pub type EnhancedFigure = Enhanced<ExtractedFigure>;

/// Statistics of one enhancement batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Tables enhanced.
    pub tables_processed: usize,
    /// Figures enhanced.
    pub figures_processed: usize,
    /// Agent calls dispatched, failed ones included.
    pub agents_invoked: usize,
    /// Mean overall confidence across all items.
    pub average_confidence: f64,
    /// Wall time of the whole batch.
    pub total_processing_time_ms: u64,
}

impl PipelineStats {
    /// Computes statistics once every item has been finalized.
    #[must_use]
    pub fn compute(tables: &[EnhancedTable], figures: &[EnhancedFigure], total_processing_time_ms: u64) -> Self {
        let confidences: Vec<f64> = tables
            .iter()
            .map(|t| t.overall_confidence)
            .chain(figures.iter().map(|f| f.overall_confidence))
            .collect();
        let average_confidence = if confidences.is_empty() {
            0.0
        } else {
            confidences.iter().sum::<f64>() / confidences.len() as f64
        };

        Self {
            tables_processed: tables.len(),
            figures_processed: figures.len(),
            agents_invoked: tables.iter().map(|t| t.agent_results.len()).sum::<usize>()
                + figures.iter().map(|f| f.agent_results.len()).sum::<usize>(),
            average_confidence,
            total_processing_time_ms,
        }
    }
}

/// Enhanced items of one batch plus their statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancementBatch {
    /// Tables in submission order.
    pub tables: Vec<EnhancedTable>,
    /// Figures in submission order.
    pub figures: Vec<EnhancedFigure>,
    /// Counts and confidence over the batch.
    pub stats: PipelineStats,
}

/// Dispatches tables and figures to their expert agents.
///
/// Every agent call goes through the agent's own resilient invoker, so a
/// failing agent trips only its own circuit.
pub struct AgentOrchestrator {
    backend: Arc<dyn ExpertBackend>,
    breakers: Arc<BreakerRegistry>,
    config: AgentSection,
}

impl AgentOrchestrator {
    /// Creates an orchestrator.
    #[must_use]
    pub fn new(backend: Arc<dyn ExpertBackend>, breakers: Arc<BreakerRegistry>, config: AgentSection) -> Self {
        Self { backend, breakers, config }
    }

    /// The per-agent breakers.
    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }

    /// Enhances one table. `page_context` is the text of the table's page.
    pub async fn enhance_table(&self, table: ClassifiedTable, page_context: &str) -> EnhancedTable {
        let agents = agents_for_table(table.clinical_data_type);
        let content = UserContent::Text(self.table_content(&table, page_context));
        debug!(
            table_id = %table.table.id,
            data_type = %table.clinical_data_type,
            agents = agents.len(),
            "Enhancing table"
        );

        let results = self.run_agents(agents, &content).await;
        Enhanced::new(table, results)
    }

    /// Enhances one figure, sent to its agents as PNG.
    pub async fn enhance_figure(&self, figure: ExtractedFigure) -> EnhancedFigure {
        debug!(figure_id = %figure.id, agents = FIGURE_AGENTS.len(), "Enhancing figure");

        let results = match figure.to_png() {
            Ok(png) => {
                let content = UserContent::Binary { mime_type: "image/png".to_string(), data: png };
                self.run_agents(FIGURE_AGENTS, &content).await
            }
            Err(e) => {
                warn!(figure_id = %figure.id, error = %e, "Figure could not be encoded, skipping agents");
                let failure = FailureReason::NonRetryable { error: format!("PNG encoding failed: {}", e) };
                FIGURE_AGENTS.iter().map(|&agent| AgentResult::failed(agent, failure.clone(), 0)).collect()
            }
        };
        Enhanced::new(figure, results)
    }

    /// Enhances tables and figures concurrently, preserving input order.
    ///
    /// Tables are paired with the text of their page.
    pub async fn enhance_items(
        &self,
        tables: Vec<(ClassifiedTable, String)>,
        figures: Vec<ExtractedFigure>,
    ) -> (Vec<EnhancedTable>, Vec<EnhancedFigure>) {
        let table_futures = tables.into_iter().map(|(table, context)| async move {
            self.enhance_table(table, &context).await
        });
        let figure_futures = figures.into_iter().map(|figure| self.enhance_figure(figure));

        futures::join!(join_all(table_futures), join_all(figure_futures))
    }

    /// Enhances a whole batch and computes its statistics.
    pub async fn enhance_all(
        &self,
        tables: Vec<(ClassifiedTable, String)>,
        figures: Vec<ExtractedFigure>,
    ) -> EnhancementBatch {
        let started = Instant::now();
        info!(tables = tables.len(), figures = figures.len(), "Starting enhancement batch");

        let (tables, figures) = self.enhance_items(tables, figures).await;
        let stats = PipelineStats::compute(&tables, &figures, started.elapsed().as_millis() as u64);

        info!(
            agents_invoked = stats.agents_invoked,
            average_confidence = stats.average_confidence,
            elapsed_ms = stats.total_processing_time_ms,
            "Enhancement batch complete"
        );
        EnhancementBatch { tables, figures, stats }
    }

    async fn run_agents(&self, agents: &[AgentKind], content: &UserContent) -> Vec<AgentResult> {
        join_all(agents.iter().map(|&agent| self.run_agent(agent, content))).await
    }

    async fn run_agent(&self, agent: AgentKind, content: &UserContent) -> AgentResult {
        let started = Instant::now();
        let invoker = self.breakers.invoker(agent.name());
        let request = BackendRequest::new(agent.system_instruction(), content.clone(), agent.response_schema())
            .with_temperature(self.config.temperature);

        let backend = &self.backend;
        let request = &request;
        let outcome = invoker
            .invoke(|| async move {
                let response = backend.generate(request).await?;
                agent.parse_response(&response.payload)
            })
            .await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(output) => {
                debug!(agent = agent.name(), confidence = output.confidence, elapsed_ms, "Agent answered");
                AgentResult::from_output(agent, output, self.config.validation_threshold, elapsed_ms)
            }
            Err(e) => {
                warn!(agent = agent.name(), error = %e, elapsed_ms, "Agent failed");
                AgentResult::failed(agent, e.to_failure(), elapsed_ms)
            }
        }
    }

    fn table_content(&self, table: &ClassifiedTable, page_context: &str) -> String {
        let mut content = format!(
            "Table {} (page {}, classified as {}):\n\n{}",
            table.table.id,
            table.table.page_number,
            table.clinical_data_type,
            table.table.to_tsv()
        );

        let context = page_context.trim();
        if !context.is_empty() {
            let truncated: String = context.chars().take(self.config.max_context_chars).collect();
            content.push_str("\n\nPage context:\n");
            content.push_str(&truncated);
        }
        content
    }
}

impl std::fmt::Debug for AgentOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentOrchestrator")
            .field("backend", &self.backend.backend_id())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evidex_abstraction::BackendError;
    use evidex_core::{BoundingBox, ClinicalDataType, ExtractedTable};
    use evidex_models::{MockBackend, MockReply};
    use serde_json::json;

    fn orchestrator(backend: MockBackend) -> AgentOrchestrator {
        AgentOrchestrator::new(Arc::new(backend), Arc::new(BreakerRegistry::default()), AgentSection::default())
    }

    fn table(data_type: ClinicalDataType) -> ClassifiedTable {
        ClassifiedTable {
            table: ExtractedTable {
                id: "table-p3-0".into(),
                page_number: 3,
                bounding_box: BoundingBox::new(50.0, 100.0, 400.0, 120.0),
                rows: vec![
                    vec!["Outcome".into(), "Surgery".into()],
                    vec!["Mortality".into(), "18%".into()],
                    vec!["mRS 0-2".into(), "42%".into()],
                    vec!["Complications".into(), "9".into()],
                ],
            },
            clinical_data_type: data_type,
        }
    }

    #[test]
    fn test_table_content_truncates_context() {
        let orchestrator = AgentOrchestrator::new(
            Arc::new(MockBackend::new("mock", MockReply::Payload(json!({})))),
            Arc::new(BreakerRegistry::default()),
            AgentSection { max_context_chars: 5, ..AgentSection::default() },
        );
        let content = orchestrator.table_content(&table(ClinicalDataType::Outcomes), "  abcdefghij  ");

        assert!(content.starts_with("Table table-p3-0 (page 3, classified as outcomes)"));
        assert!(content.contains("Mortality\t18%"));
        assert!(content.ends_with("Page context:\nabcde"));
    }

    #[tokio::test]
    async fn test_failed_agent_does_not_affect_sibling() {
        let backend = MockBackend::new("mock", MockReply::Payload(json!({"confidence": 0.9, "data": {}})))
            .with_route(
                "StudyDesignExpert",
                vec![MockReply::Error(BackendError::Unauthorized("revoked".into()))],
            );
        let enhanced = orchestrator(backend).enhance_table(table(ClinicalDataType::Outcomes), "").await;

        assert_eq!(enhanced.agent_results.len(), 2);
        assert_eq!(enhanced.agent_results[0].agent_name, "OutcomesAnalyst");
        assert!(enhanced.agent_results[0].is_validated());

        let failed = &enhanced.agent_results[1];
        assert_eq!(failed.validation_status, crate::agents::ValidationStatus::Failed);
        assert!(failed.extracted_data.is_empty());
        assert!(matches!(failed.failure, Some(FailureReason::NonRetryable { .. })));

        assert!((enhanced.overall_confidence - 0.9).abs() < 1e-9);
        assert_eq!(enhanced.primary_result().map(|r| r.agent_name.as_str()), Some("OutcomesAnalyst"));
    }

    #[tokio::test]
    async fn test_unparseable_answer_fails_agent() {
        let backend = MockBackend::new("mock", MockReply::Payload(json!({"answer": "no idea"})));
        let enhanced = orchestrator(backend).enhance_table(table(ClinicalDataType::StudyDesign), "").await;

        assert_eq!(enhanced.agent_results.len(), 1);
        assert_eq!(enhanced.review_status, ReviewStatus::NeedsReview);
        assert!(enhanced.overall_confidence.abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_broken_figure_fails_all_agents_without_calls() {
        let backend = Arc::new(MockBackend::new("mock", MockReply::Payload(json!({"confidence": 0.9}))));
        let orchestrator = AgentOrchestrator::new(
            Arc::clone(&backend) as Arc<dyn ExpertBackend>,
            Arc::new(BreakerRegistry::default()),
            AgentSection::default(),
        );
        let figure = ExtractedFigure {
            id: "figure-p1-0".into(),
            page_number: 1,
            bounding_box: BoundingBox::new(0.0, 0.0, 100.0, 100.0),
            pixel_width: 4,
            pixel_height: 4,
            pixel_data: vec![0; 3],
            size_bytes: 3,
        };

        let enhanced = orchestrator.enhance_figure(figure).await;
        assert_eq!(enhanced.agent_results.len(), 2);
        assert!(enhanced.agent_results.iter().all(|r| r.failure.is_some()));
        assert_eq!(backend.call_count(), 0);
    }

    #[test]
    fn test_stats_of_empty_batch() {
        let stats = PipelineStats::compute(&[], &[], 0);
        assert_eq!(stats, PipelineStats::default());
    }
}
