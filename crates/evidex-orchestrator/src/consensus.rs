//! Reconciles the agent results of one item into a single confidence.

use serde::{Deserialize, Serialize};

use crate::agents::AgentResult;

/// Review flag of an enhanced item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    /// At least one agent validated the item.
    Validated,
    /// No agent validated the item; a human should look at it.
    NeedsReview,
}

/// How the validated agents agreed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusData {
    /// Highest-confidence validated agent; the earliest dispatched wins ties.
    pub primary_agent: String,
    /// Validated agents in dispatch order.
    pub contributing_agents: Vec<String>,
    /// Spread between the highest and lowest validated confidence.
    pub agreement: f64,
}

/// Consensus over one item's agent results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consensus {
    /// Mean confidence of the validated results, 0 when there are none.
    pub overall_confidence: f64,
    /// `None` when no result was validated.
    pub consensus_data: Option<ConsensusData>,
    /// `Validated` iff at least one result was validated.
    pub review_status: ReviewStatus,
}

/// Merges agent results into a [`Consensus`].
pub struct ConsensusBuilder;

impl ConsensusBuilder {
    /// Builds the consensus of `results`, given in dispatch order.
    ///
    /// Only validated results count. Failed and needs-review results neither
    /// raise nor lower the overall confidence.
    #[must_use]
    pub fn build(results: &[AgentResult]) -> Consensus {
        let validated: Vec<&AgentResult> = results.iter().filter(|r| r.is_validated()).collect();

        let Some(first) = validated.first() else {
            return Consensus { overall_confidence: 0.0, consensus_data: None, review_status: ReviewStatus::NeedsReview };
        };

        let mut primary = *first;
        let mut min = first.confidence;
        let mut max = first.confidence;
        let mut sum = 0.0;
        for &result in &validated {
            sum += result.confidence;
            min = min.min(result.confidence);
            max = max.max(result.confidence);
            // Strictly greater keeps the earliest dispatched on ties
            if result.confidence > primary.confidence {
                primary = result;
            }
        }

        Consensus {
            overall_confidence: sum / validated.len() as f64,
            consensus_data: Some(ConsensusData {
                primary_agent: primary.agent_name.clone(),
                contributing_agents: validated.iter().map(|r| r.agent_name.clone()).collect(),
                agreement: max - min,
            }),
            review_status: ReviewStatus::Validated,
        }
    }
}
