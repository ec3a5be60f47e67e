//! Expert agents: who gets called for which item, what they are asked, and
//! how their answers are read back.

pub mod data;
mod lenient;

use evidex_abstraction::{BackendError, parse_json_strict};
use evidex_core::ClinicalDataType;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;

use crate::error::FailureReason;
pub use data::ExtractedData;

/// The fixed set of expert agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentKind {
    PatientDataSpecialist,
    OutcomesAnalyst,
    NeuroimagingSpecialist,
    SurgicalExpert,
    StudyDesignExpert,
    PredictorAnalyst,
    TableExtractor,
    FigureAnalyst,
}

/// Agents called for figures.
pub const FIGURE_AGENTS: &[AgentKind] = &[AgentKind::FigureAnalyst, AgentKind::NeuroimagingSpecialist];

/// Agents called for a table of the given category, in dispatch order.
#[must_use]
pub const fn agents_for_table(data_type: ClinicalDataType) -> &'static [AgentKind] {
    use AgentKind::{
        NeuroimagingSpecialist, OutcomesAnalyst, PatientDataSpecialist, PredictorAnalyst, StudyDesignExpert,
        SurgicalExpert, TableExtractor,
    };
    match data_type {
        ClinicalDataType::PatientData => &[PatientDataSpecialist, StudyDesignExpert],
        ClinicalDataType::Outcomes => &[OutcomesAnalyst, StudyDesignExpert],
        ClinicalDataType::Imaging => &[NeuroimagingSpecialist, OutcomesAnalyst],
        ClinicalDataType::Surgical => &[SurgicalExpert, OutcomesAnalyst],
        ClinicalDataType::StudyDesign => &[StudyDesignExpert],
        ClinicalDataType::Predictor => &[PredictorAnalyst, OutcomesAnalyst],
        ClinicalDataType::Unknown => &[TableExtractor],
    }
}

/// A successfully parsed agent answer.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentOutput {
    /// Self-reported confidence, clamped to `[0, 1]`.
    pub confidence: f64,
    /// Typed payload of the agent's kind.
    pub data: ExtractedData,
    /// Supporting text quoted from the document, if any.
    pub source_quote: Option<String>,
}

#[derive(Deserialize)]
struct RawAnswer {
    confidence: f64,
    #[serde(default)]
    data: Value,
    #[serde(default, alias = "sourceQuote")]
    source_quote: Option<String>,
}

impl AgentKind {
    /// All agents.
    pub const ALL: [Self; 8] = [
        Self::PatientDataSpecialist,
        Self::OutcomesAnalyst,
        Self::NeuroimagingSpecialist,
        Self::SurgicalExpert,
        Self::StudyDesignExpert,
        Self::PredictorAnalyst,
        Self::TableExtractor,
        Self::FigureAnalyst,
    ];

    /// Agent name, also the key of its circuit breaker.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::PatientDataSpecialist => "PatientDataSpecialist",
            Self::OutcomesAnalyst => "OutcomesAnalyst",
            Self::NeuroimagingSpecialist => "NeuroimagingSpecialist",
            Self::SurgicalExpert => "SurgicalExpert",
            Self::StudyDesignExpert => "StudyDesignExpert",
            Self::PredictorAnalyst => "PredictorAnalyst",
            Self::TableExtractor => "TableExtractor",
            Self::FigureAnalyst => "FigureAnalyst",
        }
    }

    const fn role(&self) -> &'static str {
        match self {
            Self::PatientDataSpecialist => {
                "a clinical research assistant specializing in patient cohorts. Extract the total number of \
                 patients, the size of each study group, and demographic measures (age, sex, severity scores)"
            }
            Self::OutcomesAnalyst => {
                "a clinical outcomes analyst. Extract every reported outcome measure (mortality, functional \
                 scores, complications) with its value, the group it belongs to, and its timepoint"
            }
            Self::NeuroimagingSpecialist => {
                "a neuroimaging specialist. Identify the imaging modalities used (CT, MRI, angiography) and \
                 extract the reported imaging findings with their values"
            }
            Self::SurgicalExpert => {
                "a neurosurgical expert. Extract the surgical procedures performed, their timing, and any \
                 reported complications with their frequencies"
            }
            Self::StudyDesignExpert => {
                "a methodologist for systematic reviews. Extract the study design, setting, study period, and \
                 the inclusion and exclusion criteria"
            }
            Self::PredictorAnalyst => {
                "a biostatistician. Extract each predictor with its effect measure (OR, HR, RR), point \
                 estimate, 95% confidence interval, and p-value"
            }
            Self::TableExtractor => {
                "a data extraction assistant. Clean up the table: give its title if present, the column \
                 headers, and the data rows with merged or split cells repaired"
            }
            Self::FigureAnalyst => {
                "a scientific figure analyst. Classify the figure (chart, flow diagram, imaging panel, \
                 photograph), describe what it shows, and list its visible labels"
            }
        }
    }

    /// System instruction sent with every request from this agent.
    ///
    /// The agent's name always appears in the instruction.
    #[must_use]
    pub fn system_instruction(&self) -> String {
        format!(
            "You are {}, {}.\n\n\
             Respond with a JSON object only: `confidence` (a number from 0 to 1 reflecting how certain you \
             are that the extraction is correct and complete), `data` (the extracted fields), and \
             `source_quote` (the exact text from the document that supports the extraction). \
             If a field is not present, leave it empty; never invent values.",
            self.name(),
            self.role()
        )
    }

    fn data_schema(&self) -> Value {
        let text = json!({"type": "string"});
        let strings = json!({"type": "array", "items": {"type": "string"}});
        let measurement = json!({
            "type": "object",
            "properties": {"name": text, "value": text, "group": text}
        });
        let measurements = json!({"type": "array", "items": measurement});

        match self {
            Self::PatientDataSpecialist => json!({
                "type": "object",
                "properties": {
                    "total_patients": {"type": "integer"},
                    "groups": {
                        "type": "array",
                        "items": {"type": "object", "properties": {"name": text, "count": {"type": "integer"}}}
                    },
                    "demographics": measurements
                }
            }),
            Self::OutcomesAnalyst => json!({
                "type": "object",
                "properties": {
                    "measures": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {"name": text, "value": text, "group": text, "timepoint": text}
                        }
                    },
                    "follow_up": text
                }
            }),
            Self::NeuroimagingSpecialist => json!({
                "type": "object",
                "properties": {"modalities": strings, "findings": measurements}
            }),
            Self::SurgicalExpert => json!({
                "type": "object",
                "properties": {"procedures": strings, "timing": text, "complications": measurements}
            }),
            Self::StudyDesignExpert => json!({
                "type": "object",
                "properties": {
                    "design": text,
                    "setting": text,
                    "period": text,
                    "inclusion_criteria": strings,
                    "exclusion_criteria": strings
                }
            }),
            Self::PredictorAnalyst => {
                let number = json!({"type": "number"});
                json!({
                    "type": "object",
                    "properties": {
                        "predictors": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "name": text,
                                    "measure": text,
                                    "estimate": number,
                                    "ci_lower": number,
                                    "ci_upper": number,
                                    "p_value": number
                                }
                            }
                        }
                    }
                })
            }
            Self::TableExtractor => json!({
                "type": "object",
                "properties": {
                    "title": text,
                    "headers": strings,
                    "rows": {"type": "array", "items": strings}
                }
            }),
            Self::FigureAnalyst => json!({
                "type": "object",
                "properties": {"figure_type": text, "description": text, "labels": strings}
            }),
        }
    }

    /// JSON schema the backend's answer must follow.
    #[must_use]
    pub fn response_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "confidence": {"type": "number"},
                "data": self.data_schema(),
                "source_quote": {"type": "string"}
            },
            "required": ["confidence", "data"]
        })
    }

    /// Reads a backend payload into this agent's typed output.
    ///
    /// A payload that arrives as a JSON string is recovered with
    /// [`parse_json_strict`] first. A missing `data` field yields the empty
    /// payload of the agent's kind.
    ///
    /// # Errors
    /// `InvalidResponse` if the payload lacks a numeric confidence or its data
    /// does not fit the agent's payload type.
    pub fn parse_response(&self, payload: &Value) -> Result<AgentOutput, BackendError> {
        let recovered;
        let payload = match payload {
            Value::String(text) => {
                recovered = parse_json_strict(text)?;
                &recovered
            }
            other => other,
        };

        let raw: RawAnswer = serde_json::from_value(payload.clone())
            .map_err(|e| BackendError::InvalidResponse(format!("{} answer: {}", self.name(), e)))?;
        if !raw.confidence.is_finite() {
            return Err(BackendError::InvalidResponse(format!("{} answer: confidence is not finite", self.name())));
        }

        let data = match self {
            Self::PatientDataSpecialist => ExtractedData::PatientData(self.payload(raw.data)?),
            Self::OutcomesAnalyst => ExtractedData::Outcomes(self.payload(raw.data)?),
            Self::NeuroimagingSpecialist => ExtractedData::Imaging(self.payload(raw.data)?),
            Self::SurgicalExpert => ExtractedData::Surgical(self.payload(raw.data)?),
            Self::StudyDesignExpert => ExtractedData::StudyDesign(self.payload(raw.data)?),
            Self::PredictorAnalyst => ExtractedData::Predictor(self.payload(raw.data)?),
            Self::TableExtractor => ExtractedData::Table(self.payload(raw.data)?),
            Self::FigureAnalyst => ExtractedData::Figure(self.payload(raw.data)?),
        };

        Ok(AgentOutput {
            confidence: raw.confidence.clamp(0.0, 1.0),
            data,
            source_quote: raw.source_quote.filter(|quote| !quote.trim().is_empty()),
        })
    }

    fn payload<T: DeserializeOwned + Default>(&self, data: Value) -> Result<T, BackendError> {
        if data.is_null() {
            return Ok(T::default());
        }
        serde_json::from_value(data)
            .map_err(|e| BackendError::InvalidResponse(format!("{} data: {}", self.name(), e)))
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of one agent for one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    /// Parsed, with confidence at or above the validation threshold.
    Validated,
    /// Parsed, but below the validation threshold.
    NeedsReview,
    /// The agent call failed.
    Failed,
}

/// One agent's contribution to an enhanced item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    /// Name of the agent, see [`AgentKind::name`].
    pub agent_name: String,
    /// Clamped confidence; zero for failed calls.
    pub confidence: f64,
    /// Parsed payload, [`ExtractedData::Empty`] for failed calls.
    pub extracted_data: ExtractedData,
    /// Outcome of the call against the validation threshold.
    pub validation_status: ValidationStatus,
    /// Wall time of the call including retries and backoff.
    pub processing_time_ms: u64,
    /// Supporting text quoted by the agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_quote: Option<String>,
    /// Why the call failed, for failed results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReason>,
}

impl AgentResult {
    /// Result for a parsed answer, validated against `threshold`.
    #[must_use]
    pub fn from_output(agent: AgentKind, output: AgentOutput, threshold: f64, processing_time_ms: u64) -> Self {
        let validation_status = if output.confidence >= threshold {
            ValidationStatus::Validated
        } else {
            ValidationStatus::NeedsReview
        };
        Self {
            agent_name: agent.name().to_string(),
            confidence: output.confidence,
            extracted_data: output.data,
            validation_status,
            processing_time_ms,
            source_quote: output.source_quote,
            failure: None,
        }
    }

    /// Result for a failed call: zero confidence, empty data.
    #[must_use]
    pub fn failed(agent: AgentKind, failure: FailureReason, processing_time_ms: u64) -> Self {
        Self {
            agent_name: agent.name().to_string(),
            confidence: 0.0,
            extracted_data: ExtractedData::Empty,
            validation_status: ValidationStatus::Failed,
            processing_time_ms,
            source_quote: None,
            failure: Some(failure),
        }
    }

    /// Whether the result counts towards consensus.
    #[must_use]
    pub fn is_validated(&self) -> bool {
        self.validation_status == ValidationStatus::Validated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_routing() {
        assert_eq!(
            agents_for_table(ClinicalDataType::Outcomes),
            &[AgentKind::OutcomesAnalyst, AgentKind::StudyDesignExpert]
        );
        assert_eq!(agents_for_table(ClinicalDataType::StudyDesign), &[AgentKind::StudyDesignExpert]);
        assert_eq!(agents_for_table(ClinicalDataType::Unknown), &[AgentKind::TableExtractor]);
        assert_eq!(FIGURE_AGENTS[0].name(), "FigureAnalyst");
    }

    #[test]
    fn test_instruction_names_agent() {
        for agent in AgentKind::ALL {
            assert!(agent.system_instruction().contains(agent.name()));
            assert_eq!(agent.response_schema()["required"][0], "confidence");
        }
    }

    #[test]
    fn test_parse_typed_payload() {
        let payload = json!({
            "confidence": 0.87,
            "data": {"measures": [{"name": "Mortality", "value": "18%", "group": "Surgery"}]},
            "source_quote": "Mortality was 18% in the surgical group"
        });
        let output = AgentKind::OutcomesAnalyst.parse_response(&payload).unwrap();

        assert!((output.confidence - 0.87).abs() < f64::EPSILON);
        match output.data {
            ExtractedData::Outcomes(outcomes) => {
                assert_eq!(outcomes.measures.len(), 1);
                assert_eq!(outcomes.measures[0].group.as_deref(), Some("Surgery"));
            }
            other => panic!("Expected outcomes, got {:?}", other),
        }
        assert!(output.source_quote.is_some());
    }

    #[test]
    fn test_parse_accepts_null_and_numeric_values() {
        let payload = json!({
            "confidence": 0.9,
            "data": {"measures": [{"name": "Mortality", "value": null}, {"name": "Deaths", "value": 12}]}
        });
        let output = AgentKind::OutcomesAnalyst.parse_response(&payload).unwrap();

        match output.data {
            ExtractedData::Outcomes(outcomes) => {
                assert_eq!(outcomes.measures[0].value, None);
                assert_eq!(outcomes.measures[1].value.as_deref(), Some("12"));
            }
            other => panic!("Expected outcomes, got {:?}", other),
        }

        let payload = json!({"confidence": 0.8, "data": {"total_patients": "42", "groups": null}});
        let output = AgentKind::PatientDataSpecialist.parse_response(&payload).unwrap();
        match output.data {
            ExtractedData::PatientData(patients) => assert_eq!(patients.total_patients, Some(42)),
            other => panic!("Expected patient data, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_clamps_and_recovers_text() {
        let payload = Value::String("```json\n{\"confidence\": 1.4, \"sourceQuote\": \"\"}\n```".into());
        let output = AgentKind::StudyDesignExpert.parse_response(&payload).unwrap();

        assert!((output.confidence - 1.0).abs() < f64::EPSILON);
        assert_eq!(output.data, ExtractedData::StudyDesign(data::StudyDesign::default()));
        assert!(output.source_quote.is_none());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        let missing = AgentKind::TableExtractor.parse_response(&json!({"data": {}}));
        assert!(matches!(missing, Err(BackendError::InvalidResponse(_))));

        let wrong_shape = AgentKind::TableExtractor.parse_response(&json!({"confidence": 0.9, "data": {"rows": "x"}}));
        assert!(matches!(wrong_shape, Err(BackendError::InvalidResponse(_))));
    }

    #[test]
    fn test_validation_threshold_is_inclusive() {
        let output = AgentOutput { confidence: 0.5, data: ExtractedData::Empty, source_quote: None };
        let result = AgentResult::from_output(AgentKind::FigureAnalyst, output.clone(), 0.5, 10);
        assert!(result.is_validated());

        let below = AgentOutput { confidence: 0.49, ..output };
        let result = AgentResult::from_output(AgentKind::FigureAnalyst, below, 0.5, 10);
        assert_eq!(result.validation_status, ValidationStatus::NeedsReview);
    }
}
