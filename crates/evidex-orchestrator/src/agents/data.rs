//! Typed payloads returned by the expert agents.

use serde::{Deserialize, Serialize};

use super::lenient;

/// Structured data extracted by one agent, keyed by data kind.
///
/// Serialized as `{"kind": "outcomes", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "kebab-case")]
pub enum ExtractedData {
    /// Cohort sizes and demographics.
    PatientData(PatientData),
    /// Outcome measures.
    Outcomes(Outcomes),
    /// Imaging modalities and findings.
    Imaging(Imaging),
    /// Surgical procedures.
    Surgical(Surgical),
    /// Study design descriptors.
    StudyDesign(StudyDesign),
    /// Predictors and effect sizes.
    Predictor(Predictors),
    /// Generic cleaned-up table.
    Table(TableData),
    /// Figure description.
    Figure(FigureData),
    /// Nothing was extracted (failed agents).
    Empty,
}

impl ExtractedData {
    /// The kebab-case kind tag.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::PatientData(_) => "patient-data",
            Self::Outcomes(_) => "outcomes",
            Self::Imaging(_) => "imaging",
            Self::Surgical(_) => "surgical",
            Self::StudyDesign(_) => "study-design",
            Self::Predictor(_) => "predictor",
            Self::Table(_) => "table",
            Self::Figure(_) => "figure",
            Self::Empty => "empty",
        }
    }

    /// Whether this is [`ExtractedData::Empty`].
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// A named count, e.g. one study arm.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupCount {
    /// Arm or subgroup label.
    #[serde(deserialize_with = "lenient::text")]
    pub name: String,
    /// Patients in the group.
    #[serde(deserialize_with = "lenient::opt_count")]
    pub count: Option<u64>,
}

/// A labelled value with its unit or format as printed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Measurement {
    /// What was measured.
    #[serde(deserialize_with = "lenient::text")]
    pub name: String,
    /// Value as printed, e.g. `"64 ± 11"` or `"38%"`.
    #[serde(deserialize_with = "lenient::opt_text")]
    pub value: Option<String>,
    /// Study arm the value belongs to.
    #[serde(deserialize_with = "lenient::opt_text")]
    pub group: Option<String>,
}

/// Cohort sizes and baseline characteristics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatientData {
    /// Patients enrolled across all groups.
    #[serde(deserialize_with = "lenient::opt_count")]
    pub total_patients: Option<u64>,
    /// Per-arm patient counts.
    #[serde(deserialize_with = "lenient::list")]
    pub groups: Vec<GroupCount>,
    /// Age, sex and other baseline characteristics.
    #[serde(deserialize_with = "lenient::list")]
    pub demographics: Vec<Measurement>,
}

/// One reported outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutcomeMeasure {
    /// Outcome name, e.g. `"Mortality"`.
    #[serde(deserialize_with = "lenient::text")]
    pub name: String,
    /// Value as printed.
    #[serde(deserialize_with = "lenient::opt_text")]
    pub value: Option<String>,
    /// Study arm the value belongs to.
    #[serde(deserialize_with = "lenient::opt_text")]
    pub group: Option<String>,
    /// When the outcome was assessed, e.g. `"90 days"`.
    #[serde(deserialize_with = "lenient::opt_text")]
    pub timepoint: Option<String>,
}

/// Outcome measures of a study.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Outcomes {
    /// Every reported measure.
    #[serde(deserialize_with = "lenient::list")]
    pub measures: Vec<OutcomeMeasure>,
    /// Follow-up duration.
    #[serde(deserialize_with = "lenient::opt_text")]
    pub follow_up: Option<String>,
}

/// Imaging modalities and findings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Imaging {
    /// CT, MRI, angiography, ...
    #[serde(deserialize_with = "lenient::texts")]
    pub modalities: Vec<String>,
    /// Imaging findings with their values.
    #[serde(deserialize_with = "lenient::list")]
    pub findings: Vec<Measurement>,
}

/// Surgical procedures and their complications.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Surgical {
    /// Procedures performed.
    #[serde(deserialize_with = "lenient::texts")]
    pub procedures: Vec<String>,
    /// Time from ictus or admission to surgery.
    #[serde(deserialize_with = "lenient::opt_text")]
    pub timing: Option<String>,
    /// Complications with their frequencies.
    #[serde(deserialize_with = "lenient::list")]
    pub complications: Vec<Measurement>,
}

/// Study design descriptors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudyDesign {
    /// Retrospective cohort, RCT, case series, ...
    #[serde(deserialize_with = "lenient::opt_text")]
    pub design: Option<String>,
    /// Single- or multi-centre, country.
    #[serde(deserialize_with = "lenient::opt_text")]
    pub setting: Option<String>,
    /// Enrolment period.
    #[serde(deserialize_with = "lenient::opt_text")]
    pub period: Option<String>,
    /// Inclusion criteria as listed.
    #[serde(deserialize_with = "lenient::texts")]
    pub inclusion_criteria: Vec<String>,
    /// Exclusion criteria as listed.
    #[serde(deserialize_with = "lenient::texts")]
    pub exclusion_criteria: Vec<String>,
}

/// One predictor with its effect estimate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorEffect {
    /// Predictor variable.
    #[serde(deserialize_with = "lenient::text")]
    pub name: String,
    /// "OR", "HR", "RR", "beta", ...
    #[serde(deserialize_with = "lenient::opt_text")]
    pub measure: Option<String>,
    /// Point estimate.
    #[serde(deserialize_with = "lenient::opt_number")]
    pub estimate: Option<f64>,
    /// Lower bound of the confidence interval.
    #[serde(deserialize_with = "lenient::opt_number")]
    pub ci_lower: Option<f64>,
    /// Upper bound of the confidence interval.
    #[serde(deserialize_with = "lenient::opt_number")]
    pub ci_upper: Option<f64>,
    /// `"<0.001"` reads as 0.001.
    #[serde(deserialize_with = "lenient::opt_number")]
    pub p_value: Option<f64>,
}

/// Predictors with effect estimates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Predictors {
    /// Every predictor reported.
    #[serde(deserialize_with = "lenient::list")]
    pub predictors: Vec<PredictorEffect>,
}

/// A cleaned-up generic table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableData {
    /// Table caption, if printed.
    #[serde(deserialize_with = "lenient::opt_text")]
    pub title: Option<String>,
    /// Column headers.
    #[serde(deserialize_with = "lenient::texts")]
    pub headers: Vec<String>,
    /// Body rows, cells as text.
    #[serde(deserialize_with = "lenient::rows")]
    pub rows: Vec<Vec<String>>,
}

/// What a figure shows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FigureData {
    /// Kaplan-Meier curve, forest plot, CT image, ...
    #[serde(deserialize_with = "lenient::opt_text")]
    pub figure_type: Option<String>,
    /// Plain-language description of the content.
    #[serde(deserialize_with = "lenient::opt_text")]
    pub description: Option<String>,
    /// Axis labels, legends and annotations read off the figure.
    #[serde(deserialize_with = "lenient::texts")]
    pub labels: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tagged_serialization() {
        let data = ExtractedData::Outcomes(Outcomes {
            measures: vec![OutcomeMeasure { name: "Mortality".into(), value: Some("12%".into()), ..Default::default() }],
            follow_up: None,
        });
        let value = serde_json::to_value(&data).unwrap();
        assert_eq!(value["kind"], "outcomes");
        assert_eq!(value["data"]["measures"][0]["name"], "Mortality");

        assert_eq!(serde_json::to_value(ExtractedData::Empty).unwrap(), json!({"kind": "empty"}));
    }

    #[test]
    fn test_payload_defaults_missing_fields() {
        let parsed: PatientData = serde_json::from_value(json!({"total_patients": 40})).unwrap();
        assert_eq!(parsed.total_patients, Some(40));
        assert!(parsed.groups.is_empty());
    }

    #[test]
    fn test_loose_scalars_are_coerced() {
        let outcomes: Outcomes = serde_json::from_value(json!({
            "measures": [
                {"name": "Mortality", "value": null},
                {"name": "Deaths", "value": 12, "group": "Surgery"},
                {"name": 90, "value": "44%", "timepoint": ""}
            ],
            "follow_up": null
        }))
        .unwrap();
        assert_eq!(outcomes.measures[0].value, None);
        assert_eq!(outcomes.measures[1].value.as_deref(), Some("12"));
        assert_eq!(outcomes.measures[2].name, "90");
        assert_eq!(outcomes.measures[2].timepoint, None);

        let patients: PatientData = serde_json::from_value(json!({
            "total_patients": "1,204",
            "groups": [{"name": "Surgery", "count": "42"}, {"name": "Conservative", "count": 57.0}, {"name": "Other", "count": "n/a"}],
            "demographics": null
        }))
        .unwrap();
        assert_eq!(patients.total_patients, Some(1204));
        let counts: Vec<Option<u64>> = patients.groups.iter().map(|g| g.count).collect();
        assert_eq!(counts, vec![Some(42), Some(57), None]);
        assert!(patients.demographics.is_empty());
    }

    #[test]
    fn test_estimates_read_from_strings() {
        let effect: PredictorEffect = serde_json::from_value(json!({
            "name": "GCS < 8",
            "measure": "OR",
            "estimate": "3.2",
            "ci_lower": 1.4,
            "ci_upper": null,
            "p_value": "<0.001"
        }))
        .unwrap();
        assert_eq!(effect.estimate, Some(3.2));
        assert_eq!(effect.ci_lower, Some(1.4));
        assert_eq!(effect.ci_upper, None);
        assert_eq!(effect.p_value, Some(0.001));
    }

    #[test]
    fn test_table_cells_keep_alignment() {
        let table: TableData =
            serde_json::from_value(json!({"headers": ["Outcome", "n"], "rows": [["Deaths", 7], ["Unknown", null]]}))
                .unwrap();
        assert_eq!(table.rows, vec![vec!["Deaths".to_string(), "7".into()], vec!["Unknown".into(), String::new()]]);

        assert!(serde_json::from_value::<TableData>(json!({"rows": "x"})).is_err());
        assert!(serde_json::from_value::<TableData>(json!({"rows": ["x"]})).is_err());
    }
}
