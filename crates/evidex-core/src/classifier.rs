//! Keyword-based labelling of table content.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::config::ClassifierSection;
use crate::types::{ClassifiedTable, ClinicalDataType, ExtractedTable};

const PREDICTOR_KEYWORDS: &[&str] = &[
    "odds ratio", "hazard ratio", "95% ci", "ci", "confidence interval", "p-value", "p value",
    "regression", "multivariate", "multivariable", "univariate", "predictor", "predictors",
    "risk factor", "risk factors", "auc", "coefficient",
];

const OUTCOME_KEYWORDS: &[&str] = &[
    "mortality", "death", "deaths", "died", "survival", "survived", "outcome", "outcomes", "mrs",
    "rankin", "gos", "glasgow outcome", "functional", "recovery", "discharge", "complications",
];

const IMAGING_KEYWORDS: &[&str] = &[
    "ct", "mri", "imaging", "scan", "dwi", "diffusion", "angiography", "lesion", "infarct",
    "infarct volume", "hydrocephalus", "midline shift", "herniation", "brainstem compression",
];

const SURGICAL_KEYWORDS: &[&str] = &[
    "craniectomy", "decompression", "decompressive", "surgery", "surgical", "suboccipital",
    "ventriculostomy", "evd", "external ventricular drain", "resection", "operative",
    "procedure", "duraplasty",
];

const PATIENT_KEYWORDS: &[&str] = &[
    "patients", "patient", "age", "mean age", "sex", "male", "female", "gender", "demographics",
    "baseline", "characteristics", "bmi", "hypertension", "diabetes", "gcs",
];

const STUDY_DESIGN_KEYWORDS: &[&str] = &[
    "retrospective", "prospective", "randomized", "randomised", "trial", "study design",
    "inclusion", "exclusion", "criteria", "multicenter", "single center", "case series",
    "cohort study", "follow-up period",
];

/// Keyword patterns in tie-break precedence order: earlier wins on equal scores.
static CATEGORY_PATTERNS: Lazy<Vec<(ClinicalDataType, Regex)>> = Lazy::new(|| {
    [
        (ClinicalDataType::Predictor, PREDICTOR_KEYWORDS),
        (ClinicalDataType::Outcomes, OUTCOME_KEYWORDS),
        (ClinicalDataType::Imaging, IMAGING_KEYWORDS),
        (ClinicalDataType::Surgical, SURGICAL_KEYWORDS),
        (ClinicalDataType::PatientData, PATIENT_KEYWORDS),
        (ClinicalDataType::StudyDesign, STUDY_DESIGN_KEYWORDS),
    ]
    .into_iter()
    .map(|(category, keywords)| (category, keyword_regex(keywords)))
    .collect()
});

fn keyword_regex(keywords: &[&str]) -> Regex {
    // Longest first so multi-word phrases win over their prefixes
    let mut sorted: Vec<&str> = keywords.to_vec();
    sorted.sort_by_key(|k| std::cmp::Reverse(k.len()));
    let alternation = sorted.iter().map(|k| regex::escape(k)).collect::<Vec<_>>().join("|");
    Regex::new(&format!(r"(?i)\b(?:{})\b", alternation)).expect("Keyword regex should be valid")
}

/// Assigns a [`ClinicalDataType`] to tables by keyword counts.
#[derive(Debug, Clone, Default)]
pub struct ContentClassifier {
    config: ClassifierSection,
}

impl ContentClassifier {
    /// Creates a classifier.
    #[must_use]
    pub fn new(config: ClassifierSection) -> Self {
        Self { config }
    }

    /// Keyword hit counts per category, in precedence order.
    #[must_use]
    pub fn scores(&self, text: &str) -> Vec<(ClinicalDataType, usize)> {
        CATEGORY_PATTERNS
            .iter()
            .map(|(category, pattern)| (*category, pattern.find_iter(text).count()))
            .collect()
    }

    /// Labels free text. Scores below the configured minimum give `Unknown`.
    #[must_use]
    pub fn classify_text(&self, text: &str) -> ClinicalDataType {
        let mut best = (ClinicalDataType::Unknown, 0);
        for (category, score) in self.scores(text) {
            if score > best.1 {
                best = (category, score);
            }
        }

        if best.1 < self.config.min_keyword_matches {
            return ClinicalDataType::Unknown;
        }
        best.0
    }

    /// Labels a table from all of its cell text.
    #[must_use]
    pub fn classify(&self, table: &ExtractedTable) -> ClassifiedTable {
        let text = table.rows.iter().flatten().map(String::as_str).collect::<Vec<_>>().join(" ");
        let clinical_data_type = self.classify_text(&text);
        debug!(table_id = %table.id, %clinical_data_type, "Classified table");
        ClassifiedTable { table: table.clone(), clinical_data_type }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoundingBox;

    fn table(rows: &[&[&str]]) -> ExtractedTable {
        ExtractedTable {
            id: "table-p1-0".to_string(),
            page_number: 1,
            bounding_box: BoundingBox::default(),
            rows: rows.iter().map(|r| r.iter().map(|c| (*c).to_string()).collect()).collect(),
        }
    }

    #[test]
    fn test_outcome_table() {
        let t = table(&[
            &["Outcome", "Surgery", "Conservative"],
            &["Mortality", "12%", "30%"],
            &["mRS 0-2", "40%", "22%"],
            &["Deaths at discharge", "3", "9"],
        ]);
        // "Surgery" also scores, outcomes dominate
        assert_eq!(ContentClassifier::default().classify(&t).clinical_data_type, ClinicalDataType::Outcomes);
    }

    #[test]
    fn test_patient_table() {
        let t = table(&[
            &["Characteristic", "Value"],
            &["Patients", "84"],
            &["Mean age", "63"],
            &["Male", "51"],
        ]);
        assert_eq!(
            ContentClassifier::default().classify(&t).clinical_data_type,
            ClinicalDataType::PatientData
        );
    }

    #[test]
    fn test_predictor_table() {
        let t = table(&[
            &["Variable", "Odds ratio", "95% CI", "p-value"],
            &["Age", "1.04", "1.01-1.08", "0.02"],
            &["GCS < 8", "3.1", "1.2-7.9", "0.01"],
            &["Hydrocephalus", "2.2", "0.9-5.1", "0.08"],
        ]);
        assert_eq!(
            ContentClassifier::default().classify(&t).clinical_data_type,
            ClinicalDataType::Predictor
        );
    }

    #[test]
    fn test_below_minimum_is_unknown() {
        let t = table(&[&["Alpha", "Beta"], &["1", "2"], &["3", "4"], &["5", "Mortality"]]);
        assert_eq!(ContentClassifier::default().classify(&t).clinical_data_type, ClinicalDataType::Unknown);
    }

    #[test]
    fn test_ties_follow_precedence() {
        let classifier = ContentClassifier::default();
        // Two imaging hits and two surgical hits
        assert_eq!(classifier.classify_text("CT MRI craniectomy EVD"), ClinicalDataType::Imaging);
        // Two outcome hits and two predictor hits
        assert_eq!(classifier.classify_text("mortality survival regression AUC"), ClinicalDataType::Predictor);
    }

    #[test]
    fn test_keywords_match_whole_words_only() {
        let classifier = ContentClassifier::default();
        let scores = classifier.scores("actual factual");
        let imaging = scores.iter().find(|(c, _)| *c == ClinicalDataType::Imaging).unwrap();
        assert_eq!(imaging.1, 0);
    }

    #[test]
    fn test_classify_is_deterministic() {
        let classifier = ContentClassifier::new(ClassifierSection { min_keyword_matches: 1 });
        let t = table(&[&["Retrospective", "cohort study"]]);
        let first = classifier.classify(&t);
        let second = classifier.classify(&t);
        assert_eq!(first, second);
        assert_eq!(first.clinical_data_type, ClinicalDataType::StudyDesign);
    }
}
