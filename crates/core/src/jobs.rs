use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message on the analysis queue: run the three editorial phases.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisJob {
    pub manuscript_key: String,
    pub genre: String,
    pub style_guide: String,
    pub report_id: String,
}

/// Message on the asset queue: run the twelve-agent fan-out.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssetJob {
    pub manuscript_key: String,
    pub report_id: String,
    pub genre: String,
    #[serde(default)]
    pub author_data: Value,
    #[serde(default)]
    pub series_data: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn analysis_job_wire_shape() {
        let job: AnalysisJob = serde_json::from_value(json!({
            "manuscriptKey": "u1/m1/f.txt",
            "genre": "thriller",
            "styleGuide": "chicago",
            "reportId": "abc12345"
        }))
        .unwrap();
        assert_eq!(job.manuscript_key, "u1/m1/f.txt");
        assert_eq!(job.report_id, "abc12345");
    }

    #[test]
    fn asset_job_tolerates_missing_author_and_series_data() {
        let job: AssetJob = serde_json::from_value(json!({
            "manuscriptKey": "u1/m1/f.txt",
            "reportId": "abc12345",
            "genre": "thriller"
        }))
        .unwrap();
        assert!(job.author_data.is_null());
        assert!(job.series_data.is_null());
    }
}
