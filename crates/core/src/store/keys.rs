use std::time::Duration;

/// Report-id mapping entries live 30 days.
pub const REPORT_MAPPING_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Progress records live 7 days.
pub const PROGRESS_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

pub fn developmental_analysis(manuscript_key: &str) -> String {
    format!("{manuscript_key}-analysis.json")
}

pub fn line_analysis(manuscript_key: &str) -> String {
    format!("{manuscript_key}-line-analysis.json")
}

pub fn copy_analysis(manuscript_key: &str) -> String {
    format!("{manuscript_key}-copy-analysis.json")
}

pub fn asset_artifact(manuscript_key: &str, asset: &str) -> String {
    format!("{manuscript_key}-{asset}.json")
}

pub fn asset_bundle(manuscript_key: &str) -> String {
    format!("{manuscript_key}-assets.json")
}

pub fn report_mapping(report_id: &str) -> String {
    format!("report-id:{report_id}")
}

pub fn editorial_status(report_id: &str) -> String {
    format!("status:{report_id}")
}

pub fn asset_status(report_id: &str) -> String {
    format!("asset-status:{report_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_key_shapes() {
        assert_eq!(
            developmental_analysis("u1/m1/f.txt"),
            "u1/m1/f.txt-analysis.json"
        );
        assert_eq!(line_analysis("k"), "k-line-analysis.json");
        assert_eq!(copy_analysis("k"), "k-copy-analysis.json");
        assert_eq!(asset_artifact("k", "keywords"), "k-keywords.json");
        assert_eq!(asset_bundle("k"), "k-assets.json");
        assert_eq!(report_mapping("abc12345"), "report-id:abc12345");
        assert_eq!(editorial_status("abc12345"), "status:abc12345");
        assert_eq!(asset_status("abc12345"), "asset-status:abc12345");
    }
}
