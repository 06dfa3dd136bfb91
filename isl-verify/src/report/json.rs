//! JSON report output

use super::VerificationReport;
use serde_json::json;

/// Render the full report as pretty-printed JSON
pub fn render(report: &VerificationReport) -> String {
    serde_json::to_string_pretty(report)
        .unwrap_or_else(|e| json!({ "error": e.to_string() }).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::tests::executed;

    #[test]
    fn test_json_carries_score_and_results() {
        let report = VerificationReport::new("Bank", vec![executed("Withdraw")], vec![], 12);
        let parsed: serde_json::Value = serde_json::from_str(&render(&report)).unwrap();

        assert_eq!(parsed["domain"], "Bank");
        assert_eq!(parsed["score"], 100);
        assert_eq!(parsed["passed"], true);
        assert_eq!(parsed["behaviors"][0]["behavior_name"], "Withdraw");
        assert_eq!(parsed["categories"][0]["category"], "preconditions");

        let back: VerificationReport = serde_json::from_str(&render(&report)).unwrap();
        assert_eq!(back, report);
    }
}
