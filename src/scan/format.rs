//! Terminal rendering for scan results

use colored::Colorize;

use super::ScanResult;

/// Colored text report: summary line, per-repository sections, failures.
pub fn render_scan_text(result: &ScanResult) -> String {
    let mut out = String::new();

    out.push_str(&format!("{}\n", result.text_summary.bold()));

    for summary in &result.affected_repositories {
        out.push_str(&format!(
            "\n{} ({} impact{}):\n",
            summary.repo.cyan(),
            summary.impact_count,
            if summary.impact_count == 1 { "" } else { "s" }
        ));
        for impact in &summary.impacts {
            let risk = impact
                .assessment
                .impact_details
                .as_ref()
                .map(|d| d.risk_level.as_str())
                .unwrap_or("UNKNOWN");
            out.push_str(&format!(
                "  {} — {} ({:?}) [{}]\n",
                impact.affected_file,
                impact.dependency.name,
                impact.dependency.kind,
                risk
            ));
            if !impact.assessment.summary.is_empty() {
                out.push_str(&format!("    {}\n", impact.assessment.summary.dimmed()));
            }
        }
    }

    if !result.failed_repositories.is_empty() {
        out.push_str(&format!(
            "\n{} {}\n",
            "Failed:".yellow(),
            result.failed_repositories.join(", ")
        ));
    }

    out
}
