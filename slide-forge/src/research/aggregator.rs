use crate::schemas::ResearchResult;

pub const LOW_CONFIDENCE_THRESHOLD: f64 = 0.5;
pub const LOW_CONFIDENCE_MARKER: &str = "⚠️ Low confidence";

/// Render joined results (already sorted by task id) as one Markdown report
pub fn render_report(results: &[ResearchResult], failed: usize) -> String {
    let succeeded = results.len().saturating_sub(failed);
    let mut out = String::from("# Research Report\n\n");
    out.push_str(&format!(
        "{} perspectives investigated: {} succeeded, {} failed.\n",
        results.len(),
        succeeded,
        failed
    ));

    for (i, result) in results.iter().enumerate() {
        out.push_str(&format!("\n## {}. {}\n\n", i + 1, result.perspective));
        if result.confidence < LOW_CONFIDENCE_THRESHOLD {
            out.push_str(&format!(
                "> {} ({:.2}): verify before relying on these findings.\n\n",
                LOW_CONFIDENCE_MARKER, result.confidence
            ));
        }
        out.push_str(result.report.trim());
        out.push('\n');

        if !result.sources.is_empty() {
            out.push_str("\n**Sources**\n");
            for source in &result.sources {
                out.push_str(&format!("- {}\n", source));
            }
        }
    }

    out
}
