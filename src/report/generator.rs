//! Markdown report generation.
//!
//! Renders a stored [`ScanReport`] as a human-readable Markdown document for
//! the one-shot CLI mode.

use crate::models::{
    AccessibilityMetrics, AiAnalysis, ClarityMetrics, ColorContrast, HeatZone, ReadabilityMetrics,
    ScanReport, Scores, Severity,
};
use anyhow::Result;

/// Severity band of a 0-100 score, used for the badge next to it.
pub fn score_band(score: f64) -> Severity {
    if score >= 90.0 {
        Severity::Low
    } else if score >= 70.0 {
        Severity::Medium
    } else if score >= 50.0 {
        Severity::High
    } else {
        Severity::Critical
    }
}

fn score_cell(score: Option<f64>) -> String {
    match score {
        Some(s) => format!("{} {:.0}", score_band(s).emoji(), s),
        None => "n/a".to_string(),
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "✅ yes"
    } else {
        "❌ no"
    }
}

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &ScanReport) -> String {
    let mut output = String::new();

    // Title
    output.push_str("# Visual Health Report\n\n");

    output.push_str(&generate_metadata_section(report));
    output.push_str(&generate_scores_section(&report.scores));

    if let Some(ref contrast) = report.metrics.color_contrast {
        output.push_str(&generate_contrast_section(contrast));
    }
    if let Some(ref accessibility) = report.metrics.accessibility {
        output.push_str(&generate_accessibility_section(accessibility));
    }
    if let Some(ref readability) = report.metrics.text_readability {
        output.push_str(&generate_readability_section(readability));
    }
    if let Some(ref clarity) = report.metrics.visual_clarity {
        output.push_str(&generate_clarity_section(clarity));
    }

    output.push_str(&generate_ai_section(&report.ai_analysis));
    output.push_str(&generate_heatmap_section(&report.heatmap_data.zones));
    output.push_str(&generate_recommendations_section(&report.recommendations));

    // Footer
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(report: &ScanReport) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **URL:** {}\n", report.url));
    section.push_str(&format!("- **Scan ID:** `{}`\n", report.id));
    section.push_str(&format!(
        "- **Scanned:** {}\n",
        report.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!(
        "- **Screenshot:** {}\n",
        if report.screenshot.is_some() {
            "captured"
        } else {
            "not captured"
        }
    ));
    section.push('\n');

    section
}

/// Generate the scores table.
fn generate_scores_section(scores: &Scores) -> String {
    let mut section = String::new();

    section.push_str("## Scores\n\n");
    section.push_str(&format!(
        "**Overall: {} / 100**\n\n",
        score_cell(Some(scores.overall()))
    ));
    section.push_str("| Component | Score |\n");
    section.push_str("|:---|:---:|\n");

    let rows = [
        ("Visual clarity", scores.visual_clarity()),
        ("Accessibility", scores.accessibility()),
        ("Readability", scores.readability()),
        ("Focus accuracy", scores.focus_accuracy()),
    ];
    for (name, score) in rows {
        section.push_str(&format!("| {} | {} |\n", name, score_cell(score)));
    }
    if let Some(ux) = scores.ux_score() {
        section.push_str(&format!("| UX (AI vision) | {} |\n", score_cell(Some(ux))));
    }
    section.push('\n');

    section
}

fn generate_contrast_section(contrast: &ColorContrast) -> String {
    let mut section = String::new();

    section.push_str("## Colour Contrast\n\n");
    section.push_str(&format!("- **WCAG AA (4.5:1):** {}\n", yes_no(contrast.pass_aa)));
    section.push_str(&format!("- **WCAG AAA (7:1):** {}\n", yes_no(contrast.pass_aaa)));
    if let Some(ratio) = contrast.min_ratio {
        section.push_str(&format!("- **Lowest ratio:** {:.2}:1\n", ratio));
    }
    section.push('\n');

    section
}

fn generate_accessibility_section(metrics: &AccessibilityMetrics) -> String {
    let mut section = String::new();

    section.push_str("## Accessibility\n\n");
    section.push_str("| Check | Result |\n");
    section.push_str("|:---|:---:|\n");
    section.push_str(&format!("| Images missing alt text | {} |\n", metrics.missing_alt));
    section.push_str(&format!("| ARIA issues | {} |\n", metrics.aria_issues));
    section.push_str(&format!(
        "| Keyboard navigable | {} |\n\n",
        yes_no(metrics.keyboard_nav)
    ));

    for issue in &metrics.issues {
        section.push_str(&format!("- {}\n", issue));
    }
    if !metrics.issues.is_empty() {
        section.push('\n');
    }

    section
}

fn generate_readability_section(metrics: &ReadabilityMetrics) -> String {
    let mut section = String::new();

    section.push_str("## Readability\n\n");
    section.push_str(&format!(
        "- **Flesch Reading Ease:** {:.1}\n",
        metrics.flesch_score
    ));
    section.push_str(&format!("- **Grade level:** {}\n", metrics.grade_level));
    for issue in &metrics.issues {
        section.push_str(&format!("- {}\n", issue));
    }
    section.push('\n');

    section
}

fn generate_clarity_section(metrics: &ClarityMetrics) -> String {
    let mut section = String::new();

    section.push_str("## Visual Clarity\n\n");
    section.push_str("| Signal | Score |\n");
    section.push_str("|:---|:---:|\n");

    let rows = [
        ("Layout", metrics.layout_score),
        ("Navigation", metrics.navigation_score),
        ("Visual balance", metrics.visual_balance),
        ("Content hierarchy", metrics.content_hierarchy),
        ("Colour consistency", metrics.color_consistency),
        ("Typography", metrics.typography_score),
        ("Responsiveness", metrics.responsiveness),
    ];
    for (name, score) in rows {
        section.push_str(&format!("| {} | {} |\n", name, score_cell(Some(score))));
    }
    section.push_str(&format!(
        "| Mobile friendly | {} |\n\n",
        yes_no(metrics.mobile_friendly)
    ));

    section
}

fn generate_ai_section(ai: &AiAnalysis) -> String {
    if ai.visual_issues.is_empty() && ai.layout_problems.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## AI Vision\n\n");
    if let Some(source) = ai.source {
        section.push_str(&format!("*Source: {:?}*\n\n", source));
    }

    if !ai.visual_issues.is_empty() {
        section.push_str("### Visual Issues\n\n");
        for issue in &ai.visual_issues {
            section.push_str(&format!("- {}\n", issue));
        }
        section.push('\n');
    }

    if !ai.layout_problems.is_empty() {
        section.push_str("### Layout Problems\n\n");
        for problem in &ai.layout_problems {
            section.push_str(&format!("- {}\n", problem));
        }
        section.push('\n');
    }

    section
}

fn generate_heatmap_section(zones: &[HeatZone]) -> String {
    if zones.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Attention Heatmap\n\n");
    section.push_str("| Area | x | y | Intensity |\n");
    section.push_str("|:---|:---:|:---:|:---:|\n");
    for zone in zones {
        section.push_str(&format!(
            "| {} | {:.0}% | {:.0}% | {:.2} |\n",
            zone.area.as_deref().unwrap_or("-"),
            zone.x,
            zone.y,
            zone.intensity
        ));
    }
    section.push('\n');

    section
}

/// Generate the recommendations section.
fn generate_recommendations_section(recommendations: &[String]) -> String {
    if recommendations.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Recommendations\n\n");
    for (i, rec) in recommendations.iter().enumerate() {
        section.push_str(&format!("{}. {}\n", i + 1, rec));
    }
    section.push('\n');

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    format!(
        "---\n\n*Report generated by visiscan {}*\n",
        env!("CARGO_PKG_VERSION")
    )
}

/// Generate a JSON report.
pub fn generate_json_report(report: &ScanReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}
