//! Fragment aggregation.
//!
//! Combines the per-analyzer fragments of one scan into scores, metrics,
//! AI-vision findings, the heatmap and an ordered list of recommendations.
//! Aggregation is a pure function of its input.

use crate::error::ScanError;
use crate::models::{
    AiAnalysis, AnalyzerKind, Assessment, ComponentScores, Fragment, HeatmapData, Issue, Metrics,
    Payload, Scores, Severity,
};
use std::collections::HashMap;

/// Categories that describe the scan itself rather than the page.
const NOTICE_CATEGORIES: &[&str] = &["analyzer-unavailable", "vision-fallback"];

/// Fixed advice per issue category.
const RECOMMENDATIONS: &[(&str, &str)] = &[
    ("missing-alt", "Add descriptive alt text to every meaningful image."),
    ("aria", "Fix ARIA attributes: reference existing ids, name every control and never hide focusable content."),
    ("keyboard", "Make every interactive element reachable and operable with the keyboard."),
    ("contrast-aa", "Increase text contrast to at least 4.5:1 to meet WCAG AA."),
    ("contrast-aaa", "Raise text contrast to 7:1 where possible to meet WCAG AAA."),
    ("lang", "Declare the page language with a lang attribute on <html>."),
    ("form-labels", "Associate a visible label with every form control."),
    ("landmarks", "Structure the page with header, nav, main and footer landmarks."),
    ("mobile", "Add a responsive viewport meta tag and test the layout on small screens."),
    ("heading-structure", "Use a single top-level heading and do not skip heading levels."),
    ("color-palette", "Reduce the colour palette to a consistent set of brand colours."),
    ("typography", "Limit the page to two font families and keep body text at 12px or larger."),
    ("visual-balance", "Balance text with supporting imagery so pages are easy to scan."),
    ("navigation", "Provide a clear, concise navigation menu."),
    ("difficult-text", "Simplify wording: prefer short, common words."),
    ("long-sentences", "Break long sentences into shorter ones."),
    ("thin-content", "Add more descriptive content so visitors understand the page."),
    ("no-primary-heading", "Give the page one prominent headline that states its purpose."),
    ("missing-cta", "Place a clear call to action near the top of the page."),
    ("competing-focus", "Reduce the number of elements competing for attention."),
];

fn advice_for(issue: &Issue) -> String {
    RECOMMENDATIONS
        .iter()
        .find(|(category, _)| *category == issue.category)
        .map(|(_, advice)| advice.to_string())
        .unwrap_or_else(|| issue.message.clone())
}

/// Highest severity per `(analyzer, category)`, keeping the first issue seen at that severity.
fn group_by_category(fragments: &[Fragment]) -> HashMap<(AnalyzerKind, &str), &Issue> {
    let mut grouped: HashMap<(AnalyzerKind, &str), &Issue> = HashMap::new();

    for fragment in fragments {
        for issue in &fragment.issues {
            if NOTICE_CATEGORIES.contains(&issue.category.as_str()) {
                continue;
            }
            grouped
                .entry((fragment.kind, issue.category.as_str()))
                .and_modify(|current| {
                    if issue.severity > current.severity {
                        *current = issue;
                    }
                })
                .or_insert(issue);
        }
    }

    grouped
}

/// One recommendation per distinct issue category, ordered by severity and
/// then analyzer priority, deduplicated and capped at `limit`.
pub fn recommendations(fragments: &[Fragment], limit: usize) -> Vec<String> {
    let mut ranked: Vec<(Severity, AnalyzerKind, &str, &Issue)> = group_by_category(fragments)
        .into_iter()
        .map(|((kind, category), issue)| (issue.severity, kind, category, issue))
        .collect();

    ranked.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

    let mut advice: Vec<String> = Vec::new();
    for (_, _, _, issue) in ranked {
        if advice.len() >= limit {
            break;
        }
        let text = advice_for(issue);
        if !advice.contains(&text) {
            advice.push(text);
        }
    }
    advice
}

fn component_scores(fragments: &[Fragment]) -> ComponentScores {
    let score_of = |kind: AnalyzerKind| {
        fragments
            .iter()
            .filter(|f| f.kind == kind)
            .find_map(|f| f.score)
    };

    ComponentScores {
        visual_clarity: score_of(AnalyzerKind::VisualClarity),
        accessibility: score_of(AnalyzerKind::Accessibility),
        readability: score_of(AnalyzerKind::Readability),
        focus_accuracy: score_of(AnalyzerKind::Focus),
        ux_score: score_of(AnalyzerKind::Vision),
    }
}

/// Combine one fragment per analyzer into an assessment.
///
/// Fails with [`ScanError::InsufficientData`] when none of the four
/// user-facing components produced a score.
pub fn combine(fragments: &[Fragment], max_recommendations: usize) -> Result<Assessment, ScanError> {
    let scores = Scores::try_from(component_scores(fragments))?;

    let mut metrics = Metrics::default();
    let mut ai_analysis = AiAnalysis::default();
    let mut heatmap_data = HeatmapData::default();

    for fragment in fragments {
        match fragment.payload {
            Some(Payload::VisualClarity(ref clarity)) => {
                metrics.visual_clarity = Some(clarity.clone());
            }
            Some(Payload::Accessibility {
                metrics: ref accessibility,
                ref color_contrast,
            }) => {
                metrics.accessibility = Some(accessibility.clone());
                metrics.color_contrast = Some(color_contrast.clone());
            }
            Some(Payload::Readability(ref readability)) => {
                metrics.text_readability = Some(readability.clone());
            }
            Some(Payload::Focus { ref zones }) => {
                heatmap_data.zones = zones.iter().cloned().map(|z| z.sanitized()).collect();
            }
            Some(Payload::Vision {
                ref findings,
                source,
            }) => {
                ai_analysis = AiAnalysis {
                    visual_issues: findings.visual_issues.clone(),
                    layout_problems: findings.layout_problems.clone(),
                    attention_zones: findings
                        .attention_zones
                        .iter()
                        .cloned()
                        .map(|z| z.sanitized())
                        .collect(),
                    source: Some(source),
                };
            }
            None => {}
        }
    }

    Ok(Assessment {
        scores,
        metrics,
        ai_analysis,
        heatmap_data,
        recommendations: recommendations(fragments, max_recommendations),
    })
}
