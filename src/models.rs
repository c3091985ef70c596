//! Data models for the visual health scanner.
//!
//! This module contains the core data structures that flow through a scan:
//! the request, the fetched page snapshot, per-analyzer fragments and the
//! persisted report.

use crate::error::ScanError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;
use uuid::Uuid;

/// Severity level of an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Low severity - polish and minor suggestions
    Low,
    /// Medium severity - noticeably degrades the experience
    Medium,
    /// High severity - blocks some users or content
    High,
    /// Critical severity - page is unusable for some users
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "Low"),
            Severity::Medium => write!(f, "Medium"),
            Severity::High => write!(f, "High"),
            Severity::Critical => write!(f, "Critical"),
        }
    }
}

impl Severity {
    /// Returns an emoji representation of the severity.
    pub fn emoji(&self) -> &'static str {
        match self {
            Severity::Low => "🟢",
            Severity::Medium => "🟡",
            Severity::High => "🟠",
            Severity::Critical => "🔴",
        }
    }
}

/// The analyzer variants, declared in recommendation priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnalyzerKind {
    Accessibility,
    VisualClarity,
    Readability,
    Focus,
    Vision,
}

impl AnalyzerKind {
    pub const ALL: [AnalyzerKind; 5] = [
        AnalyzerKind::Accessibility,
        AnalyzerKind::VisualClarity,
        AnalyzerKind::Readability,
        AnalyzerKind::Focus,
        AnalyzerKind::Vision,
    ];
}

impl fmt::Display for AnalyzerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalyzerKind::Accessibility => write!(f, "accessibility"),
            AnalyzerKind::VisualClarity => write!(f, "visual-clarity"),
            AnalyzerKind::Readability => write!(f, "readability"),
            AnalyzerKind::Focus => write!(f, "focus"),
            AnalyzerKind::Vision => write!(f, "ai-vision"),
        }
    }
}

/// A single problem surfaced by an analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    /// Severity of the issue.
    pub severity: Severity,
    /// Short machine-friendly category, e.g. `missing-alt`.
    pub category: String,
    /// Human-readable description.
    pub message: String,
}

impl Issue {
    pub fn new(severity: Severity, category: &str, message: impl Into<String>) -> Self {
        Self {
            severity,
            category: category.to_string(),
            message: message.into(),
        }
    }
}

/// Incoming scan request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRequest {
    pub url: String,
}

impl ScanRequest {
    /// Parse and validate the target URL. Only absolute http(s) URLs with a host are accepted.
    pub fn target(&self) -> Result<Url, ScanError> {
        let raw = self.url.trim();
        if raw.is_empty() {
            return Err(ScanError::Validation("URL is empty".to_string()));
        }

        let url = Url::parse(raw).map_err(|e| ScanError::Validation(format!("{}: {}", raw, e)))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ScanError::Validation(format!(
                "unsupported scheme '{}', expected http or https",
                url.scheme()
            )));
        }

        if url.host_str().map_or(true, str::is_empty) {
            return Err(ScanError::Validation(format!("{} has no host", raw)));
        }

        Ok(url)
    }
}

/// Immutable snapshot of a page, shared read-only by all analyzers of one scan.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects.
    pub url: String,
    /// Raw HTML document.
    pub html: String,
    /// Screenshot encoded as a `data:` URL.
    pub screenshot: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

impl FetchedPage {
    /// Base64 payload of the screenshot, without the `data:...;base64,` prefix.
    pub fn screenshot_base64(&self) -> Option<&str> {
        let shot = self.screenshot.as_deref()?;
        match shot.split_once(";base64,") {
            Some((_, data)) => Some(data),
            None => Some(shot),
        }
    }
}

/// A page-relative attention zone. Coordinates are percentages, intensity is in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatZone {
    pub x: f64,
    pub y: f64,
    pub intensity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
}

impl HeatZone {
    /// Creates a zone, clamping every coordinate into its valid range.
    pub fn new(x: f64, y: f64, intensity: f64, area: Option<&str>) -> Self {
        Self {
            x: clamp_or_zero(x, 0.0, 100.0),
            y: clamp_or_zero(y, 0.0, 100.0),
            intensity: clamp_or_zero(intensity, 0.0, 1.0),
            area: area.map(String::from),
        }
    }

    /// Re-clamps a zone that came from an untrusted source.
    pub fn sanitized(self) -> Self {
        Self::new(self.x, self.y, self.intensity, self.area.as_deref())
    }
}

fn clamp_or_zero(value: f64, min: f64, max: f64) -> f64 {
    if value.is_nan() {
        min
    } else {
        value.clamp(min, max)
    }
}

/// Clamp a score into `[0, 100]`.
pub fn clamp_score(score: f64) -> f64 {
    clamp_or_zero(score, 0.0, 100.0)
}

/// Visual-clarity payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClarityMetrics {
    pub layout_score: f64,
    pub navigation_score: f64,
    pub visual_balance: f64,
    pub content_hierarchy: f64,
    pub color_consistency: f64,
    pub typography_score: f64,
    pub responsiveness: f64,
    pub mobile_friendly: bool,
}

/// WCAG colour-contrast compliance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorContrast {
    #[serde(rename = "passAA")]
    pub pass_aa: bool,
    #[serde(rename = "passAAA")]
    pub pass_aaa: bool,
    /// Lowest contrast ratio found among declared colour pairs.
    #[serde(rename = "minRatio", default, skip_serializing_if = "Option::is_none")]
    pub min_ratio: Option<f64>,
}

/// Accessibility issue counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessibilityMetrics {
    pub missing_alt: usize,
    pub aria_issues: usize,
    pub keyboard_nav: bool,
    #[serde(default)]
    pub issues: Vec<String>,
}

/// Reading-ease result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadabilityMetrics {
    /// Flesch Reading Ease; may be negative for very dense text.
    pub flesch_score: f64,
    pub grade_level: String,
    #[serde(default)]
    pub issues: Vec<String>,
}

/// Where the AI-vision findings came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisionSource {
    External,
    Baseline,
}

/// Findings of the AI-vision analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisionFindings {
    #[serde(default)]
    pub visual_issues: Vec<String>,
    #[serde(default)]
    pub layout_problems: Vec<String>,
    #[serde(default)]
    pub attention_zones: Vec<HeatZone>,
    /// Overall UX score suggested by the service, if any.
    #[serde(default)]
    pub score: Option<f64>,
}

/// Variant-specific part of an analyzer fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    VisualClarity(ClarityMetrics),
    Accessibility {
        metrics: AccessibilityMetrics,
        color_contrast: ColorContrast,
    },
    Readability(ReadabilityMetrics),
    Focus {
        zones: Vec<HeatZone>,
    },
    Vision {
        findings: VisionFindings,
        source: VisionSource,
    },
}

/// Output of one analyzer: a score (absent on failure), issues and a payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub kind: AnalyzerKind,
    pub score: Option<f64>,
    pub issues: Vec<Issue>,
    pub payload: Option<Payload>,
}

impl Fragment {
    /// Creates a successful fragment. The score is clamped into `[0, 100]`.
    pub fn scored(kind: AnalyzerKind, score: f64, issues: Vec<Issue>, payload: Payload) -> Self {
        Self {
            kind,
            score: Some(clamp_score(score)),
            issues,
            payload: Some(payload),
        }
    }

    /// Creates the fragment recorded for a failed or timed-out analyzer.
    pub fn absent(kind: AnalyzerKind, reason: &str) -> Self {
        Self {
            kind,
            score: None,
            issues: vec![Issue::new(
                Severity::Low,
                "analyzer-unavailable",
                format!("{} analysis unavailable: {}", kind, reason),
            )],
            payload: None,
        }
    }

    pub fn is_absent(&self) -> bool {
        self.score.is_none()
    }
}

/// Equal weights for visual clarity, accessibility, readability and focus accuracy.
pub const COMPONENT_WEIGHTS: [f64; 4] = [1.0, 1.0, 1.0, 1.0];

/// Component scores as produced by the analyzers. `overall` is derived from these.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentScores {
    pub visual_clarity: Option<f64>,
    pub accessibility: Option<f64>,
    pub readability: Option<f64>,
    pub focus_accuracy: Option<f64>,
    #[serde(default)]
    pub ux_score: Option<f64>,
}

impl ComponentScores {
    /// Weighted mean of the present user-facing components, re-normalised over
    /// the weights of those that are present. `None` when all are absent.
    pub fn weighted_overall(&self) -> Option<f64> {
        let components = [
            self.visual_clarity,
            self.accessibility,
            self.readability,
            self.focus_accuracy,
        ];

        let (sum, weight) = components
            .iter()
            .zip(COMPONENT_WEIGHTS)
            .filter_map(|(score, weight)| score.map(|s| (clamp_score(s) * weight, weight)))
            .fold((0.0, 0.0), |(sum, total), (s, w)| (sum + s, total + w));

        if weight > 0.0 {
            Some(clamp_score(sum / weight))
        } else {
            None
        }
    }
}

/// Report scores. `overall` is always recomputed from the components and
/// cannot be set directly, including when deserializing stored history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "ComponentScores")]
pub struct Scores {
    overall: f64,
    visual_clarity: Option<f64>,
    accessibility: Option<f64>,
    readability: Option<f64>,
    focus_accuracy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ux_score: Option<f64>,
}

impl TryFrom<ComponentScores> for Scores {
    type Error = ScanError;

    fn try_from(components: ComponentScores) -> Result<Self, Self::Error> {
        let overall = components
            .weighted_overall()
            .ok_or(ScanError::InsufficientData)?;

        Ok(Self {
            overall,
            visual_clarity: components.visual_clarity.map(clamp_score),
            accessibility: components.accessibility.map(clamp_score),
            readability: components.readability.map(clamp_score),
            focus_accuracy: components.focus_accuracy.map(clamp_score),
            ux_score: components.ux_score.map(clamp_score),
        })
    }
}

impl Scores {
    pub fn overall(&self) -> f64 {
        self.overall
    }

    pub fn visual_clarity(&self) -> Option<f64> {
        self.visual_clarity
    }

    pub fn accessibility(&self) -> Option<f64> {
        self.accessibility
    }

    pub fn readability(&self) -> Option<f64> {
        self.readability
    }

    pub fn focus_accuracy(&self) -> Option<f64> {
        self.focus_accuracy
    }

    pub fn ux_score(&self) -> Option<f64> {
        self.ux_score
    }

    /// Every numeric score present in the report.
    pub fn all(&self) -> Vec<f64> {
        [
            Some(self.overall),
            self.visual_clarity,
            self.accessibility,
            self.readability,
            self.focus_accuracy,
            self.ux_score,
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

/// Categorical metrics of the report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub color_contrast: Option<ColorContrast>,
    pub accessibility: Option<AccessibilityMetrics>,
    pub text_readability: Option<ReadabilityMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_clarity: Option<ClarityMetrics>,
}

/// AI-vision section of the report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiAnalysis {
    pub visual_issues: Vec<String>,
    pub layout_problems: Vec<String>,
    pub attention_zones: Vec<HeatZone>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<VisionSource>,
}

/// Attention heatmap.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeatmapData {
    pub zones: Vec<HeatZone>,
}

/// Everything the aggregator derives from the analyzer fragments.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub scores: Scores,
    pub metrics: Metrics,
    pub ai_analysis: AiAnalysis,
    pub heatmap_data: HeatmapData,
    pub recommendations: Vec<String>,
}

/// The persisted visual health report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub id: Uuid,
    pub url: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    pub scores: Scores,
    pub metrics: Metrics,
    pub ai_analysis: AiAnalysis,
    pub heatmap_data: HeatmapData,
    pub recommendations: Vec<String>,
}

impl ScanReport {
    /// Assemble a report for `page` from an aggregated assessment.
    pub fn assemble(id: Uuid, page: &FetchedPage, assessment: Assessment) -> Self {
        debug_assert!(assessment
            .scores
            .all()
            .iter()
            .all(|s| (0.0..=100.0).contains(s)));

        Self {
            id,
            url: page.url.clone(),
            timestamp: Utc::now(),
            screenshot: page.screenshot.clone(),
            scores: assessment.scores,
            metrics: assessment.metrics,
            ai_analysis: assessment.ai_analysis,
            heatmap_data: assessment.heatmap_data,
            recommendations: assessment.recommendations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn test_analyzer_priority_order() {
        assert!(AnalyzerKind::Accessibility < AnalyzerKind::VisualClarity);
        assert!(AnalyzerKind::VisualClarity < AnalyzerKind::Readability);
        assert!(AnalyzerKind::Readability < AnalyzerKind::Focus);
        assert_eq!(AnalyzerKind::VisualClarity.to_string(), "visual-clarity");
    }

    #[test]
    fn test_scan_request_validation() {
        let ok = ScanRequest {
            url: " https://example.com/path ".to_string(),
        };
        assert_eq!(ok.target().unwrap().host_str(), Some("example.com"));

        for bad in ["", "example.com", "ftp://example.com", "not a url", "mailto:a@b.c"] {
            let request = ScanRequest {
                url: bad.to_string(),
            };
            assert!(
                matches!(request.target(), Err(ScanError::Validation(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_heat_zone_clamping() {
        let zone = HeatZone::new(120.0, -5.0, 1.7, Some("hero"));
        assert_eq!(zone.x, 100.0);
        assert_eq!(zone.y, 0.0);
        assert_eq!(zone.intensity, 1.0);

        let nan = HeatZone::new(f64::NAN, 50.0, f64::NAN, None);
        assert_eq!(nan.x, 0.0);
        assert_eq!(nan.intensity, 0.0);
    }

    #[test]
    fn test_weighted_overall_skips_absent_components() {
        let components = ComponentScores {
            visual_clarity: Some(90.0),
            accessibility: None,
            readability: Some(70.0),
            focus_accuracy: Some(80.0),
            ux_score: Some(10.0),
        };
        assert_eq!(components.weighted_overall(), Some(80.0));
        assert_eq!(ComponentScores::default().weighted_overall(), None);
    }

    #[test]
    fn test_scores_require_one_component() {
        let err = Scores::try_from(ComponentScores::default()).unwrap_err();
        assert!(matches!(err, ScanError::InsufficientData));
    }

    #[test]
    fn test_deserialized_overall_is_recomputed() {
        let json = r#"{"overall": 12, "visualClarity": 80, "accessibility": 60,
                       "readability": null, "focusAccuracy": 100}"#;
        let scores: Scores = serde_json::from_str(json).unwrap();
        assert_eq!(scores.overall(), 80.0);
        assert_eq!(scores.readability(), None);
    }

    #[test]
    fn test_absent_fragment_carries_reason() {
        let fragment = Fragment::absent(AnalyzerKind::Readability, "timed out after 10s");
        assert!(fragment.is_absent());
        assert_eq!(fragment.issues.len(), 1);
        assert!(fragment.issues[0].message.contains("readability"));
        assert!(fragment.issues[0].message.contains("timed out"));
    }

    #[test]
    fn test_screenshot_base64_strips_prefix() {
        let page = FetchedPage {
            url: "https://example.com/".to_string(),
            html: String::new(),
            screenshot: Some("data:image/png;base64,AAAA".to_string()),
            fetched_at: Utc::now(),
        };
        assert_eq!(page.screenshot_base64(), Some("AAAA"));
    }
}
