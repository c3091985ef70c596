//! AI-vision analyzer.
//!
//! The only analyzer allowed to call an external service. When no service is
//! configured, when the page has no screenshot, or when the service fails,
//! findings come from [`BaselineAnalyzer`], a deterministic DOM-based
//! estimate of the same shape. The fallback is reported in the fragment's
//! `source` and, on service failure, as an issue.

use crate::analysis::{dom, focus, PageAnalyzer};
use crate::config::VisionConfig;
use crate::error::AnalyzerError;
use crate::models::{
    AnalyzerKind, FetchedPage, Fragment, Issue, Payload, Severity, VisionFindings, VisionSource,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Text blocks above this many words read as a wall of text.
const TEXT_WALL_WORDS: usize = 150;

/// External image-analysis capability.
#[async_trait]
pub trait VisionService: Send + Sync {
    /// Analyze a base64-encoded screenshot.
    async fn analyze_image(&self, screenshot_base64: &str) -> Result<VisionFindings, AnalyzerError>;
}

/// Message in an Ollama chat request.
#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

/// Ollama chat API request.
#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    format: &'static str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

/// Ollama chat API response.
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

/// Vision model served by Ollama's `/api/chat`.
pub struct OllamaVisionService {
    http_client: reqwest::Client,
    ollama_url: String,
    model_name: String,
    temperature: f32,
    timeout_seconds: u64,
}

impl OllamaVisionService {
    pub fn new(config: &VisionConfig, ollama_url: &str) -> Result<Self, AnalyzerError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| AnalyzerError::Service(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            ollama_url: ollama_url.trim_end_matches('/').to_string(),
            model_name: config.model.clone(),
            temperature: config.temperature,
            timeout_seconds: config.timeout_seconds,
        })
    }
}

#[async_trait]
impl VisionService for OllamaVisionService {
    async fn analyze_image(&self, screenshot_base64: &str) -> Result<VisionFindings, AnalyzerError> {
        let url = format!("{}/api/chat", self.ollama_url);

        let request = OllamaChatRequest {
            model: self.model_name.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: VISION_SYSTEM_PROMPT.to_string(),
                    images: vec![],
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: "Analyze this web page screenshot.".to_string(),
                    images: vec![screenshot_base64.to_string()],
                },
            ],
            format: "json",
            stream: false,
            options: OllamaOptions {
                temperature: self.temperature,
            },
        };

        debug!("Sending screenshot to {} ({})", url, self.model_name);

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AnalyzerError::Service(format!(
                        "Request timed out after {}s",
                        self.timeout_seconds
                    ))
                } else if e.is_connect() {
                    AnalyzerError::Service(format!("Cannot connect to Ollama at {}", self.ollama_url))
                } else {
                    AnalyzerError::Service(format!("Failed to send request: {}", e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AnalyzerError::Service(format!(
                "Ollama API error {}: {}",
                status, body
            )));
        }

        let chat_response: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| AnalyzerError::Service(format!("Failed to parse Ollama response: {}", e)))?;

        parse_findings(&chat_response.message.content)
    }
}

/// Parse the model's JSON answer, tolerating code fences and surrounding prose.
pub fn parse_findings(content: &str) -> Result<VisionFindings, AnalyzerError> {
    let start = content.find('{');
    let end = content.rfind('}');
    let json = match (start, end) {
        (Some(start), Some(end)) if start < end => &content[start..=end],
        _ => {
            return Err(AnalyzerError::Service(
                "Vision response contained no JSON object".to_string(),
            ))
        }
    };

    let mut findings: VisionFindings = serde_json::from_str(json)
        .map_err(|e| AnalyzerError::Service(format!("Invalid vision response: {}", e)))?;

    findings.attention_zones = findings
        .attention_zones
        .into_iter()
        .map(|zone| zone.sanitized())
        .collect();
    findings.score = findings.score.map(crate::models::clamp_score);
    Ok(findings)
}

/// Deterministic local estimate of what a vision model would report.
pub struct BaselineAnalyzer {
    max_zones: usize,
}

impl BaselineAnalyzer {
    pub fn new(max_zones: usize) -> Self {
        Self { max_zones }
    }

    /// Findings derived from the DOM alone. Never fails: a page with nothing
    /// to render is itself a layout problem.
    pub fn findings(&self, html: &str) -> VisionFindings {
        let document = match dom::parse(html) {
            Ok(document) => document,
            Err(_) => {
                return VisionFindings {
                    visual_issues: vec![],
                    layout_problems: vec!["Page has no renderable content".to_string()],
                    attention_zones: vec![],
                    score: Some(0.0),
                }
            }
        };

        let mut visual_issues = Vec::new();
        let mut layout_problems = Vec::new();

        let unsized_images = document
            .select(&dom::selector("img"))
            .filter(|img| img.value().attr("width").is_none() || img.value().attr("height").is_none())
            .count();
        if unsized_images > 0 {
            visual_issues.push(format!(
                "{} image(s) without explicit dimensions may shift the layout while loading",
                unsized_images
            ));
        }

        let longest_block = dom::text_blocks(&document)
            .iter()
            .map(|block| dom::words(block).len())
            .max()
            .unwrap_or(0);
        if longest_block > TEXT_WALL_WORDS {
            visual_issues.push(format!(
                "Unbroken text block of {} words is hard to scan",
                longest_block
            ));
        }

        if document
            .select(&dom::selector("video[autoplay], audio[autoplay]"))
            .next()
            .is_some()
        {
            visual_issues.push("Autoplaying media competes with the main content".to_string());
        }

        if document
            .select(&dom::selector("main, [role=\"main\"]"))
            .next()
            .is_none()
        {
            layout_problems.push("No main content region".to_string());
        }

        if document
            .select(&dom::selector("meta[name=\"viewport\"]"))
            .next()
            .is_none()
        {
            layout_problems.push("Layout is not adapted to small screens".to_string());
        }

        let layout_tables = document
            .select(&dom::selector("table"))
            .filter(|table| table.select(&dom::selector("th")).next().is_none())
            .count();
        if layout_tables > 0 {
            layout_problems.push(format!("{} table(s) appear to be used for layout", layout_tables));
        }

        let penalty = 8.0 * visual_issues.len() as f64 + 10.0 * layout_problems.len() as f64;

        VisionFindings {
            visual_issues,
            layout_problems,
            attention_zones: focus::predict_zones(&document, self.max_zones),
            score: Some((100.0 - penalty).max(0.0)),
        }
    }

    fn fragment(&self, page: &FetchedPage, extra: Option<Issue>) -> Fragment {
        vision_fragment(self.findings(&page.html), VisionSource::Baseline, extra)
    }
}

#[async_trait]
impl PageAnalyzer for BaselineAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Vision
    }

    async fn analyze(&self, page: &FetchedPage) -> Result<Fragment, AnalyzerError> {
        Ok(self.fragment(page, None))
    }
}

fn vision_fragment(findings: VisionFindings, source: VisionSource, extra: Option<Issue>) -> Fragment {
    let mut issues: Vec<Issue> = findings
        .visual_issues
        .iter()
        .map(|msg| Issue::new(Severity::Medium, "visual", msg.clone()))
        .chain(
            findings
                .layout_problems
                .iter()
                .map(|msg| Issue::new(Severity::Medium, "layout", msg.clone())),
        )
        .collect();
    issues.extend(extra);

    let score = findings.score.unwrap_or_else(|| {
        let count = findings.visual_issues.len() + findings.layout_problems.len();
        (100.0 - 10.0 * count as f64).max(0.0)
    });

    Fragment::scored(
        AnalyzerKind::Vision,
        score,
        issues,
        Payload::Vision { findings, source },
    )
}

/// Uses the external service when it is configured and a screenshot exists,
/// and the baseline otherwise.
pub struct VisionAnalyzer {
    service: Option<Arc<dyn VisionService>>,
    timeout: Duration,
    max_zones: usize,
    baseline: BaselineAnalyzer,
}

impl VisionAnalyzer {
    pub fn new(service: Option<Arc<dyn VisionService>>, timeout: Duration, max_zones: usize) -> Self {
        Self {
            service,
            timeout,
            max_zones,
            baseline: BaselineAnalyzer::new(max_zones),
        }
    }

    async fn external(
        &self,
        service: &dyn VisionService,
        screenshot: &str,
    ) -> Result<VisionFindings, AnalyzerError> {
        match tokio::time::timeout(self.timeout, service.analyze_image(screenshot)).await {
            Ok(result) => result,
            Err(_) => Err(AnalyzerError::Service(format!(
                "Vision service timed out after {:?}",
                self.timeout
            ))),
        }
    }
}

#[async_trait]
impl PageAnalyzer for VisionAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Vision
    }

    async fn analyze(&self, page: &FetchedPage) -> Result<Fragment, AnalyzerError> {
        let Some(ref service) = self.service else {
            debug!("No vision service configured, using baseline");
            return Ok(self.baseline.fragment(page, None));
        };

        let Some(screenshot) = page.screenshot_base64() else {
            info!("No screenshot for {}, using vision baseline", page.url);
            return Ok(self.baseline.fragment(page, None));
        };

        match self.external(service.as_ref(), screenshot).await {
            Ok(mut findings) => {
                findings.attention_zones.truncate(self.max_zones);
                Ok(vision_fragment(findings, VisionSource::External, None))
            }
            Err(e) => {
                warn!("Vision service failed for {}: {}; using baseline", page.url, e);
                let notice = Issue::new(
                    Severity::Low,
                    "vision-fallback",
                    format!("AI vision unavailable ({}); baseline estimate used", e),
                );
                Ok(self.baseline.fragment(page, Some(notice)))
            }
        }
    }
}

/// System prompt for screenshot analysis
const VISION_SYSTEM_PROMPT: &str = r#"You are an expert UX reviewer. Look at the web page screenshot and report:
- visualIssues: problems a visitor would notice (clutter, low contrast, tiny text)
- layoutProblems: structural problems (misalignment, crowding, broken grids)
- attentionZones: where the eye lands first, as {"x": 0-100, "y": 0-100, "intensity": 0-1, "area": "label"}
- score: overall UX quality from 0 to 100
Respond with a single JSON object with exactly these keys. No explanations or markdown."#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HeatZone;
    use chrono::Utc;

    const PAGE: &str = r#"<html><head><meta name="viewport" content="width=device-width"></head>
        <body><main><h1>Shop</h1><img src="hero.png" width="800" height="400" alt="Hero">
        <button>Buy</button></main></body></html>"#;

    fn page(screenshot: Option<&str>) -> FetchedPage {
        FetchedPage {
            url: "https://example.com/".to_string(),
            html: PAGE.to_string(),
            screenshot: screenshot.map(String::from),
            fetched_at: Utc::now(),
        }
    }

    fn source(fragment: &Fragment) -> VisionSource {
        match fragment.payload {
            Some(Payload::Vision { source, .. }) => source,
            _ => panic!("expected vision payload"),
        }
    }

    struct FixedService(VisionFindings);

    #[async_trait]
    impl VisionService for FixedService {
        async fn analyze_image(&self, _: &str) -> Result<VisionFindings, AnalyzerError> {
            Ok(self.0.clone())
        }
    }

    struct FailingService;

    #[async_trait]
    impl VisionService for FailingService {
        async fn analyze_image(&self, _: &str) -> Result<VisionFindings, AnalyzerError> {
            Err(AnalyzerError::Service("Cannot connect to Ollama".to_string()))
        }
    }

    struct SlowService;

    #[async_trait]
    impl VisionService for SlowService {
        async fn analyze_image(&self, _: &str) -> Result<VisionFindings, AnalyzerError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(VisionFindings {
                visual_issues: vec![],
                layout_problems: vec![],
                attention_zones: vec![],
                score: None,
            })
        }
    }

    fn external_findings() -> VisionFindings {
        VisionFindings {
            visual_issues: vec!["Busy header".to_string()],
            layout_problems: vec![],
            attention_zones: vec![HeatZone::new(40.0, 20.0, 0.9, Some("hero"))],
            score: Some(72.0),
        }
    }

    #[tokio::test]
    async fn test_unconfigured_uses_baseline() {
        let analyzer = VisionAnalyzer::new(None, Duration::from_secs(1), 8);
        let fragment = analyzer.analyze(&page(Some("data:image/png;base64,AAAA"))).await.unwrap();

        assert_eq!(source(&fragment), VisionSource::Baseline);
        assert_eq!(fragment.score, Some(100.0));
        assert!(!fragment.issues.iter().any(|i| i.category == "vision-fallback"));
    }

    #[tokio::test]
    async fn test_configured_service_is_used() {
        let service: Arc<dyn VisionService> = Arc::new(FixedService(external_findings()));
        let analyzer = VisionAnalyzer::new(Some(service), Duration::from_secs(1), 8);
        let fragment = analyzer.analyze(&page(Some("data:image/png;base64,AAAA"))).await.unwrap();

        assert_eq!(source(&fragment), VisionSource::External);
        assert_eq!(fragment.score, Some(72.0));
        assert_eq!(fragment.issues[0].message, "Busy header");
    }

    #[tokio::test]
    async fn test_missing_screenshot_uses_baseline() {
        let service: Arc<dyn VisionService> = Arc::new(FixedService(external_findings()));
        let analyzer = VisionAnalyzer::new(Some(service), Duration::from_secs(1), 8);
        let fragment = analyzer.analyze(&page(None)).await.unwrap();
        assert_eq!(source(&fragment), VisionSource::Baseline);
    }

    #[tokio::test]
    async fn test_service_failure_falls_back_explicitly() {
        let service: Arc<dyn VisionService> = Arc::new(FailingService);
        let analyzer = VisionAnalyzer::new(Some(service), Duration::from_secs(1), 8);
        let fragment = analyzer.analyze(&page(Some("AAAA"))).await.unwrap();

        assert_eq!(source(&fragment), VisionSource::Baseline);
        assert!(fragment.issues.iter().any(|i| i.category == "vision-fallback"));
    }

    #[tokio::test]
    async fn test_slow_service_falls_back() {
        let service: Arc<dyn VisionService> = Arc::new(SlowService);
        let analyzer = VisionAnalyzer::new(Some(service), Duration::from_millis(50), 8);
        let fragment = analyzer.analyze(&page(Some("AAAA"))).await.unwrap();
        assert_eq!(source(&fragment), VisionSource::Baseline);
    }

    #[test]
    fn test_baseline_findings() {
        let html = r#"<html><body><table><tr><td>Nav</td></tr></table>
            <img src="a.png"><video src="v.mp4" autoplay></video><p>Hello</p></body></html>"#;
        let findings = BaselineAnalyzer::new(8).findings(html);

        assert_eq!(findings.visual_issues.len(), 2);
        assert_eq!(findings.layout_problems.len(), 3);
        assert_eq!(findings.score, Some(54.0));
        assert!(!findings.attention_zones.is_empty());

        let empty = BaselineAnalyzer::new(8).findings("");
        assert_eq!(empty.score, Some(0.0));
        assert!(empty.attention_zones.is_empty());
    }

    #[test]
    fn test_parse_findings_tolerates_fences() {
        let content = "```json\n{\"visualIssues\": [\"Tiny text\"], \"attentionZones\": \
                       [{\"x\": 140, \"y\": 10, \"intensity\": 2.0}], \"score\": 130}\n```";
        let findings = parse_findings(content).unwrap();

        assert_eq!(findings.visual_issues, vec!["Tiny text"]);
        assert!(findings.layout_problems.is_empty());
        assert_eq!(findings.attention_zones[0].x, 100.0);
        assert_eq!(findings.attention_zones[0].intensity, 1.0);
        assert_eq!(findings.score, Some(100.0));

        assert!(parse_findings("no json here").is_err());
    }

    #[tokio::test]
    async fn test_ollama_service_round_trip() {
        use axum::routing::post;
        use axum::Json;

        let app = axum::Router::new().route(
            "/api/chat",
            post(|Json(body): Json<serde_json::Value>| async move {
                let has_image = body["messages"][1]["images"][0] == "AAAA";
                let content = if has_image {
                    r#"{"visualIssues": [], "layoutProblems": ["Crowded footer"], "attentionZones": [], "score": 81}"#
                } else {
                    "{}"
                };
                Json(serde_json::json!({
                    "message": { "role": "assistant", "content": content },
                    "done": true
                }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let service =
            OllamaVisionService::new(&VisionConfig::default(), &format!("http://{}/", addr)).unwrap();
        let findings = service.analyze_image("AAAA").await.unwrap();
        assert_eq!(findings.layout_problems, vec!["Crowded footer"]);
        assert_eq!(findings.score, Some(81.0));
    }
}
