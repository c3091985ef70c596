//! Scan orchestration.
//!
//! Drives one scan end to end:
//! `Pending -> Fetching -> Analyzing -> Aggregating -> Stored -> Done`,
//! or `Failed` from any phase. Analyzers run concurrently against one shared
//! read-only page; each is bounded by its own timeout and a failure only
//! removes that analyzer's component. The whole scan is bounded by an outer
//! deadline.

use crate::analysis::{self, PageAnalyzer};
use crate::config::Config;
use crate::error::{AnalyzerError, FetchError, ScanError};
use crate::fetcher::{HttpFetcher, PageFetcher};
use crate::models::{AnalyzerKind, FetchedPage, Fragment, ScanReport, ScanRequest};
use crate::store::ScanStore;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

/// Lifecycle of a single scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanPhase {
    Pending,
    Fetching,
    Analyzing,
    Aggregating,
    Stored,
    Done,
    Failed(String),
}

impl fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanPhase::Pending => write!(f, "pending"),
            ScanPhase::Fetching => write!(f, "fetching"),
            ScanPhase::Analyzing => write!(f, "analyzing"),
            ScanPhase::Aggregating => write!(f, "aggregating"),
            ScanPhase::Stored => write!(f, "stored"),
            ScanPhase::Done => write!(f, "done"),
            ScanPhase::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Time budgets and report limits of a scan.
#[derive(Debug, Clone)]
pub struct ScanSettings {
    /// Budget of each analyzer.
    pub analyzer_timeout: Duration,
    /// Outer deadline of the whole scan.
    pub deadline: Duration,
    pub max_recommendations: usize,
}

impl ScanSettings {
    /// The outer deadline covers the fetch, one analyzer round and the store write.
    pub fn from_config(config: &Config) -> Self {
        Self {
            analyzer_timeout: config.analyzer_timeout(),
            deadline: config.fetch_timeout() + config.analyzer_timeout() + config.store_budget(),
            max_recommendations: config.report.max_recommendations,
        }
    }
}

/// Runs scans against a fetcher, a set of analyzers and a store.
pub struct ScanOrchestrator {
    fetcher: Arc<dyn PageFetcher>,
    analyzers: Vec<Arc<dyn PageAnalyzer>>,
    store: Arc<dyn ScanStore>,
    settings: ScanSettings,
}

impl ScanOrchestrator {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        analyzers: Vec<Arc<dyn PageAnalyzer>>,
        store: Arc<dyn ScanStore>,
        settings: ScanSettings,
    ) -> Self {
        Self {
            fetcher,
            analyzers,
            store,
            settings,
        }
    }

    /// The HTTP fetcher and the five standard analyzers, configured from `config`.
    pub fn from_config(config: &Config, store: Arc<dyn ScanStore>) -> Result<Self, FetchError> {
        let fetcher = HttpFetcher::new(&config.fetcher)?;
        Ok(Self::new(
            Arc::new(fetcher),
            analysis::standard_analyzers(config),
            store,
            ScanSettings::from_config(config),
        ))
    }

    pub fn store(&self) -> Arc<dyn ScanStore> {
        Arc::clone(&self.store)
    }

    /// Run one scan and return the stored report.
    pub async fn run_scan(&self, request: &ScanRequest) -> Result<ScanReport, ScanError> {
        let (progress, _) = watch::channel(ScanPhase::Pending);
        self.run_scan_observed(request, &progress).await
    }

    /// Run one scan, publishing every phase transition on `progress`.
    pub async fn run_scan_observed(
        &self,
        request: &ScanRequest,
        progress: &watch::Sender<ScanPhase>,
    ) -> Result<ScanReport, ScanError> {
        let id = Uuid::new_v4();
        let started = Instant::now();

        let result = match request.target() {
            Ok(url) => {
                info!(scan_id = %id, url = %url, "Scan started");
                match tokio::time::timeout(self.settings.deadline, self.execute(id, &url, progress))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(ScanError::ScanTimeout(self.settings.deadline)),
                }
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(report) => {
                advance(progress, id, ScanPhase::Done);
                info!(
                    scan_id = %id,
                    "Scan done in {:.2}s (overall {:.1})",
                    started.elapsed().as_secs_f64(),
                    report.scores.overall()
                );
                Ok(report)
            }
            Err(e) => {
                let during = progress.borrow().clone();
                warn!(scan_id = %id, phase = %during, error = %e, "Scan failed");
                advance(progress, id, ScanPhase::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        id: Uuid,
        url: &Url,
        progress: &watch::Sender<ScanPhase>,
    ) -> Result<ScanReport, ScanError> {
        advance(progress, id, ScanPhase::Fetching);
        let page = Arc::new(self.fetcher.fetch(url).await?);

        advance(progress, id, ScanPhase::Analyzing);
        let fragments = self.run_analyzers(id, &page).await;

        advance(progress, id, ScanPhase::Aggregating);
        let absent = fragments.iter().filter(|f| f.is_absent()).count();
        if absent > 0 {
            debug!(scan_id = %id, absent, "Aggregating with absent analyzers");
        }
        let assessment = analysis::combine(&fragments, self.settings.max_recommendations)?;
        let report = ScanReport::assemble(id, &page, assessment);

        self.store.save(report.clone()).await?;
        advance(progress, id, ScanPhase::Stored);

        Ok(report)
    }

    /// Run every analyzer concurrently. Always yields one fragment per
    /// analyzer, in registration order; failures become absent fragments.
    async fn run_analyzers(&self, id: Uuid, page: &Arc<FetchedPage>) -> Vec<Fragment> {
        let limit = self.settings.analyzer_timeout;
        let mut tasks = JoinSet::new();

        for (index, analyzer) in self.analyzers.iter().enumerate() {
            let analyzer = Arc::clone(analyzer);
            let page = Arc::clone(page);
            tasks.spawn(async move {
                let kind = analyzer.kind();
                let outcome = tokio::time::timeout(limit, analyzer.analyze(&page)).await;
                (index, kind, outcome)
            });
        }

        let mut slots: Vec<Option<Fragment>> = vec![None; self.analyzers.len()];
        while let Some(joined) = tasks.join_next().await {
            let (index, kind, outcome) = match joined {
                Ok(done) => done,
                Err(e) => {
                    error!(scan_id = %id, error = %e, "Analyzer task failed");
                    continue;
                }
            };

            let fragment = match outcome {
                Ok(Ok(fragment)) => {
                    debug!(scan_id = %id, analyzer = %kind, score = ?fragment.score, "Analyzer finished");
                    fragment
                }
                Ok(Err(e)) => {
                    warn!(scan_id = %id, analyzer = %kind, error = %e, "Analyzer failed");
                    Fragment::absent(kind, &e.to_string())
                }
                Err(_) => {
                    warn!(scan_id = %id, analyzer = %kind, "Analyzer timed out after {:?}", limit);
                    Fragment::absent(kind, &format!("timed out after {:?}", limit))
                }
            };
            slots[index] = Some(fragment);
        }

        slots
            .into_iter()
            .zip(&self.analyzers)
            .map(|(slot, analyzer)| {
                slot.unwrap_or_else(|| {
                    let reason = AnalyzerError::Other("analyzer task panicked".to_string());
                    Fragment::absent(analyzer.kind(), &reason.to_string())
                })
            })
            .collect()
    }

    /// Analyzer kinds in registration order.
    pub fn analyzer_kinds(&self) -> Vec<AnalyzerKind> {
        self.analyzers.iter().map(|a| a.kind()).collect()
    }
}

fn advance(progress: &watch::Sender<ScanPhase>, id: Uuid, phase: ScanPhase) {
    debug!(scan_id = %id, phase = %phase, "Phase transition");
    progress.send_replace(phase);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::models::{
        AccessibilityMetrics, ClarityMetrics, ColorContrast, HeatZone, Payload,
        ReadabilityMetrics, VisionFindings, VisionSource,
    };
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SCREENSHOT: &str = "data:image/png;base64,iVBORw0KGgo=";

    struct StubFetcher {
        html: String,
        error: Option<FetchError>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl StubFetcher {
        fn page(html: &str) -> Self {
            Self {
                html: html.to_string(),
                error: None,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(error: FetchError) -> Self {
            Self {
                error: Some(error),
                ..Self::page("")
            }
        }
    }

    #[async_trait]
    impl PageFetcher for StubFetcher {
        async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if let Some(ref e) = self.error {
                return Err(e.clone());
            }
            Ok(FetchedPage {
                url: url.to_string(),
                html: self.html.clone(),
                screenshot: Some(SCREENSHOT.to_string()),
                fetched_at: Utc::now(),
            })
        }
    }

    struct StubAnalyzer {
        fragment: Fragment,
        delay: Duration,
    }

    impl StubAnalyzer {
        fn new(fragment: Fragment) -> Arc<dyn PageAnalyzer> {
            Arc::new(Self {
                fragment,
                delay: Duration::ZERO,
            })
        }

        fn slow(fragment: Fragment, delay: Duration) -> Arc<dyn PageAnalyzer> {
            Arc::new(Self { fragment, delay })
        }
    }

    #[async_trait]
    impl PageAnalyzer for StubAnalyzer {
        fn kind(&self) -> AnalyzerKind {
            self.fragment.kind
        }

        async fn analyze(&self, _page: &FetchedPage) -> Result<Fragment, AnalyzerError> {
            tokio::time::sleep(self.delay).await;
            Ok(self.fragment.clone())
        }
    }

    struct FailingStore;

    #[async_trait]
    impl ScanStore for FailingStore {
        async fn save(&self, _report: ScanReport) -> Result<Uuid, StoreError> {
            Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only",
            )))
        }

        async fn get(&self, id: Uuid) -> Result<ScanReport, ScanError> {
            Err(ScanError::NotFound(id))
        }

        async fn list(&self) -> Vec<ScanReport> {
            vec![]
        }

        async fn delete(&self, id: Uuid) -> Result<(), ScanError> {
            Err(ScanError::NotFound(id))
        }
    }

    fn clarity(score: f64) -> Fragment {
        Fragment::scored(
            AnalyzerKind::VisualClarity,
            score,
            vec![],
            Payload::VisualClarity(ClarityMetrics {
                layout_score: 85.0,
                navigation_score: 90.0,
                visual_balance: 88.0,
                content_hierarchy: 92.0,
                color_consistency: 86.0,
                typography_score: 84.0,
                responsiveness: 91.0,
                mobile_friendly: true,
            }),
        )
    }

    fn accessibility(score: f64) -> Fragment {
        Fragment::scored(
            AnalyzerKind::Accessibility,
            score,
            vec![],
            Payload::Accessibility {
                metrics: AccessibilityMetrics {
                    missing_alt: 3,
                    aria_issues: 2,
                    keyboard_nav: true,
                    issues: vec![],
                },
                color_contrast: ColorContrast {
                    pass_aa: true,
                    pass_aaa: false,
                    min_ratio: Some(5.1),
                },
            },
        )
    }

    fn readability(score: f64) -> Fragment {
        Fragment::scored(
            AnalyzerKind::Readability,
            score,
            vec![],
            Payload::Readability(ReadabilityMetrics {
                flesch_score: 72.5,
                grade_level: "7th grade".to_string(),
                issues: vec![],
            }),
        )
    }

    fn focus(score: f64) -> Fragment {
        Fragment::scored(
            AnalyzerKind::Focus,
            score,
            vec![],
            Payload::Focus {
                zones: vec![
                    HeatZone::new(50.0, 10.0, 0.9, Some("headline")),
                    HeatZone::new(30.0, 40.0, 0.7, Some("hero image")),
                    HeatZone::new(70.0, 60.0, 0.5, Some("call to action")),
                ],
            },
        )
    }

    fn vision() -> Fragment {
        Fragment::scored(
            AnalyzerKind::Vision,
            75.0,
            vec![],
            Payload::Vision {
                findings: VisionFindings {
                    visual_issues: vec!["Busy header".to_string()],
                    layout_problems: vec![],
                    attention_zones: vec![],
                    score: Some(75.0),
                },
                source: VisionSource::Baseline,
            },
        )
    }

    fn settings() -> ScanSettings {
        ScanSettings {
            analyzer_timeout: Duration::from_secs(2),
            deadline: Duration::from_secs(5),
            max_recommendations: 8,
        }
    }

    fn stub_analyzers() -> Vec<Arc<dyn PageAnalyzer>> {
        vec![
            StubAnalyzer::new(clarity(88.0)),
            StubAnalyzer::new(accessibility(78.0)),
            StubAnalyzer::new(readability(86.0)),
            StubAnalyzer::new(focus(84.0)),
            StubAnalyzer::new(vision()),
        ]
    }

    fn request(url: &str) -> ScanRequest {
        ScanRequest {
            url: url.to_string(),
        }
    }

    #[tokio::test]
    async fn test_scan_produces_expected_report() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = ScanOrchestrator::new(
            Arc::new(StubFetcher::page("<html><body><h1>Example</h1></body></html>")),
            stub_analyzers(),
            store.clone(),
            settings(),
        );

        let report = orchestrator
            .run_scan(&request("https://example.com"))
            .await
            .unwrap();

        assert_eq!(report.url, "https://example.com/");
        assert_eq!(report.scores.overall(), 84.0);
        assert_eq!(report.scores.accessibility(), Some(78.0));
        assert_eq!(report.scores.ux_score(), Some(75.0));
        assert!(report.metrics.color_contrast.as_ref().unwrap().pass_aa);
        assert_eq!(report.heatmap_data.zones.len(), 3);
        assert_eq!(report.screenshot.as_deref(), Some(SCREENSHOT));
        for score in report.scores.all() {
            assert!((0.0..=100.0).contains(&score));
        }

        assert_eq!(store.get(report.id).await.unwrap(), report);
    }

    #[tokio::test]
    async fn test_progress_reaches_done() {
        let orchestrator = ScanOrchestrator::new(
            Arc::new(StubFetcher::page("<p>x</p>")),
            stub_analyzers(),
            Arc::new(MemoryStore::new()),
            settings(),
        );
        let (tx, rx) = watch::channel(ScanPhase::Pending);

        orchestrator
            .run_scan_observed(&request("https://example.com"), &tx)
            .await
            .unwrap();
        assert_eq!(*rx.borrow(), ScanPhase::Done);
    }

    #[tokio::test]
    async fn test_all_analyzers_failing_is_insufficient_data() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = ScanOrchestrator::new(
            Arc::new(StubFetcher::page("")),
            analysis::standard_analyzers(&Config::default()),
            store.clone(),
            settings(),
        );
        let (tx, rx) = watch::channel(ScanPhase::Pending);

        let err = orchestrator
            .run_scan_observed(&request("https://example.com"), &tx)
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::InsufficientData), "got {err:?}");
        assert!(matches!(*rx.borrow(), ScanPhase::Failed(_)));
        assert!(store.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_analyzer_timeout_drops_only_that_component() {
        let analyzers = vec![
            StubAnalyzer::new(clarity(88.0)),
            StubAnalyzer::slow(accessibility(78.0), Duration::from_secs(10)),
            StubAnalyzer::new(readability(86.0)),
            StubAnalyzer::new(focus(84.0)),
        ];
        let orchestrator = ScanOrchestrator::new(
            Arc::new(StubFetcher::page("<p>x</p>")),
            analyzers,
            Arc::new(MemoryStore::new()),
            ScanSettings {
                analyzer_timeout: Duration::from_millis(100),
                ..settings()
            },
        );

        let started = Instant::now();
        let report = orchestrator
            .run_scan(&request("https://example.com"))
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(report.scores.accessibility(), None);
        assert!(report.metrics.color_contrast.is_none());
        assert_eq!(report.scores.overall(), (88.0 + 86.0 + 84.0) / 3.0);
    }

    #[tokio::test]
    async fn test_invalid_url_rejected_before_fetch() {
        let fetcher = Arc::new(StubFetcher::page("<p>x</p>"));
        let orchestrator = ScanOrchestrator::new(
            fetcher.clone(),
            stub_analyzers(),
            Arc::new(MemoryStore::new()),
            settings(),
        );

        for bad in ["", "not a url", "ftp://example.com/file"] {
            let err = orchestrator.run_scan(&request(bad)).await.unwrap_err();
            assert!(matches!(err, ScanError::Validation(_)), "{bad}: {err:?}");
        }
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fetch_error_is_surfaced() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = ScanOrchestrator::new(
            Arc::new(StubFetcher::failing(FetchError::HttpStatus(503))),
            stub_analyzers(),
            store.clone(),
            settings(),
        );

        let err = orchestrator
            .run_scan(&request("https://example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::Fetch(FetchError::HttpStatus(503))));
        assert!(err.is_retryable());
        assert!(store.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_outer_deadline() {
        let store = Arc::new(MemoryStore::new());
        let fetcher = StubFetcher {
            delay: Duration::from_secs(10),
            ..StubFetcher::page("<p>x</p>")
        };
        let orchestrator = ScanOrchestrator::new(
            Arc::new(fetcher),
            stub_analyzers(),
            store.clone(),
            ScanSettings {
                deadline: Duration::from_millis(100),
                ..settings()
            },
        );

        let err = orchestrator
            .run_scan(&request("https://example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::ScanTimeout(_)));
        assert!(store.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_is_surfaced() {
        let orchestrator = ScanOrchestrator::new(
            Arc::new(StubFetcher::page("<p>x</p>")),
            stub_analyzers(),
            Arc::new(FailingStore),
            settings(),
        );

        let err = orchestrator
            .run_scan(&request("https://example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::Store(_)));
    }

    #[tokio::test]
    async fn test_slow_vision_service_still_yields_baseline() {
        use axum::routing::post;

        let app = axum::Router::new().route(
            "/api/chat",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                "{}"
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let mut config = Config::default();
        config.analyzers.timeout_seconds = 1;
        config.vision.timeout_seconds = 30;
        config.vision.ollama_url = Some(format!("http://{}", addr));

        let orchestrator = ScanOrchestrator::new(
            Arc::new(StubFetcher::page("<main><h1>Hello</h1><p>Welcome.</p></main>")),
            analysis::standard_analyzers(&config),
            Arc::new(MemoryStore::new()),
            ScanSettings::from_config(&config),
        );

        let started = Instant::now();
        let report = orchestrator
            .run_scan(&request("https://example.com"))
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(report.ai_analysis.source, Some(VisionSource::Baseline));
        assert!(report.scores.ux_score().is_some());
    }

    #[tokio::test]
    async fn test_real_analyzers_score_a_page() {
        let html = r#"<html lang="en"><head>
            <meta name="viewport" content="width=device-width, initial-scale=1"></head>
            <body><header><nav><a href="/">Home</a></nav></header>
            <main><h1>Plant care made simple</h1>
            <p>Water your plants once a week. Give them plenty of light. Feed them in spring.</p>
            <a class="cta" href="/start">Get started</a></main>
            <footer>Made with care</footer></body></html>"#;
        let orchestrator = ScanOrchestrator::new(
            Arc::new(StubFetcher::page(html)),
            analysis::standard_analyzers(&Config::default()),
            Arc::new(MemoryStore::new()),
            settings(),
        );

        assert_eq!(orchestrator.analyzer_kinds().len(), 5);
        let report = orchestrator
            .run_scan(&request("https://example.com/plants"))
            .await
            .unwrap();

        assert!(report.scores.visual_clarity().is_some());
        assert!(report.scores.accessibility().is_some());
        assert!(report.scores.readability().is_some());
        assert!(report.scores.focus_accuracy().is_some());
        assert!(!report.heatmap_data.zones.is_empty());
        for score in report.scores.all() {
            assert!((0.0..=100.0).contains(&score));
        }
    }
}
