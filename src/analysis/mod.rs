//! Page analysis.
//!
//! Each analyzer inspects one [`FetchedPage`] independently and produces a
//! [`Fragment`]. The aggregator combines fragments into the scores, metrics,
//! heatmap and recommendations of a report.

pub mod accessibility;
pub mod aggregator;
pub mod clarity;
pub mod dom;
pub mod focus;
pub mod readability;
pub mod vision;

pub use accessibility::AccessibilityAnalyzer;
pub use aggregator::combine;
pub use clarity::ClarityAnalyzer;
pub use focus::FocusAnalyzer;
pub use readability::ReadabilityAnalyzer;
pub use vision::{OllamaVisionService, VisionAnalyzer, VisionService};

use crate::config::Config;
use crate::error::AnalyzerError;
use crate::models::{AnalyzerKind, FetchedPage, Fragment};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// A single page analyzer.
///
/// Analyzers must not mutate the page and must not depend on each other's
/// output; the orchestrator runs them concurrently.
#[async_trait]
pub trait PageAnalyzer: Send + Sync {
    fn kind(&self) -> AnalyzerKind;

    async fn analyze(&self, page: &FetchedPage) -> Result<Fragment, AnalyzerError>;
}

/// The five analyzers, configured from `config`.
pub fn standard_analyzers(config: &Config) -> Vec<Arc<dyn PageAnalyzer>> {
    let service: Option<Arc<dyn VisionService>> = match config.vision.ollama_url {
        Some(ref url) => match OllamaVisionService::new(&config.vision, url) {
            Ok(service) => {
                info!("Vision service: {} ({})", url, config.vision.model);
                Some(Arc::new(service))
            }
            Err(e) => {
                warn!("Vision service disabled: {}", e);
                None
            }
        },
        None => None,
    };

    vec![
        Arc::new(ClarityAnalyzer),
        Arc::new(AccessibilityAnalyzer),
        Arc::new(ReadabilityAnalyzer),
        Arc::new(FocusAnalyzer::new(config.analyzers.max_zones)),
        Arc::new(VisionAnalyzer::new(
            service,
            config.vision_budget(),
            config.analyzers.max_zones,
        )),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_analyzers_cover_every_kind() {
        let analyzers = standard_analyzers(&Config::default());
        let mut kinds: Vec<AnalyzerKind> = analyzers.iter().map(|a| a.kind()).collect();
        kinds.sort();
        assert_eq!(kinds, AnalyzerKind::ALL.to_vec());
    }
}
