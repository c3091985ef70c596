//! Focus/heatmap analyzer.
//!
//! Predicts where attention lands from element type and document position.
//! Elements early in the document sit near the top of the page; intensity
//! decays with depth.

use crate::analysis::{dom, PageAnalyzer};
use crate::error::AnalyzerError;
use crate::models::{AnalyzerKind, FetchedPage, Fragment, HeatZone, Issue, Payload, Severity};
use async_trait::async_trait;
use scraper::{ElementRef, Html};

/// Intensity above which a zone competes for primary attention.
const STRONG_INTENSITY: f64 = 0.75;

/// More strong zones than this dilute focus.
const MAX_STRONG_ZONES: usize = 3;

/// A call to action should start within this share of the page height.
const CTA_FOLD: f64 = 40.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Headline,
    Subheading,
    HeroImage,
    Image,
    Video,
    CallToAction,
    Navigation,
    Form,
}

impl Target {
    fn base_intensity(self) -> f64 {
        match self {
            Target::Headline => 0.95,
            Target::HeroImage | Target::Video => 0.85,
            Target::CallToAction => 0.8,
            Target::Form => 0.65,
            Target::Image => 0.6,
            Target::Subheading => 0.55,
            Target::Navigation => 0.5,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Target::Headline => "headline",
            Target::Subheading => "subheading",
            Target::HeroImage => "hero image",
            Target::Image => "image",
            Target::Video => "video",
            Target::CallToAction => "call to action",
            Target::Navigation => "navigation",
            Target::Form => "form",
        }
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    target: Target,
    zone: HeatZone,
}

fn is_call_to_action(el: &ElementRef<'_>) -> bool {
    let value = el.value();
    if value.name() == "button" || value.attr("role") == Some("button") {
        return true;
    }
    if value.name() != "a" {
        return false;
    }
    let class = value.attr("class").unwrap_or_default().to_lowercase();
    ["btn", "button", "cta"].iter().any(|marker| class.contains(marker))
}

fn classify(el: &ElementRef<'_>, images_seen: usize) -> Option<Target> {
    match el.value().name() {
        "h1" => Some(Target::Headline),
        "h2" => Some(Target::Subheading),
        "img" if images_seen == 0 => Some(Target::HeroImage),
        "img" => Some(Target::Image),
        "video" => Some(Target::Video),
        "nav" => Some(Target::Navigation),
        "form" => Some(Target::Form),
        "button" | "a" if is_call_to_action(el) => Some(Target::CallToAction),
        _ => None,
    }
}

/// Attention candidates in document order.
fn candidates(document: &Html) -> Vec<Candidate> {
    let elements: Vec<ElementRef<'_>> = document.select(&dom::selector("body *")).collect();
    let total = elements.len().max(1) as f64;

    let mut images_seen = 0;
    let mut found = Vec::new();
    for (index, el) in elements.iter().enumerate() {
        let Some(target) = classify(el, images_seen) else {
            continue;
        };

        let y = 5.0 + 90.0 * index as f64 / total;
        let x = match target {
            Target::Image if images_seen % 2 == 1 => 30.0,
            Target::Image => 70.0,
            _ => 50.0,
        };
        if el.value().name() == "img" {
            images_seen += 1;
        }

        let intensity = target.base_intensity() * (1.0 - 0.4 * y / 100.0);
        found.push(Candidate {
            target,
            zone: HeatZone::new(x, y, intensity, Some(target.label())),
        });
    }
    found
}

/// Keep the `max_zones` strongest zones, returned top to bottom.
fn strongest(mut zones: Vec<HeatZone>, max_zones: usize) -> Vec<HeatZone> {
    zones.sort_by(|a, b| b.intensity.total_cmp(&a.intensity));
    zones.truncate(max_zones);
    zones.sort_by(|a, b| a.y.total_cmp(&b.y));
    zones
}

/// Predicted attention zones for a parsed document.
pub fn predict_zones(document: &Html, max_zones: usize) -> Vec<HeatZone> {
    let zones = candidates(document).into_iter().map(|c| c.zone).collect();
    strongest(zones, max_zones)
}

/// Produces the attention heatmap and a focus-accuracy score.
pub struct FocusAnalyzer {
    max_zones: usize,
}

impl FocusAnalyzer {
    pub fn new(max_zones: usize) -> Self {
        Self {
            max_zones: max_zones.max(1),
        }
    }

    fn evaluate(&self, html: &str) -> Result<Fragment, AnalyzerError> {
        let document = dom::parse(html)?;
        let found = candidates(&document);
        let mut issues = Vec::new();
        let mut score = 100.0;

        let headlines = found
            .iter()
            .filter(|c| c.target == Target::Headline)
            .count();
        if headlines == 0 {
            score -= 25.0;
            issues.push(Issue::new(
                Severity::High,
                "no-primary-heading",
                "No primary heading to anchor attention",
            ));
        } else if headlines > 1 {
            score -= 10.0;
            issues.push(Issue::new(
                Severity::Medium,
                "no-primary-heading",
                format!("{} primary headings compete for attention", headlines),
            ));
        }

        match found.iter().find(|c| c.target == Target::CallToAction) {
            None => {
                score -= 15.0;
                issues.push(Issue::new(
                    Severity::Medium,
                    "missing-cta",
                    "No clear call to action",
                ));
            }
            Some(cta) if cta.zone.y > CTA_FOLD => {
                score -= 10.0;
                issues.push(Issue::new(
                    Severity::Low,
                    "missing-cta",
                    format!("First call to action sits {:.0}% down the page", cta.zone.y),
                ));
            }
            Some(_) => {}
        }

        let strong = found
            .iter()
            .filter(|c| c.zone.intensity >= STRONG_INTENSITY)
            .count();
        if strong > MAX_STRONG_ZONES {
            score -= 15.0;
            issues.push(Issue::new(
                Severity::Medium,
                "competing-focus",
                format!("{} elements compete for primary attention", strong),
            ));
        }

        let zones = strongest(found.into_iter().map(|c| c.zone).collect(), self.max_zones);

        Ok(Fragment::scored(
            AnalyzerKind::Focus,
            score,
            issues,
            Payload::Focus { zones },
        ))
    }
}

#[async_trait]
impl PageAnalyzer for FocusAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Focus
    }

    async fn analyze(&self, page: &FetchedPage) -> Result<Fragment, AnalyzerError> {
        self.evaluate(&page.html)
    }
}
