//! Visual-clarity analyzer.
//!
//! Scores structure and presentation from the DOM and its declared CSS:
//! landmarks, navigation, responsiveness, text/media balance, heading
//! hierarchy, palette size and typography. The component score is the mean
//! of the seven sub-scores.

use crate::analysis::{dom, PageAnalyzer};
use crate::error::AnalyzerError;
use crate::models::{
    clamp_score, AnalyzerKind, ClarityMetrics, FetchedPage, Fragment, Issue, Payload, Severity,
};
use async_trait::async_trait;
use scraper::Html;

/// Landmark regions and their ARIA role equivalents.
const LANDMARKS: &[(&str, &str)] = &[
    ("header", "banner"),
    ("nav", "navigation"),
    ("main", "main"),
    ("footer", "contentinfo"),
];

/// Navigation menus above this many links start to lose points.
const NAV_LINK_LIMIT: usize = 7;

/// Palettes above this many distinct colours start to lose points.
const PALETTE_LIMIT: usize = 5;

/// Font families above this many start to lose points.
const FONT_FAMILY_LIMIT: usize = 2;

/// Body text below this size is considered hard to read.
const MIN_FONT_PX: f64 = 12.0;

fn landmark_count(document: &Html) -> usize {
    LANDMARKS
        .iter()
        .filter(|(tag, role)| {
            let css = format!("{}, [role=\"{}\"]", tag, role);
            document.select(&dom::selector(&css)).next().is_some()
        })
        .count()
}

fn navigation_score(document: &Html) -> f64 {
    let navs: Vec<_> = document
        .select(&dom::selector("nav, [role=\"navigation\"]"))
        .collect();
    let links = document.select(&dom::selector("a[href]")).count();

    if navs.is_empty() {
        return if links == 0 { 40.0 } else { 60.0 };
    }

    let nav_links: usize = navs
        .iter()
        .map(|nav| nav.select(&dom::selector("a[href]")).count())
        .max()
        .unwrap_or(0);

    match nav_links {
        0 => 60.0,
        n if n <= NAV_LINK_LIMIT => 100.0,
        n => (100.0 - 5.0 * (n - NAV_LINK_LIMIT) as f64).max(50.0),
    }
}

fn is_mobile_friendly(document: &Html) -> bool {
    document
        .select(&dom::selector("meta[name=\"viewport\"]"))
        .filter_map(|meta| meta.value().attr("content"))
        .any(|content| content.to_lowercase().contains("width=device-width"))
}

fn responsiveness(document: &Html, css: &str, mobile_friendly: bool) -> f64 {
    let adaptive = css.contains("@media")
        || document
            .select(&dom::selector("img[srcset], source[srcset], picture"))
            .next()
            .is_some();

    let mut score = 40.0;
    if mobile_friendly {
        score += 40.0;
    }
    if adaptive {
        score += 20.0;
    }
    score
}

fn visual_balance(word_count: usize, media_count: usize) -> f64 {
    match (word_count, media_count) {
        (0, 0) => 50.0,
        (words, 0) if words > 300 => 70.0,
        (_, 0) => 85.0,
        (words, media) => {
            let per_media = words as f64 / media as f64;
            if per_media < 50.0 {
                70.0
            } else if per_media > 400.0 {
                80.0
            } else {
                100.0
            }
        }
    }
}

/// Heading levels (1-6) in document order.
fn heading_levels(document: &Html) -> Vec<u8> {
    document
        .select(&dom::selector("h1, h2, h3, h4, h5, h6"))
        .filter_map(|h| h.value().name()[1..].parse().ok())
        .collect()
}

/// Number of places where a heading jumps more than one level deeper.
fn skipped_levels(levels: &[u8]) -> usize {
    levels
        .windows(2)
        .filter(|pair| pair[1] > pair[0] + 1)
        .count()
}

fn content_hierarchy(levels: &[u8]) -> f64 {
    let h1_count = levels.iter().filter(|&&l| l == 1).count();
    let base = match h1_count {
        0 => 50.0,
        1 => 100.0,
        _ => 80.0,
    };
    (base - 10.0 * skipped_levels(levels) as f64).max(0.0)
}

fn palette_size(css: &str) -> usize {
    let mut colors = dom::distinct_values(css, "color");
    colors.extend(dom::distinct_values(css, "background-color"));
    colors.len()
}

fn color_consistency(palette: usize) -> f64 {
    if palette <= PALETTE_LIMIT {
        100.0
    } else {
        (100.0 - 5.0 * (palette - PALETTE_LIMIT) as f64).max(40.0)
    }
}

fn small_font_count(css: &str) -> usize {
    dom::declared_values(css, "font-size")
        .iter()
        .filter_map(|size| size.strip_suffix("px")?.trim().parse::<f64>().ok())
        .filter(|px| *px < MIN_FONT_PX)
        .count()
}

fn typography_score(font_families: usize, small_fonts: usize) -> f64 {
    let mut score = 100.0;
    if font_families > FONT_FAMILY_LIMIT {
        score -= 15.0 * (font_families - FONT_FAMILY_LIMIT) as f64;
    }
    score -= (10.0 * small_fonts as f64).min(30.0);
    score.max(40.0)
}

/// Scores the page's structure and presentation.
pub struct ClarityAnalyzer;

impl ClarityAnalyzer {
    fn evaluate(&self, html: &str) -> Result<Fragment, AnalyzerError> {
        let document = dom::parse(html)?;
        let css = dom::stylesheet_text(&document);
        let mut issues = Vec::new();

        let landmarks = landmark_count(&document);
        let layout_score = (40.0 + 15.0 * landmarks as f64).min(100.0);
        if landmarks < 2 {
            issues.push(Issue::new(
                Severity::Medium,
                "landmarks",
                format!("Only {} of {} landmark regions present", landmarks, LANDMARKS.len()),
            ));
        }

        let navigation_score = navigation_score(&document);
        if navigation_score < 70.0 {
            issues.push(Issue::new(
                Severity::Medium,
                "navigation",
                "Navigation is missing or hard to scan",
            ));
        }

        let mobile_friendly = is_mobile_friendly(&document);
        if !mobile_friendly {
            issues.push(Issue::new(
                Severity::High,
                "mobile",
                "No responsive viewport meta tag",
            ));
        }
        let responsiveness = responsiveness(&document, &css, mobile_friendly);

        let word_count = dom::words(&dom::visible_text(&document)).len();
        let media_count = document
            .select(&dom::selector("img, video, svg, picture, canvas"))
            .count();
        let visual_balance = visual_balance(word_count, media_count);
        if visual_balance < 80.0 {
            issues.push(Issue::new(
                Severity::Low,
                "visual-balance",
                format!("{} words against {} media elements", word_count, media_count),
            ));
        }

        let levels = heading_levels(&document);
        let content_hierarchy = content_hierarchy(&levels);
        if !levels.contains(&1) {
            issues.push(Issue::new(
                Severity::Medium,
                "heading-structure",
                "Page has no top-level heading",
            ));
        }
        let skipped = skipped_levels(&levels);
        if skipped > 0 {
            issues.push(Issue::new(
                Severity::Low,
                "heading-structure",
                format!("Heading levels skipped {} time(s)", skipped),
            ));
        }

        let palette = palette_size(&css);
        let color_consistency = color_consistency(palette);
        if palette > PALETTE_LIMIT {
            issues.push(Issue::new(
                Severity::Low,
                "color-palette",
                format!("{} distinct colours declared", palette),
            ));
        }

        let font_families = dom::distinct_values(&css, "font-family").len();
        let small_fonts = small_font_count(&css);
        let typography_score = typography_score(font_families, small_fonts);
        if font_families > FONT_FAMILY_LIMIT {
            issues.push(Issue::new(
                Severity::Low,
                "typography",
                format!("{} different font families", font_families),
            ));
        }
        if small_fonts > 0 {
            issues.push(Issue::new(
                Severity::Low,
                "typography",
                format!("{} font size(s) below {}px", small_fonts, MIN_FONT_PX),
            ));
        }

        let metrics = ClarityMetrics {
            layout_score,
            navigation_score,
            visual_balance,
            content_hierarchy,
            color_consistency,
            typography_score,
            responsiveness,
            mobile_friendly,
        };

        let parts = [
            layout_score,
            navigation_score,
            visual_balance,
            content_hierarchy,
            color_consistency,
            typography_score,
            responsiveness,
        ];
        let score = clamp_score(parts.iter().sum::<f64>() / parts.len() as f64);

        Ok(Fragment::scored(
            AnalyzerKind::VisualClarity,
            score,
            issues,
            Payload::VisualClarity(metrics),
        ))
    }
}

#[async_trait]
impl PageAnalyzer for ClarityAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::VisualClarity
    }

    async fn analyze(&self, page: &FetchedPage) -> Result<Fragment, AnalyzerError> {
        self.evaluate(&page.html)
    }
}
