//! Accessibility analyzer.
//!
//! Checks the document against a practical subset of WCAG 2.x:
//! - 1.1.1 images without alternative text
//! - 1.4.3 / 1.4.6 colour contrast (AA 4.5:1, AAA 7:1 for normal text)
//! - 2.1.1 interactive elements reachable by sequential keyboard focus
//! - 3.1.1 page language
//! - 4.1.2 ARIA misuse and unnamed controls
//! - 1.3.1 form controls without labels

use crate::analysis::{dom, PageAnalyzer};
use crate::error::AnalyzerError;
use crate::models::{
    AccessibilityMetrics, AnalyzerKind, ColorContrast, FetchedPage, Fragment, Issue, Payload,
    Severity,
};
use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html};
use std::collections::HashSet;
use std::sync::OnceLock;

/// WCAG AA minimum for normal text.
pub const AA_RATIO: f64 = 4.5;
/// WCAG AAA minimum for normal text.
pub const AAA_RATIO: f64 = 7.0;

type Rgb = (u8, u8, u8);

/// Roles that make an element behave like a control.
const INTERACTIVE_ROLES: &[&str] = &["button", "link", "checkbox", "menuitem", "tab", "switch"];

/// Elements that already carry the given implicit role.
const REDUNDANT_ROLES: &[(&str, &str)] = &[
    ("nav", "navigation"),
    ("main", "main"),
    ("button", "button"),
    ("a", "link"),
    ("ul", "list"),
    ("ol", "list"),
    ("article", "article"),
    ("aside", "complementary"),
];

/// Parse a CSS hex colour (`#rgb` or `#rrggbb`).
pub fn parse_hex_color(hex: &str) -> Option<Rgb> {
    let hex = hex.trim_start_matches('#');
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    match hex.len() {
        3 => {
            let r = u8::from_str_radix(&hex[0..1].repeat(2), 16).ok()?;
            let g = u8::from_str_radix(&hex[1..2].repeat(2), 16).ok()?;
            let b = u8::from_str_radix(&hex[2..3].repeat(2), 16).ok()?;
            Some((r, g, b))
        }
        6 => {
            let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
            let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
            let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
            Some((r, g, b))
        }
        _ => None,
    }
}

/// Parse an `rgb()` / `rgba()` colour.
pub fn parse_rgb_color(value: &str) -> Option<Rgb> {
    static RGB_PATTERN: OnceLock<Regex> = OnceLock::new();
    let re = RGB_PATTERN.get_or_init(|| {
        Regex::new(r"rgba?\(\s*(\d+)\s*,\s*(\d+)\s*,\s*(\d+)").expect("valid regex")
    });
    let caps = re.captures(value)?;
    Some((caps[1].parse().ok()?, caps[2].parse().ok()?, caps[3].parse().ok()?))
}

/// Parse a CSS colour value: hex, rgb(a) or a common named colour.
pub fn parse_color(value: &str) -> Option<Rgb> {
    let trimmed = value.trim().to_lowercase();
    if trimmed.starts_with('#') {
        return parse_hex_color(trimmed.split_whitespace().next()?);
    }
    if trimmed.starts_with("rgb") {
        return parse_rgb_color(&trimmed);
    }
    match trimmed.as_str() {
        "white" => Some((255, 255, 255)),
        "black" => Some((0, 0, 0)),
        "red" => Some((255, 0, 0)),
        "green" => Some((0, 128, 0)),
        "blue" => Some((0, 0, 255)),
        "yellow" => Some((255, 255, 0)),
        "gray" | "grey" => Some((128, 128, 128)),
        "silver" => Some((192, 192, 192)),
        "lightgray" | "lightgrey" => Some((211, 211, 211)),
        "navy" => Some((0, 0, 128)),
        "orange" => Some((255, 165, 0)),
        "purple" => Some((128, 0, 128)),
        "teal" => Some((0, 128, 128)),
        _ => None,
    }
}

/// Relative luminance per WCAG 2.x.
pub fn relative_luminance((r, g, b): Rgb) -> f64 {
    let channel = |c: u8| {
        let v = c as f64 / 255.0;
        if v <= 0.04045 {
            v / 12.92
        } else {
            ((v + 0.055) / 1.055).powf(2.4)
        }
    };
    0.2126 * channel(r) + 0.7152 * channel(g) + 0.0722 * channel(b)
}

/// Contrast ratio between two colours, always `>= 1.0`.
pub fn contrast_ratio(fg: Rgb, bg: Rgb) -> f64 {
    let l1 = relative_luminance(fg);
    let l2 = relative_luminance(bg);
    let (lighter, darker) = if l1 > l2 { (l1, l2) } else { (l2, l1) };
    (lighter + 0.05) / (darker + 0.05)
}

/// Foreground/background pairs declared in the same rule block or inline style.
fn declared_color_pairs(css: &str) -> Vec<(Rgb, Rgb)> {
    static BLOCK_PATTERN: OnceLock<Regex> = OnceLock::new();
    let block_re =
        BLOCK_PATTERN.get_or_init(|| Regex::new(r"([^{}]*)\{([^}]*)\}").expect("valid regex"));

    block_re
        .captures_iter(css)
        .filter_map(|caps| {
            let declarations = format!(";{}", &caps[2]);
            let fg = dom::declared_values(&declarations, "color")
                .last()
                .and_then(|v| parse_color(v))?;
            let bg = ["background-color", "background"].iter().find_map(|property| {
                dom::declared_values(&declarations, property)
                    .last()
                    .and_then(|v| parse_color(v))
            })?;
            Some((fg, bg))
        })
        .collect()
}

/// Evaluate WCAG contrast over every declared pair. Pages without declared
/// pairs render with the default black-on-white and pass both levels.
pub fn evaluate_contrast(css: &str) -> ColorContrast {
    let min_ratio = declared_color_pairs(css)
        .into_iter()
        .map(|(fg, bg)| contrast_ratio(fg, bg))
        .fold(None, |min: Option<f64>, ratio| {
            Some(min.map_or(ratio, |m| m.min(ratio)))
        });

    let effective = min_ratio.unwrap_or_else(|| contrast_ratio((0, 0, 0), (255, 255, 255)));
    ColorContrast {
        pass_aa: effective >= AA_RATIO,
        pass_aaa: effective >= AAA_RATIO,
        min_ratio: min_ratio.map(|r| (r * 100.0).round() / 100.0),
    }
}

fn count_missing_alt(document: &Html) -> usize {
    document
        .select(&dom::selector("img"))
        .filter(|img| img.value().attr("alt").is_none())
        .count()
}

fn has_accessible_name(el: &ElementRef<'_>) -> bool {
    let value = el.value();
    let labelled = ["aria-label", "aria-labelledby", "title"]
        .iter()
        .any(|attr| value.attr(attr).is_some_and(|v| !v.trim().is_empty()));
    if labelled {
        return true;
    }
    if !el.text().collect::<String>().trim().is_empty() {
        return true;
    }
    el.select(&dom::selector("img[alt]"))
        .any(|img| img.value().attr("alt").is_some_and(|alt| !alt.trim().is_empty()))
}

/// ARIA misuse findings, one message per offending element.
fn aria_findings(document: &Html) -> Vec<String> {
    let mut findings = Vec::new();

    let ids: HashSet<&str> = document
        .select(&dom::selector("[id]"))
        .filter_map(|el| el.value().attr("id"))
        .collect();

    for el in document.select(&dom::selector("[aria-hidden=\"true\"]")) {
        let hidden_focusable = dom::is_natively_focusable(&el)
            || dom::tabindex(&el).is_some_and(|t| t >= 0)
            || el
                .select(&dom::selector("a[href], button, input, select, textarea"))
                .next()
                .is_some();
        if hidden_focusable {
            findings.push(format!(
                "<{}> with aria-hidden=\"true\" contains focusable content",
                el.value().name()
            ));
        }
    }

    for el in document.select(&dom::selector("[aria-labelledby], [aria-describedby]")) {
        for attr in ["aria-labelledby", "aria-describedby"] {
            let Some(refs) = el.value().attr(attr) else {
                continue;
            };
            for id in refs.split_whitespace().filter(|id| !ids.contains(id)) {
                findings.push(format!("{} references missing id \"{}\"", attr, id));
            }
        }
    }

    for (element, role) in REDUNDANT_ROLES {
        let css = format!("{}[role=\"{}\"]", element, role);
        let count = document.select(&dom::selector(&css)).count();
        for _ in 0..count {
            findings.push(format!("Redundant role=\"{}\" on <{}>", role, element));
        }
    }

    for el in document.select(&dom::selector("button, a[href], [role=\"button\"], [role=\"link\"]")) {
        if !has_accessible_name(&el) {
            findings.push(format!("<{}> has no accessible name", el.value().name()));
        }
    }

    findings
}

/// Interactive elements that sequential keyboard focus can never reach.
fn unreachable_controls(document: &Html) -> Vec<String> {
    let mut unreachable = Vec::new();

    let candidates = dom::selector("[onclick], [role], a, button, input, select, textarea");
    for el in document.select(&candidates) {
        let value = el.value();
        let role_interactive = value
            .attr("role")
            .is_some_and(|role| INTERACTIVE_ROLES.contains(&role.trim()));
        let scripted = value.attr("onclick").is_some();
        let native = dom::is_natively_focusable(&el);

        if !(native || role_interactive || scripted) {
            continue;
        }

        let reachable = match dom::tabindex(&el) {
            Some(index) => index >= 0,
            None => native,
        };
        if !reachable {
            unreachable.push(format!(
                "<{}> is interactive but not keyboard focusable",
                value.name()
            ));
        }
    }

    unreachable
}

fn positive_tabindex_count(document: &Html) -> usize {
    document
        .select(&dom::selector("[tabindex]"))
        .filter(|el| dom::tabindex(el).is_some_and(|t| t > 0))
        .count()
}

fn unlabeled_controls(document: &Html) -> usize {
    let labelled_ids: HashSet<&str> = document
        .select(&dom::selector("label[for]"))
        .filter_map(|label| label.value().attr("for"))
        .collect();

    document
        .select(&dom::selector("input, select, textarea"))
        .filter(|el| {
            let value = el.value();
            let exempt = matches!(
                value.attr("type"),
                Some("hidden" | "submit" | "button" | "reset" | "image")
            );
            if exempt {
                return false;
            }
            let named = ["aria-label", "aria-labelledby", "title"]
                .iter()
                .any(|attr| value.attr(attr).is_some());
            let for_label = value.attr("id").is_some_and(|id| labelled_ids.contains(id));
            !(named || for_label || dom::has_ancestor(el, "label"))
        })
        .count()
}

/// Counts WCAG violations and scores the page out of 100.
pub struct AccessibilityAnalyzer;

impl AccessibilityAnalyzer {
    fn evaluate(&self, html: &str) -> Result<Fragment, AnalyzerError> {
        let document = dom::parse(html)?;
        let mut issues = Vec::new();

        let missing_alt = count_missing_alt(&document);
        if missing_alt > 0 {
            issues.push(Issue::new(
                Severity::High,
                "missing-alt",
                format!("{} image(s) missing alternative text", missing_alt),
            ));
        }

        let aria = aria_findings(&document);
        if !aria.is_empty() {
            issues.push(Issue::new(
                Severity::Medium,
                "aria",
                format!("{} ARIA issue(s): {}", aria.len(), aria[0]),
            ));
        }

        let unreachable = unreachable_controls(&document);
        let keyboard_nav = unreachable.is_empty();
        if !keyboard_nav {
            issues.push(Issue::new(
                Severity::High,
                "keyboard",
                format!(
                    "{} interactive element(s) unreachable by keyboard: {}",
                    unreachable.len(),
                    unreachable[0]
                ),
            ));
        }

        let positive_tabindex = positive_tabindex_count(&document);
        if positive_tabindex > 0 {
            issues.push(Issue::new(
                Severity::Low,
                "keyboard",
                format!("{} element(s) use a positive tabindex", positive_tabindex),
            ));
        }

        let color_contrast = evaluate_contrast(&dom::stylesheet_text(&document));
        if !color_contrast.pass_aa {
            issues.push(Issue::new(
                Severity::High,
                "contrast-aa",
                format!(
                    "Text contrast {:.2}:1 is below the WCAG AA minimum of 4.5:1",
                    color_contrast.min_ratio.unwrap_or_default()
                ),
            ));
        } else if !color_contrast.pass_aaa {
            issues.push(Issue::new(
                Severity::Low,
                "contrast-aaa",
                format!(
                    "Text contrast {:.2}:1 is below the WCAG AAA level of 7:1",
                    color_contrast.min_ratio.unwrap_or_default()
                ),
            ));
        }

        let has_lang = document
            .select(&dom::selector("html[lang]"))
            .any(|html| html.value().attr("lang").is_some_and(|l| !l.trim().is_empty()));
        if !has_lang {
            issues.push(Issue::new(
                Severity::Medium,
                "lang",
                "Page does not declare its language",
            ));
        }

        let unlabeled = unlabeled_controls(&document);
        if unlabeled > 0 {
            issues.push(Issue::new(
                Severity::Medium,
                "form-labels",
                format!("{} form control(s) without a label", unlabeled),
            ));
        }

        let mut penalty = 0.0;
        penalty += (missing_alt as f64 * 5.0).min(25.0);
        penalty += (aria.len() as f64 * 4.0).min(20.0);
        penalty += if keyboard_nav { 0.0 } else { 15.0 };
        penalty += (positive_tabindex as f64 * 2.0).min(6.0);
        penalty += match (color_contrast.pass_aa, color_contrast.pass_aaa) {
            (false, _) => 20.0,
            (true, false) => 5.0,
            (true, true) => 0.0,
        };
        penalty += if has_lang { 0.0 } else { 5.0 };
        penalty += (unlabeled as f64 * 4.0).min(15.0);

        let metrics = AccessibilityMetrics {
            missing_alt,
            aria_issues: aria.len(),
            keyboard_nav,
            issues: issues.iter().map(|i| i.message.clone()).collect(),
        };

        Ok(Fragment::scored(
            AnalyzerKind::Accessibility,
            100.0 - penalty,
            issues,
            Payload::Accessibility {
                metrics,
                color_contrast,
            },
        ))
    }
}

#[async_trait]
impl PageAnalyzer for AccessibilityAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Accessibility
    }

    async fn analyze(&self, page: &FetchedPage) -> Result<Fragment, AnalyzerError> {
        self.evaluate(&page.html)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(fragment: &Fragment) -> (&AccessibilityMetrics, &ColorContrast) {
        match fragment.payload {
            Some(Payload::Accessibility {
                ref metrics,
                ref color_contrast,
            }) => (metrics, color_contrast),
            _ => panic!("expected accessibility payload"),
        }
    }

    #[test]
    fn test_contrast_ratio_extremes() {
        let ratio = contrast_ratio((0, 0, 0), (255, 255, 255));
        assert!((ratio - 21.0).abs() < 0.01);
        assert!((contrast_ratio((119, 119, 119), (119, 119, 119)) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_color_forms() {
        assert_eq!(parse_color("#fff"), Some((255, 255, 255)));
        assert_eq!(parse_color("#1A2b3C"), Some((26, 43, 60)));
        assert_eq!(parse_color("rgba(10, 20, 30, 0.5)"), Some((10, 20, 30)));
        assert_eq!(parse_color("White"), Some((255, 255, 255)));
        assert_eq!(parse_color("var(--brand)"), None);
    }

    #[test]
    fn test_non_ascii_colour_is_ignored() {
        assert_eq!(parse_color("#é1"), None);
        assert_eq!(parse_color("#aéé1"), None);
        assert_eq!(parse_hex_color("12g"), None);

        let html = r#"<html lang="en"><body><p style="color:#é1;background:#fff">Text</p></body></html>"#;
        let fragment = AccessibilityAnalyzer.evaluate(html).unwrap();
        assert!(fragment.score.is_some());
        match fragment.payload {
            Some(Payload::Accessibility { color_contrast, .. }) => {
                assert!(color_contrast.pass_aa);
                assert_eq!(color_contrast.min_ratio, None);
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn test_contrast_thresholds() {
        // #777 on white is about 4.48:1, just under AA
        let fails = evaluate_contrast(".muted { color: #777777; background-color: #ffffff; }");
        assert!(!fails.pass_aa);
        assert!(!fails.pass_aaa);

        // #595959 on white is about 7.0:1
        let aaa = evaluate_contrast("p { color: #595959; background: #fff }");
        assert!(aaa.pass_aa);
        assert!(aaa.pass_aaa);

        // #666 on white is about 5.7:1: AA only
        let aa_only = evaluate_contrast("p { color: #666; background-color: white }");
        assert!(aa_only.pass_aa);
        assert!(!aa_only.pass_aaa);

        let default = evaluate_contrast("p { margin: 0 }");
        assert!(default.pass_aa && default.pass_aaa);
        assert_eq!(default.min_ratio, None);
    }

    #[test]
    fn test_clean_page_scores_full_marks() {
        let html = r#"<html lang="en"><body>
            <header><nav><a href="/">Home</a></nav></header>
            <main><h1>Welcome</h1><img src="a.png" alt="A chart of sales">
            <label for="q">Search</label><input id="q" type="text">
            <button>Go</button></main></body></html>"#;
        let fragment = AccessibilityAnalyzer.evaluate(html).unwrap();
        let (metrics, contrast) = payload(&fragment);

        assert_eq!(fragment.score, Some(100.0));
        assert_eq!(metrics.missing_alt, 0);
        assert_eq!(metrics.aria_issues, 0);
        assert!(metrics.keyboard_nav);
        assert!(contrast.pass_aa);
        assert!(fragment.issues.is_empty());
    }

    #[test]
    fn test_violations_are_counted() {
        let html = r#"<html><body>
            <img src="a.png"><img src="b.png"><img src="c.png" alt="">
            <div onclick="go()">Click me</div>
            <span role="button" tabindex="0" aria-labelledby="nope">Menu</span>
            <a href="/x" aria-hidden="true">Hidden link</a>
            <button></button>
            <input type="email">
            <p style="color: #999; background-color: #fff">Faint</p>
        </body></html>"#;
        let fragment = AccessibilityAnalyzer.evaluate(html).unwrap();
        let (metrics, contrast) = payload(&fragment);

        assert_eq!(metrics.missing_alt, 2);
        assert_eq!(metrics.aria_issues, 3);
        assert!(!metrics.keyboard_nav);
        assert!(!contrast.pass_aa);

        let categories: Vec<&str> = fragment.issues.iter().map(|i| i.category.as_str()).collect();
        for expected in ["missing-alt", "aria", "keyboard", "contrast-aa", "lang", "form-labels"] {
            assert!(categories.contains(&expected), "missing {expected}");
        }

        // 10 + 12 + 15 + 20 + 5 + 4
        assert_eq!(fragment.score, Some(34.0));
    }
}
