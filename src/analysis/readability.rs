//! Readability analyzer: Flesch Reading Ease over the page's visible text.

use crate::analysis::{dom, PageAnalyzer};
use crate::error::AnalyzerError;
use crate::models::{AnalyzerKind, FetchedPage, Fragment, Issue, Payload, ReadabilityMetrics, Severity};
use async_trait::async_trait;

/// Grade labels keyed by the minimum reading-ease score that earns them.
const GRADE_THRESHOLDS: &[(f64, &str)] = &[
    (90.0, "5th grade"),
    (80.0, "6th grade"),
    (70.0, "7th grade"),
    (60.0, "8th-9th grade"),
    (50.0, "10th-12th grade"),
    (30.0, "college"),
];

const LOWEST_GRADE: &str = "college graduate";

/// Average sentence length above which text is flagged.
const LONG_SENTENCE_WORDS: f64 = 25.0;

/// Pages with fewer words are flagged as thin.
const THIN_CONTENT_WORDS: usize = 50;

/// Counts feeding the reading-ease formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextStats {
    pub words: usize,
    pub sentences: usize,
    pub syllables: usize,
}

impl TextStats {
    /// Count words, sentences and syllables over text blocks. A block that does
    /// not end in terminal punctuation (a heading, a list item) counts as a sentence.
    pub fn from_blocks<S: AsRef<str>>(blocks: &[S]) -> Self {
        let mut stats = TextStats {
            words: 0,
            sentences: 0,
            syllables: 0,
        };

        for block in blocks {
            let block = block.as_ref().trim();
            let words = dom::words(block);
            if words.is_empty() {
                continue;
            }

            stats.words += words.len();
            stats.syllables += words.iter().map(|w| count_syllables(w)).sum::<usize>();

            let terminators = count_sentence_ends(block);
            let open_tail = !block.ends_with(['.', '!', '?']);
            stats.sentences += terminators + usize::from(open_tail);
        }

        stats
    }

    pub fn reading_ease(&self) -> Option<f64> {
        if self.words == 0 || self.sentences == 0 {
            return None;
        }
        Some(flesch_reading_ease(self.words, self.sentences, self.syllables))
    }
}

/// Flesch Reading Ease: `206.835 - 1.015 * (words / sentences) - 84.6 * (syllables / words)`.
pub fn flesch_reading_ease(words: usize, sentences: usize, syllables: usize) -> f64 {
    let words = words as f64;
    206.835 - 1.015 * (words / sentences as f64) - 84.6 * (syllables as f64 / words)
}

/// Map a reading-ease score onto a grade-level label.
pub fn grade_level(score: f64) -> &'static str {
    GRADE_THRESHOLDS
        .iter()
        .find(|(min, _)| score >= *min)
        .map(|(_, label)| *label)
        .unwrap_or(LOWEST_GRADE)
}

/// Runs of `.`, `!` or `?` followed by whitespace or the end of the block.
fn count_sentence_ends(text: &str) -> usize {
    let chars: Vec<char> = text.chars().collect();
    let mut count = 0;
    let mut i = 0;
    while i < chars.len() {
        if matches!(chars[i], '.' | '!' | '?') {
            while i + 1 < chars.len() && matches!(chars[i + 1], '.' | '!' | '?') {
                i += 1;
            }
            if i + 1 == chars.len() || chars[i + 1].is_whitespace() {
                count += 1;
            }
        }
        i += 1;
    }
    count
}

/// Heuristic English syllable count: vowel groups, minus a silent trailing `e`.
pub fn count_syllables(word: &str) -> usize {
    let word: String = word
        .chars()
        .filter(|c| c.is_alphabetic())
        .flat_map(char::to_lowercase)
        .collect();

    if word.is_empty() {
        return 0;
    }
    if word.len() <= 3 {
        return 1;
    }

    let is_vowel = |c: char| matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y');
    let mut groups = 0;
    let mut previous_vowel = false;
    for c in word.chars() {
        let vowel = is_vowel(c);
        if vowel && !previous_vowel {
            groups += 1;
        }
        previous_vowel = vowel;
    }

    let silent_e = (word.ends_with('e') && !word.ends_with("le"))
        || word.ends_with("es")
        || word.ends_with("ed");
    if silent_e && groups > 1 {
        groups -= 1;
    }

    groups.max(1)
}

/// Computes Flesch Reading Ease and grade level for the page text.
pub struct ReadabilityAnalyzer;

impl ReadabilityAnalyzer {
    fn evaluate(&self, html: &str) -> Result<Fragment, AnalyzerError> {
        let document = dom::parse(html)?;
        let blocks = dom::text_blocks(&document);
        let stats = TextStats::from_blocks(&blocks);
        let flesch = stats.reading_ease().ok_or(AnalyzerError::NoText)?;
        let grade = grade_level(flesch);

        let mut issues = Vec::new();
        if flesch < 30.0 {
            issues.push(Issue::new(
                Severity::High,
                "difficult-text",
                format!("Text is very difficult to read (Flesch {:.1}, {})", flesch, grade),
            ));
        } else if flesch < 60.0 {
            issues.push(Issue::new(
                Severity::Medium,
                "difficult-text",
                format!("Text is fairly difficult to read (Flesch {:.1}, {})", flesch, grade),
            ));
        }

        let words_per_sentence = stats.words as f64 / stats.sentences as f64;
        if words_per_sentence > LONG_SENTENCE_WORDS {
            issues.push(Issue::new(
                Severity::Medium,
                "long-sentences",
                format!("Sentences average {:.0} words", words_per_sentence),
            ));
        }

        if stats.words < THIN_CONTENT_WORDS {
            issues.push(Issue::new(
                Severity::Low,
                "thin-content",
                format!("Only {} words of visible text", stats.words),
            ));
        }

        let metrics = ReadabilityMetrics {
            flesch_score: (flesch * 10.0).round() / 10.0,
            grade_level: grade.to_string(),
            issues: issues.iter().map(|i| i.message.clone()).collect(),
        };

        Ok(Fragment::scored(
            AnalyzerKind::Readability,
            flesch.round(),
            issues,
            Payload::Readability(metrics),
        ))
    }
}

#[async_trait]
impl PageAnalyzer for ReadabilityAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Readability
    }

    async fn analyze(&self, page: &FetchedPage) -> Result<Fragment, AnalyzerError> {
        self.evaluate(&page.html)
    }
}
