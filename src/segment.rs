//! Structuring of raw model output into question records.
//!
//! A model response is free text with no guaranteed schema. The [`Segmenter`]
//! partitions it into candidate blocks using a [`BlockSplitter`] strategy,
//! discards blocks that carry no answer marker, and parses each retained block
//! into a [`QuestionRecord`].
//!
//! Quick start:
//! ```
//! use sba_generator::segment::{Segmenter, AnswerLetter};
//!
//! let raw = "A 54-year-old man...\nA) Aspirin\nB) Heparin\nCorrect Answer: B\nExplanation: Because.";
//! let records = Segmenter::default().segment(raw);
//! assert_eq!(records.len(), 1);
//! assert_eq!(records[0].correct_answer, Some(AnswerLetter::B));
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::SessionError;

pub const DEFAULT_ANSWER_MARKER: &str = "Correct Answer:";
pub const DEFAULT_EXPLANATION_MARKER: &str = "Explanation:";
pub const DEFAULT_QUOTE_MARKER: &str = "Quote:";
pub const DEFAULT_SENTINEL: &str = "[[QUESTION]]";

/// Characters a model commonly wraps the answer letter in, e.g. `**B**` or `(B)`.
const LETTER_DECORATION: &[char] = &['*', '_', '(', '['];

/// Leftovers between a parsed field and its content, e.g. `B) ...` or `Explanation: - ...`.
const LEADING_PUNCTUATION: &[char] = &[')', ']', '.', ':', '-', '*', '_'];

/// One of the five options of a single-best-answer question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AnswerLetter {
    A,
    B,
    C,
    D,
    E,
}

impl AnswerLetter {
    pub const ALL: [AnswerLetter; 5] = [Self::A, Self::B, Self::C, Self::D, Self::E];

    /// Strict conversion: only uppercase `A`-`E` are letters.
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'A' => Some(Self::A),
            'B' => Some(Self::B),
            'C' => Some(Self::C),
            'D' => Some(Self::D),
            'E' => Some(Self::E),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Self::A => 'A',
            Self::B => 'B',
            Self::C => 'C',
            Self::D => 'D',
            Self::E => 'E',
        }
    }
}

impl TryFrom<char> for AnswerLetter {
    type Error = SessionError;

    fn try_from(c: char) -> Result<Self, Self::Error> {
        Self::from_char(c).ok_or(SessionError::InvalidLetter(c))
    }
}

impl FromStr for AnswerLetter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.trim().chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Self::from_char(c)
                .ok_or_else(|| format!("Invalid answer letter: '{}'. Supported: A, B, C, D, E", s)),
            _ => Err(format!("Invalid answer letter: '{}'. Supported: A, B, C, D, E", s)),
        }
    }
}

impl fmt::Display for AnswerLetter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// A single question unit extracted from a model response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionRecord {
    /// 1-based position in the generated batch
    pub ordinal: usize,
    /// The whole block: stem, lead-in, options and the answer section
    pub raw_text: String,
    /// Stem, lead-in and options only; always a strict prefix of `raw_text`
    pub visible_text: String,
    /// Absent when the model output had no parseable letter after the answer marker
    pub correct_answer: Option<AnswerLetter>,
    pub explanation: Option<String>,
    /// Supporting quote from the guideline, when the model supplied one
    pub source_quote: Option<String>,
}

impl QuestionRecord {
    /// A malformed record is still answerable, but cannot be graded or explained.
    pub fn is_malformed(&self) -> bool {
        self.correct_answer.is_none()
    }
}

/// How a raw response is cut into candidate blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DelimiterStrategy {
    /// Sentinel when configured and present in the response, otherwise blank lines
    #[default]
    Auto,
    Sentinel,
    BlankLine,
    /// Last resort for responses with no usable paragraph breaks
    AnswerMarker,
}

impl FromStr for DelimiterStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "sentinel" => Ok(Self::Sentinel),
            "blank-line" | "blankline" => Ok(Self::BlankLine),
            "answer-marker" | "answermarker" => Ok(Self::AnswerMarker),
            _ => Err(format!(
                "Unknown delimiter strategy: '{}'. Supported: auto, sentinel, blank-line, answer-marker",
                s
            )),
        }
    }
}

impl fmt::Display for DelimiterStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Sentinel => write!(f, "sentinel"),
            Self::BlankLine => write!(f, "blank-line"),
            Self::AnswerMarker => write!(f, "answer-marker"),
        }
    }
}

/// Cuts normalized response text into candidate blocks, in order.
///
/// Blocks may be empty or contain only whitespace; the segmenter filters them.
pub trait BlockSplitter: fmt::Debug + Send + Sync {
    fn split<'a>(&self, text: &'a str) -> Vec<&'a str>;
}

/// Splits on an out-of-band token the prompt asked the model to emit between questions.
#[derive(Debug, Clone)]
pub struct SentinelSplitter {
    sentinel: String,
}

impl SentinelSplitter {
    pub fn new(sentinel: impl Into<String>) -> Self {
        Self { sentinel: sentinel.into() }
    }
}

impl BlockSplitter for SentinelSplitter {
    fn split<'a>(&self, text: &'a str) -> Vec<&'a str> {
        text.split(self.sentinel.as_str()).collect()
    }
}

/// Splits on lines that contain nothing but whitespace.
#[derive(Debug, Clone, Default)]
pub struct BlankLineSplitter;

impl BlockSplitter for BlankLineSplitter {
    fn split<'a>(&self, text: &'a str) -> Vec<&'a str> {
        let mut blocks = Vec::new();
        let mut start: Option<usize> = None;
        let mut offset = 0usize;

        for line in text.split_inclusive('\n') {
            let line_start = offset;
            offset += line.len();

            if line.trim().is_empty() {
                if let Some(s) = start.take() {
                    blocks.push(&text[s..line_start]);
                }
            } else if start.is_none() {
                start = Some(line_start);
            }
        }

        if let Some(s) = start {
            blocks.push(&text[s..]);
        }
        blocks
    }
}

/// Line-oriented split driven by the answer marker itself.
///
/// The line holding the answer marker opens the answer section of the current
/// block. A blank line closes it. Lines starting with one of the continuation
/// markers stay in the section, as do unmarked lines that run on from them,
/// unless another answer marker follows before the next blank line: such a
/// line starts the next question.
#[derive(Debug, Clone)]
pub struct AnswerMarkerSplitter {
    answer_marker: String,
    continuation_markers: Vec<String>,
}

impl AnswerMarkerSplitter {
    pub fn new(answer_marker: impl Into<String>, continuation_markers: Vec<String>) -> Self {
        Self {
            answer_marker: answer_marker.into(),
            continuation_markers,
        }
    }

    /// Number of lines in `text` that open an answer section.
    pub fn answer_lines(&self, text: &str) -> usize {
        text.lines().filter(|l| self.opens_answer(l.trim())).count()
    }

    fn continues_answer(&self, trimmed_line: &str) -> bool {
        let undecorated = trimmed_line.trim_start_matches(LETTER_DECORATION);
        self.continuation_markers
            .iter()
            .any(|m| undecorated.starts_with(m.as_str()))
    }

    fn opens_answer(&self, trimmed_line: &str) -> bool {
        trimmed_line.contains(self.answer_marker.as_str()) && !self.continues_answer(trimmed_line)
    }

    fn starts_question(&self, lines: &[&str], index: usize) -> bool {
        lines[index..]
            .iter()
            .map(|l| l.trim())
            .take_while(|l| !l.is_empty())
            .any(|l| self.opens_answer(l))
    }
}

impl BlockSplitter for AnswerMarkerSplitter {
    fn split<'a>(&self, text: &'a str) -> Vec<&'a str> {
        let lines: Vec<&str> = text.split_inclusive('\n').collect();
        let mut blocks = Vec::new();
        let mut start: Option<usize> = None;
        let mut in_answer = false;
        let mut offset = 0usize;

        for (index, line) in lines.iter().enumerate() {
            let line_start = offset;
            offset += line.len();
            let trimmed = line.trim();

            if in_answer {
                if !trimmed.is_empty()
                    && (self.continues_answer(trimmed) || !self.starts_question(&lines, index))
                {
                    continue;
                }
                if let Some(s) = start.take() {
                    blocks.push(&text[s..line_start]);
                }
                in_answer = false;
            }

            if trimmed.is_empty() {
                continue;
            }
            if start.is_none() {
                start = Some(line_start);
            }
            if line.contains(self.answer_marker.as_str()) {
                in_answer = true;
            }
        }

        if let Some(s) = start {
            blocks.push(&text[s..]);
        }
        blocks
    }
}

/// Result of one segmentation pass, with bookkeeping for logs and the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segmentation {
    pub records: Vec<QuestionRecord>,
    /// The strategy actually applied (never `Auto`)
    pub strategy: DelimiterStrategy,
    /// Non-empty blocks dropped for lacking an answer marker
    pub discarded: usize,
}

impl Segmentation {
    pub fn malformed_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_malformed()).count()
    }
}

/// Builder for a [`Segmenter`]. Empty markers are ignored in favour of the defaults.
#[derive(Debug, Clone)]
pub struct SegmenterBuilder {
    answer_marker: String,
    explanation_marker: String,
    quote_marker: String,
    sentinel: Option<String>,
    strategy: DelimiterStrategy,
}

impl Default for SegmenterBuilder {
    fn default() -> Self {
        Self {
            answer_marker: DEFAULT_ANSWER_MARKER.to_string(),
            explanation_marker: DEFAULT_EXPLANATION_MARKER.to_string(),
            quote_marker: DEFAULT_QUOTE_MARKER.to_string(),
            sentinel: Some(DEFAULT_SENTINEL.to_string()),
            strategy: DelimiterStrategy::Auto,
        }
    }
}

impl SegmenterBuilder {
    pub fn answer_marker(mut self, marker: impl Into<String>) -> Self {
        self.answer_marker = marker.into();
        self
    }

    pub fn explanation_marker(mut self, marker: impl Into<String>) -> Self {
        self.explanation_marker = marker.into();
        self
    }

    pub fn quote_marker(mut self, marker: impl Into<String>) -> Self {
        self.quote_marker = marker.into();
        self
    }

    pub fn sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.sentinel = Some(sentinel.into());
        self
    }

    pub fn without_sentinel(mut self) -> Self {
        self.sentinel = None;
        self
    }

    pub fn strategy(mut self, strategy: DelimiterStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn build(self) -> Segmenter {
        Segmenter {
            answer_marker: non_empty_or(self.answer_marker, DEFAULT_ANSWER_MARKER),
            explanation_marker: non_empty_or(self.explanation_marker, DEFAULT_EXPLANATION_MARKER),
            quote_marker: non_empty_or(self.quote_marker, DEFAULT_QUOTE_MARKER),
            sentinel: self.sentinel.filter(|s| !s.trim().is_empty()),
            strategy: self.strategy,
        }
    }
}

fn non_empty_or(value: String, fallback: &str) -> String {
    if value.trim().is_empty() {
        warn!(target: "sba_generator::segment", fallback, "Ignoring empty marker");
        fallback.to_string()
    } else {
        value
    }
}

/// Converts one raw model response into an ordered sequence of question records.
///
/// Never fails: the worst case is an empty sequence.
#[derive(Debug, Clone)]
pub struct Segmenter {
    answer_marker: String,
    explanation_marker: String,
    quote_marker: String,
    sentinel: Option<String>,
    strategy: DelimiterStrategy,
}

impl Default for Segmenter {
    fn default() -> Self {
        SegmenterBuilder::default().build()
    }
}

impl Segmenter {
    pub fn builder() -> SegmenterBuilder {
        SegmenterBuilder::default()
    }

    pub fn answer_marker(&self) -> &str {
        &self.answer_marker
    }

    pub fn explanation_marker(&self) -> &str {
        &self.explanation_marker
    }

    pub fn quote_marker(&self) -> &str {
        &self.quote_marker
    }

    pub fn sentinel(&self) -> Option<&str> {
        self.sentinel.as_deref()
    }

    pub fn strategy(&self) -> DelimiterStrategy {
        self.strategy
    }

    pub fn segment(&self, raw_response: &str) -> Vec<QuestionRecord> {
        self.segment_report(raw_response).records
    }

    #[instrument(target = "sba_generator::segment", skip(self, raw_response), fields(raw_len = raw_response.len()))]
    pub fn segment_report(&self, raw_response: &str) -> Segmentation {
        let normalized = raw_response.replace("\r\n", "\n");

        if normalized.trim().is_empty() {
            debug!("Empty response, nothing to segment");
            let strategy = self.resolve_strategy(&normalized);
            return Segmentation { records: Vec::new(), strategy, discarded: 0 };
        }

        let (strategy, blocks) = self.split_blocks(&normalized);
        debug!(%strategy, block_count = blocks.len(), "Split response into candidate blocks");

        let mut records = Vec::new();
        let mut discarded = 0usize;
        for block in blocks {
            let block = block.trim();
            if block.is_empty() {
                continue;
            }
            match self.parse_block(block, records.len() + 1) {
                Some(record) => {
                    if record.is_malformed() {
                        warn!(ordinal = record.ordinal, "Malformed record: no parseable answer letter, reveal suppressed");
                    }
                    records.push(record);
                }
                None => {
                    discarded += 1;
                    debug!(block_len = block.len(), "Discarding block without answer marker");
                }
            }
        }

        info!(%strategy, records = records.len(), discarded, "Segmented model response");
        Segmentation { records, strategy, discarded }
    }

    /// Under `Auto`, any block that still holds more than one answer section is
    /// split again on the answer marker, and the result reports `AnswerMarker`.
    fn split_blocks<'a>(&self, text: &'a str) -> (DelimiterStrategy, Vec<&'a str>) {
        let strategy = self.resolve_strategy(text);
        let blocks = self.splitter(strategy).split(text);
        if self.strategy != DelimiterStrategy::Auto {
            return (strategy, blocks);
        }

        let marker_splitter = self.answer_marker_splitter();
        if !blocks.iter().any(|b| marker_splitter.answer_lines(b) > 1) {
            return (strategy, blocks);
        }
        debug!(%strategy, "Block holds several answer sections, falling back to the answer marker");
        let refined = blocks
            .into_iter()
            .flat_map(|b| {
                if marker_splitter.answer_lines(b) > 1 {
                    marker_splitter.split(b)
                } else {
                    vec![b]
                }
            })
            .collect();
        (DelimiterStrategy::AnswerMarker, refined)
    }

    fn resolve_strategy(&self, text: &str) -> DelimiterStrategy {
        match (self.strategy, self.sentinel.as_deref()) {
            (DelimiterStrategy::Auto, Some(s)) if text.contains(s) => DelimiterStrategy::Sentinel,
            (DelimiterStrategy::Auto, _) => DelimiterStrategy::BlankLine,
            (DelimiterStrategy::Sentinel, None) => {
                warn!("Sentinel strategy requested without a sentinel, using blank lines");
                DelimiterStrategy::BlankLine
            }
            (strategy, _) => strategy,
        }
    }

    fn splitter(&self, strategy: DelimiterStrategy) -> Box<dyn BlockSplitter> {
        match (strategy, self.sentinel.as_deref()) {
            (DelimiterStrategy::Sentinel, Some(s)) => Box::new(SentinelSplitter::new(s)),
            (DelimiterStrategy::AnswerMarker, _) => Box::new(self.answer_marker_splitter()),
            _ => Box::new(BlankLineSplitter),
        }
    }

    fn answer_marker_splitter(&self) -> AnswerMarkerSplitter {
        AnswerMarkerSplitter::new(
            self.answer_marker.clone(),
            vec![self.explanation_marker.clone(), self.quote_marker.clone()],
        )
    }

    /// `None` means the block has no answer marker and is not a question.
    fn parse_block(&self, block: &str, ordinal: usize) -> Option<QuestionRecord> {
        let marker_pos = block.find(self.answer_marker.as_str())?;
        let visible_text = block[..marker_pos]
            .trim_end_matches(|c: char| c.is_whitespace() || LETTER_DECORATION.contains(&c))
            .to_string();
        let tail = &block[marker_pos + self.answer_marker.len()..];

        let (correct_answer, explanation, source_quote) = match parse_answer_token(tail) {
            Some((letter, rest)) => {
                let (explanation, quote) = self.parse_reveal(rest);
                (Some(letter), explanation, quote)
            }
            None => (None, None, None),
        };

        Some(QuestionRecord {
            ordinal,
            raw_text: block.to_string(),
            visible_text,
            correct_answer,
            explanation,
            source_quote,
        })
    }

    fn parse_reveal(&self, rest: &str) -> (Option<String>, Option<String>) {
        let expl_pos = rest.find(self.explanation_marker.as_str());
        let quote_pos = rest.find(self.quote_marker.as_str());
        let expl_len = self.explanation_marker.len();
        let quote_len = self.quote_marker.len();

        let explanation = match (expl_pos, quote_pos) {
            (Some(e), Some(q)) if q >= e + expl_len => &rest[e + expl_len..q],
            (Some(e), _) => &rest[e + expl_len..],
            (None, Some(q)) => &rest[..q],
            (None, None) => rest,
        };
        let quote = match (quote_pos, expl_pos) {
            (Some(q), Some(e)) if e >= q + quote_len => Some(&rest[q + quote_len..e]),
            (Some(q), _) => Some(&rest[q + quote_len..]),
            (None, _) => None,
        };

        (clean_field(explanation), quote.and_then(clean_field))
    }
}

/// First token after the answer marker, if it is a lone letter A-E.
fn parse_answer_token(tail: &str) -> Option<(AnswerLetter, &str)> {
    let start = tail.trim_start_matches(|c: char| c.is_whitespace() || LETTER_DECORATION.contains(&c));
    let mut chars = start.chars();
    let letter = AnswerLetter::from_char(chars.next()?)?;
    let rest = chars.as_str();
    if rest.chars().next().is_some_and(char::is_alphanumeric) {
        return None;
    }
    Some((letter, rest))
}

fn clean_field(span: &str) -> Option<String> {
    let cleaned = span
        .trim_start_matches(|c: char| c.is_whitespace() || LEADING_PUNCTUATION.contains(&c))
        .trim_end();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answer_token_accepts_decorated_letters() {
        assert_eq!(parse_answer_token(" B").map(|(l, _)| l), Some(AnswerLetter::B));
        assert_eq!(parse_answer_token(" **C**").map(|(l, _)| l), Some(AnswerLetter::C));
        assert_eq!(parse_answer_token("(E) Adrenaline"), Some((AnswerLetter::E, ") Adrenaline")));
        assert_eq!(parse_answer_token("\nA").map(|(l, _)| l), Some(AnswerLetter::A));
    }

    #[test]
    fn answer_token_rejects_words_and_other_letters() {
        assert!(parse_answer_token(" Amiodarone").is_none());
        assert!(parse_answer_token(" F").is_none());
        assert!(parse_answer_token(" b").is_none());
        assert!(parse_answer_token("   ").is_none());
        assert!(parse_answer_token("").is_none());
    }

    #[test]
    fn blank_line_splitter_treats_whitespace_lines_as_breaks() {
        let text = "one\ntwo\n  \nthree\n\n\nfour";
        let blocks = BlankLineSplitter.split(text);
        assert_eq!(blocks, vec!["one\ntwo\n", "three\n", "four"]);
    }

    #[test]
    fn answer_marker_splitter_keeps_explanation_lines() {
        let splitter = AnswerMarkerSplitter::new("Correct Answer:", vec!["Explanation:".into(), "Quote:".into()]);
        let text = "Q1\nA) x\nCorrect Answer: A\nExplanation: e1\nQuote: q1\nQ2\nCorrect Answer: B\n";
        let blocks = splitter.split(text);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0], "Q1\nA) x\nCorrect Answer: A\nExplanation: e1\nQuote: q1\n");
        assert_eq!(blocks[1], "Q2\nCorrect Answer: B\n");
    }

    #[test]
    fn answer_marker_splitter_keeps_run_on_explanation_until_blank_line() {
        let splitter = AnswerMarkerSplitter::new("Correct Answer:", vec!["Explanation:".into(), "Quote:".into()]);
        let text = "Q1\nCorrect Answer: B\nExplanation: e1\nmore detail\n\nQ2\n\nA) x\nCorrect Answer: A";
        let blocks = splitter.split(text);
        assert_eq!(blocks, vec!["Q1\nCorrect Answer: B\nExplanation: e1\nmore detail\n", "Q2\n\nA) x\nCorrect Answer: A"]);
    }

    #[test]
    fn answer_lines_ignore_continuation_and_same_line_echoes() {
        let splitter = AnswerMarkerSplitter::new("Correct Answer:", vec!["Explanation:".into(), "Quote:".into()]);
        assert_eq!(splitter.answer_lines("S\nCorrect Answer: B then Correct Answer: C"), 1);
        assert_eq!(splitter.answer_lines("S\nCorrect Answer: B\nExplanation: Correct Answer: B"), 1);
        assert_eq!(splitter.answer_lines("S\nCorrect Answer: B\nT\n  Correct Answer: A"), 2);
    }

    #[test]
    fn clean_field_strips_leading_punctuation() {
        assert_eq!(clean_field(") - because  "), Some("because".to_string()));
        assert_eq!(clean_field(" .\n "), None);
    }
}
