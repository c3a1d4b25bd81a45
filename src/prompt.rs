//! Outbound prompt for question generation.
//!
//! The template asks the model for the layout the segmenter understands:
//! one sentinel line per question, a `Correct Answer:` line, an
//! `Explanation:` line and a `Quote:` line.

use crate::segment::Segmenter;

pub const DEFAULT_MAX_GUIDELINE_CHARS: usize = 2000;

/// Truncate to at most `max_chars` characters without splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[derive(Debug, Clone)]
pub struct PromptTemplate {
    answer_marker: String,
    explanation_marker: String,
    quote_marker: String,
    sentinel: Option<String>,
    max_guideline_chars: usize,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::for_segmenter(&Segmenter::default())
    }
}

impl PromptTemplate {
    /// Use the same markers the segmenter will look for.
    pub fn for_segmenter(segmenter: &Segmenter) -> Self {
        Self {
            answer_marker: segmenter.answer_marker().to_string(),
            explanation_marker: segmenter.explanation_marker().to_string(),
            quote_marker: segmenter.quote_marker().to_string(),
            sentinel: segmenter.sentinel().map(str::to_string),
            max_guideline_chars: DEFAULT_MAX_GUIDELINE_CHARS,
        }
    }

    pub fn with_max_guideline_chars(mut self, max_chars: usize) -> Self {
        self.max_guideline_chars = max_chars;
        self
    }

    pub fn max_guideline_chars(&self) -> usize {
        self.max_guideline_chars
    }

    pub fn render(&self, topic: &str, guideline_text: &str, question_count: usize) -> String {
        let excerpt = truncate_chars(guideline_text, self.max_guideline_chars);
        let separator = match &self.sentinel {
            Some(s) => format!("- Start every question with a line containing only {}\n", s),
            None => "- Separate questions with a blank line\n".to_string(),
        };

        format!(
            "You are a consultant-level Emergency Medicine educator creating advanced SBA questions for the FRCEM Final SBA Exam (UK).

Topic: {topic}

Instructions:
- Use ONLY the information in the guideline provided below.
- Avoid recall-style or basic questions.
- Focus on complex clinical decision-making, synthesis, and prioritization.
- Choose less obvious, nuanced, or controversial areas from the guideline.
- Target difficulty: consultant-level UK EM (FRCEM Final), facility index ~0.5.
- Ensure options are plausible, mutually exclusive, and consistent in tone.
- Each question must contain, in this order:
    - Clinical stem
    - Lead-in question
    - 5 options, one per line, labelled A) to E)
    - A line starting with \"{answer} \" followed by the single letter of the correct option
    - A line starting with \"{explanation} \" followed by a 2-3 sentence explanation
    - A line starting with \"{quote} \" followed by a direct quote from the guideline justifying the answer
{separator}
Guideline excerpt:
{excerpt}

Output {count} questions in the format specified above.
",
            topic = topic.trim(),
            answer = self.answer_marker,
            explanation = self.explanation_marker,
            quote = self.quote_marker,
            separator = separator,
            excerpt = excerpt,
            count = question_count,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }

    #[test]
    fn render_includes_markers_and_truncated_excerpt() {
        let template = PromptTemplate::default().with_max_guideline_chars(5);
        let prompt = template.render("  Sepsis ", "0123456789", 3);
        assert!(prompt.contains("Topic: Sepsis\n"));
        assert!(prompt.contains("Correct Answer:"));
        assert!(prompt.contains("[[QUESTION]]"));
        assert!(prompt.contains("\n01234\n"));
        assert!(!prompt.contains("012345"));
        assert!(prompt.contains("Output 3 questions"));
    }

    #[test]
    fn render_without_sentinel_asks_for_blank_lines() {
        let segmenter = Segmenter::builder().without_sentinel().build();
        let prompt = PromptTemplate::for_segmenter(&segmenter).render("AF", "text", 1);
        assert!(prompt.contains("Separate questions with a blank line"));
        assert!(!prompt.contains("[[QUESTION]]"));
    }
}
