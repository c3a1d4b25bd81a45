//! Answer tracking for one batch of generated questions.
//!
//! `SessionState` owns the records of a single generation, the user's
//! selections and the submitted flag. Correct answers and explanations only
//! leave the session after `submit` succeeds.
//!
//! Lifecycle: `Empty -> Answering -> Submitted`. `load_batch` from any phase
//! starts a fresh `Answering` phase and drops the previous batch entirely.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::SessionError;
use crate::segment::{AnswerLetter, QuestionRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionPhase {
    Empty,
    Answering,
    Submitted,
}

/// Whether `submit` requires a selection for every question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SubmitPolicy {
    #[default]
    RequireAll,
    AllowPartial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Outcome {
    Correct,
    Incorrect,
    Unanswered,
    /// The record has no parsed correct answer
    Ungraded,
}

/// A question after submission, with everything the user may now see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevealedQuestion {
    pub ordinal: usize,
    pub visible_text: String,
    pub selection: Option<AnswerLetter>,
    pub correct_answer: Option<AnswerLetter>,
    pub explanation: Option<String>,
    pub source_quote: Option<String>,
    pub outcome: Outcome,
}

/// What a renderer may show for one question at any point in the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestionView {
    pub ordinal: usize,
    pub visible_text: String,
    pub selection: Option<AnswerLetter>,
    /// Only present once the session is submitted
    pub reveal: Option<RevealedQuestion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Scorecard {
    pub total: usize,
    pub correct: usize,
    pub incorrect: usize,
    pub unanswered: usize,
    pub ungraded: usize,
}

impl Scorecard {
    pub fn from_revealed(revealed: &[RevealedQuestion]) -> Self {
        revealed.iter().fold(Self::default(), |mut card, q| {
            card.total += 1;
            match q.outcome {
                Outcome::Correct => card.correct += 1,
                Outcome::Incorrect => card.incorrect += 1,
                Outcome::Unanswered => card.unanswered += 1,
                Outcome::Ungraded => card.ungraded += 1,
            }
            card
        })
    }

    /// Questions that could be graded, i.e. everything but `Ungraded`.
    pub fn graded(&self) -> usize {
        self.total - self.ungraded
    }

    /// Percentage correct among graded questions.
    pub fn percent(&self) -> Option<f64> {
        match self.graded() {
            0 => None,
            graded => Some(self.correct as f64 * 100.0 / graded as f64),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionState {
    records: Vec<QuestionRecord>,
    selections: BTreeMap<usize, AnswerLetter>,
    submitted: bool,
    policy: SubmitPolicy,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: SubmitPolicy) -> Self {
        Self { policy, ..Self::default() }
    }

    pub fn policy(&self) -> SubmitPolicy {
        self.policy
    }

    pub fn phase(&self) -> SessionPhase {
        if self.records.is_empty() {
            SessionPhase::Empty
        } else if self.submitted {
            SessionPhase::Submitted
        } else {
            SessionPhase::Answering
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted
    }

    pub fn ordinals(&self) -> impl Iterator<Item = usize> + '_ {
        self.records.iter().map(|r| r.ordinal)
    }

    pub fn selection(&self, ordinal: usize) -> Option<AnswerLetter> {
        self.selections.get(&ordinal).copied()
    }

    /// Ordinals that still lack a selection, in batch order.
    pub fn unanswered(&self) -> Vec<usize> {
        self.ordinals()
            .filter(|o| !self.selections.contains_key(o))
            .collect()
    }

    /// Replace the whole batch. Selections are cleared and the lock released;
    /// the submit policy is kept.
    #[instrument(target = "sba_generator::session", skip(self, records), fields(count = records.len()))]
    pub fn load_batch(&mut self, records: Vec<QuestionRecord>) {
        let previous = self.phase();
        *self = Self {
            records,
            selections: BTreeMap::new(),
            submitted: false,
            policy: self.policy,
        };
        info!(?previous, count = self.records.len(), "Loaded question batch");
    }

    pub fn select_answer(&mut self, ordinal: usize, letter: char) -> Result<(), SessionError> {
        if !self.records.iter().any(|r| r.ordinal == ordinal) {
            warn!(ordinal, "Selection for unknown ordinal");
            return Err(SessionError::InvalidOrdinal(ordinal));
        }
        let letter = AnswerLetter::try_from(letter)?;
        if self.submitted {
            return Err(SessionError::SessionLocked);
        }

        debug!(ordinal, %letter, "Answer selected");
        self.selections.insert(ordinal, letter);
        Ok(())
    }

    /// Lock the batch and reveal every question.
    #[instrument(target = "sba_generator::session", skip(self))]
    pub fn submit(&mut self) -> Result<Vec<RevealedQuestion>, SessionError> {
        if self.submitted {
            return Err(SessionError::SessionLocked);
        }
        if self.records.is_empty() {
            return Err(SessionError::NoActiveBatch);
        }

        let missing = self.unanswered();
        if !missing.is_empty() && self.policy == SubmitPolicy::RequireAll {
            debug!(?missing, "Submit rejected, selections incomplete");
            return Err(SessionError::IncompleteSelections { missing });
        }

        self.submitted = true;
        let revealed: Vec<RevealedQuestion> = self.records.iter().map(|r| self.reveal(r)).collect();
        let card = Scorecard::from_revealed(&revealed);
        info!(total = card.total, correct = card.correct, ungraded = card.ungraded, "Session submitted");
        Ok(revealed)
    }

    /// Renderable state. Reveal fields are only filled in after submission.
    pub fn current_view(&self) -> Vec<QuestionView> {
        self.records
            .iter()
            .map(|r| QuestionView {
                ordinal: r.ordinal,
                visible_text: r.visible_text.clone(),
                selection: self.selection(r.ordinal),
                reveal: self.submitted.then(|| self.reveal(r)),
            })
            .collect()
    }

    pub fn revealed(&self) -> Option<Vec<RevealedQuestion>> {
        self.submitted
            .then(|| self.records.iter().map(|r| self.reveal(r)).collect())
    }

    pub fn scorecard(&self) -> Option<Scorecard> {
        self.revealed().map(|r| Scorecard::from_revealed(&r))
    }

    fn reveal(&self, record: &QuestionRecord) -> RevealedQuestion {
        let selection = self.selection(record.ordinal);
        let outcome = match (selection, record.correct_answer) {
            (_, None) => Outcome::Ungraded,
            (None, Some(_)) => Outcome::Unanswered,
            (Some(s), Some(c)) if s == c => Outcome::Correct,
            (Some(_), Some(_)) => Outcome::Incorrect,
        };

        RevealedQuestion {
            ordinal: record.ordinal,
            visible_text: record.visible_text.clone(),
            selection,
            correct_answer: record.correct_answer,
            explanation: record.explanation.clone(),
            source_quote: record.source_quote.clone(),
            outcome,
        }
    }
}
