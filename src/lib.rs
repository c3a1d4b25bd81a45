pub mod clients;
pub mod config;
pub mod core;
pub mod error;
pub mod guideline;
pub mod interceptors;
pub mod prompt;
pub mod segment;
pub mod session;

// Convenient re-exports
pub use crate::core::{GenerationRequest, LowLevelClient, QuestionGenerator};
pub use segment::{AnswerLetter, DelimiterStrategy, QuestionRecord, Segmenter};
pub use session::{Outcome, QuestionView, RevealedQuestion, SessionState, SubmitPolicy};
