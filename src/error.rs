use std::time::Duration;

use thiserror::Error;

/// Caller-contract violations on a `SessionState`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("No question with ordinal {0} in the current batch")]
    InvalidOrdinal(usize),
    #[error("Invalid answer letter '{0}', expected one of A-E")]
    InvalidLetter(char),
    #[error("Session already submitted")]
    SessionLocked,
    #[error("Questions without a selection: {missing:?}")]
    IncompleteSelections { missing: Vec<usize> },
    #[error("No question batch loaded")]
    NoActiveBatch,
}

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("AI error: {0}")]
    Ai(#[from] AIError),
    #[error("Model response contained no parseable questions")]
    EmptyResponse,
    #[error("Invalid generation request: {0}")]
    InvalidRequest(String),
}

#[derive(Error, Debug)]
pub enum AIError {
    #[error("OpenAI API error: {0}")]
    OpenAI(#[from] OpenAIError),
    #[error("Model call timed out after {0:?}")]
    Timeout(Duration),
    #[error("Missing API key: set {0}")]
    MissingApiKey(&'static str),
    #[error("Mock error: {0}")]
    Mock(String),
}

#[derive(Error, Debug)]
pub enum OpenAIError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("API error: {0}")]
    Api(String),
    #[error("Rate limit exceeded")]
    RateLimit,
    #[error("Authentication failed")]
    Authentication,
}

#[derive(Error, Debug)]
pub enum GuidelineError {
    #[error("Failed to read guideline file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to extract text from PDF: {0}")]
    Pdf(String),
    #[error("PDF support is disabled; rebuild with the `pdf` feature")]
    PdfUnsupported,
    #[error("Guideline contains no extractable text")]
    Empty,
}
