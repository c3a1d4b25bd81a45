use std::env;
use std::time::Duration;

use tracing::warn;

use crate::error::AIError;
use crate::prompt::DEFAULT_MAX_GUIDELINE_CHARS;

/// Trait for types that can retrieve their configuration key from environment variables
pub trait KeyFromEnv {
    /// The environment variable name for this client's API key
    const KEY_NAME: &'static str;

    /// Find the API key by checking environment variables first, then .env file
    fn find_key() -> Option<String> {
        // Silently ignore a missing .env file
        let _ = dotenvy::dotenv();

        env::var(Self::KEY_NAME).ok().filter(|k| !k.trim().is_empty())
    }

    /// Like `find_key`, but a missing key is an error naming the variable
    fn require_key() -> Result<String, AIError> {
        Self::find_key().ok_or(AIError::MissingApiKey(Self::KEY_NAME))
    }
}

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_MAX_QUESTIONS: usize = 5;

/// Settings for `QuestionGenerator`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorConfig {
    /// Upper bound on the single model call
    pub request_timeout: Duration,
    /// Guideline text beyond this many characters is cut before prompting
    pub max_guideline_chars: usize,
    /// Largest question count a request may ask for
    pub max_questions: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_guideline_chars: DEFAULT_MAX_GUIDELINE_CHARS,
            max_questions: DEFAULT_MAX_QUESTIONS,
        }
    }
}

impl GeneratorConfig {
    /// Defaults overridden by `SBA_TIMEOUT_SECS`, `SBA_MAX_GUIDELINE_CHARS`
    /// and `SBA_MAX_QUESTIONS` (from the environment or `.env`).
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let mut config = Self::default();

        if let Some(secs) = parse_var::<u64>("SBA_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(chars) = parse_var::<usize>("SBA_MAX_GUIDELINE_CHARS") {
            config.max_guideline_chars = chars;
        }
        if let Some(max) = parse_var::<usize>("SBA_MAX_QUESTIONS") {
            config.max_questions = max.max(1);
        }
        config
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(var = name, value = %raw, "Ignoring unparseable environment override");
            None
        }
    }
}
