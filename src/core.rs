//! Generation pipeline: wraps a low-level model client with prompt rendering,
//! a bounded model call and response segmentation.
//!
//! Quick start:
//! - `QuestionGenerator::generate()` returns the records of one batch
//! - `QuestionGenerator::generate_into()` loads them into a `SessionState`,
//!   touching the session only when generation fully succeeded

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::config::GeneratorConfig;
use crate::error::{AIError, GenerateError};
use crate::interceptors::Interceptor;
use crate::prompt::PromptTemplate;
use crate::segment::{QuestionRecord, Segmenter};
use crate::session::SessionState;

/// Low-level model client abstraction.
///
/// Implementors provide `ask_raw`, which executes a prompt and returns the
/// complete raw model text. Structuring is done by the `Segmenter`.
#[async_trait]
pub trait LowLevelClient: Send + Sync + Debug {
    /// The only method that implementations must provide
    async fn ask_raw(&self, prompt: String) -> Result<String, AIError>;

    /// Clone this client into a boxed trait object
    fn clone_box(&self) -> Box<dyn LowLevelClient>;
}

impl Clone for Box<dyn LowLevelClient> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

#[async_trait]
impl LowLevelClient for Box<dyn LowLevelClient> {
    async fn ask_raw(&self, prompt: String) -> Result<String, AIError> {
        self.as_ref().ask_raw(prompt).await
    }

    fn clone_box(&self) -> Box<dyn LowLevelClient> {
        self.as_ref().clone_box()
    }
}

/// What the operator asked for: a topic, the extracted guideline text and a question count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub topic: String,
    pub guideline_text: String,
    pub question_count: usize,
}

impl GenerationRequest {
    pub fn new(topic: impl Into<String>, guideline_text: impl Into<String>, question_count: usize) -> Self {
        Self {
            topic: topic.into(),
            guideline_text: guideline_text.into(),
            question_count,
        }
    }

    fn validate(&self, max_questions: usize) -> Result<(), GenerateError> {
        if self.topic.trim().is_empty() {
            return Err(GenerateError::InvalidRequest("topic is empty".to_string()));
        }
        if self.guideline_text.trim().is_empty() {
            return Err(GenerateError::InvalidRequest("guideline text is empty".to_string()));
        }
        if self.question_count == 0 || self.question_count > max_questions {
            return Err(GenerateError::InvalidRequest(format!(
                "question count must be between 1 and {}, got {}",
                max_questions, self.question_count
            )));
        }
        Ok(())
    }
}

#[derive(Clone)]
/// Question generator that wraps a LowLevelClient. Works with concrete clients,
/// `Box<dyn LowLevelClient>` and `FlexibleClient` alike.
pub struct QuestionGenerator<C: LowLevelClient> {
    client: C,
    segmenter: Segmenter,
    template: PromptTemplate,
    config: GeneratorConfig,
    interceptor: Option<Arc<dyn Interceptor>>,
}

impl<C: LowLevelClient> QuestionGenerator<C> {
    pub fn new(client: C, config: GeneratorConfig) -> Self {
        info!(timeout = ?config.request_timeout, max_questions = config.max_questions, "Creating new QuestionGenerator");
        let segmenter = Segmenter::default();
        let template = PromptTemplate::for_segmenter(&segmenter).with_max_guideline_chars(config.max_guideline_chars);
        Self {
            client,
            segmenter,
            template,
            config,
            interceptor: None,
        }
    }

    /// Replace the segmenter; the prompt template follows its markers.
    pub fn with_segmenter(mut self, segmenter: Segmenter) -> Self {
        self.template =
            PromptTemplate::for_segmenter(&segmenter).with_max_guideline_chars(self.config.max_guideline_chars);
        self.segmenter = segmenter;
        self
    }

    /// Save every prompt/response pair through `interceptor`.
    pub fn with_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptor = Some(interceptor);
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn segmenter(&self) -> &Segmenter {
        &self.segmenter
    }

    /// Render the prompt for `request` without calling the model.
    pub fn prompt_for(&self, request: &GenerationRequest) -> String {
        self.template
            .render(&request.topic, &request.guideline_text, request.question_count)
    }

    /// One bounded model call, then segmentation. No retries.
    #[instrument(target = "sba_generator::generator", skip(self, request), fields(topic = %request.topic, count = request.question_count))]
    pub async fn generate(&self, request: &GenerationRequest) -> Result<Vec<QuestionRecord>, GenerateError> {
        request.validate(self.config.max_questions)?;

        let prompt = self.prompt_for(request);
        debug!(prompt_len = prompt.len(), "Rendered generation prompt");

        let timeout = self.config.request_timeout;
        let raw = match tokio::time::timeout(timeout, self.client.ask_raw(prompt.clone())).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(?timeout, "Model call timed out");
                return Err(AIError::Timeout(timeout).into());
            }
        };
        info!(response_len = raw.len(), "Received model response");

        if let Some(interceptor) = &self.interceptor {
            if let Err(e) = interceptor.save(&prompt, &raw).await {
                warn!(error = %e, "Failed to save transcript");
            }
        }

        let records = self.segmenter.segment(&raw);
        if records.is_empty() {
            warn!("Model response contained no questions");
            return Err(GenerateError::EmptyResponse);
        }
        if records.len() != request.question_count {
            debug!(requested = request.question_count, received = records.len(), "Question count differs from request");
        }
        Ok(records)
    }

    /// Generate and load the batch into `session`. On any error the session is left as it was.
    pub async fn generate_into(
        &self,
        session: &mut SessionState,
        request: &GenerationRequest,
    ) -> Result<usize, GenerateError> {
        let records = self.generate(request).await?;
        let count = records.len();
        session.load_batch(records);
        Ok(count)
    }
}
