use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::{core::LowLevelClient, error::AIError};

/// Canned two-question response in the layout the prompt asks for.
pub const SAMPLE_RESPONSE: &str = "Here are your questions.

[[QUESTION]]
A 67-year-old woman presents 90 minutes after onset of left-sided weakness. CT shows no haemorrhage. Her blood pressure is 210/115 mmHg.

Which is the most appropriate next step?

A) Thrombolyse immediately
B) Lower blood pressure to below 185/110 mmHg, then thrombolyse
C) Give aspirin 300 mg
D) Arrange MRI before any treatment
E) Admit for observation only
Correct Answer: B
Explanation: Thrombolysis is contraindicated while blood pressure exceeds 185/110 mmHg. It should be lowered first so treatment can start within the window.
Quote: \"Blood pressure should be reduced to 185/110 mmHg or lower before thrombolysis.\"

[[QUESTION]]
A 24-year-old man has a tension pneumothorax after a stab wound to the chest. He is peri-arrest.

What is the immediate management?

A) Chest X-ray
B) CT thorax
C) Needle or finger thoracostomy
D) Intubation
E) High-flow oxygen only
Correct Answer: C
Explanation: Tension pneumothorax is a clinical diagnosis. Decompression must not wait for imaging.
Quote: \"Tension pneumothorax should be decompressed without delay.\"
";

/// A scripted reply for `MockClient`.
#[derive(Debug, Clone)]
pub enum MockResponse {
    Text(String),
    Error(String),
    /// Reply after sleeping, for timeout tests
    Delayed(Duration, String),
}

/// Shared control surface for a `MockClient`: queue replies, inspect prompts.
#[derive(Debug, Default)]
pub struct MockHandle {
    queue: Mutex<VecDeque<MockResponse>>,
    prompts: Mutex<Vec<String>>,
    fallback: Mutex<String>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockHandle {
    pub fn push(&self, response: MockResponse) {
        lock(&self.queue).push_back(response);
    }

    pub fn push_text(&self, text: impl Into<String>) {
        self.push(MockResponse::Text(text.into()));
    }

    /// Reply used once the queue is exhausted
    pub fn set_fallback(&self, text: impl Into<String>) {
        *lock(&self.fallback) = text.into();
    }

    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.prompts).len()
    }

    pub fn remaining(&self) -> usize {
        lock(&self.queue).len()
    }

    fn next(&self, prompt: String) -> MockResponse {
        lock(&self.prompts).push(prompt);
        lock(&self.queue)
            .pop_front()
            .unwrap_or_else(|| MockResponse::Text(lock(&self.fallback).clone()))
    }
}

/// Mock client for testing that replays scripted responses
#[derive(Debug, Clone)]
pub struct MockClient {
    handle: Arc<MockHandle>,
}

impl MockClient {
    pub fn new() -> (Self, Arc<MockHandle>) {
        Self::with_responses(Vec::new())
    }

    pub fn with_responses(responses: Vec<MockResponse>) -> (Self, Arc<MockHandle>) {
        let handle = Arc::new(MockHandle::default());
        for response in responses {
            handle.push(response);
        }
        (Self { handle: handle.clone() }, handle)
    }

    /// A mock that always answers with `SAMPLE_RESPONSE`
    pub fn sample() -> Self {
        let (client, handle) = Self::new();
        handle.set_fallback(SAMPLE_RESPONSE);
        client
    }
}

#[async_trait]
impl LowLevelClient for MockClient {
    async fn ask_raw(&self, prompt: String) -> Result<String, AIError> {
        let response = self.handle.next(prompt);
        debug!(?response, "Mock client replying");
        match response {
            MockResponse::Text(text) => Ok(text),
            MockResponse::Error(message) => Err(AIError::Mock(message)),
            MockResponse::Delayed(delay, text) => {
                tokio::time::sleep(delay).await;
                Ok(text)
            }
        }
    }

    fn clone_box(&self) -> Box<dyn LowLevelClient> {
        Box::new(self.clone())
    }
}
