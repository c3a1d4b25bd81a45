use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sba_generator::clients::{ClientType, FlexibleClient, MockClient, MockResponse, SAMPLE_RESPONSE};
use sba_generator::config::GeneratorConfig;
use sba_generator::core::{GenerationRequest, QuestionGenerator};
use sba_generator::error::{AIError, GenerateError};
use sba_generator::interceptors::{FileInterceptor, Interceptor};
use sba_generator::segment::AnswerLetter;
use sba_generator::session::{SessionPhase, SessionState};

fn request(count: usize) -> GenerationRequest {
    GenerationRequest::new("Acute stroke", "Thrombolysis guidance. ".repeat(200), count)
}

#[derive(Debug)]
struct FailingInterceptor;

#[async_trait]
impl Interceptor for FailingInterceptor {
    async fn save(&self, _prompt: &str, _response: &str) -> std::io::Result<()> {
        Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
    }
}

#[tokio::test]
async fn generate_segments_the_model_response() {
    let (client, handle) = MockClient::with_responses(vec![MockResponse::Text(SAMPLE_RESPONSE.to_string())]);
    let generator = QuestionGenerator::new(client, GeneratorConfig::default());

    let records = generator.generate(&request(2)).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].correct_answer, Some(AnswerLetter::B));
    assert_eq!(records[1].correct_answer, Some(AnswerLetter::C));

    let prompts = handle.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("Topic: Acute stroke"));
    assert!(prompts[0].contains("Output 2 questions"));
    assert!(prompts[0].contains("[[QUESTION]]"));
}

#[tokio::test]
async fn guideline_is_truncated_before_prompting() {
    let (client, handle) = MockClient::with_responses(vec![MockResponse::Text(SAMPLE_RESPONSE.to_string())]);
    let config = GeneratorConfig { max_guideline_chars: 30, ..GeneratorConfig::default() };
    let generator = QuestionGenerator::new(client, config);

    let guideline = format!("{}{}", "x".repeat(30), "TAIL_NOT_SENT");
    generator
        .generate(&GenerationRequest::new("Sepsis", guideline, 1))
        .await
        .unwrap();
    let prompt = &handle.prompts()[0];
    assert!(prompt.contains(&"x".repeat(30)));
    assert!(!prompt.contains("TAIL_NOT_SENT"));
}

#[tokio::test]
async fn generate_into_loads_a_fresh_batch() {
    let (client, handle) = MockClient::new();
    handle.push_text(SAMPLE_RESPONSE);
    handle.push_text("Stem\nCorrect Answer: E\nExplanation: only one");
    let generator = QuestionGenerator::new(client, GeneratorConfig::default());

    let mut session = SessionState::new();
    assert_eq!(generator.generate_into(&mut session, &request(2)).await.unwrap(), 2);
    session.select_answer(1, 'B').unwrap();

    assert_eq!(generator.generate_into(&mut session, &request(1)).await.unwrap(), 1);
    assert_eq!(session.len(), 1);
    assert_eq!(session.selection(1), None);
    assert_eq!(session.phase(), SessionPhase::Answering);
}

#[tokio::test]
async fn client_errors_propagate_and_leave_session_untouched() {
    let (client, handle) = MockClient::new();
    handle.push_text(SAMPLE_RESPONSE);
    handle.push(MockResponse::Error("connection reset".to_string()));
    let generator = QuestionGenerator::new(client, GeneratorConfig::default());

    let mut session = SessionState::new();
    generator.generate_into(&mut session, &request(2)).await.unwrap();
    session.select_answer(2, 'C').unwrap();

    let err = generator.generate_into(&mut session, &request(2)).await.unwrap_err();
    assert!(matches!(err, GenerateError::Ai(AIError::Mock(ref m)) if m == "connection reset"));
    assert_eq!(session.len(), 2);
    assert_eq!(session.selection(2), Some(AnswerLetter::C));
    assert_eq!(handle.call_count(), 2);
}

#[tokio::test]
async fn slow_model_calls_time_out_without_mutation() {
    let (client, _handle) = MockClient::with_responses(vec![MockResponse::Delayed(
        Duration::from_millis(500),
        SAMPLE_RESPONSE.to_string(),
    )]);
    let config = GeneratorConfig { request_timeout: Duration::from_millis(50), ..GeneratorConfig::default() };
    let generator = QuestionGenerator::new(client, config);

    let mut session = SessionState::new();
    let err = generator.generate_into(&mut session, &request(1)).await.unwrap_err();
    assert!(matches!(err, GenerateError::Ai(AIError::Timeout(d)) if d == Duration::from_millis(50)));
    assert_eq!(session.phase(), SessionPhase::Empty);
}

#[tokio::test]
async fn responses_without_questions_are_empty_response_errors() {
    let (client, handle) = MockClient::new();
    handle.push_text("I'm sorry, I can't help with that.");
    handle.push_text("");
    let generator = QuestionGenerator::new(client, GeneratorConfig::default());

    assert!(matches!(generator.generate(&request(1)).await, Err(GenerateError::EmptyResponse)));
    assert!(matches!(generator.generate(&request(1)).await, Err(GenerateError::EmptyResponse)));
}

#[tokio::test]
async fn invalid_requests_never_reach_the_model() {
    let (client, handle) = MockClient::new();
    let generator = QuestionGenerator::new(client, GeneratorConfig::default());

    let bad = [
        GenerationRequest::new("  ", "text", 1),
        GenerationRequest::new("Topic", " \n", 1),
        GenerationRequest::new("Topic", "text", 0),
        GenerationRequest::new("Topic", "text", 6),
    ];
    for req in &bad {
        assert!(matches!(generator.generate(req).await, Err(GenerateError::InvalidRequest(_))));
    }
    assert_eq!(handle.call_count(), 0);
}

#[tokio::test]
async fn file_interceptor_writes_transcripts() {
    let dir = std::env::temp_dir().join(format!("sba_transcripts_{}", std::process::id()));
    let (client, _handle) = MockClient::with_responses(vec![MockResponse::Text(SAMPLE_RESPONSE.to_string())]);
    let generator = QuestionGenerator::new(client, GeneratorConfig::default())
        .with_interceptor(Arc::new(FileInterceptor::new(dir.clone())));

    generator.generate(&request(2)).await.unwrap();

    let entries: Vec<_> = std::fs::read_dir(&dir).unwrap().map(|e| e.unwrap().path()).collect();
    assert_eq!(entries.len(), 1);
    let content = std::fs::read_to_string(&entries[0]).unwrap();
    assert!(content.starts_with("# Prompt"));
    assert!(content.contains("# Response"));
    assert!(content.contains("Correct Answer: B"));
    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn interceptor_failures_do_not_fail_generation() {
    let (client, _handle) = MockClient::with_responses(vec![MockResponse::Text(SAMPLE_RESPONSE.to_string())]);
    let generator = QuestionGenerator::new(client, GeneratorConfig::default())
        .with_interceptor(Arc::new(FailingInterceptor));

    assert_eq!(generator.generate(&request(2)).await.unwrap().len(), 2);
}

#[tokio::test]
async fn flexible_client_wraps_mock() {
    let (flexible, handle) = FlexibleClient::mock();
    handle.push_text(SAMPLE_RESPONSE);
    let generator = QuestionGenerator::new(flexible.clone(), GeneratorConfig::default());

    assert_eq!(generator.generate(&request(2)).await.unwrap().len(), 2);
    assert_eq!(handle.call_count(), 1);

    flexible.replace(Box::new(MockClient::sample()));
    assert_eq!(generator.generate(&request(2)).await.unwrap().len(), 2);
    assert_eq!(handle.call_count(), 1);
}

#[tokio::test]
async fn mock_client_type_builds_sample_client() {
    let client = ClientType::Mock.build().unwrap();
    let generator = QuestionGenerator::new(client, GeneratorConfig::default());
    assert_eq!(generator.generate(&request(2)).await.unwrap().len(), 2);
}

#[test]
fn client_type_parsing() {
    assert!(matches!(ClientType::from_str("openai"), Ok(ClientType::OpenAI)));
    assert!(matches!(ClientType::from_str("OPENAI"), Ok(ClientType::OpenAI)));
    assert!(matches!(ClientType::from_str("mock"), Ok(ClientType::Mock)));
    assert!(ClientType::from_str("claude").is_err());
}
