//! 上游适配器集成测试（wiremock）：请求格式、鉴权头、响应解析、错误透传、重试

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, header_regex, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use nexus::config::{AiSection, ProviderEntry, StaticAiConfig};
use nexus::core::RetryConfig;
use nexus::llm::providers::{
    create_deepseek_provider, AnthropicProvider, GlmProvider, GoogleProvider, NanoBananaProvider,
    OllamaProvider, OpenAiCompatProvider,
};
use nexus::llm::{
    AiRouter, ChatProvider, ChatRequest, LlmError, ProviderId, ProviderSettings, ToolDeclaration,
};
use nexus::memory::Message;

fn no_retry() -> RetryConfig {
    RetryConfig {
        retries: 0,
        initial_delay_ms: 1,
        max_delay_ms: 5,
        factor: 2.0,
        max_jitter_ms: 0,
    }
}

fn settings(id: ProviderId, base: &str) -> ProviderSettings {
    ProviderSettings::new(id, Some("test-key".into()), base).with_retry(no_retry())
}

fn search_tool() -> ToolDeclaration {
    ToolDeclaration {
        name: "web_search".into(),
        description: "Search the web".into(),
        parameters: json!({"type": "object", "properties": {"query": {"type": "string"}}, "required": ["query"]}),
    }
}

#[tokio::test]
async fn test_openai_wire_format_and_tool_calls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "model": "gpt-5.2",
            "stream": false,
            "messages": [{"role": "system", "content": "be brief"}, {"role": "user", "content": "find rust news"}],
            "tools": [{"type": "function", "function": {"name": "web_search"}}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {"name": "web_search", "arguments": "{\"query\":\"rust\"}"}
                }]
            }}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = OpenAiCompatProvider::new(settings(ProviderId::OpenAI, &server.uri()));
    let req = ChatRequest::new("gpt-5.2", vec![Message::user("find rust news")])
        .with_system("be brief")
        .with_tools(vec![search_tool()]);
    let resp = provider.chat(&req).await.unwrap();

    assert_eq!(resp.text, "");
    assert_eq!(resp.tool_calls.len(), 1);
    assert_eq!(resp.tool_calls[0].id, "call_1");
    assert_eq!(resp.tool_calls[0].args, json!({"query": "rust"}));
    let usage = resp.usage.unwrap();
    assert_eq!((usage.input_tokens, usage.output_tokens, usage.total_tokens), (12, 3, 15));
}

#[tokio::test]
async fn test_deepseek_reasoning_content_becomes_thinking() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "42", "reasoning_content": "6 times 7"}}]
        })))
        .mount(&server)
        .await;

    let provider = create_deepseek_provider(settings(ProviderId::OpenAI, &server.uri()));
    assert_eq!(provider.id(), ProviderId::DeepSeek);
    let resp = provider
        .chat(&ChatRequest::new("deepseek-reasoner", vec![Message::user("6*7?")]))
        .await
        .unwrap();
    assert_eq!(resp.text, "42");
    assert_eq!(resp.thinking.as_deref(), Some("6 times 7"));
}

#[tokio::test]
async fn test_http_error_surfaces_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(400).set_body_string("context length exceeded"))
        .expect(1)
        .mount(&server)
        .await;

    let provider = OpenAiCompatProvider::new(settings(ProviderId::Moonshot, &server.uri()));
    let err = provider
        .chat(&ChatRequest::new("moonshot-v1-128k", vec![Message::user("hi")]))
        .await
        .unwrap_err();
    match &err {
        LlmError::Http { provider, status, body } => {
            assert_eq!(*provider, ProviderId::Moonshot);
            assert_eq!(*status, 400);
            assert_eq!(body, "context length exceeded");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.to_string().contains("HTTP 400"));
    assert!(!err.is_auth());
}

#[tokio::test]
async fn test_non_json_body_is_reported_truncated() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(300)))
        .mount(&server)
        .await;

    let provider = OpenAiCompatProvider::new(settings(ProviderId::OpenAI, &server.uri()));
    let err = provider
        .chat(&ChatRequest::new("gpt-5.2", vec![Message::user("hi")]))
        .await
        .unwrap_err();
    match err {
        LlmError::InvalidResponse { provider, message } => {
            assert_eq!(provider, ProviderId::OpenAI);
            assert!(message.ends_with(&format!("{}...", "x".repeat(200))));
            assert!(!message.contains(&"x".repeat(201)));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_transient_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "third time lucky"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let retry = RetryConfig {
        retries: 3,
        ..no_retry()
    };
    let provider = OpenAiCompatProvider::new(settings(ProviderId::OpenAI, &server.uri()).with_retry(retry));
    let resp = provider
        .chat(&ChatRequest::new("gpt-5.2", vec![Message::user("hi")]))
        .await
        .unwrap();
    assert_eq!(resp.text, "third time lucky");
}

#[tokio::test]
async fn test_unauthorized_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Incorrect API key provided"))
        .expect(1)
        .mount(&server)
        .await;

    let retry = RetryConfig {
        retries: 3,
        ..no_retry()
    };
    let provider = OpenAiCompatProvider::new(settings(ProviderId::OpenAI, &server.uri()).with_retry(retry));
    let err = provider
        .chat(&ChatRequest::new("gpt-5.2", vec![Message::user("hi")]))
        .await
        .unwrap_err();
    assert!(err.is_auth());
}

#[tokio::test]
async fn test_missing_key_fails_without_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let provider = AnthropicProvider::new(ProviderSettings::new(ProviderId::Anthropic, None, server.uri()));
    let err = provider
        .chat(&ChatRequest::new("claude-haiku-4-5", vec![Message::user("hi")]))
        .await
        .unwrap_err();
    assert!(err.is_auth());
    assert_eq!(err.to_string(), "anthropic authentication error: Anthropic API Key not configured");
}

#[tokio::test]
async fn test_anthropic_headers_and_blocks() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(header("x-api-key", "test-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(json!({
            "model": "claude-opus-4-5-20251101",
            "system": "You are DevUnit-7",
            "max_tokens": 8192,
            "messages": [{"role": "user", "content": "review this"}],
            "tools": [{"name": "web_search", "input_schema": {"type": "object"}}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [
                {"type": "thinking", "thinking": "The user wants a review."},
                {"type": "text", "text": "Let me search first."},
                {"type": "tool_use", "id": "toolu_1", "name": "web_search", "input": {"query": "rust lints"}}
            ],
            "usage": {"input_tokens": 20, "output_tokens": 8}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = AnthropicProvider::new(settings(ProviderId::Anthropic, &server.uri()));
    let req = ChatRequest::new("claude-opus-4-5-20251101", vec![Message::user("review this")])
        .with_system("You are DevUnit-7")
        .with_tools(vec![search_tool()]);
    let resp = provider.chat(&req).await.unwrap();

    assert_eq!(resp.text, "Let me search first.");
    assert_eq!(resp.thinking.as_deref(), Some("The user wants a review."));
    assert_eq!(resp.tool_calls[0].id, "toolu_1");
    assert_eq!(resp.tool_calls[0].args, json!({"query": "rust lints"}));
    assert_eq!(resp.usage.unwrap().total_tokens, 28);
}

#[tokio::test]
async fn test_google_generate_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-3-pro-preview:generateContent"))
        .and(header("x-goog-api-key", "test-key"))
        .and(body_partial_json(json!({
            "contents": [
                {"role": "user", "parts": [{"text": "hi"}]},
                {"role": "model", "parts": [{"text": "hello"}]}
            ],
            "systemInstruction": {"parts": [{"text": "sys"}]},
            "generationConfig": {"thinkingConfig": {"thinkingBudget": 4096, "includeThoughts": true}},
            "tools": [{"functionDeclarations": [{"name": "web_search"}]}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"parts": [
                {"text": "thinking about it", "thought": true},
                {"text": "Answer."},
                {"functionCall": {"name": "web_search", "args": {"query": "x"}}}
            ]}}],
            "usageMetadata": {"promptTokenCount": 4, "candidatesTokenCount": 6, "totalTokenCount": 10}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = GoogleProvider::new(settings(ProviderId::Google, &server.uri()));
    let req = ChatRequest::new(
        "gemini-3-pro-preview",
        vec![Message::user("hi"), Message::assistant("hello")],
    )
    .with_system("sys")
    .with_tools(vec![search_tool()]);
    let resp = provider.chat(&req).await.unwrap();

    assert_eq!(resp.text, "Answer.");
    assert_eq!(resp.thinking.as_deref(), Some("thinking about it"));
    assert_eq!(resp.tool_calls[0].id, "web_search-2");
    assert_eq!(resp.usage.unwrap().total_tokens, 10);
}

#[tokio::test]
async fn test_glm_sends_signed_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header_regex(
            "Authorization",
            r"^Bearer [A-Za-z0-9_-]+\.[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+$",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "你好"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = GlmProvider::new(
        ProviderSettings::new(ProviderId::Glm, Some("my-id.my-secret".into()), server.uri()).with_retry(no_retry()),
    );
    let resp = provider
        .chat(&ChatRequest::new("glm-4.7", vec![Message::user("hi")]))
        .await
        .unwrap();
    assert_eq!(resp.text, "你好");
}

#[tokio::test]
async fn test_glm_rejects_malformed_key() {
    let provider = GlmProvider::new(
        ProviderSettings::new(ProviderId::Glm, Some("no-secret".into()), "http://127.0.0.1:9").with_retry(no_retry()),
    );
    let err = provider
        .chat(&ChatRequest::new("glm-4.7", vec![Message::user("hi")]))
        .await
        .unwrap_err();
    assert!(err.is_auth());
}

#[tokio::test]
async fn test_ollama_probe_then_chat() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"models": []})))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "local answer"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = OllamaProvider::new(ProviderSettings::new(
        ProviderId::Ollama,
        None,
        format!("{}/v1", server.uri()),
    ));
    assert!(provider.check_connection().await);
    // chat 每次都会先探活
    let resp = provider
        .chat(&ChatRequest::new("llama3.3", vec![Message::user("hi")]))
        .await
        .unwrap();
    assert_eq!(resp.text, "local answer");
}

#[tokio::test]
async fn test_ollama_unreachable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let provider = OllamaProvider::new(
        ProviderSettings::new(ProviderId::Ollama, None, format!("{}/v1", server.uri()))
            .with_probe_timeout(Duration::from_millis(50)),
    );
    let err = provider
        .chat(&ChatRequest::new("llama3.3", vec![Message::user("hi")]))
        .await
        .unwrap_err();
    match err {
        LlmError::Unreachable { provider, url } => {
            assert_eq!(provider, ProviderId::Ollama);
            assert_eq!(url, format!("{}/api/tags", server.uri()));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_nanobanana_endpoint_and_simulation() {
    let provider = NanoBananaProvider::new(ProviderSettings::new(ProviderId::NanoBanana, None, ""));
    let resp = provider
        .chat(&ChatRequest::new("nanobanana-pro", vec![Message::user("hi")]))
        .await
        .unwrap();
    assert!(resp.text.starts_with("[Nano Banana Edge]: On-device runtime not configured."));
    assert!(resp.text.ends_with("Processed request for nanobanana-pro. (Simulated Response)"));
    assert_eq!(resp.usage.unwrap().total_tokens, 50);

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/prompt"))
        .and(body_partial_json(json!({"systemPrompt": "sys", "prompt": "user: hi"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "edge reply"})))
        .expect(1)
        .mount(&server)
        .await;
    let provider = NanoBananaProvider::new(ProviderSettings::new(ProviderId::NanoBanana, None, server.uri()));
    let resp = provider
        .chat(&ChatRequest::new("nanobanana-pro", vec![Message::user("hi")]).with_system("sys"))
        .await
        .unwrap();
    assert_eq!(resp.text, "edge reply");
}

#[tokio::test]
async fn test_router_over_real_adapter() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"model": "gpt-5.2"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "routed"}}],
            "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut ai = AiSection::default();
    ai.retry = no_retry();
    ai.providers.insert(
        ProviderId::OpenAI,
        ProviderEntry {
            api_key: Some("test-key".into()),
            base_url: Some(format!("{}/", server.uri())),
            enabled: Some(true),
        },
    );
    let router = AiRouter::new(Arc::new(StaticAiConfig(ai)));
    let resp = router
        .chat(&ChatRequest::new("gpt-5.2", vec![Message::user("hi")]))
        .await
        .unwrap();
    assert_eq!(resp.text, "routed");
    assert_eq!(router.usage_report().total_tokens(), 2);
}
