mod common;

use futures::stream::{self, StreamExt};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::ndjson;
use parley::error::{ParleyError, Result};
use parley::ollama::ndjson::{decode_ndjson, NdjsonDecoder};
use parley::ollama::OllamaClient;
use parley::types::{ChatMessage, CompletionRecord, InferenceEvent, InferenceRequest};

async fn decode_in_chunks(raw: &[u8], chunk_size: usize) -> Vec<serde_json::Value> {
    let chunks: Vec<Result<Vec<u8>>> = raw.chunks(chunk_size).map(|c| Ok(c.to_vec())).collect();
    decode_ndjson::<serde_json::Value, _>(stream::iter(chunks))
        .map(|line| line.unwrap())
        .collect()
        .await
}

#[tokio::test]
async fn decoding_does_not_depend_on_chunk_boundaries() {
    let raw = "{\"message\":{\"content\":\"héllo \"}}\r\n\n{\"message\":{\"content\":\"wörld\"}}\n{\"done\":true}";
    let whole = decode_in_chunks(raw.as_bytes(), raw.len()).await;
    assert_eq!(whole.len(), 3);
    for size in [1, 2, 3, 7, 16] {
        assert_eq!(decode_in_chunks(raw.as_bytes(), size).await, whole, "chunk size {size}");
    }
}

#[test]
fn decoder_keeps_partial_line_until_newline() {
    let mut decoder = NdjsonDecoder::<serde_json::Value>::new();
    assert!(decoder.push(b"{\"a\":").is_empty());
    assert!(decoder.pending() > 0);
    let decoded = decoder.push(b"1}\n");
    assert_eq!(decoded.len(), 1);
    assert!(decoder.finish().is_none());
}

#[tokio::test]
async fn llama3_chat_example_streams_delta_then_done() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({
            "model": "llama3",
            "messages": [{"role": "user", "content": "2+2?"}],
            "stream": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string(ndjson(&[
            json!({"message": {"content": "4"}}),
            json!({"done": true, "eval_count": 3, "eval_duration": 500_000_000u64}),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let client = OllamaClient::new(server.uri()).unwrap();
    let request = InferenceRequest::chat("llama3", vec![ChatMessage::user("2+2?")]);
    let events: Vec<InferenceEvent> = client
        .run_inference(&request)
        .await
        .unwrap()
        .map(|e| e.unwrap())
        .collect()
        .await;

    assert_eq!(events.len(), 2);
    assert_eq!(events[0], InferenceEvent::Delta("4".into()));
    match &events[1] {
        InferenceEvent::Done(record) => {
            assert_eq!(record.eval_count, 3);
            assert_eq!(record.eval_duration, 500_000_000);
            assert_eq!(record.tokens_per_second(), Some(6.0));
        }
        other => panic!("expected Done, got {other:?}"),
    }
}

#[tokio::test]
async fn done_only_stream_yields_zero_valued_record() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"done\":true}\n"))
        .mount(&server)
        .await;

    let client = OllamaClient::new(server.uri()).unwrap();
    let output = client
        .run_inference(&InferenceRequest::generate("llama3", "hi"))
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();
    assert_eq!(output.content, "");
    assert_eq!(output.done, CompletionRecord::default());
}

#[tokio::test]
async fn stream_without_done_is_incomplete() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ndjson(&[
            json!({"response": "Once upon"}),
            json!({"response": " a time"}),
        ])))
        .mount(&server)
        .await;

    let client = OllamaClient::new(server.uri()).unwrap();
    let mut stream = client
        .run_inference(&InferenceRequest::generate("llama3", "story"))
        .await
        .unwrap();
    assert_eq!(
        stream.next().await.unwrap().unwrap(),
        InferenceEvent::Delta("Once upon".into())
    );
    assert_eq!(
        stream.next().await.unwrap().unwrap(),
        InferenceEvent::Delta(" a time".into())
    );
    assert!(matches!(
        stream.next().await,
        Some(Err(ParleyError::IncompleteStream(_)))
    ));
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn sync_inference_sends_stream_false_and_collects_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({"stream": false, "context": [1, 2]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "llama3",
            "response": "Blue light scatters.",
            "done": true,
            "context": [1, 2, 3]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = OllamaClient::new(server.uri()).unwrap();
    let mut request = InferenceRequest::generate("llama3", "Why is the sky blue?");
    request.context = Some(vec![1, 2]);
    let output = client.run_inference_sync(&request).await.unwrap();
    assert_eq!(output.content, "Blue light scatters.");
    assert_eq!(output.done.context, Some(vec![1, 2, 3]));
}

#[tokio::test]
async fn missing_model_is_reported_with_pull_suggestion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"error": "model \"mistral\" not found, try pulling it first"})),
        )
        .mount(&server)
        .await;

    let client = OllamaClient::new(server.uri()).unwrap();
    let err = client
        .run_inference(&InferenceRequest::chat("mistral", vec![ChatMessage::user("hi")]))
        .await
        .unwrap_err();
    match err {
        ParleyError::ModelNotInstalled { model, suggestion } => {
            assert_eq!(model, "mistral");
            assert_eq!(suggestion, "ollama pull mistral");
        }
        other => panic!("expected ModelNotInstalled, got {other:?}"),
    }
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    let client = OllamaClient::new("http://127.0.0.1:9").unwrap();
    let err = client
        .run_inference(&InferenceRequest::generate("llama3", "hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, ParleyError::Transport { .. }));
    assert!(err.is_user_retryable());
}

#[tokio::test]
async fn malformed_line_ends_stream_with_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("{\"response\":\"hi\"}\n{oops}\n{\"done\":true}\n"),
        )
        .mount(&server)
        .await;

    let client = OllamaClient::new(server.uri()).unwrap();
    let mut stream = client
        .run_inference(&InferenceRequest::generate("llama3", "hi"))
        .await
        .unwrap();
    assert_eq!(
        stream.next().await.unwrap().unwrap(),
        InferenceEvent::Delta("hi".into())
    );
    assert!(matches!(
        stream.next().await,
        Some(Err(ParleyError::ProtocolDecode { .. }))
    ));
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn missing_model_file_is_reported_as_custom_model() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": "open /root/.ollama/models/blobs/sha256-abc: no such file or directory"
        })))
        .mount(&server)
        .await;

    let client = OllamaClient::new(server.uri()).unwrap();
    let err = client
        .run_inference(&InferenceRequest::generate("mario", "hi"))
        .await
        .unwrap_err();
    match err {
        ParleyError::CustomModel { model, file } => {
            assert_eq!(model, "mario");
            assert_eq!(file, "/root/.ollama/models/blobs/sha256-abc");
        }
        other => panic!("expected CustomModel, got {other:?}"),
    }
}
