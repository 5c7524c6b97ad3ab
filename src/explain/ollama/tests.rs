use super::*;
use crate::explain::{ExplanationAdapter, ExplanationSource, ProductSummary};
use crate::ranking::ScoredCandidate;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn context(with_history: bool) -> ExplanationContext {
    ExplanationContext {
        user_id: "u1".to_string(),
        candidate: ScoredCandidate {
            product_id: "p9".to_string(),
            content_similarity: 0.6,
            behavioral_score: 0.0,
            combined_score: 0.48,
            rank: 1,
        },
        product: ProductSummary {
            product_id: "p9".to_string(),
            title: "Wool Socks".to_string(),
            category: "Apparel".to_string(),
            tags: vec!["merino".to_string()],
            price: Some(12.0),
            description: Some("Warm merino socks".to_string()),
        },
        behavioral_signal: false,
        interacted: false,
        interest_terms: Vec::new(),
        recent_titles: if with_history {
            vec!["Hiking Boots".to_string()]
        } else {
            Vec::new()
        },
    }
}

fn config_for(server: &MockServer) -> ExplainerConfig {
    let address = server.address();
    ExplainerConfig {
        host: address.ip().to_string(),
        port: address.port(),
        model: "test-llm".to_string(),
        timeout_ms: 2_000,
        ..ExplainerConfig::default()
    }
}

#[test]
fn prompt_carries_product_and_history() {
    let prompt = OllamaExplainer::build_prompt(&context(true), false);
    assert!(prompt.contains("\"title\":\"Wool Socks\""));
    assert!(prompt.contains("Recently interacted products: Hiking Boots"));

    let strict = OllamaExplainer::build_prompt(&context(false), true);
    assert!(strict.contains("product p9"));
    assert!(strict.contains("No strong history available."));
}

#[test]
fn parse_reply_reads_fields() {
    let parsed = parse_reply(
        r#"{"product_id":"p9","blurb":" Soft socks ","explanation":"You like wool."}"#,
    )
    .expect("valid reply");
    assert_eq!(parsed.blurb, "Soft socks");
    assert_eq!(parsed.explanation, "You like wool.");
}

#[test]
fn parse_reply_rejects_missing_explanation() {
    assert!(matches!(
        parse_reply("{\"blurb\":\"only a blurb\"}"),
        Err(RecError::ExplanationUnavailable(_))
    ));
    assert!(matches!(
        parse_reply("no json here"),
        Err(RecError::ExplanationUnavailable(_))
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn generates_through_ollama() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({ "model": "test-llm", "stream": false })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": "{\"blurb\": \"Merino socks\", \"explanation\": \"You recently viewed boots. These socks pair well.\"}"
        })))
        .mount(&server)
        .await;

    let explainer = OllamaExplainer::new(&config_for(&server)).expect("valid config");
    assert_eq!(explainer.model(), "test-llm");

    let text = explainer
        .generate(&context(true), false)
        .await
        .expect("generation succeeds");
    assert_eq!(text.blurb, "Merino socks");
    assert!(text.explanation.starts_with("You recently viewed boots."));
}

#[tokio::test(flavor = "multi_thread")]
async fn server_error_becomes_fallback() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let explainer = OllamaExplainer::new(&config_for(&server)).expect("valid config");
    let adapter = ExplanationAdapter::new(
        Arc::new(explainer),
        Duration::from_secs(5),
        Duration::from_secs(60),
    );

    let explanation = adapter.explain(&context(false)).await;
    assert_eq!(explanation.source, ExplanationSource::Fallback);
    assert!(
        explanation
            .explanation
            .starts_with("Wool Socks is recommended for you.")
    );
}
