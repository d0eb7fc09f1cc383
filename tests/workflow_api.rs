//! Integration tests for the outreach workflow REST API.
//!
//! Each test spins up an Axum server on a random port with a stub LLM and a
//! recording mailer, then drives the real HTTP contract with reqwest.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;

use outreach::config::GenerationConfig;
use outreach::dispatch::{Dispatcher, Mailer, OutgoingEmail};
use outreach::error::{DispatchError, LlmError};
use outreach::llm::{
    CompletionRequest, CompletionResponse, FinishReason, LlmBackend, LlmProvider, ProviderFactory,
};
use outreach::session::{AppState, Pipeline, SessionManager, WorkflowDeps, session_routes};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

const CSV: &str = "Name,Company,Email,Description\n\
    Ada,Acme,ada@acme.test,builds analytical engines\n\
    Grace,Beta,grace@beta.test,ships compilers\n";

/// Stub LLM that greets whoever the prompt is addressed to.
struct StubLlm;

#[async_trait]
impl LlmProvider for StubLlm {
    fn model_name(&self) -> &str {
        "stub"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let prompt = &request.messages[0].content;
        let name = prompt
            .split("cold email to ")
            .nth(1)
            .and_then(|s| s.split(',').next())
            .unwrap_or("there");
        Ok(CompletionResponse {
            content: format!("Dear {name},\n\nI'd love to learn from you.\n\nSincerely,\nJane"),
            input_tokens: 0,
            output_tokens: 0,
            finish_reason: FinishReason::Stop,
            response_id: None,
        })
    }
}

struct StubFactory;

impl ProviderFactory for StubFactory {
    fn backend(&self) -> LlmBackend {
        LlmBackend::Cohere
    }

    fn create(&self, _api_key: SecretString) -> Result<Arc<dyn LlmProvider>, LlmError> {
        Ok(Arc::new(StubLlm))
    }
}

#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), DispatchError> {
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

struct Server {
    base: String,
    client: reqwest::Client,
    mailer: Arc<RecordingMailer>,
}

/// Start an Axum server on a random port.
async fn start_server(dispatch_enabled: bool, server_key: Option<&str>) -> Server {
    let mailer = Arc::new(RecordingMailer::default());
    let deps = Arc::new(WorkflowDeps {
        providers: Arc::new(StubFactory),
        dispatcher: Arc::new(Dispatcher::new(mailer.clone())),
        generation: GenerationConfig::default(),
        dispatch_enabled,
        server_key: server_key.map(|k| SecretString::from(k.to_string())),
        pipeline: Pipeline::with_history(),
    });
    let app = session_routes(AppState {
        sessions: Arc::new(SessionManager::new(deps)),
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    Server {
        base: format!("http://127.0.0.1:{port}"),
        client: reqwest::Client::new(),
        mailer,
    }
}

impl Server {
    async fn create_session(&self) -> String {
        let resp = self
            .client
            .post(format!("{}/api/sessions", self.base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201);
        let body: Value = resp.json().await.unwrap();
        body["id"].as_str().unwrap().to_string()
    }

    fn url(&self, id: &str, action: &str) -> String {
        format!("{}/api/sessions/{id}/{action}", self.base)
    }

    async fn post_json(&self, id: &str, action: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(id, action))
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn upload(&self, id: &str, csv: &str) -> reqwest::Response {
        self.client
            .post(self.url(id, "upload"))
            .header("content-type", "text/csv")
            .body(csv.to_string())
            .send()
            .await
            .unwrap()
    }

    /// Credential, campaign, upload and generation for a fresh session.
    async fn generated_session(&self) -> String {
        let id = self.create_session().await;
        let resp = self.post_json(&id, "credential", json!({"api_key": "test-key"})).await;
        assert_eq!(resp.status(), 200);
        let resp = self
            .post_json(
                &id,
                "campaign",
                json!({"goal": "Internship", "field": "data science", "sender_bio": "Jane, CS student"}),
            )
            .await;
        assert_eq!(resp.status(), 200);
        assert_eq!(self.upload(&id, CSV).await.status(), 200);

        let resp = self
            .client
            .post(self.url(&id, "generate"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        id
    }
}

#[tokio::test]
async fn rest_health_endpoint() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(false, None).await;

        let resp = reqwest::get(format!("{}/health", server.base)).await.unwrap();
        assert_eq!(resp.status(), 200);

        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "outreach");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn full_flow_generates_reviews_and_exports() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(false, None).await;
        let id = server.generated_session().await;

        let resp = reqwest::get(server.url(&id, "review")).await.unwrap();
        assert_eq!(resp.status(), 200);
        let review: Value = resp.json().await.unwrap();
        assert_eq!(review["prompt"], "Do you want to send email?");
        let rows = review["rows"].as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0]["message"].as_str().unwrap().starts_with("Dear Ada,"));
        assert!(rows[1]["message"].as_str().unwrap().starts_with("Dear Grace,"));

        let resp = reqwest::get(server.url(&id, "export")).await.unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers()["content-type"], "text/csv");
        assert_eq!(
            resp.headers()["content-disposition"],
            "attachment; filename=\"personalized_messages.csv\""
        );
        let csv = resp.text().await.unwrap();
        assert!(csv.starts_with("Name,Company,Email,Description,Message\n"));
        assert!(csv.contains("Dear Ada,"));

        let session: Value = reqwest::get(format!("{}/api/sessions/{id}", server.base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(session["phase"], "reviewing");
        assert_eq!(session["history"][0], "Emails generated successfully!");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn confirmed_send_dispatches_once() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(true, None).await;
        let id = server.generated_session().await;

        let resp = server.post_json(&id, "send", json!({"confirm": true})).await;
        assert_eq!(resp.status(), 200);
        let outcome: Value = resp.json().await.unwrap();
        assert_eq!(outcome["dispatched"], true);
        assert_eq!(outcome["report"]["deliveries"][0]["outcome"], "sent");

        // Re-rendering the review must not send again.
        for _ in 0..2 {
            let resp = reqwest::get(server.url(&id, "review")).await.unwrap();
            assert_eq!(resp.status(), 200);
        }

        let sent = server.mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].to, "ada@acme.test");
        assert_eq!(
            sent[0].subject,
            "Passionate About data science: Internship Inquiry for Acme"
        );
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn send_is_noted_but_skipped_when_dispatch_disabled() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(false, None).await;
        let id = server.generated_session().await;

        let outcome: Value = server
            .post_json(&id, "send", json!({"confirm": true}))
            .await
            .json()
            .await
            .unwrap();
        assert_eq!(outcome["dispatched"], false);
        assert!(outcome["notice"].as_str().unwrap().contains("disabled"));
        assert!(server.mailer.sent.lock().unwrap().is_empty());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn invalid_upload_keeps_previous_batch() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(false, None).await;
        let id = server.generated_session().await;

        let resp = server.upload(&id, "Name,Email\nAda,ada@acme.test\n").await;
        assert_eq!(resp.status(), 400);
        let body: Value = resp.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains("Company"));

        let session: Value = reqwest::get(format!("{}/api/sessions/{id}", server.base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(session["send_flag"], false);
        assert_eq!(session["batch"]["rows"], 2);
        assert_eq!(session["batch"]["generated"], 2);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn missing_credential_returns_guidance() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(false, None).await;
        let id = server.create_session().await;

        let resp = server
            .post_json(
                &id,
                "campaign",
                json!({"goal": "Advice", "field": "robotics", "sender_bio": "Jane"}),
            )
            .await;
        assert_eq!(resp.status(), 401);
        let body: Value = resp.json().await.unwrap();
        let error = body["error"].as_str().unwrap();
        assert!(error.contains("Please add your Cohere API key"));
        assert!(error.contains("https://cohere.com/"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn server_key_starts_session_at_parameters() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(false, Some("server-key")).await;
        let id = server.create_session().await;

        let session: Value = reqwest::get(format!("{}/api/sessions/{id}", server.base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(session["phase"], "awaiting_parameters");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn out_of_order_actions_conflict() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(false, Some("server-key")).await;
        let id = server.create_session().await;

        assert_eq!(server.upload(&id, CSV).await.status(), 409);
        let resp = reqwest::get(server.url(&id, "export")).await.unwrap();
        assert_eq!(resp.status(), 409);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn unknown_and_deleted_sessions_are_not_found() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(false, None).await;
        let missing = uuid::Uuid::new_v4();
        let resp = reqwest::get(format!("{}/api/sessions/{missing}", server.base))
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);

        let id = server.create_session().await;
        let url = format!("{}/api/sessions/{id}", server.base);
        let resp = server.client.delete(&url).send().await.unwrap();
        assert_eq!(resp.status(), 204);
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), 404);
    })
    .await
    .expect("test timed out");
}
