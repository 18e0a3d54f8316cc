//! Thin client for the earn/quiz/wallet endpoints of the remote backend.
//!
//! The backend is the source of truth for balances and rewards; nothing
//! here computes money locally.

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

use crate::{
    error::{GatewayError, GatewayResult},
    models::{
        ClaimRequest, ClaimResult, HeartbeatPayload, Quiz, QuizResult, QuizSubmission,
        StartVisit, WalletBalance,
    },
};

const ENABLE_LOGS: bool = true;
use crate::log_debug;

#[derive(Serialize)]
struct StartVisitRequest<'a> {
    campaign_id: &'a str,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
    auth_token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str, auth_token: Option<String>, timeout: Duration) -> GatewayResult<Self> {
        let mut base_url = Url::parse(base_url)?;
        match base_url.scheme() {
            "http" | "https" => {}
            other => return Err(GatewayError::InvalidScheme(other.to_string())),
        }
        // Keep the last path segment when joining relative endpoints.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url,
            auth_token,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub async fn start_visit(&self, campaign_id: &str) -> GatewayResult<StartVisit> {
        self.post_json("earn/start", &StartVisitRequest { campaign_id })
            .await
    }

    /// Heartbeats carry no response body the client relies on.
    pub async fn heartbeat(&self, payload: &HeartbeatPayload) -> GatewayResult<()> {
        let url = self.endpoint("earn/heartbeat")?;
        let response = self.authorized(self.http.post(url).json(payload)).send().await?;
        check_status(response).await.map(|_| ())
    }

    pub async fn claim(&self, request: &ClaimRequest) -> GatewayResult<ClaimResult> {
        self.post_json("earn/claim", request).await
    }

    pub async fn quiz(&self, campaign_id: &str) -> GatewayResult<Quiz> {
        // Campaign ids are opaque; percent-encode them as a single segment.
        let mut url = self.endpoint("quiz/")?;
        url.path_segments_mut()
            .map_err(|_| GatewayError::UnexpectedResponse("base url cannot hold a path".into()))?
            .pop_if_empty()
            .push(campaign_id);
        log_debug!("GET {url}");
        let response = self.authorized(self.http.get(url)).send().await?;
        decode(check_status(response).await?).await
    }

    pub async fn submit_quiz(&self, submission: &QuizSubmission) -> GatewayResult<QuizResult> {
        self.post_json("quiz/submit", submission).await
    }

    pub async fn wallet(&self) -> GatewayResult<WalletBalance> {
        let url = self.endpoint("wallet")?;
        let response = self.authorized(self.http.get(url)).send().await?;
        decode(check_status(response).await?).await
    }

    fn endpoint(&self, path: &str) -> GatewayResult<Url> {
        Ok(self.base_url.join(path)?)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> GatewayResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        log_debug!("POST {url}");
        let response = self.authorized(self.http.post(url).json(body)).send().await?;
        decode(check_status(response).await?).await
    }
}

async fn check_status(response: Response) -> GatewayResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(GatewayError::ServerRejected {
        status: status.as_u16(),
        message: rejection_message(status, &body),
    })
}

fn rejection_message(status: StatusCode, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        if let Some(message) = parsed.message.or(parsed.error) {
            return message;
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        trimmed.to_string()
    }
}

async fn decode<R: DeserializeOwned>(response: Response) -> GatewayResult<R> {
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|err| GatewayError::UnexpectedResponse(err.to_string()))
}

#[cfg(test)]
pub(crate) mod test_server {
    //! In-process backend used by tests across the crate.

    use std::{
        net::SocketAddr,
        sync::{
            atomic::{AtomicU64, AtomicUsize, Ordering},
            Arc, Mutex,
        },
    };

    use axum::{
        extract::{Path, State},
        http::{HeaderMap, StatusCode},
        routing::{get, post},
        Json, Router,
    };
    use serde_json::{json, Value};
    use tokio::time::{sleep, Duration};

    #[derive(Default)]
    pub struct Backend {
        pub watch_duration_seconds: AtomicU64,
        pub balance: AtomicU64,
        pub heartbeats: AtomicUsize,
        pub claims: AtomicUsize,
        /// Number of upcoming claims that should fail with 503.
        pub failing_claims: AtomicUsize,
        pub failing_heartbeats: AtomicUsize,
        /// Number of upcoming claims answered 200 with an undecodable body.
        pub malformed_claims: AtomicUsize,
        pub claim_delay_ms: AtomicU64,
        pub start_delay_ms: AtomicU64,
        pub last_auth: Mutex<Option<String>>,
        pub last_claim: Mutex<Option<Value>>,
        pub last_heartbeat: Mutex<Option<Value>>,
    }

    pub struct TestServer {
        pub base_url: String,
        pub backend: Arc<Backend>,
        handle: tokio::task::JoinHandle<()>,
    }

    impl Drop for TestServer {
        fn drop(&mut self) {
            self.handle.abort();
        }
    }

    pub async fn spawn(watch_duration_seconds: u64, balance: u64) -> TestServer {
        let backend = Arc::new(Backend::default());
        backend
            .watch_duration_seconds
            .store(watch_duration_seconds, Ordering::SeqCst);
        backend.balance.store(balance, Ordering::SeqCst);

        let router = Router::new()
            .route("/api/earn/start", post(start))
            .route("/api/earn/heartbeat", post(heartbeat))
            .route("/api/earn/claim", post(claim))
            .route("/api/quiz/:campaign_id", get(quiz))
            .route("/api/quiz/submit", post(submit_quiz))
            .route("/api/wallet", get(wallet))
            .with_state(backend.clone());

        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
        let actual_addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        sleep(Duration::from_millis(20)).await;

        TestServer {
            base_url: format!("http://{actual_addr}/api/"),
            backend,
            handle,
        }
    }

    async fn start(
        State(backend): State<Arc<Backend>>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        *backend.last_auth.lock().unwrap() = headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let delay = backend.start_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            sleep(Duration::from_millis(delay)).await;
        }

        let campaign_id = body["campaign_id"].as_str().unwrap_or_default().to_string();
        if campaign_id == "missing" {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({ "message": "Campaign not found" })),
            );
        }
        (
            StatusCode::OK,
            Json(json!({
                "token": format!("tok-{campaign_id}"),
                "campaign": {
                    "id": campaign_id,
                    "title": "Test campaign",
                    "url": "https://advertiser.example/landing",
                    "watch_duration_seconds": backend.watch_duration_seconds.load(Ordering::SeqCst),
                    "coins_per_visit": 5
                }
            })),
        )
    }

    async fn heartbeat(
        State(backend): State<Arc<Backend>>,
        Json(body): Json<Value>,
    ) -> StatusCode {
        backend.heartbeats.fetch_add(1, Ordering::SeqCst);
        *backend.last_heartbeat.lock().unwrap() = Some(body);
        let failing = backend.failing_heartbeats.load(Ordering::SeqCst);
        if failing > 0 {
            backend.failing_heartbeats.store(failing - 1, Ordering::SeqCst);
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
        StatusCode::OK
    }

    async fn claim(
        State(backend): State<Arc<Backend>>,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        backend.claims.fetch_add(1, Ordering::SeqCst);
        *backend.last_claim.lock().unwrap() = Some(body);

        let delay = backend.claim_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            sleep(Duration::from_millis(delay)).await;
        }

        let failing = backend.failing_claims.load(Ordering::SeqCst);
        if failing > 0 {
            backend.failing_claims.store(failing - 1, Ordering::SeqCst);
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": "Service temporarily unavailable" })),
            );
        }

        let malformed = backend.malformed_claims.load(Ordering::SeqCst);
        if malformed > 0 {
            backend.malformed_claims.store(malformed - 1, Ordering::SeqCst);
            return (StatusCode::OK, Json(json!({ "status": "queued" })));
        }

        let new_balance = backend.balance.fetch_add(5, Ordering::SeqCst) + 5;
        (
            StatusCode::OK,
            Json(json!({ "coins_earned": 5, "new_balance": new_balance })),
        )
    }

    async fn quiz(Path(campaign_id): Path<String>) -> Json<Value> {
        Json(json!({
            "campaign_id": campaign_id,
            "questions": [
                { "id": "q1", "prompt": "What colour was the logo?", "options": ["red", "blue"] },
                { "id": "q2", "prompt": "What was advertised?", "options": ["shoes", "tea"] }
            ]
        }))
    }

    async fn submit_quiz(
        State(backend): State<Arc<Backend>>,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        // Correct answers are [1, 0].
        let answers: Vec<u64> = body["answers"]
            .as_array()
            .map(|items| items.iter().filter_map(Value::as_u64).collect())
            .unwrap_or_default();
        let correct = answers
            .iter()
            .zip([1u64, 0])
            .filter(|(given, expected)| *given == expected)
            .count() as u64;
        let coins = correct * 3;
        let new_balance = backend.balance.fetch_add(coins, Ordering::SeqCst) + coins;
        Json(json!({
            "correct": correct,
            "total": 2,
            "coins_earned": coins,
            "new_balance": new_balance
        }))
    }

    async fn wallet(State(backend): State<Arc<Backend>>) -> Json<Value> {
        Json(json!({ "balance": backend.balance.load(Ordering::SeqCst) }))
    }
}
