//! In-process stand-in for the IAM and watsonx endpoints.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use tokio::net::TcpListener;

use lexbridge::Settings;

pub const IAM_PATH: &str = "/identity/token";
pub const CHAT_PATH: &str = "/ml/v1/text/chat";
pub const CHAT_STREAM_PATH: &str = "/ml/v1/text/chat_stream";
pub const TEST_TOKEN: &str = "test-token";

/// A reply the mock serves on one of its routes
#[derive(Debug, Clone)]
pub struct Canned
{   pub status: u16
  , pub content_type: &'static str
  , pub body: String
  , /// Held back this long before the reply is written
    pub delay: Option<Duration>
}

impl Canned
{   pub fn json(status: u16, body: serde_json::Value) -> Self
    {   Canned
        {   status
          , content_type: "application/json"
          , body: body.to_string()
          , delay: None
        }
    }

    pub fn sse(lines: &[&str]) -> Self
    {   let mut body = String::new();
        for line in lines
        {   body.push_str(line);
            body.push('\n');
        }
        Canned
        {   status: 200
          , content_type: "text/event-stream"
          , body
          , delay: None
        }
    }

    pub fn chat_text(text: &str) -> Self
    {   Canned::json(200, serde_json::json!({
          "id": "chat-1",
          "model_id": "meta-llama/llama-3-3-70b-instruct",
          "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": text },
            "finish_reason": "stop"
          }],
          "usage": { "prompt_tokens": 5, "completion_tokens": 3 }
        }))
    }

    /// What IAM answers for a good API key.
    pub fn iam_token() -> Self
    {   Canned::json(200, serde_json::json!({
          "access_token": TEST_TOKEN,
          "refresh_token": "not_supported",
          "token_type": "Bearer",
          "expires_in": 3600
        }))
    }

    pub fn delayed(mut self, delay: Duration) -> Self
    {   self.delay = Some(delay);
        self
    }

    async fn reply(&self) -> Response
    {   if let Some(delay) = self.delay
        {   tokio::time::sleep(delay).await;
        }
        let status = StatusCode::from_u16(self.status).expect("valid status");
        (
          status,
          [(header::CONTENT_TYPE, self.content_type)],
          self.body.clone(),
        ).into_response()
    }
}

/// What the server saw
#[derive(Debug, Clone)]
pub struct Recorded
{   pub method: String
  , pub path: String
  , pub query: Option<String>
  , pub authorization: Option<String>
  , pub body: String
}

impl Recorded
{   pub fn json(&self) -> serde_json::Value
    {   serde_json::from_str(&self.body).expect("request body is JSON")
    }
}

#[derive(Clone)]
struct MockState
{   hits: Arc<AtomicUsize>
  , requests: Arc<Mutex<Vec<Recorded>>>
  , chat_calls: Arc<AtomicUsize>
  , iam: Arc<Canned>
  , /// Served in order; the last one repeats
    chat: Arc<Vec<Canned>>
}

impl MockState
{   fn record(&self, method: Method, uri: &Uri, headers: &HeaderMap, body: String)
    {   self.hits.fetch_add(1, Ordering::SeqCst);
        let authorization = headers
          .get(header::AUTHORIZATION)
          .and_then(|v| v.to_str().ok())
          .map(str::to_string);
        self.requests.lock().expect("lock").push(Recorded
        {   method: method.to_string()
          , path: uri.path().to_string()
          , query: uri.query().map(str::to_string)
          , authorization
          , body
        });
    }

    fn next_chat(&self) -> Canned
    {   let n = self.chat_calls.fetch_add(1, Ordering::SeqCst);
        let last = self.chat.len() - 1;
        self.chat[n.min(last)].clone()
    }
}

async fn iam(
  State(state): State<MockState>
, method: Method
, uri: Uri
, headers: HeaderMap
, body: String
) -> Response
{   state.record(method, &uri, &headers, body);
    state.iam.reply().await
}

async fn chat(
  State(state): State<MockState>
, method: Method
, uri: Uri
, headers: HeaderMap
, body: String
) -> Response
{   state.record(method, &uri, &headers, body);
    state.next_chat().reply().await
}

async fn unknown(
  State(state): State<MockState>
, method: Method
, uri: Uri
, headers: HeaderMap
, body: String
) -> Response
{   state.record(method, &uri, &headers, body);
    (StatusCode::NOT_FOUND, "no such route").into_response()
}

pub struct MockWatsonx
{   pub base_url: String
  , hits: Arc<AtomicUsize>
  , requests: Arc<Mutex<Vec<Recorded>>>
  , _server: tokio::task::JoinHandle<()>
}

impl MockWatsonx
{   /// IAM hands out `TEST_TOKEN`; both chat routes answer with `reply`.
    pub async fn start(reply: Canned) -> Self
    {   MockWatsonx::start_with(Canned::iam_token(), vec![reply]).await
    }

    pub async fn start_with_iam(iam: Canned, reply: Canned) -> Self
    {   MockWatsonx::start_with(iam, vec![reply]).await
    }

    /// Chat replies are served one per chat request, in order.
    pub async fn start_with(iam_reply: Canned, replies: Vec<Canned>) -> Self
    {   assert!(!replies.is_empty(), "at least one chat reply");
        let state = MockState
        {   hits: Arc::new(AtomicUsize::new(0))
          , requests: Arc::new(Mutex::new(Vec::new()))
          , chat_calls: Arc::new(AtomicUsize::new(0))
          , iam: Arc::new(iam_reply)
          , chat: Arc::new(replies)
        };
        let (hits, requests) = (state.hits.clone(), state.requests.clone());

        let app = Router::new()
          .route(IAM_PATH, post(iam))
          .route(CHAT_PATH, post(chat))
          .route(CHAT_STREAM_PATH, post(chat))
          .fallback(unknown)
          .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await
          .expect("bind to port 0");
        let addr = listener.local_addr().expect("get local addr");
        let server = tokio::spawn(async move {
          axum::serve(listener, app).await.ok();
        });

        MockWatsonx
        {   base_url: format!("http://127.0.0.1:{}", addr.port())
          , hits
          , requests
          , _server: server
        }
    }

    /// Number of HTTP requests received so far (IAM included).
    pub fn hits(&self) -> usize
    {   self.hits.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<Recorded>
    {   self.requests.lock().expect("lock").clone()
    }

    pub fn chat_requests(&self) -> Vec<Recorded>
    {   self.requests()
          .into_iter()
          .filter(|r| r.path != IAM_PATH)
          .collect()
    }

    /// Fully populated settings pointing at this server. The base URL
    /// is given the way an operator would paste it.
    pub fn settings(&self) -> Settings
    {   Settings::default()
          .with_api_key("test-key")
          .with_base_url(format!(
            "{}/ml/v1/text/chat?version=2024-05-01", self.base_url
          ))
          .with_project_id("proj-1")
          .with_iam_url(format!("{}{}", self.base_url, IAM_PATH))
    }
}
