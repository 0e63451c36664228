use serde::{Deserialize, Serialize};
use serde_json::Value;
use futures::StreamExt;
use log::{debug, trace, error, warn};

use crate::error::{Error, ProviderFault};
use crate::request::{DecodingMethod, InvocationParameters, Message, Role};
use crate::router::{BackendConfig, Credential};

/// Path segments that mark the start of an API path in a pasted URL.
/// Everything from the first marker on is dropped.
pub const API_PATH_MARKERS: [&str; 2] = ["/ml/v1", "/ml/v4"];

const CHAT_PATH: &str = "/ml/v1/text/chat";
const CHAT_STREAM_PATH: &str = "/ml/v1/text/chat_stream";
const IAM_GRANT_TYPE: &str = "urn:ibm:params:oauth:grant-type:apikey";

// ===== Endpoint =====

/// Reduce an operator-supplied URL to the service base URL: no query,
/// no fragment, no API path, no trailing slash. Idempotent.
pub fn normalize_endpoint(raw: &str) -> Result<String, Error>
{   let mut url = url::Url::parse(raw.trim()).map_err(|e| {
      Error::Configuration(format!("invalid endpoint URL {:?}: {}", raw, e))
    })?;

    if url.scheme() != "https" && url.scheme() != "http"
    {   return Err(Error::Configuration(format!(
          "endpoint URL must be http(s): {}", raw
        )));
    }

    url.set_query(None);
    url.set_fragment(None);

    let path = url.path().to_string();
    let cut = API_PATH_MARKERS
      .iter()
      .filter_map(|marker| path.find(marker))
      .min()
      .unwrap_or(path.len());
    url.set_path(path[..cut].trim_end_matches('/'));

    Ok(url.as_str().trim_end_matches('/').to_string())
}

/// Validated connection parameters for one call.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection
{   pub base_url: String
  , pub credential: Credential
  , pub project_id: String
  , pub iam_url: String
  , pub api_version: String
}

impl Connection
{   /// Check required fields and normalize the endpoint. No I/O.
    pub fn from_backend(backend: &BackendConfig) -> Result<Self, Error>
    {   let missing = backend.missing_fields();
        if !missing.is_empty()
        {   return Err(Error::Configuration(format!(
              "missing required settings: {}",
              missing.join(", ")
            )));
        }

        match (&backend.endpoint, &backend.credential, &backend.project_id)
        {   (Some(endpoint), Some(credential), Some(project_id)) => {
              Ok(Connection
              {   base_url: normalize_endpoint(endpoint)?
                , credential: credential.clone()
                , project_id: project_id.clone()
                , iam_url: backend.iam_url.clone()
                , api_version: backend.api_version.clone()
              })
            }
          , _ => Err(Error::Configuration(
              "incomplete backend configuration".to_string()
            ))
        }
    }
}

// ===== Message Types =====

/// What to do with turns whose role the backend does not know.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RolePolicy
{   /// Leave them out of the request and log a warning
    #[default]
    Skip
  , /// Fail the call before anything is sent
    Reject
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPart
{   #[serde(rename = "type")]
    pub kind: String
  , pub text: String
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireContent
{   Text(String)
  , Parts(Vec<ContentPart>)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage
{   pub role: String
  , pub content: WireContent
}

/// Translate a conversation into the chat wire shape. User turns carry
/// a content-part array; system and assistant turns carry plain text.
pub fn translate_messages(
  conversation: &[Message]
, policy: RolePolicy
) -> Result<Vec<WireMessage>, Error>
{   let mut wire = Vec::with_capacity(conversation.len());
    for (index, message) in conversation.iter().enumerate()
    {   let content = match &message.role
        {   Role::User => WireContent::Parts(vec![
              ContentPart
              {   kind: "text".to_string()
                , text: message.text.clone()
              }
            ])
          , Role::System | Role::Assistant => {
              WireContent::Text(message.text.clone())
            }
          , Role::Other(tag) => match policy
            {   RolePolicy::Skip => {
                  warn!(
                    "Dropping message {} with unknown role {:?}",
                    index, tag
                  );
                  continue;
                }
              , RolePolicy::Reject => {
                  return Err(Error::Configuration(format!(
                    "message {} has unknown role {:?}", index, tag
                  )));
                }
            }
        };
        wire.push(WireMessage
        {   role: message.role.as_str().to_string()
          , content
        });
    }
    Ok(wire)
}

/// Chat request body
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest
{   pub model_id: String
  , pub project_id: String
  , pub messages: Vec<WireMessage>
  , pub decoding_method: DecodingMethod
  , pub max_tokens: u32
  , pub temperature: f32
  , pub top_k: u32
  , pub top_p: f32
}

impl ChatRequest
{   pub fn new(
      model_id: &str
    , connection: &Connection
    , messages: Vec<WireMessage>
    , params: &InvocationParameters
    ) -> Self
    {   ChatRequest
        {   model_id: model_id.to_string()
          , project_id: connection.project_id.clone()
          , messages
          , decoding_method: params.decoding_method
          , max_tokens: params.max_tokens
          , temperature: params.temperature
          , top_k: params.top_k
          , top_p: params.top_p
        }
    }
}

#[derive(Debug, Deserialize)]
struct IamToken
{   access_token: String
}

// ===== Response normalization =====

#[derive(Debug, Deserialize)]
struct ChatResponse
{   choices: Vec<Choice>
}

#[derive(Debug, Deserialize)]
struct Choice
{   message: ChoiceMessage
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage
{   content: String
}

/// Candidate response shapes, tried in `ResponseShape::ORDER`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape
{   /// `{choices: [{message: {content: "..."}}, ..]}`, strictly typed
    Typed
  , /// Anything with a non-empty `choices` array, read loosely
    Mapping
  , /// Whatever came back, as text
    Stringified
}

impl ResponseShape
{   pub const ORDER: [ResponseShape; 3] =
    [   ResponseShape::Typed
      , ResponseShape::Mapping
      , ResponseShape::Stringified
    ];

    /// `Some(text)` if `value` has this shape. Never fails.
    pub fn decode(&self, value: &Value) -> Option<String>
    {   match self
        {   ResponseShape::Typed => {
              let response = ChatResponse::deserialize(value).ok()?;
              response.choices
                .into_iter()
                .next()
                .map(|choice| choice.message.content)
            }
          , ResponseShape::Mapping => {
              let choice = value.get("choices")?.as_array()?.first()?;
              match choice.get("message")
              {   Some(message) => {
                    Some(content_text(message.get("content")))
                  }
                , None => Some(value_text(choice))
              }
            }
          , ResponseShape::Stringified => match value
            {   Value::Null => None
              , other => Some(value_text(other))
            }
        }
    }
}

fn value_text(value: &Value) -> String
{   match value
    {   Value::String(s) => s.clone()
      , other => other.to_string()
    }
}

fn content_text(content: Option<&Value>) -> String
{   match content
    {   None | Some(Value::Null) => String::new()
      , Some(Value::Array(parts)) => parts
          .iter()
          .filter_map(|part| match part
          {   Value::String(s) => Some(s.as_str())
            , other => other.get("text").and_then(Value::as_str)
          })
          .collect::<Vec<_>>()
          .join("")
      , Some(other) => value_text(other)
    }
}

/// Flatten a response body to text. The first matching shape wins.
pub fn normalize_response(value: &Value)
  -> Option<(ResponseShape, String)>
{   ResponseShape::ORDER
      .iter()
      .find_map(|shape| shape.decode(value).map(|text| (*shape, text)))
}

/// Pull the human-readable part out of an error body, if it is one.
/// watsonx nests it in `errors[0].message`; IAM uses `errorMessage`.
fn error_message(body: &str) -> String
{   serde_json::from_str::<Value>(body)
      .ok()
      .and_then(|v| {
        let nested = v.get("errors")
          .and_then(Value::as_array)
          .and_then(|errors| errors.first())
          .and_then(|first| first.get("message"));
        nested
          .or_else(|| v.get("errorMessage"))?
          .as_str()
          .map(str::to_string)
      })
      .unwrap_or_else(|| body.trim().to_string())
}

// ===== Streaming =====

/// Collects fragments from a `chat_stream` SSE body.
#[derive(Debug, Default)]
pub struct StreamAccumulator
{   text: String
  , done: bool
}

impl StreamAccumulator
{   pub fn new() -> Self
    {   StreamAccumulator::default()
    }

    /// Feed one SSE line. Returns the content fragment it carried, if
    /// any. Non-data lines are ignored.
    pub fn feed_line(&mut self, line: &str)
      -> Result<Option<String>, Error>
    {   let line = line.trim_end_matches('\r');
        let payload = match line.strip_prefix("data:")
        {   Some(payload) => payload.trim()
          , None => return Ok(None)
        };
        if payload.is_empty()
        {   return Ok(None);
        }
        if payload == "[DONE]"
        {   self.done = true;
            return Ok(None);
        }

        let unit: Value = serde_json::from_str(payload)?;
        trace!("stream unit: {}", unit);

        if let Some(errors) = unit.get("errors")
        {   let fault = unit.get("status_code")
              .and_then(Value::as_u64)
              .and_then(|code| u16::try_from(code).ok())
              .map(ProviderFault::from_status)
              .unwrap_or_else(|| ProviderFault::from_text(&errors.to_string()));
            return Err(Error::provider(fault, error_message(payload)));
        }

        let choice = unit.get("choices")
          .and_then(Value::as_array)
          .and_then(|choices| choices.first());

        let fragment = choice
          .and_then(|c| c.get("delta"))
          .and_then(|d| d.get("content"))
          .and_then(Value::as_str)
          .filter(|s| !s.is_empty())
          .map(str::to_string);

        if let Some(fragment) = &fragment
        {   self.text.push_str(fragment);
        }

        let finished = choice
          .and_then(|c| c.get("finish_reason"))
          .map_or(false, |reason| !reason.is_null());
        if finished
        {   self.done = true;
        }

        Ok(fragment)
    }

    pub fn is_done(&self) -> bool
    {   self.done
    }

    pub fn text(&self) -> &str
    {   &self.text
    }

    pub fn into_text(self) -> String
    {   self.text
    }
}

// ===== watsonx client =====

/// Performs watsonx chat calls. Holds no per-call state.
#[derive(Debug, Clone)]
pub struct WatsonxClient
{   http: reqwest::Client
}

impl WatsonxClient
{   pub fn new(http: reqwest::Client) -> Self
    {   WatsonxClient { http }
    }

    /// Exchange the API key for a bearer token.
    pub async fn fetch_token(&self, connection: &Connection)
      -> Result<String, Error>
    {   debug!("Requesting IAM token from {}", connection.iam_url);
        let response = self.http
          .post(&connection.iam_url)
          .header("Accept", "application/json")
          .form(&[
            ("grant_type", IAM_GRANT_TYPE),
            ("apikey", connection.credential.expose()),
          ])
          .send()
          .await?;

        let response
          = check_status(response, "IAM token", iam_fault).await?;
        let token: IamToken = response.json().await?;
        Ok(token.access_token)
    }

    /// One-shot chat call, normalized to text.
    pub async fn chat(
      &self
    , connection: &Connection
    , request: &ChatRequest
    ) -> Result<String, Error>
    {   let token = self.fetch_token(connection).await?;
        let url = format!("{}{}", connection.base_url, CHAT_PATH);
        debug!("POST {} model={}", url, request.model_id);
        trace!("watsonx request: {:?}", request);

        let response = self.http
          .post(&url)
          .query(&[("version", connection.api_version.as_str())])
          .bearer_auth(&token)
          .header("Accept", "application/json")
          .json(request)
          .send()
          .await?;

        let response = check_status(
          response, "chat", ProviderFault::from_status
        ).await?;
        let body = response.text().await?;
        trace!("watsonx response: {}", body);

        let value: Value = serde_json::from_str(&body)?;
        match normalize_response(&value)
        {   Some((shape, text)) if !text.trim().is_empty() => {
              debug!("Response decoded as {:?}", shape);
              Ok(text)
            }
          , _ => {
              error!("No text in watsonx response");
              Err(Error::EmptyResponse)
            }
        }
    }

    /// Streamed chat call. Every fragment is passed to `on_fragment` as
    /// it arrives; the full text is returned at the end.
    pub async fn chat_stream<F>(
      &self
    , connection: &Connection
    , request: &ChatRequest
    , mut on_fragment: F
    ) -> Result<String, Error>
    where
      F: FnMut(&str)
    {   let token = self.fetch_token(connection).await?;
        let url = format!("{}{}", connection.base_url, CHAT_STREAM_PATH);
        debug!("POST {} (stream) model={}", url, request.model_id);
        trace!("watsonx request: {:?}", request);

        let response = self.http
          .post(&url)
          .query(&[("version", connection.api_version.as_str())])
          .bearer_auth(&token)
          .header("Accept", "text/event-stream")
          .json(request)
          .send()
          .await?;

        let response = check_status(
          response, "chat_stream", ProviderFault::from_status
        ).await?;

        let mut accumulator = StreamAccumulator::new();
        let mut pending: Vec<u8> = Vec::new();
        let mut body = response.bytes_stream();

        'read: while let Some(chunk) = body.next().await
        {   pending.extend_from_slice(&chunk?);
            while let Some(pos) = pending.iter().position(|b| *b == b'\n')
            {   let line: Vec<u8> = pending.drain(..=pos).collect();
                let line = decode_line(&line[..line.len() - 1])?;
                if let Some(fragment) = accumulator.feed_line(&line)?
                {   on_fragment(&fragment);
                }
                if accumulator.is_done()
                {   break 'read;
                }
            }
        }

        if !accumulator.is_done() && !pending.is_empty()
        {   let line = decode_line(&pending)?;
            if let Some(fragment) = accumulator.feed_line(&line)?
            {   on_fragment(&fragment);
            }
        }

        let text = accumulator.into_text();
        if text.trim().is_empty()
        {   error!("Stream ended without text");
            return Err(Error::EmptyResponse);
        }
        Ok(text)
    }
}

fn decode_line(bytes: &[u8]) -> Result<String, Error>
{   String::from_utf8(bytes.to_vec()).map_err(|e| {
      Error::provider(
        ProviderFault::MalformedResponse,
        format!("invalid UTF-8 in stream: {}", e)
      )
    })
}

/// Any refusal of the token request is an authentication failure
/// (a bad key comes back as 400). 429 and 5xx stay overload.
fn iam_fault(status: u16) -> ProviderFault
{   match ProviderFault::from_status(status)
    {   ProviderFault::ServerOverload => ProviderFault::ServerOverload
      , _ => ProviderFault::Authentication
    }
}

/// Turn a non-success status into a provider error classified by `fault`.
async fn check_status(
  response: reqwest::Response
, what: &str
, fault: fn(u16) -> ProviderFault
) -> Result<reqwest::Response, Error>
{   let status = response.status();
    trace!("{} response status: {}", what, status);
    if status.is_success()
    {   return Ok(response);
    }

    let body = response.text().await
      .unwrap_or_else(|_| "Unknown error".to_string());
    error!("watsonx {} error {}: {}", what, status, body);
    Err(Error::provider(
      fault(status.as_u16()),
      format!("{} {}: {}", what, status, error_message(&body))
    ))
}
