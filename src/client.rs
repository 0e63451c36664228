use std::time::Duration;
use tokio::sync::mpsc;
use log::{debug, error, info};

use crate::config::Settings;
use crate::error::Error;
use crate::providers::watsonx::{
  translate_messages, ChatRequest, Connection, RolePolicy, WatsonxClient
};
use crate::request::{Failure, InvocationParameters, Message, ResponseText};
use crate::router::{resolve_backend, BackendConfig, Delivery};
use crate::BackendFamily;

/// Progress of one invocation, for whoever renders it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvokeEvent
{   /// Call issued, nothing received yet
    Processing
  , /// Next piece of an incrementally delivered answer
    Chunk(String)
  , /// Final text
    Completed(String)
  , /// Final failure, already rendered
    Failed(Failure)
}

/// Receives invocation progress. Rendering lives on the other side.
pub trait ProgressSink
{   fn emit(&self, event: InvokeEvent);
}

impl ProgressSink for mpsc::UnboundedSender<InvokeEvent>
{   fn emit(&self, event: InvokeEvent)
    {   // Receiver gone means nobody is watching; the call still completes
        let _ = self.send(event);
    }
}

/// Discards progress.
impl ProgressSink for ()
{   fn emit(&self, _event: InvokeEvent) {}
}

/// Performs one remote call per invocation and turns every outcome
/// into a `ResponseText`.
#[derive(Debug, Clone)]
pub struct Invoker
{   watsonx: WatsonxClient
  , role_policy: RolePolicy
}

impl Invoker
{   pub fn new(settings: &Settings) -> Result<Self, Error>
    {   debug!("Creating Invoker (timeout {}s)", settings.timeout_secs);
        let http = reqwest::Client::builder()
          .timeout(Duration::from_secs(settings.timeout_secs))
          .build()
          .map_err(|e| {
            Error::Configuration(format!("cannot build HTTP client: {}", e))
          })?;
        Ok(Invoker
        {   watsonx: WatsonxClient::new(http)
          , role_policy: RolePolicy::default()
        })
    }

    pub fn with_role_policy(mut self, policy: RolePolicy) -> Self
    {   self.role_policy = policy;
        self
    }

    /// Call the backend once. Never returns an error: failures come
    /// back as `ResponseText::Failed` and as an `InvokeEvent::Failed`.
    pub async fn invoke<S>(
      &self
    , backend: &BackendConfig
    , model_id: &str
    , conversation: &[Message]
    , params: &InvocationParameters
    , sink: &S
    ) -> ResponseText
    where
      S: ProgressSink + ?Sized
    {   sink.emit(InvokeEvent::Processing);

        let result = self
          .try_invoke(backend, model_id, conversation, params, sink)
          .await;

        match &result
        {   Ok(text) => {
              info!("{} answered ({} chars)", model_id, text.len());
              sink.emit(InvokeEvent::Completed(text.clone()));
            }
          , Err(e) => {
              error!("watsonx error for {}: {}", model_id, e);
              sink.emit(InvokeEvent::Failed(Failure::from(e)));
            }
        }
        ResponseText::from(result)
    }

    async fn try_invoke<S>(
      &self
    , backend: &BackendConfig
    , model_id: &str
    , conversation: &[Message]
    , params: &InvocationParameters
    , sink: &S
    ) -> Result<String, Error>
    where
      S: ProgressSink + ?Sized
    {   let connection = Connection::from_backend(backend)?;
        params.validate()?;
        let messages = translate_messages(conversation, self.role_policy)?;
        let request
          = ChatRequest::new(model_id, &connection, messages, params);

        match backend.family
        {   BackendFamily::Watsonx => match backend.delivery
            {   Delivery::Complete => {
                  self.watsonx.chat(&connection, &request).await
                }
              , Delivery::Incremental => {
                  self.watsonx
                    .chat_stream(&connection, &request, |fragment| {
                      sink.emit(InvokeEvent::Chunk(fragment.to_string()))
                    })
                    .await
                }
            }
        }
    }
}

/// Entry point used by the UI: applies the operator override, routes,
/// and invokes.
#[derive(Debug, Clone)]
pub struct Translator
{   settings: Settings
  , invoker: Invoker
}

impl Translator
{   pub fn new(settings: Settings) -> Result<Self, Error>
    {   let invoker = Invoker::new(&settings)?;
        Ok(Translator
        {   settings
          , invoker
        })
    }

    pub fn with_role_policy(mut self, policy: RolePolicy) -> Self
    {   self.invoker = self.invoker.with_role_policy(policy);
        self
    }

    pub fn settings(&self) -> &Settings
    {   &self.settings
    }

    /// Run `conversation` against `model_name` (or the override).
    pub async fn respond<S>(
      &self
    , conversation: &[Message]
    , model_name: &str
    , params: &InvocationParameters
    , sink: &S
    ) -> ResponseText
    where
      S: ProgressSink + ?Sized
    {   let model_id = self.settings.effective_model(model_name);
        debug!("respond: selected={} effective={}", model_name, model_id);

        match resolve_backend(&self.settings, model_id)
        {   Ok(backend) => {
              self.invoker
                .invoke(&backend, model_id, conversation, params, sink)
                .await
            }
          , Err(e) => {
              let failure = Failure::from(&e);
              sink.emit(InvokeEvent::Failed(failure.clone()));
              ResponseText::Failed(failure)
            }
        }
    }
}
