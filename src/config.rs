//! Configuration snapshot for the watsonx backend
//!
//! Read once at start-up and passed by reference into the router and
//! invoker. Nothing here is re-read during a call.

pub const ENV_API_KEY: &str = "IBM_API_KEY";
pub const ENV_BASE_URL: &str = "IBM_BASE_URL";
pub const ENV_PROJECT_ID: &str = "IBM_PROJECT_ID";
pub const ENV_MODEL_ID: &str = "IBM_MODEL_ID";
pub const ENV_IAM_URL: &str = "IBM_IAM_URL";
pub const ENV_API_VERSION: &str = "IBM_API_VERSION";
pub const ENV_TIMEOUT_SECS: &str = "IBM_TIMEOUT_SECS";
pub const ENV_STREAM: &str = "IBM_STREAM";

pub const DEFAULT_IAM_URL: &str
  = "https://iam.cloud.ibm.com/identity/token";
pub const DEFAULT_API_VERSION: &str = "2024-10-08";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Immutable settings
#[derive(Clone, PartialEq)]
pub struct Settings
{   /// API key exchanged for an IAM bearer token
    pub api_key: Option<String>
  , /// Endpoint URL as supplied by the operator (not yet normalized)
    pub base_url: Option<String>
  , /// watsonx project id
    pub project_id: Option<String>
  , /// Replaces the caller's model selection when set
    pub model_override: Option<String>
  , /// IAM token endpoint
    pub iam_url: String
  , /// `version` query parameter of the chat API
    pub api_version: String
  , /// Request timeout in seconds
    pub timeout_secs: u64
  , /// Ask for incremental delivery when the model supports it
    pub stream: bool
}

impl Settings
{   /// Snapshot the process environment.
    pub fn from_env() -> Self
    {   Settings::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
      F: Fn(&str) -> Option<String>
    {   let get = |key: &str| {
          lookup(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
        };

        let timeout_secs = get(ENV_TIMEOUT_SECS)
          .and_then(|v| {
            let parsed = v.parse::<u64>().ok();
            if parsed.is_none()
            {   log::warn!(
                  "Ignoring non-numeric {}={}", ENV_TIMEOUT_SECS, v
                );
            }
            parsed
          })
          .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let stream = get(ENV_STREAM)
          .map(|v| matches!(
            v.to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
          ))
          .unwrap_or(false);

        Settings
        {   api_key: get(ENV_API_KEY)
          , base_url: get(ENV_BASE_URL)
          , project_id: get(ENV_PROJECT_ID)
          , model_override: get(ENV_MODEL_ID)
          , iam_url: get(ENV_IAM_URL)
              .unwrap_or_else(|| DEFAULT_IAM_URL.to_string())
          , api_version: get(ENV_API_VERSION)
              .unwrap_or_else(|| DEFAULT_API_VERSION.to_string())
          , timeout_secs
          , stream
        }
    }

    /// Model that will actually be called. The operator override beats
    /// the caller's selection.
    pub fn effective_model<'a>(&'a self, selected: &'a str) -> &'a str
    {   match &self.model_override
        {   Some(model) => {
              log::debug!(
                "Model override {} replaces selection {}",
                model, selected
              );
              model.as_str()
            }
          , None => selected
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self
    {   self.api_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self
    {   self.base_url = Some(url.into());
        self
    }

    pub fn with_project_id(mut self, id: impl Into<String>) -> Self
    {   self.project_id = Some(id.into());
        self
    }

    pub fn with_iam_url(mut self, url: impl Into<String>) -> Self
    {   self.iam_url = url.into();
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self
    {   self.stream = stream;
        self
    }
}

impl Default for Settings
{   fn default() -> Self
    {   Settings::from_lookup(|_| None)
    }
}

impl std::fmt::Debug for Settings
{   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {   f.debug_struct("Settings")
          .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
          .field("base_url", &self.base_url)
          .field("project_id", &self.project_id)
          .field("model_override", &self.model_override)
          .field("iam_url", &self.iam_url)
          .field("api_version", &self.api_version)
          .field("timeout_secs", &self.timeout_secs)
          .field("stream", &self.stream)
          .finish()
    }
}
