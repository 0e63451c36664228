use std::fmt;

/// Sub-category of a failed provider call.
/// Only used to tell the operator where to look.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderFault
{   /// 401 / rejected credential
    Authentication
  , /// 403 / project access denied
    Permission
  , /// 404 / unknown model or endpoint
    NotFound
  , /// 400 / request rejected as malformed
    BadRequest
  , /// 429, 5xx, timeouts
    ServerOverload
  , /// Body could not be read as JSON or an SSE unit
    MalformedResponse
  , /// Anything else
    Unclassified
}

impl ProviderFault
{   /// Classify from an HTTP status code.
    pub fn from_status(status: u16) -> Self
    {   match status
        {   401 => ProviderFault::Authentication
          , 403 => ProviderFault::Permission
          , 404 => ProviderFault::NotFound
          , 400 => ProviderFault::BadRequest
          , 429 | 500..=599 => ProviderFault::ServerOverload
          , _ => ProviderFault::Unclassified
        }
    }

    /// Best-effort classification from free text, for faults that carry
    /// no status code. Checked in a fixed order; the first hit wins.
    pub fn from_text(text: &str) -> Self
    {   let lower = text.to_lowercase();
        let has = |needles: &[&str]| {
          needles.iter().any(|n| lower.contains(n))
        };
        if has(&["401", "unauthorized"])
        {   ProviderFault::Authentication
        } else if has(&["403", "forbidden"])
        {   ProviderFault::Permission
        } else if has(&["404", "not found"])
        {   ProviderFault::NotFound
        } else if has(&["400", "bad request"])
        {   ProviderFault::BadRequest
        } else if has(&["500", "timeout", "timed out", "overload"])
        {   ProviderFault::ServerOverload
        } else
        {   ProviderFault::Unclassified
        }
    }

    fn hint(&self) -> &'static str
    {   match self
        {   ProviderFault::Authentication => {
              "Authentication failed. Check IBM_API_KEY."
            }
          , ProviderFault::Permission => {
              "Access denied. Check that IBM_PROJECT_ID is correct \
               and the key has access to it."
            }
          , ProviderFault::NotFound => {
              "Model or endpoint not found. Check the model id and \
               IBM_BASE_URL."
            }
          , ProviderFault::BadRequest => {
              "The request was rejected as invalid. Check the \
               generation parameters."
            }
          , ProviderFault::ServerOverload => {
              "The service is busy or timed out. Try again shortly."
            }
          , ProviderFault::MalformedResponse => {
              "The service returned a response that could not be read."
            }
          , ProviderFault::Unclassified => "Request failed."
        }
    }
}

/// Display category of a failure, as shown next to the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory
{   Configuration
  , UnsupportedModel
  , Provider(ProviderFault)
  , EmptyResponse
}

/// Custom error type for lexbridge operations
/// Implements Clone so failures can travel through channels
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error
{   /// Missing or invalid configuration, checked before any call
    Configuration(String)
  , /// Model identifier matches no known backend
    UnsupportedModel(String)
  , /// Remote call failed
    Provider
    {   fault: ProviderFault
      , detail: String
    }
  , /// Call succeeded but yielded no text
    EmptyResponse
}

impl Error
{   pub fn provider(fault: ProviderFault, detail: impl Into<String>)
      -> Self
    {   Error::Provider
        {   fault
          , detail: detail.into()
        }
    }

    /// A provider error classified from text alone.
    pub fn unstructured(detail: impl Into<String>) -> Self
    {   let detail = detail.into();
        Error::Provider
        {   fault: ProviderFault::from_text(&detail)
          , detail
        }
    }

    pub fn category(&self) -> ErrorCategory
    {   match self
        {   Error::Configuration(_) => ErrorCategory::Configuration
          , Error::UnsupportedModel(_) => ErrorCategory::UnsupportedModel
          , Error::Provider { fault, .. } => ErrorCategory::Provider(*fault)
          , Error::EmptyResponse => ErrorCategory::EmptyResponse
        }
    }

    /// Display-ready message for the UI.
    pub fn diagnostic(&self) -> String
    {   match self
        {   Error::Provider { fault: ProviderFault::Unclassified, detail } => {
              format!("Error: {}", detail)
            }
          , Error::Provider { fault, detail } => {
              format!("{} ({})", fault.hint(), detail)
            }
          , other => format!("Error: {}", other)
        }
    }
}

impl fmt::Display for Error
{   fn fmt(&self, f: &mut fmt::Formatter<'_>)
      -> fmt::Result
    {   match self
        {   Error::Configuration(msg) => {
              write!(f, "Configuration error: {}", msg)
            }
          , Error::UnsupportedModel(model) => {
              write!(f, "Unsupported model: {}", model)
            }
          , Error::Provider { fault, detail } => {
              write!(f, "Provider error ({:?}): {}", fault, detail)
            }
          , Error::EmptyResponse => {
              write!(f, "No response received from watsonx")
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<reqwest::Error> for Error
{   fn from(e: reqwest::Error) -> Self
    {   let fault = if let Some(status) = e.status()
        {   ProviderFault::from_status(status.as_u16())
        } else if e.is_timeout()
        {   ProviderFault::ServerOverload
        } else if e.is_decode()
        {   ProviderFault::MalformedResponse
        } else
        {   ProviderFault::from_text(&e.to_string())
        };
        Error::provider(fault, e.to_string())
    }
}

impl From<serde_json::Error> for Error
{   fn from(e: serde_json::Error) -> Self
    {   Error::provider(ProviderFault::MalformedResponse, e.to_string())
    }
}
