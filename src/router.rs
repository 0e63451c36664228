//! Model id -> backend routing

use log::{debug, error};
use crate::config::Settings;
use crate::error::Error;
use crate::{BackendFamily, ModelInfo};

/// Models offered in the model picker.
pub const MODEL_CATALOG: [&str; 6] =
[   "ibm/granite-4-h-small"
  , "meta-llama/llama-3-2-11b-vision-instruct"
  , "meta-llama/llama-3-2-90b-vision-instruct"
  , "meta-llama/llama-3-3-70b-instruct"
  , "meta-llama/llama-4-maverick-17b-128e-instruct-fp8"
  , "mistralai/mistral-medium-2505"
];

/// Vendor namespaces hosted by watsonx. Ids outside the catalog that
/// start with one of these are still routed there.
pub const WATSONX_VENDOR_PREFIXES: [&str; 3] =
[   "ibm/"
  , "meta-llama/"
  , "mistralai/"
];

/// API key, kept out of Debug output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential
{   pub fn new(key: impl Into<String>) -> Self
    {   Credential(key.into())
    }

    pub fn expose(&self) -> &str
    {   &self.0
    }
}

impl std::fmt::Debug for Credential
{   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {   write!(f, "Credential(<redacted>)")
    }
}

/// How the response body is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery
{   /// One JSON document
    Complete
  , /// SSE stream of JSON units
    Incremental
}

/// Connection parameters for one call. Required fields stay optional
/// here; the invoker checks them before sending anything.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendConfig
{   pub family: BackendFamily
  , /// Endpoint URL as configured, normalized by the invoker
    pub endpoint: Option<String>
  , pub credential: Option<Credential>
  , /// watsonx project id
    pub project_id: Option<String>
  , pub iam_url: String
  , pub api_version: String
  , pub delivery: Delivery
}

impl BackendConfig
{   /// Names of required fields that are missing, in a fixed order.
    pub fn missing_fields(&self) -> Vec<&'static str>
    {   let mut missing = vec![];
        if self.credential.is_none()
        {   missing.push(crate::config::ENV_API_KEY);
        }
        if self.endpoint.is_none()
        {   missing.push(crate::config::ENV_BASE_URL);
        }
        if self.project_id.is_none()
        {   missing.push(crate::config::ENV_PROJECT_ID);
        }
        missing
    }
}

/// Capability record for a model id, or `None` if no backend serves it.
pub fn model_info(model_id: &str) -> Option<ModelInfo>
{   if MODEL_CATALOG.contains(&model_id)
    {   return Some(ModelInfo
        {   name: model_id.to_string()
          , family: BackendFamily::Watsonx
          , supports_streaming: true
          , max_response_tokens: 1000
        });
    }

    let prefixed = WATSONX_VENDOR_PREFIXES
      .iter()
      .any(|prefix| {
        model_id.len() > prefix.len() && model_id.starts_with(prefix)
      });
    if prefixed
    {   // Not vetted: stay with one-shot delivery
        return Some(ModelInfo
        {   name: model_id.to_string()
          , family: BackendFamily::Watsonx
          , supports_streaming: false
          , max_response_tokens: 1000
        });
    }

    None
}

/// Decide which backend handles `model_id` and gather its connection
/// parameters from `settings`.
///
/// The caller is expected to have applied the operator override
/// (`Settings::effective_model`) already.
pub fn resolve_backend(settings: &Settings, model_id: &str)
  -> Result<BackendConfig, Error>
{   let info = model_info(model_id).ok_or_else(|| {
      error!("No backend for model: {}", model_id);
      Error::UnsupportedModel(model_id.to_string())
    })?;

    let delivery = if settings.stream && info.supports_streaming
    {   Delivery::Incremental
    } else
    {   Delivery::Complete
    };

    debug!(
      "Routing {} to {:?} ({:?} delivery)",
      model_id, info.family, delivery
    );

    match info.family
    {   BackendFamily::Watsonx => Ok(BackendConfig
        {   family: BackendFamily::Watsonx
          , endpoint: settings.base_url.clone()
          , credential: settings.api_key.clone().map(Credential::new)
          , project_id: settings.project_id.clone()
          , iam_url: settings.iam_url.clone()
          , api_version: settings.api_version.clone()
          , delivery
        })
    }
}
