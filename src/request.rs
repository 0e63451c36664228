//! Unified request and response types for lexbridge

use serde::{Deserialize, Serialize};
use crate::error::{Error, ErrorCategory};

/// Role tag of a conversation turn
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Role
{   System
  , User
  , Assistant
  , /// Anything else. Kept so callers can hand over untrusted
    /// conversations; the wire translation decides what to do with it.
    Other(String)
}

impl Role
{   pub fn as_str(&self) -> &str
    {   match self
        {   Role::System => "system"
          , Role::User => "user"
          , Role::Assistant => "assistant"
          , Role::Other(tag) => tag.as_str()
        }
    }

    pub fn is_recognized(&self) -> bool
    {   !matches!(self, Role::Other(_))
    }
}

impl From<&str> for Role
{   fn from(tag: &str) -> Self
    {   match tag
        {   "system" => Role::System
          , "user" => Role::User
          , "assistant" => Role::Assistant
          , other => Role::Other(other.to_string())
        }
    }
}

impl Serialize for Role
{   fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
      S: serde::Serializer
    {   serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role
{   fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
      D: serde::Deserializer<'de>
    {   let tag = String::deserialize(deserializer)?;
        Ok(Role::from(tag.as_str()))
    }
}

/// One turn of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message
{   pub role: Role
  , #[serde(rename = "content")]
    pub text: String
}

impl Message
{   pub fn new(role: impl Into<Role>, text: impl Into<String>) -> Self
    {   Message
        {   role: role.into()
          , text: text.into()
        }
    }

    pub fn user(text: impl Into<String>) -> Self
    {   Message::new(Role::User, text)
    }

    pub fn system(text: impl Into<String>) -> Self
    {   Message::new(Role::System, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self
    {   Message::new(Role::Assistant, text)
    }
}

/// Generation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodingMethod
{   Greedy
  , Sampling
}

impl std::str::FromStr for DecodingMethod
{   type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {   match s.to_ascii_lowercase().as_str()
        {   "greedy" => Ok(DecodingMethod::Greedy)
          , "sampling" => Ok(DecodingMethod::Sampling)
          , other => Err(Error::Configuration(
              format!("unknown decoding method: {}", other)
            ))
        }
    }
}

pub const MAX_TOKENS_RANGE: (u32, u32) = (100, 1000);
pub const TEMPERATURE_RANGE: (f32, f32) = (0.1, 1.0);
pub const TOP_K_RANGE: (u32, u32) = (10, 100);
pub const TOP_P_RANGE: (f32, f32) = (0.1, 1.0);

/// Generation parameters, passed to the backend unchanged
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InvocationParameters
{   pub decoding_method: DecodingMethod
  , /// Maximum number of generated tokens
    pub max_tokens: u32
  , pub temperature: f32
  , pub top_k: u32
  , pub top_p: f32
}

impl Default for InvocationParameters
{   fn default() -> Self
    {   InvocationParameters
        {   decoding_method: DecodingMethod::Greedy
          , max_tokens: 200
          , temperature: 0.5
          , top_k: 50
          , top_p: 0.5
        }
    }
}

impl InvocationParameters
{   /// Check every value against its documented bounds.
    pub fn validate(&self) -> Result<(), Error>
    {   fn check<T: PartialOrd + std::fmt::Display>(
          name: &str
        , value: T
        , (lo, hi): (T, T)
        ) -> Result<(), Error>
        {   if value < lo || value > hi
            {   return Err(Error::Configuration(format!(
                  "{} must be between {} and {}, got {}",
                  name, lo, hi, value
                )));
            }
            Ok(())
        }

        check("max_tokens", self.max_tokens, MAX_TOKENS_RANGE)?;
        // NaN slips through the range checks
        if self.temperature.is_nan() || self.top_p.is_nan()
        {   return Err(Error::Configuration(
              "temperature and top_p must be numbers".to_string()
            ));
        }
        check("temperature", self.temperature, TEMPERATURE_RANGE)?;
        check("top_k", self.top_k, TOP_K_RANGE)?;
        check("top_p", self.top_p, TOP_P_RANGE)?;
        Ok(())
    }
}

/// A failure as shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure
{   pub category: ErrorCategory
  , pub message: String
}

impl From<&Error> for Failure
{   fn from(e: &Error) -> Self
    {   Failure
        {   category: e.category()
          , message: e.diagnostic()
        }
    }
}

/// Normalized result of one invocation. Never an error value:
/// failures are already rendered for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseText
{   Text(String)
  , Failed(Failure)
}

impl ResponseText
{   pub fn text(&self) -> Option<&str>
    {   match self
        {   ResponseText::Text(text) => Some(text.as_str())
          , ResponseText::Failed(_) => None
        }
    }

    pub fn failure(&self) -> Option<&Failure>
    {   match self
        {   ResponseText::Text(_) => None
          , ResponseText::Failed(failure) => Some(failure)
        }
    }

    pub fn is_failure(&self) -> bool
    {   matches!(self, ResponseText::Failed(_))
    }

    pub fn into_text(self) -> Option<String>
    {   match self
        {   ResponseText::Text(text) => Some(text)
          , ResponseText::Failed(_) => None
        }
    }
}

impl From<Result<String, Error>> for ResponseText
{   fn from(result: Result<String, Error>) -> Self
    {   match result
        {   Ok(text) => ResponseText::Text(text)
          , Err(e) => ResponseText::Failed(Failure::from(&e))
        }
    }
}
