pub mod error;
pub mod config;
pub mod providers;
pub mod request;
pub mod router;
pub mod client;
pub mod analysis;
use serde::{Deserialize, Serialize};

/*

lexbridge: the routing and response-normalization layer behind a
translation assistant. The UI hands over a conversation and a model
id; we pick the backend, call it once, and hand back display text.

lexbridge/
├── Cargo.toml
├── src/
│   ├── lib.rs          # Re-exports and shared structures
│   ├── error.rs        # Error taxonomy and diagnostics
│   ├── config.rs       # Settings snapshot (env)
│   ├── request.rs      # Message, parameters, ResponseText
│   ├── router.rs       # model id -> BackendConfig
│   ├── client.rs       # Invoker + Translator entry point
│   ├── analysis.rs     # Four-way analysis flow, line filter, summary
│   ├── providers/
│   │   ├── mod.rs
│   │   └── watsonx.rs  # Wire format, IAM, chat + stream, decoders
│   └── main.rs         # CLI
└── tests/

*/

pub use client::{InvokeEvent, Invoker, ProgressSink, Translator};
pub use config::Settings;
pub use error::{Error, ErrorCategory, ProviderFault};
pub use request::{
  DecodingMethod, Failure, InvocationParameters, Message,
  ResponseText, Role
};
pub use router::{resolve_backend, BackendConfig, Credential, Delivery};

/// LEXBRIDGE STRUCTURES:

/// Families of backends sharing one wire protocol and auth scheme.
/// Every supported model currently routes to the same family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Hash)]
pub enum BackendFamily
{   /// IBM watsonx.ai hosted inference (IAM key -> bearer token)
    Watsonx
}

/// Information about a model's capabilities and limits.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo
{   /// Model id as sent to the backend
    pub name: String
  , /// Backend family that serves it
    pub family: BackendFamily
  , /// Whether the backend can deliver the answer incrementally
    pub supports_streaming: bool
  , /// Maximum tokens the model can generate in response
    pub max_response_tokens: u32
}
