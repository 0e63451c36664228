//! Backend implementations

pub mod watsonx;

// Re-export for convenience
pub use watsonx::{RolePolicy, WatsonxClient};
