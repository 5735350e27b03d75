pub mod analysis;
pub mod api;
pub mod envconfig;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod models;
pub mod relay;
pub mod server;
pub mod template;
pub mod validate;

pub use api::{ByteStream, Client, InferenceEngine};
pub use envconfig::{EngineConfig, EnvConfig, Host};
pub use error::{Error, Result};
pub use extract::{extract, Extraction, FallbackReason};
pub use models::{
    ChatMessage, Condition, ConfidenceScore, Insight, InsightCategory, Role, Severity,
    StructuredAnalysis,
};
pub use relay::{LineDecoder, Relay, RelayState, StreamEvent};
pub use validate::{validate, Rejection, ValidationOutcome};
