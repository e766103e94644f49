pub mod api;
pub mod citation;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod render;
pub mod scroll;
pub mod session;
pub mod state;

// Re-export main types for convenience
pub use api::{ChatBackend, ChatClient, ChatRequest, ChatResponse};
pub use config::Config;
pub use error::{ChatError, Result};
pub use scroll::{ScrollTracker, Viewport};
pub use session::{ChatSession, SendOutcome, SessionEvent, SessionOptions};
pub use state::{ChatRole, Entry, Message, PendingFollowUp, RequestId, SessionState, View, ERROR_TEXT};
