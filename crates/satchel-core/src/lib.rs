pub mod error;
pub mod value;
pub mod config;
pub mod kv;
pub mod session;
pub mod manager;
pub mod request;

pub use error::{ConfigError, Result, SessionError};
pub use manager::{create_session_manager, BackendKind, SessionManager};
pub use session::Session;
pub use value::SessionValue;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
