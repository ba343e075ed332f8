pub mod auth;

pub use auth::{extract_credentials, resolve_session, session_middleware, Credentials};
