pub mod password;
pub mod session;
pub mod tokens;

pub use password::{generate_hash, hash_password, secrets_match, verify_password, PasswordError};
pub use session::{AuthMethod, Session};
pub use tokens::{Claims, IssuedToken, TokenError, TokenKind, TokenService};
