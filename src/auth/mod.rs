//! Authentication core
//!
//! Credential lifecycle for password-based login.
//! - Stateless signed access tokens (HS256 JWT)
//! - Rotating opaque refresh tokens with replay detection
//! - Single-use password reset codes

mod error;
mod jwt;
mod keys;
pub mod opaque;
pub mod password;
mod refresh;
mod reset;
mod service;

pub use error::AuthError;
pub use jwt::{AccessClaims, AccessTokenCodec, TokenError};
pub use keys::{KeyError, SigningKeys, MIN_SECRET_LEN};
pub use opaque::OpaqueToken;
pub use password::{hash_password, verify_password, PasswordError};
pub use refresh::{IssuedRefreshToken, Redemption, RefreshTokenStore};
pub use reset::PasswordResetFlow;
pub use service::{AuthBackends, AuthService, AuthSettings, PurgeReport};
