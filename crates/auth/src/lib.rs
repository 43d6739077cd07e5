//! `crudforge-auth`: bearer-token and credential primitives.
//!
//! Nothing here depends on HTTP or storage: the API layer decides where tokens
//! come from and where password hashes are kept.

pub mod claims;
pub mod jwt;
pub mod password;

pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{DEFAULT_TOKEN_TTL, Hs256JwtIssuer, Hs256JwtValidator, JwtValidator, TokenError};
pub use password::{PasswordError, hash_password, verify_password};
