//! Central identity and session management: credential checks, signed session
//! tokens, and per-request identity resolution.
//! Keep the public surface thin and split implementation across sub-modules.

mod error;
mod password;
mod principal;
mod provider;
mod request_context;
mod session;
mod token;

pub use error::AuthError;
pub use password::{hash_password, verify_password};
pub use principal::{AccountView, Principal};
pub use provider::{Authenticator, LoginRequest, LoginResponse, LoginScheme, RegisterRequest};
pub use request_context::{bearer_token, IdentityResolver, RequestContext};
pub use session::{Session, SessionManager, SessionToken};
pub use token::{Claims, TokenCodec, TokenError, MIN_SECRET_LEN};
