//! Authentication core: credential checks, token lifecycle, lockout.

pub mod engine;
pub mod error;
pub mod ledger;
pub mod lockout;
pub mod password;
pub mod state;
pub mod tokens;
pub mod users;

pub use engine::{AuthEngine, Registration, RequestContext, Tokens};
pub use error::{AuthError, FieldError};
pub use state::AuthConfig;
pub use tokens::{Claims, TokenService};
pub use users::{AuthenticatedUser, Role};
