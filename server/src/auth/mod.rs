pub mod codec;
pub mod middleware;
pub mod roles;
pub mod token;

pub use middleware::{AuthRejection, Authenticator, IdentityContext, RequestMeta};
pub use roles::{RolePolicy, require_role};
pub use token::{TokenError, TokenSigner};
