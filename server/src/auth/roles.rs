use shared::types::claims::Role;
use tracing::{info, warn};

use crate::auth::middleware::{AuthRejection, IdentityContext};

/// Access tier attached to a guarded route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolePolicy {
    /// Any verified identity.
    Authenticated,
    AdminOrModerator,
    AdminOnly,
}

impl RolePolicy {
    pub fn allowed_roles(&self) -> &'static [Role] {
        match self {
            Self::Authenticated => &[Role::User, Role::Moderator, Role::Admin],
            Self::AdminOrModerator => &[Role::Admin, Role::Moderator],
            Self::AdminOnly => &[Role::Admin],
        }
    }

    pub fn denial_message(&self) -> &'static str {
        match self {
            Self::Authenticated => "Authentication required",
            Self::AdminOrModerator => "Administrator rights required",
            Self::AdminOnly => "Administrators only",
        }
    }

    fn is_privileged(&self) -> bool {
        !matches!(self, Self::Authenticated)
    }

    /// Check `ctx` against this tier, logging denials and privileged grants.
    pub fn check(&self, ctx: Option<&IdentityContext>, endpoint: &str) -> Result<(), AuthRejection> {
        require_role(ctx, self.allowed_roles(), self.denial_message(), endpoint)?;

        if self.is_privileged() {
            if let Some(ctx) = ctx {
                info!(
                    target: "audit",
                    kind = "privileged_access",
                    user_id = ctx.user_id,
                    role = %ctx.role,
                    endpoint,
                    "Privileged access granted"
                );
            }
        }
        Ok(())
    }
}

/// Gate on role membership. A missing identity is a 401, a role outside
/// `allowed` is a 403 carrying `denial`. Denials are audited with `endpoint`.
pub fn require_role(
    ctx: Option<&IdentityContext>,
    allowed: &[Role],
    denial: &'static str,
    endpoint: &str,
) -> Result<(), AuthRejection> {
    let Some(ctx) = ctx else {
        warn!(
            target: "audit",
            kind = "role_denied",
            user_id = Option::<i64>::None,
            role = Option::<&str>::None,
            endpoint,
            "Role check without identity"
        );
        return Err(AuthRejection::MissingCredential);
    };

    if allowed.contains(&ctx.role) {
        return Ok(());
    }

    warn!(
        target: "audit",
        kind = "role_denied",
        user_id = ctx.user_id,
        role = %ctx.role,
        endpoint,
        "Insufficient privilege"
    );
    Err(AuthRejection::InsufficientPrivilege(denial))
}
