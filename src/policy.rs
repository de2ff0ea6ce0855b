//! Access policies.
//!
//! Every endpoint names one [`Policy`]. A request is admitted when the
//! request-level predicate holds and, when a concrete record is involved, the
//! object-level predicate holds for that record as well. Both predicates are pure
//! functions of an explicit [`RequestContext`]; nothing is read from ambient state.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{Method, request::Parts},
};

use crate::{
    auth::{AuthUser, resolve_actor},
    config::AppConfig,
    error::{AppError, AppResult},
    models::{Comment, Review, Role, User},
    repository::RepositoryState,
};

/// Read-only methods. These never change state.
pub fn is_safe_method(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// RequestContext
///
/// The inputs of an access decision: the HTTP method and the resolved actor,
/// if the request carried valid credentials.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub actor: Option<AuthUser>,
}

impl RequestContext {
    pub fn new(method: Method, actor: Option<AuthUser>) -> Self {
        Self { method, actor }
    }

    pub fn anonymous(method: Method) -> Self {
        Self::new(method, None)
    }

    pub fn is_safe(&self) -> bool {
        is_safe_method(&self.method)
    }

    pub fn is_authenticated(&self) -> bool {
        self.actor.is_some()
    }

    fn role(&self) -> Option<Role> {
        self.actor.as_ref().map(AuthUser::effective_role)
    }

    fn has_role(&self, role: Role) -> bool {
        self.role().is_some_and(|r| r.at_least(role))
    }

    fn is_author_of(&self, target: &impl Authored) -> bool {
        self.actor
            .as_ref()
            .is_some_and(|actor| actor.id == target.author_id())
    }

    /// The authenticated actor, or `Unauthorized`.
    pub fn require_actor(&self) -> AppResult<&AuthUser> {
        self.actor.as_ref().ok_or(AppError::Unauthorized)
    }
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let actor = resolve_actor(parts, state).await?;
        Ok(RequestContext::new(parts.method.clone(), actor))
    }
}

/// Anything with an owning user, for object-level checks.
pub trait Authored {
    fn author_id(&self) -> i64;
}

impl Authored for Review {
    fn author_id(&self) -> i64 {
        self.author_id
    }
}

impl Authored for Comment {
    fn author_id(&self) -> i64 {
        self.author_id
    }
}

/// A user record is "authored" by itself.
impl Authored for User {
    fn author_id(&self) -> i64 {
        self.id
    }
}

/// Decision
///
/// Outcome of one predicate. A denial distinguishes a missing actor from an
/// actor without sufficient rights.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Unauthenticated,
    Forbidden,
}

impl Decision {
    fn from_predicate(allowed: bool, ctx: &RequestContext) -> Self {
        if allowed {
            Decision::Allow
        } else if ctx.is_authenticated() {
            Decision::Forbidden
        } else {
            Decision::Unauthenticated
        }
    }

    pub fn into_result(self) -> AppResult<()> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Unauthenticated => Err(AppError::Unauthorized),
            Decision::Forbidden => Err(AppError::Forbidden),
        }
    }
}

/// Policy
///
/// | policy                 | request-level            | object-level                             |
/// |------------------------|--------------------------|------------------------------------------|
/// | `AuthorOrAdmin`        | authenticated            | safe, author or admin                    |
/// | `AdminOnly`            | admin                    | always (request-level already held)      |
/// | `ReadOnlyOrAdmin`      | safe or admin            | always                                   |
/// | `AuthorModeratorAdmin` | safe or authenticated    | safe, author, moderator or admin         |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    AuthorOrAdmin,
    AdminOnly,
    ReadOnlyOrAdmin,
    AuthorModeratorAdmin,
}

impl Policy {
    /// Can the endpoint be invoked at all.
    pub fn evaluate_request(self, ctx: &RequestContext) -> Decision {
        let allowed = match self {
            Policy::AuthorOrAdmin => ctx.is_authenticated(),
            Policy::AdminOnly => ctx.has_role(Role::Admin),
            Policy::ReadOnlyOrAdmin => ctx.is_safe() || ctx.has_role(Role::Admin),
            Policy::AuthorModeratorAdmin => ctx.is_safe() || ctx.is_authenticated(),
        };
        Decision::from_predicate(allowed, ctx)
    }

    /// Can the endpoint be invoked on `target`.
    pub fn evaluate_object(self, ctx: &RequestContext, target: &impl Authored) -> Decision {
        let allowed = match self {
            Policy::AuthorOrAdmin => {
                ctx.is_safe() || ctx.is_author_of(target) || ctx.has_role(Role::Admin)
            }
            Policy::AdminOnly | Policy::ReadOnlyOrAdmin => true,
            Policy::AuthorModeratorAdmin => {
                ctx.is_safe() || ctx.is_author_of(target) || ctx.has_role(Role::Moderator)
            }
        };
        Decision::from_predicate(allowed, ctx)
    }

    pub fn check_request(self, ctx: &RequestContext) -> AppResult<()> {
        let decision = self.evaluate_request(ctx);
        if decision != Decision::Allow {
            tracing::debug!(policy = ?self, method = %ctx.method, ?decision, "request denied");
        }
        decision.into_result()
    }

    pub fn check_object(self, ctx: &RequestContext, target: &impl Authored) -> AppResult<()> {
        let decision = self.evaluate_object(ctx, target);
        if decision != Decision::Allow {
            tracing::debug!(
                policy = ?self,
                method = %ctx.method,
                author_id = target.author_id(),
                ?decision,
                "object access denied"
            );
        }
        decision.into_result()
    }
}
