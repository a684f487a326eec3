//! Session guard for protected routes

use crate::error::{AuthError, AuthResult};
use crate::session::{SessionUser, SESSION_COOKIE};
use crate::AuthContext;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;

/// Resolve the inbound session cookie to an identity.
///
/// `None` covers every anonymous case the same way: no cookie, an unknown
/// token, and an expired one. Callers must not tell these apart.
pub async fn current_user(ctx: &AuthContext, jar: &CookieJar) -> AuthResult<Option<SessionUser>> {
    let Some(cookie) = jar.get(SESSION_COOKIE) else {
        return Ok(None);
    };

    ctx.sessions.resolve(cookie.value()).await
}

/// Require a signed-in identity; rejects anonymous requests with a single
/// indistinct 401. The resolved user lands in the request extensions.
pub async fn require_auth(
    State(ctx): State<AuthContext>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let user = current_user(&ctx, &jar)
        .await?
        .ok_or(AuthError::NotAuthenticated)?;

    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}
