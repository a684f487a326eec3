//! HTTP surface: ceremony endpoints, session endpoints, photo API, static
//! gallery assets, and the middleware stack.

use crate::auth_middleware::{current_user, require_auth};
use crate::challenge::CeremonyKind;
use crate::ceremony::{CeremonyOutcome, CeremonyService};
use crate::error::{AuthError, AuthResult};
use crate::photos;
use crate::session::SessionStore;
use crate::AuthContext;
use axum::{
    extract::State,
    http::header::{HeaderValue, CONTENT_TYPE, SET_COOKIE},
    middleware,
    routing::{get, patch, post},
    Json, Router,
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::security::{security_headers, security_middleware};

pub fn create_router(ctx: AuthContext) -> Router {
    // Permissive CORS during development; locked to the RP origin otherwise
    // because the session cookie rides on credentialed requests.
    let cors = if cfg!(debug_assertions) {
        CorsLayer::permissive()
    } else {
        let mut cors = CorsLayer::new()
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::PATCH,
            ])
            .allow_headers([CONTENT_TYPE])
            .allow_credentials(true);
        if let Ok(origin) = ctx.config.webauthn.rp_origin.parse::<HeaderValue>() {
            cors = cors.allow_origin(origin);
        }
        cors
    };

    let index = format!("{}/index.html", ctx.config.static_dir);

    let protected = Router::new()
        .route("/api/photos/{id}", patch(photos::update_photo))
        .route_layer(middleware::from_fn_with_state(ctx.clone(), require_auth));

    Router::new()
        // Ceremony endpoints
        .route("/api/webauthn/register/options", post(register_options))
        .route("/api/webauthn/register/verify", post(register_verify))
        .route(
            "/api/webauthn/authenticate/options",
            post(authenticate_options),
        )
        .route(
            "/api/webauthn/authenticate/verify",
            post(authenticate_verify),
        )
        // Session endpoints
        .route("/api/auth/me", get(me))
        .route("/api/auth/logout", post(logout))
        // Gallery content
        .route("/api/photos", get(photos::list_photos))
        .merge(protected)
        // Static frontend with SPA fallback
        .fallback_service(
            ServeDir::new(&ctx.config.static_dir).fallback(ServeFile::new(index)),
        )
        // Security and transport layers
        .layer(security_headers())
        .layer(middleware::from_fn(security_middleware))
        .layer(RequestBodyLimitLayer::new(1024 * 1024))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(ctx)
}

#[derive(Deserialize)]
struct RegistrationOptionsRequest {
    username: Option<String>,
    #[serde(rename = "registrationKey")]
    registration_key: Option<String>,
}

#[derive(Deserialize)]
struct AuthenticationOptionsRequest {
    username: Option<String>,
}

#[derive(Deserialize)]
struct VerifyRequest {
    username: Option<String>,
    credential: Option<Value>,
}

async fn register_options(
    State(ctx): State<AuthContext>,
    Json(req): Json<RegistrationOptionsRequest>,
) -> AuthResult<Json<Value>> {
    let username = req.username.unwrap_or_default();
    let key = req.registration_key.unwrap_or_default();

    let options = CeremonyService::new(ctx)
        .registration_options(&username, &key)
        .await?;

    Ok(Json(options))
}

async fn register_verify(
    State(ctx): State<AuthContext>,
    Json(req): Json<VerifyRequest>,
) -> AuthResult<impl axum::response::IntoResponse> {
    let outcome = verify_ceremony(ctx.clone(), CeremonyKind::Registration, req).await?;

    Ok((
        [(SET_COOKIE, session_cookie(&ctx, &outcome.token))],
        Json(json!({ "verified": true })),
    ))
}

async fn authenticate_options(
    State(ctx): State<AuthContext>,
    Json(req): Json<AuthenticationOptionsRequest>,
) -> AuthResult<Json<Value>> {
    let Some(username) = req.username else {
        return Err(AuthError::BadRequest("Missing username".to_string()));
    };

    let options = CeremonyService::new(ctx)
        .authentication_options(&username)
        .await?;

    Ok(Json(options))
}

async fn authenticate_verify(
    State(ctx): State<AuthContext>,
    Json(req): Json<VerifyRequest>,
) -> AuthResult<impl axum::response::IntoResponse> {
    let outcome = verify_ceremony(ctx.clone(), CeremonyKind::Authentication, req).await?;

    Ok((
        [(SET_COOKIE, session_cookie(&ctx, &outcome.token))],
        Json(json!({ "verified": true, "username": outcome.username })),
    ))
}

async fn me(State(ctx): State<AuthContext>, jar: CookieJar) -> AuthResult<Json<Value>> {
    match current_user(&ctx, &jar).await? {
        Some(user) => Ok(Json(json!({
            "authenticated": true,
            "username": user.username,
        }))),
        None => Ok(Json(json!({ "authenticated": false }))),
    }
}

async fn logout(
    State(ctx): State<AuthContext>,
    jar: CookieJar,
) -> AuthResult<impl axum::response::IntoResponse> {
    if let Some(cookie) = jar.get(crate::session::SESSION_COOKIE) {
        ctx.sessions.revoke(cookie.value()).await?;
    }

    Ok((
        [(SET_COOKIE, SessionStore::clearing_cookie())],
        Json(json!({ "ok": true })),
    ))
}

async fn verify_ceremony(
    ctx: AuthContext,
    kind: CeremonyKind,
    req: VerifyRequest,
) -> AuthResult<CeremonyOutcome> {
    let username = req.username.unwrap_or_default();
    let credential = req.credential.unwrap_or(Value::Null);

    CeremonyService::new(ctx)
        .verify(kind, &username, &credential)
        .await
}

fn session_cookie(ctx: &AuthContext, token: &str) -> String {
    ctx.sessions.cookie_for(token, ctx.config.secure_cookies)
}
