pub mod admin;
pub mod auth;
pub mod files;

#[cfg(test)]
pub(crate) mod test_helpers;

use axum::body::Body;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use axum_extra::extract::CookieJar;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub const SESSION_COOKIE: &str = "hashdrop_session";

pub fn router(state: AppState) -> Router {
    let gated = Router::new()
        .route(
            "/upload",
            post(files::upload).layer(DefaultBodyLimit::disable()),
        )
        .route("/browse", get(files::browse))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // Downloads stay open: knowing the digest is the capability.
    let public = Router::new()
        .route("/health", get(admin::health))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/file/{digest}", get(files::download));

    public
        .merge(gated)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn auth_middleware(
    State(state): State<AppState>,
    jar: CookieJar,
    req: Request<Body>,
    next: Next,
) -> Response {
    if !state.inner.config.auth_enabled {
        return next.run(req).await;
    }

    let authorized = jar
        .get(SESSION_COOKIE)
        .is_some_and(|cookie| state.session_valid(cookie.value()));

    if authorized {
        next.run(req).await
    } else {
        (StatusCode::UNAUTHORIZED, "login required").into_response()
    }
}
