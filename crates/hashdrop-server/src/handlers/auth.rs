use axum::extract::State;
use axum::http::StatusCode;
use axum::Form;
use axum_extra::extract::cookie::{Cookie, SameSite};
use axum_extra::extract::CookieJar;
use serde::Deserialize;
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use super::SESSION_COOKIE;
use crate::error::ServerError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct LoginForm {
    pub password: String,
}

/// POST /login: exchange the shared password for a session cookie.
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<(CookieJar, StatusCode), ServerError> {
    if !state.inner.config.auth_enabled {
        return Ok((jar, StatusCode::NO_CONTENT));
    }

    let expected = state.inner.config.password.as_bytes();
    if !bool::from(form.password.as_bytes().ct_eq(expected)) {
        warn!("rejected login attempt");
        return Err(ServerError::Unauthorized("invalid password".into()));
    }

    let token = state.create_session();
    let cookie = Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();
    info!(sessions = state.session_count(), "login accepted");
    Ok((jar.add(cookie), StatusCode::NO_CONTENT))
}

/// POST /logout: drop the caller's session, if any.
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, StatusCode) {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.revoke_session(cookie.value());
    }
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use axum::http::{header, StatusCode};

    use super::super::test_helpers::*;

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let (router, state, _tmp) = setup_app(true).await;
        let resp = post_form(router, "/login", "password=nope").await;
        assert_status(&resp, StatusCode::UNAUTHORIZED);
        assert!(resp.headers().get(header::SET_COOKIE).is_none());
        assert_eq!(state.session_count(), 0);
    }

    #[tokio::test]
    async fn login_sets_http_only_cookie() {
        let (router, state, _tmp) = setup_app(true).await;
        let resp = post_form(router, "/login", &format!("password={TEST_PASSWORD}")).await;
        assert_status(&resp, StatusCode::NO_CONTENT);

        let set_cookie = resp
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(set_cookie.starts_with("hashdrop_session="));
        assert!(set_cookie.contains("HttpOnly"));
        assert_eq!(state.session_count(), 1);
    }

    #[tokio::test]
    async fn session_grants_access_until_logout() {
        let (router, state, _tmp) = setup_app(true).await;
        let cookie = login_cookie(router.clone()).await;

        let resp = get(router.clone(), "/browse", Some(&cookie)).await;
        assert_status(&resp, StatusCode::OK);

        let resp = post_with_cookie(router.clone(), "/logout", &cookie).await;
        assert_status(&resp, StatusCode::NO_CONTENT);
        assert_eq!(state.session_count(), 0);

        let resp = get(router, "/browse", Some(&cookie)).await;
        assert_status(&resp, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn forged_cookie_is_rejected() {
        let (router, _state, _tmp) = setup_app(true).await;
        let resp = get(router, "/browse", Some("hashdrop_session=deadbeef")).await;
        assert_status(&resp, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn login_is_a_no_op_without_auth() {
        let (router, state, _tmp) = setup_app(false).await;
        let resp = post_form(router, "/login", "password=anything").await;
        assert_status(&resp, StatusCode::NO_CONTENT);
        assert_eq!(state.session_count(), 0);
    }
}
