use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use hashdrop_core::config::StorageConfig;
use hashdrop_core::Vault;
use tower::ServiceExt;

use crate::config::ServerSection;
use crate::state::AppState;

pub const TEST_PASSWORD: &str = "test-password";
const BOUNDARY: &str = "hashdrop-test-boundary";

/// One part of a multipart/form-data body.
pub struct Part<'a> {
    pub name: &'a str,
    pub filename: Option<&'a str>,
    pub data: &'a [u8],
}

impl<'a> Part<'a> {
    pub fn file(name: &'a str, filename: &'a str, data: &'a [u8]) -> Self {
        Self {
            name,
            filename: Some(filename),
            data,
        }
    }

    pub fn text(name: &'a str, value: &'a str) -> Self {
        Self {
            name,
            filename: None,
            data: value.as_bytes(),
        }
    }
}

/// Create a wired-up router and AppState backed by a temp directory.
pub async fn setup_app(auth_enabled: bool) -> (Router, AppState, tempfile::TempDir) {
    let tmp = tempfile::tempdir().expect("create tempdir");

    let config = ServerSection {
        data_dir: tmp.path().to_string_lossy().into_owned(),
        auth_enabled,
        password: TEST_PASSWORD.to_string(),
        ..Default::default()
    };

    let vault = Vault::open(&StorageConfig::new(tmp.path()))
        .await
        .expect("open vault");
    let state = AppState::new(config, vault);
    let router = super::router(state.clone());
    (router, state, tmp)
}

/// Log in with the test password and return the `name=value` cookie pair.
pub async fn login_cookie(router: Router) -> String {
    let resp = post_form(router, "/login", &format!("password={TEST_PASSWORD}")).await;
    assert_status(&resp, StatusCode::NO_CONTENT);
    resp.headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .expect("session cookie")
        .to_string()
}

/// Send a GET request, optionally carrying a cookie.
pub async fn get(router: Router, path: &str, cookie: Option<&str>) -> axum::response::Response {
    let mut builder = Request::builder().method("GET").uri(path);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    router
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

/// Send a url-encoded form POST.
pub async fn post_form(router: Router, path: &str, body: &str) -> axum::response::Response {
    let req = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap();

    router.oneshot(req).await.unwrap()
}

/// Send an empty POST carrying a cookie.
pub async fn post_with_cookie(router: Router, path: &str, cookie: &str) -> axum::response::Response {
    let req = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap();

    router.oneshot(req).await.unwrap()
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        let disposition = match part.filename {
            Some(filename) => format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{filename}\"\r\n",
                part.name
            ),
            None => format!("Content-Disposition: form-data; name=\"{}\"\r\n", part.name),
        };
        body.extend_from_slice(disposition.as_bytes());
        if part.filename.is_some() {
            body.extend_from_slice(b"Content-Type: application/octet-stream\r\n");
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(part.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// POST a multipart body to /upload.
pub async fn upload_parts(
    router: Router,
    cookie: Option<&str>,
    parts: &[Part<'_>],
) -> axum::response::Response {
    let body = multipart_body(parts);
    let mut builder = Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .header(header::CONTENT_LENGTH, body.len().to_string());
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    router
        .oneshot(builder.body(Body::from(body)).unwrap())
        .await
        .unwrap()
}

/// Read full response body into `Vec<u8>`.
pub async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("collect body")
        .to_vec()
}

/// Assert response has expected status.
pub fn assert_status(response: &axum::response::Response, expected: StatusCode) {
    assert_eq!(
        response.status(),
        expected,
        "expected {expected}, got {}",
        response.status()
    );
}
