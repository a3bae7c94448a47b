//! Shared helpers for the HTTP integration tests

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use lma_edge_backend::{build_router, cache::Cache, cache::MemoryCache, db::Database, AppState, Config};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

pub fn test_config(overrides: &[(&str, &str)]) -> Config {
    let mut vars: Vec<(String, String)> = vec![
        ("JWT_SECRET".into(), "integration-test-secret".into()),
        ("BCRYPT_ROUNDS".into(), "4".into()),
        ("CACHE_TIMEOUT_MS".into(), "100".into()),
    ];
    vars.extend(overrides.iter().map(|(k, v)| (k.to_string(), v.to_string())));

    Config::from_lookup(|key| {
        vars.iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    })
    .unwrap()
}

pub fn spawn_app() -> TestApp {
    spawn_app_with(test_config(&[]), Arc::new(MemoryCache::new()))
}

pub fn spawn_app_with(config: Config, cache: Arc<dyn Cache>) -> TestApp {
    let db = Database::open_in_memory(Duration::from_secs(5)).unwrap();
    let state = AppState::new(config, db, cache);
    let router = build_router(state.clone()).unwrap();
    TestApp { router, state }
}

impl TestApp {
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    pub async fn register(&self, email: &str, password: &str, role: &str) -> Value {
        let (status, body) = self
            .request(
                Method::POST,
                "/api/v1/auth/register",
                None,
                Some(json!({
                    "email": email,
                    "password": password,
                    "first_name": "Test",
                    "last_name": "User",
                    "role": role,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
        body["user"].clone()
    }

    /// Register then log in, returning `(user, session token, refresh token)`
    pub async fn login_as(&self, email: &str, role: &str) -> (Value, String, String) {
        let user = self.register(email, "password1", role).await;
        let (status, body) = self
            .request(
                Method::POST,
                "/api/v1/auth/login",
                None,
                Some(json!({ "email": email, "password": "password1" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        (
            user,
            body["token"].as_str().unwrap().to_string(),
            body["refreshToken"].as_str().unwrap().to_string(),
        )
    }
}
