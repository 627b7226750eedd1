//! Common test utilities for HTTP tests
//!
//! Builds the full router over the in-memory collaborators, so the tests
//! need neither PostgreSQL nor an SMTP relay:
//! - `MemoryApplicantStore` for applicants
//! - `MemoryEffectQueue` to read back queued emails (and their tokens)
//! - `MemoryFileStorage` for resume uploads
#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use shellhacks_api::app::{build_router, AppState};
use shellhacks_api::config::Config;
use shellhacks_shared::auth::credentials::Argon2JwtCredentials;
use shellhacks_shared::auth::password::PasswordParams;
use shellhacks_shared::integrations::MemoryFileStorage;
use shellhacks_shared::lifecycle::{ApplicantLifecycle, Collaborators};
use shellhacks_shared::outbox::{MemoryEffectQueue, NotificationTemplate};
use shellhacks_shared::store::memory::MemoryApplicantStore;
use shellhacks_shared::validation::ValidationRules;
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;

pub const JWT_SECRET: &str = "test-secret-key-at-least-32-bytes-long";
pub const DASHBOARD_PASSWORD: &str = "dashboard-secret";
pub const PASSWORD: &str = "pw123";

const BOUNDARY: &str = "shellhacks-test-boundary";

/// Parsed response
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn data(&self) -> &Value {
        &self.body["data"]
    }
}

/// Router plus handles on the in-memory collaborators
pub struct TestApp {
    pub app: Router,
    pub store: Arc<MemoryApplicantStore>,
    pub effects: Arc<MemoryEffectQueue>,
    pub storage: Arc<MemoryFileStorage>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_env(&[])
    }

    /// Builds the app with extra configuration variables
    pub fn with_env(vars: &[(&str, &str)]) -> Self {
        let mut env: HashMap<String, String> = HashMap::from([
            ("DATABASE_URL".to_string(), "postgresql://unused/test".to_string()),
            ("JWT_SECRET".to_string(), JWT_SECRET.to_string()),
            ("DASHBOARD_PASSWORD".to_string(), DASHBOARD_PASSWORD.to_string()),
        ]);
        for (key, value) in vars {
            env.insert(key.to_string(), value.to_string());
        }
        let config = Config::from_lookup(|key| env.get(key).cloned())
            .expect("test configuration is valid");

        let store = Arc::new(MemoryApplicantStore::new());
        let effects = Arc::new(MemoryEffectQueue::new());
        let storage = Arc::new(MemoryFileStorage::new());

        let lifecycle = ApplicantLifecycle::new(
            Collaborators {
                store: store.clone(),
                credentials: Arc::new(Argon2JwtCredentials::with_params(
                    JWT_SECRET,
                    PasswordParams::insecure_fast(),
                )),
                effects: effects.clone(),
                storage: storage.clone(),
            },
            ValidationRules::default(),
            config.lifecycle_config(),
        );

        TestApp {
            app: build_router(AppState::new(Arc::new(lifecycle), config)),
            store,
            effects,
            storage,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                panic!("non-JSON body ({}): {}", status, String::from_utf8_lossy(&bytes))
            })
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// JSON request with an optional bearer token
    pub async fn json(
        &self,
        method: Method,
        uri: &str,
        bearer: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        self.send(request).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> TestResponse {
        self.json(Method::POST, uri, None, Some(body)).await
    }

    pub async fn admin_get(&self, uri: &str) -> TestResponse {
        self.json(Method::GET, uri, Some(DASHBOARD_PASSWORD), None).await
    }

    pub async fn admin_post(&self, uri: &str, body: Value) -> TestResponse {
        self.json(Method::POST, uri, Some(DASHBOARD_PASSWORD), Some(body))
            .await
    }

    /// Registers an applicant and returns the `data` payload
    pub async fn register(&self, first_name: &str, last_name: &str, email: &str) -> Value {
        let response = self
            .post(
                "/v1/applicants/register",
                json!({
                    "firstName": first_name,
                    "lastName": last_name,
                    "email": email,
                    "password": PASSWORD,
                }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        response.data().clone()
    }

    /// Latest token mailed to `email` with `template`
    pub async fn mailed_token(&self, template: NotificationTemplate, email: &str) -> String {
        self.effects
            .notifications(template)
            .await
            .into_iter()
            .rev()
            .find(|(to, _)| to == email)
            .and_then(|(_, token)| token)
            .expect("token was mailed")
    }

    pub async fn login(&self, email: &str, password: &str) -> TestResponse {
        self.post(
            "/v1/applicants/login",
            json!({ "email": email, "password": password }),
        )
        .await
    }

    /// Logs in and returns the session token
    pub async fn session(&self, email: &str) -> String {
        let response = self.login(email, PASSWORD).await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.body);
        response.data()["token"].as_str().unwrap().to_string()
    }

    /// Posts the application form as multipart
    pub async fn apply(
        &self,
        token: &str,
        fields: &[(&str, &str)],
        resume: Option<(&str, &[u8])>,
    ) -> TestResponse {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/v1/applicants/apply")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(multipart_body(fields, resume)))
            .unwrap();

        self.send(request).await
    }
}

/// Answers that satisfy the default application rules
pub fn complete_form() -> Vec<(&'static str, &'static str)> {
    vec![
        ("schoolName", "FIU"),
        ("levelOfStudy", "Undergraduate"),
        ("graduationYear", "2027"),
        ("major", "Computer Science"),
        ("shirtSize", "M"),
        ("likeAMentor", "true"),
    ]
}

pub const RESUME: (&str, &[u8]) = ("Ada Resume.pdf", b"%PDF-1.4 resume");

fn multipart_body(fields: &[(&str, &str)], resume: Option<(&str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, bytes)) = resume {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"resume\"; filename=\"{}\"\r\nContent-Type: application/pdf\r\n\r\n",
                BOUNDARY, file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}
