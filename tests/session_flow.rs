#![cfg(feature = "oauth")]

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::{Form, State};
use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use common::{Backend, RecordingNavigator, serve, spawn_backend};
use parking_lot::Mutex;
use serde_json::json;
use todo_session::session::{GuardView, MirrorState};
use todo_session::{
    ClientConfig, CredentialSlot, Error, ExpiryPolicy, HostedProvider, IdentityConfig, IdentityProvider,
    LoginOptions, TodoClient, TokenOptions,
};
use url::Url;

#[derive(Default)]
struct Tenant {
    token_requests: Mutex<Vec<HashMap<String, String>>>,
    issued: AtomicUsize,
}

type SharedTenant = Arc<Tenant>;

async fn token(State(tenant): State<SharedTenant>, Form(form): Form<HashMap<String, String>>) -> Response {
    tenant.token_requests.lock().push(form.clone());
    let grant = form.get("grant_type").map(String::as_str);
    let accepted = match grant {
        Some("authorization_code") => form.get("code").is_some_and(|c| c == "good-code"),
        Some("refresh_token") => form.get("refresh_token").is_some_and(|r| r == "rt-1"),
        _ => false,
    };
    if !accepted {
        return (StatusCode::FORBIDDEN, Json(json!({ "error": "invalid_grant" }))).into_response();
    }

    let n = tenant.issued.fetch_add(1, Ordering::SeqCst) + 1;
    let mut body = json!({
        "access_token": format!("at-{n}"),
        "token_type": "Bearer",
        "expires_in": 86400,
    });
    if grant == Some("authorization_code") {
        body["refresh_token"] = json!("rt-1");
    }
    Json(body).into_response()
}

async fn userinfo(headers: HeaderMap) -> Response {
    match headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        Some(v) if v.starts_with("Bearer at-") => {
            Json(json!({ "sub": "auth0|ada", "name": "Ada", "email": "ada@example.com" }))
                .into_response()
        }
        _ => StatusCode::UNAUTHORIZED.into_response(),
    }
}

async fn spawn_tenant() -> (Url, SharedTenant) {
    let tenant = SharedTenant::default();
    let router = Router::new()
        .route("/oauth/token", post(token))
        .route("/userinfo", get(userinfo))
        .with_state(tenant.clone());
    (serve(router).await, tenant)
}

fn identity(origin: &Url) -> IdentityConfig {
    IdentityConfig::new(
        origin.as_str(),
        "spa-client",
        "https://todo.example.com/api",
        "http://localhost:5173/".parse().unwrap(),
    )
}

fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

/// Drive `provider` through login and the callback; returns the landing path.
async fn sign_in(provider: &HostedProvider, navigator: &RecordingNavigator, return_to: &str) -> String {
    provider
        .login(LoginOptions::returning_to(return_to))
        .await
        .unwrap();
    let authorize = navigator.redirects.lock().last().cloned().unwrap();
    let state = query_param(&authorize, "state").unwrap();
    provider.complete_login("good-code", &state).await.unwrap()
}

#[tokio::test]
async fn code_exchange_then_silent_renewal() {
    let (origin, tenant) = spawn_tenant().await;
    let navigator = Arc::new(RecordingNavigator::default());
    let provider = HostedProvider::new(identity(&origin), navigator.clone()).unwrap();

    let landing = sign_in(&provider, &navigator, "/todos").await;
    assert_eq!(landing, "/todos");
    assert!(provider.has_session());

    let authorize = navigator.redirects.lock()[0].clone();
    assert_eq!(authorize.path(), "/authorize");
    assert_eq!(query_param(&authorize, "client_id").as_deref(), Some("spa-client"));

    let exchange = tenant.token_requests.lock()[0].clone();
    assert_eq!(exchange["grant_type"], "authorization_code");
    assert!(!exchange["code_verifier"].is_empty());

    let cached = provider.get_token_silently(TokenOptions::default()).await.unwrap();
    assert_eq!(cached, "at-1");
    assert_eq!(tenant.token_requests.lock().len(), 1);

    let renewed = provider
        .get_token_silently(TokenOptions::force_refresh())
        .await
        .unwrap();
    assert_eq!(renewed, "at-2");
    let refresh = tenant.token_requests.lock()[1].clone();
    assert_eq!(refresh["grant_type"], "refresh_token");
    assert_eq!(refresh["refresh_token"], "rt-1");

    // The refresh response carried no new refresh token; the old one stays usable.
    let again = provider
        .get_token_silently(TokenOptions::force_refresh())
        .await
        .unwrap();
    assert_eq!(again, "at-3");

    let user = provider.user_info(&again).await.unwrap();
    assert_eq!(user.sub, "auth0|ada");
    assert_eq!(user.name.as_deref(), Some("Ada"));
}

#[tokio::test]
async fn rejected_code_leaves_no_session() {
    let (origin, _tenant) = spawn_tenant().await;
    let navigator = Arc::new(RecordingNavigator::default());
    let provider = HostedProvider::new(identity(&origin), navigator.clone()).unwrap();

    provider.login(LoginOptions::default()).await.unwrap();
    let authorize = navigator.redirects.lock()[0].clone();
    let state = query_param(&authorize, "state").unwrap();
    let err = provider.complete_login("bad-code", &state).await.unwrap_err();

    assert_eq!(err.status(), Some(StatusCode::FORBIDDEN));
    assert!(!provider.has_session());

    // The pending login was consumed by the failed attempt.
    let err = provider.complete_login("good-code", &state).await.unwrap_err();
    assert!(matches!(err, Error::Auth(_)));
}

#[tokio::test]
async fn logout_forgets_grant_and_redirects() {
    let (origin, _tenant) = spawn_tenant().await;
    let navigator = Arc::new(RecordingNavigator::default());
    let provider = HostedProvider::new(identity(&origin), navigator.clone()).unwrap();
    sign_in(&provider, &navigator, "/todos").await;

    provider.logout().await.unwrap();

    let logout = navigator.redirects.lock().last().cloned().unwrap();
    assert_eq!(logout.path(), "/v2/logout");
    assert_eq!(
        query_param(&logout, "returnTo").as_deref(),
        Some("http://localhost:5173/")
    );
    let err = provider
        .get_token_silently(TokenOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Auth(_)));
}

#[tokio::test]
async fn guarded_visit_through_sign_in_mirror_and_recovery() {
    let (origin, _tenant) = spawn_tenant().await;
    let backend = Backend::seeded();
    Backend::accept_only(&backend, &["at-1"]);
    let api_base = spawn_backend(backend.clone()).await;

    let navigator = Arc::new(RecordingNavigator::default());
    let provider = HostedProvider::new(identity(&origin), navigator.clone()).unwrap();
    let config = ClientConfig::new(api_base)
        .with_identity(identity(&origin))
        .with_expiry_policy(ExpiryPolicy::RefreshAndRetry);
    let mut client =
        TodoClient::bootstrap(config, provider, navigator.clone(), CredentialSlot::new()).unwrap();
    client.start();

    // Nothing stored yet and the session still loading.
    let mut guard = client.guard("/todos").unwrap();
    assert_eq!(guard.check(client.session(), client.slot()).await, GuardView::Loading);

    // Rehydration finds no user: exactly one login redirect, however often we render.
    client.session().resolve(None);
    for _ in 0..3 {
        let view = guard.check(client.session(), client.slot()).await;
        assert_eq!(view, GuardView::Nothing);
    }
    assert_eq!(navigator.redirects.lock().len(), 1);

    // Callback: finish login, resolve the user and wait for the mirror.
    let authorize = navigator.redirects.lock()[0].clone();
    assert_eq!(authorize.path(), "/authorize");
    let state = query_param(&authorize, "state").unwrap();
    let provider = client.session().provider().clone();
    let landing = provider.complete_login("good-code", &state).await.unwrap();
    assert_eq!(landing, "/todos");
    let user = provider.user_info("at-1").await.unwrap();
    client.session().resolve(Some(user));

    let mut mirror = client.mirror().unwrap().watch();
    tokio::time::timeout(
        Duration::from_secs(5),
        mirror.wait_for(|s| *s == MirrorState::Synced),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(client.slot().access_token().as_deref(), Some("at-1"));
    assert_eq!(guard.check(client.session(), client.slot()).await, GuardView::Children);

    let tasks = client.tasks().tasks().await.unwrap();
    assert_eq!(tasks.len(), 2);

    // The backend stops honouring at-1; one forced refresh and a reissue recover.
    Backend::accept_only(&backend, &["at-2"]);
    client.tasks().invalidate(todo_session::CacheKey::Tasks).await;
    let tasks = client.tasks().tasks().await.unwrap();
    assert_eq!(tasks.len(), 2);
    assert_eq!(client.slot().access_token().as_deref(), Some("at-2"));

    client.logout().await;
    assert!(!client.slot().has_access_token());
    assert!(!client.session().session().is_authenticated);
    let logout = navigator.redirects.lock().last().cloned().unwrap();
    assert_eq!(logout.path(), "/v2/logout");
}
