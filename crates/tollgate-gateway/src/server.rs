//! Gateway server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{get, post, put},
};
use tollgate_core::Config;
use tollgate_core::auth::{
    AuthenticationService, RequestAuthenticator, SecurityPipeline, TokenCodec, UserStore,
};
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::GatewayError;
use crate::auth::{self, SledUserStore, auto_setup_from_env, security_pipeline};
use crate::middleware::{SigninRateLimiter, signin_rate_limit};

const LIMITER_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Gateway state shared across handlers.
pub struct GatewayState {
    /// Sign-in and refresh.
    pub auth: AuthenticationService,
    /// Per-request authentication and authorization.
    pub pipeline: SecurityPipeline,
    /// Sign-in throttle.
    pub signin_limiter: SigninRateLimiter,
    /// Configured token issuer, if fixed.
    pub public_base_url: Option<String>,
    /// Issuer used when the request names no host.
    pub fallback_base_url: String,
}

impl std::fmt::Debug for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayState")
            .field("public_base_url", &self.public_base_url)
            .field("fallback_base_url", &self.fallback_base_url)
            .finish_non_exhaustive()
    }
}

/// Gateway server.
pub struct Gateway {
    config: Config,
    state: Arc<GatewayState>,
    router: Router,
}

/// Builder for constructing a Gateway with its dependencies.
pub struct GatewayBuilder {
    config: Config,
    user_store: Option<Arc<dyn UserStore>>,
    api_routes: Option<Router>,
}

impl GatewayBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            user_store: None,
            api_routes: None,
        }
    }

    /// Use this user store instead of the sled database in the data dir.
    #[must_use]
    pub fn with_user_store(mut self, store: Arc<dyn UserStore>) -> Self {
        self.user_store = Some(store);
        self
    }

    /// Mount application routes behind the security pipeline.
    #[must_use]
    pub fn with_api_routes(mut self, routes: Router) -> Self {
        self.api_routes = Some(routes);
        self
    }

    /// Build the gateway.
    ///
    /// # Errors
    ///
    /// Returns error if the token settings are unusable or the user database
    /// cannot be opened.
    pub fn build(self) -> Result<Gateway, GatewayError> {
        let security = &self.config.security;

        let codec = Arc::new(
            TokenCodec::from_config(security).map_err(|e| GatewayError::Config(e.to_string()))?,
        );
        if security.secret_key.is_default() {
            tracing::warn!(
                "Signing secret is the insecure default; set security.secretKey or TOLLGATE_JWT_SECRET"
            );
        }

        let hasher = security.password_hasher();
        let store = match self.user_store {
            Some(store) => store,
            None => {
                let path = self.config.users_db_path();
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        GatewayError::Config(format!("Failed to create data dir: {e}"))
                    })?;
                }
                let store = SledUserStore::open(&path)
                    .map_err(|e| GatewayError::Server(e.to_string()))?;

                if let Err(e) = auto_setup_from_env(&store, &hasher) {
                    tracing::warn!(error = %e, "Auto-setup from env failed");
                }
                if store.is_empty() {
                    tracing::warn!("No users configured; run `tollgate admin create`");
                }
                Arc::new(store)
            }
        };

        let state = Arc::new(GatewayState {
            auth: AuthenticationService::new(Arc::clone(&store), hasher, Arc::clone(&codec)),
            pipeline: SecurityPipeline::new(
                RequestAuthenticator::new(codec, store),
                security.access_policy(),
            ),
            signin_limiter: SigninRateLimiter::new(self.config.server.signin_attempts_per_minute),
            public_base_url: self.config.server.public_base_url.clone(),
            fallback_base_url: format!(
                "http://{}:{}",
                self.config.server.bind_address, self.config.server.port
            ),
        });

        let router = build_router(&self.config, &state, self.api_routes);

        Ok(Gateway {
            config: self.config,
            state,
            router,
        })
    }
}

fn build_router(config: &Config, state: &Arc<GatewayState>, api_routes: Option<Router>) -> Router {
    let mut router = Router::new()
        .route("/health", get(auth::health))
        .route(
            "/auth/signin",
            post(auth::signin).layer(from_fn_with_state(Arc::clone(state), signin_rate_limit)),
        )
        .route("/auth/refresh/{username}", put(auth::refresh))
        .route("/api/me", get(auth::me))
        .with_state(Arc::clone(state));

    if let Some(api_routes) = api_routes {
        router = router.merge(api_routes);
    }

    // Fallback first so unknown paths also pass through the pipeline.
    let router = router
        .fallback(not_found)
        .layer(from_fn_with_state(Arc::clone(state), security_pipeline))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.server.timeout_secs),
        ))
        .layer(TraceLayer::new_for_http());

    if config.server.cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

impl Gateway {
    /// Shared state.
    #[must_use]
    pub fn state(&self) -> &Arc<GatewayState> {
        &self.state
    }

    /// The fully layered router.
    #[must_use]
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the gateway server until Ctrl-C.
    ///
    /// # Errors
    ///
    /// Returns error if the address is invalid or the listener fails.
    pub async fn run(self) -> Result<(), GatewayError> {
        let addr: SocketAddr = format!(
            "{}:{}",
            self.config.server.bind_address, self.config.server.port
        )
        .parse()
        .map_err(|e| GatewayError::Config(format!("Invalid address: {e}")))?;

        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Gateway listening on http://{}", addr);

        let state = Arc::clone(&self.state);
        let pruner = tokio::spawn(async move {
            let mut interval = tokio::time::interval(LIMITER_PRUNE_INTERVAL);
            loop {
                interval.tick().await;
                state.signin_limiter.prune();
            }
        });

        let served = axum::serve(
            listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| GatewayError::Server(e.to_string()));
        pruner.abort();
        served?;

        tracing::info!("Gateway stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode, header},
        response::Response,
    };
    use chrono::{TimeDelta, Utc};
    use pretty_assertions::assert_eq;
    use serde_json::Value;
    use tollgate_core::auth::{MemoryUserStore, PasswordHasher, TokenKind, UserRecord};
    use tower::ServiceExt;

    use super::*;

    const ITERATIONS: u32 = 1_000;

    fn config() -> Config {
        let mut config = Config::default();
        config.security.password_iterations = ITERATIONS;
        config
    }

    fn users() -> Arc<MemoryUserStore> {
        let hasher = PasswordHasher::with_iterations(ITERATIONS);
        Arc::new(MemoryUserStore::with_users([
            UserRecord::new("victor", hasher.hash("12345678").unwrap(), ["USER"]),
            UserRecord::new("root", hasher.hash("toor-toor").unwrap(), ["ADMIN"]),
        ]))
    }

    fn gateway_with(config: Config) -> Gateway {
        let people = Router::new().route("/api/person/v1", get(|| async { "people" }));
        GatewayBuilder::new(config)
            .with_user_store(users())
            .with_api_routes(people)
            .build()
            .unwrap()
    }

    fn gateway() -> Gateway {
        gateway_with(config())
    }

    async fn send(gateway: &Gateway, request: Request<Body>) -> Response {
        gateway.router().oneshot(request).await.unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        serde_json::from_str(&body_string(response).await).unwrap()
    }

    fn signin_request(body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/auth/signin")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_with(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn signin(gateway: &Gateway, username: &str, password: &str) -> Value {
        let body = serde_json::json!({ "username": username, "password": password }).to_string();
        let response = send(gateway, signin_request(&body)).await;
        assert_eq!(response.status(), StatusCode::OK);
        body_json(response).await
    }

    #[tokio::test]
    async fn test_health_is_open() {
        let response = send(&gateway(), get_with("/health", None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "OK");
    }

    #[tokio::test]
    async fn test_signin_returns_token_pair() {
        let gateway = gateway();
        let pair = signin(&gateway, "victor", "12345678").await;

        assert_eq!(pair["username"], "victor");
        assert_eq!(pair["authenticated"], true);
        assert!(pair["issuedAt"].is_string());
        assert!(pair["accessExpiresAt"].is_string());
        let access = pair["accessToken"].as_str().unwrap();
        assert!(!access.is_empty());
        assert!(!pair["refreshToken"].as_str().unwrap().is_empty());

        let claims = gateway.state().auth.codec().decode(access).unwrap();
        assert_eq!(claims.roles, vec!["USER".to_string()]);
        assert_eq!(claims.expires_at - claims.issued_at, TimeDelta::hours(1));
        assert_eq!(claims.issuer, "http://127.0.0.1:8080");
    }

    #[tokio::test]
    async fn test_signin_failures_are_uniform() {
        let gateway = gateway();
        for body in [
            r#"{"username": "victor", "password": ""}"#,
            r#"{"username": "victor"}"#,
            r#"{"username": "victor", "password": "wrong"}"#,
            r#"{"username": "nobody", "password": "12345678"}"#,
            r#"not json"#,
        ] {
            let response = send(&gateway, signin_request(body)).await;
            assert_eq!(response.status(), StatusCode::FORBIDDEN, "body {body}");
            assert_eq!(body_string(response).await, "Invalid client request!");
        }
    }

    #[tokio::test]
    async fn test_issuer_from_request_host() {
        let gateway = gateway();
        let body = r#"{"username": "victor", "password": "12345678"}"#;
        let mut request = signin_request(body);
        request
            .headers_mut()
            .insert(header::HOST, "api.example.com".parse().unwrap());
        request
            .headers_mut()
            .insert("x-forwarded-proto", "https".parse().unwrap());

        let pair = body_json(send(&gateway, request).await).await;
        let claims = gateway
            .state()
            .auth
            .codec()
            .decode(pair["accessToken"].as_str().unwrap())
            .unwrap();
        assert_eq!(claims.issuer, "https://api.example.com");
    }

    #[tokio::test]
    async fn test_configured_issuer_wins() {
        let mut config = config();
        config.server.public_base_url = Some("https://auth.example.com/".into());
        let gateway = gateway_with(config);

        let pair = signin(&gateway, "victor", "12345678").await;
        let claims = gateway
            .state()
            .auth
            .codec()
            .decode(pair["accessToken"].as_str().unwrap())
            .unwrap();
        assert_eq!(claims.issuer, "https://auth.example.com");
    }

    #[tokio::test]
    async fn test_api_requires_token() {
        let gateway = gateway();

        let response = send(&gateway, get_with("/api/person/v1", None)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
        assert_eq!(body_json(response).await["code"], "unauthenticated");

        let pair = signin(&gateway, "victor", "12345678").await;
        let token = pair["accessToken"].as_str().unwrap();
        let response = send(&gateway, get_with("/api/person/v1", Some(token))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "people");
    }

    #[tokio::test]
    async fn test_invalid_and_expired_tokens_rejected() {
        let gateway = gateway();
        let codec = gateway.state().auth.codec();
        let expired = codec
            .issue_access_token("victor", ["USER"], Utc::now() - TimeDelta::hours(2), "x")
            .unwrap();
        let refresh = codec
            .issue_refresh_token("victor", ["USER"], Utc::now(), "x")
            .unwrap();

        for token in ["garbage", expired.as_str(), refresh.as_str()] {
            let response = send(&gateway, get_with("/api/person/v1", Some(token))).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[tokio::test]
    async fn test_users_always_forbidden() {
        let gateway = gateway();
        let pair = signin(&gateway, "root", "toor-toor").await;
        let token = pair["accessToken"].as_str().unwrap();

        for uri in ["/users", "/users/", "/users/1"] {
            let response = send(&gateway, get_with(uri, Some(token))).await;
            assert_eq!(response.status(), StatusCode::FORBIDDEN, "uri {uri}");
        }
        let response = send(&gateway, get_with("/users", None)).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_unknown_route_requires_token() {
        let gateway = gateway();
        let response = send(&gateway, get_with("/metrics", None)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let pair = signin(&gateway, "victor", "12345678").await;
        let token = pair["accessToken"].as_str().unwrap();
        let response = send(&gateway, get_with("/metrics", Some(token))).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_me_returns_principal() {
        let gateway = gateway();
        let pair = signin(&gateway, "root", "toor-toor").await;
        let token = pair["accessToken"].as_str().unwrap();

        let response = send(&gateway, get_with("/api/me", Some(token))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({ "username": "root", "roles": ["ADMIN"] })
        );
    }

    fn refresh_request(username: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method(Method::PUT)
            .uri(format!("/auth/refresh/{username}"));
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_refresh_issues_new_pair() {
        let gateway = gateway();
        let pair = signin(&gateway, "victor", "12345678").await;
        let refresh = pair["refreshToken"].as_str().unwrap();

        let response = send(&gateway, refresh_request("victor", Some(refresh))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let fresh = body_json(response).await;

        let codec = gateway.state().auth.codec();
        let access = codec
            .verify(fresh["accessToken"].as_str().unwrap(), TokenKind::Access, Utc::now())
            .unwrap();
        assert_eq!(access.subject, "victor");
        assert!(
            codec
                .verify(fresh["refreshToken"].as_str().unwrap(), TokenKind::Refresh, Utc::now())
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_refresh_rejections() {
        let gateway = gateway();
        let pair = signin(&gateway, "victor", "12345678").await;
        let access = pair["accessToken"].as_str().unwrap();
        let refresh = pair["refreshToken"].as_str().unwrap();

        for request in [
            refresh_request("root", Some(refresh)),
            refresh_request("victor", Some(access)),
            refresh_request("victor", Some("garbage")),
            refresh_request("victor", None),
        ] {
            let response = send(&gateway, request).await;
            assert_eq!(response.status(), StatusCode::FORBIDDEN);
            assert_eq!(body_string(response).await, "Invalid client request!");
        }
    }

    #[tokio::test]
    async fn test_signin_rate_limited() {
        let mut config = config();
        config.server.signin_attempts_per_minute = 2;
        let gateway = gateway_with(config);
        let body = r#"{"username": "victor", "password": "wrong"}"#;

        for _ in 0..2 {
            let response = send(&gateway, signin_request(body)).await;
            assert_eq!(response.status(), StatusCode::FORBIDDEN);
        }
        let response = send(&gateway, signin_request(body)).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_handler_times_out() {
        let mut config = config();
        config.server.timeout_secs = 1;
        let slow = Router::new().route(
            "/api/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );
        let gateway = GatewayBuilder::new(config)
            .with_user_store(users())
            .with_api_routes(slow)
            .build()
            .unwrap();
        let token = gateway
            .state()
            .auth
            .codec()
            .issue_access_token("victor", ["USER"], Utc::now(), "x")
            .unwrap();

        let response = send(&gateway, get_with("/api/slow", Some(&token))).await;
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    }

    #[tokio::test]
    async fn test_builds_with_sled_store() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let mut config = config();
        config.data_dir = Some(temp_dir.path().to_path_buf());

        let gateway = GatewayBuilder::new(config).build().unwrap();
        let response = send(&gateway, get_with("/health", None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(temp_dir.path().join("users.db").exists());
    }
}
