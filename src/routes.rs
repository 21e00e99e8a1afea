use axum::extract::DefaultBodyLimit;
use axum::{middleware, Router};
use std::sync::Arc;
use tower_governor::key_extractor::PeerIpKeyExtractor;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::services::ServeDir;

use crate::auth::middleware::JwtSecret;
use crate::state::AppState;
use crate::uploads;
use crate::ws::handler as ws_handler;
use crate::{chats, messages, users};

/// Inject the JWT secret into request extensions so the Claims extractor can find it.
async fn inject_jwt_secret(
    axum::extract::State(state): axum::extract::State<AppState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: middleware::Next,
) -> axum::response::Response {
    req.extensions_mut()
        .insert(JwtSecret(state.jwt_secret.clone()));
    next.run(req).await
}

/// Build the full axum Router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    // Rate limiting on credential endpoints: 10 requests per minute per IP.
    // Keyed by peer address, so ConnectInfo<SocketAddr> must be available.
    let governor_config = Arc::new(
        GovernorConfigBuilder::default()
            .key_extractor(PeerIpKeyExtractor)
            .per_second(6) // refill 1 token per 6s = 10/minute
            .burst_size(10)
            .finish()
            .expect("Failed to build governor config"),
    );
    let governor_limiter = governor_config.limiter().clone();

    // Periodically drop stale per-IP limiter entries
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            governor_limiter.retain_recent();
        }
    });

    // Credential endpoints with rate limiting (registration + login)
    let auth_routes = Router::new()
        .route("/register", axum::routing::post(users::register))
        .route("/login", axum::routing::post(users::login))
        .layer(GovernorLayer {
            config: governor_config,
        });

    // User account routes
    let user_routes = Router::new()
        .route("/me", axum::routing::get(users::me))
        .route("/users", axum::routing::get(users::list_users))
        .route("/users/{user_id}", axum::routing::delete(users::delete_user));

    // Chat routes (JWT required; the Claims extractor validates the token)
    let chat_routes = Router::new()
        .route("/chats", axum::routing::post(chats::create_chat))
        .route("/chats", axum::routing::get(chats::list_chats));

    // Message routes; the send endpoint accepts multipart bodies up to the
    // configured upload limit
    let message_routes = Router::new()
        .route("/messages", axum::routing::post(messages::send_message))
        .route("/messages", axum::routing::get(messages::get_messages))
        .route(
            "/messages/{message_id}",
            axum::routing::patch(messages::edit_message),
        )
        .route(
            "/messages/{message_id}",
            axum::routing::delete(messages::delete_message),
        )
        .layer(DefaultBodyLimit::max(
            state.max_upload_size_mb as usize * 1024 * 1024,
        ));

    // Live event stream; the token rides in a query param because browser
    // WebSocket clients cannot set an Authorization header
    let ws_routes = Router::new().route(
        "/ws/chat/{chat_id}",
        axum::routing::get(ws_handler::ws_upgrade),
    );

    // Stored attachments, served as-is
    let uploads_service = ServeDir::new(uploads::uploads_dir(&state.data_dir));

    // Health check
    let health = Router::new().route("/health", axum::routing::get(health_check));

    Router::new()
        .merge(auth_routes)
        .merge(user_routes)
        .merge(chat_routes)
        .merge(message_routes)
        .merge(ws_routes)
        .merge(health)
        .nest_service("/uploads", uploads_service)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            inject_jwt_secret,
        ))
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
