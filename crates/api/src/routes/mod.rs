use std::future::Future;

use agora_domain::{
    detail::PostDetail,
    engagement::LikeToggle,
    idempotency::{BeginOutcome, OP_CREATE_COMMENT, OP_CREATE_POST, OP_TOGGLE_LIKE},
    identity::ActorIdentity,
    leaderboard::{LeaderboardEntry, build_leaderboard_query},
    ports::idempotency::{IdempotencyKey, IdempotencyResponse},
    threads::{Comment, CommentCreate, Post, PostCreate},
};
use axum::extract::{Extension, Path, Query, State};
use axum::{
    Json, Router,
    http::{HeaderMap, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::middleware::{AuthContext, REQUEST_ID_HEADER};
use crate::{
    error::ApiError, middleware as app_middleware, observability, state::AppState, validation,
};

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/v1/posts", post(create_post))
        .route("/v1/posts/:post_id/comments", post(create_comment))
        .route("/v1/likes", post(toggle_like))
        .route_layer(middleware::from_fn(app_middleware::require_auth_middleware));

    let public = Router::new()
        .route("/v1/posts", get(list_posts))
        .route("/v1/posts/:post_id", get(get_post_detail))
        .route("/v1/posts/:post_id/comments", get(list_comments))
        .route("/v1/leaderboard", get(leaderboard))
        .route("/v1/users/:user_id/karma", get(karma_balance));

    let mut app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .merge(public)
        .merge(protected)
        .route_layer(middleware::from_fn(app_middleware::metrics_layer))
        .layer(app_middleware::timeout_layer())
        .layer(app_middleware::trace_layer())
        .layer(app_middleware::set_request_id_layer())
        .layer(app_middleware::propagate_request_id_layer())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            app_middleware::auth_middleware,
        ))
        .layer(middleware::from_fn(
            app_middleware::correlation_id_middleware,
        ));

    if !state.config.app_env.eq_ignore_ascii_case("test") {
        app = app.layer(app_middleware::rate_limit_layer());
    }

    app.with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    environment: String,
    storage: &'static str,
}

async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    state.db.health_check().await.map_err(|err| {
        tracing::warn!(error = %err, backend = state.db.name(), "storage health check failed");
        ApiError::Unavailable
    })?;
    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.app_env.clone(),
        storage: state.db.name(),
    }))
}

async fn metrics() -> Response {
    let body = observability::render_metrics().unwrap_or_default();
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response()
}

#[derive(Debug, Deserialize, Validate)]
struct CreatePostRequest {
    #[validate(length(min = 1, max = 10000))]
    content: String,
}

async fn create_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<CreatePostRequest>,
) -> Result<Response, ApiError> {
    validation::validate(&payload)?;
    let actor = actor_identity(&auth)?;
    let key = IdempotencyKey::new(
        OP_CREATE_POST,
        actor.user_id.clone(),
        request_id_from_headers(&headers)?,
    );

    run_idempotent(&state, key, StatusCode::CREATED, async {
        let post = state
            .threads()
            .create_post(
                &actor,
                PostCreate {
                    content: payload.content,
                },
            )
            .await?;
        Ok::<_, ApiError>(post)
    })
    .await
}

#[derive(Debug, Deserialize)]
struct PostListQuery {
    limit: Option<usize>,
}

async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<PostListQuery>,
) -> Result<Json<Vec<Post>>, ApiError> {
    let posts = state.threads().list_posts(query.limit).await?;
    Ok(Json(posts))
}

async fn get_post_detail(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(post_id): Path<i64>,
) -> Result<Json<PostDetail>, ApiError> {
    let viewer = auth.actor();
    let detail = state.post_details().load(post_id, viewer.as_ref()).await?;
    Ok(Json(detail))
}

async fn list_comments(
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
) -> Result<Json<Vec<Comment>>, ApiError> {
    let comments = state.threads().list_thread(post_id).await?;
    Ok(Json(comments))
}

#[derive(Debug, Deserialize, Validate)]
struct CreateCommentRequest {
    parent_id: Option<i64>,
    #[validate(length(min = 1, max = 5000))]
    content: String,
}

async fn create_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(auth): Extension<AuthContext>,
    Path(post_id): Path<i64>,
    Json(payload): Json<CreateCommentRequest>,
) -> Result<Response, ApiError> {
    validation::validate(&payload)?;
    let actor = actor_identity(&auth)?;
    let key = IdempotencyKey::new(
        OP_CREATE_COMMENT,
        actor.user_id.clone(),
        request_id_from_headers(&headers)?,
    );

    run_idempotent(&state, key, StatusCode::CREATED, async {
        let comment = state
            .threads()
            .create_comment(
                &actor,
                CommentCreate {
                    post_id,
                    parent_id: payload.parent_id,
                    content: payload.content,
                },
            )
            .await?;
        Ok::<_, ApiError>(comment)
    })
    .await
}

#[derive(Debug, Deserialize, Validate)]
struct ToggleLikeRequest {
    #[validate(length(min = 1, max = 32))]
    target_type: String,
    target_id: i64,
}

async fn toggle_like(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<ToggleLikeRequest>,
) -> Result<Response, ApiError> {
    validation::validate(&payload)?;
    let actor = actor_identity(&auth)?;
    let key = IdempotencyKey::new(
        OP_TOGGLE_LIKE,
        actor.user_id.clone(),
        request_id_from_headers(&headers)?,
    );

    run_idempotent(&state, key, StatusCode::OK, async {
        let toggle: LikeToggle = state
            .engagement()
            .toggle_like(&actor, &payload.target_type, payload.target_id)
            .await?;
        observability::register_like_toggle(toggle.target_type, toggle.outcome);
        Ok::<_, ApiError>(toggle)
    })
    .await
}

#[derive(Debug, Deserialize)]
struct LeaderboardParams {
    window_hours: Option<u32>,
    limit: Option<usize>,
}

async fn leaderboard(
    State(state): State<AppState>,
    Query(params): Query<LeaderboardParams>,
) -> Result<Json<Vec<LeaderboardEntry>>, ApiError> {
    let query = build_leaderboard_query(
        params.window_hours,
        params.limit,
        state.leaderboard_defaults(),
    );
    let entries = state
        .leaderboard()
        .top_karma(query.window_hours, query.limit)
        .await?;
    Ok(Json(entries))
}

#[derive(Serialize)]
struct KarmaBalanceResponse {
    user_id: String,
    karma: i64,
}

async fn karma_balance(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<KarmaBalanceResponse>, ApiError> {
    let karma = state.karma().balance(&user_id).await?;
    Ok(Json(KarmaBalanceResponse { user_id, karma }))
}

/// Runs `mutation` at most once per idempotency key. A completed key replays the stored
/// response; a key still in flight is a conflict. Failed mutations release the key so
/// the client can retry with the same request id.
async fn run_idempotent<T, F>(
    state: &AppState,
    key: IdempotencyKey,
    success: StatusCode,
    mutation: F,
) -> Result<Response, ApiError>
where
    T: Serialize,
    F: Future<Output = Result<T, ApiError>>,
{
    let outcome = state.idempotency.begin(&key).await.map_err(|err| {
        tracing::error!(error = %err, "idempotency begin failed");
        ApiError::Internal
    })?;

    match outcome {
        BeginOutcome::Replay(response) => {
            tracing::debug!(
                operation = %key.operation,
                request_id = %key.request_id,
                "replaying stored response"
            );
            observability::register_idempotent_replay(replay_label(&key.operation));
            Ok(to_response(response))
        }
        BeginOutcome::InProgress => Err(ApiError::Conflict),
        BeginOutcome::Started => {
            let value = match mutation.await {
                Ok(value) => value,
                Err(err) => {
                    if let Err(release_err) = state.idempotency.abandon(&key).await {
                        tracing::warn!(error = %release_err, "idempotency release failed");
                    }
                    return Err(err);
                }
            };

            let response = IdempotencyResponse {
                status_code: success.as_u16(),
                body: serde_json::to_value(&value).map_err(|_| ApiError::Internal)?,
            };
            state
                .idempotency
                .complete(&key, response.clone())
                .await
                .map_err(|err| {
                    tracing::error!(error = %err, "idempotency complete failed");
                    ApiError::Internal
                })?;
            Ok(to_response(response))
        }
    }
}

fn replay_label(operation: &str) -> &'static str {
    match operation {
        OP_CREATE_POST => OP_CREATE_POST,
        OP_CREATE_COMMENT => OP_CREATE_COMMENT,
        OP_TOGGLE_LIKE => OP_TOGGLE_LIKE,
        _ => "other",
    }
}

fn actor_identity(auth: &AuthContext) -> Result<ActorIdentity, ApiError> {
    auth.actor().ok_or(ApiError::Unauthorized)
}

fn request_id_from_headers(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(std::string::ToString::to_string)
        .ok_or_else(|| ApiError::Validation("missing request id".into()))
}

fn to_response(response: IdempotencyResponse) -> Response {
    let status = StatusCode::from_u16(response.status_code).unwrap_or(StatusCode::OK);
    (status, Json(response.body)).into_response()
}
