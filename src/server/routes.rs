use std::sync::Arc;

use axum::async_trait;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::http::{header, Method};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::engine::view::GameStateView;
use crate::matchmaking::{JoinOutcome, MatchStatus};
use crate::service::GameService;
use crate::types::GameId;

use super::dto::{
    AckResponse, CardDto, HandResponse, HealthResponse, JoinRequest, PlayRequest, PlayResponse,
};
use super::error::ApiError;
use super::logging::log_requests;

/// Bearer token taken from the `Authorization` header.
pub struct BearerToken(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("missing bearer token"))?;
        let token = header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ApiError::unauthorized("malformed authorization header"))?;
        Ok(BearerToken(token.to_string()))
    }
}

/// Axum server facade over the game service.
pub struct GuerraServer {
    router: Router,
}

impl GuerraServer {
    pub fn new(service: Arc<GameService>) -> Self {
        let router = Router::new()
            .route("/health", get(health))
            .route("/cards", get(list_cards))
            .route("/match/join", post(join_match))
            .route("/match/status", get(match_status))
            .route("/match/leave", post(leave_match))
            .route("/game/state/:game_id", get(game_state))
            .route("/game/hand/:game_id", get(game_hand))
            .route("/game/play/:game_id", post(play_card))
            .layer(middleware::from_fn(log_requests))
            .layer(
                CorsLayer::new()
                    .allow_methods([Method::GET, Method::POST])
                    .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
                    .allow_origin(Any),
            )
            .layer(TraceLayer::new_for_http())
            .with_state(service);

        Self { router }
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn into_router(self) -> Router {
        self.router
    }
}

fn parse_game_id(raw: &str) -> Result<GameId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::not_found(format!("game {raw} not found")))
}

async fn health(State(service): State<Arc<GameService>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        active_games: service.engine().registry().active_count(),
        pending_records: service.engine().pending_records(),
    })
}

async fn list_cards(State(service): State<Arc<GameService>>) -> Json<Vec<CardDto>> {
    Json(service.catalog().all().iter().map(CardDto::from).collect())
}

async fn join_match(
    State(service): State<Arc<GameService>>,
    BearerToken(token): BearerToken,
    payload: Result<Json<JoinRequest>, JsonRejection>,
) -> Result<Json<JoinOutcome>, ApiError> {
    let Json(request) = payload.map_err(|err| ApiError::bad_request(err.body_text()))?;
    Ok(Json(service.join(&token, request.slot).await?))
}

async fn match_status(
    State(service): State<Arc<GameService>>,
    BearerToken(token): BearerToken,
) -> Result<Json<MatchStatus>, ApiError> {
    Ok(Json(service.status(&token).await?))
}

async fn leave_match(
    State(service): State<Arc<GameService>>,
    BearerToken(token): BearerToken,
) -> Result<Json<AckResponse>, ApiError> {
    service.leave(&token).await?;
    Ok(Json(AckResponse::OK))
}

async fn game_state(
    State(service): State<Arc<GameService>>,
    BearerToken(token): BearerToken,
    Path(game_id): Path<String>,
) -> Result<Json<GameStateView>, ApiError> {
    let game_id = parse_game_id(&game_id)?;
    Ok(Json(service.state(&token, game_id).await?))
}

async fn game_hand(
    State(service): State<Arc<GameService>>,
    BearerToken(token): BearerToken,
    Path(game_id): Path<String>,
) -> Result<Json<HandResponse>, ApiError> {
    let game_id = parse_game_id(&game_id)?;
    let cards = service.hand(&token, game_id).await?;
    Ok(Json(HandResponse {
        game_id,
        cards: cards.iter().map(CardDto::from).collect(),
    }))
}

async fn play_card(
    State(service): State<Arc<GameService>>,
    BearerToken(token): BearerToken,
    Path(game_id): Path<String>,
    payload: Result<Json<PlayRequest>, JsonRejection>,
) -> Result<Json<PlayResponse>, ApiError> {
    let game_id = parse_game_id(&game_id)?;
    let Json(request) = payload.map_err(|err| ApiError::bad_request(err.body_text()))?;
    let outcome = service.play(&token, game_id, request.card()).await?;
    Ok(Json(PlayResponse::from(outcome)))
}
