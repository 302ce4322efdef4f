use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::extract::{ConnectInfo, Path, Query, Request, State};
use axum::http::uri::PathAndQuery;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use serde::Deserialize;
use serde_json::{json, Map as JsonMap, Value};
use thiserror::Error;
use tokio::sync::Mutex;
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;

use crate::app::{Application, Token};
use crate::config::ExtraData;
use crate::constants::{HTTP_TIMEOUT_S, MAX_RECORD_ITEMS};
use crate::logger;
use crate::session::Direction;
use crate::world::{Map, MapId};

pub struct ServerState {
    pub app: Application,
    pub extra: ExtraData,
}

pub type SharedState = Arc<Mutex<ServerState>>;

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("Map not found")]
    MapNotFound,
    #[error("Bad request")]
    BadRequest,
    #[error("Invalid endpoint")]
    InvalidEndpoint,
    #[error("Join game request parse error")]
    JoinGameParse,
    #[error("Failed to parse action")]
    ActionParse,
    #[error("Failed to parse tick request JSON")]
    TickParse,
    #[error("Invalid method. Expected methods: {allowed}")]
    InvalidMethod { allowed: &'static str },
    #[error("Authorization header is missing")]
    InvalidAuthHeader,
    #[error("Player token has not been found")]
    UnknownToken,
    #[error("Internal server error")]
    ServerError,
}

impl ApiError {
    fn code(&self) -> &'static str {
        match self {
            Self::MapNotFound => "mapNotFound",
            Self::BadRequest | Self::InvalidEndpoint => "badRequest",
            Self::JoinGameParse | Self::ActionParse | Self::TickParse => "invalidArgument",
            Self::InvalidMethod { .. } => "invalidMethod",
            Self::InvalidAuthHeader => "invalidToken",
            Self::UnknownToken => "unknownToken",
            Self::ServerError => "serverError",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::MapNotFound => StatusCode::NOT_FOUND,
            Self::BadRequest
            | Self::InvalidEndpoint
            | Self::JoinGameParse
            | Self::ActionParse
            | Self::TickParse => StatusCode::BAD_REQUEST,
            Self::InvalidMethod { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Self::InvalidAuthHeader | Self::UnknownToken => StatusCode::UNAUTHORIZED,
            Self::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "code": self.code(), "message": self.to_string() });
        let mut response = api_json(self.status(), &body);
        if let Self::InvalidMethod { allowed } = self {
            response
                .headers_mut()
                .insert(header::ALLOW, HeaderValue::from_static(allowed));
        }
        response
    }
}

fn api_json(status: StatusCode, body: &Value) -> Response {
    (
        status,
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            ),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
        ],
        body.to_string(),
    )
        .into_response()
}

fn ok_json(body: &Value) -> Response {
    api_json(StatusCode::OK, body)
}

// HEAD responses keep the JSON headers but carry no payload.
fn empty_ok() -> Response {
    api_json(StatusCode::OK, &json!({}))
}

fn ensure_method(method: &Method, allowed: &[Method], allow: &'static str) -> Result<(), ApiError> {
    if allowed.contains(method) {
        Ok(())
    } else {
        Err(ApiError::InvalidMethod { allowed: allow })
    }
}

fn ensure_get_head(method: &Method) -> Result<(), ApiError> {
    ensure_method(method, &[Method::GET, Method::HEAD], "GET, HEAD")
}

fn ensure_post(method: &Method) -> Result<(), ApiError> {
    ensure_method(method, &[Method::POST], "POST")
}

fn ensure_json_content(headers: &HeaderMap) -> Result<(), ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());
    if content_type != Some("application/json") {
        return Err(ApiError::BadRequest);
    }
    Ok(())
}

fn bearer_token(headers: &HeaderMap) -> Result<Token, ApiError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(ApiError::InvalidAuthHeader)?;
    let hex = value
        .strip_prefix("Bearer ")
        .ok_or(ApiError::InvalidAuthHeader)?;
    if hex.len() == 32 && hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        Ok(Token::new(hex))
    } else {
        Err(ApiError::InvalidAuthHeader)
    }
}

fn map_as_json(map: &Map, loot_types: &[Value], short_info: bool) -> Value {
    let mut json_map = JsonMap::new();
    json_map.insert("id".to_string(), json!(map.id().as_str()));
    json_map.insert("name".to_string(), json!(map.name()));
    if short_info {
        return Value::Object(json_map);
    }

    json_map.insert("lootTypes".to_string(), Value::Array(loot_types.to_vec()));

    let roads: Vec<Value> = map
        .roads()
        .iter()
        .map(|road| {
            let start = road.start();
            let end = road.end();
            if road.is_horizontal() {
                json!({ "x0": start.x, "y0": start.y, "x1": end.x })
            } else {
                json!({ "x0": start.x, "y0": start.y, "y1": end.y })
            }
        })
        .collect();
    json_map.insert("roads".to_string(), Value::Array(roads));

    let offices: Vec<Value> = map
        .offices()
        .iter()
        .map(|office| {
            json!({
                "id": office.id.as_str(),
                "x": office.position.x,
                "y": office.position.y,
                "offsetX": office.offset.dx,
                "offsetY": office.offset.dy,
            })
        })
        .collect();
    json_map.insert("offices".to_string(), Value::Array(offices));

    let buildings: Vec<Value> = map
        .buildings()
        .iter()
        .map(|building| {
            json!({
                "x": building.bounds.position.x,
                "y": building.bounds.position.y,
                "w": building.bounds.size.width,
                "h": building.bounds.size.height,
            })
        })
        .collect();
    json_map.insert("buildings".to_string(), Value::Array(buildings));

    Value::Object(json_map)
}

#[derive(Debug, Deserialize)]
struct JoinRequest {
    #[serde(rename = "userName")]
    user_name: String,
    #[serde(rename = "mapId")]
    map_id: String,
}

#[derive(Debug, Deserialize)]
struct ActionRequest {
    #[serde(rename = "move")]
    direction: String,
}

#[derive(Debug, Deserialize)]
struct TickRequest {
    #[serde(rename = "timeDelta")]
    time_delta: i64,
}

async fn all_maps(State(state): State<SharedState>, method: Method) -> Result<Response, ApiError> {
    ensure_get_head(&method)?;
    if method == Method::HEAD {
        return Ok(empty_ok());
    }
    let guard = state.lock().await;
    let maps: Vec<Value> = guard
        .app
        .maps()
        .iter()
        .map(|map| map_as_json(map, &[], true))
        .collect();
    Ok(ok_json(&Value::Array(maps)))
}

async fn map_by_id(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    method: Method,
) -> Result<Response, ApiError> {
    ensure_get_head(&method)?;
    let guard = state.lock().await;
    let map_id = MapId::new(id);
    let map = guard.app.find_map(&map_id).ok_or(ApiError::MapNotFound)?;
    if method == Method::HEAD {
        return Ok(empty_ok());
    }
    let loot_types = guard
        .extra
        .loot_types
        .get(&map_id)
        .map(Vec::as_slice)
        .unwrap_or_default();
    Ok(ok_json(&map_as_json(map, loot_types, false)))
}

async fn join_game(
    State(state): State<SharedState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    ensure_post(&method)?;
    ensure_json_content(&headers)?;
    let request: JoinRequest =
        serde_json::from_slice(&body).map_err(|_| ApiError::JoinGameParse)?;
    if request.user_name.is_empty() {
        return Err(ApiError::JoinGameParse);
    }

    let mut guard = state.lock().await;
    let (token, dog_id) = guard
        .app
        .join_player(&MapId::new(request.map_id), &request.user_name)
        .ok_or(ApiError::MapNotFound)?;
    Ok(ok_json(&json!({
        "authToken": token.as_str(),
        "playerId": dog_id.value(),
    })))
}

async fn game_players(
    State(state): State<SharedState>,
    method: Method,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    ensure_get_head(&method)?;
    let token = bearer_token(&headers)?;
    let guard = state.lock().await;
    let players = guard
        .app
        .get_players(&token)
        .ok_or(ApiError::UnknownToken)?;
    if method == Method::HEAD {
        return Ok(empty_ok());
    }

    let mut body = JsonMap::new();
    for (dog_id, name) in players {
        body.insert(dog_id.to_string(), json!({ "name": name }));
    }
    Ok(ok_json(&Value::Object(body)))
}

async fn game_state(
    State(state): State<SharedState>,
    method: Method,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    ensure_get_head(&method)?;
    let token = bearer_token(&headers)?;
    let guard = state.lock().await;
    let view = guard.app.game_state(&token).ok_or(ApiError::UnknownToken)?;
    if method == Method::HEAD {
        return Ok(empty_ok());
    }

    let mut players = JsonMap::new();
    for player in view.players {
        let bag: Vec<Value> = player
            .bag
            .iter()
            .map(|item| json!({ "id": item.id.value(), "type": item.loot_type }))
            .collect();
        players.insert(
            player.id.to_string(),
            json!({
                "pos": [player.pos.x, player.pos.y],
                "speed": [player.speed.x, player.speed.y],
                "dir": player.dir.as_str(),
                "bag": bag,
                "score": player.score,
            }),
        );
    }

    let mut lost_objects = JsonMap::new();
    for obj in view.loot_objects {
        lost_objects.insert(
            obj.id.to_string(),
            json!({ "type": obj.loot_type, "pos": [obj.pos.x, obj.pos.y] }),
        );
    }

    Ok(ok_json(&json!({
        "players": players,
        "lostObjects": lost_objects,
    })))
}

async fn player_action(
    State(state): State<SharedState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    ensure_post(&method)?;
    let token = bearer_token(&headers)?;
    ensure_json_content(&headers)?;
    let request: ActionRequest = serde_json::from_slice(&body).map_err(|_| ApiError::ActionParse)?;

    let mut guard = state.lock().await;
    let moved = if request.direction.is_empty() {
        guard.app.stop_player(&token)
    } else {
        let direction = Direction::parse(&request.direction).ok_or(ApiError::ActionParse)?;
        guard.app.move_player(&token, direction)
    };
    if !moved {
        return Err(ApiError::UnknownToken);
    }
    Ok(ok_json(&json!({})))
}

async fn game_tick(
    State(state): State<SharedState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    ensure_post(&method)?;
    ensure_json_content(&headers)?;
    let request: TickRequest = serde_json::from_slice(&body).map_err(|_| ApiError::TickParse)?;
    if request.time_delta < 0 {
        return Err(ApiError::TickParse);
    }

    let mut guard = state.lock().await;
    match guard.app.time_tick(request.time_delta as u64).await {
        Ok(true) => Ok(ok_json(&json!({}))),
        Ok(false) => Err(ApiError::InvalidEndpoint),
        Err(error) => {
            logger::error("tick", &error.to_string());
            Err(ApiError::ServerError)
        }
    }
}

fn parse_query_param(params: &HashMap<String, String>, name: &str) -> Result<Option<i64>, ApiError> {
    match params.get(name) {
        None => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(|_| ApiError::BadRequest),
    }
}

fn normalize_records_window(
    start: Option<i64>,
    max_items: Option<i64>,
) -> Result<(i64, i64), ApiError> {
    let start = start.unwrap_or(0);
    let max_items = max_items.unwrap_or(0);
    if start < 0 || max_items < 0 || max_items > MAX_RECORD_ITEMS {
        return Err(ApiError::BadRequest);
    }
    let max_items = if max_items == 0 {
        MAX_RECORD_ITEMS
    } else {
        max_items
    };
    Ok((start, max_items))
}

async fn game_records(
    State(state): State<SharedState>,
    method: Method,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    ensure_get_head(&method)?;
    let start = parse_query_param(&params, "start")?;
    let max_items = parse_query_param(&params, "maxItems")?;
    let (start, max_items) = normalize_records_window(start, max_items)?;

    let guard = state.lock().await;
    let records = guard.app.records(start, max_items).await.map_err(|error| {
        logger::error("records", &error.to_string());
        ApiError::ServerError
    })?;

    let body: Vec<Value> = records
        .iter()
        .map(|player| {
            json!({
                "name": player.name(),
                "score": player.score(),
                "playTime": player.play_time_ms() as f64 / 1000.0,
            })
        })
        .collect();
    Ok(ok_json(&Value::Array(body)))
}

async fn api_bad_request() -> ApiError {
    ApiError::BadRequest
}

// Request/response log decorator around every route including static files.
async fn log_requests(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let ip = addr.ip().to_string();
    logger::request_received(&ip, request.method().as_str(), &request.uri().to_string());

    let started = Instant::now();
    let response = next.run(request).await;

    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());
    logger::response_sent(
        &ip,
        started.elapsed().as_millis(),
        response.status().as_u16(),
        content_type,
    );
    response
}

// '+' in a request path decodes to a space, like form encoding; rewrite it to
// %20 so the file service resolves the right name.
async fn plus_to_space(mut request: Request, next: Next) -> Response {
    if request.uri().path().contains('+') {
        let path = request.uri().path().replace('+', "%20");
        let path_and_query = match request.uri().query() {
            Some(query) => format!("{path}?{query}"),
            None => path,
        };
        if let Ok(path_and_query) = path_and_query.parse::<PathAndQuery>() {
            let mut parts = request.uri().clone().into_parts();
            parts.path_and_query = Some(path_and_query);
            if let Ok(uri) = Uri::from_parts(parts) {
                *request.uri_mut() = uri;
            }
        }
    }
    next.run(request).await
}

pub fn router(state: SharedState, www_root: PathBuf) -> Router {
    Router::new()
        .route("/api/v1/maps", any(all_maps))
        .route("/api/v1/maps/{id}", any(map_by_id))
        .route("/api/v1/game/join", any(join_game))
        .route("/api/v1/game/players", any(game_players))
        .route("/api/v1/game/state", any(game_state))
        .route("/api/v1/game/player/action", any(player_action))
        .route("/api/v1/game/tick", any(game_tick))
        .route("/api/v1/game/records", any(game_records))
        .route("/api", any(api_bad_request))
        .route("/api/{*rest}", any(api_bad_request))
        .fallback_service(ServeDir::new(www_root))
        .layer(middleware::from_fn(plus_to_space))
        .layer(middleware::from_fn(log_requests))
        .layer(TimeoutLayer::new(Duration::from_secs(HTTP_TIMEOUT_S)))
        .with_state(state)
}

pub fn start_tick_loop(state: SharedState, period_ms: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(period_ms.max(1)));
        loop {
            interval.tick().await;
            let mut guard = state.lock().await;
            if let Err(error) = guard.app.tick(period_ms).await {
                logger::error("tick", &error.to_string());
            }
        }
    });
}
