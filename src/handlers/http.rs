//! REST surface: natural-language creation plus plain CRUD over the caller's events.

use std::convert::Infallible;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use warp::http::StatusCode;
use warp::reply::{Reply, Response};
use warp::{Filter, Rejection};

use crate::handlers::action::ActionEngine;
use crate::handlers::api_error::ApiError;
use crate::handlers::auth::{API_TOKEN_HEADER, TokenAuthenticator};
use crate::models::action::ActionSummary;
use crate::models::event::{
    EventFilter, EventPatch, EventType, MAX_SCORE, MIN_SCORE, NewEvent, Quadrant, is_storable_time,
};
use crate::store::EventStore;

const MAX_BODY_BYTES: u64 = 64 * 1024;

#[derive(Debug)]
struct Unauthorized;

impl warp::reject::Reject for Unauthorized {}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ActionEngine>,
    pub store: Arc<dyn EventStore>,
    pub auth: Arc<TokenAuthenticator>,
}

impl AppState {
    pub fn new(engine: ActionEngine, store: Arc<dyn EventStore>, auth: TokenAuthenticator) -> Self {
        Self {
            engine: Arc::new(engine),
            store,
            auth: Arc::new(auth),
        }
    }
}

#[derive(Debug, Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ActionSummary>,
}

fn respond<T: Serialize>(status: StatusCode, data: T) -> Response {
    let body = ApiResponse {
        success: true,
        data,
        message: None,
        summary: None,
    };
    warp::reply::with_status(warp::reply::json(&body), status).into_response()
}

#[derive(Debug, Deserialize)]
pub struct AiCreateRequest {
    #[serde(default)]
    pub prompt: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub completed: Option<bool>,
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub quadrant: Option<String>,
}

impl ListQuery {
    fn into_filter(self) -> Result<EventFilter, ApiError> {
        Ok(EventFilter {
            completed: self.completed,
            event_type: self.event_type.as_deref().map(parse_type).transpose()?,
            quadrant: self
                .quadrant
                .as_deref()
                .map(|q| q.parse::<Quadrant>().map_err(ApiError::bad_request))
                .transpose()?,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub urgency: Option<i64>,
    pub importance: Option<i64>,
    pub due_date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub completed: Option<bool>,
}

impl CreateEventRequest {
    pub fn validate(self) -> Result<NewEvent, ApiError> {
        let title = self
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::bad_request("Title is required"))?;

        let mut fields = NewEvent::new(title);
        fields.description = self.description;
        if let Some(raw) = self.event_type.as_deref() {
            fields.event_type = parse_type(raw)?;
        }
        if let Some(urgency) = self.urgency {
            fields.urgency = parse_strict_score("urgency", urgency)?;
        }
        if let Some(importance) = self.importance {
            fields.importance = parse_strict_score("importance", importance)?;
        }
        fields.due_date = self.due_date.as_deref().map(|v| parse_rfc3339("dueDate", v)).transpose()?;
        fields.start_time = self
            .start_time
            .as_deref()
            .map(|v| parse_rfc3339("startTime", v))
            .transpose()?;
        fields.end_time = self.end_time.as_deref().map(|v| parse_rfc3339("endTime", v)).transpose()?;
        match (fields.start_time, fields.end_time) {
            (None, Some(_)) => return Err(ApiError::bad_request("endTime requires startTime")),
            (Some(start), Some(end)) if end < start => {
                return Err(ApiError::bad_request("endTime must not be before startTime"));
            }
            _ => {}
        }
        fields.completed = self.completed.unwrap_or(false);
        Ok(fields)
    }
}

// Distinguishes an absent key (`None`) from an explicit null (`Some(None)`).
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEventRequest {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub urgency: Option<i64>,
    pub importance: Option<i64>,
    #[serde(default, deserialize_with = "double_option")]
    pub due_date: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub start_time: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub end_time: Option<Option<String>>,
    pub completed: Option<bool>,
}

impl UpdateEventRequest {
    pub fn validate(self) -> Result<EventPatch, ApiError> {
        let title = match self.title {
            Some(title) if title.trim().is_empty() => {
                return Err(ApiError::bad_request("Title must not be empty"));
            }
            other => other,
        };
        let nullable_date = |key: &'static str, value: Option<Option<String>>| {
            value
                .map(|inner| inner.as_deref().map(|v| parse_rfc3339(key, v)).transpose())
                .transpose()
        };

        let patch = EventPatch {
            title,
            description: self.description,
            event_type: self.event_type.as_deref().map(parse_type).transpose()?,
            urgency: self
                .urgency
                .map(|v| parse_strict_score("urgency", v))
                .transpose()?,
            importance: self
                .importance
                .map(|v| parse_strict_score("importance", v))
                .transpose()?,
            due_date: nullable_date("dueDate", self.due_date)?,
            start_time: nullable_date("startTime", self.start_time)?,
            end_time: nullable_date("endTime", self.end_time)?,
            completed: self.completed,
        };
        if patch.is_empty() {
            return Err(ApiError::bad_request("No fields to update"));
        }
        Ok(patch)
    }
}

fn parse_type(raw: &str) -> Result<EventType, ApiError> {
    EventType::parse(raw).ok_or_else(|| ApiError::bad_request(format!("Invalid event type: {}", raw)))
}

fn parse_strict_score(field: &str, value: i64) -> Result<u8, ApiError> {
    if (MIN_SCORE as i64..=MAX_SCORE as i64).contains(&value) {
        Ok(value as u8)
    } else {
        Err(ApiError::bad_request(format!(
            "{} must be an integer between {} and {}",
            field, MIN_SCORE, MAX_SCORE
        )))
    }
}

fn parse_rfc3339(field: &str, value: &str) -> Result<DateTime<Utc>, ApiError> {
    let parsed = DateTime::parse_from_rfc3339(value.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| ApiError::bad_request(format!("{} must be an RFC 3339 timestamp", field)))?;
    if !is_storable_time(&parsed) {
        return Err(ApiError::bad_request(format!("{} is out of range", field)));
    }
    Ok(parsed)
}

fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn json_body<T>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone
where
    T: for<'de> Deserialize<'de> + Send,
{
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

/// Resolves the calling user or rejects with 401.
fn authenticated(auth: Arc<TokenAuthenticator>) -> impl Filter<Extract = (String,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization")
        .and(warp::header::optional::<String>(API_TOKEN_HEADER))
        .and_then(move |authorization: Option<String>, token: Option<String>| {
            let auth = auth.clone();
            async move {
                auth.resolve(authorization.as_deref(), token.as_deref())
                    .ok_or_else(|| warp::reject::custom(Unauthorized))
            }
        })
}

pub fn routes(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let auth = state.auth.clone();

    let ai_create_route = warp::path!("events" / "ai-create")
        .and(warp::post())
        .and(authenticated(auth.clone()))
        .and(json_body::<AiCreateRequest>())
        .and(with_state(state.clone()))
        .and_then(ai_create);

    let list_route = warp::path!("events")
        .and(warp::get())
        .and(authenticated(auth.clone()))
        .and(warp::query::<ListQuery>())
        .and(with_state(state.clone()))
        .and_then(list_events);

    let create_route = warp::path!("events")
        .and(warp::post())
        .and(authenticated(auth.clone()))
        .and(json_body::<CreateEventRequest>())
        .and(with_state(state.clone()))
        .and_then(create_event);

    let get_route = warp::path!("events" / String)
        .and(warp::get())
        .and(authenticated(auth.clone()))
        .and(with_state(state.clone()))
        .and_then(get_event);

    let update_route = warp::path!("events" / String)
        .and(warp::patch())
        .and(authenticated(auth.clone()))
        .and(json_body::<UpdateEventRequest>())
        .and(with_state(state.clone()))
        .and_then(update_event);

    let delete_route = warp::path!("events" / String)
        .and(warp::delete())
        .and(authenticated(auth))
        .and(with_state(state))
        .and_then(delete_event);

    ai_create_route
        .or(list_route)
        .unify()
        .or(create_route)
        .unify()
        .or(get_route)
        .unify()
        .or(update_route)
        .unify()
        .or(delete_route)
        .unify()
        .recover(handle_rejection)
}

async fn ai_create(user_id: String, body: AiCreateRequest, state: AppState) -> Result<Response, Rejection> {
    let prompt = body.prompt.unwrap_or_default();
    let response = match state.engine.handle_prompt(&user_id, &prompt).await {
        Ok(report) => {
            let body = ApiResponse {
                success: true,
                message: Some(report.message()),
                summary: Some(report.summary),
                data: report.results,
            };
            warp::reply::with_status(warp::reply::json(&body), StatusCode::CREATED).into_response()
        }
        Err(err) => ApiError::from(err).into_response(),
    };
    Ok(response)
}

async fn list_events(user_id: String, query: ListQuery, state: AppState) -> Result<Response, Rejection> {
    let result = async {
        let filter = query.into_filter()?;
        let events = state.store.list_events(&user_id, &filter).await?;
        Ok::<_, ApiError>(respond(StatusCode::OK, events))
    }
    .await;
    Ok(result.unwrap_or_else(Reply::into_response))
}

async fn create_event(user_id: String, body: CreateEventRequest, state: AppState) -> Result<Response, Rejection> {
    let result = async {
        let fields = body.validate()?;
        let event = state.store.create_event(&user_id, fields).await?;
        log::info!("event=event_created user_id={} event_id={}", user_id, event.id);
        Ok::<_, ApiError>(respond(StatusCode::CREATED, event))
    }
    .await;
    Ok(result.unwrap_or_else(Reply::into_response))
}

async fn get_event(id: String, user_id: String, state: AppState) -> Result<Response, Rejection> {
    let result = async {
        let event = state
            .store
            .find_owned(&user_id, &id)
            .await?
            .ok_or_else(|| ApiError::not_found("Event not found"))?;
        Ok::<_, ApiError>(respond(StatusCode::OK, event))
    }
    .await;
    Ok(result.unwrap_or_else(Reply::into_response))
}

async fn update_event(
    id: String,
    user_id: String,
    body: UpdateEventRequest,
    state: AppState,
) -> Result<Response, Rejection> {
    let result = async {
        let patch = body.validate()?;
        let event = state.store.update_event(&user_id, &id, &patch).await?;
        log::info!("event=event_updated user_id={} event_id={}", user_id, event.id);
        Ok::<_, ApiError>(respond(StatusCode::OK, event))
    }
    .await;
    Ok(result.unwrap_or_else(Reply::into_response))
}

#[derive(Debug, Serialize)]
struct Deleted {
    id: String,
    deleted: bool,
}

async fn delete_event(id: String, user_id: String, state: AppState) -> Result<Response, Rejection> {
    let result = async {
        if !state.store.delete_event(&user_id, &id).await? {
            return Err(ApiError::not_found("Event not found"));
        }
        log::info!("event=event_deleted user_id={} event_id={}", user_id, id);
        Ok::<_, ApiError>(respond(StatusCode::OK, Deleted { id: id.clone(), deleted: true }))
    }
    .await;
    Ok(result.unwrap_or_else(Reply::into_response))
}

async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    let api_error = if err.find::<Unauthorized>().is_some() {
        ApiError::unauthorized()
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        ApiError::bad_request(format!("Invalid request body: {}", e))
    } else if err.find::<warp::reject::InvalidQuery>().is_some() {
        ApiError::bad_request("Invalid query string")
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        ApiError::new(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large")
    } else if err.find::<warp::reject::LengthRequired>().is_some() {
        ApiError::new(StatusCode::LENGTH_REQUIRED, "Content-Length required")
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        ApiError::new(StatusCode::UNSUPPORTED_MEDIA_TYPE, "Expected a JSON body")
    } else if err.is_not_found() {
        ApiError::not_found("Not found")
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        ApiError::new(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
    } else {
        log::error!("event=unhandled_rejection rejection={:?}", err);
        ApiError::internal()
    };
    Ok(api_error.into_response())
}
