//! Route handlers. Database work runs on the blocking pool, one connection per request.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::build_info;
use crate::discovery::{self, NearbyResults};
use crate::error::Result;
use crate::geo::GeoPoint;
use crate::http::error::{ApiError, ApiResult};
use crate::http::{AppState, Identity};
use crate::lifecycle::{self, TransitionRequest};
use crate::model::{Mode, OtpType, Status, Task, TaskEvent};
use crate::observability::task_span;
use crate::store::tasks::NewTask;
use crate::store::{MarketDb, events, tasks};

async fn blocking<T, F>(state: &AppState, f: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&mut MarketDb) -> Result<T> + Send + 'static,
{
    let store = state.store.clone();
    let out = tokio::task::spawn_blocking(move || {
        let mut db = store.open()?;
        f(&mut db)
    })
    .await?;
    out.map_err(ApiError::from)
}

fn body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(v)| v)
        .map_err(|e| ApiError::bad_request(e.body_text()))
}

fn query<T>(params: std::result::Result<Query<T>, QueryRejection>) -> ApiResult<T> {
    params
        .map(|Query(v)| v)
        .map_err(|e| ApiError::bad_request(e.body_text()))
}

fn required(value: Option<String>, what: &str) -> ApiResult<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::bad_request(format!("{what} required")))
}

fn parse_label<T>(raw: &str, what: &str) -> ApiResult<T>
where
    T: std::str::FromStr,
{
    raw.parse()
        .map_err(|_| ApiError::bad_request(format!("unknown {what} '{raw}'")))
}

pub async fn healthz() -> Json<Value> {
    Json(json!({
        "ok": true,
        "version": build_info::version(),
        "gitSha": build_info::git_sha(),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskBody {
    pub title: Option<String>,
    pub description: Option<String>,
    pub budget: Option<i64>,
    pub mode: Option<Mode>,
    #[serde(default)]
    pub is_nearby: bool,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address_text: Option<String>,
}

pub async fn create_task(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    payload: std::result::Result<Json<CreateTaskBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    let req = body(payload)?;
    let new = NewTask {
        title: required(req.title, "title")?,
        description: req.description.filter(|d| !d.trim().is_empty()),
        budget: req
            .budget
            .ok_or_else(|| ApiError::bad_request("budget required"))?,
        mode: req.mode.unwrap_or_default(),
        is_nearby: req.is_nearby,
        location: req
            .latitude
            .zip(req.longitude)
            .map(|(lat, lng)| GeoPoint::new(lat, lng)),
        address_text: req.address_text,
    };
    let task = blocking(&state, move |db| {
        lifecycle::create_task(db, &identity.user_id, &new, Utc::now())
    })
    .await?;
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn get_task(
    State(state): State<Arc<AppState>>,
    _identity: Identity,
    Path(task_id): Path<String>,
) -> ApiResult<Json<Task>> {
    let task = blocking(&state, move |db| tasks::get(db.conn(), &task_id)).await?;
    Ok(Json(task))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptBody {
    pub task_id: Option<String>,
}

pub async fn accept_task(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    payload: std::result::Result<Json<AcceptBody>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let task_id = required(body(payload)?.task_id, "taskId")?;
    let accepted = blocking(&state, move |db| {
        let _span = task_span("accept", &task_id, &identity.user_id).entered();
        lifecycle::accept(db, &task_id, &identity.user_id, Utc::now())
    })
    .await?;
    Ok(Json(json!({
        "success": true,
        "message": "Task accepted successfully",
        "task": accepted.task,
        "handshake": accepted.handshake,
        "chat": accepted.chat,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueOtpBody {
    pub task_id: Option<String>,
    pub otp_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedOtpResponse {
    pub otp: String,
    pub otp_type: OtpType,
    pub expires_at: chrono::DateTime<Utc>,
    pub reused: bool,
    pub message: &'static str,
}

pub async fn issue_otp(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    payload: std::result::Result<Json<IssueOtpBody>, JsonRejection>,
) -> ApiResult<Json<IssuedOtpResponse>> {
    let req = body(payload)?;
    let task_id = required(req.task_id, "taskId")?;
    let otp_type: OtpType = parse_label(&required(req.otp_type, "otpType")?, "otpType")?;
    let ttl = state.config.otp_ttl();

    let issued = blocking(&state, move |db| {
        let _span = task_span("issue_otp", &task_id, &identity.user_id).entered();
        lifecycle::issue_otp(db, &task_id, otp_type, &identity.user_id, Utc::now(), ttl)
    })
    .await?;
    Ok(Json(IssuedOtpResponse {
        otp: issued.otp.code,
        otp_type: issued.otp.otp_type,
        expires_at: issued.otp.expires_at,
        reused: issued.reused,
        message: "OTP generated successfully",
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOtpQuery {
    pub task_id: Option<String>,
    pub otp: Option<String>,
    pub otp_type: Option<String>,
}

pub async fn verify_otp(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    params: std::result::Result<Query<VerifyOtpQuery>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let q = query(params)?;
    let task_id = required(q.task_id, "taskId")?;
    let code = required(q.otp, "otp")?;
    let otp_type: OtpType = parse_label(&required(q.otp_type, "otpType")?, "otpType")?;

    blocking(&state, move |db| {
        lifecycle::verify_otp(db, &task_id, otp_type, &code, &identity.user_id, Utc::now())
    })
    .await?;
    Ok(Json(json!({ "valid": true, "message": "OTP is valid" })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBody {
    pub task_id: Option<String>,
    pub new_status: Option<String>,
    pub otp: Option<String>,
    pub reason: Option<String>,
}

pub async fn update_status(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    payload: std::result::Result<Json<StatusBody>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let req = body(payload)?;
    let task_id = required(req.task_id, "taskId")?;
    let target: Status = parse_label(&required(req.new_status, "newStatus")?, "status")?;
    let request = TransitionRequest {
        task_id,
        target,
        otp: req.otp,
        reason: req.reason,
    };

    let outcome = blocking(&state, move |db| {
        let _span = task_span("transition", &request.task_id, &identity.user_id).entered();
        lifecycle::transition(db, &request, &identity.user_id, Utc::now())
    })
    .await?;

    let mut response = json!({
        "success": true,
        "message": format!("Task status updated to {}", outcome.task.status),
        "previousStatus": outcome.previous_status,
        "newStatus": outcome.task.status,
        "task": outcome.task,
    });
    if let Some(payment) = outcome.payment {
        response["payment"] = json!(payment);
    }
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct NearbyQuery {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub radius: Option<f64>,
}

pub async fn nearby_tasks(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    params: std::result::Result<Query<NearbyQuery>, QueryRejection>,
) -> ApiResult<Json<NearbyResults>> {
    let q = query(params)?;
    let (Some(lat), Some(lng)) = (q.lat, q.lng) else {
        return Err(ApiError::bad_request("location required"));
    };
    let radius = q.radius.unwrap_or(state.config.nearby_radius_m);

    let results = blocking(&state, move |db| {
        discovery::find_nearby(db, &identity.user_id, GeoPoint::new(lat, lng), radius)
    })
    .await?;
    Ok(Json(results))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsQuery {
    #[serde(default)]
    pub after: i64,
    pub limit: Option<u32>,
    pub task_id: Option<String>,
}

pub async fn list_events(
    State(state): State<Arc<AppState>>,
    _identity: Identity,
    params: std::result::Result<Query<EventsQuery>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let q = query(params)?;
    let after = q.after;
    let feed: Vec<TaskEvent> = blocking(&state, move |db| {
        events::read_after(db.conn(), after, q.task_id.as_deref(), q.limit)
    })
    .await?;
    let next = feed.last().map_or(after, |e| e.id);
    Ok(Json(json!({ "events": feed, "next": next })))
}
