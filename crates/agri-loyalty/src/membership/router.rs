use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use super::domain::{
    Actor, ApprovalStatus, CompletionStatus, Currency, ExchangeConfig, MemberId, Mission,
    MissionId, TierDefinition,
};
use super::failure::FailureKind;
use super::repository::RewardStore;
use super::service::{AdjustmentRequest, MembershipError, MembershipService, RegistrationRequest};

pub const MEMBER_ID_HEADER: &str = "x-member-id";
pub const MEMBER_ROLE_HEADER: &str = "x-member-role";
pub const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Deserialize)]
pub(crate) struct ExchangeRequest {
    pub(crate) coins: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApprovalOverride {
    pub(crate) status: ApprovalStatus,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReviewRequest {
    pub(crate) approve: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ExpirationRequest {
    pub(crate) currency: Currency,
    pub(crate) amount: i64,
    #[serde(default)]
    pub(crate) description: Option<String>,
}

/// Router exposing member and administrator endpoints over one service.
pub fn membership_router<S>(service: Arc<MembershipService<S>>) -> Router
where
    S: RewardStore + 'static,
{
    Router::new()
        .route("/api/v1/members", post(register_handler::<S>))
        .route("/api/v1/me", get(dashboard_handler::<S>))
        .route("/api/v1/me/checkins", post(checkin_handler::<S>))
        .route("/api/v1/me/missions", get(missions_handler::<S>))
        .route(
            "/api/v1/me/missions/:mission_id/claim",
            post(claim_handler::<S>),
        )
        .route("/api/v1/me/exchanges", post(exchange_handler::<S>))
        .route("/api/v1/me/ledger/:currency", get(ledger_handler::<S>))
        .route(
            "/api/v1/admin/members/:member_id/adjustments",
            post(adjustment_handler::<S>),
        )
        .route(
            "/api/v1/admin/members/:member_id/expirations",
            post(expiration_handler::<S>),
        )
        .route(
            "/api/v1/admin/members/:member_id/approval",
            put(approval_handler::<S>),
        )
        .route("/api/v1/admin/missions", post(publish_mission_handler::<S>))
        .route(
            "/api/v1/admin/missions/:mission_id/completions/:member_id",
            post(review_handler::<S>),
        )
        .route(
            "/api/v1/admin/exchange-config",
            get(exchange_config_handler::<S>).put(update_exchange_config_handler::<S>),
        )
        .route("/api/v1/admin/tiers", put(tiers_handler::<S>))
        .with_state(service)
}

/// Identity forwarded by the authenticating proxy in front of this service.
pub fn actor_from_headers(headers: &HeaderMap) -> Option<Actor> {
    let member_id = headers.get(MEMBER_ID_HEADER)?.to_str().ok()?.trim();
    if member_id.is_empty() {
        return None;
    }
    let is_admin = headers
        .get(MEMBER_ROLE_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|role| role.trim().eq_ignore_ascii_case(ADMIN_ROLE))
        .unwrap_or(false);

    Some(Actor {
        member_id: MemberId(member_id.to_string()),
        is_admin,
    })
}

fn unauthenticated() -> Response {
    let payload = json!({
        "error": format!("missing {MEMBER_ID_HEADER} header"),
    });
    (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
}

fn failure_response(error: MembershipError) -> Response {
    let kind = error.kind();
    let payload = json!({
        "error": error.to_string(),
        "kind": kind,
    });
    (kind.status_code(), Json(payload)).into_response()
}

fn respond<T: serde::Serialize>(
    status: StatusCode,
    result: Result<T, MembershipError>,
) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(error) => failure_response(error),
    }
}

macro_rules! actor_or_401 {
    ($headers:expr) => {
        match actor_from_headers(&$headers) {
            Some(actor) => actor,
            None => return unauthenticated(),
        }
    };
}

pub(crate) async fn register_handler<S>(
    State(service): State<Arc<MembershipService<S>>>,
    Json(request): Json<RegistrationRequest>,
) -> Response
where
    S: RewardStore + 'static,
{
    respond(StatusCode::CREATED, service.register(request, Utc::now()))
}

pub(crate) async fn dashboard_handler<S>(
    State(service): State<Arc<MembershipService<S>>>,
    headers: HeaderMap,
) -> Response
where
    S: RewardStore + 'static,
{
    let actor = actor_or_401!(headers);
    respond(StatusCode::OK, service.dashboard(&actor, Utc::now()))
}

pub(crate) async fn checkin_handler<S>(
    State(service): State<Arc<MembershipService<S>>>,
    headers: HeaderMap,
) -> Response
where
    S: RewardStore + 'static,
{
    let actor = actor_or_401!(headers);
    respond(StatusCode::CREATED, service.check_in(&actor, Utc::now()))
}

pub(crate) async fn missions_handler<S>(
    State(service): State<Arc<MembershipService<S>>>,
    headers: HeaderMap,
) -> Response
where
    S: RewardStore + 'static,
{
    let actor = actor_or_401!(headers);
    respond(StatusCode::OK, service.missions(&actor, Utc::now()))
}

pub(crate) async fn claim_handler<S>(
    State(service): State<Arc<MembershipService<S>>>,
    headers: HeaderMap,
    Path(mission_id): Path<String>,
) -> Response
where
    S: RewardStore + 'static,
{
    let actor = actor_or_401!(headers);
    match service.claim_mission(&actor, &MissionId(mission_id), Utc::now()) {
        Ok(outcome) => {
            let status = match outcome.completion.status {
                CompletionStatus::Pending => StatusCode::ACCEPTED,
                _ => StatusCode::CREATED,
            };
            (status, Json(outcome)).into_response()
        }
        Err(error) => failure_response(error),
    }
}

pub(crate) async fn exchange_handler<S>(
    State(service): State<Arc<MembershipService<S>>>,
    headers: HeaderMap,
    Json(request): Json<ExchangeRequest>,
) -> Response
where
    S: RewardStore + 'static,
{
    let actor = actor_or_401!(headers);
    respond(
        StatusCode::OK,
        service.exchange(&actor, request.coins, Utc::now()),
    )
}

pub(crate) async fn ledger_handler<S>(
    State(service): State<Arc<MembershipService<S>>>,
    headers: HeaderMap,
    Path(currency): Path<String>,
) -> Response
where
    S: RewardStore + 'static,
{
    let actor = actor_or_401!(headers);
    let currency = match currency.parse::<Currency>() {
        Ok(currency) => currency,
        Err(error) => {
            let payload = json!({
                "error": error.to_string(),
                "kind": FailureKind::Validation,
            });
            return (FailureKind::Validation.status_code(), Json(payload)).into_response();
        }
    };
    respond(StatusCode::OK, service.ledger_history(&actor, currency))
}

pub(crate) async fn adjustment_handler<S>(
    State(service): State<Arc<MembershipService<S>>>,
    headers: HeaderMap,
    Path(member_id): Path<String>,
    Json(request): Json<AdjustmentRequest>,
) -> Response
where
    S: RewardStore + 'static,
{
    let actor = actor_or_401!(headers);
    respond(
        StatusCode::CREATED,
        service.admin_adjust(&actor, &MemberId(member_id), request, Utc::now()),
    )
}

pub(crate) async fn expiration_handler<S>(
    State(service): State<Arc<MembershipService<S>>>,
    headers: HeaderMap,
    Path(member_id): Path<String>,
    Json(request): Json<ExpirationRequest>,
) -> Response
where
    S: RewardStore + 'static,
{
    let actor = actor_or_401!(headers);
    respond(
        StatusCode::CREATED,
        service.admin_expire(
            &actor,
            &MemberId(member_id),
            request.currency,
            request.amount,
            request.description,
            Utc::now(),
        ),
    )
}

pub(crate) async fn approval_handler<S>(
    State(service): State<Arc<MembershipService<S>>>,
    headers: HeaderMap,
    Path(member_id): Path<String>,
    Json(request): Json<ApprovalOverride>,
) -> Response
where
    S: RewardStore + 'static,
{
    let actor = actor_or_401!(headers);
    respond(
        StatusCode::OK,
        service.admin_set_approval(&actor, &MemberId(member_id), request.status, Utc::now()),
    )
}

pub(crate) async fn publish_mission_handler<S>(
    State(service): State<Arc<MembershipService<S>>>,
    headers: HeaderMap,
    Json(mission): Json<Mission>,
) -> Response
where
    S: RewardStore + 'static,
{
    let actor = actor_or_401!(headers);
    respond(
        StatusCode::CREATED,
        service.admin_publish_mission(&actor, mission),
    )
}

pub(crate) async fn review_handler<S>(
    State(service): State<Arc<MembershipService<S>>>,
    headers: HeaderMap,
    Path((mission_id, member_id)): Path<(String, String)>,
    Json(request): Json<ReviewRequest>,
) -> Response
where
    S: RewardStore + 'static,
{
    let actor = actor_or_401!(headers);
    respond(
        StatusCode::OK,
        service.admin_review_completion(
            &actor,
            &MemberId(member_id),
            &MissionId(mission_id),
            request.approve,
            Utc::now(),
        ),
    )
}

pub(crate) async fn exchange_config_handler<S>(
    State(service): State<Arc<MembershipService<S>>>,
    headers: HeaderMap,
) -> Response
where
    S: RewardStore + 'static,
{
    let actor = actor_or_401!(headers);
    if !actor.is_admin {
        return failure_response(MembershipError::Forbidden);
    }
    respond(StatusCode::OK, service.exchange_config())
}

pub(crate) async fn update_exchange_config_handler<S>(
    State(service): State<Arc<MembershipService<S>>>,
    headers: HeaderMap,
    Json(config): Json<ExchangeConfig>,
) -> Response
where
    S: RewardStore + 'static,
{
    let actor = actor_or_401!(headers);
    respond(
        StatusCode::OK,
        service.admin_update_exchange_config(&actor, config),
    )
}

pub(crate) async fn tiers_handler<S>(
    State(service): State<Arc<MembershipService<S>>>,
    headers: HeaderMap,
    Json(definitions): Json<Vec<TierDefinition>>,
) -> Response
where
    S: RewardStore + 'static,
{
    let actor = actor_or_401!(headers);
    respond(
        StatusCode::OK,
        service.admin_replace_tiers(&actor, definitions),
    )
}
