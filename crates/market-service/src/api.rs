//! HTTP API for the marketplace core.
//!
//! Thin glue: every handler authenticates the signed payload from the
//! `Authorization` header, resolves the account and calls exactly one
//! core operation. All business rules live behind those operations.

use axum::{
	extract::{Path, Query, State},
	http::{HeaderMap, StatusCode},
	response::{IntoResponse, Json, Response},
	routing::{get, post},
	Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use market_core::Marketplace;
use market_feed::{ApplyOutcome, MatchError};
use market_identity::ResolveError;
use market_orders::LifecycleError;
use market_storage::StorageError;
use market_types::{Account, Application, ApplicationId, GeoPoint, Order, OrderDraft, OrderId, Role};

/// Shared application state for the API server.
#[derive(Clone)]
struct AppState {
	market: Arc<Marketplace>,
}

/// Starts the HTTP server and runs it until `shutdown` resolves.
pub async fn start_http_server(
	market: Arc<Marketplace>,
	port: u16,
	shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
	let app = router(market);

	let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
	info!("API server listening on port {}", port);

	axum::serve(listener, app)
		.with_graceful_shutdown(shutdown)
		.await?;

	Ok(())
}

fn router(market: Arc<Marketplace>) -> Router {
	let state = AppState { market };

	Router::new()
		.route("/health", get(health_check))
		// Customer side
		.route("/api/orders", post(create_order))
		.route("/api/orders/{id}/cancel", post(cancel_order))
		.route("/api/orders/{id}/accept", post(accept_application))
		.route("/api/orders/{id}/complete", post(complete_order))
		.route("/api/orders/{id}/applications", get(list_applications))
		// Worker side
		.route("/api/worker/feed", get(worker_feed))
		.route("/api/worker/apply/{order_id}", post(worker_apply))
		.route("/api/worker/skip/{order_id}", post(worker_skip))
		.with_state(state)
		.layer(TraceLayer::new_for_http())
		.layer(CorsLayer::permissive())
}

/// Request-level error with its HTTP mapping.
#[derive(Debug)]
enum ApiError {
	Unauthorized(String),
	/// The identity is valid but has no account yet.
	OnboardingRequired,
	BadRequest(String),
	Forbidden(String),
	NotFound(String),
	Conflict(String),
	Internal(String),
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let (status, message) = match self {
			ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
			ApiError::OnboardingRequired => (
				StatusCode::NOT_FOUND,
				"Account not found. Complete onboarding in the bot first".to_string(),
			),
			ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
			ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
			ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
			ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
			ApiError::Internal(msg) => {
				// The detail goes to the log, not the client.
				error!("internal error serving request: {}", msg);
				(
					StatusCode::INTERNAL_SERVER_ERROR,
					"Internal server error".to_string(),
				)
			}
		};

		let body = Json(json!({ "detail": message }));
		(status, body).into_response()
	}
}

impl From<ResolveError> for ApiError {
	fn from(e: ResolveError) -> Self {
		match e {
			ResolveError::NotFound(_) => ApiError::OnboardingRequired,
			ResolveError::Storage(StorageError::NotFound) => {
				ApiError::NotFound("Not found".to_string())
			}
			ResolveError::Storage(e) => ApiError::Internal(e.to_string()),
		}
	}
}

impl From<LifecycleError> for ApiError {
	fn from(e: LifecycleError) -> Self {
		match e {
			LifecycleError::Validation(e) => ApiError::BadRequest(e.to_string()),
			LifecycleError::Forbidden { .. } => ApiError::Forbidden(e.to_string()),
			LifecycleError::InvalidTransition { .. } => ApiError::Conflict(e.to_string()),
			LifecycleError::ApplicationMismatch { .. } => ApiError::Conflict(e.to_string()),
			LifecycleError::SkippedApplication(_) => ApiError::Conflict(e.to_string()),
			LifecycleError::Storage(StorageError::NotFound) => {
				ApiError::NotFound("Order not found".to_string())
			}
			LifecycleError::Storage(e) => ApiError::Internal(e.to_string()),
		}
	}
}

impl From<MatchError> for ApiError {
	fn from(e: MatchError) -> Self {
		match e {
			MatchError::Storage(StorageError::NotFound) => {
				ApiError::NotFound("Order not found".to_string())
			}
			MatchError::Storage(e) => ApiError::Internal(e.to_string()),
		}
	}
}

/// Verifies the signed payload in the `Authorization` header and
/// resolves the account behind it.
async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Account, ApiError> {
	let raw = headers
		.get(axum::http::header::AUTHORIZATION)
		.and_then(|v| v.to_str().ok())
		.ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".to_string()))?;

	let identity = state.market.verifier().verify(raw).map_err(|e| {
		warn!("rejected request credential: {}", e);
		ApiError::Unauthorized("Invalid authorization data".to_string())
	})?;

	Ok(state.market.identity().resolve(&identity).await?)
}

fn require_role(account: &Account, role: Role) -> Result<(), ApiError> {
	if account.role != role {
		return Err(ApiError::Forbidden(format!(
			"This endpoint requires the {:?} role",
			role
		)));
	}
	Ok(())
}

async fn health_check() -> Json<serde_json::Value> {
	Json(json!({
		"status": "ok",
		"timestamp": chrono::Utc::now().timestamp(),
	}))
}

// --- customer side ---

#[derive(Debug, Deserialize)]
struct CreateOrderRequest {
	service_id: String,
	price: i64,
	duration: String,
	#[serde(default)]
	comment: Option<String>,
	address: String,
	latitude: f64,
	longitude: f64,
	/// Photo keys come comma-joined from the upload widget.
	#[serde(default)]
	photos: Option<String>,
}

impl CreateOrderRequest {
	fn into_draft(self) -> OrderDraft {
		let photos = self
			.photos
			.map(|joined| {
				joined
					.split(',')
					.map(str::trim)
					.filter(|s| !s.is_empty())
					.map(String::from)
					.collect()
			})
			.unwrap_or_default();

		OrderDraft {
			service_category: self.service_id,
			price: self.price,
			duration: self.duration,
			comment: self.comment,
			address: self.address,
			// Clients send latitude/longitude fields; the POINT(lon lat)
			// convention stops at this boundary.
			location: GeoPoint {
				latitude: self.latitude,
				longitude: self.longitude,
			},
			photos,
		}
	}
}

async fn create_order(
	State(state): State<AppState>,
	headers: HeaderMap,
	Json(request): Json<CreateOrderRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
	let account = authenticate(&state, &headers).await?;
	require_role(&account, Role::Customer)?;

	let order = state
		.market
		.lifecycle()
		.create(&account, request.into_draft())
		.await?;

	Ok(Json(json!({ "status": "ok", "order_id": order.id })))
}

async fn cancel_order(
	State(state): State<AppState>,
	Path(id): Path<OrderId>,
	headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
	let account = authenticate(&state, &headers).await?;
	let order = state.market.lifecycle().cancel(id, &account).await?;
	Ok(Json(json!({ "status": "canceled", "order_id": order.id })))
}

#[derive(Debug, Deserialize)]
struct AcceptRequest {
	application_id: ApplicationId,
}

async fn accept_application(
	State(state): State<AppState>,
	Path(id): Path<OrderId>,
	headers: HeaderMap,
	Json(request): Json<AcceptRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
	let account = authenticate(&state, &headers).await?;
	let order = state
		.market
		.lifecycle()
		.accept_application(id, request.application_id, &account)
		.await?;

	Ok(Json(json!({
		"status": "accepted",
		"order_id": order.id,
		"worker_id": order.worker_id,
		"price": order.price,
	})))
}

async fn complete_order(
	State(state): State<AppState>,
	Path(id): Path<OrderId>,
	headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
	let account = authenticate(&state, &headers).await?;
	let order = state.market.lifecycle().complete(id, &account).await?;
	Ok(Json(json!({ "status": "completed", "order_id": order.id })))
}

#[derive(Debug, Serialize)]
struct WorkerInfo {
	id: i64,
	name: Option<String>,
}

#[derive(Debug, Serialize)]
struct ApplicationView {
	id: ApplicationId,
	proposed_price: Option<i64>,
	message: Option<String>,
	worker: WorkerInfo,
}

async fn list_applications(
	State(state): State<AppState>,
	Path(id): Path<OrderId>,
	headers: HeaderMap,
) -> Result<Json<Vec<ApplicationView>>, ApiError> {
	let account = authenticate(&state, &headers).await?;
	let applications = state
		.market
		.lifecycle()
		.applications(id, &account)
		.await?;

	let mut views = Vec::with_capacity(applications.len());
	for application in applications {
		views.push(application_view(&state, application).await?);
	}
	Ok(Json(views))
}

async fn application_view(
	state: &AppState,
	application: Application,
) -> Result<ApplicationView, ApiError> {
	let worker = state
		.market
		.identity()
		.account(application.worker_id)
		.await?;
	Ok(ApplicationView {
		id: application.id,
		proposed_price: application.proposed_price,
		message: application.message,
		worker: WorkerInfo {
			id: worker.id,
			name: worker.display_name,
		},
	})
}

// --- worker side ---

#[derive(Debug, Deserialize)]
struct FeedQuery {
	limit: Option<usize>,
}

async fn worker_feed(
	State(state): State<AppState>,
	Query(query): Query<FeedQuery>,
	headers: HeaderMap,
) -> Result<Json<Vec<Order>>, ApiError> {
	let account = authenticate(&state, &headers).await?;
	require_role(&account, Role::Worker)?;

	let limit = query
		.limit
		.unwrap_or(state.market.config().feed.batch_size);
	let batch = state.market.feed().next_batch(&account, limit).await?;
	Ok(Json(batch))
}

#[derive(Debug, Deserialize, Default)]
struct ApplyRequest {
	#[serde(default)]
	price: Option<i64>,
	#[serde(default)]
	message: Option<String>,
}

async fn worker_apply(
	State(state): State<AppState>,
	Path(order_id): Path<OrderId>,
	headers: HeaderMap,
	Json(request): Json<ApplyRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
	let account = authenticate(&state, &headers).await?;
	require_role(&account, Role::Worker)?;

	let outcome = state
		.market
		.feed()
		.apply(&account, order_id, request.price, request.message)
		.await?;

	Ok(Json(decision_body(outcome, "applied")))
}

async fn worker_skip(
	State(state): State<AppState>,
	Path(order_id): Path<OrderId>,
	headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
	let account = authenticate(&state, &headers).await?;
	require_role(&account, Role::Worker)?;

	let outcome = state.market.feed().skip(&account, order_id).await?;
	Ok(Json(decision_body(outcome, "skipped")))
}

/// Duplicate decisions are deliberate no-ops, reported as success with a
/// distinct status so retrying clients can tell what happened.
fn decision_body(outcome: ApplyOutcome, recorded: &str) -> serde_json::Value {
	match outcome {
		ApplyOutcome::Recorded(_) => json!({ "status": recorded }),
		ApplyOutcome::AlreadyDecided => json!({ "status": "already_exists" }),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_photos_split_at_boundary() {
		let request = CreateOrderRequest {
			service_id: "plumber".into(),
			price: 500,
			duration: "2 hours".into(),
			comment: None,
			address: "Main St 1".into(),
			latitude: 48.45,
			longitude: 35.05,
			photos: Some("a.jpg, b.jpg,,c.jpg".into()),
		};

		let draft = request.into_draft();
		assert_eq!(draft.photos, vec!["a.jpg", "b.jpg", "c.jpg"]);
		assert_eq!(draft.location.latitude, 48.45);
		assert_eq!(draft.location.longitude, 35.05);
	}

	#[test]
	fn test_no_photos_is_empty_list() {
		let request = CreateOrderRequest {
			service_id: "plumber".into(),
			price: 500,
			duration: "2 hours".into(),
			comment: None,
			address: "Main St 1".into(),
			latitude: 48.45,
			longitude: 35.05,
			photos: None,
		};
		assert!(request.into_draft().photos.is_empty());
	}

	#[test]
	fn test_decision_body_statuses() {
		let dup = decision_body(ApplyOutcome::AlreadyDecided, "applied");
		assert_eq!(dup["status"], "already_exists");
	}
}
