use axum::{
    body::Bytes,
    extract::{FromRef, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

use taskpay_escrow::{
    EscrowEngine, EscrowError, NewTask, Resolution, Task, WebhookReconciler,
    WithdrawalProcessor,
};
use taskpay_gateway::{
    ChargeCustomer, GatewayError, PaymentGateway, PayoutDestination, WebhookPayload,
    WebhookVerifier,
};
use taskpay_ledger::{Amount, LedgerError, LedgerManager, TaskId, Transaction, Wallet};

use crate::auth::{AuthConfig, Identity};

pub struct AppState {
    pub engine: Arc<EscrowEngine>,
    pub reconciler: Arc<WebhookReconciler>,
    pub withdrawals: Arc<WithdrawalProcessor>,
    pub ledger: Arc<LedgerManager>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub verifier: WebhookVerifier,
    pub auth: AuthConfig,
}

impl FromRef<Arc<AppState>> for AuthConfig {
    fn from_ref(state: &Arc<AppState>) -> Self {
        state.auth.clone()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// API-layer wrapper mapping each escrow error category to a distinct
/// status, so clients can tell insufficient-balance from conflict from
/// provider-down.
pub struct ApiError(EscrowError);

impl From<EscrowError> for ApiError {
    fn from(err: EscrowError) -> Self {
        Self(err)
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        Self(EscrowError::from(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EscrowError::Validation(_) => StatusCode::BAD_REQUEST,
            EscrowError::Auth => StatusCode::UNAUTHORIZED,
            EscrowError::Forbidden(_) => StatusCode::FORBIDDEN,
            EscrowError::Conflict(_) => StatusCode::CONFLICT,
            EscrowError::NotFound(_) => StatusCode::NOT_FOUND,
            EscrowError::InsufficientBalance { .. } => StatusCode::PAYMENT_REQUIRED,
            EscrowError::Provider(_) => StatusCode::BAD_GATEWAY,
            EscrowError::Integrity(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self.0, "❌ Integrity violation surfaced to API");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/tasks", post(create_task))
        .route("/v1/tasks/open", get(open_tasks))
        .route("/v1/tasks/my/posted", get(my_posted_tasks))
        .route("/v1/tasks/my/accepted", get(my_accepted_tasks))
        .route("/v1/tasks/:id", get(get_task).delete(cancel_task))
        .route("/v1/tasks/:id/accept", post(accept_task))
        .route("/v1/tasks/:id/complete", post(complete_task))
        .route("/v1/tasks/:id/confirm", post(confirm_task))
        .route("/v1/wallet", get(get_wallet))
        .route("/v1/wallet/balance", get(get_balance))
        .route("/v1/wallet/transactions", get(get_transactions))
        .route("/v1/wallet/withdraw", post(request_withdrawal))
        .route("/v1/admin/tasks/:id/resolve", patch(resolve_task))
        .route("/v1/admin/fees/total", get(platform_fee_total))
        .route("/v1/admin/payments/:id/verify", post(verify_payment))
        .route("/v1/payments/webhook", post(payment_webhook))
        .with_state(state)
}

fn parse_task_id(raw: &str) -> Result<TaskId, ApiError> {
    TaskId::parse(raw)
        .map_err(|_| EscrowError::Validation(format!("invalid task id: {}", raw)).into())
}

fn require_admin(identity: &Identity) -> Result<(), ApiError> {
    if identity.is_admin() {
        Ok(())
    } else {
        Err(EscrowError::Forbidden("admin role required".into()).into())
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

// ---- Tasks ----

#[derive(Deserialize)]
struct CreateTaskRequest {
    title: String,
    #[serde(default)]
    description: String,
    /// Fee in minor currency units.
    fee_amount: Amount,
    payer: ChargeCustomer,
}

#[derive(Serialize)]
struct CreateTaskResponse {
    task: Task,
    checkout_url: String,
    tx_ref: String,
    hold_tx_id: String,
}

async fn create_task(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(req): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<CreateTaskResponse>), ApiError> {
    let (task, intent) = state
        .engine
        .create_task(
            identity.user_id,
            req.payer,
            NewTask {
                title: req.title,
                description: req.description,
                fee_amount: req.fee_amount,
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateTaskResponse {
            task,
            checkout_url: intent.checkout_url,
            tx_ref: intent.tx_ref,
            hold_tx_id: intent.hold_tx_id.to_string(),
        }),
    ))
}

async fn get_task(
    State(state): State<Arc<AppState>>,
    _identity: Identity,
    Path(id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    let task = state.engine.get_task(parse_task_id(&id)?).await?;
    Ok(Json(task))
}

#[derive(Deserialize)]
struct OpenTasksQuery {
    limit: Option<usize>,
}

async fn open_tasks(
    State(state): State<Arc<AppState>>,
    _identity: Identity,
    Query(query): Query<OpenTasksQuery>,
) -> Result<Json<Vec<Task>>, ApiError> {
    let tasks = state.engine.open_tasks(query.limit.unwrap_or(20)).await?;
    Ok(Json(tasks))
}

async fn my_posted_tasks(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<Vec<Task>>, ApiError> {
    Ok(Json(state.engine.tasks_by_poster(identity.user_id).await?))
}

async fn my_accepted_tasks(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<Vec<Task>>, ApiError> {
    Ok(Json(state.engine.tasks_by_doer(identity.user_id).await?))
}

async fn accept_task(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    let task = state
        .engine
        .accept_task(identity.user_id, parse_task_id(&id)?)
        .await?;
    Ok(Json(task))
}

async fn complete_task(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    let task = state
        .engine
        .complete_task(identity.user_id, parse_task_id(&id)?)
        .await?;
    Ok(Json(task))
}

async fn confirm_task(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    let task = state
        .engine
        .confirm_task(identity.user_id, parse_task_id(&id)?)
        .await?;
    Ok(Json(task))
}

async fn cancel_task(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    let task = state
        .engine
        .cancel_task(identity.user_id, parse_task_id(&id)?)
        .await?;
    Ok(Json(task))
}

// ---- Wallet ----

#[derive(Serialize)]
struct WalletResponse {
    wallet: Wallet,
    available_balance: Amount,
    recent_transactions: Vec<Transaction>,
}

async fn get_wallet(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<WalletResponse>, ApiError> {
    let wallet = state.ledger.wallet_for(identity.user_id).await?;
    let available_balance = state.ledger.available_balance(identity.user_id).await?;
    let recent_transactions = state.ledger.history(identity.user_id, 10, 0).await?;
    Ok(Json(WalletResponse {
        wallet,
        available_balance,
        recent_transactions,
    }))
}

#[derive(Serialize)]
struct BalanceResponse {
    balance: Amount,
    available_balance: Amount,
    currency: String,
}

async fn get_balance(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<BalanceResponse>, ApiError> {
    let wallet = state.ledger.wallet_for(identity.user_id).await?;
    let available_balance = state.ledger.available_balance(identity.user_id).await?;
    Ok(Json(BalanceResponse {
        balance: wallet.balance,
        available_balance,
        currency: wallet.currency,
    }))
}

#[derive(Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
    offset: Option<usize>,
}

async fn get_transactions(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<Transaction>>, ApiError> {
    let transactions = state
        .ledger
        .history(
            identity.user_id,
            query.limit.unwrap_or(50),
            query.offset.unwrap_or(0),
        )
        .await?;
    Ok(Json(transactions))
}

#[derive(Deserialize)]
struct WithdrawRequest {
    /// Amount in minor currency units.
    amount: Amount,
    account_number: String,
    bank_code: String,
    #[serde(default)]
    account_name: String,
}

#[derive(Serialize)]
struct WithdrawResponse {
    transaction_id: String,
    amount: Amount,
    status: String,
}

async fn request_withdrawal(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(req): Json<WithdrawRequest>,
) -> Result<(StatusCode, Json<WithdrawResponse>), ApiError> {
    let tx = state
        .withdrawals
        .request_withdrawal(
            identity.user_id,
            req.amount,
            PayoutDestination {
                account_number: req.account_number,
                bank_code: req.bank_code,
                account_name: req.account_name,
            },
        )
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(WithdrawResponse {
            transaction_id: tx.id.to_string(),
            amount: req.amount,
            status: tx.status.to_string(),
        }),
    ))
}

// ---- Admin ----

#[derive(Deserialize)]
struct ResolveRequest {
    resolution: Resolution,
    reason: String,
}

#[derive(Serialize)]
struct ResolveResponse {
    task: Task,
    audit: taskpay_escrow::AuditOutcome,
}

async fn resolve_task(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<String>,
    Json(req): Json<ResolveRequest>,
) -> Result<Json<ResolveResponse>, ApiError> {
    require_admin(&identity)?;
    let resolved = state
        .engine
        .resolve_task(
            identity.user_id,
            parse_task_id(&id)?,
            req.resolution,
            &req.reason,
        )
        .await?;

    if resolved.audit.is_degraded() {
        warn!(task_id = %id, "⚠️ Resolution completed with degraded audit");
    }
    Ok(Json(ResolveResponse {
        task: resolved.task,
        audit: resolved.audit,
    }))
}

async fn platform_fee_total(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_admin(&identity)?;
    let total = state.ledger.platform_fee_total().await?;
    Ok(Json(json!({ "total": total })))
}

async fn verify_payment(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_admin(&identity)?;
    let verification = state
        .gateway
        .verify_payment(&id)
        .await
        .map_err(EscrowError::from)?;
    Ok(Json(json!({ "data": verification })))
}

// ---- Webhook ----

/// Publicly reachable; security is the HMAC signature. The provider gets a
/// 200 as soon as the payload is authenticated and decodable; processing
/// runs asynchronously, and a processing failure is logged with the full
/// payload for manual replay rather than bounced back to the sender.
async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = match headers.get("verif-hash").and_then(|v| v.to_str().ok()) {
        Some(signature) => signature,
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: "missing webhook signature".into(),
                }),
            )
                .into_response();
        }
    };

    if let Err(e) = state.verifier.verify(&body, signature) {
        match e {
            GatewayError::SecretMissing => {
                error!("❌ Webhook rejected: no webhook secret configured (failing closed)")
            }
            _ => warn!("⚠️ Webhook rejected: invalid signature"),
        }
        return (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "invalid webhook signature".into(),
            }),
        )
            .into_response();
    }

    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: format!("malformed webhook payload: {}", e),
                }),
            )
                .into_response();
        }
    };

    info!(event = %payload.event, "📨 Webhook received");

    let reconciler = state.reconciler.clone();
    let raw = String::from_utf8_lossy(&body).to_string();
    tokio::spawn(async move {
        if let Err(e) = reconciler.process(payload).await {
            // The provider already got its 200; keep the evidence.
            error!(
                error = %e,
                payload = %raw,
                "❌ Webhook processing failed; payload recorded for manual replay"
            );
        }
    });

    (StatusCode::OK, Json(json!({ "status": "success" }))).into_response()
}
