//! REST API server example for the earnings ledger.
//!
//! Run with: `cargo run --example server`
//!
//! ## Endpoints
//!
//! - `GET  /users/{id}/balance` - Current balance
//! - `GET  /users/{id}/transactions` - Transaction history, newest first
//! - `POST /users/{id}/earnings` - Log an earning
//! - `POST /users/{id}/withdrawals` - Request a withdrawal
//! - `GET  /users/{id}/subscriptions` - Subscriptions, latest first
//! - `POST /users/{id}/subscriptions` - Pay for a plan
//! - `GET  /plans` - Active plans
//! - `GET  /admin/transactions?status=pending` - Review queue
//! - `GET  /admin/stats` - Dashboard figures
//! - `POST /admin/transactions/{id}/approve` - Approve a pending transaction
//! - `POST /admin/transactions/{id}/decline` - Decline a pending transaction
//! - `POST /admin/transactions/{id}/activate` - Finish activating an approved payment's subscription
//!
//! Admin routes need an `x-user-id` header naming an administrator profile.
//!
//! ## Example Usage
//!
//! ```bash
//! # Earning
//! curl -X POST http://localhost:3000/users/$USER/earnings \
//!   -H "Content-Type: application/json" \
//!   -d '{"amount": "500.00", "source": {"kind": "trivia", "question": "Capital of Kenya?"}}'
//!
//! # Withdrawal
//! curl -X POST http://localhost:3000/users/$USER/withdrawals \
//!   -H "Content-Type: application/json" \
//!   -d '{"amount": "100.00", "details": "0712345678"}'
//!
//! # Approve it
//! curl -X POST http://localhost:3000/admin/transactions/$TX/approve -H "x-user-id: $ADMIN"
//!
//! # Balance
//! curl http://localhost:3000/users/$USER/balance
//! ```

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use earnings_ledger_rs::balance::{format_amount, round_for_display};
use earnings_ledger_rs::{
    AttributedTransaction, EarningSource, Engine, ErrorKind, InMemoryGateway, LedgerConfig,
    LedgerEvent, LedgerStats, PlanId, Profile, SubscriptionPlan, Transaction, TransactionError,
    TransactionId, TransactionStatus, UserId, UserSubscription,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// === Request/Response DTOs ===

#[derive(Debug, Deserialize)]
pub struct EarningRequest {
    pub amount: Decimal,
    pub source: EarningSource,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawalRequest {
    pub amount: Decimal,
    pub details: String,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionRequest {
    pub plan_id: PlanId,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub status: Option<TransactionStatus>,
}

/// Response body for a balance.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub user_id: UserId,
    pub balance: Decimal,
    pub currency: String,
    pub display: String,
}

/// Response body for errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// === Application State ===

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

// === Error Handling ===

/// Wrapper for converting `TransactionError` into HTTP responses.
pub struct AppError(TransactionError);

impl From<TransactionError> for AppError {
    fn from(err: TransactionError) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match (&self.0, self.0.kind()) {
            (TransactionError::InsufficientBalance { .. }, _) => StatusCode::UNPROCESSABLE_ENTITY,
            (_, ErrorKind::Validation) => StatusCode::BAD_REQUEST,
            (_, ErrorKind::Forbidden) => StatusCode::FORBIDDEN,
            (_, ErrorKind::NotFound) => StatusCode::NOT_FOUND,
            (_, ErrorKind::Conflict) => StatusCode::CONFLICT,
            (_, ErrorKind::Persistence) => StatusCode::SERVICE_UNAVAILABLE,
        };
        let code = match &self.0 {
            TransactionError::InvalidAmount => "INVALID_AMOUNT",
            TransactionError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            TransactionError::MissingPayoutDetails => "MISSING_PAYOUT_DETAILS",
            TransactionError::InactivePlan(_) => "INACTIVE_PLAN",
            TransactionError::InvalidStatusTarget(_) => "INVALID_STATUS",
            TransactionError::UnknownType(_) | TransactionError::UnknownStatus(_) => {
                "INVALID_INPUT"
            }
            TransactionError::AlreadyProcessed { .. } => "ALREADY_PROCESSED",
            TransactionError::DuplicateTransaction(_) => "DUPLICATE_TRANSACTION",
            TransactionError::TransactionNotFound(_) => "TRANSACTION_NOT_FOUND",
            TransactionError::PlanNotFound(_) | TransactionError::MissingPlanReference(_) => {
                "PLAN_NOT_FOUND"
            }
            TransactionError::ProfileNotFound(_) => "PROFILE_NOT_FOUND",
            TransactionError::NotSubscriptionPayment(_) => "NOT_SUBSCRIPTION_PAYMENT",
            TransactionError::PaymentNotCompleted { .. } => "PAYMENT_NOT_COMPLETED",
            TransactionError::Forbidden => "FORBIDDEN",
            TransactionError::Persistence(_) => "PERSISTENCE_ERROR",
        };

        (
            status,
            Json(ErrorResponse {
                error: self.0.user_message(),
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

/// Resolves the `x-user-id` header to an administrator profile.
async fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<Profile, AppError> {
    let user_id: UserId = headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
        .ok_or(TransactionError::Forbidden)?;
    let profile = state
        .engine
        .get_profile(user_id)
        .await
        .map_err(|e| match e {
            TransactionError::ProfileNotFound(_) => TransactionError::Forbidden,
            other => other,
        })?;
    profile.ensure_admin()?;
    Ok(profile)
}

// === Handlers ===

/// GET /users/{id}/balance
async fn get_balance(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> Result<Json<BalanceResponse>, AppError> {
    let balance = state.engine.get_balance(user_id).await?;
    let config = state.engine.config();
    Ok(Json(BalanceResponse {
        user_id,
        balance: round_for_display(balance, config.display_precision),
        currency: config.currency.clone(),
        display: format_amount(balance, &config.currency, config.display_precision),
    }))
}

/// GET /users/{id}/transactions
async fn list_user_transactions(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> Result<Json<Vec<Transaction>>, AppError> {
    Ok(Json(state.engine.list_user_transactions(user_id).await?))
}

/// POST /users/{id}/earnings
async fn log_earning(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Json(request): Json<EarningRequest>,
) -> Result<(StatusCode, Json<Transaction>), AppError> {
    let tx = state
        .engine
        .log_earning(user_id, request.amount, request.source.to_string())
        .await?;
    Ok((StatusCode::CREATED, Json(tx)))
}

/// POST /users/{id}/withdrawals
async fn request_withdrawal(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Json(request): Json<WithdrawalRequest>,
) -> Result<(StatusCode, Json<Transaction>), AppError> {
    let tx = state
        .engine
        .request_withdrawal(user_id, request.amount, &request.details)
        .await?;
    Ok((StatusCode::CREATED, Json(tx)))
}

/// GET /users/{id}/subscriptions
async fn list_user_subscriptions(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> Result<Json<Vec<UserSubscription>>, AppError> {
    Ok(Json(state.engine.user_subscriptions(user_id).await?))
}

/// POST /users/{id}/subscriptions
async fn create_subscription_payment(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Json(request): Json<SubscriptionRequest>,
) -> Result<(StatusCode, Json<Transaction>), AppError> {
    let tx = state
        .engine
        .create_subscription_payment(user_id, request.plan_id)
        .await?;
    Ok((StatusCode::CREATED, Json(tx)))
}

/// GET /plans
async fn list_plans(State(state): State<AppState>) -> Result<Json<Vec<SubscriptionPlan>>, AppError> {
    Ok(Json(state.engine.list_plans().await?))
}

/// GET /admin/transactions
async fn list_transactions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<StatusQuery>,
) -> Result<Json<Vec<AttributedTransaction>>, AppError> {
    require_admin(&state, &headers).await?;
    Ok(Json(state.engine.list_transactions(query.status).await?))
}

/// GET /admin/stats
async fn stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<LedgerStats>, AppError> {
    require_admin(&state, &headers).await?;
    Ok(Json(state.engine.stats().await?))
}

/// POST /admin/transactions/{id}/approve
async fn approve_transaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<TransactionId>,
) -> Result<Json<Transaction>, AppError> {
    require_admin(&state, &headers).await?;
    Ok(Json(state.engine.approve_transaction(id).await?))
}

/// POST /admin/transactions/{id}/decline
async fn decline_transaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<TransactionId>,
) -> Result<Json<Transaction>, AppError> {
    require_admin(&state, &headers).await?;
    Ok(Json(state.engine.decline_transaction(id).await?))
}

/// POST /admin/transactions/{id}/activate
async fn activate_subscription(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<TransactionId>,
) -> Result<Json<UserSubscription>, AppError> {
    require_admin(&state, &headers).await?;
    Ok(Json(state.engine.activate_subscription_for(id).await?))
}

// === Router ===

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/users/{id}/balance", get(get_balance))
        .route("/users/{id}/transactions", get(list_user_transactions))
        .route("/users/{id}/earnings", post(log_earning))
        .route("/users/{id}/withdrawals", post(request_withdrawal))
        .route(
            "/users/{id}/subscriptions",
            get(list_user_subscriptions).post(create_subscription_payment),
        )
        .route("/plans", get(list_plans))
        .route("/admin/transactions", get(list_transactions))
        .route("/admin/stats", get(stats))
        .route("/admin/transactions/{id}/approve", post(approve_transaction))
        .route("/admin/transactions/{id}/decline", post(decline_transaction))
        .route("/admin/transactions/{id}/activate", post(activate_subscription))
        .with_state(state)
}

// === Demo data ===

fn seed(gateway: &InMemoryGateway) -> (Profile, Profile) {
    let admin = Profile {
        id: UserId::new_v4(),
        full_name: "Site Admin".to_string(),
        email: "admin@example.com".to_string(),
        avatar_url: None,
        referral_code: "ADMIN".to_string(),
        is_admin: true,
    };
    let user = Profile {
        id: UserId::new_v4(),
        full_name: "Demo User".to_string(),
        email: "user@example.com".to_string(),
        avatar_url: None,
        referral_code: "DEMO01".to_string(),
        is_admin: false,
    };
    gateway.add_profile(admin.clone());
    gateway.add_profile(user.clone());

    for (name, price, duration_days) in [("Basic", dec!(500), 30), ("Premium", dec!(1200), 90)] {
        gateway.add_plan(SubscriptionPlan {
            id: PlanId::new_v4(),
            name: name.to_string(),
            description: format!("{name} membership"),
            price,
            duration_days,
            is_active: true,
        });
    }

    (admin, user)
}

// === Main ===

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "earnings_ledger_rs=info,server=info".into()),
        )
        .init();

    let gateway = InMemoryGateway::new();
    let (admin, user) = seed(&gateway);
    let engine = Arc::new(Engine::with_config(
        Arc::new(gateway),
        LedgerConfig::default(),
    ));

    // Stand-in for the view that renders the balance header
    let mut events = engine.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(LedgerEvent::BalanceChanged {
                    user_id,
                    transaction_id,
                }) => info!(%user_id, %transaction_id, "balance changed"),
                Err(RecvError::Lagged(missed)) => warn!(missed, "balance listener lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let app = create_router(AppState { engine });

    let listener = TcpListener::bind("127.0.0.1:3000").await.unwrap();
    println!("Earnings ledger API running on http://127.0.0.1:3000");
    println!();
    println!("Admin id: {}", admin.id);
    println!("User id:  {}", user.id);
    println!();
    println!("Endpoints:");
    println!("  GET  /users/{{id}}/balance");
    println!("  GET  /users/{{id}}/transactions");
    println!("  POST /users/{{id}}/earnings");
    println!("  POST /users/{{id}}/withdrawals");
    println!("  GET  /users/{{id}}/subscriptions");
    println!("  POST /users/{{id}}/subscriptions");
    println!("  GET  /plans");
    println!("  GET  /admin/transactions");
    println!("  GET  /admin/stats");
    println!("  POST /admin/transactions/{{id}}/approve");
    println!("  POST /admin/transactions/{{id}}/decline");
    println!("  POST /admin/transactions/{{id}}/activate");

    axum::serve(listener, app).await.unwrap();
}
