// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Integration tests for the REST API server with concurrent requests.
//!
//! These tests verify that balances stay consistent and that a pending
//! transaction is settled exactly once when many requests race.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use earnings_ledger_rs::{
    EarningSource, Engine, ErrorKind, InMemoryGateway, Profile, Transaction, TransactionError,
    TransactionId, TransactionStatus, UserId,
};
use reqwest::Client;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;

// === DTOs (duplicated from the demo server for test isolation) ===

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EarningRequest {
    pub amount: Decimal,
    pub source: EarningSource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub amount: Decimal,
    pub details: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub user_id: UserId,
    pub balance: Decimal,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

pub struct AppError(TransactionError);

impl From<TransactionError> for AppError {
    fn from(err: TransactionError) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match (&self.0, self.0.kind()) {
            (TransactionError::InsufficientBalance { .. }, _) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "INSUFFICIENT_BALANCE")
            }
            (_, ErrorKind::Validation) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
            (_, ErrorKind::Forbidden) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            (_, ErrorKind::NotFound) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            (_, ErrorKind::Conflict) => (StatusCode::CONFLICT, "ALREADY_PROCESSED"),
            (_, ErrorKind::Persistence) => (StatusCode::SERVICE_UNAVAILABLE, "PERSISTENCE_ERROR"),
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

async fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
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
    Ok(())
}

async fn get_balance(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> Result<Json<BalanceResponse>, AppError> {
    let balance = state.engine.get_balance(user_id).await?;
    Ok(Json(BalanceResponse { user_id, balance }))
}

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

async fn approve_transaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<TransactionId>,
) -> Result<Json<Transaction>, AppError> {
    require_admin(&state, &headers).await?;
    Ok(Json(state.engine.approve_transaction(id).await?))
}

async fn decline_transaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<TransactionId>,
) -> Result<Json<Transaction>, AppError> {
    require_admin(&state, &headers).await?;
    Ok(Json(state.engine.decline_transaction(id).await?))
}

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/users/{id}/balance", get(get_balance))
        .route("/users/{id}/earnings", post(log_earning))
        .route("/users/{id}/withdrawals", post(request_withdrawal))
        .route("/admin/transactions/{id}/approve", post(approve_transaction))
        .route("/admin/transactions/{id}/decline", post(decline_transaction))
        .with_state(state)
}

fn make_profile(name: &str, is_admin: bool) -> Profile {
    Profile {
        id: UserId::new_v4(),
        full_name: name.to_string(),
        email: format!("{}@example.com", name.to_lowercase()),
        avatar_url: None,
        referral_code: name.to_uppercase(),
        is_admin,
    }
}

/// Test server that binds to an ephemeral port.
struct TestServer {
    base_url: String,
    engine: Arc<Engine>,
    admin: Profile,
    user: Profile,
}

impl TestServer {
    async fn new() -> Self {
        let gateway = Arc::new(InMemoryGateway::new());
        let admin = make_profile("Admin", true);
        let user = make_profile("Wanjiku", false);
        gateway.add_profile(admin.clone());
        gateway.add_profile(user.clone());

        let engine = Arc::new(Engine::new(gateway));
        let state = AppState {
            engine: engine.clone(),
        };

        let app = create_router(state);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait for server to be ready by polling with retries
        let client = Client::new();
        let health_url = format!("{}/users/{}/balance", base_url, user.id);
        for _ in 0..50 {
            match client.get(&health_url).send().await {
                Ok(_) => break,
                Err(_) => tokio::time::sleep(tokio::time::Duration::from_millis(50)).await,
            }
        }

        TestServer {
            base_url,
            engine,
            admin,
            user,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

// === Tests ===
// These tests are ignored in CI due to connection issues on some platforms.
// Run manually with: cargo test --test server_test -- --ignored

/// Earn, withdraw, approve, and read the balance back over HTTP.
#[tokio::test]
#[ignore = "requires running server, may fail in CI"]
async fn earning_and_approved_withdrawal_round_trip() {
    let server = TestServer::new().await;
    let client = Client::new();
    let user = server.user.id;

    let response = client
        .post(server.url(&format!("/users/{user}/earnings")))
        .json(&EarningRequest {
            amount: dec!(500),
            source: EarningSource::Trivia {
                question: "Capital of Kenya?".to_string(),
            },
        })
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let earning: Transaction = response.json().await.unwrap();
    assert_eq!(earning.description, "Trivia: Capital of Kenya?");

    let withdrawal: Transaction = client
        .post(server.url(&format!("/users/{user}/withdrawals")))
        .json(&WithdrawalRequest {
            amount: dec!(100),
            details: "0712345678".to_string(),
        })
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(withdrawal.status, TransactionStatus::Pending);

    let response = client
        .post(server.url(&format!("/admin/transactions/{}/approve", withdrawal.id)))
        .header("x-user-id", server.admin.id.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let balance: BalanceResponse = client
        .get(server.url(&format!("/users/{user}/balance")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(balance.balance, dec!(400));
}

/// Review routes reject callers that are not administrators.
#[tokio::test]
#[ignore = "requires running server, may fail in CI"]
async fn review_requires_admin_header() {
    let server = TestServer::new().await;
    let client = Client::new();
    let user = server.user.id;

    server
        .engine
        .log_earning(user, dec!(50), "Article Read: Savings 101")
        .await
        .unwrap();
    let withdrawal = server
        .engine
        .request_withdrawal(user, dec!(20), "0712345678")
        .await
        .unwrap();
    let url = server.url(&format!("/admin/transactions/{}/approve", withdrawal.id));

    let missing = client.post(&url).send().await.unwrap();
    assert_eq!(missing.status(), StatusCode::FORBIDDEN);

    let not_admin = client
        .post(&url)
        .header("x-user-id", user.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(not_admin.status(), StatusCode::FORBIDDEN);

    let body: ErrorResponse = not_admin.json().await.unwrap();
    assert_eq!(body.code, "FORBIDDEN");

    let stored = server.engine.list_user_transactions(user).await.unwrap();
    assert!(
        stored
            .iter()
            .any(|tx| tx.id == withdrawal.id && tx.status == TransactionStatus::Pending)
    );
}

/// An overdrawn withdrawal is refused with 422 and never written.
#[tokio::test]
#[ignore = "requires running server, may fail in CI"]
async fn overdrawn_withdrawal_is_unprocessable() {
    let server = TestServer::new().await;
    let client = Client::new();
    let user = server.user.id;

    server.engine.log_earning(user, dec!(10), "trivia").await.unwrap();

    let response = client
        .post(server.url(&format!("/users/{user}/withdrawals")))
        .json(&WithdrawalRequest {
            amount: dec!(25),
            details: "0712345678".to_string(),
        })
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body: ErrorResponse = response.json().await.unwrap();
    assert_eq!(body.code, "INSUFFICIENT_BALANCE");
    assert_eq!(body.error, "Insufficient balance.");
    assert_eq!(
        server.engine.list_user_transactions(user).await.unwrap().len(),
        1
    );
}

/// Concurrent earnings for one user. The balance must be the exact sum.
#[tokio::test]
#[ignore = "requires running server, may fail in CI"]
async fn concurrent_earnings_single_user() {
    let server = TestServer::new().await;
    let client = Client::new();
    let user = server.user.id;

    const NUM_EARNINGS: usize = 500;
    const AMOUNT_PER_EARNING: &str = "1.50";

    let start = Instant::now();
    let mut handles = Vec::with_capacity(NUM_EARNINGS);

    for i in 0..NUM_EARNINGS {
        let client = client.clone();
        let url = server.url(&format!("/users/{user}/earnings"));

        let handle = tokio::spawn(async move {
            let request = EarningRequest {
                amount: AMOUNT_PER_EARNING.parse().unwrap(),
                source: EarningSource::Trivia {
                    question: format!("question {i}"),
                },
            };

            let response = client.post(&url).json(&request).send().await.unwrap();
            response.status()
        });

        handles.push(handle);
    }

    let results: Vec<_> = futures::future::join_all(handles).await;
    let elapsed = start.elapsed();

    let successful = results
        .iter()
        .filter(|r| r.as_ref().unwrap().is_success())
        .count();

    println!(
        "Single user: {} earnings in {:?} ({:.0} req/s)",
        NUM_EARNINGS,
        elapsed,
        NUM_EARNINGS as f64 / elapsed.as_secs_f64()
    );

    assert_eq!(successful, NUM_EARNINGS, "All earnings should succeed");

    let expected: Decimal =
        AMOUNT_PER_EARNING.parse::<Decimal>().unwrap() * Decimal::from(NUM_EARNINGS as u64);
    assert_eq!(server.engine.get_balance(user).await.unwrap(), expected);
}

/// Many admins racing to settle one withdrawal. Exactly one request wins
/// and the rest see 409.
#[tokio::test]
#[ignore = "requires running server, may fail in CI"]
async fn concurrent_review_settles_once() {
    let server = TestServer::new().await;
    let client = Client::new();
    let user = server.user.id;

    server.engine.log_earning(user, dec!(300), "trivia").await.unwrap();
    let withdrawal = server
        .engine
        .request_withdrawal(user, dec!(120), "0712345678")
        .await
        .unwrap();

    const NUM_REQUESTS: usize = 100;
    let mut handles = Vec::with_capacity(NUM_REQUESTS);

    for i in 0..NUM_REQUESTS {
        let client = client.clone();
        let action = if i % 2 == 0 { "approve" } else { "decline" };
        let url = server.url(&format!("/admin/transactions/{}/{action}", withdrawal.id));
        let admin = server.admin.id.to_string();

        handles.push(tokio::spawn(async move {
            let response = client
                .post(&url)
                .header("x-user-id", admin)
                .send()
                .await
                .unwrap();
            response.status()
        }));
    }

    let statuses: Vec<StatusCode> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let ok = statuses.iter().filter(|s| **s == StatusCode::OK).count();
    let conflicts = statuses
        .iter()
        .filter(|s| **s == StatusCode::CONFLICT)
        .count();
    assert_eq!(ok, 1, "exactly one review should win");
    assert_eq!(conflicts, NUM_REQUESTS - 1);

    let balance = server.engine.get_balance(user).await.unwrap();
    let settled = server
        .engine
        .list_user_transactions(user)
        .await
        .unwrap()
        .into_iter()
        .find(|tx| tx.id == withdrawal.id)
        .unwrap();
    match settled.status {
        TransactionStatus::Completed => assert_eq!(balance, dec!(180)),
        TransactionStatus::Declined => assert_eq!(balance, dec!(300)),
        TransactionStatus::Pending => panic!("withdrawal left pending"),
    }
}
