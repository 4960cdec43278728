//! Axum REST API — the surface the dashboard UI reads state from and
//! dispatches actions through.

use std::sync::Arc;

use alloy::primitives::B256;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::chain::{ContractGateway, TransferRecord};
use crate::dispatch::{Dispatchers, EvidenceSource};
use crate::errors::ServiceError;
use crate::events::{CompanyProfile, PendingCompany};
use crate::reports::ReportService;
use crate::session::{Session, SessionView};
use crate::sync::Synchronizer;

pub struct ApiState {
    pub session: Arc<Session>,
    pub sync: Arc<Synchronizer>,
    pub dispatchers: Arc<Dispatchers>,
    pub reports: Arc<ReportService>,
    pub gateway: Arc<dyn ContractGateway>,
    pub start_block: u64,
}

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct TxResponse {
    pub tx_hash: String,
}

#[derive(Serialize)]
pub struct PendingCompaniesResponse {
    pub count: usize,
    pub companies: Vec<PendingCompany>,
}

#[derive(Serialize)]
pub struct TransfersResponse {
    pub count: usize,
    pub transfers: Vec<TransferRecord>,
}

#[derive(Serialize)]
pub struct RefreshResponse {
    pub refreshed: bool,
}

#[derive(Serialize)]
pub struct ConnectResponse {
    pub account: String,
    pub is_admin: bool,
}

#[derive(Serialize)]
pub struct CompanyDetailsResponse {
    pub wallet: String,
    #[serde(flatten)]
    pub profile: CompanyProfile,
    pub verified: bool,
}

#[derive(Serialize)]
pub struct StatsResponse {
    /// Total token supply in whole-token units.
    pub total_supply: String,
    /// Native balance held by the contract (funds available for rewards).
    pub contract_balance: String,
}

#[derive(Serialize)]
pub struct ReportsResponse {
    pub count: usize,
    pub reports: Vec<crate::chain::ReportStatus>,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Deserialize)]
pub struct TransferRequest {
    pub to: String,
    pub amount: String,
}

#[derive(Deserialize)]
pub struct MintRequest {
    pub to: String,
    pub amount: String,
    pub name: String,
}

#[derive(Deserialize)]
pub struct SubmitReportRequest {
    pub description: String,
    pub location: String,
    /// Locator of already-stored evidence...
    pub evidence_uri: Option<String>,
    /// ...or inline evidence to upload first.
    pub evidence_name: Option<String>,
    pub evidence_content: Option<String>,
}

#[derive(Deserialize)]
pub struct VerifyReportRequest {
    pub reward: String,
}

#[derive(Deserialize)]
pub struct RefreshParams {
    #[serde(default)]
    pub force: bool,
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /session`
pub async fn get_session(State(state): State<Arc<ApiState>>) -> Json<SessionView> {
    Json(state.session.view().await)
}

/// `POST /session/connect`
pub async fn connect(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    match state.session.connect().await {
        Ok(account) => {
            let view = state.session.view().await;
            (
                StatusCode::OK,
                Json(serde_json::json!(ConnectResponse {
                    account: account.to_string(),
                    is_admin: view.is_admin,
                })),
            )
                .into_response()
        }
        Err(e) => error_response(e),
    }
}

/// `POST /session/disconnect`
pub async fn disconnect(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    state.session.disconnect().await;
    StatusCode::NO_CONTENT
}

/// `GET /companies/pending`
pub async fn pending_companies(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let companies = state.sync.pending().await;
    Json(PendingCompaniesResponse {
        count: companies.len(),
        companies,
    })
}

/// `GET /companies/{wallet}` — on-chain registry record for one wallet.
pub async fn company_details(
    State(state): State<Arc<ApiState>>,
    Path(wallet): Path<String>,
) -> impl IntoResponse {
    let wallet = match crate::events::parse_wallet(&wallet) {
        Ok(wallet) => wallet,
        Err(e) => return error_response(e),
    };
    match state.gateway.registered_company(wallet).await {
        Ok((profile, verified)) => (
            StatusCode::OK,
            Json(serde_json::json!(CompanyDetailsResponse {
                wallet: wallet.to_string(),
                profile,
                verified,
            })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// `GET /stats` — dashboard-level token figures.
pub async fn stats(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    use alloy::primitives::utils::format_ether;
    let supply = state.gateway.total_supply().await;
    let native = state.gateway.contract_native_balance().await;
    match (supply, native) {
        (Ok(supply), Ok(native)) => (
            StatusCode::OK,
            Json(serde_json::json!(StatsResponse {
                total_supply: format_ether(supply),
                contract_balance: format_ether(native),
            })),
        )
            .into_response(),
        (Err(e), _) | (_, Err(e)) => error_response(e),
    }
}

/// `POST /companies` — register the connected wallet as a company.
pub async fn register_company(
    State(state): State<Arc<ApiState>>,
    Json(profile): Json<CompanyProfile>,
) -> impl IntoResponse {
    tx_result(state.dispatchers.register_company(profile).await)
}

/// `POST /companies/{wallet}/verify`
pub async fn verify_company(
    State(state): State<Arc<ApiState>>,
    Path(wallet): Path<String>,
) -> impl IntoResponse {
    tx_result(state.dispatchers.verify_company(&wallet).await)
}

/// `POST /transfers`
pub async fn transfer(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<TransferRequest>,
) -> impl IntoResponse {
    tx_result(state.dispatchers.transfer_tokens(&req.to, &req.amount).await)
}

/// `POST /mints`
pub async fn mint(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<MintRequest>,
) -> impl IntoResponse {
    tx_result(
        state
            .dispatchers
            .mint_tokens(&req.to, &req.amount, &req.name)
            .await,
    )
}

/// `GET /transactions` — transfer history reconstructed from chain events.
pub async fn transactions(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    match state.gateway.transfer_history(state.start_block).await {
        Ok(transfers) => (
            StatusCode::OK,
            Json(serde_json::json!(TransfersResponse {
                count: transfers.len(),
                transfers,
            })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// `POST /reports`
pub async fn submit_report(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<SubmitReportRequest>,
) -> impl IntoResponse {
    let evidence = match (req.evidence_uri, req.evidence_name, req.evidence_content) {
        (Some(uri), _, _) => EvidenceSource::Uri(uri),
        (None, Some(name), Some(content)) => EvidenceSource::Inline {
            filename: name,
            bytes: content.into_bytes(),
        },
        _ => {
            return error_response(ServiceError::Evidence(
                "either evidence_uri or evidence_name + evidence_content is required".to_string(),
            ))
        }
    };
    tx_result(
        state
            .dispatchers
            .submit_report(&req.description, &req.location, evidence)
            .await,
    )
}

/// `GET /reports` — every report the contract currently exposes.
pub async fn list_reports(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    match state.reports.list_reports().await {
        Ok(reports) => (
            StatusCode::OK,
            Json(serde_json::json!(ReportsResponse {
                count: reports.len(),
                reports,
            })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// `GET /reports/{id}`
pub async fn report_status(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<u64>,
) -> impl IntoResponse {
    match state.reports.get_report_status(id).await {
        Ok(report) => (StatusCode::OK, Json(serde_json::json!(report))).into_response(),
        Err(e) => error_response(e),
    }
}

/// `POST /reports/{id}/verify`
pub async fn verify_report(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<u64>,
    Json(req): Json<VerifyReportRequest>,
) -> impl IntoResponse {
    tx_result(state.reports.verify_and_reward_report(id, &req.reward).await)
}

/// `POST /sync/refresh[?force=true]`
pub async fn refresh(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<RefreshParams>,
) -> impl IntoResponse {
    match state.sync.refresh(params.force).await {
        Ok(refreshed) => {
            (StatusCode::OK, Json(serde_json::json!(RefreshResponse { refreshed })))
                .into_response()
        }
        Err(e) => error_response(e),
    }
}

// ─────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────

fn tx_result(result: crate::errors::Result<B256>) -> axum::response::Response {
    match result {
        Ok(hash) => (
            StatusCode::OK,
            Json(serde_json::json!(TxResponse {
                tx_hash: hash.to_string(),
            })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

fn error_response(e: ServiceError) -> axum::response::Response {
    (
        status_for(&e),
        Json(serde_json::json!(ErrorResponse {
            error: e.to_string(),
        })),
    )
        .into_response()
}

fn status_for(e: &ServiceError) -> StatusCode {
    match e {
        ServiceError::WalletUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ServiceError::UserRejected | ServiceError::NotConnected => StatusCode::UNAUTHORIZED,
        ServiceError::NotAuthorized => StatusCode::FORBIDDEN,
        ServiceError::AlreadyInProgress => StatusCode::CONFLICT,
        ServiceError::InvalidAmount(_) | ServiceError::InvalidAddress(_) => {
            StatusCode::BAD_REQUEST
        }
        ServiceError::InsufficientBalance | ServiceError::InsufficientContractFunds => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ServiceError::Transport(_)
        | ServiceError::Contract(_)
        | ServiceError::Confirmation(_)
        | ServiceError::Http(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ReportStatus;
    use crate::testing::{MockGateway, MockWallet};
    use alloy::primitives::{
        utils::parse_ether,
        Address,
    };

    fn profile(name: &str) -> CompanyProfile {
        CompanyProfile {
            name: name.to_string(),
            company_type: "Recycler".to_string(),
            registration_number: "RC-1".to_string(),
            country: "Kenya".to_string(),
            city: "Nairobi".to_string(),
            address: "1 Moi Ave".to_string(),
            email: "ops@example.com".to_string(),
            phone: "+254700000000".to_string(),
        }
    }

    fn state_with(gateway: Arc<MockGateway>) -> Arc<ApiState> {
        let wallet = Arc::new(MockWallet::with_accounts(vec![Address::repeat_byte(9)]));
        gateway.set_wallet(wallet.clone());
        let session = Session::new(gateway.clone(), wallet, None);
        let sync = Arc::new(Synchronizer::new(
            gateway.clone(),
            None,
            0,
            std::time::Duration::ZERO,
        ));
        let dispatchers = Arc::new(Dispatchers::new(
            gateway.clone(),
            session.clone(),
            sync.clone(),
            None,
        ));
        let reports = Arc::new(ReportService::new(gateway.clone(), dispatchers.clone()));
        Arc::new(ApiState {
            session,
            sync,
            dispatchers,
            reports,
            gateway,
            start_block: 0,
        })
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn company_details_returns_registry_record() {
        let gateway = Arc::new(MockGateway::new(Address::repeat_byte(9)));
        gateway.set_company(profile("Alpha"), true);
        let state = state_with(gateway);

        let resp = company_details(State(state), Path(Address::repeat_byte(1).to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["name"], "Alpha");
        assert_eq!(body["verified"], true);
    }

    #[tokio::test]
    async fn company_details_rejects_malformed_wallet() {
        let gateway = Arc::new(MockGateway::new(Address::repeat_byte(9)));
        let state = state_with(gateway);

        let resp = company_details(State(state), Path("0xnope".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn stats_formats_supply_and_contract_balance() {
        let gateway = Arc::new(MockGateway::new(Address::repeat_byte(9)));
        gateway.set_total_supply(parse_ether("1000").unwrap());
        gateway.set_native_balance(parse_ether("2.5").unwrap());
        let state = state_with(gateway);

        let resp = stats(State(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["total_supply"], "1000.000000000000000000");
        assert_eq!(body["contract_balance"], "2.500000000000000000");
    }

    #[tokio::test]
    async fn report_list_carries_scripted_reports() {
        let gateway = Arc::new(MockGateway::new(Address::repeat_byte(9)));
        gateway.push_report(ReportStatus {
            id: 7,
            description: "illegal dumping".to_string(),
            location: "riverbank".to_string(),
            reporter: Address::repeat_byte(1),
            timestamp: 1_700_000_000,
            evidence_uri: "ipfs://abc".to_string(),
            verified: false,
            reward: "0".to_string(),
        });
        let state = state_with(gateway);

        let resp = list_reports(State(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["reports"][0]["id"], 7);
        assert_eq!(body["reports"][0]["description"], "illegal dumping");
    }

    #[test]
    fn validation_errors_map_to_client_statuses() {
        assert_eq!(status_for(&ServiceError::NotAuthorized), StatusCode::FORBIDDEN);
        assert_eq!(
            status_for(&ServiceError::AlreadyInProgress),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&ServiceError::InsufficientBalance),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&ServiceError::InvalidAmount("x".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&ServiceError::WalletUnavailable),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
