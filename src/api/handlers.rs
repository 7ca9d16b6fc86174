use crate::{
    api::{
        lifecycle::{Lifecycle, reject_when_closed},
        models::*,
    },
    auth::identity::{CallerIdentity, IdentityProvider, JwtIdentityProvider},
    core::{
        engine::{AuthorizationEngine, NewTransaction},
        errors::AccountingError,
        models::{
            audit::{AppLog, OrganizationAudit},
            organization::{Organization, OrganizationParticipant},
            user::UserView,
        },
        services::OrganizationService,
    },
    infrastructure::{
        cache::in_memory::InMemoryCache, logging::in_memory::InMemoryLogging, settlement::http::ChainApiGateway,
        storage::in_memory::InMemoryStorage,
    },
};
use axum::{
    Extension, Json, Router,
    extract::{Path, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::IntoResponse,
};
use http::header;
use std::sync::Arc;
use uuid::Uuid;

pub type Engine = AuthorizationEngine<InMemoryStorage, ChainApiGateway, InMemoryLogging>;
pub type Organizations = OrganizationService<InMemoryStorage, ChainApiGateway, InMemoryLogging, InMemoryCache>;
pub type Identity = JwtIdentityProvider<InMemoryStorage>;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub organizations: Arc<Organizations>,
    pub identity: Arc<Identity>,
    pub lifecycle: Arc<Lifecycle>,
}

/// Resolves the bearer token into a [`CallerIdentity`] request extension.
async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<impl IntoResponse, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));

    let caller = state.identity.current_user(token).await?;
    req.extensions_mut().insert(caller);
    Ok(next.run(req).await)
}

/// Membership and quorum changes can complete a pending quorum without a new vote. The
/// change itself has already succeeded, so a failure here is only logged.
async fn reevaluate_pending(state: &AppState, org_id: Uuid) {
    if let Err(e) = state.engine.reevaluate_pending(org_id).await {
        tracing::warn!(organization_id = %org_id, error = %e, "re-evaluating pending transactions failed");
    }
}

pub fn api_routes(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/organizations", axum::routing::post(create_organization))
        .route("/organizations/{org_id}", axum::routing::get(get_organization))
        .route(
            "/organizations/{org_id}/participants",
            axum::routing::get(list_participants).post(add_participant),
        )
        .route(
            "/organizations/{org_id}/participants/{user_id}",
            axum::routing::delete(remove_participant),
        )
        .route("/organizations/{org_id}/quorum", axum::routing::put(update_quorum))
        .route("/organizations/{org_id}/multisig", axum::routing::post(deploy_multisig))
        .route("/organizations/{org_id}/salaries", axum::routing::post(deploy_salaries))
        .route(
            "/organizations/{org_id}/transactions",
            axum::routing::get(list_transactions).post(create_transaction),
        )
        .route(
            "/organizations/{org_id}/transactions/{tx_id}",
            axum::routing::get(get_transaction)
                .put(record_confirmation)
                .delete(cancel_transaction),
        )
        .route(
            "/organizations/{org_id}/transactions/{tx_id}/confirmations",
            axum::routing::get(list_confirmations),
        )
        .route(
            "/organizations/{org_id}/transactions/{tx_id}/commit",
            axum::routing::post(commit_transaction),
        )
        .route("/organizations/{org_id}/audits", axum::routing::get(get_organization_audits))
        .route("/logs", axum::routing::get(get_app_logs))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/ping", axum::routing::get(ping))
        .route("/join", axum::routing::post(join))
        .route("/login", axum::routing::post(login))
        .merge(protected_routes)
        .layer(middleware::from_fn_with_state(state.lifecycle.clone(), reject_when_closed))
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/ping",
    responses((status = 200, description = "Service is up", body = String))
)]
async fn ping() -> &'static str {
    "pong"
}

#[utoipa::path(
    post,
    path = "/join",
    request_body = JoinRequest,
    responses(
        (status = 201, description = "User registered", body = UserView),
        (status = 400, description = "Malformed seed", body = ErrorResponse),
        (status = 409, description = "Seed already registered", body = ErrorResponse)
    )
)]
async fn join(State(state): State<AppState>, Json(req): Json<JoinRequest>) -> Result<impl IntoResponse, ApiError> {
    let user = state.organizations.register_user(&req.seed, req.mnemonic).await?;
    Ok((StatusCode::CREATED, Json(UserView::from(&user))))
}

#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Unknown seed", body = ErrorResponse)
    )
)]
async fn login(State(state): State<AppState>, Json(req): Json<LoginRequest>) -> Result<Json<LoginResponse>, ApiError> {
    let user = state.organizations.authenticate(&req.seed).await?;
    let token = state.identity.jwt().generate_token(&user.id.to_string())?;
    Ok(Json(LoginResponse {
        token,
        user: UserView::from(&user),
    }))
}

#[utoipa::path(
    post,
    path = "/organizations",
    request_body = CreateOrganizationRequest,
    responses(
        (status = 201, description = "Organization created", body = Organization),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 401, description = "Unauthenticated", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn create_organization(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Json(req): Json<CreateOrganizationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let organization = state
        .organizations
        .create_organization(&caller, req.name, req.quorum)
        .await?;
    Ok((StatusCode::CREATED, Json(organization)))
}

#[utoipa::path(
    get,
    path = "/organizations/{org_id}",
    params(("org_id" = Uuid, Path, description = "ID of the organization")),
    responses(
        (status = 200, description = "Organization", body = Organization),
        (status = 403, description = "Not a participant", body = ErrorResponse),
        (status = 404, description = "Organization not found", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn get_organization(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(org_id): Path<Uuid>,
) -> Result<Json<Organization>, ApiError> {
    let organization = state.organizations.get_organization(&caller, org_id).await?;
    Ok(Json(organization))
}

#[utoipa::path(
    get,
    path = "/organizations/{org_id}/participants",
    params(("org_id" = Uuid, Path, description = "ID of the organization")),
    responses(
        (status = 200, description = "Active participants", body = Vec<OrganizationParticipant>),
        (status = 403, description = "Not a participant", body = ErrorResponse),
        (status = 404, description = "Organization not found", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn list_participants(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(org_id): Path<Uuid>,
) -> Result<Json<Vec<OrganizationParticipant>>, ApiError> {
    let participants = state.organizations.list_participants(&caller, org_id).await?;
    Ok(Json(participants))
}

#[utoipa::path(
    post,
    path = "/organizations/{org_id}/participants",
    params(("org_id" = Uuid, Path, description = "ID of the organization")),
    request_body = AddParticipantRequest,
    responses(
        (status = 201, description = "Participant added", body = OrganizationParticipant),
        (status = 403, description = "Caller is not an admin", body = ErrorResponse),
        (status = 404, description = "User or organization not found", body = ErrorResponse),
        (status = 409, description = "Already a participant", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn add_participant(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(org_id): Path<Uuid>,
    Json(req): Json<AddParticipantRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let participant = state
        .organizations
        .add_participant(&caller, org_id, req.user_id, req.role)
        .await?;
    Ok((StatusCode::CREATED, Json(participant)))
}

#[utoipa::path(
    delete,
    path = "/organizations/{org_id}/participants/{user_id}",
    params(
        ("org_id" = Uuid, Path, description = "ID of the organization"),
        ("user_id" = Uuid, Path, description = "ID of the participant to remove")
    ),
    responses(
        (status = 200, description = "Participant removed", body = OrganizationParticipant),
        (status = 403, description = "Caller is not an admin", body = ErrorResponse),
        (status = 404, description = "Participant not found", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn remove_participant(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path((org_id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<OrganizationParticipant>, ApiError> {
    let participant = state
        .organizations
        .remove_participant(&caller, org_id, user_id)
        .await?;
    reevaluate_pending(&state, org_id).await;
    Ok(Json(participant))
}

#[utoipa::path(
    put,
    path = "/organizations/{org_id}/quorum",
    params(("org_id" = Uuid, Path, description = "ID of the organization")),
    request_body = UpdateQuorumRequest,
    responses(
        (status = 200, description = "Quorum updated", body = Organization),
        (status = 400, description = "Invalid quorum", body = ErrorResponse),
        (status = 403, description = "Caller is not the first admin", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn update_quorum(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(org_id): Path<Uuid>,
    Json(req): Json<UpdateQuorumRequest>,
) -> Result<Json<Organization>, ApiError> {
    let organization = state
        .organizations
        .update_quorum(&caller, org_id, req.quorum)
        .await?;
    reevaluate_pending(&state, org_id).await;
    Ok(Json(organization))
}

#[utoipa::path(
    post,
    path = "/organizations/{org_id}/multisig",
    params(("org_id" = Uuid, Path, description = "ID of the organization")),
    responses(
        (status = 200, description = "Wallet deployed", body = Organization),
        (status = 403, description = "Caller is not the first admin", body = ErrorResponse),
        (status = 409, description = "Wallet already deployed", body = ErrorResponse),
        (status = 502, description = "Settlement service rejected the deployment", body = ErrorResponse),
        (status = 504, description = "Settlement service unavailable", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn deploy_multisig(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(org_id): Path<Uuid>,
) -> Result<Json<Organization>, ApiError> {
    let organization = state.organizations.deploy_multisig(&caller, org_id).await?;
    Ok(Json(organization))
}

#[utoipa::path(
    post,
    path = "/organizations/{org_id}/salaries",
    params(("org_id" = Uuid, Path, description = "ID of the organization")),
    responses(
        (status = 200, description = "Salary schedule deployed", body = SalariesResponse),
        (status = 403, description = "Caller is not the first admin", body = ErrorResponse),
        (status = 504, description = "Settlement service unavailable", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn deploy_salaries(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(org_id): Path<Uuid>,
) -> Result<Json<SalariesResponse>, ApiError> {
    let deployed = state.organizations.deploy_salaries(&caller, org_id).await?;
    Ok(Json(SalariesResponse {
        address: deployed.address,
    }))
}

#[utoipa::path(
    get,
    path = "/organizations/{org_id}/transactions",
    params(("org_id" = Uuid, Path, description = "ID of the organization")),
    responses(
        (status = 200, description = "Transactions of the organization", body = Vec<TransactionResponse>),
        (status = 403, description = "Not a participant", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn list_transactions(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(org_id): Path<Uuid>,
) -> Result<Json<Vec<TransactionResponse>>, ApiError> {
    let transactions = state.engine.list_transactions(&caller, org_id).await?;
    Ok(Json(transactions.into_iter().map(TransactionResponse::from).collect()))
}

#[utoipa::path(
    post,
    path = "/organizations/{org_id}/transactions",
    params(("org_id" = Uuid, Path, description = "ID of the organization")),
    request_body = CreateTransactionRequest,
    responses(
        (status = 201, description = "Transaction created", body = TransactionResponse),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 403, description = "Not a participant", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn create_transaction(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(org_id): Path<Uuid>,
    Json(req): Json<CreateTransactionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let destination = hex::decode(req.destination.trim().trim_start_matches("0x")).map_err(|_| {
        AccountingError::invalid_input(
            "destination",
            "Invalid Destination",
            "Destination must be a hex encoded address",
        )
    })?;
    let transaction = state
        .engine
        .create_transaction(
            &caller,
            org_id,
            NewTransaction {
                description: req.description,
                amount: req.amount,
                destination,
                max_fee_allowed: req.max_fee_allowed,
                deadline: req.deadline,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(TransactionResponse::from(transaction))))
}

#[utoipa::path(
    get,
    path = "/organizations/{org_id}/transactions/{tx_id}",
    params(
        ("org_id" = Uuid, Path, description = "ID of the organization"),
        ("tx_id" = Uuid, Path, description = "ID of the transaction")
    ),
    responses(
        (status = 200, description = "Transaction", body = TransactionResponse),
        (status = 404, description = "Transaction not found", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn get_transaction(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path((org_id, tx_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<TransactionResponse>, ApiError> {
    let transaction = state.engine.get_transaction(&caller, org_id, tx_id).await?;
    Ok(Json(transaction.into()))
}

#[utoipa::path(
    put,
    path = "/organizations/{org_id}/transactions/{tx_id}",
    params(
        ("org_id" = Uuid, Path, description = "ID of the organization"),
        ("tx_id" = Uuid, Path, description = "ID of the transaction")
    ),
    request_body = VoteRequest,
    responses(
        (status = 200, description = "Vote recorded", body = VoteResponse),
        (status = 403, description = "Not a participant", body = ErrorResponse),
        (status = 409, description = "Transaction already decided", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn record_confirmation(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path((org_id, tx_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<VoteRequest>,
) -> Result<Json<VoteResponse>, ApiError> {
    let outcome = state
        .engine
        .record_confirmation(&caller, org_id, tx_id, req.approve)
        .await?;
    Ok(Json(VoteResponse {
        transaction: outcome.transaction.into(),
        quorum: outcome.quorum,
    }))
}

#[utoipa::path(
    delete,
    path = "/organizations/{org_id}/transactions/{tx_id}",
    params(
        ("org_id" = Uuid, Path, description = "ID of the organization"),
        ("tx_id" = Uuid, Path, description = "ID of the transaction")
    ),
    responses(
        (status = 200, description = "Transaction cancelled", body = TransactionResponse),
        (status = 403, description = "Caller may not cancel", body = ErrorResponse),
        (status = 409, description = "Transaction already decided", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn cancel_transaction(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path((org_id, tx_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<TransactionResponse>, ApiError> {
    let transaction = state.engine.cancel(&caller, org_id, tx_id).await?;
    Ok(Json(transaction.into()))
}

#[utoipa::path(
    get,
    path = "/organizations/{org_id}/transactions/{tx_id}/confirmations",
    params(
        ("org_id" = Uuid, Path, description = "ID of the organization"),
        ("tx_id" = Uuid, Path, description = "ID of the transaction")
    ),
    responses(
        (status = 200, description = "Votes and quorum status", body = ConfirmationsResponse),
        (status = 404, description = "Transaction not found", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn list_confirmations(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path((org_id, tx_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ConfirmationsResponse>, ApiError> {
    let (confirmations, quorum) = state
        .engine
        .list_confirmations(&caller, org_id, tx_id)
        .await?;
    Ok(Json(ConfirmationsResponse { confirmations, quorum }))
}

#[utoipa::path(
    post,
    path = "/organizations/{org_id}/transactions/{tx_id}/commit",
    params(
        ("org_id" = Uuid, Path, description = "ID of the organization"),
        ("tx_id" = Uuid, Path, description = "ID of the transaction")
    ),
    responses(
        (status = 200, description = "Transaction committed", body = TransactionResponse),
        (status = 409, description = "Transaction is not confirmed", body = ErrorResponse),
        (status = 502, description = "Settlement service rejected the transaction", body = ErrorResponse),
        (status = 504, description = "Settlement service unavailable, safe to retry", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn commit_transaction(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path((org_id, tx_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<TransactionResponse>, ApiError> {
    let transaction = state.engine.commit(&caller, org_id, tx_id).await?;
    Ok(Json(transaction.into()))
}

#[utoipa::path(
    get,
    path = "/organizations/{org_id}/audits",
    params(("org_id" = Uuid, Path, description = "ID of the organization")),
    responses(
        (status = 200, description = "Organization audit trail", body = Vec<OrganizationAudit>),
        (status = 404, description = "Organization not found", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn get_organization_audits(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(org_id): Path<Uuid>,
) -> Result<Json<Vec<OrganizationAudit>>, ApiError> {
    let audits = state
        .organizations
        .get_organization_audits(&caller, org_id)
        .await?;
    Ok(Json(audits))
}

#[utoipa::path(
    get,
    path = "/logs",
    responses(
        (status = 200, description = "Log entries of the caller's own actions", body = Vec<AppLog>),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn get_app_logs(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
) -> Result<Json<Vec<AppLog>>, ApiError> {
    let logs = state.organizations.get_app_logs(&caller).await?;
    Ok(Json(logs))
}
