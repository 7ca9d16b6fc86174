use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::{
    api::models::{
        AddParticipantRequest, ConfirmationsResponse, CreateOrganizationRequest, CreateTransactionRequest,
        ErrorResponse, JoinRequest, LoginRequest, LoginResponse, SalariesResponse, TransactionResponse,
        UpdateQuorumRequest, VoteRequest, VoteResponse,
    },
    core::{
        models::{
            audit::{AppLog, OrganizationAudit},
            organization::{Organization, OrganizationParticipant, QuorumPolicy, Role},
            transaction::{Transaction, TransactionConfirmation, TransactionState},
            user::UserView,
        },
        quorum::QuorumStatus,
    },
};

#[derive(OpenApi)]
#[openapi(
    paths(
        super::handlers::ping,
        super::handlers::join,
        super::handlers::login,
        super::handlers::create_organization,
        super::handlers::get_organization,
        super::handlers::list_participants,
        super::handlers::add_participant,
        super::handlers::remove_participant,
        super::handlers::update_quorum,
        super::handlers::deploy_multisig,
        super::handlers::deploy_salaries,
        super::handlers::list_transactions,
        super::handlers::create_transaction,
        super::handlers::get_transaction,
        super::handlers::record_confirmation,
        super::handlers::cancel_transaction,
        super::handlers::list_confirmations,
        super::handlers::commit_transaction,
        super::handlers::get_organization_audits,
        super::handlers::get_app_logs
    ),
    components(schemas(
        JoinRequest,
        LoginRequest,
        LoginResponse,
        CreateOrganizationRequest,
        AddParticipantRequest,
        UpdateQuorumRequest,
        CreateTransactionRequest,
        VoteRequest,
        VoteResponse,
        TransactionResponse,
        ConfirmationsResponse,
        SalariesResponse,
        ErrorResponse,
        UserView,
        Organization,
        OrganizationParticipant,
        QuorumPolicy,
        Role,
        Transaction,
        TransactionConfirmation,
        TransactionState,
        QuorumStatus,
        AppLog,
        OrganizationAudit
    )),
    info(
        title = "Block Accounting API",
        description = "Multisig authorization of organization payments",
        version = "0.1.0"
    ),
    modifiers(&BearerAuth)
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "Bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
