use super::create_test_context;
use crate::core::errors::{AccountingError, ErrorKind};
use crate::core::models::organization::{QuorumPolicy, Role};
use uuid::Uuid;

#[tokio::test]
async fn test_create_organization_makes_caller_first_admin() {
    let ctx = create_test_context();
    let founder = ctx.register().await;

    let org = ctx
        .organizations
        .create_organization(&founder, "  Acme Ltd ".to_string(), QuorumPolicy::default())
        .await
        .unwrap();
    assert_eq!(org.name, "Acme Ltd");
    assert_eq!(org.quorum, QuorumPolicy::AllParticipants);
    assert!(org.multisig_address.is_none());

    let participants = ctx
        .organizations
        .list_participants(&founder, org.id)
        .await
        .unwrap();
    assert_eq!(participants.len(), 1);
    assert_eq!(participants[0].user_id, founder.user_id);
    assert_eq!(participants[0].role, Role::FirstAdmin);
}

#[tokio::test]
async fn test_create_organization_validates_input() {
    let ctx = create_test_context();
    let founder = ctx.register().await;

    for (name, quorum) in [
        ("", QuorumPolicy::AllParticipants),
        ("Acme <script>", QuorumPolicy::AllParticipants),
        (&"x".repeat(101)[..], QuorumPolicy::AllParticipants),
        ("Acme", QuorumPolicy::Threshold(0)),
    ] {
        let result = ctx
            .organizations
            .create_organization(&founder, name.to_string(), quorum)
            .await;
        assert!(matches!(result, Err(AccountingError::InvalidInput(..))), "{:?}", name);
    }
}

#[tokio::test]
async fn test_only_admins_manage_participants() {
    let ctx = create_test_context();
    let (org, members) = ctx.organization_with(2, QuorumPolicy::AllParticipants).await;
    let newcomer = ctx.register().await;

    let result = ctx
        .organizations
        .add_participant(&members[1], org.id, newcomer.user_id, Role::Employee)
        .await;
    assert!(matches!(result, Err(AccountingError::Unauthorized(..))));

    ctx.organizations
        .add_participant(&members[0], org.id, newcomer.user_id, Role::Admin)
        .await
        .unwrap();

    // Admins may add participants too.
    let another = ctx.register().await;
    ctx.organizations
        .add_participant(&newcomer, org.id, another.user_id, Role::Employee)
        .await
        .unwrap();

    let result = ctx
        .organizations
        .remove_participant(&members[1], org.id, another.user_id)
        .await;
    assert!(matches!(result, Err(AccountingError::Unauthorized(..))));
}

#[tokio::test]
async fn test_add_participant_rejects_duplicates_and_unknown_users() {
    let ctx = create_test_context();
    let (org, members) = ctx.organization_with(2, QuorumPolicy::AllParticipants).await;

    let result = ctx
        .organizations
        .add_participant(&members[0], org.id, members[1].user_id, Role::Employee)
        .await;
    assert!(matches!(result, Err(AccountingError::Conflict(_))));

    let result = ctx
        .organizations
        .add_participant(&members[0], org.id, Uuid::new_v4(), Role::Employee)
        .await;
    assert!(matches!(result, Err(AccountingError::UserNotFound(_))));

    let newcomer = ctx.register().await;
    let result = ctx
        .organizations
        .add_participant(&members[0], org.id, newcomer.user_id, Role::FirstAdmin)
        .await;
    assert!(matches!(result, Err(AccountingError::InvalidInput(..))));
}

#[tokio::test]
async fn test_removed_participant_loses_access_and_can_rejoin() {
    let ctx = create_test_context();
    let (org, members) = ctx.organization_with(2, QuorumPolicy::AllParticipants).await;

    let removed = ctx
        .organizations
        .remove_participant(&members[0], org.id, members[1].user_id)
        .await
        .unwrap();
    assert!(removed.has_left());

    let result = ctx.organizations.list_participants(&members[1], org.id).await;
    assert_eq!(result.unwrap_err().kind(), ErrorKind::Unauthorized);
    let result = ctx
        .organizations
        .remove_participant(&members[0], org.id, members[1].user_id)
        .await;
    assert!(matches!(result, Err(AccountingError::ParticipantNotFound(..))));

    let rejoined = ctx
        .organizations
        .add_participant(&members[0], org.id, members[1].user_id, Role::Employee)
        .await
        .unwrap();
    assert!(!rejoined.has_left());
    let participants = ctx
        .organizations
        .list_participants(&members[1], org.id)
        .await
        .unwrap();
    assert_eq!(participants.len(), 2);
}

#[tokio::test]
async fn test_first_admin_cannot_be_removed() {
    let ctx = create_test_context();
    let (org, members) = ctx.organization_with(2, QuorumPolicy::AllParticipants).await;
    let admin = ctx.register().await;
    ctx.organizations
        .add_participant(&members[0], org.id, admin.user_id, Role::Admin)
        .await
        .unwrap();

    let result = ctx
        .organizations
        .remove_participant(&admin, org.id, members[0].user_id)
        .await;
    assert!(matches!(result, Err(AccountingError::Unauthorized(..))));
}

#[tokio::test]
async fn test_update_quorum_is_first_admin_only() {
    let ctx = create_test_context();
    let (org, members) = ctx.organization_with(2, QuorumPolicy::AllParticipants).await;

    let result = ctx
        .organizations
        .update_quorum(&members[1], org.id, QuorumPolicy::Threshold(1))
        .await;
    assert!(matches!(result, Err(AccountingError::Unauthorized(..))));

    let result = ctx
        .organizations
        .update_quorum(&members[0], org.id, QuorumPolicy::Threshold(0))
        .await;
    assert!(matches!(result, Err(AccountingError::InvalidInput(..))));

    let updated = ctx
        .organizations
        .update_quorum(&members[0], org.id, QuorumPolicy::Threshold(1))
        .await
        .unwrap();
    assert_eq!(updated.quorum, QuorumPolicy::Threshold(1));
}

#[tokio::test]
async fn test_deploy_multisig_uses_active_owners_and_quorum() {
    let ctx = create_test_context();
    let (org, members) = ctx.organization_with(3, QuorumPolicy::Threshold(2)).await;

    let deployed = ctx
        .organizations
        .deploy_multisig(&members[0], org.id)
        .await
        .unwrap();
    assert_eq!(deployed.multisig_address.as_deref(), Some("0xmultisig"));

    let deployments = ctx.gateway.deployments.lock().unwrap().clone();
    assert_eq!(deployments.len(), 1);
    assert_eq!(deployments[0].owners.len(), 3);
    assert!(deployments[0].owners.iter().all(|owner| owner.starts_with("0x")));
    assert_eq!(deployments[0].confirmations, 2);

    let stored = ctx.organizations.get_organization(&members[1], org.id).await.unwrap();
    assert_eq!(stored.multisig_address.as_deref(), Some("0xmultisig"));
}

#[tokio::test]
async fn test_deploy_multisig_caps_confirmations_at_owner_count() {
    let ctx = create_test_context();
    let (org, members) = ctx.organization_with(2, QuorumPolicy::Threshold(5)).await;

    ctx.organizations
        .deploy_multisig(&members[0], org.id)
        .await
        .unwrap();
    let deployments = ctx.gateway.deployments.lock().unwrap().clone();
    assert_eq!(deployments[0].confirmations, 2);
}

#[tokio::test]
async fn test_deploy_multisig_guards() {
    let ctx = create_test_context();
    let (org, members) = ctx.organization_with(2, QuorumPolicy::AllParticipants).await;

    let result = ctx.organizations.deploy_multisig(&members[1], org.id).await;
    assert!(matches!(result, Err(AccountingError::Unauthorized(..))));

    ctx.organizations
        .deploy_multisig(&members[0], org.id)
        .await
        .unwrap();
    let result = ctx.organizations.deploy_multisig(&members[0], org.id).await;
    assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidState);
    assert_eq!(ctx.gateway.deployments.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_public_keys_are_cached_per_user() {
    let ctx = create_test_context();
    let (first, members) = ctx.organization_with(2, QuorumPolicy::AllParticipants).await;
    let second = ctx
        .organizations
        .create_organization(&members[0], "Second".to_string(), QuorumPolicy::AllParticipants)
        .await
        .unwrap();
    ctx.organizations
        .add_participant(&members[0], second.id, members[1].user_id, Role::Employee)
        .await
        .unwrap();

    ctx.organizations
        .deploy_multisig(&members[0], first.id)
        .await
        .unwrap();
    ctx.organizations
        .deploy_multisig(&members[0], second.id)
        .await
        .unwrap();

    assert_eq!(ctx.gateway.derivations.lock().unwrap().len(), 2);
    let deployments = ctx.gateway.deployments.lock().unwrap().clone();
    let mut first_owners = deployments[0].owners.clone();
    let mut second_owners = deployments[1].owners.clone();
    first_owners.sort();
    second_owners.sort();
    assert_eq!(first_owners, second_owners);
}

#[tokio::test]
async fn test_salary_deployment_is_first_admin_only() {
    let ctx = create_test_context();
    let (org, members) = ctx.organization_with(2, QuorumPolicy::AllParticipants).await;

    let result = ctx.organizations.deploy_salaries(&members[1], org.id).await;
    assert!(matches!(result, Err(AccountingError::Unauthorized(..))));
    assert!(ctx.gateway.salary_deployments.lock().unwrap().is_empty());

    let deployed = ctx
        .organizations
        .deploy_salaries(&members[0], org.id)
        .await
        .unwrap();
    assert_eq!(deployed.address, "0xsalaries");

    let requests = ctx.gateway.salary_deployments.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].authorized_wallet,
        format!("0x{}", members[0].seed.to_hex())
    );
}

#[tokio::test]
async fn test_audits_are_member_only() {
    let ctx = create_test_context();
    let (org, members) = ctx.organization_with(1, QuorumPolicy::AllParticipants).await;
    let outsider = ctx.register().await;

    let audits = ctx
        .organizations
        .get_organization_audits(&members[0], org.id)
        .await
        .unwrap();
    assert_eq!(audits[0].action, "organization_created");

    let result = ctx.organizations.get_organization_audits(&outsider, org.id).await;
    assert!(matches!(result, Err(AccountingError::NotParticipant(..))));
}
