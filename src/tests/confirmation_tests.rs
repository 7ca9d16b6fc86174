use super::create_test_context;
use crate::core::errors::AccountingError;
use crate::core::models::organization::QuorumPolicy;
use crate::core::models::transaction::TransactionState;
use chrono::Duration;

#[tokio::test]
async fn test_threshold_reached_then_extra_vote_is_recorded() {
    let ctx = create_test_context();
    let (org, members) = ctx.organization_with(3, QuorumPolicy::Threshold(2)).await;
    let mut input = ctx.new_transaction(1000);
    input.max_fee_allowed = 10;
    let tx = ctx.engine.create_transaction(&members[0], org.id, input).await.unwrap();

    let first = ctx
        .engine
        .record_confirmation(&members[1], org.id, tx.id, true)
        .await
        .unwrap();
    assert_eq!(first.transaction.state(), TransactionState::Pending);
    assert_eq!(first.quorum.confirmed, 1);
    assert_eq!(first.quorum.required, Some(2));

    let second = ctx
        .engine
        .record_confirmation(&members[2], org.id, tx.id, true)
        .await
        .unwrap();
    assert!(second.became_confirmed);
    assert_eq!(second.transaction.state(), TransactionState::Confirmed);
    let confirmed_at = second.transaction.confirmed_at;

    let third = ctx
        .engine
        .record_confirmation(&members[0], org.id, tx.id, true)
        .await
        .unwrap();
    assert!(!third.became_confirmed);
    assert_eq!(third.quorum.confirmed, 3);
    assert_eq!(third.transaction.state(), TransactionState::Confirmed);
    assert_eq!(third.transaction.confirmed_at, confirmed_at);

    let (votes, _) = ctx
        .engine
        .list_confirmations(&members[0], org.id, tx.id)
        .await
        .unwrap();
    assert_eq!(votes.len(), 3);
}

#[tokio::test]
async fn test_deadline_passes_before_quorum() {
    let ctx = create_test_context();
    let (org, members) = ctx.organization_with(3, QuorumPolicy::Threshold(2)).await;
    let tx = ctx
        .engine
        .create_transaction(&members[0], org.id, ctx.new_transaction(1000))
        .await
        .unwrap();

    ctx.engine
        .record_confirmation(&members[1], org.id, tx.id, true)
        .await
        .unwrap();
    ctx.clock.advance(Duration::hours(1) + Duration::seconds(1));

    let current = ctx.engine.get_transaction(&members[0], org.id, tx.id).await.unwrap();
    assert_eq!(current.state(), TransactionState::Cancelled);

    let result = ctx
        .engine
        .record_confirmation(&members[2], org.id, tx.id, true)
        .await;
    assert!(matches!(result, Err(AccountingError::InvalidState(..))));
}

#[tokio::test]
async fn test_vote_on_expired_transaction_is_rejected_without_prior_read() {
    let ctx = create_test_context();
    let (org, members) = ctx.organization_with(2, QuorumPolicy::Threshold(1)).await;
    let tx = ctx
        .engine
        .create_transaction(&members[0], org.id, ctx.new_transaction(1000))
        .await
        .unwrap();

    // Exactly at the deadline the transaction is already overdue.
    ctx.clock.advance(Duration::hours(1));
    let result = ctx
        .engine
        .record_confirmation(&members[1], org.id, tx.id, true)
        .await;
    assert!(matches!(result, Err(AccountingError::InvalidState(..))));

    let current = ctx.engine.get_transaction(&members[0], org.id, tx.id).await.unwrap();
    assert_eq!(current.state(), TransactionState::Cancelled);
    assert!(current.confirmed_at.is_none());
}

#[tokio::test]
async fn test_departed_participant_vote_stops_counting() {
    let ctx = create_test_context();
    let (org, members) = ctx.organization_with(3, QuorumPolicy::Threshold(2)).await;
    let tx = ctx
        .engine
        .create_transaction(&members[0], org.id, ctx.new_transaction(1000))
        .await
        .unwrap();

    ctx.engine
        .record_confirmation(&members[1], org.id, tx.id, true)
        .await
        .unwrap();
    ctx.organizations
        .remove_participant(&members[0], org.id, members[1].user_id)
        .await
        .unwrap();

    let outcome = ctx
        .engine
        .record_confirmation(&members[2], org.id, tx.id, true)
        .await
        .unwrap();
    assert_eq!(outcome.quorum.confirmed, 1);
    assert_eq!(outcome.quorum.eligible, 2);
    assert_eq!(outcome.transaction.state(), TransactionState::Pending);

    let result = ctx
        .engine
        .record_confirmation(&members[1], org.id, tx.id, true)
        .await;
    assert!(matches!(result, Err(AccountingError::NotParticipant(..))));

    let outcome = ctx
        .engine
        .record_confirmation(&members[0], org.id, tx.id, true)
        .await
        .unwrap();
    assert_eq!(outcome.transaction.state(), TransactionState::Confirmed);
}

#[tokio::test]
async fn test_repeated_vote_is_idempotent() {
    let ctx = create_test_context();
    let (org, members) = ctx.organization_with(3, QuorumPolicy::AllParticipants).await;
    let tx = ctx
        .engine
        .create_transaction(&members[0], org.id, ctx.new_transaction(500))
        .await
        .unwrap();

    let once = ctx
        .engine
        .record_confirmation(&members[1], org.id, tx.id, true)
        .await
        .unwrap();
    let twice = ctx
        .engine
        .record_confirmation(&members[1], org.id, tx.id, true)
        .await
        .unwrap();

    assert_eq!(once.quorum, twice.quorum);
    assert_eq!(once.transaction.state(), twice.transaction.state());
    let (votes, status) = ctx
        .engine
        .list_confirmations(&members[1], org.id, tx.id)
        .await
        .unwrap();
    assert_eq!(votes.len(), 1);
    assert_eq!(status.confirmed, 1);
}

#[tokio::test]
async fn test_vote_can_be_withdrawn_while_pending() {
    let ctx = create_test_context();
    let (org, members) = ctx.organization_with(3, QuorumPolicy::Threshold(2)).await;
    let tx = ctx
        .engine
        .create_transaction(&members[0], org.id, ctx.new_transaction(500))
        .await
        .unwrap();

    ctx.engine
        .record_confirmation(&members[1], org.id, tx.id, true)
        .await
        .unwrap();
    let withdrawn = ctx
        .engine
        .record_confirmation(&members[1], org.id, tx.id, false)
        .await
        .unwrap();
    assert_eq!(withdrawn.quorum.confirmed, 0);

    let outcome = ctx
        .engine
        .record_confirmation(&members[2], org.id, tx.id, true)
        .await
        .unwrap();
    assert_eq!(outcome.transaction.state(), TransactionState::Pending);

    let status = ctx
        .engine
        .quorum_status(&members[0], org.id, tx.id)
        .await
        .unwrap();
    assert_eq!(status.confirmed, 1);
    assert!(!status.is_reached());
}

#[tokio::test]
async fn test_withdrawing_after_confirmation_keeps_state() {
    let ctx = create_test_context();
    let (org, members) = ctx.organization_with(2, QuorumPolicy::Threshold(1)).await;
    let tx = ctx
        .engine
        .create_transaction(&members[0], org.id, ctx.new_transaction(500))
        .await
        .unwrap();

    ctx.engine
        .record_confirmation(&members[1], org.id, tx.id, true)
        .await
        .unwrap();
    let outcome = ctx
        .engine
        .record_confirmation(&members[1], org.id, tx.id, false)
        .await
        .unwrap();
    assert_eq!(outcome.quorum.confirmed, 0);
    assert_eq!(outcome.transaction.state(), TransactionState::Confirmed);
}

#[tokio::test]
async fn test_quorum_outcome_does_not_depend_on_vote_order() {
    let votes = [true, false, true, false];
    for order in [[0usize, 1, 2, 3], [3, 2, 1, 0], [1, 3, 0, 2]] {
        let ctx = create_test_context();
        let (org, members) = ctx.organization_with(4, QuorumPolicy::Threshold(2)).await;
        let tx = ctx
            .engine
            .create_transaction(&members[0], org.id, ctx.new_transaction(100))
            .await
            .unwrap();

        for index in order {
            ctx.engine
                .record_confirmation(&members[index], org.id, tx.id, votes[index])
                .await
                .unwrap();
        }

        let current = ctx.engine.get_transaction(&members[0], org.id, tx.id).await.unwrap();
        assert_eq!(current.state(), TransactionState::Confirmed, "order {:?}", order);
    }
}

#[tokio::test]
async fn test_below_threshold_stays_pending() {
    let ctx = create_test_context();
    let (org, members) = ctx.organization_with(4, QuorumPolicy::Threshold(3)).await;
    let tx = ctx
        .engine
        .create_transaction(&members[0], org.id, ctx.new_transaction(100))
        .await
        .unwrap();

    for (member, approve) in members.iter().zip([true, true, false, false]) {
        ctx.engine
            .record_confirmation(member, org.id, tx.id, approve)
            .await
            .unwrap();
    }

    let current = ctx.engine.get_transaction(&members[0], org.id, tx.id).await.unwrap();
    assert_eq!(current.state(), TransactionState::Pending);
}

#[tokio::test]
async fn test_threshold_above_membership_never_confirms() {
    let ctx = create_test_context();
    let (org, members) = ctx.organization_with(2, QuorumPolicy::Threshold(3)).await;
    let tx = ctx
        .engine
        .create_transaction(&members[0], org.id, ctx.new_transaction(100))
        .await
        .unwrap();

    for member in &members {
        let outcome = ctx
            .engine
            .record_confirmation(member, org.id, tx.id, true)
            .await
            .unwrap();
        assert_eq!(outcome.transaction.state(), TransactionState::Pending);
    }

    let cancelled = ctx.engine.cancel(&members[0], org.id, tx.id).await.unwrap();
    assert_eq!(cancelled.state(), TransactionState::Cancelled);
}

#[tokio::test]
async fn test_outsider_cannot_vote() {
    let ctx = create_test_context();
    let (org, members) = ctx.organization_with(1, QuorumPolicy::AllParticipants).await;
    let outsider = ctx.register().await;
    let tx = ctx
        .engine
        .create_transaction(&members[0], org.id, ctx.new_transaction(100))
        .await
        .unwrap();

    let result = ctx.engine.record_confirmation(&outsider, org.id, tx.id, true).await;
    assert!(matches!(result, Err(AccountingError::NotParticipant(..))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_votes_keep_invariants() {
    let ctx = create_test_context();
    let (org, members) = ctx.organization_with(6, QuorumPolicy::Threshold(3)).await;
    let tx = ctx
        .engine
        .create_transaction(&members[0], org.id, ctx.new_transaction(100))
        .await
        .unwrap();

    let handles: Vec<_> = members
        .iter()
        .cloned()
        .map(|member| {
            let engine = ctx.engine.clone();
            let org_id = org.id;
            let tx_id = tx.id;
            tokio::spawn(async move { engine.record_confirmation(&member, org_id, tx_id, true).await })
        })
        .collect();

    let mut transitions = 0;
    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        assert!(outcome.transaction.check_invariants().is_ok());
        if outcome.became_confirmed {
            transitions += 1;
        }
    }
    assert_eq!(transitions, 1);

    let current = ctx.engine.get_transaction(&members[0], org.id, tx.id).await.unwrap();
    assert_eq!(current.state(), TransactionState::Confirmed);
    assert!(current.check_invariants().is_ok());
    let (votes, status) = ctx
        .engine
        .list_confirmations(&members[0], org.id, tx.id)
        .await
        .unwrap();
    assert_eq!(votes.len(), 6);
    assert_eq!(status.confirmed, 6);
}

#[tokio::test]
async fn test_removing_last_non_voter_completes_quorum() {
    let ctx = create_test_context();
    let (org, members) = ctx.organization_with(3, QuorumPolicy::AllParticipants).await;
    let tx = ctx
        .engine
        .create_transaction(&members[0], org.id, ctx.new_transaction(100))
        .await
        .unwrap();
    for member in &members[..2] {
        ctx.engine
            .record_confirmation(member, org.id, tx.id, true)
            .await
            .unwrap();
    }

    ctx.organizations
        .remove_participant(&members[0], org.id, members[2].user_id)
        .await
        .unwrap();
    assert_eq!(ctx.engine.reevaluate_pending(org.id).await.unwrap(), 1);
    assert_eq!(ctx.engine.reevaluate_pending(org.id).await.unwrap(), 0);

    let current = ctx.engine.get_transaction(&members[0], org.id, tx.id).await.unwrap();
    assert_eq!(current.state(), TransactionState::Confirmed);
    assert!(current.confirmed_at.is_some());
    assert!(current.check_invariants().is_ok());
}

#[tokio::test]
async fn test_lowering_threshold_completes_quorum() {
    let ctx = create_test_context();
    let (org, members) = ctx.organization_with(3, QuorumPolicy::Threshold(3)).await;
    let reached = ctx
        .engine
        .create_transaction(&members[0], org.id, ctx.new_transaction(100))
        .await
        .unwrap();
    let short = ctx
        .engine
        .create_transaction(&members[0], org.id, ctx.new_transaction(200))
        .await
        .unwrap();
    for member in &members[..2] {
        ctx.engine
            .record_confirmation(member, org.id, reached.id, true)
            .await
            .unwrap();
    }
    ctx.engine
        .record_confirmation(&members[1], org.id, short.id, true)
        .await
        .unwrap();

    ctx.organizations
        .update_quorum(&members[0], org.id, QuorumPolicy::Threshold(2))
        .await
        .unwrap();
    assert_eq!(ctx.engine.reevaluate_pending(org.id).await.unwrap(), 1);

    let reached = ctx.engine.get_transaction(&members[0], org.id, reached.id).await.unwrap();
    let short = ctx.engine.get_transaction(&members[0], org.id, short.id).await.unwrap();
    assert_eq!(reached.state(), TransactionState::Confirmed);
    assert_eq!(short.state(), TransactionState::Pending);
}

#[tokio::test]
async fn test_reevaluation_expires_overdue_transactions() {
    let ctx = create_test_context();
    let (org, members) = ctx.organization_with(2, QuorumPolicy::AllParticipants).await;
    let tx = ctx
        .engine
        .create_transaction(&members[0], org.id, ctx.new_transaction(100))
        .await
        .unwrap();
    ctx.engine
        .record_confirmation(&members[0], org.id, tx.id, true)
        .await
        .unwrap();

    ctx.clock.advance(Duration::hours(2));
    ctx.organizations
        .remove_participant(&members[0], org.id, members[1].user_id)
        .await
        .unwrap();
    assert_eq!(ctx.engine.reevaluate_pending(org.id).await.unwrap(), 0);

    let current = ctx.engine.get_transaction(&members[0], org.id, tx.id).await.unwrap();
    assert_eq!(current.state(), TransactionState::Cancelled);
}
