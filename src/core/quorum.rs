//! Confirmation counting.
//!
//! Only votes of participants that are *currently* active members count. A participant
//! who left the organization after voting keeps their confirmation row, but the row is
//! ignored here.

use crate::core::models::{
    organization::{OrganizationParticipant, QuorumPolicy},
    transaction::TransactionConfirmation,
};
use serde::Serialize;
use std::collections::HashSet;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, ToSchema, PartialEq, Eq)]
pub struct QuorumStatus {
    /// Confirmations needed. `None` when the quorum cannot be reached at all.
    pub required: Option<u32>,
    pub confirmed: u32,
    pub eligible: u32,
}

impl QuorumStatus {
    pub fn is_reached(&self) -> bool {
        matches!(self.required, Some(required) if self.confirmed >= required)
    }
}

/// Resolves a policy against the number of eligible participants.
pub fn required_confirmations(policy: QuorumPolicy, eligible: u32) -> Option<u32> {
    if eligible == 0 {
        return None;
    }
    match policy {
        QuorumPolicy::AllParticipants => Some(eligible),
        QuorumPolicy::Threshold(0) => None,
        QuorumPolicy::Threshold(n) => Some(n),
    }
}

pub fn evaluate(
    policy: QuorumPolicy,
    active_participants: &[OrganizationParticipant],
    confirmations: &[TransactionConfirmation],
) -> QuorumStatus {
    let eligible: HashSet<Uuid> = active_participants
        .iter()
        .filter(|p| !p.has_left())
        .map(|p| p.user_id)
        .collect();

    let confirmed = confirmations
        .iter()
        .filter(|c| c.confirmed && eligible.contains(&c.user_id))
        .map(|c| c.user_id)
        .collect::<HashSet<_>>()
        .len() as u32;

    let eligible = eligible.len() as u32;
    QuorumStatus {
        required: required_confirmations(policy, eligible),
        confirmed,
        eligible,
    }
}
