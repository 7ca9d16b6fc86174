pub const USER_REGISTERED: &str = "user_registered";
pub const USER_LOGGED_IN: &str = "user_logged_in";

pub const ORGANIZATION_CREATED: &str = "organization_created";
pub const PARTICIPANT_ADDED: &str = "participant_added";
pub const PARTICIPANT_REMOVED: &str = "participant_removed";
pub const QUORUM_UPDATED: &str = "quorum_updated";
pub const MULTISIG_DEPLOYED: &str = "multisig_deployed";
pub const SALARIES_DEPLOYED: &str = "salaries_deployed";

pub const TRANSACTION_CREATED: &str = "transaction_created";
pub const CONFIRMATION_RECORDED: &str = "confirmation_recorded";
pub const TRANSACTION_CONFIRMED: &str = "transaction_confirmed";
pub const TRANSACTION_CANCELLED: &str = "transaction_cancelled";
pub const TRANSACTION_EXPIRED: &str = "transaction_expired";
pub const TRANSACTION_COMMITTED: &str = "transaction_committed";
pub const COMMIT_FAILED: &str = "commit_failed";

pub const MAX_DESCRIPTION_LENGTH: usize = 255;
pub const MAX_NAME_LENGTH: usize = 100;
pub const PUBLIC_KEY_TTL_SECS: u64 = 3600;
