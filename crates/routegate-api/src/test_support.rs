//! Helpers shared by the router tests

use routegate_auth::{HashingConfig, PasswordHasher, SharedCredentials};
use tempfile::TempDir;

use crate::state::AppState;

/// State backed by an empty credential store in a fresh temp directory
///
/// Keep the returned directory alive for as long as the state is used.
pub(crate) fn test_state() -> (AppState, TempDir) {
    let dir = TempDir::new().unwrap();
    let hasher = PasswordHasher::new(HashingConfig::minimal()).unwrap();
    let credentials =
        SharedCredentials::open(dir.path().join("user_credentials.json"), hasher).unwrap();
    (AppState::new(credentials), dir)
}
