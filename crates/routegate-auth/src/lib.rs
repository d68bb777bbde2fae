//! Routegate Authentication
//!
//! This crate provides the durable basic-auth credential store,
//! Argon2id password hashing and `Authorization: Basic` header parsing
//! used by the Routegate HTTP layer.

pub mod basic;
pub mod error;
pub mod password;
pub mod store;

pub use basic::BasicCredentials;
pub use error::{AuthError, INCORRECT_CREDENTIALS};
pub use password::{HashingConfig, PasswordHasher};
pub use store::{CredentialStore, SharedCredentials};
