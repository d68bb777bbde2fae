//! `routegate user ...` subcommands

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Subcommand;
use routegate_auth::{INCORRECT_CREDENTIALS, SharedCredentials};
use tracing::info;

use crate::config::SeedUser;

#[derive(Subcommand, Debug)]
pub enum UserCommand {
    /// Add a user, replacing the password if the user already exists
    Add {
        username: String,
        #[arg(long, env = "ROUTEGATE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Delete a user after confirming the password
    Delete {
        username: String,
        #[arg(long, env = "ROUTEGATE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Check a username/password pair
    Check {
        username: String,
        #[arg(long, env = "ROUTEGATE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// List stored usernames
    List,
}

/// Reject names that cannot travel in a Basic auth header
pub fn validate_username(username: &str) -> Result<()> {
    if username.is_empty() {
        anyhow::bail!("Username cannot be empty");
    }
    if username.contains(':') {
        anyhow::bail!("Username cannot contain ':'");
    }
    if username.chars().any(char::is_control) {
        anyhow::bail!("Username cannot contain control characters");
    }
    Ok(())
}

pub fn run(command: UserCommand, credentials: &SharedCredentials) -> Result<ExitCode> {
    match command {
        UserCommand::Add { username, password } => {
            validate_username(&username)?;
            credentials
                .add_user(&username, &password)
                .with_context(|| format!("Failed to save user {}", username))?;
            println!("Saved user {}", username);
            Ok(ExitCode::SUCCESS)
        }
        UserCommand::Delete { username, password } => {
            if credentials.delete_user(&username, &password)? {
                println!("Deleted user {}", username);
                Ok(ExitCode::SUCCESS)
            } else {
                eprintln!("{}", INCORRECT_CREDENTIALS);
                Ok(ExitCode::FAILURE)
            }
        }
        UserCommand::Check { username, password } => {
            if credentials.validate_user(&username, &password) {
                println!("valid");
                Ok(ExitCode::SUCCESS)
            } else {
                println!("invalid");
                Ok(ExitCode::FAILURE)
            }
        }
        UserCommand::List => {
            for username in credentials.usernames() {
                println!("{}", username);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Make sure every configured seed user exists with its configured password
///
/// Users whose stored hash already matches are left alone so restarts do not
/// rewrite the file.
pub fn apply_seed_users(credentials: &SharedCredentials, seeds: &[SeedUser]) -> Result<usize> {
    let mut written = 0;
    for seed in seeds {
        validate_username(&seed.username)
            .with_context(|| format!("Invalid seed user {:?}", seed.username))?;
        if credentials.validate_user(&seed.username, &seed.password) {
            continue;
        }
        credentials
            .add_user(&seed.username, &seed.password)
            .with_context(|| format!("Failed to seed user {}", seed.username))?;
        info!("Seeded user {}", seed.username);
        written += 1;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use routegate_auth::{HashingConfig, PasswordHasher};
    use tempfile::TempDir;

    fn store() -> (SharedCredentials, TempDir) {
        let dir = TempDir::new().unwrap();
        let hasher = PasswordHasher::new(HashingConfig::minimal()).unwrap();
        let credentials = SharedCredentials::open(dir.path().join("users.json"), hasher).unwrap();
        (credentials, dir)
    }

    #[test]
    fn test_validate_username() {
        assert!(validate_username("Meghna").is_ok());
        assert!(validate_username("user.name@example.com").is_ok());
        assert!(validate_username("").is_err());
        assert!(validate_username("a:b").is_err());
        assert!(validate_username("tab\there").is_err());
    }

    #[test]
    fn test_add_check_delete() {
        let (credentials, _dir) = store();

        let code = run(
            UserCommand::Add {
                username: "Sunil".to_string(),
                password: "S823".to_string(),
            },
            &credentials,
        )
        .unwrap();
        assert_eq!(code, ExitCode::SUCCESS);
        assert!(credentials.validate_user("Sunil", "S823"));

        let code = run(
            UserCommand::Check {
                username: "Sunil".to_string(),
                password: "nope".to_string(),
            },
            &credentials,
        )
        .unwrap();
        assert_eq!(code, ExitCode::FAILURE);

        let code = run(
            UserCommand::Delete {
                username: "Sunil".to_string(),
                password: "nope".to_string(),
            },
            &credentials,
        )
        .unwrap();
        assert_eq!(code, ExitCode::FAILURE);
        assert!(credentials.contains("Sunil"));

        let code = run(
            UserCommand::Delete {
                username: "Sunil".to_string(),
                password: "S823".to_string(),
            },
            &credentials,
        )
        .unwrap();
        assert_eq!(code, ExitCode::SUCCESS);
        assert!(credentials.is_empty());
    }

    #[test]
    fn test_add_rejects_colon_username() {
        let (credentials, _dir) = store();
        let result = run(
            UserCommand::Add {
                username: "a:b".to_string(),
                password: "pw".to_string(),
            },
            &credentials,
        );
        assert!(result.is_err());
        assert!(credentials.is_empty());
    }

    #[test]
    fn test_seed_users_are_idempotent() {
        let (credentials, _dir) = store();
        let seeds = vec![
            SeedUser {
                username: "user1".to_string(),
                password: "password1".to_string(),
            },
            SeedUser {
                username: "user2".to_string(),
                password: "password2".to_string(),
            },
        ];

        assert_eq!(apply_seed_users(&credentials, &seeds).unwrap(), 2);
        assert_eq!(apply_seed_users(&credentials, &seeds).unwrap(), 0);

        credentials.add_user("user1", "changed").unwrap();
        assert_eq!(apply_seed_users(&credentials, &seeds).unwrap(), 1);
        assert!(credentials.validate_user("user1", "password1"));
    }
}
