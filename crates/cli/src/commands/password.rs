//! Admin password hashing.

use std::io::{BufRead, IsTerminal};

use simonia_server::services::auth::{AuthError, hash_password};
use thiserror::Error;

/// Shortest admin password accepted.
const MIN_ADMIN_PASSWORD_LENGTH: usize = 12;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("Password must be at least {MIN_ADMIN_PASSWORD_LENGTH} characters")]
    TooShort,

    #[error("Failed to read password: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Hash(#[from] AuthError),
}

/// Hash `password` (or a line from stdin) and print the PHC string.
pub fn run(password: Option<String>) -> Result<(), PasswordError> {
    let password = match password {
        Some(password) => password,
        None => read_stdin()?,
    };
    validate(&password)?;

    let hash = hash_password(&password)?;

    #[allow(clippy::print_stdout)]
    {
        println!("{hash}");
    }
    Ok(())
}

fn read_stdin() -> Result<String, PasswordError> {
    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        #[allow(clippy::print_stderr)]
        {
            eprint!("Password: ");
        }
    }
    let mut line = String::new();
    stdin.lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn validate(password: &str) -> Result<(), PasswordError> {
    if password.chars().count() < MIN_ADMIN_PASSWORD_LENGTH {
        return Err(PasswordError::TooShort);
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(matches!(validate("short"), Err(PasswordError::TooShort)));
        assert!(validate("correct horse battery staple").is_ok());
    }

    #[test]
    fn test_hash_is_phc_string() {
        let hash = hash_password("correct horse battery staple").unwrap();
        assert!(hash.starts_with("$argon2id$"));
    }
}
