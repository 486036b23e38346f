//! Account use-cases: registration and sign-in.
//!
//! # Invariants
//! - Registration always produces the deterministic default document.
//! - Credentials are compared as stored (no hashing).

use crate::clock::Clock;
use crate::model::user::{validate_username, UserRecord, UserValidationError};
use crate::repo::user_repo::{RepoError, UserRepository};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug)]
pub enum AccountError {
    InvalidCredentials,
    Repo(RepoError),
}

impl Display for AccountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidCredentials => write!(f, "invalid credentials"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for AccountError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidCredentials => None,
            Self::Repo(err) => Some(err),
        }
    }
}

impl From<RepoError> for AccountError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<UserValidationError> for AccountError {
    fn from(value: UserValidationError) -> Self {
        Self::Repo(RepoError::Validation(value))
    }
}

pub struct AccountService<R: UserRepository, C: Clock> {
    repo: R,
    clock: C,
}

impl<R: UserRepository, C: Clock> AccountService<R, C> {
    pub fn new(repo: R, clock: C) -> Self {
        Self { repo, clock }
    }

    /// Creates a user with registration defaults and returns the stored document.
    ///
    /// # Errors
    /// - `Repo(AlreadyExists)` when the username is taken.
    /// - `Repo(Validation)` for an invalid username or empty password.
    pub fn register(&self, username: &str, password: &str) -> Result<UserRecord, AccountError> {
        validate_username(username)?;
        let user = UserRecord::registered(username, self.clock.today());
        match self.repo.create_user(&user, password) {
            Ok(()) => {
                info!("event=user_register module=account status=ok");
                Ok(user)
            }
            Err(err) => {
                warn!("event=user_register module=account status=error error={err}");
                Err(err.into())
            }
        }
    }

    /// Checks credentials. Unknown users and wrong passwords are indistinguishable.
    pub fn login(&self, username: &str, password: &str) -> Result<(), AccountError> {
        if self.repo.check_password(username, password)? {
            info!("event=user_login module=account status=ok");
            Ok(())
        } else {
            info!("event=user_login module=account status=rejected");
            Err(AccountError::InvalidCredentials)
        }
    }
}
