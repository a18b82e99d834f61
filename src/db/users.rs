use crate::db::pool::Pool;
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UserError {
    #[error("username '{0}' is already taken")]
    DuplicateUsername(String),
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
}

pub struct UserRepository {
    pool: Pool,
}

impl UserRepository {
    pub fn new(pool: Pool) -> rusqlite::Result<Self> {
        let conn = pool.get();
        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL
            )",
            [],
        )?;
        drop(conn);
        Ok(Self { pool })
    }

    pub fn create(&self, username: &str, password: &str) -> Result<User, UserError> {
        if username.is_empty() || password.is_empty() {
            return Err(UserError::InvalidCredentials);
        }
        let hash = hash_password(username, password);
        let conn = self.pool.get();
        let result = conn.execute(
            "INSERT INTO users (username, password_hash) VALUES (?1, ?2)",
            rusqlite::params![username, hash],
        );
        match result {
            Ok(_) => Ok(User { id: conn.last_insert_rowid(), username: username.to_string() }),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
                Err(UserError::DuplicateUsername(username.to_string()))
            }
            Err(e) => Err(UserError::Db(e)),
        }
    }

    pub fn verify(&self, username: &str, password: &str) -> Result<User, UserError> {
        let hash = hash_password(username, password);
        let conn = self.pool.get();
        let found: Option<(i64, String)> = conn
            .query_row(
                "SELECT id, password_hash FROM users WHERE username = ?1",
                rusqlite::params![username],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .ok();

        match found {
            Some((id, stored_hash)) if stored_hash == hash => {
                Ok(User { id, username: username.to_string() })
            }
            _ => Err(UserError::InvalidCredentials),
        }
    }
}

/// Salts with the username so two accounts with the same password never
/// share a stored hash. Good enough to demonstrate the collaborator's
/// interface; not a production password-hashing scheme (no per-user random
/// salt, no work factor).
fn hash_password(username: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(username.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> UserRepository {
        let pool = Pool::new(":memory:", 1).unwrap();
        UserRepository::new(pool).unwrap()
    }

    #[test]
    fn create_then_verify_succeeds() {
        let repo = repo();
        repo.create("jane", "hunter2").unwrap();
        let user = repo.verify("jane", "hunter2").unwrap();
        assert_eq!(user.username, "jane");
    }

    #[test]
    fn duplicate_username_is_rejected() {
        let repo = repo();
        repo.create("jane", "hunter2").unwrap();
        let err = repo.create("jane", "different").unwrap_err();
        matches!(err, UserError::DuplicateUsername(_));
    }

    #[test]
    fn wrong_password_is_rejected() {
        let repo = repo();
        repo.create("jane", "hunter2").unwrap();
        let err = repo.verify("jane", "wrong").unwrap_err();
        matches!(err, UserError::InvalidCredentials);
    }

    #[test]
    fn unknown_user_is_rejected() {
        let repo = repo();
        let err = repo.verify("ghost", "x").unwrap_err();
        matches!(err, UserError::InvalidCredentials);
    }
}
