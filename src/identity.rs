//! User registration and authentication
//!
//! The dispatcher only needs `IdentityProvider`; `SqliteUserDirectory` keeps
//! users in the same database file as the bands, with salted SHA-256
//! password hashes.

use crate::error::{BandHubError, Result};
use crate::persistence::check_table_name;
use rand::RngCore;
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::Path;

/// An authenticated user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
}

pub trait IdentityProvider {
    /// Resolve credentials to an identity, or `AuthFailure`
    fn authenticate(&self, username: &str, password: &str) -> Result<Identity>;

    /// Create a new user, or `AlreadyExists`
    fn register(&self, username: &str, password: &str) -> Result<Identity>;
}

fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn new_salt() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

pub struct SqliteUserDirectory {
    conn: Connection,
    table: String,
}

impl SqliteUserDirectory {
    pub fn open<P: AsRef<Path>>(path: P, table: &str) -> Result<Self> {
        Self::with_connection(Connection::open(path)?, table)
    }

    pub fn open_in_memory(table: &str) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, table)
    }

    fn with_connection(conn: Connection, table: &str) -> Result<Self> {
        check_table_name(table)?;
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    username TEXT PRIMARY KEY NOT NULL,
                    password_hash TEXT NOT NULL,
                    salt TEXT NOT NULL
                )",
                table
            ),
            [],
        )?;
        Ok(Self {
            conn,
            table: table.to_string(),
        })
    }
}

impl IdentityProvider for SqliteUserDirectory {
    fn authenticate(&self, username: &str, password: &str) -> Result<Identity> {
        let stored: Option<(String, String)> = self
            .conn
            .query_row(
                &format!(
                    "SELECT password_hash, salt FROM {} WHERE username = ?1",
                    self.table
                ),
                params![username],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match stored {
            Some((hash, salt)) if hash == hash_password(&salt, password) => Ok(Identity {
                username: username.to_string(),
            }),
            _ => Err(BandHubError::AuthFailure(
                "invalid username or password".to_string(),
            )),
        }
    }

    fn register(&self, username: &str, password: &str) -> Result<Identity> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(BandHubError::Validation(
                "username and password must not be empty".to_string(),
            ));
        }

        let salt = new_salt();
        let inserted = self.conn.execute(
            &format!(
                "INSERT OR IGNORE INTO {} (username, password_hash, salt) VALUES (?1, ?2, ?3)",
                self.table
            ),
            params![username, hash_password(&salt, password), salt],
        )?;
        if inserted == 0 {
            return Err(BandHubError::AlreadyExists(format!(
                "user '{}' is already registered",
                username
            )));
        }
        Ok(Identity {
            username: username.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_then_authenticate() {
        let users = SqliteUserDirectory::open_in_memory("users").unwrap();
        let identity = users.register("alice", "pw").unwrap();
        assert_eq!(identity.username, "alice");
        assert_eq!(users.authenticate("alice", "pw").unwrap(), identity);
    }

    #[test]
    fn test_wrong_password_and_unknown_user_fail() {
        let users = SqliteUserDirectory::open_in_memory("users").unwrap();
        users.register("alice", "pw").unwrap();
        assert!(matches!(
            users.authenticate("alice", "PW"),
            Err(BandHubError::AuthFailure(_))
        ));
        assert!(matches!(
            users.authenticate("bob", "pw"),
            Err(BandHubError::AuthFailure(_))
        ));
    }

    #[test]
    fn test_duplicate_registration() {
        let users = SqliteUserDirectory::open_in_memory("users").unwrap();
        users.register("alice", "pw").unwrap();
        assert!(matches!(
            users.register("alice", "other"),
            Err(BandHubError::AlreadyExists(_))
        ));
        // the original password still works
        assert!(users.authenticate("alice", "pw").is_ok());
    }

    #[test]
    fn test_hash_is_salted() {
        let a = hash_password("salt-a", "pw");
        let b = hash_password("salt-b", "pw");
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
    }
}
