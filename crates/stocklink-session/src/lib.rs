//! Encrypted on-disk session store for the signed-in operator.
//!
//! Holds the access/refresh tokens, role, and email between launches, with
//! tokens encrypted at rest under a key derived from the terminal secret.

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

use stocklink_core::types::UserRole;
use stocklink_core::{StockLinkError, StockLinkResult};

const SALT_LEN: usize = 16;
const VERIFY_LABEL: &[u8] = b"stocklink-session-verifier";
const NONCE_LEN: usize = 12;

/// The persisted session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSession {
    pub user_email: String,
    pub role: UserRole,
    #[serde(skip)]
    pub access_token: String,
    #[serde(skip)]
    pub refresh_token: Option<String>,
    pub updated_at: i64,
}

pub struct SessionStore {
    conn: Connection,
    master_key: Option<Vec<u8>>,
}

impl SessionStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> StockLinkResult<Self> {
        log::info!("Opening session store at {:?}", db_path.as_ref());

        let conn = Connection::open(db_path)
            .map_err(|e| StockLinkError::session(format!("Failed to open database: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS session (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                user_email TEXT NOT NULL,
                role TEXT NOT NULL,
                access_encrypted BLOB NOT NULL,
                access_nonce BLOB NOT NULL,
                refresh_encrypted BLOB,
                refresh_nonce BLOB,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )
        .map_err(|e| StockLinkError::session(format!("Failed to create table: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS session_meta (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                salt BLOB NOT NULL,
                verifier BLOB NOT NULL,
                created_at INTEGER NOT NULL
            )",
            [],
        )
        .map_err(|e| StockLinkError::session(format!("Failed to create metadata: {}", e)))?;

        Ok(Self {
            conn,
            master_key: None,
        })
    }

    /// Unlock with the terminal secret. First unlock seeds the salt and
    /// verifier; later unlocks must match them.
    pub fn unlock(&mut self, secret: &str) -> StockLinkResult<()> {
        if let Some((salt, stored_verifier)) = self.load_meta()? {
            let key = derive_key(secret, &salt);
            let verifier = derive_verifier(&key);

            if !constant_time_eq(&verifier, &stored_verifier) {
                return Err(StockLinkError::session("Invalid terminal secret"));
            }

            self.master_key = Some(key.to_vec());
            return Ok(());
        }

        let mut salt = vec![0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let key = derive_key(secret, &salt);
        let verifier = derive_verifier(&key);
        self.store_meta(&salt, &verifier)?;
        self.master_key = Some(key.to_vec());

        Ok(())
    }

    pub fn lock(&mut self) {
        self.master_key = None;
    }

    pub fn is_unlocked(&self) -> bool {
        self.master_key.is_some()
    }

    /// Persist the signed-in session, replacing any previous one.
    pub fn save(&mut self, session: &StoredSession) -> StockLinkResult<()> {
        let key = self.require_key()?.to_vec();
        log::info!("Saving session for {}", session.user_email);

        let (access_encrypted, access_nonce) = encrypt(&session.access_token, &key)?;
        let (refresh_encrypted, refresh_nonce) = match &session.refresh_token {
            Some(token) => {
                let (enc, nonce) = encrypt(token, &key)?;
                (Some(enc), Some(nonce))
            }
            None => (None, None),
        };

        let now = current_timestamp();
        self.conn
            .execute(
                "INSERT OR REPLACE INTO session
                    (id, user_email, role, access_encrypted, access_nonce,
                     refresh_encrypted, refresh_nonce, created_at, updated_at)
                 VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    session.user_email,
                    role_to_text(session.role),
                    access_encrypted,
                    access_nonce,
                    refresh_encrypted,
                    refresh_nonce,
                    now,
                    now,
                ],
            )
            .map_err(|e| StockLinkError::session(format!("Failed to save session: {}", e)))?;

        Ok(())
    }

    /// Load the persisted session, if one exists.
    pub fn load(&self) -> StockLinkResult<Option<StoredSession>> {
        let key = self.require_key()?.to_vec();

        let row = self
            .conn
            .query_row(
                "SELECT user_email, role, access_encrypted, access_nonce,
                        refresh_encrypted, refresh_nonce, updated_at
                 FROM session WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Vec<u8>>(2)?,
                        row.get::<_, Vec<u8>>(3)?,
                        row.get::<_, Option<Vec<u8>>>(4)?,
                        row.get::<_, Option<Vec<u8>>>(5)?,
                        row.get::<_, i64>(6)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| StockLinkError::session(format!("Failed to load session: {}", e)))?;

        let Some((email, role, access_enc, access_nonce, refresh_enc, refresh_nonce, updated_at)) =
            row
        else {
            return Ok(None);
        };

        let access_token = decrypt(&access_enc, &access_nonce, &key)?;
        let refresh_token = match (refresh_enc, refresh_nonce) {
            (Some(enc), Some(nonce)) => Some(decrypt(&enc, &nonce, &key)?),
            _ => None,
        };

        Ok(Some(StoredSession {
            user_email: email,
            role: role_from_text(&role)?,
            access_token,
            refresh_token,
            updated_at,
        }))
    }

    /// Drop the persisted session (sign-out).
    pub fn clear(&mut self) -> StockLinkResult<()> {
        log::info!("Clearing stored session");
        self.conn
            .execute("DELETE FROM session WHERE id = 1", [])
            .map_err(|e| StockLinkError::session(format!("Failed to clear session: {}", e)))?;
        Ok(())
    }

    fn require_key(&self) -> StockLinkResult<&[u8]> {
        self.master_key
            .as_deref()
            .ok_or_else(|| StockLinkError::session("Session store is locked"))
    }

    fn load_meta(&self) -> StockLinkResult<Option<(Vec<u8>, Vec<u8>)>> {
        self.conn
            .query_row(
                "SELECT salt, verifier FROM session_meta WHERE id = 1",
                [],
                |row| {
                    let salt: Vec<u8> = row.get(0)?;
                    let verifier: Vec<u8> = row.get(1)?;
                    Ok((salt, verifier))
                },
            )
            .optional()
            .map_err(|e| StockLinkError::session(format!("Failed to load metadata: {}", e)))
    }

    fn store_meta(&self, salt: &[u8], verifier: &[u8]) -> StockLinkResult<()> {
        self.conn
            .execute(
                "INSERT INTO session_meta (id, salt, verifier, created_at)
                 VALUES (1, ?1, ?2, ?3)",
                params![salt, verifier, current_timestamp()],
            )
            .map_err(|e| StockLinkError::session(format!("Failed to store metadata: {}", e)))?;
        Ok(())
    }
}

fn encrypt(plaintext: &str, key: &[u8]) -> StockLinkResult<(Vec<u8>, Vec<u8>)> {
    let key_bytes: [u8; 32] = key
        .get(..32)
        .ok_or_else(|| StockLinkError::session("Key too short"))?
        .try_into()
        .map_err(|_| StockLinkError::session("Invalid key length"))?;

    let cipher = Aes256Gcm::new(&key_bytes.into());

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let encrypted = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|e| StockLinkError::session(format!("Encryption failed: {}", e)))?;

    Ok((encrypted, nonce_bytes.to_vec()))
}

fn decrypt(encrypted: &[u8], nonce_bytes: &[u8], key: &[u8]) -> StockLinkResult<String> {
    let key_bytes: [u8; 32] = key
        .get(..32)
        .ok_or_else(|| StockLinkError::session("Key too short"))?
        .try_into()
        .map_err(|_| StockLinkError::session("Invalid key length"))?;

    if nonce_bytes.len() != NONCE_LEN {
        return Err(StockLinkError::session("Invalid nonce length"));
    }

    let cipher = Aes256Gcm::new(&key_bytes.into());
    let nonce = Nonce::from_slice(nonce_bytes);

    let decrypted = cipher
        .decrypt(nonce, encrypted)
        .map_err(|e| StockLinkError::session(format!("Decryption failed: {}", e)))?;

    String::from_utf8(decrypted).map_err(|e| StockLinkError::session(format!("Invalid UTF-8: {}", e)))
}

fn role_to_text(role: UserRole) -> &'static str {
    match role {
        UserRole::Admin => "admin",
        UserRole::Cashier => "cashier",
    }
}

fn role_from_text(text: &str) -> StockLinkResult<UserRole> {
    match text {
        "admin" => Ok(UserRole::Admin),
        "cashier" => Ok(UserRole::Cashier),
        other => Err(StockLinkError::session(format!("Unknown role: {}", other))),
    }
}

fn derive_key(secret: &str, salt: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(salt);
    let result = hasher.finalize();

    let mut key = [0u8; 32];
    key.copy_from_slice(&result);
    key
}

fn derive_verifier(key: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(key);
    hasher.update(VERIFY_LABEL);
    let result = hasher.finalize();

    let mut verifier = [0u8; 32];
    verifier.copy_from_slice(&result);
    verifier
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut diff = 0u8;
    for (left, right) in a.iter().zip(b.iter()) {
        diff |= left ^ right;
    }
    diff == 0
}

fn current_timestamp() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn session() -> StoredSession {
        StoredSession {
            user_email: "cashier@shop.example".to_string(),
            role: UserRole::Cashier,
            access_token: "access-token-abc".to_string(),
            refresh_token: Some("refresh-token-xyz".to_string()),
            updated_at: 0,
        }
    }

    #[test]
    fn test_lock_state() {
        let dir = tempdir().unwrap();
        let mut store = SessionStore::new(dir.path().join("session.db")).unwrap();

        assert!(!store.is_unlocked());
        store.unlock("terminal-secret").unwrap();
        assert!(store.is_unlocked());
        store.lock();
        assert!(!store.is_unlocked());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempdir().unwrap();
        let mut store = SessionStore::new(dir.path().join("session.db")).unwrap();
        store.unlock("terminal-secret").unwrap();

        store.save(&session()).unwrap();
        let loaded = store.load().unwrap().unwrap();

        assert_eq!(loaded.user_email, "cashier@shop.example");
        assert_eq!(loaded.role, UserRole::Cashier);
        assert_eq!(loaded.access_token, "access-token-abc");
        assert_eq!(loaded.refresh_token.as_deref(), Some("refresh-token-xyz"));
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.db");

        let mut store = SessionStore::new(&path).unwrap();
        store.unlock("right-secret").unwrap();
        store.save(&session()).unwrap();
        drop(store);

        let mut reopened = SessionStore::new(&path).unwrap();
        assert!(reopened.unlock("wrong-secret").is_err());
        assert!(!reopened.is_unlocked());
    }

    #[test]
    fn test_locked_store_refuses_access() {
        let dir = tempdir().unwrap();
        let mut store = SessionStore::new(dir.path().join("session.db")).unwrap();

        assert!(store.save(&session()).is_err());
        assert!(store.load().is_err());
    }

    #[test]
    fn test_clear_removes_session() {
        let dir = tempdir().unwrap();
        let mut store = SessionStore::new(dir.path().join("session.db")).unwrap();
        store.unlock("terminal-secret").unwrap();

        store.save(&session()).unwrap();
        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }
}
