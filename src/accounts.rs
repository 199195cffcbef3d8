//! Local user accounts and HMAC-signed session tokens.
//!
//! Kept apart from the job orchestrator: nothing here is needed to submit or
//! poll a job. The CLI only consults it when `require_login` is set.

use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine,
};
use chrono::Local;
use hmac::{Hmac, Mac};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::fs;
use tokio::sync::Mutex;

use crate::error::{JobError, JobResult};
use crate::history::replace_file;

type HmacSha256 = Hmac<Sha256>;

const MIN_PASSWORD_LEN: usize = 6;

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn password_digest(salt: &[u8], password: &str) -> Vec<u8> {
    let mut data = salt.to_vec();
    data.extend_from_slice(password.as_bytes());
    Sha256::digest(&data).to_vec()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: String,
    salt: String,
    password_hash: String,
    pub created_at: String,
}

impl UserRecord {
    fn new(username: &str, password: &str) -> Self {
        let salt: [u8; 16] = rand::thread_rng().r#gen();
        Self {
            username: username.to_string(),
            salt: STANDARD.encode(salt),
            password_hash: STANDARD.encode(password_digest(&salt, password)),
            created_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }

    fn check(&self, password: &str) -> bool {
        let (Ok(salt), Ok(expected)) = (STANDARD.decode(&self.salt), STANDARD.decode(&self.password_hash))
        else {
            return false;
        };
        constant_time_eq(&password_digest(&salt, password), &expected)
    }
}

/// JSON file of registered users.
#[derive(Debug)]
pub struct UserStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl UserStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> JobResult<Vec<UserRecord>> {
        match fs::read_to_string(&self.path).await {
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| JobError::config(format!("users file {} is corrupt: {}", self.path.display(), e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn register(&self, username: &str, password: &str) -> JobResult<()> {
        let username = username.trim();
        if username.is_empty() {
            return Err(JobError::invalid("username is empty"));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(JobError::invalid(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        let _guard = self.write_lock.lock().await;
        let mut users = self.load().await?;
        if users.iter().any(|u| u.username.eq_ignore_ascii_case(username)) {
            return Err(JobError::invalid(format!("user {} already exists", username)));
        }
        users.push(UserRecord::new(username, password));

        let bytes = serde_json::to_vec_pretty(&users)
            .map_err(|e| JobError::Io(std::io::Error::other(e)))?;
        replace_file(&self.path, bytes).await
    }

    pub async fn verify_password(&self, username: &str, password: &str) -> JobResult<bool> {
        let users = self.load().await?;
        Ok(users
            .iter()
            .find(|u| u.username.eq_ignore_ascii_case(username.trim()))
            .map(|u| u.check(password))
            .unwrap_or(false))
    }
}

/// Signed, expiring proof of login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionToken {
    /// Username.
    pub sub: String,
    /// Expiry timestamp (Unix seconds).
    pub exp: u64,
}

impl SessionToken {
    pub fn new(username: &str, ttl: Duration) -> Self {
        Self {
            sub: username.to_string(),
            exp: now_secs() + ttl.as_secs(),
        }
    }

    pub fn is_expired(&self) -> bool {
        now_secs() >= self.exp
    }

    fn mac(secret: &str) -> JobResult<HmacSha256> {
        HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| JobError::config(format!("invalid session secret: {}", e)))
    }

    /// `base64url(json).base64url(hmac)`.
    pub fn sign(&self, secret: &str) -> JobResult<String> {
        let json = serde_json::to_vec(self).map_err(|e| JobError::Io(std::io::Error::other(e)))?;
        let payload = URL_SAFE_NO_PAD.encode(json);
        let mut mac = Self::mac(secret)?;
        mac.update(payload.as_bytes());
        let signature = mac.finalize().into_bytes();
        Ok(format!("{}.{}", payload, URL_SAFE_NO_PAD.encode(signature)))
    }

    /// Returns the token if the signature matches and it has not expired.
    pub fn verify(token: &str, secret: &str) -> JobResult<Option<Self>> {
        let Some((payload, signature)) = token.trim().split_once('.') else {
            return Ok(None);
        };
        let Ok(signature) = URL_SAFE_NO_PAD.decode(signature) else {
            return Ok(None);
        };

        let mut mac = Self::mac(secret)?;
        mac.update(payload.as_bytes());
        if mac.verify_slice(&signature).is_err() {
            return Ok(None);
        }

        let session = URL_SAFE_NO_PAD
            .decode(payload)
            .ok()
            .and_then(|bytes| serde_json::from_slice::<SessionToken>(&bytes).ok());
        Ok(session.filter(|s| !s.is_expired()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn test_token_round_trip() {
        let token = SessionToken::new("alice", Duration::from_secs(3600));
        let signed = token.sign(SECRET).unwrap();
        let verified = SessionToken::verify(&signed, SECRET).unwrap();
        assert_eq!(verified, Some(token));
    }

    #[test]
    fn test_token_rejects_wrong_secret_and_tampering() {
        let signed = SessionToken::new("alice", Duration::from_secs(3600)).sign(SECRET).unwrap();
        assert_eq!(SessionToken::verify(&signed, "other").unwrap(), None);

        let (_, sig) = signed.split_once('.').unwrap();
        let forged_payload = URL_SAFE_NO_PAD.encode(br#"{"sub":"mallory","exp":99999999999}"#);
        let forged = format!("{}.{}", forged_payload, sig);
        assert_eq!(SessionToken::verify(&forged, SECRET).unwrap(), None);
        assert_eq!(SessionToken::verify("garbage", SECRET).unwrap(), None);
    }

    #[test]
    fn test_expired_token_rejected() {
        let token = SessionToken {
            sub: "alice".into(),
            exp: now_secs().saturating_sub(1),
        };
        let signed = token.sign(SECRET).unwrap();
        assert_eq!(SessionToken::verify(&signed, SECRET).unwrap(), None);
    }

    #[tokio::test]
    async fn test_register_and_verify() {
        let dir = tempfile::tempdir().unwrap();
        let store = UserStore::new(dir.path().join("users.json"));

        store.register("alice", "hunter22").await.unwrap();
        assert!(store.verify_password("alice", "hunter22").await.unwrap());
        assert!(store.verify_password("ALICE", "hunter22").await.unwrap());
        assert!(!store.verify_password("alice", "wrong-pass").await.unwrap());
        assert!(!store.verify_password("bob", "hunter22").await.unwrap());
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates_and_short_passwords() {
        let dir = tempfile::tempdir().unwrap();
        let store = UserStore::new(dir.path().join("users.json"));

        store.register("alice", "hunter22").await.unwrap();
        assert!(matches!(
            store.register("Alice", "another1").await,
            Err(JobError::InvalidRequest(_))
        ));
        assert!(store.register("bob", "123").await.is_err());
        assert!(store.register("  ", "hunter22").await.is_err());
    }

    #[tokio::test]
    async fn test_users_file_replaced_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts/users.json");
        let store = UserStore::new(&path);

        store.register("alice", "hunter22").await.unwrap();
        store.register("bob", "hunter33").await.unwrap();

        let names: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("users.json")]);
        assert_eq!(store.load().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_salts_differ_per_user() {
        let dir = tempfile::tempdir().unwrap();
        let store = UserStore::new(dir.path().join("users.json"));
        store.register("a", "same-password").await.unwrap();
        store.register("b", "same-password").await.unwrap();

        let users = store.load().await.unwrap();
        assert_ne!(users[0].password_hash, users[1].password_hash);
    }
}
