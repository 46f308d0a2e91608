//! Provides an abstracted interface to the shared Redis session store.
//! Sessions are written by the auth service; this service only resolves
//! them.
use async_trait::async_trait;
use redis::{aio::MultiplexedConnection, AsyncCommands as _};
use sha2::{Digest as _, Sha256};
use uuid::Uuid;

use super::{errors::SessionStorageError, SessionStore};
use crate::constants::redis as constants;

#[derive(Clone)]
/// A connection to the session store. Guaranteed to be safe to clone and share
/// between threads.
pub struct Connection(MultiplexedConnection);

/// Prefix under which the auth service keeps fully authenticated sessions.
const AUTHENTICATED_PARENT_KEY: &str = "sessions:authenticated";
/// Hex digits of the token hash shown in logs.
const FINGERPRINT_LEN: usize = 12;

/// Short tag identifying a session token in logs without revealing it.
fn token_fingerprint(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let hash = hasher.finalize();
    format!("{hash:x}").chars().take(FINGERPRINT_LEN).collect()
}

/// Parse the `user_id` field stored for the session `token`.
fn parse_user_id(token: &str, stored: Option<String>) -> Option<Uuid> {
    stored.and_then(|id| {
        id.parse()
            .inspect_err(|err| {
                tracing::warn!(
                    "Session {} holds a malformed user ID: {err}",
                    token_fingerprint(token)
                );
            })
            .ok()
    })
}

impl Connection {
    /// Initiate a new (multiplexed) connection to the session store.
    /// This connection can be cloned and is safe share between threads.
    pub async fn connect() -> Result<Self, SessionStorageError> {
        Ok(Self(
            redis::Client::open(constants::REDIS_URL.clone())?
                .get_multiplexed_async_connection()
                .await?,
        ))
    }
}

#[async_trait]
impl SessionStore for Connection {
    async fn user_id(&self, token: &str) -> Result<Option<Uuid>, SessionStorageError> {
        let key = format!("{AUTHENTICATED_PARENT_KEY}:{token}");
        let user_id: Option<String> = self.0.clone().hget(key, "user_id").await?;
        Ok(parse_user_id(token, user_id))
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        sync::{Arc, Mutex},
    };

    use uuid::Uuid;

    use super::{parse_user_id, token_fingerprint};

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().expect("log buffer").extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn parses_stored_user_id() {
        let user_id = Uuid::new_v4();
        assert_eq!(parse_user_id("token", Some(user_id.to_string())), Some(user_id));
        assert_eq!(parse_user_id("token", None), None);
    }

    #[test]
    fn malformed_user_id_is_logged_without_the_token() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .finish();
        let token = "c2Vzc2lvbi10b2tlbi1mb3ItYWNoaWVuZw";

        let user_id = tracing::subscriber::with_default(subscriber, || {
            parse_user_id(token, Some(String::from("not-a-uuid")))
        });

        assert_eq!(user_id, None);
        let output = String::from_utf8(logs.0.lock().expect("log buffer").clone())
            .expect("UTF-8 log output");
        assert!(output.contains(&token_fingerprint(token)));
        assert!(!output.contains(token));
    }
}
