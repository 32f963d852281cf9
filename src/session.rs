// src/session.rs
//
// Session manager. Holds the authenticated user, seeds it from the durable
// store at startup, and orchestrates every transition to unauthenticated so
// that chat teardown always runs before any other effect of the transition.
// The chat subsystem is inert whenever no session is established.

use crate::{api, chat, credentials, events, store_manager};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

/// Durable store keys: a flat logged-in flag plus the serialized session.
pub const STORE_KEY_LOGGED_IN: &str = "auth.loggedIn";
pub const STORE_KEY_SESSION: &str = "auth.session";

/// The authenticated user, as returned by the login endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub email: String,
    pub nickname: String,
}

static AUTH: Lazy<RwLock<Option<AuthSession>>> = Lazy::new(|| RwLock::new(None));

pub fn is_authenticated() -> bool {
    AUTH.read().map(|s| s.is_some()).unwrap_or(false)
}

pub fn current() -> Option<AuthSession> {
    AUTH.read().ok().and_then(|s| s.clone())
}

/// Seed auth state from the durable store, once, at startup.
/// Absence or parse failure defaults to unauthenticated and clears the keys.
/// Restoring never opens a chat channel - channels are selection-driven only.
pub fn restore_from_store() {
    let flag = store_manager::get(STORE_KEY_LOGGED_IN).and_then(|v| v.as_str().map(String::from));
    if flag.as_deref() != Some("true") {
        clear_durable_state();
        return;
    }

    let parsed = store_manager::get(STORE_KEY_SESSION)
        .and_then(|v| v.as_str().map(String::from))
        .and_then(|raw| serde_json::from_str::<AuthSession>(&raw).ok());

    match parsed {
        Some(session) => {
            tlog!("[session] Restored session for {}", session.email);
            if let Ok(mut guard) = AUTH.write() {
                *guard = Some(session);
            }
        }
        None => {
            tlog!("[session] Stored session invalid - starting unauthenticated");
            clear_durable_state();
        }
    }
}

/// Install an authenticated session and persist it.
pub fn establish(session: AuthSession) {
    if let Ok(raw) = serde_json::to_string(&session) {
        let _ = store_manager::set(STORE_KEY_SESSION, serde_json::Value::String(raw));
        let _ = store_manager::set(
            STORE_KEY_LOGGED_IN,
            serde_json::Value::String("true".to_string()),
        );
    }
    if let Ok(mut guard) = AUTH.write() {
        *guard = Some(session);
    }
    events::emit_auth_changed(true);
}

fn clear_durable_state() {
    let _ = store_manager::delete(STORE_KEY_LOGGED_IN);
    let _ = store_manager::delete(STORE_KEY_SESSION);
}

/// Transition to unauthenticated. Chat teardown runs first - a channel must
/// never outlive the session that authorised it.
async fn drop_authenticated_state() {
    chat::controller::clear_selection().await;
    if let Ok(mut guard) = AUTH.write() {
        *guard = None;
    }
    clear_durable_state();
    events::emit_auth_changed(false);
}

// ============================================================================
// Auth Commands
// ============================================================================

pub async fn login(email: &str, password: &str) -> Result<AuthSession, String> {
    let response = api::login(email, password).await?;
    let session = AuthSession {
        email: response.email,
        nickname: response.nickname,
    };
    establish(session.clone());
    tlog!("[session] Logged in as {}", session.email);
    Ok(session)
}

pub async fn signup(email: &str, password: &str, nickname: &str) -> Result<(), String> {
    api::signup(email, password, nickname).await
}

pub async fn logout() -> Result<(), String> {
    drop_authenticated_state().await;
    // Server-side invalidation is best effort; local teardown already ran
    if let Err(e) = api::logout().await {
        tlog!("[session] Server logout failed: {}", e);
    }
    Ok(())
}

/// Delete the account, then drop the local session.
pub async fn withdraw() -> Result<(), String> {
    let session = current().ok_or_else(|| "Not logged in".to_string())?;
    api::withdraw(&session.email).await?;
    let _ = credentials::delete_all_credentials(&session.email);
    drop_authenticated_state().await;
    tlog!("[session] Account withdrawn: {}", session.email);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store_manager::tests::STORE_TEST_LOCK;
    use std::path::PathBuf;

    fn fresh_store(tag: &str) {
        let path: PathBuf = std::env::temp_dir().join(format!(
            "resumedesk-session-test-{}-{}.json",
            tag,
            uuid::Uuid::new_v4()
        ));
        store_manager::initialise_at(path).unwrap();
    }

    fn reset_auth() {
        *AUTH.write().unwrap() = None;
    }

    #[test]
    fn test_restore_with_empty_store_is_unauthenticated() {
        let _guard = STORE_TEST_LOCK.lock().unwrap();
        fresh_store("empty");
        reset_auth();

        restore_from_store();
        assert!(!is_authenticated());
    }

    #[test]
    fn test_restore_round_trip() {
        let _guard = STORE_TEST_LOCK.lock().unwrap();
        fresh_store("roundtrip");
        reset_auth();

        establish(AuthSession {
            email: "user@example.com".to_string(),
            nickname: "user".to_string(),
        });
        reset_auth();
        assert!(!is_authenticated());

        restore_from_store();
        assert_eq!(
            current(),
            Some(AuthSession {
                email: "user@example.com".to_string(),
                nickname: "user".to_string(),
            })
        );
    }

    #[test]
    fn test_restore_with_garbage_session_clears_keys() {
        let _guard = STORE_TEST_LOCK.lock().unwrap();
        fresh_store("garbage");
        reset_auth();

        store_manager::set(
            STORE_KEY_LOGGED_IN,
            serde_json::Value::String("true".to_string()),
        )
        .unwrap();
        store_manager::set(
            STORE_KEY_SESSION,
            serde_json::Value::String("{not valid json".to_string()),
        )
        .unwrap();

        restore_from_store();
        assert!(!is_authenticated());
        assert!(store_manager::get(STORE_KEY_LOGGED_IN).is_none());
        assert!(store_manager::get(STORE_KEY_SESSION).is_none());
    }

    #[test]
    fn test_restore_without_flag_ignores_session_object() {
        let _guard = STORE_TEST_LOCK.lock().unwrap();
        fresh_store("flagless");
        reset_auth();

        store_manager::set(
            STORE_KEY_SESSION,
            serde_json::Value::String(r#"{"email":"a@b.c","nickname":"a"}"#.to_string()),
        )
        .unwrap();

        restore_from_store();
        assert!(!is_authenticated());
    }

    #[tokio::test]
    async fn test_selecting_a_record_requires_authentication() {
        let _guard = STORE_TEST_LOCK.lock().unwrap();
        fresh_store("gating");
        reset_auth();

        chat::controller::init(chat::ChatConfig {
            ws_url: "ws://127.0.0.1:9/ws-chat/websocket".to_string(),
            connect_timeout: std::time::Duration::from_millis(500),
        })
        .await;

        assert!(chat::controller::select_record(Some(1)).await.is_err());
        assert_eq!(chat::controller::selected_record().await, None);

        establish(AuthSession {
            email: "user@example.com".to_string(),
            nickname: "user".to_string(),
        });
        assert!(chat::controller::select_record(Some(1)).await.is_ok());
        assert_eq!(chat::controller::selected_record().await, Some(1));

        // Two locally appended messages sit in the log when auth drops
        chat::controller::send_chat_message("first").await.unwrap();
        chat::controller::send_chat_message("second").await.unwrap();
        assert_eq!(chat::controller::chat_messages().await.len(), 2);

        // The unauthenticated transition forces full teardown
        drop_authenticated_state().await;
        assert_eq!(chat::controller::selected_record().await, None);
        assert!(chat::controller::chat_messages().await.is_empty());
    }
}
