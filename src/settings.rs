use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppSettings {
    /// Base URL of the review backend (REST API).
    #[serde(default = "default_server_url")]
    pub server_url: String,
    /// Explicit WebSocket URL for the chat endpoint. When unset it is derived
    /// from `server_url` (http -> ws) plus the chat endpoint path.
    #[serde(default)]
    pub chat_ws_url: Option<String>,
    /// Seconds to wait for the chat transport to connect before giving up.
    #[serde(default = "default_chat_connect_timeout_secs")]
    pub chat_connect_timeout_secs: u64,
    /// Directory where downloaded report PDFs and log files are written.
    #[serde(default = "default_reports_dir")]
    pub reports_dir: String,
    /// Email prefilled on the login screen.
    #[serde(default)]
    pub remember_email: Option<String>,
}

fn default_server_url() -> String {
    "http://localhost:8080".to_string()
}
fn default_chat_connect_timeout_secs() -> u64 {
    10
}
fn default_reports_dir() -> String {
    let documents_dir = dirs::document_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ResumeDesk");
    documents_dir.join("Reports").to_string_lossy().to_string()
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            chat_ws_url: None,
            chat_connect_timeout_secs: default_chat_connect_timeout_secs(),
            reports_dir: default_reports_dir(),
            remember_email: None,
        }
    }
}

impl AppSettings {
    /// Resolve the WebSocket URL for the chat endpoint.
    ///
    /// The backend exposes a SockJS endpoint at `/ws-chat`; a native client
    /// uses its raw-WebSocket child path directly.
    pub fn chat_ws_url(&self) -> String {
        if let Some(url) = &self.chat_ws_url {
            return url.clone();
        }
        let base = self
            .server_url
            .trim_end_matches('/')
            .replacen("https://", "wss://", 1)
            .replacen("http://", "ws://", 1);
        format!("{}/ws-chat/websocket", base)
    }

    pub fn chat_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.chat_connect_timeout_secs.max(1))
    }
}

fn get_settings_path() -> Result<PathBuf, String> {
    let app_dir = dirs::config_dir()
        .ok_or_else(|| "Failed to resolve the platform config dir".to_string())?
        .join("ResumeDesk");

    std::fs::create_dir_all(&app_dir)
        .map_err(|e| format!("Failed to create app config dir: {}", e))?;

    Ok(app_dir.join("settings.json"))
}

pub fn load_settings() -> Result<AppSettings, String> {
    let settings_path = get_settings_path()?;

    if settings_path.exists() {
        let content = std::fs::read_to_string(&settings_path)
            .map_err(|e| format!("Failed to read settings: {}", e))?;

        serde_json::from_str(&content).map_err(|e| format!("Failed to parse settings: {}", e))
    } else {
        // First run: create default settings and directories
        let settings = AppSettings::default();
        initialize_directories(&settings)?;
        save_settings(&settings)?;
        Ok(settings)
    }
}

fn initialize_directories(settings: &AppSettings) -> Result<(), String> {
    let reports_path = PathBuf::from(&settings.reports_dir);
    std::fs::create_dir_all(&reports_path)
        .map_err(|e| format!("Failed to create reports directory: {}", e))
}

pub fn save_settings(settings: &AppSettings) -> Result<(), String> {
    let settings_path = get_settings_path()?;

    // Ensure directories exist when saving
    initialize_directories(settings)?;

    let content = serde_json::to_string_pretty(settings)
        .map_err(|e| format!("Failed to serialize settings: {}", e))?;

    std::fs::write(&settings_path, content).map_err(|e| format!("Failed to write settings: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_ws_url_derived_from_server_url() {
        let settings = AppSettings {
            server_url: "http://localhost:8080".to_string(),
            ..Default::default()
        };
        assert_eq!(
            settings.chat_ws_url(),
            "ws://localhost:8080/ws-chat/websocket"
        );
    }

    #[test]
    fn test_chat_ws_url_https_becomes_wss() {
        let settings = AppSettings {
            server_url: "https://review.example.com/".to_string(),
            ..Default::default()
        };
        assert_eq!(
            settings.chat_ws_url(),
            "wss://review.example.com/ws-chat/websocket"
        );
    }

    #[test]
    fn test_chat_ws_url_override_wins() {
        let settings = AppSettings {
            chat_ws_url: Some("ws://10.0.0.5:9090/ws-chat/websocket".to_string()),
            ..Default::default()
        };
        assert_eq!(
            settings.chat_ws_url(),
            "ws://10.0.0.5:9090/ws-chat/websocket"
        );
    }

    #[test]
    fn test_settings_parse_with_missing_fields() {
        // Old settings files must keep loading as fields are added
        let settings: AppSettings = serde_json::from_str(r#"{"server_url":"http://x:1"}"#).unwrap();
        assert_eq!(settings.server_url, "http://x:1");
        assert_eq!(settings.chat_connect_timeout_secs, 10);
        assert!(settings.remember_email.is_none());
    }

    #[test]
    fn test_connect_timeout_floor() {
        let settings = AppSettings {
            chat_connect_timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(settings.chat_connect_timeout(), Duration::from_secs(1));
    }
}
