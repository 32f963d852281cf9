// src/api.rs
//
// REST client for the review backend. Authentication is a server-side
// session bound to a cookie, so one client instance (and its cookie store)
// is shared by every call in the process.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct SignupRequest<'a> {
    email: &'a str,
    password: &'a str,
    nickname: &'a str,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub message: String,
    pub email: String,
    pub nickname: String,
}

/// One past review record from the history endpoint.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ReviewRecord {
    pub id: i64,
    #[serde(rename = "userEmail", default)]
    pub user_email: Option<String>,
    #[serde(rename = "userResume")]
    pub user_resume: String,
    #[serde(rename = "aiResponse")]
    pub ai_response: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

/// `{"content": ...}` envelope used by the analysis endpoints.
#[derive(Debug, Deserialize)]
struct ContentResponse {
    content: String,
}

// ============================================================================
// Client
// ============================================================================

#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, String> {
        let http = reqwest::Client::builder()
            .user_agent("ResumeDesk-App")
            // The backend session rides on a cookie
            .cookie_store(true)
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // ------------------------------------------------------------------
    // Auth
    // ------------------------------------------------------------------

    pub async fn signup(&self, email: &str, password: &str, nickname: &str) -> Result<(), String> {
        let response = self
            .http
            .post(self.endpoint("/api/auth/signup"))
            .json(&SignupRequest {
                email,
                password,
                nickname,
            })
            .send()
            .await
            .map_err(|e| format!("Signup request failed: {}", e))?;

        expect_success(response, "Signup").await.map(|_| ())
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, String> {
        let response = self
            .http
            .post(self.endpoint("/api/auth/login"))
            .json(&LoginRequest { email, password })
            .send()
            .await
            .map_err(|e| format!("Login request failed: {}", e))?;

        expect_success(response, "Login")
            .await?
            .json::<LoginResponse>()
            .await
            .map_err(|e| format!("Failed to parse login response: {}", e))
    }

    pub async fn logout(&self) -> Result<(), String> {
        let response = self
            .http
            .post(self.endpoint("/api/auth/logout"))
            .send()
            .await
            .map_err(|e| format!("Logout request failed: {}", e))?;

        expect_success(response, "Logout").await.map(|_| ())
    }

    pub async fn withdraw(&self, email: &str) -> Result<(), String> {
        let response = self
            .http
            .delete(self.endpoint("/api/auth/withdraw"))
            .query(&[("email", email)])
            .send()
            .await
            .map_err(|e| format!("Withdraw request failed: {}", e))?;

        expect_success(response, "Account withdrawal").await.map(|_| ())
    }

    // ------------------------------------------------------------------
    // Review
    // ------------------------------------------------------------------

    /// Submit resume text for analysis. Returns the formatted report.
    pub async fn resume_check(&self, resume: &str) -> Result<String, String> {
        let mut body = std::collections::HashMap::new();
        body.insert("resume", resume);

        let response = self
            .http
            .post(self.endpoint("/api/ai/resume-check"))
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("Analysis request failed: {}", e))?;

        expect_success(response, "Analysis")
            .await?
            .json::<ContentResponse>()
            .await
            .map(|r| r.content)
            .map_err(|e| format!("Failed to parse analysis response: {}", e))
    }

    /// Upload a PDF resume for analysis. Returns the formatted report.
    pub async fn upload_resume(&self, file_name: &str, bytes: Vec<u8>) -> Result<String, String> {
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str("application/pdf")
            .map_err(|e| format!("Failed to build upload: {}", e))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .http
            .post(self.endpoint("/api/ai/upload-resume"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| format!("Upload request failed: {}", e))?;

        // A 400 carries the rejection reason in the usual content envelope
        // (e.g. a PDF the server could not extract text from)
        if response.status() == reqwest::StatusCode::BAD_REQUEST {
            let reason = response
                .json::<ContentResponse>()
                .await
                .map(|r| r.content)
                .unwrap_or_else(|_| "The server rejected the file".to_string());
            return Err(reason);
        }

        expect_success(response, "Upload")
            .await?
            .json::<ContentResponse>()
            .await
            .map(|r| r.content)
            .map_err(|e| format!("Failed to parse upload response: {}", e))
    }

    /// Past review records, newest first.
    pub async fn history(&self) -> Result<Vec<ReviewRecord>, String> {
        let response = self
            .http
            .get(self.endpoint("/api/ai/history"))
            .send()
            .await
            .map_err(|e| format!("History request failed: {}", e))?;

        expect_success(response, "History")
            .await?
            .json::<Vec<ReviewRecord>>()
            .await
            .map_err(|e| format!("Failed to parse history: {}", e))
    }

    /// Download the formatted PDF report for one record.
    pub async fn download_pdf(&self, record_id: i64) -> Result<Vec<u8>, String> {
        let response = self
            .http
            .get(self.endpoint(&format!("/api/ai/download-pdf/{}", record_id)))
            .send()
            .await
            .map_err(|e| format!("Download request failed: {}", e))?;

        expect_success(response, "Download")
            .await?
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| format!("Failed to read PDF body: {}", e))
    }

    /// Mail a report's text to an address.
    pub async fn send_email(&self, email: &str, content: &str) -> Result<(), String> {
        let mut body = std::collections::HashMap::new();
        body.insert("email", email);
        body.insert("content", content);

        let response = self
            .http
            .post(self.endpoint("/api/ai/send-email"))
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("Email request failed: {}", e))?;

        expect_success(response, "Email").await.map(|_| ())
    }
}

/// Map a non-success status to a readable error, folding in the body text
/// the backend tends to put there.
async fn expect_success(
    response: reqwest::Response,
    action: &str,
) -> Result<reqwest::Response, String> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err("Not logged in (the server session may have expired)".to_string());
    }

    let detail = response.text().await.unwrap_or_default();
    if detail.is_empty() {
        Err(format!("{} failed with status {}", action, status))
    } else {
        Err(format!("{} failed with status {}: {}", action, status, detail))
    }
}

// ============================================================================
// Process-Wide Client
// ============================================================================

static API_CLIENT: Lazy<RwLock<Option<ApiClient>>> = Lazy::new(|| RwLock::new(None));

/// Initialise the shared client. Call once during app startup.
pub fn init(base_url: &str) -> Result<(), String> {
    let client = ApiClient::new(base_url)?;
    let mut guard = API_CLIENT
        .write()
        .map_err(|e| format!("Failed to acquire write lock: {}", e))?;
    *guard = Some(client);
    Ok(())
}

fn client() -> Result<ApiClient, String> {
    API_CLIENT
        .read()
        .map_err(|e| format!("Failed to acquire read lock: {}", e))?
        .clone()
        .ok_or_else(|| "API client is not initialised".to_string())
}

pub async fn signup(email: &str, password: &str, nickname: &str) -> Result<(), String> {
    client()?.signup(email, password, nickname).await
}

pub async fn login(email: &str, password: &str) -> Result<LoginResponse, String> {
    client()?.login(email, password).await
}

pub async fn logout() -> Result<(), String> {
    client()?.logout().await
}

pub async fn withdraw(email: &str) -> Result<(), String> {
    client()?.withdraw(email).await
}

pub async fn resume_check(resume: &str) -> Result<String, String> {
    client()?.resume_check(resume).await
}

pub async fn upload_resume(file_name: &str, bytes: Vec<u8>) -> Result<String, String> {
    client()?.upload_resume(file_name, bytes).await
}

pub async fn history() -> Result<Vec<ReviewRecord>, String> {
    client()?.history().await
}

pub async fn send_email(email: &str, content: &str) -> Result<(), String> {
    client()?.send_email(email, content).await
}

/// Download the PDF report for a record into the reports directory.
/// Returns the path of the written file.
pub async fn save_report_pdf(record_id: i64, reports_dir: &Path) -> Result<PathBuf, String> {
    let bytes = client()?.download_pdf(record_id).await?;

    std::fs::create_dir_all(reports_dir)
        .map_err(|e| format!("Failed to create reports dir: {}", e))?;

    let filename = format!(
        "report-{}-{}.pdf",
        record_id,
        chrono::Local::now().format("%Y%m%d-%H%M%S")
    );
    let path = reports_dir.join(filename);

    std::fs::write(&path, &bytes).map_err(|e| format!("Failed to write PDF: {}", e))?;
    tlog!("[api] Saved report for record {} to {}", record_id, path.display());

    Ok(path)
}

/// Render the backend's `createdAt` timestamp for display.
/// The backend serialises a zoneless local datetime; unparseable values are
/// shown as-is.
pub fn format_created_at(created_at: &str) -> String {
    chrono::NaiveDateTime::parse_from_str(created_at, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|_| created_at.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_review_record_deserialises_backend_shape() {
        let json = r#"{
            "id": 3,
            "userEmail": "user@example.com",
            "userResume": "Experienced engineer...",
            "aiResponse": "[Strengths]\n1. ...",
            "createdAt": "2025-03-01T09:30:00"
        }"#;
        let record: ReviewRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.id, 3);
        assert_eq!(record.user_email.as_deref(), Some("user@example.com"));
        assert!(record.ai_response.starts_with("[Strengths]"));
    }

    #[test]
    fn test_review_record_tolerates_missing_user_email() {
        let json = r#"{"id":1,"userResume":"r","aiResponse":"a","createdAt":"2025-01-01T00:00:00"}"#;
        let record: ReviewRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.user_email, None);
    }

    #[test]
    fn test_login_response_deserialises() {
        let json = r#"{"message":"ok","email":"a@b.c","nickname":"a"}"#;
        let response: LoginResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.email, "a@b.c");
        assert_eq!(response.nickname, "a");
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let client = ApiClient::new("http://localhost:8080/").unwrap();
        assert_eq!(
            client.endpoint("/api/ai/history"),
            "http://localhost:8080/api/ai/history"
        );
    }

    #[test]
    fn test_format_created_at() {
        assert_eq!(
            format_created_at("2025-03-01T09:30:00"),
            "2025-03-01 09:30"
        );
        assert_eq!(
            format_created_at("2025-03-01T09:30:00.123456"),
            "2025-03-01 09:30"
        );
        // Unparseable values pass through untouched
        assert_eq!(format_created_at("yesterday"), "yesterday");
    }
}
