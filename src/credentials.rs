//! Secure credential storage using the system keyring.
//!
//! Uses the native OS credential store:
//! - macOS: Keychain
//! - Windows: Credential Manager
//! - Linux: Secret Service (GNOME Keyring, KWallet)
//!
//! ResumeDesk keeps exactly one kind of secret here: the opt-in
//! "remember my password" entry for an account email.

use keyring::Entry;

const SERVICE_NAME: &str = "com.resumedesk.accounts";

/// Builds a unique account name for a stored credential.
fn account_name(email: &str, field: &str) -> String {
    format!("{}:{}", email, field)
}

/// Store a credential in the system keyring.
pub fn store_credential(email: &str, field: &str, value: &str) -> Result<(), String> {
    let account = account_name(email, field);
    let entry = Entry::new(SERVICE_NAME, &account)
        .map_err(|e| format!("Failed to create keyring entry: {e}"))?;
    entry
        .set_password(value)
        .map_err(|e| format!("Failed to store credential: {e}"))
}

/// Retrieve a credential from the system keyring.
/// Returns Ok(None) if no credential is stored.
pub fn get_credential(email: &str, field: &str) -> Result<Option<String>, String> {
    let account = account_name(email, field);
    let entry = Entry::new(SERVICE_NAME, &account)
        .map_err(|e| format!("Failed to create keyring entry: {e}"))?;
    match entry.get_password() {
        Ok(pw) => Ok(Some(pw)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(e) => Err(format!("Failed to retrieve credential: {e}")),
    }
}

/// Delete a credential from the system keyring.
/// Returns Ok(()) even if no credential was stored.
pub fn delete_credential(email: &str, field: &str) -> Result<(), String> {
    let account = account_name(email, field);
    let entry = Entry::new(SERVICE_NAME, &account)
        .map_err(|e| format!("Failed to create keyring entry: {e}"))?;
    match entry.delete_credential() {
        Ok(()) => Ok(()),
        Err(keyring::Error::NoEntry) => Ok(()), // Already gone, that's fine
        Err(e) => Err(format!("Failed to delete credential: {e}")),
    }
}

/// Delete every credential stored for an account.
/// Called on account withdrawal so no secret outlives the account.
pub fn delete_all_credentials(email: &str) -> Result<(), String> {
    let fields = ["password"];
    for field in fields {
        delete_credential(email, field)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_name() {
        assert_eq!(
            account_name("user@example.com", "password"),
            "user@example.com:password"
        );
    }
}
