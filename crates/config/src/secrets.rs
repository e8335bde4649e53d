// Drive access token storage
//
// The token is looked up in:
// 1. System keychain (preferred)
// 2. Environment variable KPIBOARD_DRIVE_TOKEN (fallback for CI/headless)
//
// It is NEVER stored in kpiboard.toml

use std::env;

/// Service name for keychain storage
const KEYCHAIN_SERVICE: &str = "kpiboard";

/// Keychain account holding the Drive token
const KEYCHAIN_ACCOUNT: &str = "drive/token";

pub const TOKEN_ENV_VAR: &str = "KPIBOARD_DRIVE_TOKEN";

/// Where a token came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Keychain,
    Environment,
    None,
}

impl TokenSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenSource::Keychain => "keychain",
            TokenSource::Environment => "environment",
            TokenSource::None => "none",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TokenLookup {
    pub token: Option<String>,
    pub source: TokenSource,
}

fn pick(keychain: Option<String>, environment: Option<String>) -> TokenLookup {
    let non_empty = |s: Option<String>| s.filter(|t| !t.trim().is_empty());
    if let Some(token) = non_empty(keychain) {
        return TokenLookup { token: Some(token), source: TokenSource::Keychain };
    }
    if let Some(token) = non_empty(environment) {
        return TokenLookup { token: Some(token), source: TokenSource::Environment };
    }
    TokenLookup { token: None, source: TokenSource::None }
}

#[cfg(feature = "keychain")]
fn keychain_token() -> Option<String> {
    keyring::Entry::new(KEYCHAIN_SERVICE, KEYCHAIN_ACCOUNT)
        .ok()?
        .get_password()
        .ok()
}

#[cfg(not(feature = "keychain"))]
fn keychain_token() -> Option<String> {
    None
}

/// Get the Drive access token: keychain first, then environment.
pub fn get_drive_token() -> TokenLookup {
    pick(keychain_token(), env::var(TOKEN_ENV_VAR).ok())
}

/// Store the Drive token in the system keychain
#[cfg(feature = "keychain")]
pub fn set_drive_token(token: &str) -> Result<(), String> {
    let entry = keyring::Entry::new(KEYCHAIN_SERVICE, KEYCHAIN_ACCOUNT)
        .map_err(|e| format!("Failed to create keychain entry: {}", e))?;

    entry
        .set_password(token)
        .map_err(|e| format!("Failed to store token in keychain: {}", e))
}

#[cfg(not(feature = "keychain"))]
pub fn set_drive_token(_token: &str) -> Result<(), String> {
    Err(format!("Keychain support not enabled. Set {TOKEN_ENV_VAR} instead."))
}

/// Delete the Drive token from the system keychain
#[cfg(feature = "keychain")]
pub fn delete_drive_token() -> Result<(), String> {
    let entry = keyring::Entry::new(KEYCHAIN_SERVICE, KEYCHAIN_ACCOUNT)
        .map_err(|e| format!("Failed to access keychain entry: {}", e))?;

    entry
        .delete_credential()
        .map_err(|e| format!("Failed to delete token from keychain: {}", e))
}

#[cfg(not(feature = "keychain"))]
pub fn delete_drive_token() -> Result<(), String> {
    Err("Keychain support not enabled.".to_string())
}

pub fn keychain_available() -> bool {
    #[cfg(feature = "keychain")]
    {
        keyring::Entry::new(KEYCHAIN_SERVICE, "test").is_ok()
    }
    #[cfg(not(feature = "keychain"))]
    {
        false
    }
}
