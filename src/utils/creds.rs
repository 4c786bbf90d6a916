// src/utils/creds.rs

//! Credential file loading.
//!
//! The API key and session cookie can be given inline, via a configured
//! file, or via the default dotfiles under the home directory. A missing or
//! unreadable file disables the corresponding header rather than failing.

use std::path::PathBuf;

use crate::models::CredentialsConfig;
use crate::services::Credentials;

/// Default key file under the home directory.
const DEFAULT_KEY_FILE: &str = ".ft_api_key";

/// Default cookie file under the home directory.
const DEFAULT_COOKIE_FILE: &str = ".ft_cookie";

/// Resolve credentials from config, falling back to the default dotfiles.
pub fn resolve(config: &CredentialsConfig) -> Credentials {
    Credentials {
        key: config
            .key
            .clone()
            .or_else(|| read_secret(config.key_file.clone().or_else(|| home_file(DEFAULT_KEY_FILE)))),
        cookie: config.cookie.clone().or_else(|| {
            read_secret(
                config
                    .cookie_file
                    .clone()
                    .or_else(|| home_file(DEFAULT_COOKIE_FILE)),
            )
        }),
    }
}

fn home_file(name: &str) -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(name))
}

/// Read and trim a secret file. `None` when the file is missing, unreadable,
/// or blank.
fn read_secret(path: Option<PathBuf>) -> Option<String> {
    let path = path?;
    match std::fs::read_to_string(&path) {
        Ok(content) => {
            let trimmed = content.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Err(e) => {
            log::debug!("No credential at {}: {e}", path.display());
            None
        }
    }
}
