use std::path::Path;

use gateway_client::BasicAuth;

use crate::error::{ConnectorError, Result};

pub const DEFAULT_SECRET_MOUNT_PATH: &str = "/var/secrets";
const USER_FILE: &str = "basic-auth-user";
const PASSWORD_FILE: &str = "basic-auth-password";

/// Gateway credentials, read from mounted secrets when `BASIC_AUTH` is `true` or `1`.
pub fn credentials_from_env() -> Result<Option<BasicAuth>> {
    let enabled = std::env::var("BASIC_AUTH")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false);
    if !enabled {
        return Ok(None);
    }

    let mount_path = std::env::var("SECRET_MOUNT_PATH")
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_SECRET_MOUNT_PATH.to_string());

    read_basic_auth(Path::new(&mount_path)).map(Some)
}

/// Read `basic-auth-user` and `basic-auth-password` from `mount_path`.
pub fn read_basic_auth(mount_path: &Path) -> Result<BasicAuth> {
    let username = read_secret(&mount_path.join(USER_FILE))?;
    let password = read_secret(&mount_path.join(PASSWORD_FILE))?;
    Ok(BasicAuth::new(username, password))
}

fn read_secret(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .map_err(|source| ConnectorError::Credentials {
            path: path.display().to_string(),
            source,
        })
}
