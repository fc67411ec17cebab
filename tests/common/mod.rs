use std::fs;
use std::path::PathBuf;

use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header};
use tempfile::TempDir;

use entra_sso::config::{ClientSecret, Config};

pub const TENANT_ID: &str = "contoso";
pub const CLIENT_ID: &str = "11111111-2222-3333-4444-555555555555";

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// Config for the test tenant whose authority points at `authority`
/// (normally a wiremock server URI).
#[allow(dead_code)]
pub fn test_config(authority: &str) -> Config {
    let mut config = Config::default();
    config.client.tenant_id = TENANT_ID.to_string();
    config.client.client_id = CLIENT_ID.to_string();
    config.client.authority = authority.to_string();
    config.client.client_secret = Some(ClientSecret::new("s3cr3t"));
    config.flow.open_browser = false;
    config
}

/// Path of the token endpoint for the test tenant.
#[allow(dead_code)]
pub fn token_path() -> String {
    format!("/{}/oauth2/v2.0/token", TENANT_ID)
}

/// Claims an Entra ID v1 access token for the test app would carry.
#[allow(dead_code)]
pub fn valid_claims() -> serde_json::Value {
    serde_json::json!({
        "iss": format!("https://sts.windows.net/{}/", TENANT_ID),
        "aud": format!("api://{}", CLIENT_ID),
        "sub": "subject-1",
        "name": "Alex Example",
        "upn": "alex@contoso.com",
        "scp": "access_as_user",
        "exp": Utc::now().timestamp() + 3600,
    })
}

/// Encodes `claims` as an HS256 JWT. The signature is irrelevant to the
/// claims-only validator.
#[allow(dead_code)]
pub fn mint_jwt(claims: &serde_json::Value) -> String {
    jsonwebtoken::encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(b"test-signing-key"),
    )
    .expect("failed to encode test token")
}
