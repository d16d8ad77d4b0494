use std::{collections::HashMap, path::Path};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct CredentialFile {
    users: HashMap<String, String>,
}

/// Loads the username/secret table the server authenticates against.
///
/// The file is TOML with a single `[users]` table:
///
/// ```toml
/// [users]
/// alice = "12345"
/// bob = "23456"
/// ```
pub fn load_credentials(path: &Path) -> Result<HashMap<String, String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read credential file {}", path.display()))?;
    let parsed: CredentialFile = toml::from_str(&raw)
        .with_context(|| format!("failed to parse credential file {}", path.display()))?;

    for (username, secret) in &parsed.users {
        // Usernames and secrets travel as single space-separated protocol tokens.
        if username.is_empty() || username.chars().any(char::is_whitespace) {
            bail!("invalid username {username:?} in {}", path.display());
        }
        if secret.is_empty() || secret.chars().any(char::is_whitespace) {
            bail!("invalid secret for user {username:?} in {}", path.display());
        }
    }

    Ok(parsed.users)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_users(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("users.toml");
        std::fs::write(&path, contents).expect("write users file");
        (dir, path)
    }

    #[test]
    fn parses_users_table() {
        let (_dir, path) = write_users(
            r#"
[users]
alice = "12345"
bob = "23456"
"#,
        );

        let users = load_credentials(&path).expect("load credentials");
        assert_eq!(users.len(), 2);
        assert_eq!(users.get("alice").map(String::as_str), Some("12345"));
    }

    #[test]
    fn rejects_whitespace_in_tokens() {
        let (_dir, path) = write_users("[users]\n\"al ice\" = \"12345\"\n");
        assert!(load_credentials(&path).is_err());

        let (_dir, path) = write_users("[users]\nalice = \"one two\"\n");
        assert!(load_credentials(&path).is_err());
    }

    #[test]
    fn missing_file_reports_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nope.toml");
        let err = load_credentials(&path).unwrap_err();
        assert!(err.to_string().contains("nope.toml"));
    }
}
