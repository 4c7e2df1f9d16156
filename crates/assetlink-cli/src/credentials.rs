// Credential storage - persists the bearer token under the `authToken` key

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ClientError;

/// Storage key (file name) of the bearer token.
pub const TOKEN_KEY: &str = "authToken";

/// Environment variable that overrides the stored token.
pub const TOKEN_ENV: &str = "ASSETLINK_TOKEN";

/// File-backed token storage rooted at a directory (default `~/.assetlink/`).
#[derive(Debug, Clone)]
pub struct TokenStore {
    dir: PathBuf,
}

impl TokenStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store in `~/.assetlink/`.
    pub fn default_location() -> Result<Self, ClientError> {
        let home = dirs::home_dir().ok_or_else(|| {
            ClientError::Storage(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "home directory not found",
            ))
        })?;
        Ok(Self::new(home.join(".assetlink")))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn token_path(&self) -> PathBuf {
        self.dir.join(TOKEN_KEY)
    }

    /// Returns the stored token, or `None` when absent or blank.
    pub fn load(&self) -> Result<Option<String>, ClientError> {
        match fs::read_to_string(self.token_path()) {
            Ok(content) => {
                let token = content.trim();
                Ok((!token.is_empty()).then(|| token.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes the token, readable only by the owner on unix.
    pub fn save(&self, token: &str) -> Result<(), ClientError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(ClientError::InvalidInput("token must not be empty".to_string()));
        }
        fs::create_dir_all(&self.dir)?;
        let path = self.token_path();
        fs::write(&path, token)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }

    /// Removes the stored token. Clearing an absent token is not an error.
    pub fn clear(&self) -> Result<(), ClientError> {
        match fs::remove_file(self.token_path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Where the client reads its bearer token from.
#[derive(Debug, Clone)]
pub enum TokenSource {
    /// A token supplied directly (environment variable or flag).
    Fixed(String),
    Stored(TokenStore),
}

impl TokenSource {
    /// Prefers a non-empty `ASSETLINK_TOKEN`, else the store.
    pub fn from_env_or(store: TokenStore) -> Self {
        match std::env::var(TOKEN_ENV) {
            Ok(token) if !token.trim().is_empty() => TokenSource::Fixed(token.trim().to_string()),
            _ => TokenSource::Stored(store),
        }
    }

    /// The current token; a missing token is [`ClientError::AuthMissing`].
    pub fn token(&self) -> Result<String, ClientError> {
        match self {
            TokenSource::Fixed(token) => Ok(token.clone()),
            TokenSource::Stored(store) => store.load()?.ok_or(ClientError::AuthMissing),
        }
    }

    /// Drops the stored token after the backend rejected it.
    pub fn invalidate(&self) -> Result<(), ClientError> {
        match self {
            TokenSource::Fixed(_) => Ok(()),
            TokenSource::Stored(store) => store.clear(),
        }
    }
}

/// Prompts for a token without echoing it.
pub fn prompt_token() -> anyhow::Result<String> {
    let token = rpassword::prompt_password("API token: ")?;
    if token.trim().is_empty() {
        anyhow::bail!("Token cannot be empty");
    }
    Ok(token.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_load_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("nested"));

        assert_eq!(store.load().unwrap(), None);
        store.save("  secret-token\n").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some("secret-token"));
        assert!(dir.path().join("nested").join(TOKEN_KEY).exists());

        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
        store.clear().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_token_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path());
        store.save("secret").unwrap();
        let mode = fs::metadata(dir.path().join(TOKEN_KEY))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_empty_token_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path());
        assert!(matches!(store.save("   "), Err(ClientError::InvalidInput(_))));
    }

    #[test]
    fn test_missing_token_is_auth_missing() {
        let dir = tempfile::tempdir().unwrap();
        let source = TokenSource::Stored(TokenStore::new(dir.path()));
        assert!(matches!(source.token(), Err(ClientError::AuthMissing)));
    }

    #[test]
    fn test_invalidate_clears_stored_token() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path());
        store.save("secret").unwrap();
        let source = TokenSource::Stored(store.clone());
        source.invalidate().unwrap();
        assert_eq!(store.load().unwrap(), None);
    }
}
