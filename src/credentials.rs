//! Read-only bearer-token sources.
//!
//! The transport and the poller read the token on every connection attempt, so
//! a token refreshed on disk or in the environment is picked up by the next
//! reconnect. Nothing in this crate writes credentials.

use std::path::PathBuf;

/// Environment variable consulted by [`EnvCredentials::default`].
pub const TOKEN_ENV_VAR: &str = "PULSE_TOKEN";

/// Synchronous, read-only access to the current bearer token.
pub trait CredentialStore: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
}

/// A fixed token (or none), typically from a CLI flag.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials(Option<String>);

impl StaticCredentials {
    pub fn new(token: Option<String>) -> Self {
        Self(token.filter(|t| !t.trim().is_empty()))
    }
}

impl CredentialStore for StaticCredentials {
    fn bearer_token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Reads the token from an environment variable at call time.
#[derive(Debug, Clone)]
pub struct EnvCredentials {
    var: String,
}

impl EnvCredentials {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvCredentials {
    fn default() -> Self {
        Self::new(TOKEN_ENV_VAR)
    }
}

impl CredentialStore for EnvCredentials {
    fn bearer_token(&self) -> Option<String> {
        std::env::var(&self.var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

/// Reads the token from a file at call time (first non-empty line).
#[derive(Debug, Clone)]
pub struct FileCredentials {
    path: PathBuf,
}

impl FileCredentials {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// `<config dir>/pulse/token`, e.g. `~/.config/pulse/token` on Linux.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("pulse").join("token"))
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl CredentialStore for FileCredentials {
    fn bearer_token(&self) -> Option<String> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        content
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
    }
}

/// Tries each store in order and returns the first token found.
#[derive(Default)]
pub struct ChainedCredentials {
    stores: Vec<Box<dyn CredentialStore>>,
}

impl ChainedCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, store: impl CredentialStore + 'static) -> Self {
        self.stores.push(Box::new(store));
        self
    }
}

impl CredentialStore for ChainedCredentials {
    fn bearer_token(&self) -> Option<String> {
        self.stores.iter().find_map(|store| store.bearer_token())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn static_credentials_ignore_blank_tokens() {
        assert_eq!(StaticCredentials::new(Some("  ".into())).bearer_token(), None);
        assert_eq!(
            StaticCredentials::new(Some("abc".into())).bearer_token(),
            Some("abc".into())
        );
        assert_eq!(StaticCredentials::default().bearer_token(), None);
    }

    #[test]
    fn file_credentials_read_first_non_empty_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token");
        std::fs::write(&path, "\n  secret-token  \nignored\n").unwrap();

        let store = FileCredentials::new(path.clone());
        assert_eq!(store.bearer_token(), Some("secret-token".into()));

        // Re-read on every call.
        std::fs::write(&path, "rotated\n").unwrap();
        assert_eq!(store.bearer_token(), Some("rotated".into()));
    }

    #[test]
    fn missing_file_yields_no_token() {
        let dir = TempDir::new().unwrap();
        let store = FileCredentials::new(dir.path().join("absent"));
        assert_eq!(store.bearer_token(), None);
    }

    #[test]
    fn env_credentials_unset_variable() {
        let store = EnvCredentials::new("PULSE_TEST_TOKEN_THAT_IS_NEVER_SET");
        assert_eq!(store.bearer_token(), None);
    }

    #[test]
    fn chain_returns_first_match() {
        let chain = ChainedCredentials::new()
            .with(StaticCredentials::default())
            .with(StaticCredentials::new(Some("second".into())))
            .with(StaticCredentials::new(Some("third".into())));
        assert_eq!(chain.bearer_token(), Some("second".into()));

        assert_eq!(ChainedCredentials::new().bearer_token(), None);
    }
}
