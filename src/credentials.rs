//! Credential loading from key=value environment files.
//!
//! Credentials are returned as a value and handed to configuration
//! builders explicitly; the process environment is never modified.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::CredentialError;

/// Key holding the completion/embedding provider secret.
pub const PROVIDER_API_KEY: &str = "MISTRAL_API_KEY";
/// Key holding the tracing service secret.
pub const TRACING_API_KEY: &str = "LANGSMITH_API_KEY";
/// Key toggling tracing upload.
pub const TRACING_FLAG: &str = "LANGSMITH_TRACING";
/// Cloud access key id used by the warehouse connector.
pub const CLOUD_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
/// Cloud secret used by the warehouse connector.
pub const CLOUD_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";

/// Which flow the credentials are loaded for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialProfile {
    /// PDF question answering.
    Document,
    /// Table question answering.
    Database,
}

impl CredentialProfile {
    /// Keys that must be present and non-empty, in check order.
    #[must_use]
    pub const fn required_keys(self) -> &'static [&'static str] {
        match self {
            Self::Document => &[TRACING_API_KEY, PROVIDER_API_KEY],
            Self::Database => &[
                CLOUD_ACCESS_KEY_ID,
                CLOUD_SECRET_ACCESS_KEY,
                PROVIDER_API_KEY,
                TRACING_API_KEY,
                TRACING_FLAG,
            ],
        }
    }
}

/// Validated credentials.
#[derive(Clone, Default)]
pub struct Credentials {
    values: BTreeMap<String, String>,
}

impl Credentials {
    /// Looks up a value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// The provider API key, if present.
    #[must_use]
    pub fn provider_api_key(&self) -> Option<&str> {
        self.get(PROVIDER_API_KEY)
    }

    /// Whether tracing upload was requested.
    #[must_use]
    pub fn tracing_enabled(&self) -> bool {
        self.get(TRACING_FLAG)
            .is_some_and(|v| v.eq_ignore_ascii_case("true") || v == "1")
    }

    /// Number of loaded keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if no keys were loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Self {
            values: pairs.into_iter().collect(),
        }
    }

    fn require(&self, profile: CredentialProfile, path: &Path) -> Result<(), CredentialError> {
        for key in profile.required_keys() {
            let present = self.get(key).is_some_and(|v| !v.trim().is_empty());
            if !present {
                return Err(CredentialError::Missing {
                    key: (*key).to_string(),
                    path: path.to_path_buf(),
                });
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Keys only; values are secrets.
        f.debug_struct("Credentials")
            .field("keys", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Reads credentials from the env file at `path` and validates them.
///
/// # Errors
///
/// Returns [`CredentialError::Read`] if the file cannot be parsed and
/// [`CredentialError::Missing`] for the first required key that is absent
/// or blank.
pub fn load_credentials(
    path: &Path,
    profile: CredentialProfile,
) -> Result<Credentials, CredentialError> {
    let read_err = |message: String| CredentialError::Read {
        path: path.to_path_buf(),
        message,
    };

    let iter = dotenvy::from_path_iter(path).map_err(|e| read_err(e.to_string()))?;
    let mut pairs = Vec::new();
    for item in iter {
        pairs.push(item.map_err(|e| read_err(e.to_string()))?);
    }

    let credentials = Credentials::from_pairs(pairs);
    credentials.require(profile, path)?;
    tracing::debug!(path = %path.display(), keys = credentials.len(), "credentials loaded");
    Ok(credentials)
}

/// Uses credentials already exported in the process environment when the
/// provider key is set there; otherwise reads `path`.
///
/// # Errors
///
/// Same as [`load_credentials`]. When reading the environment,
/// [`CredentialError::Missing`] names the environment as its source.
pub fn load_credentials_if_needed(
    path: &Path,
    profile: CredentialProfile,
) -> Result<Credentials, CredentialError> {
    let provider_key_exported = std::env::var(PROVIDER_API_KEY).is_ok_and(|v| !v.is_empty());
    if !provider_key_exported {
        return load_credentials(path, profile);
    }

    let pairs = profile
        .required_keys()
        .iter()
        .filter_map(|key| std::env::var(key).ok().map(|v| ((*key).to_string(), v)));
    let credentials = Credentials::from_pairs(pairs);
    credentials.require(profile, &PathBuf::from("<environment>"))?;
    Ok(credentials)
}
