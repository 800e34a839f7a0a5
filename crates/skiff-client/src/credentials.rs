//! Credentials presented to the cluster API.

use std::fmt;
use std::path::PathBuf;

use kube::config::AuthInfo;
use secrecy::SecretString;
use skiff_core::ClusterConfig;
use tracing::debug;

#[derive(Clone, Default, PartialEq, Eq)]
pub enum Credentials {
    /// Keep whatever the base configuration carries.
    #[default]
    None,
    Basic {
        username: String,
        password: String,
    },
    Token(String),
    /// Bearer token re-read from disk, as mounted service account tokens rotate.
    TokenFile(PathBuf),
}

impl Credentials {
    /// Inline token first, then an existing token file, then basic auth
    /// with a non-empty username.
    pub fn from_cluster(cluster: &ClusterConfig) -> Self {
        if let Some(token) = cluster.token.as_deref().filter(|t| !t.is_empty()) {
            return Credentials::Token(token.to_string());
        }
        if let Some(path) = &cluster.token_file {
            if path.exists() {
                return Credentials::TokenFile(path.clone());
            }
            debug!(path = %path.display(), "no service account token");
        }
        match cluster.username.as_deref().filter(|u| !u.is_empty()) {
            Some(user) => Credentials::Basic {
                username: user.to_string(),
                password: cluster.password.clone().unwrap_or_default(),
            },
            None => Credentials::None,
        }
    }

    /// Replace the auth section of a client configuration.
    pub fn apply(&self, auth: &mut AuthInfo) {
        let mut replaced = AuthInfo::default();
        match self {
            Credentials::None => return,
            Credentials::Basic { username, password } => {
                replaced.username = Some(username.clone());
                replaced.password = Some(SecretString::from(password.clone()));
            }
            Credentials::Token(token) => {
                replaced.token = Some(SecretString::from(token.clone()));
            }
            Credentials::TokenFile(path) => {
                replaced.token_file = Some(path.display().to_string());
            }
        }
        *auth = replaced;
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::None => f.write_str("None"),
            Credentials::Basic { username, .. } => write!(f, "Basic({username})"),
            Credentials::Token(_) => f.write_str("Token(..)"),
            Credentials::TokenFile(path) => write!(f, "TokenFile({})", path.display()),
        }
    }
}
