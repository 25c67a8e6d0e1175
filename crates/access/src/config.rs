//! Route guard configuration.

use serde::{Deserialize, Serialize};

use portal_core::{PathKey, normalize};

pub const DEFAULT_LOGIN_PATH: &str = "/login";
pub const DEFAULT_FORBIDDEN_PATH: &str = "/forbidden";

/// Paths the guard must never redirect away from, plus where to send a
/// principal that is denied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardConfig {
    pub login_path: PathKey,
    pub forbidden_path: PathKey,
    /// Extra screens that need no grant (landing page, help, ...).
    #[serde(default)]
    pub public_paths: Vec<PathKey>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            login_path: normalize(DEFAULT_LOGIN_PATH),
            forbidden_path: normalize(DEFAULT_FORBIDDEN_PATH),
            public_paths: Vec::new(),
        }
    }
}

impl GuardConfig {
    /// Read `PORTAL_LOGIN_PATH`, `PORTAL_FORBIDDEN_PATH` and
    /// `PORTAL_PUBLIC_PATHS` (comma-separated), falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`GuardConfig::from_env`] with an injectable variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let login_path = match lookup("PORTAL_LOGIN_PATH") {
            Some(raw) => normalize(&raw),
            None => {
                tracing::warn!("PORTAL_LOGIN_PATH not set; using dev default {}", DEFAULT_LOGIN_PATH);
                defaults.login_path
            }
        };

        let forbidden_path = match lookup("PORTAL_FORBIDDEN_PATH") {
            Some(raw) => normalize(&raw),
            None => {
                tracing::warn!("PORTAL_FORBIDDEN_PATH not set; using dev default {}", DEFAULT_FORBIDDEN_PATH);
                defaults.forbidden_path
            }
        };

        let public_paths = lookup("PORTAL_PUBLIC_PATHS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(normalize)
                    .collect()
            })
            .unwrap_or_default();

        let config = Self {
            login_path,
            forbidden_path,
            public_paths,
        };

        if config.forbidden_path.is_root() || config.public_paths.iter().any(PathKey::is_root) {
            tracing::warn!(?config, "guard config exempts the root path from authorization");
        }

        config
    }

    /// Whether navigation to `key` skips the authorization check.
    pub fn is_unguarded(&self, key: &PathKey) -> bool {
        *key == self.login_path || *key == self.forbidden_path || self.public_paths.contains(key)
    }
}
