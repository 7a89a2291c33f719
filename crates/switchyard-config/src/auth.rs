//! Credential and provider-configuration resolution.
//!
//! The dispatch layer only sees the [`AuthProvider`] trait; [`ConfigAuthProvider`]
//! is the implementation backed by the TOML `[providers.*]` sections and the
//! process environment.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::error::ConfigError;

/// A credential read from the environment at resolution time.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Variable the credential is exported under in the child environment.
    pub env_var: String,
    pub secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("env_var", &self.env_var)
            .field("secret", &"***")
            .finish()
    }
}

/// Everything a worker needs to invoke one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub name: String,
    pub adapter: String,
    pub binary: String,
    pub credentials: Option<Credentials>,
    pub base_url: Option<String>,
    pub default_model: Option<String>,
    pub env: BTreeMap<String, String>,
    pub args: Vec<String>,
    pub probe_args: Vec<String>,
    pub free_tier: bool,
}

impl ProviderConfig {
    /// Environment for the child process: configured variables plus the
    /// credential, if any.
    #[must_use]
    pub fn invocation_env(&self) -> BTreeMap<String, String> {
        let mut env = self.env.clone();
        if let Some(creds) = &self.credentials {
            env.insert(creds.env_var.clone(), creds.secret.clone());
        }
        env
    }
}

/// Credential/config collaborator consulted at registration and before every
/// invocation.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Whether `name` can be registered: configured, runnable, and credentialed.
    async fn validate_provider(&self, name: &str) -> bool;

    /// Resolve the configuration for one invocation of `name`.
    async fn provider_config(&self, name: &str) -> Result<ProviderConfig, ConfigError>;
}

/// [`AuthProvider`] backed by a loaded [`Config`].
#[derive(Debug, Clone)]
pub struct ConfigAuthProvider {
    config: Arc<Config>,
}

impl ConfigAuthProvider {
    #[must_use]
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Detailed form of [`AuthProvider::validate_provider`].
    pub fn check_provider(&self, name: &str) -> Result<(), String> {
        let section = self
            .config
            .provider(name)
            .ok_or_else(|| format!("no [providers.{name}] section"))?;

        let binary = section.binary_or(name);
        if !binary_resolves(binary) {
            return Err(format!("binary '{binary}' not found"));
        }

        if let Some(var) = &section.api_key_env
            && read_env(var).is_none()
        {
            return Err(format!("credential variable {var} is not set"));
        }

        Ok(())
    }
}

fn binary_resolves(binary: &str) -> bool {
    let path = Path::new(binary);
    if path.components().count() > 1 {
        return path.is_file();
    }
    which::which(binary).is_ok()
}

fn read_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.is_empty())
}

#[async_trait]
impl AuthProvider for ConfigAuthProvider {
    async fn validate_provider(&self, name: &str) -> bool {
        match self.check_provider(name) {
            Ok(()) => true,
            Err(reason) => {
                tracing::warn!(provider = %name, reason = %reason, "provider failed validation");
                false
            }
        }
    }

    async fn provider_config(&self, name: &str) -> Result<ProviderConfig, ConfigError> {
        let section = self
            .config
            .provider(name)
            .ok_or_else(|| ConfigError::UnknownProvider {
                name: name.to_string(),
            })?;

        let credentials = section.api_key_env.as_ref().and_then(|var| {
            read_env(var).map(|secret| Credentials {
                env_var: var.clone(),
                secret,
            })
        });

        Ok(ProviderConfig {
            name: name.to_string(),
            adapter: section.adapter_kind(name),
            binary: section.binary_or(name).to_string(),
            credentials,
            base_url: section.base_url.clone(),
            default_model: section.default_model.clone(),
            env: section.env.clone(),
            args: section.args.clone(),
            probe_args: section.probe_args.clone(),
            free_tier: section.free_tier,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderSection;

    fn auth_with(name: &str, section: ProviderSection) -> ConfigAuthProvider {
        let config = Config::builder().provider(name, section).build().unwrap();
        ConfigAuthProvider::new(Arc::new(config))
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let creds = Credentials {
            env_var: "API_KEY".to_string(),
            secret: "hunter2".to_string(),
        };
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("API_KEY"));
    }

    #[tokio::test]
    async fn test_unknown_provider_fails_validation() {
        let auth = auth_with("p", ProviderSection::command("sh", ["{prompt}"]));
        assert!(!auth.validate_provider("missing").await);
        assert!(matches!(
            auth.provider_config("missing").await,
            Err(ConfigError::UnknownProvider { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_resolvable_binary_passes() {
        let auth = auth_with("p", ProviderSection::command("sh", ["-c", "{prompt}"]));
        assert!(auth.validate_provider("p").await);
        let resolved = auth.provider_config("p").await.unwrap();
        assert_eq!(resolved.binary, "sh");
        assert_eq!(resolved.adapter, "command");
        assert!(resolved.credentials.is_none());
    }

    #[tokio::test]
    async fn test_missing_binary_fails() {
        let auth = auth_with(
            "p",
            ProviderSection::command("switchyard-no-such-binary", ["{prompt}"]),
        );
        assert!(
            auth.check_provider("p")
                .unwrap_err()
                .contains("switchyard-no-such-binary")
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_credential_fails() {
        let auth = auth_with(
            "p",
            ProviderSection::command("sh", ["{prompt}"])
                .with_api_key_env("SWITCHYARD_TEST_UNSET_CREDENTIAL_VAR"),
        );
        assert!(auth.check_provider("p").unwrap_err().contains("not set"));
    }

    #[test]
    fn test_invocation_env_includes_credential() {
        let resolved = ProviderConfig {
            name: "p".to_string(),
            adapter: "command".to_string(),
            binary: "p".to_string(),
            credentials: Some(Credentials {
                env_var: "P_KEY".to_string(),
                secret: "s3cret".to_string(),
            }),
            base_url: None,
            default_model: None,
            env: BTreeMap::from([("MODE".to_string(), "fast".to_string())]),
            args: vec![],
            probe_args: vec![],
            free_tier: false,
        };
        let env = resolved.invocation_env();
        assert_eq!(env.get("P_KEY").map(String::as_str), Some("s3cret"));
        assert_eq!(env.get("MODE").map(String::as_str), Some("fast"));
    }
}
