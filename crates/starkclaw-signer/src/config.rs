//! Remote-signer runtime configuration (load-time validated).

use std::fmt;
use std::sync::Arc;

use url::Url;
use zeroize::Zeroizing;

use starkclaw_core::constants::MIN_SIGNER_TIMEOUT_MS;
use starkclaw_core::CoreError;
use starkclaw_keystore::{namespace, SecureStore};

/// Which signer serves session transactions. Defaults to local.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignerMode {
    #[default]
    Local,
    Remote,
}

impl fmt::Display for SignerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignerMode::Local => write!(f, "local"),
            SignerMode::Remote => write!(f, "remote"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

/// Raw settings as they arrive from the app shell; `load` turns them into a
/// validated runtime.
#[derive(Debug, Clone)]
pub struct RuntimeSignerSettings {
    pub mode: SignerMode,
    pub proxy_url: Option<String>,
    pub request_timeout_ms: u64,
    pub requester: String,
    pub mtls_required: bool,
    pub environment: Environment,
}

impl Default for RuntimeSignerSettings {
    fn default() -> Self {
        Self {
            mode: SignerMode::Local,
            proxy_url: None,
            request_timeout_ms: 10_000,
            requester: "starkclaw-mobile".into(),
            mtls_required: false,
            environment: Environment::Development,
        }
    }
}

/// Outcome of configuration loading: local mode carries nothing, remote mode
/// carries an immutable validated config.
#[derive(Debug)]
pub enum SignerRuntime {
    Local,
    Remote(SignerRuntimeConfig),
}

/// Validated remote-signing configuration. Immutable after load.
pub struct SignerRuntimeConfig {
    proxy_url: Url,
    client_id: String,
    hmac_secret: Zeroizing<String>,
    key_id: Option<String>,
    request_timeout_ms: u64,
    requester: String,
    mtls_required: bool,
}

impl SignerRuntimeConfig {
    /// Validate settings and load credentials from the secure store.
    pub fn load(
        settings: &RuntimeSignerSettings,
        store: &Arc<dyn SecureStore>,
    ) -> Result<SignerRuntime, CoreError> {
        if settings.mode == SignerMode::Local {
            return Ok(SignerRuntime::Local);
        }

        let raw_url = settings
            .proxy_url
            .as_deref()
            .ok_or(CoreError::ConfigMissingProxyUrl)?;
        let mut proxy_url = Url::parse(raw_url)
            .map_err(|e| CoreError::InvalidInput(format!("proxy URL does not parse: {e}")))?;

        let loopback = matches!(proxy_url.host_str(), Some("localhost") | Some("127.0.0.1"));
        if proxy_url.scheme() != "https" && !loopback {
            return Err(CoreError::ConfigInsecureTransport(raw_url.to_string()));
        }

        if settings.environment == Environment::Production && !settings.mtls_required {
            return Err(CoreError::ConfigMtlsRequired);
        }

        if settings.request_timeout_ms < MIN_SIGNER_TIMEOUT_MS {
            return Err(CoreError::InvalidInput(format!(
                "request timeout must be at least {MIN_SIGNER_TIMEOUT_MS} ms"
            )));
        }

        let client_id = store
            .get(namespace::KEYRING_CLIENT_ID)?
            .ok_or_else(|| CoreError::InvalidInput("remote signer client id is not provisioned".into()))?;
        let hmac_secret = store
            .get(namespace::KEYRING_HMAC_SECRET)?
            .map(Zeroizing::new)
            .ok_or_else(|| CoreError::InvalidInput("remote signer HMAC secret is not provisioned".into()))?;
        let key_id = store.get(namespace::KEYRING_KEY_ID)?;

        // A trailing slash keeps endpoint joins from clobbering the path.
        if !proxy_url.path().ends_with('/') {
            proxy_url.set_path(&format!("{}/", proxy_url.path()));
        }

        Ok(SignerRuntime::Remote(Self {
            proxy_url,
            client_id,
            hmac_secret,
            key_id,
            request_timeout_ms: settings.request_timeout_ms,
            requester: settings.requester.clone(),
            mtls_required: settings.mtls_required,
        }))
    }

    pub fn proxy_url(&self) -> &Url {
        &self.proxy_url
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub(crate) fn hmac_secret(&self) -> &str {
        &self.hmac_secret
    }

    pub fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    pub fn request_timeout_ms(&self) -> u64 {
        self.request_timeout_ms
    }

    pub fn requester(&self) -> &str {
        &self.requester
    }

    pub fn mtls_required(&self) -> bool {
        self.mtls_required
    }
}

impl fmt::Debug for SignerRuntimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignerRuntimeConfig")
            .field("proxy_url", &self.proxy_url.as_str())
            .field("client_id", &self.client_id)
            .field("key_id", &self.key_id)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("mtls_required", &self.mtls_required)
            .finish_non_exhaustive()
    }
}
