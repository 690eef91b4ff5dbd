//! Remote keyring-proxy signer.
//!
//! The scalar multiplication happens in a remote enclave; this client is
//! responsible for authenticating the request (HMAC-SHA256 over a canonical
//! payload), bounding it with a cancellable deadline, and validating the
//! response strictly before emitting the five-felt session signature.
//!
//! Secrets never appear in logs or error messages; upstream bodies are
//! redacted before they are surfaced.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use hmac::{Hmac, Mac};
use rand::RngCore;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use starknet::core::types::Felt;

use starkclaw_core::codec::{felt_from_hex, felt_to_hex};
use starkclaw_core::constants::SESSION_SPEC_VERSION;
use starkclaw_core::CoreError;

use crate::config::SignerRuntimeConfig;
use crate::{SessionSignRequest, SessionSignature};

const SIGN_ENDPOINT: &str = "v1/sign/session-transaction";

/// Free-form audit context forwarded to the proxy with every request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignContext {
    pub tool: String,
    pub reason: String,
    pub mobile_action_id: Option<String>,
}

/// Raw HTTP response as the signer sees it.
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: u16,
    pub body: String,
}

/// Transport seam; production uses reqwest, tests use a scripted fake.
pub trait ProxyTransport: Send + Sync {
    fn post(
        &self,
        url: String,
        headers: Vec<(&'static str, String)>,
        body: String,
        timeout: Duration,
    ) -> impl Future<Output = Result<ProxyResponse, CoreError>> + Send;
}

/// reqwest-backed transport.
#[derive(Default)]
pub struct HttpProxyTransport {
    http: reqwest::Client,
}

impl HttpProxyTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProxyTransport for HttpProxyTransport {
    fn post(
        &self,
        url: String,
        headers: Vec<(&'static str, String)>,
        body: String,
        timeout: Duration,
    ) -> impl Future<Output = Result<ProxyResponse, CoreError>> + Send {
        let http = self.http.clone();
        async move {
            let mut request = http
                .post(&url)
                .header("content-type", "application/json")
                .timeout(timeout);
            for (name, value) in headers {
                request = request.header(name, value);
            }
            let response = request.body(body).send().await.map_err(|e| {
                if e.is_timeout() {
                    CoreError::TransportTimeout("remote signing request timed out".into())
                } else {
                    CoreError::Transport(format!("remote signer unreachable: {e}"))
                }
            })?;
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            Ok(ProxyResponse { status, body })
        }
    }
}

// ── Canonical request authentication ─────────────────────────────────────────

pub(crate) fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// `timestamp.nonce.METHOD.path.sha256(body)` — the exact string the proxy
/// recomputes before comparing signatures.
pub(crate) fn canonical_payload(
    timestamp: &str,
    nonce: &str,
    method: &str,
    path: &str,
    raw_body: &str,
) -> String {
    format!("{timestamp}.{nonce}.{method}.{path}.{}", sha256_hex(raw_body.as_bytes()))
}

pub(crate) fn hmac_sha256_hex(secret: &str, payload: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn fresh_nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

// ── Signer ───────────────────────────────────────────────────────────────────

pub struct KeyringProxySigner<T: ProxyTransport = HttpProxyTransport> {
    config: SignerRuntimeConfig,
    transport: T,
    /// First observed session public key; later responses must match it.
    pinned: Mutex<Option<Felt>>,
}

impl KeyringProxySigner<HttpProxyTransport> {
    pub fn new(config: SignerRuntimeConfig) -> Self {
        Self::with_transport(config, HttpProxyTransport::new())
    }
}

impl<T: ProxyTransport> KeyringProxySigner<T> {
    pub fn with_transport(config: SignerRuntimeConfig, transport: T) -> Self {
        Self { config, transport, pinned: Mutex::new(None) }
    }

    /// The key this signer is pinned to, once a response established it.
    pub fn pinned_public_key(&self) -> Option<Felt> {
        *self.pinned.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Strip credentials from any text surfaced to callers or logs.
    fn redact(&self, text: &str) -> String {
        let mut out = text.replace(self.config.hmac_secret(), "[redacted]");
        if let Some(key_id) = self.config.key_id() {
            out = out.replace(key_id, "[redacted]");
        }
        out.chars().take(200).collect()
    }

    fn request_body(&self, request: &SessionSignRequest) -> String {
        let calls: Vec<Value> = request
            .calls
            .iter()
            .map(|call| {
                json!({
                    "contractAddress": felt_to_hex(&call.contract_address),
                    "entrypoint": call.entrypoint,
                    "calldata": call.calldata.iter().map(felt_to_hex).collect::<Vec<_>>(),
                })
            })
            .collect();
        let mut body = json!({
            "accountAddress": felt_to_hex(&request.account_address),
            "chainId": felt_to_hex(&request.chain_id),
            "nonce": felt_to_hex(&request.nonce),
            "validUntil": request.valid_until,
            "calls": calls,
            "context": {
                "requester": self.config.requester(),
                "tool": request.context.tool,
                "reason": request.context.reason,
                "client_id": self.config.client_id(),
                "mobile_action_id": request.context.mobile_action_id,
            },
        });
        if let Some(key_id) = self.config.key_id() {
            body["keyId"] = json!(key_id);
        }
        body.to_string()
    }

    pub async fn sign_transaction(
        &self,
        request: &SessionSignRequest,
    ) -> Result<SessionSignature, CoreError> {
        // A request for an already-expired window never leaves the device.
        if request.valid_until <= starkclaw_core::unix_now() {
            return Err(CoreError::SignerValidityExpired);
        }

        let url = self
            .config
            .proxy_url()
            .join(SIGN_ENDPOINT)
            .map_err(|e| CoreError::Internal(format!("endpoint join: {e}")))?;
        let body = self.request_body(request);

        let timestamp = starkclaw_core::unix_now().to_string();
        let nonce = fresh_nonce();
        let payload = canonical_payload(&timestamp, &nonce, "POST", url.path(), &body);
        let signature = hmac_sha256_hex(self.config.hmac_secret(), &payload);

        let headers = vec![
            ("x-keyring-client-id", self.config.client_id().to_string()),
            ("x-keyring-timestamp", timestamp),
            ("x-keyring-nonce", nonce),
            ("x-keyring-signature", signature),
        ];

        let timeout = Duration::from_millis(self.config.request_timeout_ms());
        let send = self.transport.post(url.to_string(), headers, body, timeout);
        let response = match tokio::time::timeout(timeout, send).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(CoreError::TransportTimeout(
                    "remote signing request timed out".into(),
                ))
            }
        };
        tracing::debug!(status = response.status, "keyring proxy responded");

        self.handle_response(request, response)
    }

    fn handle_response(
        &self,
        request: &SessionSignRequest,
        response: ProxyResponse,
    ) -> Result<SessionSignature, CoreError> {
        let ProxyResponse { status, body } = response;

        if status == 401 {
            let snippet = self.redact(&body);
            let lowered = snippet.to_ascii_lowercase();
            if lowered.contains("nonce") || lowered.contains("replay") {
                return Err(CoreError::SignerReplayNonce(snippet));
            }
            return Err(CoreError::SignerAuth(snippet));
        }
        if (400..500).contains(&status) {
            let reason = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| {
                    v.get("error")
                        .or_else(|| v.get("message"))
                        .and_then(Value::as_str)
                        .map(str::to_string)
                })
                .unwrap_or_else(|| format!("HTTP {status}"));
            return Err(CoreError::SignerPolicyDenied(self.redact(&reason)));
        }
        if status >= 500 {
            return Err(CoreError::Unavailable(format!(
                "remote signer returned HTTP {status}: {}",
                self.redact(&body)
            )));
        }

        let parsed: Value = serde_json::from_str(&body).map_err(|_| {
            CoreError::SignerMalformedResponse("response body is not JSON".into())
        })?;

        let Some(signature) = parsed.get("signature").and_then(Value::as_array) else {
            return Err(CoreError::SignerMalformedResponse(
                "response is missing the signature array".into(),
            ));
        };
        if signature.len() != 4 {
            return Err(CoreError::SignerMalformedResponse(format!(
                "signature must be exactly 4 felts [pubkey, r, s, valid_until], got {}",
                signature.len()
            )));
        }
        let felts = signature
            .iter()
            .map(|v| {
                v.as_str()
                    .ok_or(())
                    .and_then(|s| felt_from_hex(s).map_err(|_| ()))
            })
            .collect::<Result<Vec<Felt>, ()>>()
            .map_err(|_| {
                CoreError::SignerMalformedResponse("signature felts must be hex strings".into())
            })?;

        let pubkey = felts[0];

        if let Some(reported) = parsed.get("sessionPublicKey").and_then(Value::as_str) {
            let reported = felt_from_hex(reported).map_err(|_| {
                CoreError::SignerMalformedResponse("sessionPublicKey is not a valid felt".into())
            })?;
            if reported != pubkey {
                return Err(CoreError::SignerMalformedResponse(
                    "sessionPublicKey does not match the signature's first felt".into(),
                ));
            }
        }

        let expected_valid_until = Felt::from(request.valid_until as u64);
        if felts[3] != expected_valid_until {
            return Err(CoreError::SignerMalformedResponse(format!(
                "signature valid_until {} does not match the request's {}",
                felt_to_hex(&felts[3]),
                felt_to_hex(&expected_valid_until),
            )));
        }

        // No silent key rotation within a signer's lifetime.
        {
            let mut pinned = self.pinned.lock().unwrap_or_else(|p| p.into_inner());
            match *pinned {
                Some(previous) if previous != pubkey => {
                    return Err(CoreError::SignerPubkeyChanged {
                        expected: felt_to_hex(&previous),
                        got: felt_to_hex(&pubkey),
                    });
                }
                _ => *pinned = Some(pubkey),
            }
        }

        let request_id = parsed
            .get("requestId")
            .or_else(|| parsed.get("request_id"))
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(SessionSignature {
            felts: [felts[0], felts[1], felts[2], felts[3], Felt::from(SESSION_SPEC_VERSION)],
            session_public_key: pubkey,
            request_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RuntimeSignerSettings, SignerMode, SignerRuntime, SignerRuntimeConfig};
    use crate::CallSpec;
    use starkclaw_keystore::{namespace, MemoryKeystore, SecureStore};
    use std::sync::Arc;

    const SECRET: &str = "hunter2-hmac-secret";

    struct FakeTransport {
        responses: Mutex<Vec<ProxyResponse>>,
        seen: Mutex<Vec<(String, Vec<(&'static str, String)>, String)>>,
    }

    impl FakeTransport {
        fn scripted(responses: Vec<ProxyResponse>) -> Self {
            Self { responses: Mutex::new(responses), seen: Mutex::new(Vec::new()) }
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    impl ProxyTransport for FakeTransport {
        fn post(
            &self,
            url: String,
            headers: Vec<(&'static str, String)>,
            body: String,
            _timeout: Duration,
        ) -> impl Future<Output = Result<ProxyResponse, CoreError>> + Send {
            let response = {
                let mut responses = self.responses.lock().unwrap();
                self.seen.lock().unwrap().push((url, headers, body));
                responses.remove(0)
            };
            async move { Ok(response) }
        }
    }

    fn config() -> SignerRuntimeConfig {
        let store = MemoryKeystore::new();
        store.set(namespace::KEYRING_CLIENT_ID, "client-1").unwrap();
        store.set(namespace::KEYRING_HMAC_SECRET, SECRET).unwrap();
        let store: Arc<dyn SecureStore> = Arc::new(store);
        let settings = RuntimeSignerSettings {
            mode: SignerMode::Remote,
            proxy_url: Some("https://signer.example.com".into()),
            ..RuntimeSignerSettings::default()
        };
        match SignerRuntimeConfig::load(&settings, &store).unwrap() {
            SignerRuntime::Remote(config) => config,
            SignerRuntime::Local => unreachable!(),
        }
    }

    fn request() -> SessionSignRequest {
        SessionSignRequest {
            account_address: Felt::from(0xacc0u64),
            chain_id: Felt::ONE,
            nonce: Felt::from(7u8),
            tx_hash: Felt::from(0x1234u64),
            valid_until: starkclaw_core::unix_now() + 3_600,
            calls: vec![CallSpec {
                contract_address: Felt::from(0x10u8),
                entrypoint: "transfer".into(),
                calldata: vec![Felt::from(1u8), Felt::from(2u8), Felt::ZERO],
            }],
            context: SignContext { tool: "transfer".into(), reason: "user intent".into(), mobile_action_id: Some("act-1".into()) },
        }
    }

    fn ok_body(pubkey: &str, valid_until: i64) -> String {
        json!({
            "signature": [pubkey, "0x22", "0x33", format!("{valid_until:#x}")],
            "sessionPublicKey": pubkey,
            "requestId": "req-9",
        })
        .to_string()
    }

    #[tokio::test]
    async fn happy_path_emits_five_felts() {
        let request = request();
        let transport = FakeTransport::scripted(vec![ProxyResponse {
            status: 200,
            body: ok_body("0xaaa", request.valid_until),
        }]);
        let signer = KeyringProxySigner::with_transport(config(), transport);
        let signature = signer.sign_transaction(&request).await.unwrap();
        assert_eq!(signature.felts.len(), 5);
        assert_eq!(signature.felts[0], Felt::from(0xaaau64));
        assert_eq!(signature.felts[3], Felt::from(request.valid_until as u64));
        assert_eq!(signature.felts[4], Felt::from(SESSION_SPEC_VERSION));
        assert_eq!(signature.request_id.as_deref(), Some("req-9"));
        assert_eq!(signer.pinned_public_key(), Some(Felt::from(0xaaau64)));
    }

    #[tokio::test]
    async fn request_is_hmac_authenticated() {
        let request = request();
        let transport = FakeTransport::scripted(vec![ProxyResponse {
            status: 200,
            body: ok_body("0xaaa", request.valid_until),
        }]);
        let signer = KeyringProxySigner::with_transport(config(), transport);
        signer.sign_transaction(&request).await.unwrap();

        let seen = signer.transport.seen.lock().unwrap();
        let (url, headers, body) = &seen[0];
        assert_eq!(url, "https://signer.example.com/v1/sign/session-transaction");

        let get = |name: &str| {
            headers
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, v)| v.clone())
                .unwrap()
        };
        assert_eq!(get("x-keyring-client-id"), "client-1");
        let nonce = get("x-keyring-nonce");
        assert_eq!(nonce.len(), 32, "nonce is 16 random bytes hex-encoded");

        let payload = canonical_payload(
            &get("x-keyring-timestamp"),
            &nonce,
            "POST",
            "/v1/sign/session-transaction",
            body,
        );
        assert_eq!(get("x-keyring-signature"), hmac_sha256_hex(SECRET, &payload));

        // Body carries the documented shape.
        let parsed: Value = serde_json::from_str(body).unwrap();
        assert_eq!(parsed["calls"][0]["entrypoint"], "transfer");
        assert_eq!(parsed["context"]["client_id"], "client-1");
        assert_eq!(parsed["context"]["mobile_action_id"], "act-1");
    }

    #[tokio::test]
    async fn three_element_signature_is_malformed() {
        let transport = FakeTransport::scripted(vec![ProxyResponse {
            status: 200,
            body: json!({ "signature": ["0x11", "0x22", "0x33"] }).to_string(),
        }]);
        let signer = KeyringProxySigner::with_transport(config(), transport);
        let err = signer.sign_transaction(&request()).await.unwrap_err();
        assert_eq!(err.machine_code(), "SIGNER_MALFORMED_RESPONSE");
        assert!(err.to_string().contains("pubkey, r, s, valid_until"));
    }

    #[tokio::test]
    async fn pubkey_rotation_fails_the_second_call() {
        let request = request();
        let transport = FakeTransport::scripted(vec![
            ProxyResponse { status: 200, body: ok_body("0xaaa", request.valid_until) },
            ProxyResponse { status: 200, body: ok_body("0xbbb", request.valid_until) },
        ]);
        let signer = KeyringProxySigner::with_transport(config(), transport);
        signer.sign_transaction(&request).await.unwrap();
        let err = signer.sign_transaction(&request).await.unwrap_err();
        assert_eq!(err.machine_code(), "SIGNER_PUBKEY_CHANGED");
    }

    #[tokio::test]
    async fn mismatched_session_public_key_is_malformed() {
        let request = request();
        let body = json!({
            "signature": ["0xaaa", "0x22", "0x33", format!("{:#x}", request.valid_until)],
            "sessionPublicKey": "0xccc",
        })
        .to_string();
        let transport = FakeTransport::scripted(vec![ProxyResponse { status: 200, body }]);
        let signer = KeyringProxySigner::with_transport(config(), transport);
        let err = signer.sign_transaction(&request).await.unwrap_err();
        assert_eq!(err.machine_code(), "SIGNER_MALFORMED_RESPONSE");
    }

    #[tokio::test]
    async fn valid_until_mismatch_is_malformed() {
        let request = request();
        let transport = FakeTransport::scripted(vec![ProxyResponse {
            status: 200,
            body: ok_body("0xaaa", request.valid_until + 5),
        }]);
        let signer = KeyringProxySigner::with_transport(config(), transport);
        let err = signer.sign_transaction(&request).await.unwrap_err();
        assert_eq!(err.machine_code(), "SIGNER_MALFORMED_RESPONSE");
    }

    #[tokio::test]
    async fn expired_validity_never_sends() {
        let mut request = request();
        request.valid_until = starkclaw_core::unix_now() - 10;
        let transport = FakeTransport::scripted(vec![]);
        let signer = KeyringProxySigner::with_transport(config(), transport);
        let err = signer.sign_transaction(&request).await.unwrap_err();
        assert_eq!(err.machine_code(), "SIGNER_VALIDITY_EXPIRED");
        assert_eq!(signer.transport.calls(), 0);
    }

    #[tokio::test]
    async fn auth_and_replay_split_on_the_body() {
        let transport = FakeTransport::scripted(vec![
            ProxyResponse { status: 401, body: json!({"error": "nonce already used"}).to_string() },
            ProxyResponse { status: 401, body: json!({"error": "bad signature"}).to_string() },
        ]);
        let signer = KeyringProxySigner::with_transport(config(), transport);
        let err = signer.sign_transaction(&request()).await.unwrap_err();
        assert_eq!(err.machine_code(), "SIGNER_REPLAY_NONCE");
        let err = signer.sign_transaction(&request()).await.unwrap_err();
        assert_eq!(err.machine_code(), "SIGNER_AUTH_ERROR");
    }

    #[tokio::test]
    async fn policy_denial_surfaces_the_upstream_reason() {
        let transport = FakeTransport::scripted(vec![ProxyResponse {
            status: 403,
            body: json!({"error": "amount exceeds session policy"}).to_string(),
        }]);
        let signer = KeyringProxySigner::with_transport(config(), transport);
        let err = signer.sign_transaction(&request()).await.unwrap_err();
        assert_eq!(err.machine_code(), "SIGNER_POLICY_DENIED");
        assert!(err.to_string().contains("amount exceeds session policy"));
    }

    #[tokio::test]
    async fn server_errors_are_retryable_and_redacted() {
        let transport = FakeTransport::scripted(vec![ProxyResponse {
            status: 500,
            body: format!("internal: secret={SECRET} leaked"),
        }]);
        let signer = KeyringProxySigner::with_transport(config(), transport);
        let err = signer.sign_transaction(&request()).await.unwrap_err();
        assert!(err.retryable());
        assert!(!err.to_string().contains(SECRET));
        assert!(err.to_string().contains("[redacted]"));
    }
}
