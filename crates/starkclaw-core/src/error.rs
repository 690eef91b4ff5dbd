use thiserror::Error;

/// Closed error taxonomy for the session-authority core.
///
/// Every variant maps to a stable machine code (`machine_code`) surfaced to
/// callers next to the one-line human reason from `Display`. Transport-class
/// failures additionally report whether a retry is worthwhile.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoreError {
    // ── Input & policy ───────────────────────────────────────────────────────
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("blocked by policy: {0}")]
    PolicyDenied(String),

    #[error("Emergency lockdown is enabled")]
    EmergencyLockdown,

    // ── Sessions ─────────────────────────────────────────────────────────────
    #[error("no usable session key{}", fmt_detail(.0))]
    SessionNotFound(Option<String>),

    #[error("session key has expired or is not yet valid")]
    SessionExpired,

    #[error("session key is not valid on-chain")]
    OnchainInvalid,

    #[error("insufficient balance: need {need} base units, have {have}")]
    InsufficientBalance { need: String, have: String },

    // ── Transport ────────────────────────────────────────────────────────────
    #[error("request timed out: {0}")]
    TransportTimeout(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("RPC error{}: {message}", fmt_code(.code))]
    Rpc { code: Option<i64>, message: String },

    // ── Remote signer ────────────────────────────────────────────────────────
    #[error("remote signer rejected authentication: {0}")]
    SignerAuth(String),

    #[error("remote signer denied by policy: {0}")]
    SignerPolicyDenied(String),

    #[error("remote signer rejected nonce as replayed: {0}")]
    SignerReplayNonce(String),

    #[error("remote signer returned a malformed response: {0}")]
    SignerMalformedResponse(String),

    #[error("session validity window has already expired; request not sent")]
    SignerValidityExpired,

    #[error("remote signer public key changed: expected {expected}, got {got}")]
    SignerPubkeyChanged { expected: String, got: String },

    // ── Configuration ────────────────────────────────────────────────────────
    #[error("remote signer URL must use https or a loopback host: {0}")]
    ConfigInsecureTransport(String),

    #[error("mutual TLS is required for remote signing in production")]
    ConfigMtlsRequired,

    #[error("remote signing mode requires a proxy URL")]
    ConfigMissingProxyUrl,

    // ── General ──────────────────────────────────────────────────────────────
    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

fn fmt_detail(detail: &Option<String>) -> String {
    match detail {
        Some(d) => format!(": {d}"),
        None => String::new(),
    }
}

fn fmt_code(code: &Option<i64>) -> String {
    match code {
        Some(c) => format!(" ({c})"),
        None => String::new(),
    }
}

impl CoreError {
    /// Stable machine code for programmatic handling across the UI boundary.
    pub fn machine_code(&self) -> &'static str {
        match self {
            CoreError::InvalidInput(_) => "INVALID_INPUT",
            CoreError::PolicyDenied(_) => "POLICY_DENIED",
            CoreError::EmergencyLockdown => "EMERGENCY_LOCKDOWN",
            CoreError::SessionNotFound(_) => "SESSION_NOT_FOUND",
            CoreError::SessionExpired => "SESSION_EXPIRED",
            CoreError::OnchainInvalid => "ONCHAIN_INVALID",
            CoreError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            CoreError::TransportTimeout(_) => "TRANSPORT_TIMEOUT",
            CoreError::Transport(_) => "TRANSPORT_ERROR",
            CoreError::SignerAuth(_) => "SIGNER_AUTH_ERROR",
            CoreError::SignerPolicyDenied(_) => "SIGNER_POLICY_DENIED",
            CoreError::SignerReplayNonce(_) => "SIGNER_REPLAY_NONCE",
            CoreError::SignerMalformedResponse(_) => "SIGNER_MALFORMED_RESPONSE",
            CoreError::SignerValidityExpired => "SIGNER_VALIDITY_EXPIRED",
            CoreError::SignerPubkeyChanged { .. } => "SIGNER_PUBKEY_CHANGED",
            CoreError::Rpc { .. } => "RPC_ERROR",
            CoreError::ConfigInsecureTransport(_) => "CONFIG_INSECURE_TRANSPORT",
            CoreError::ConfigMtlsRequired => "CONFIG_MTLS_REQUIRED",
            CoreError::ConfigMissingProxyUrl => "CONFIG_MISSING_PROXY_URL",
            CoreError::Unavailable(_) => "UNAVAILABLE",
            CoreError::Internal(_) => "INTERNAL",
        }
    }

    /// Whether retrying the same operation later can reasonably succeed.
    ///
    /// Transport failures, timeouts and server-side RPC errors are retryable;
    /// policy, auth and validation failures are not.
    pub fn retryable(&self) -> bool {
        match self {
            CoreError::TransportTimeout(_)
            | CoreError::Transport(_)
            | CoreError::Unavailable(_) => true,
            // JSON-RPC server errors are retryable; request errors are not.
            CoreError::Rpc { code, .. } => matches!(code, None | Some(-32603) | Some(-32099..=-32000)),
            _ => false,
        }
    }

    /// Optional next-step hint shown under the one-line reason.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            CoreError::EmergencyLockdown => {
                Some("Disable lockdown from the security screen to resume transfers.")
            }
            CoreError::SessionNotFound(_) => {
                Some("Create and register a session key before transacting.")
            }
            CoreError::SessionExpired | CoreError::OnchainInvalid => {
                Some("Register a fresh session key; the current one is no longer usable.")
            }
            CoreError::TransportTimeout(_) | CoreError::Transport(_) => {
                Some("Check connectivity and retry.")
            }
            CoreError::ConfigMtlsRequired | CoreError::ConfigInsecureTransport(_) => {
                Some("Fix the remote signer configuration before enabling remote mode.")
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn machine_codes_are_stable() {
        assert_eq!(
            CoreError::PolicyDenied("x".into()).machine_code(),
            "POLICY_DENIED"
        );
        assert_eq!(CoreError::EmergencyLockdown.machine_code(), "EMERGENCY_LOCKDOWN");
        assert_eq!(
            CoreError::SignerMalformedResponse("x".into()).machine_code(),
            "SIGNER_MALFORMED_RESPONSE"
        );
    }

    #[test]
    fn retryability_splits_transport_from_policy() {
        assert!(CoreError::TransportTimeout("t".into()).retryable());
        assert!(CoreError::Transport("t".into()).retryable());
        assert!(!CoreError::SignerAuth("401".into()).retryable());
        assert!(!CoreError::PolicyDenied("cap".into()).retryable());
        assert!(CoreError::Rpc { code: None, message: "http 502".into() }.retryable());
        assert!(!CoreError::Rpc { code: Some(-32602), message: "bad params".into() }.retryable());
    }
}
