//! Protocol-wide constants for the session-authority engine.

/// Maximum number of per-session allowed target contracts.
pub const MAX_ALLOWED_TARGETS: usize = 4;

/// Minimum lifetime of a freshly created session key, in seconds.
pub const MIN_SESSION_VALIDITY_SECS: i64 = 60;

/// Spec-version felt appended to every session signature. Strict v2 only.
pub const SESSION_SPEC_VERSION: u64 = 2;

/// SNIP-12 domain: application name.
pub const TYPED_DATA_DOMAIN_NAME: &str = "Starkclaw";

/// SNIP-12 domain: version. There is no version "1" code path.
pub const TYPED_DATA_DOMAIN_VERSION: &str = "2";

/// On-chain confirmation wait: attempts × interval.
pub const CONFIRM_RETRIES: u32 = 60;
pub const CONFIRM_INTERVAL_SECS: u64 = 3;

/// Status poller cadence and limits.
pub const POLL_INTERVAL_SECS: u64 = 15;
pub const POLL_CONCURRENCY: usize = 3;
pub const POLL_STALE_AFTER_SECS: i64 = 30 * 60;

/// In-memory activity log cap.
pub const ACTIVITY_CAP: usize = 50;

/// Default JSON-RPC timeouts.
pub const RPC_TIMEOUT_SECS: u64 = 15;
pub const RPC_READ_TIMEOUT_SECS: u64 = 10;

/// Fee estimation overhead applied to estimated resource bounds (×1.5).
pub const FEE_OVERHEAD_NUM: u64 = 3;
pub const FEE_OVERHEAD_DEN: u64 = 2;

/// Minimum remote-signer request timeout.
pub const MIN_SIGNER_TIMEOUT_MS: u64 = 1_000;

/// Order of the Stark curve subgroup; session scalars are reduced into it.
pub const STARK_CURVE_ORDER_HEX: &str =
    "0x0800000000000010ffffffffffffffffb781126dcae7b2321e66a241adc64d2f";

/// Entry points a registered session key may invoke, enforced on-chain.
pub const SESSION_ENTRYPOINTS: [&str; 4] = ["transfer", "transferFrom", "swap", "execute"];

/// Per-registration call budget passed to `add_or_update_session_key`.
pub const SESSION_MAX_CALLS: u64 = 1_000;
