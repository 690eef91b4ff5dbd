//! Typed-data payload builders.
//!
//! Every builder returns both the serialized JSON payload (what a UI renders
//! and what determinism tests compare) and the Poseidon message hash (what a
//! signer consumes). Both derive from the same ordered field lists.

use serde::Serialize;
use starknet::core::types::Felt;

use starkclaw_core::codec::{felt_to_hex, U256};
use starkclaw_core::constants::{
    MAX_ALLOWED_TARGETS, TYPED_DATA_DOMAIN_NAME, TYPED_DATA_DOMAIN_VERSION,
};
use starkclaw_core::CoreError;

use crate::hash::{message_hash, short_string_felt, struct_hash, type_hash};

// ── Ordered field lists (shared by JSON `types` and the type hash) ───────────

const DOMAIN_TYPE: &str = "StarknetDomain";
const DOMAIN_FIELDS: [(&str, &str); 4] = [
    ("name", "felt"),
    ("version", "felt"),
    ("chainId", "felt"),
    ("verifyingContract", "felt"),
];

const REGISTER_TYPE: &str = "RegisterSessionKey";
const REGISTER_FIELDS: [(&str, &str); 10] = [
    ("session_key", "felt"),
    ("valid_after", "felt"),
    ("valid_until", "felt"),
    ("spending_limit_low", "felt"),
    ("spending_limit_high", "felt"),
    ("spending_token", "felt"),
    ("allowed_contract_0", "felt"),
    ("allowed_contract_1", "felt"),
    ("allowed_contract_2", "felt"),
    ("allowed_contract_3", "felt"),
];

const REVOKE_TYPE: &str = "RevokeSessionKey";
const REVOKE_FIELDS: [(&str, &str); 1] = [("session_key", "felt")];

const EMERGENCY_TYPE: &str = "EmergencyRevokeAll";
const EMERGENCY_FIELDS: [(&str, &str); 2] = [("nonce", "felt"), ("timestamp", "felt")];

const SESSION_TX_TYPE: &str = "SessionTransaction";
const SESSION_TX_FIELDS: [(&str, &str); 4] = [
    ("session_key", "felt"),
    ("nonce", "felt"),
    ("valid_until", "felt"),
    ("calls_hash", "felt"),
];

// ── JSON shapes ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct FieldDef {
    name: &'static str,
    #[serde(rename = "type")]
    r#type: &'static str,
}

fn defs<const N: usize>(fields: &[(&'static str, &'static str); N]) -> Vec<FieldDef> {
    fields
        .iter()
        .map(|(name, ty)| FieldDef { name, r#type: ty })
        .collect()
}

/// Domain values. Field declaration order is the serialized order.
#[derive(Serialize)]
struct DomainJson {
    name: &'static str,
    version: &'static str,
    #[serde(rename = "chainId")]
    chain_id: String,
    #[serde(rename = "verifyingContract")]
    verifying_contract: String,
}

#[derive(Serialize)]
struct TypesJson {
    #[serde(rename = "StarknetDomain")]
    domain: Vec<FieldDef>,
    #[serde(flatten)]
    primary: PrimaryTypeJson,
}

#[derive(Serialize)]
#[serde(untagged)]
enum PrimaryTypeJson {
    Register {
        #[serde(rename = "RegisterSessionKey")]
        fields: Vec<FieldDef>,
    },
    Revoke {
        #[serde(rename = "RevokeSessionKey")]
        fields: Vec<FieldDef>,
    },
    Emergency {
        #[serde(rename = "EmergencyRevokeAll")]
        fields: Vec<FieldDef>,
    },
    SessionTx {
        #[serde(rename = "SessionTransaction")]
        fields: Vec<FieldDef>,
    },
}

#[derive(Serialize)]
struct TypedDataJson<M: Serialize> {
    types: TypesJson,
    #[serde(rename = "primaryType")]
    primary_type: &'static str,
    domain: DomainJson,
    message: M,
}

// ── Output ───────────────────────────────────────────────────────────────────

/// A built payload: serialized bytes plus the hash a signer consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltTypedData {
    pub primary_type: &'static str,
    /// Compact JSON; byte-equal across invocations for equal input.
    pub json: String,
    pub message_hash: Felt,
}

// ── Inputs ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RegisterSessionKeyInput {
    pub chain_id: Felt,
    pub account_address: Felt,
    pub session_key: Felt,
    pub valid_after: i64,
    pub valid_until: i64,
    pub spending_limit: U256,
    pub spending_token: Felt,
    pub allowed_contracts: Vec<Felt>,
}

#[derive(Debug, Clone)]
pub struct RevokeSessionKeyInput {
    pub chain_id: Felt,
    pub account_address: Felt,
    pub session_key: Felt,
}

#[derive(Debug, Clone)]
pub struct EmergencyRevokeAllInput {
    pub chain_id: Felt,
    pub account_address: Felt,
    pub nonce: Felt,
    pub timestamp: i64,
}

#[derive(Debug, Clone)]
pub struct SessionTransactionInput {
    pub chain_id: Felt,
    pub account_address: Felt,
    pub session_key: Felt,
    pub nonce: Felt,
    pub valid_until: i64,
    /// Poseidon hash of the encoded call array.
    pub calls_hash: Felt,
}

// ── Shared plumbing ──────────────────────────────────────────────────────────

fn hex_u64(v: i64) -> Result<String, CoreError> {
    let v = u64::try_from(v)
        .map_err(|_| CoreError::InvalidInput(format!("timestamp must be non-negative, got {v}")))?;
    Ok(format!("{v:#x}"))
}

fn domain_json(chain_id: &Felt, account_address: &Felt) -> DomainJson {
    DomainJson {
        name: TYPED_DATA_DOMAIN_NAME,
        version: TYPED_DATA_DOMAIN_VERSION,
        chain_id: felt_to_hex(chain_id),
        verifying_contract: felt_to_hex(account_address),
    }
}

fn domain_hash(chain_id: &Felt, account_address: &Felt) -> Felt {
    struct_hash(
        type_hash(DOMAIN_TYPE, &DOMAIN_FIELDS),
        &[
            short_string_felt(TYPED_DATA_DOMAIN_NAME),
            short_string_felt(TYPED_DATA_DOMAIN_VERSION),
            *chain_id,
            *account_address,
        ],
    )
}

fn finish<M: Serialize>(
    primary_type: &'static str,
    primary_json: PrimaryTypeJson,
    chain_id: &Felt,
    account_address: &Felt,
    message: M,
    message_felts: &[Felt],
    primary_fields: &[(&str, &str)],
) -> Result<BuiltTypedData, CoreError> {
    let payload = TypedDataJson {
        types: TypesJson {
            domain: defs(&DOMAIN_FIELDS),
            primary: primary_json,
        },
        primary_type,
        domain: domain_json(chain_id, account_address),
        message,
    };
    let json = serde_json::to_string(&payload)
        .map_err(|e| CoreError::Internal(format!("typed data encode: {e}")))?;

    let msg_struct = struct_hash(type_hash(primary_type, primary_fields), message_felts);
    let hash = message_hash(domain_hash(chain_id, account_address), *account_address, msg_struct);

    Ok(BuiltTypedData { primary_type, json, message_hash: hash })
}

// ── Builders ─────────────────────────────────────────────────────────────────

/// RegisterSessionKey: 10 fields in fixed order, unused contract slots as the
/// canonical zero felt, integers hex-encoded without leading zeros.
pub fn build_register_session_key(
    input: &RegisterSessionKeyInput,
) -> Result<BuiltTypedData, CoreError> {
    if input.allowed_contracts.len() > MAX_ALLOWED_TARGETS {
        return Err(CoreError::InvalidInput(format!(
            "at most {MAX_ALLOWED_TARGETS} allowed contracts per session"
        )));
    }
    if input.valid_after >= input.valid_until {
        return Err(CoreError::InvalidInput(
            "session validity window is empty (valid_after >= valid_until)".into(),
        ));
    }

    let mut slots = [Felt::ZERO; MAX_ALLOWED_TARGETS];
    for (slot, contract) in slots.iter_mut().zip(input.allowed_contracts.iter()) {
        *slot = *contract;
    }

    #[derive(Serialize)]
    struct Message {
        session_key: String,
        valid_after: String,
        valid_until: String,
        spending_limit_low: String,
        spending_limit_high: String,
        spending_token: String,
        allowed_contract_0: String,
        allowed_contract_1: String,
        allowed_contract_2: String,
        allowed_contract_3: String,
    }

    let message = Message {
        session_key: felt_to_hex(&input.session_key),
        valid_after: hex_u64(input.valid_after)?,
        valid_until: hex_u64(input.valid_until)?,
        spending_limit_low: felt_to_hex(&input.spending_limit.low),
        spending_limit_high: felt_to_hex(&input.spending_limit.high),
        spending_token: felt_to_hex(&input.spending_token),
        allowed_contract_0: felt_to_hex(&slots[0]),
        allowed_contract_1: felt_to_hex(&slots[1]),
        allowed_contract_2: felt_to_hex(&slots[2]),
        allowed_contract_3: felt_to_hex(&slots[3]),
    };

    let felts = [
        input.session_key,
        Felt::from(input.valid_after as u64),
        Felt::from(input.valid_until as u64),
        input.spending_limit.low,
        input.spending_limit.high,
        input.spending_token,
        slots[0],
        slots[1],
        slots[2],
        slots[3],
    ];

    finish(
        REGISTER_TYPE,
        PrimaryTypeJson::Register { fields: defs(&REGISTER_FIELDS) },
        &input.chain_id,
        &input.account_address,
        message,
        &felts,
        &REGISTER_FIELDS,
    )
}

pub fn build_revoke_session_key(input: &RevokeSessionKeyInput) -> Result<BuiltTypedData, CoreError> {
    #[derive(Serialize)]
    struct Message {
        session_key: String,
    }

    finish(
        REVOKE_TYPE,
        PrimaryTypeJson::Revoke { fields: defs(&REVOKE_FIELDS) },
        &input.chain_id,
        &input.account_address,
        Message { session_key: felt_to_hex(&input.session_key) },
        &[input.session_key],
        &REVOKE_FIELDS,
    )
}

pub fn build_emergency_revoke_all(
    input: &EmergencyRevokeAllInput,
) -> Result<BuiltTypedData, CoreError> {
    #[derive(Serialize)]
    struct Message {
        nonce: String,
        timestamp: String,
    }

    finish(
        EMERGENCY_TYPE,
        PrimaryTypeJson::Emergency { fields: defs(&EMERGENCY_FIELDS) },
        &input.chain_id,
        &input.account_address,
        Message {
            nonce: felt_to_hex(&input.nonce),
            timestamp: hex_u64(input.timestamp)?,
        },
        &[input.nonce, Felt::from(input.timestamp as u64)],
        &EMERGENCY_FIELDS,
    )
}

/// Typed-data binding of a session-signed transaction: session key, account
/// nonce, validity bound, and the Poseidon hash of the call array. The hash
/// doubles as the action correlation id carried through execution records.
pub fn build_session_transaction(
    input: &SessionTransactionInput,
) -> Result<BuiltTypedData, CoreError> {
    #[derive(Serialize)]
    struct Message {
        session_key: String,
        nonce: String,
        valid_until: String,
        calls_hash: String,
    }

    finish(
        SESSION_TX_TYPE,
        PrimaryTypeJson::SessionTx { fields: defs(&SESSION_TX_FIELDS) },
        &input.chain_id,
        &input.account_address,
        Message {
            session_key: felt_to_hex(&input.session_key),
            nonce: felt_to_hex(&input.nonce),
            valid_until: hex_u64(input.valid_until)?,
            calls_hash: felt_to_hex(&input.calls_hash),
        },
        &[
            input.session_key,
            input.nonce,
            Felt::from(input.valid_until as u64),
            input.calls_hash,
        ],
        &SESSION_TX_FIELDS,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use starkclaw_core::codec::felt_from_hex;

    fn register_input() -> RegisterSessionKeyInput {
        RegisterSessionKeyInput {
            chain_id: felt_from_hex("0x534e5f5345504f4c4941").unwrap(),
            account_address: felt_from_hex(
                "0x01ef0000000000000000000000000000000000000000000000000000000001ef",
            )
            .unwrap(),
            session_key: felt_from_hex("0xabc123").unwrap(),
            valid_after: 1000,
            valid_until: 2000,
            spending_limit: U256 { low: Felt::from(0x64u8), high: Felt::ZERO },
            spending_token: felt_from_hex(
                "0x049d36570d4e46f48e99674bd3fcc84644ddd6b96f7c741b1562b82f9e004dc7",
            )
            .unwrap(),
            allowed_contracts: vec![
                felt_from_hex("0x0444").unwrap(),
                felt_from_hex("0x0555").unwrap(),
            ],
        }
    }

    #[test]
    fn register_is_byte_deterministic() {
        let a = build_register_session_key(&register_input()).unwrap();
        let b = build_register_session_key(&register_input()).unwrap();
        assert_eq!(a.json.as_bytes(), b.json.as_bytes());
        assert_eq!(a.message_hash, b.message_hash);
    }

    #[test]
    fn register_message_encodes_spec_values() {
        let built = build_register_session_key(&register_input()).unwrap();
        let v: serde_json::Value = serde_json::from_str(&built.json).unwrap();
        assert_eq!(v["primaryType"], "RegisterSessionKey");
        assert_eq!(v["domain"]["name"], "Starkclaw");
        assert_eq!(v["domain"]["version"], "2");
        assert_eq!(v["message"]["valid_after"], "0x3e8");
        assert_eq!(v["message"]["valid_until"], "0x7d0");
        assert_eq!(v["message"]["spending_limit_low"], "0x64");
        assert_eq!(v["message"]["spending_limit_high"], "0x0");
        assert_eq!(v["message"]["allowed_contract_0"], "0x444");
        assert_eq!(v["message"]["allowed_contract_1"], "0x555");
        assert_eq!(v["message"]["allowed_contract_2"], "0x0");
        assert_eq!(v["message"]["allowed_contract_3"], "0x0");
    }

    #[test]
    fn register_field_order_is_fixed() {
        let built = build_register_session_key(&register_input()).unwrap();
        // The serialized message object must list fields in declaration
        // order, never alphabetized.
        let msg_start = built.json.find("\"message\":").unwrap();
        let tail = &built.json[msg_start..];
        let positions: Vec<usize> = [
            "session_key",
            "valid_after",
            "valid_until",
            "spending_limit_low",
            "spending_limit_high",
            "spending_token",
            "allowed_contract_0",
            "allowed_contract_1",
            "allowed_contract_2",
            "allowed_contract_3",
        ]
        .iter()
        .map(|f| tail.find(&format!("\"{f}\"")).unwrap())
        .collect();
        let mut sorted = positions.clone();
        sorted.sort_unstable();
        assert_eq!(positions, sorted);
    }

    #[test]
    fn changing_account_changes_payload_and_hash() {
        let a = build_register_session_key(&register_input()).unwrap();
        let mut input = register_input();
        input.account_address = felt_from_hex("0x02").unwrap();
        let b = build_register_session_key(&input).unwrap();
        assert_ne!(a.json, b.json);
        assert_ne!(a.message_hash, b.message_hash);
    }

    #[test]
    fn domain_version_is_always_two() {
        let built = build_revoke_session_key(&RevokeSessionKeyInput {
            chain_id: Felt::ONE,
            account_address: Felt::TWO,
            session_key: Felt::THREE,
        })
        .unwrap();
        let v: serde_json::Value = serde_json::from_str(&built.json).unwrap();
        assert_eq!(v["domain"]["version"], "2");

        let built = build_emergency_revoke_all(&EmergencyRevokeAllInput {
            chain_id: Felt::ONE,
            account_address: Felt::TWO,
            nonce: Felt::THREE,
            timestamp: 1_700_000_000,
        })
        .unwrap();
        let v: serde_json::Value = serde_json::from_str(&built.json).unwrap();
        assert_eq!(v["domain"]["version"], "2");
    }

    #[test]
    fn register_rejects_oversized_contract_list() {
        let mut input = register_input();
        input.allowed_contracts = (0..5u8).map(Felt::from).collect();
        assert!(build_register_session_key(&input).is_err());
    }

    #[test]
    fn register_rejects_empty_window() {
        let mut input = register_input();
        input.valid_until = input.valid_after;
        assert!(build_register_session_key(&input).is_err());
    }

    #[test]
    fn session_transaction_binds_calls_hash() {
        let base = SessionTransactionInput {
            chain_id: Felt::ONE,
            account_address: Felt::TWO,
            session_key: Felt::THREE,
            nonce: Felt::from(9u8),
            valid_until: 2000,
            calls_hash: Felt::from(77u8),
        };
        let a = build_session_transaction(&base).unwrap();
        let mut other = base.clone();
        other.calls_hash = Felt::from(78u8);
        let b = build_session_transaction(&other).unwrap();
        assert_ne!(a.message_hash, b.message_hash);
    }
}
