//! SNIP-12 v2 hashing: keccak-250 type hashes, Poseidon struct hashes, and
//! the signed-message envelope.

use starknet::core::types::Felt;
use starknet::core::utils::starknet_keccak;
use starknet_crypto::poseidon_hash_many;

/// Envelope prefix for every signed message.
const MESSAGE_PREFIX: &str = "StarkNet Message";

/// Encode an ASCII short string as a felt (big-endian bytes, ≤ 31 chars).
pub fn short_string_felt(s: &str) -> Felt {
    debug_assert!(s.len() <= 31, "short string too long: {s}");
    Felt::from_bytes_be_slice(s.as_bytes())
}

/// Hash of a type definition: `starknet_keccak("Name(field1:type1,...)")`.
///
/// The encoding string is assembled from the same ordered field list the
/// JSON payload carries, so the two representations cannot disagree.
pub fn type_hash(name: &str, fields: &[(&str, &str)]) -> Felt {
    let mut encoded = String::with_capacity(64);
    encoded.push_str(name);
    encoded.push('(');
    for (i, (field, ty)) in fields.iter().enumerate() {
        if i > 0 {
            encoded.push(',');
        }
        encoded.push_str(field);
        encoded.push(':');
        encoded.push_str(ty);
    }
    encoded.push(')');
    starknet_keccak(encoded.as_bytes())
}

/// `poseidon_hash_many([type_hash, field values...])`.
pub fn struct_hash(type_hash: Felt, values: &[Felt]) -> Felt {
    let mut elements = Vec::with_capacity(values.len() + 1);
    elements.push(type_hash);
    elements.extend_from_slice(values);
    poseidon_hash_many(&elements)
}

/// The final message hash a signer consumes:
/// `poseidon([keccak("StarkNet Message"), domain_hash, account, struct_hash])`.
pub fn message_hash(domain_hash: Felt, account_address: Felt, message_struct_hash: Felt) -> Felt {
    poseidon_hash_many(&[
        starknet_keccak(MESSAGE_PREFIX.as_bytes()),
        domain_hash,
        account_address,
        message_struct_hash,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_hash_depends_on_field_order() {
        let a = type_hash("T", &[("a", "felt"), ("b", "felt")]);
        let b = type_hash("T", &[("b", "felt"), ("a", "felt")]);
        assert_ne!(a, b);
    }

    #[test]
    fn short_strings_encode_as_ascii_felt() {
        // "2" is 0x32.
        assert_eq!(short_string_felt("2"), Felt::from(0x32u8));
    }

    #[test]
    fn message_hash_binds_the_account() {
        let domain = Felt::from(1u8);
        let msg = Felt::from(2u8);
        let h1 = message_hash(domain, Felt::from(10u8), msg);
        let h2 = message_hash(domain, Felt::from(11u8), msg);
        assert_ne!(h1, h2);
    }
}
