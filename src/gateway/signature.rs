use sha2::{Digest, Sha256};

/// Integrity signature the gateway uses to verify a payment request came from
/// this backend: lowercase hex SHA-256 over reference, amount, currency and
/// the integrity key, concatenated in that order with no separators.
pub fn integrity_signature(
    reference: &str,
    amount_in_cents: i64,
    currency: &str,
    integrity_key: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(reference.as_bytes());
    hasher.update(amount_in_cents.to_string().as_bytes());
    hasher.update(currency.as_bytes());
    hasher.update(integrity_key.as_bytes());
    hex::encode(hasher.finalize())
}
