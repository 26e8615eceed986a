//! Key encoding for the `RocksDB` column families.

use chrono::{DateTime, Utc};
use coin_recharge_core::{ReferenceType, TransactionId, UserId};

/// Account key: the raw user id.
#[must_use]
pub fn account_key(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Order key: the order code bytes.
#[must_use]
pub fn order_key(order_code: &str) -> Vec<u8> {
    order_code.as_bytes().to_vec()
}

/// User-order index key.
///
/// Format: `user_id (16 bytes) || order_code`
#[must_use]
pub fn user_order_key(user_id: &UserId, order_code: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(16 + order_code.len());
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(order_code.as_bytes());
    key
}

/// Pending-order index key.
///
/// Format: `created_at millis (8 bytes, big-endian) || order_code`, so a
/// forward scan visits the oldest pending orders first.
#[must_use]
pub fn pending_order_key(created_at: DateTime<Utc>, order_code: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + order_code.len());
    key.extend_from_slice(&millis_be(created_at));
    key.extend_from_slice(order_code.as_bytes());
    key
}

/// Upper bound (exclusive) for pending-order keys created at or before `cutoff`.
#[must_use]
pub fn pending_cutoff_key(cutoff: DateTime<Utc>) -> Vec<u8> {
    let millis = cutoff.timestamp_millis().saturating_add(1);
    encode_millis(millis).to_vec()
}

/// Order code stored after the timestamp prefix of a pending-order key.
#[must_use]
pub fn order_code_from_pending_key(key: &[u8]) -> Option<String> {
    key.get(8..)
        .and_then(|code| std::str::from_utf8(code).ok())
        .map(String::from)
}

/// Ledger entry key.
#[must_use]
pub fn transaction_key(transaction_id: &TransactionId) -> Vec<u8> {
    transaction_id.to_bytes().to_vec()
}

/// User-transaction index key.
///
/// Format: `user_id (16 bytes) || transaction_id (16 bytes)`
///
/// Since ULIDs are time-ordered, a user's entries iterate in creation order.
#[must_use]
pub fn user_transaction_key(user_id: &UserId, transaction_id: &TransactionId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&transaction_id.to_bytes());
    key
}

/// Prefix for every index key belonging to a user.
#[must_use]
pub fn user_prefix(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Extract the transaction ID from a user-transaction index key.
#[must_use]
pub fn transaction_id_from_user_key(key: &[u8]) -> Option<TransactionId> {
    let bytes: [u8; 16] = key.get(16..32)?.try_into().ok()?;
    Some(TransactionId::from_bytes(bytes))
}

/// Extract the transaction ID stored as an index value.
#[must_use]
pub fn transaction_id_from_value(value: &[u8]) -> Option<TransactionId> {
    let bytes: [u8; 16] = value.try_into().ok()?;
    Some(TransactionId::from_bytes(bytes))
}

/// Reference index key.
///
/// Format: `user_id (16 bytes) || reference_type || 0x00 || reference_id`
#[must_use]
pub fn reference_key(
    user_id: &UserId,
    reference_type: ReferenceType,
    reference_id: &str,
) -> Vec<u8> {
    let kind = reference_type.as_str();
    let mut key = Vec::with_capacity(16 + kind.len() + 1 + reference_id.len());
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(kind.as_bytes());
    key.push(0);
    key.extend_from_slice(reference_id.as_bytes());
    key
}

/// Unposted-order index key: the order id as it appears in a recharge
/// entry's `reference_id`.
#[must_use]
pub fn unposted_order_key(order_id: &str) -> Vec<u8> {
    order_id.as_bytes().to_vec()
}

fn millis_be(at: DateTime<Utc>) -> [u8; 8] {
    encode_millis(at.timestamp_millis())
}

/// Order-preserving encoding: flip the sign bit so negative timestamps sort
/// before positive ones.
#[allow(clippy::cast_sign_loss)]
fn encode_millis(millis: i64) -> [u8; 8] {
    ((millis as u64) ^ (1 << 63)).to_be_bytes()
}
