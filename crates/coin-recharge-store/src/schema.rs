//! Column family definitions for the `RocksDB` backend.

/// Column family names.
pub mod cf {
    /// Account records, keyed by `user_id`.
    pub const ACCOUNTS: &str = "accounts";

    /// Recharge orders, keyed by `order_code`.
    pub const ORDERS: &str = "orders";

    /// Index: orders by user, keyed by `user_id || order_code`.
    pub const ORDERS_BY_USER: &str = "orders_by_user";

    /// Index: pending orders, keyed by `created_at_millis (BE) || order_code`.
    /// Entries are removed when the order leaves `Pending`.
    pub const ORDERS_PENDING: &str = "orders_pending";

    /// Index: SUCCESS orders still waiting for their deposit, keyed by order
    /// id. Value is the order code. Entries are removed when the deposit posts.
    pub const ORDERS_UNPOSTED: &str = "orders_unposted";

    /// Ledger entries, keyed by `transaction_id` (ULID).
    pub const TRANSACTIONS: &str = "transactions";

    /// Index: ledger entries by user, keyed by `user_id || transaction_id`.
    /// Value is empty (index only).
    pub const TRANSACTIONS_BY_USER: &str = "transactions_by_user";

    /// Index: ledger entries by causing entity, keyed by
    /// `user_id || reference_type 0x00 reference_id`. Value is the transaction id.
    pub const TRANSACTIONS_BY_REF: &str = "transactions_by_ref";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::ACCOUNTS,
        cf::ORDERS,
        cf::ORDERS_BY_USER,
        cf::ORDERS_PENDING,
        cf::ORDERS_UNPOSTED,
        cf::TRANSACTIONS,
        cf::TRANSACTIONS_BY_USER,
        cf::TRANSACTIONS_BY_REF,
    ]
}
