//! `RocksDB` storage implementation.
//!
//! `RocksDB` has no compare-and-swap, so every read-modify-write goes through
//! `write_lock` and lands as one `WriteBatch`. Reads never take the lock.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};

use coin_recharge_core::{
    Account, CreditTransaction, EntryDraft, OrderStatus, RechargeOrder, ReferenceType,
    TransactionId, Transition, UserId,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::{debit_or_credit, transition_loaded, AppliedEntry, Store};

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| StoreError::Database("write lock poisoned".into()))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn get_value<T: serde::de::DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn write(&self, batch: WriteBatch) -> Result<()> {
        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// Keys in `cf_name` starting with `prefix`, in key order.
    fn prefix_keys(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        let cf = self.cf(cf_name)?;
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix, Direction::Forward));

        let mut found = Vec::new();
        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(prefix) {
                break;
            }
            found.push(key.to_vec());
        }
        Ok(found)
    }

    fn load_order(&self, order_code: &str) -> Result<RechargeOrder> {
        self.get_order_by_code(order_code)?
            .ok_or_else(|| StoreError::NotFound {
                entity: "order",
                id: order_code.to_string(),
            })
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Account Operations
    // =========================================================================

    fn create_account(&self, account: &Account) -> Result<()> {
        let _guard = self.lock()?;
        let key = keys::account_key(&account.user_id);
        if self.get_value::<Account>(cf::ACCOUNTS, &key)?.is_some() {
            return Err(StoreError::AccountExists {
                user_id: account.user_id.to_string(),
            });
        }

        let cf = self.cf(cf::ACCOUNTS)?;
        self.db
            .put_cf(&cf, key, Self::serialize(account)?)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn get_account(&self, user_id: &UserId) -> Result<Option<Account>> {
        self.get_value(cf::ACCOUNTS, &keys::account_key(user_id))
    }

    // =========================================================================
    // Order Operations
    // =========================================================================

    fn create_order(&self, order: &RechargeOrder) -> Result<()> {
        let _guard = self.lock()?;
        if self.get_order_by_code(&order.order_code)?.is_some() {
            return Err(StoreError::DuplicateOrderCode {
                order_code: order.order_code.clone(),
            });
        }

        let cf_orders = self.cf(cf::ORDERS)?;
        let cf_by_user = self.cf(cf::ORDERS_BY_USER)?;
        let cf_pending = self.cf(cf::ORDERS_PENDING)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_orders, keys::order_key(&order.order_code), Self::serialize(order)?);
        batch.put_cf(
            &cf_by_user,
            keys::user_order_key(&order.user_id, &order.order_code),
            b"",
        );
        if order.status == OrderStatus::Pending {
            batch.put_cf(
                &cf_pending,
                keys::pending_order_key(order.created_at, &order.order_code),
                b"",
            );
        }

        self.write(batch)
    }

    fn get_order_by_code(&self, order_code: &str) -> Result<Option<RechargeOrder>> {
        self.get_value(cf::ORDERS, &keys::order_key(order_code))
    }

    fn attach_gateway_metadata(
        &self,
        order_code: &str,
        key: &str,
        metadata: serde_json::Value,
    ) -> Result<RechargeOrder> {
        let _guard = self.lock()?;
        let mut order = self.load_order(order_code)?;
        order.attach_metadata(key, metadata);

        let cf = self.cf(cf::ORDERS)?;
        self.db
            .put_cf(&cf, keys::order_key(order_code), Self::serialize(&order)?)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(order)
    }

    fn transition_order(&self, order_code: &str, transition: &Transition) -> Result<RechargeOrder> {
        let _guard = self.lock()?;
        let current = self.load_order(order_code)?;
        let created_at = current.created_at;
        let updated = transition_loaded(current, transition)?;

        let cf_orders = self.cf(cf::ORDERS)?;
        let cf_pending = self.cf(cf::ORDERS_PENDING)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_orders, keys::order_key(order_code), Self::serialize(&updated)?);
        batch.delete_cf(&cf_pending, keys::pending_order_key(created_at, order_code));
        if updated.status == OrderStatus::Success {
            let cf_unposted = self.cf(cf::ORDERS_UNPOSTED)?;
            batch.put_cf(
                &cf_unposted,
                keys::unposted_order_key(&updated.id.to_string()),
                order_code.as_bytes(),
            );
        }
        self.write(batch)?;

        Ok(updated)
    }

    fn list_pending_orders_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<RechargeOrder>> {
        let cf = self.cf(cf::ORDERS_PENDING)?;
        let upper = keys::pending_cutoff_key(cutoff);

        let mut codes = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if key.as_ref() >= upper.as_slice() {
                break;
            }
            if let Some(code) = keys::order_code_from_pending_key(&key) {
                codes.push(code);
            }
        }

        let mut orders = Vec::with_capacity(codes.len());
        for code in codes {
            // The index may briefly lag a concurrent transition.
            if let Some(order) = self.get_order_by_code(&code)? {
                if order.status == OrderStatus::Pending {
                    orders.push(order);
                }
            }
        }
        Ok(orders)
    }

    fn list_unposted_orders(&self) -> Result<Vec<RechargeOrder>> {
        let cf = self.cf(cf::ORDERS_UNPOSTED)?;
        let mut codes = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            codes.push(String::from_utf8_lossy(&value).into_owned());
        }

        let mut orders = Vec::with_capacity(codes.len());
        for code in codes {
            if let Some(order) = self.get_order_by_code(&code)? {
                orders.push(order);
            }
        }
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }

    fn list_orders_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<RechargeOrder>> {
        let prefix = keys::user_prefix(user_id);
        let mut orders = Vec::new();
        for key in self.prefix_keys(cf::ORDERS_BY_USER, &prefix)? {
            let code = String::from_utf8_lossy(&key[prefix.len()..]).into_owned();
            if let Some(order) = self.get_order_by_code(&code)? {
                orders.push(order);
            }
        }
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders.into_iter().skip(offset).take(limit).collect())
    }

    // =========================================================================
    // Ledger Operations
    // =========================================================================

    fn apply_entry(&self, draft: EntryDraft) -> Result<AppliedEntry> {
        draft.validate()?;

        let _guard = self.lock()?;

        let reference_key = draft
            .reference_type
            .zip(draft.reference_id.as_deref())
            .map(|(kind, id)| keys::reference_key(&draft.user_id, kind, id));
        let unposted_key = match (draft.reference_type, draft.reference_id.as_deref()) {
            (Some(ReferenceType::RechargeOrder), Some(id)) => Some(keys::unposted_order_key(id)),
            _ => None,
        };

        if let Some(key) = &reference_key {
            let cf_ref = self.cf(cf::TRANSACTIONS_BY_REF)?;
            let existing = self
                .db
                .get_cf(&cf_ref, key)
                .map_err(|e| StoreError::Database(e.to_string()))?
                .as_deref()
                .and_then(keys::transaction_id_from_value);
            if let Some(id) = existing {
                if let Some(transaction) = self.get_transaction(&id)? {
                    return Ok(AppliedEntry {
                        transaction,
                        created: false,
                    });
                }
            }
        }

        let mut account = self
            .get_account(&draft.user_id)?
            .ok_or_else(|| StoreError::NotFound {
                entity: "account",
                id: draft.user_id.to_string(),
            })?;

        let balance_after = debit_or_credit(&mut account, draft.amount)?;
        let transaction = draft.into_transaction(balance_after);

        let cf_accounts = self.cf(cf::ACCOUNTS)?;
        let cf_tx = self.cf(cf::TRANSACTIONS)?;
        let cf_tx_by_user = self.cf(cf::TRANSACTIONS_BY_USER)?;
        let cf_ref = self.cf(cf::TRANSACTIONS_BY_REF)?;

        // Write atomically
        let mut batch = WriteBatch::default();
        batch.put_cf(
            &cf_accounts,
            keys::account_key(&account.user_id),
            Self::serialize(&account)?,
        );
        batch.put_cf(
            &cf_tx,
            keys::transaction_key(&transaction.id),
            Self::serialize(&transaction)?,
        );
        batch.put_cf(
            &cf_tx_by_user,
            keys::user_transaction_key(&transaction.user_id, &transaction.id),
            b"",
        );
        if let Some(key) = reference_key {
            batch.put_cf(&cf_ref, key, transaction.id.to_bytes());
        }
        if let Some(key) = unposted_key {
            let cf_unposted = self.cf(cf::ORDERS_UNPOSTED)?;
            batch.delete_cf(&cf_unposted, key);
        }
        self.write(batch)?;

        Ok(AppliedEntry {
            transaction,
            created: true,
        })
    }

    fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Option<CreditTransaction>> {
        self.get_value(cf::TRANSACTIONS, &keys::transaction_key(transaction_id))
    }

    fn find_transaction_by_reference(
        &self,
        user_id: &UserId,
        reference_type: ReferenceType,
        reference_id: &str,
    ) -> Result<Option<CreditTransaction>> {
        let cf = self.cf(cf::TRANSACTIONS_BY_REF)?;
        let id = self
            .db
            .get_cf(&cf, keys::reference_key(user_id, reference_type, reference_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .as_deref()
            .and_then(keys::transaction_id_from_value);

        match id {
            Some(id) => self.get_transaction(&id),
            None => Ok(None),
        }
    }

    fn list_transactions_by_user(&self, user_id: &UserId) -> Result<Vec<CreditTransaction>> {
        let prefix = keys::user_prefix(user_id);
        let mut transactions = Vec::new();
        for key in self.prefix_keys(cf::TRANSACTIONS_BY_USER, &prefix)? {
            let Some(id) = keys::transaction_id_from_user_key(&key) else {
                continue;
            };
            if let Some(tx) = self.get_transaction(&id)? {
                transactions.push(tx);
            }
        }
        Ok(transactions)
    }
}
