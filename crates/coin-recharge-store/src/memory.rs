//! In-memory storage implementation.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use coin_recharge_core::{
    Account, CreditTransaction, EntryDraft, OrderStatus, RechargeOrder, ReferenceType,
    TransactionId, Transition, UserId,
};

use crate::error::{Result, StoreError};
use crate::{debit_or_credit, transition_loaded, AppliedEntry, Store};

#[derive(Default)]
struct State {
    accounts: HashMap<UserId, Account>,
    orders: HashMap<String, RechargeOrder>,
    transactions: HashMap<TransactionId, CreditTransaction>,
    /// Per-user entry ids in application order.
    transactions_by_user: HashMap<UserId, Vec<TransactionId>>,
    transactions_by_ref: HashMap<(UserId, ReferenceType, String), TransactionId>,
    /// SUCCESS orders without a deposit: order id -> order code.
    orders_unposted: HashMap<String, String>,
}

/// Memory-backed storage. Every mutation runs under one write lock.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| StoreError::Database("memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| StoreError::Database("memory store lock poisoned".into()))
    }
}

impl Store for MemoryStore {
    fn create_account(&self, account: &Account) -> Result<()> {
        let mut state = self.write()?;
        if state.accounts.contains_key(&account.user_id) {
            return Err(StoreError::AccountExists {
                user_id: account.user_id.to_string(),
            });
        }
        state.accounts.insert(account.user_id, account.clone());
        Ok(())
    }

    fn get_account(&self, user_id: &UserId) -> Result<Option<Account>> {
        Ok(self.read()?.accounts.get(user_id).cloned())
    }

    fn create_order(&self, order: &RechargeOrder) -> Result<()> {
        let mut state = self.write()?;
        if state.orders.contains_key(&order.order_code) {
            return Err(StoreError::DuplicateOrderCode {
                order_code: order.order_code.clone(),
            });
        }
        state.orders.insert(order.order_code.clone(), order.clone());
        Ok(())
    }

    fn get_order_by_code(&self, order_code: &str) -> Result<Option<RechargeOrder>> {
        Ok(self.read()?.orders.get(order_code).cloned())
    }

    fn attach_gateway_metadata(
        &self,
        order_code: &str,
        key: &str,
        metadata: serde_json::Value,
    ) -> Result<RechargeOrder> {
        let mut state = self.write()?;
        let order = state
            .orders
            .get_mut(order_code)
            .ok_or_else(|| StoreError::NotFound {
                entity: "order",
                id: order_code.to_string(),
            })?;
        order.attach_metadata(key, metadata);
        Ok(order.clone())
    }

    fn transition_order(&self, order_code: &str, transition: &Transition) -> Result<RechargeOrder> {
        let mut state = self.write()?;
        let current = state
            .orders
            .get(order_code)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                entity: "order",
                id: order_code.to_string(),
            })?;

        let updated = transition_loaded(current, transition)?;
        if updated.status == OrderStatus::Success {
            state
                .orders_unposted
                .insert(updated.id.to_string(), order_code.to_string());
        }
        state.orders.insert(order_code.to_string(), updated.clone());
        Ok(updated)
    }

    fn list_pending_orders_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<RechargeOrder>> {
        let state = self.read()?;
        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|o| o.status == OrderStatus::Pending && o.created_at <= cutoff)
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }

    fn list_unposted_orders(&self) -> Result<Vec<RechargeOrder>> {
        let state = self.read()?;
        let mut orders: Vec<_> = state
            .orders_unposted
            .values()
            .filter_map(|code| state.orders.get(code))
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }

    fn list_orders_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<RechargeOrder>> {
        let state = self.read()?;
        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|o| o.user_id == *user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders.into_iter().skip(offset).take(limit).collect())
    }

    fn apply_entry(&self, draft: EntryDraft) -> Result<AppliedEntry> {
        draft.validate()?;

        let mut state = self.write()?;

        let reference = draft
            .reference_type
            .zip(draft.reference_id.clone())
            .map(|(kind, id)| (draft.user_id, kind, id));
        if let Some(key) = &reference {
            if let Some(existing) = state
                .transactions_by_ref
                .get(key)
                .and_then(|id| state.transactions.get(id))
            {
                return Ok(AppliedEntry {
                    transaction: existing.clone(),
                    created: false,
                });
            }
        }

        let mut account = state
            .accounts
            .get(&draft.user_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                entity: "account",
                id: draft.user_id.to_string(),
            })?;

        let balance_after = debit_or_credit(&mut account, draft.amount)?;
        let transaction = draft.into_transaction(balance_after);

        state.accounts.insert(account.user_id, account);
        state
            .transactions_by_user
            .entry(transaction.user_id)
            .or_default()
            .push(transaction.id);
        if let Some(key) = reference {
            if key.1 == ReferenceType::RechargeOrder {
                state.orders_unposted.remove(&key.2);
            }
            state.transactions_by_ref.insert(key, transaction.id);
        }
        state
            .transactions
            .insert(transaction.id, transaction.clone());

        Ok(AppliedEntry {
            transaction,
            created: true,
        })
    }

    fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Option<CreditTransaction>> {
        Ok(self.read()?.transactions.get(transaction_id).cloned())
    }

    fn find_transaction_by_reference(
        &self,
        user_id: &UserId,
        reference_type: ReferenceType,
        reference_id: &str,
    ) -> Result<Option<CreditTransaction>> {
        let state = self.read()?;
        Ok(state
            .transactions_by_ref
            .get(&(*user_id, reference_type, reference_id.to_string()))
            .and_then(|id| state.transactions.get(id))
            .cloned())
    }

    fn list_transactions_by_user(&self, user_id: &UserId) -> Result<Vec<CreditTransaction>> {
        let state = self.read()?;
        Ok(state
            .transactions_by_user
            .get(user_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.transactions.get(id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coin_recharge_core::{Category, Gateway, TransactionType, UserRole};

    fn store_with_account(balance: i64) -> (MemoryStore, UserId) {
        let store = MemoryStore::new();
        let user_id = UserId::generate();
        store
            .create_account(&Account::new(user_id, UserRole::Candidate))
            .unwrap();
        if balance > 0 {
            store.apply_entry(bonus(user_id, balance)).unwrap();
        }
        (store, user_id)
    }

    fn bonus(user_id: UserId, amount: i64) -> EntryDraft {
        EntryDraft {
            user_id,
            transaction_type: TransactionType::Deposit,
            category: Category::Bonus,
            amount,
            description: "bonus".into(),
            reference_id: None,
            reference_type: None,
            metadata: serde_json::Value::Null,
        }
    }

    fn pending(user_id: UserId, code: &str) -> RechargeOrder {
        RechargeOrder::pending(user_id, 500, 50_000, Gateway::MoMo, code.into())
    }

    #[test]
    fn create_account_twice_fails() {
        let (store, user_id) = store_with_account(0);
        let result = store.create_account(&Account::new(user_id, UserRole::Employer));
        assert!(matches!(result, Err(StoreError::AccountExists { .. })));
    }

    #[test]
    fn duplicate_order_code_rejected() {
        let (store, user_id) = store_with_account(0);
        store.create_order(&pending(user_id, "MOMO1")).unwrap();

        let result = store.create_order(&pending(user_id, "MOMO1"));
        assert!(matches!(result, Err(StoreError::DuplicateOrderCode { .. })));
    }

    #[test]
    fn transition_is_conditional() {
        let (store, user_id) = store_with_account(0);
        store.create_order(&pending(user_id, "MOMO2")).unwrap();

        let done = store
            .transition_order("MOMO2", &Transition::success(serde_json::Value::Null))
            .unwrap();
        assert_eq!(done.status, OrderStatus::Success);

        let late = store.transition_order(
            "MOMO2",
            &Transition::failed("payment timeout", serde_json::Value::Null),
        );
        match late {
            Err(StoreError::AlreadyTerminal { order }) => {
                assert_eq!(order.status, OrderStatus::Success);
            }
            other => panic!("expected AlreadyTerminal, got {other:?}"),
        }

        let stored = store.get_order_by_code("MOMO2").unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Success);
        assert!(stored.failure_reason.is_none());
    }

    #[test]
    fn transition_to_pending_rejected() {
        let (store, user_id) = store_with_account(0);
        store.create_order(&pending(user_id, "MOMO3")).unwrap();

        let bad = Transition {
            to: OrderStatus::Pending,
            reason: None,
            metadata: serde_json::Value::Null,
        };
        assert!(matches!(
            store.transition_order("MOMO3", &bad),
            Err(StoreError::InvalidTransition(_))
        ));
    }

    #[test]
    fn transition_unknown_order_is_not_found() {
        let store = MemoryStore::new();
        let result =
            store.transition_order("nope", &Transition::success(serde_json::Value::Null));
        assert!(matches!(result, Err(StoreError::NotFound { entity: "order", .. })));
    }

    #[test]
    fn pending_listing_respects_cutoff() {
        let (store, user_id) = store_with_account(0);
        let mut old = pending(user_id, "MOMO-old");
        old.created_at = Utc::now() - chrono::Duration::minutes(30);
        store.create_order(&old).unwrap();
        store.create_order(&pending(user_id, "MOMO-new")).unwrap();

        let stale = store
            .list_pending_orders_before(Utc::now() - chrono::Duration::minutes(15))
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].order_code, "MOMO-old");
    }

    #[test]
    fn apply_entry_moves_balance_and_appends() {
        let (store, user_id) = store_with_account(100);

        let usage = EntryDraft {
            user_id,
            transaction_type: TransactionType::Usage,
            category: Category::CvUnlock,
            amount: -30,
            description: "unlock".into(),
            reference_id: Some("cv-1".into()),
            reference_type: Some(ReferenceType::Cv),
            metadata: serde_json::Value::Null,
        };
        let applied = store.apply_entry(usage).unwrap();
        assert!(applied.created);
        assert_eq!(applied.transaction.balance_after, 70);

        let account = store.get_account(&user_id).unwrap().unwrap();
        assert_eq!(account.coin_balance, 70);
        assert_eq!(store.list_transactions_by_user(&user_id).unwrap().len(), 2);
    }

    #[test]
    fn apply_entry_is_idempotent_per_reference() {
        let (store, user_id) = store_with_account(0);
        let order = pending(user_id, "MOMO4");

        let first = store.apply_entry(EntryDraft::recharge(&order)).unwrap();
        let second = store.apply_entry(EntryDraft::recharge(&order)).unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.transaction.id, second.transaction.id);
        assert_eq!(store.get_account(&user_id).unwrap().unwrap().coin_balance, 500);

        let found = store
            .find_transaction_by_reference(
                &user_id,
                ReferenceType::RechargeOrder,
                &order.id.to_string(),
            )
            .unwrap()
            .unwrap();
        assert_eq!(found.id, first.transaction.id);
    }

    #[test]
    fn same_reference_is_separate_per_user() {
        let (store, first) = store_with_account(100);
        let second = UserId::generate();
        store
            .create_account(&Account::new(second, UserRole::Candidate))
            .unwrap();
        store.apply_entry(bonus(second, 100)).unwrap();

        let view = |user_id| EntryDraft {
            user_id,
            transaction_type: TransactionType::Usage,
            category: Category::JobView,
            amount: -10,
            description: "viewed job".into(),
            reference_id: Some("job-42".into()),
            reference_type: Some(ReferenceType::Job),
            metadata: serde_json::Value::Null,
        };
        let a = store.apply_entry(view(first)).unwrap();
        let b = store.apply_entry(view(second)).unwrap();

        assert!(a.created);
        assert!(b.created);
        assert_eq!(b.transaction.user_id, second);
        assert_ne!(a.transaction.id, b.transaction.id);
        assert_eq!(store.get_account(&first).unwrap().unwrap().coin_balance, 90);
        assert_eq!(store.get_account(&second).unwrap().unwrap().coin_balance, 90);

        let found = store
            .find_transaction_by_reference(&second, ReferenceType::Job, "job-42")
            .unwrap()
            .unwrap();
        assert_eq!(found.id, b.transaction.id);
    }

    #[test]
    fn unposted_index_tracks_success_until_deposit() {
        let (store, user_id) = store_with_account(0);
        let paid = pending(user_id, "MOMO5");
        store.create_order(&paid).unwrap();
        store.create_order(&pending(user_id, "MOMO6")).unwrap();
        assert!(store.list_unposted_orders().unwrap().is_empty());

        store
            .transition_order("MOMO5", &Transition::success(serde_json::Value::Null))
            .unwrap();
        store
            .transition_order(
                "MOMO6",
                &Transition::failed("payment timeout", serde_json::Value::Null),
            )
            .unwrap();

        let unposted = store.list_unposted_orders().unwrap();
        assert_eq!(unposted.len(), 1);
        assert_eq!(unposted[0].order_code, "MOMO5");

        store.apply_entry(EntryDraft::recharge(&paid)).unwrap();
        assert!(store.list_unposted_orders().unwrap().is_empty());
    }

    #[test]
    fn apply_entry_rejects_overdraft() {
        let (store, user_id) = store_with_account(10);
        let usage = EntryDraft {
            user_id,
            transaction_type: TransactionType::Usage,
            category: Category::JobPost,
            amount: -11,
            description: "post".into(),
            reference_id: None,
            reference_type: None,
            metadata: serde_json::Value::Null,
        };

        assert!(matches!(
            store.apply_entry(usage),
            Err(StoreError::InsufficientCredits {
                balance: 10,
                required: 11
            })
        ));
        assert_eq!(store.list_transactions_by_user(&user_id).unwrap().len(), 1);
    }

    #[test]
    fn apply_entry_rejects_sign_mismatch_without_writing() {
        let (store, user_id) = store_with_account(0);
        let result = store.apply_entry(bonus(user_id, -5));

        assert!(matches!(result, Err(StoreError::InvalidEntry(_))));
        assert!(store.list_transactions_by_user(&user_id).unwrap().is_empty());
    }

    #[test]
    fn apply_entry_unknown_account() {
        let store = MemoryStore::new();
        let result = store.apply_entry(bonus(UserId::generate(), 5));
        assert!(matches!(result, Err(StoreError::NotFound { entity: "account", .. })));
    }
}
