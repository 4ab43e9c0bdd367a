//! Account store - balances and the execution semantics of each operation kind

use std::collections::BTreeMap;

use ledger_core::{AccountId, Balance, LedgerError, LedgerResult, OpKind};

/// Why an operation had no effect when executed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyExists,
    NotFound,
    Protected,
    SameAccount,
    NonPositiveAmount,
    InsufficientFunds,
}

/// Result of executing a stable operation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecOutcome {
    Applied,
    Skipped(SkipReason),
}

/// Account balances of one replica
#[derive(Clone, Debug)]
pub struct AccountStore {
    balances: BTreeMap<AccountId, Balance>,
}

impl AccountStore {
    /// Create a store holding only the broker account
    pub fn new(broker_balance: Balance) -> Self {
        let mut balances = BTreeMap::new();
        balances.insert(AccountId::broker(), broker_balance);
        AccountStore { balances }
    }

    pub fn exists(&self, account: &str) -> bool {
        self.balances.contains_key(account)
    }

    pub fn balance(&self, account: &str) -> Option<Balance> {
        self.balances.get(account).copied()
    }

    /// Get number of accounts
    pub fn len(&self) -> usize {
        self.balances.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }

    /// Iterate over all accounts, sorted by id
    pub fn iter(&self) -> impl Iterator<Item = (&AccountId, Balance)> {
        self.balances.iter().map(|(a, &b)| (a, b))
    }

    /// Sum of all balances
    pub fn total_balance(&self) -> Balance {
        self.balances.values().sum()
    }

    fn require(&self, account: &AccountId) -> LedgerResult<Balance> {
        self.balance(account.as_str())
            .ok_or_else(|| LedgerError::AccountNotFound(account.clone()))
    }

    /// Admission checks against the current balances
    pub fn validate(&self, kind: &OpKind) -> LedgerResult<()> {
        match kind {
            OpKind::CreateAccount { account } => {
                if self.exists(account.as_str()) {
                    return Err(LedgerError::AccountAlreadyExists(account.clone()));
                }
            }
            OpKind::DeleteAccount { account } => {
                let balance = self.require(account)?;
                if account.is_broker() {
                    return Err(LedgerError::ProtectedAccount(account.clone()));
                }
                if balance != 0 {
                    return Err(LedgerError::AccountNotEmpty {
                        account: account.clone(),
                        balance,
                    });
                }
            }
            OpKind::Transfer { from, to, amount } => {
                let balance = self.require(from)?;
                self.require(to)?;
                if *amount <= 0 {
                    return Err(LedgerError::NonPositiveAmount(*amount));
                }
                if from == to {
                    return Err(LedgerError::SameAccount(from.clone()));
                }
                if balance < *amount as Balance {
                    return Err(LedgerError::InsufficientFunds {
                        account: from.clone(),
                        balance,
                        amount: *amount,
                    });
                }
            }
        }
        Ok(())
    }

    /// Apply a stable operation; never fails, skips when preconditions no longer hold
    pub fn execute(&mut self, kind: &OpKind) -> ExecOutcome {
        match kind {
            OpKind::CreateAccount { account } => {
                if self.exists(account.as_str()) {
                    return ExecOutcome::Skipped(SkipReason::AlreadyExists);
                }
                self.balances.insert(account.clone(), 0);
            }
            OpKind::DeleteAccount { account } => {
                if account.is_broker() {
                    return ExecOutcome::Skipped(SkipReason::Protected);
                }
                if self.balances.remove(account.as_str()).is_none() {
                    return ExecOutcome::Skipped(SkipReason::NotFound);
                }
            }
            OpKind::Transfer { from, to, amount } => {
                if from == to {
                    return ExecOutcome::Skipped(SkipReason::SameAccount);
                }
                let (Some(source), true) = (self.balance(from.as_str()), self.exists(to.as_str()))
                else {
                    return ExecOutcome::Skipped(SkipReason::NotFound);
                };
                if *amount <= 0 {
                    return ExecOutcome::Skipped(SkipReason::NonPositiveAmount);
                }
                let amount = *amount as Balance;
                if source < amount {
                    return ExecOutcome::Skipped(SkipReason::InsufficientFunds);
                }
                if let Some(b) = self.balances.get_mut(from.as_str()) {
                    *b -= amount;
                }
                if let Some(b) = self.balances.get_mut(to.as_str()) {
                    *b += amount;
                }
            }
        }
        ExecOutcome::Applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::BROKER_INITIAL_BALANCE;

    fn create(account: &str) -> OpKind {
        OpKind::CreateAccount {
            account: account.into(),
        }
    }

    fn transfer(from: &str, to: &str, amount: i64) -> OpKind {
        OpKind::Transfer {
            from: from.into(),
            to: to.into(),
            amount,
        }
    }

    #[test]
    fn test_fresh_store_has_broker() {
        let store = AccountStore::new(BROKER_INITIAL_BALANCE);
        assert_eq!(store.len(), 1);
        assert_eq!(store.balance("broker"), Some(BROKER_INITIAL_BALANCE));
    }

    #[test]
    fn test_validate_create() {
        let mut store = AccountStore::new(100);
        assert!(store.validate(&create("u1")).is_ok());
        store.execute(&create("u1"));
        assert_eq!(
            store.validate(&create("u1")),
            Err(LedgerError::AccountAlreadyExists("u1".into()))
        );
    }

    #[test]
    fn test_validate_delete() {
        let mut store = AccountStore::new(100);
        let delete = |a: &str| OpKind::DeleteAccount { account: a.into() };

        assert!(matches!(
            store.validate(&delete("ghost")),
            Err(LedgerError::AccountNotFound(_))
        ));
        assert!(matches!(
            store.validate(&delete("broker")),
            Err(LedgerError::ProtectedAccount(_))
        ));

        store.execute(&create("u1"));
        store.execute(&transfer("broker", "u1", 5));
        assert_eq!(
            store.validate(&delete("u1")),
            Err(LedgerError::AccountNotEmpty {
                account: "u1".into(),
                balance: 5
            })
        );
    }

    #[test]
    fn test_validate_transfer() {
        let mut store = AccountStore::new(100);
        store.execute(&create("u1"));

        assert!(store.validate(&transfer("broker", "u1", 100)).is_ok());
        assert!(matches!(
            store.validate(&transfer("broker", "ghost", 1)),
            Err(LedgerError::AccountNotFound(_))
        ));
        assert_eq!(
            store.validate(&transfer("broker", "u1", 0)),
            Err(LedgerError::NonPositiveAmount(0))
        );
        assert!(matches!(
            store.validate(&transfer("broker", "broker", 1)),
            Err(LedgerError::SameAccount(_))
        ));
        assert!(matches!(
            store.validate(&transfer("u1", "broker", 1)),
            Err(LedgerError::InsufficientFunds { .. })
        ));
    }

    #[test]
    fn test_execute_is_effect_safe() {
        let mut store = AccountStore::new(10);
        assert_eq!(store.execute(&create("u1")), ExecOutcome::Applied);
        assert_eq!(
            store.execute(&create("u1")),
            ExecOutcome::Skipped(SkipReason::AlreadyExists)
        );
        assert_eq!(
            store.execute(&transfer("broker", "u1", 11)),
            ExecOutcome::Skipped(SkipReason::InsufficientFunds)
        );
        assert_eq!(
            store.execute(&OpKind::DeleteAccount {
                account: "ghost".into()
            }),
            ExecOutcome::Skipped(SkipReason::NotFound)
        );
        assert_eq!(store.balance("broker"), Some(10));
    }

    #[test]
    fn test_transfer_conserves_total() {
        let mut store = AccountStore::new(50);
        store.execute(&create("u1"));
        store.execute(&create("u2"));
        store.execute(&transfer("broker", "u1", 20));
        store.execute(&transfer("u1", "u2", 15));

        assert_eq!(store.total_balance(), 50);
        assert_eq!(store.balance("u1"), Some(5));
        assert_eq!(store.balance("u2"), Some(15));
    }

    #[test]
    fn test_execute_deletes_funded_account() {
        let mut store = AccountStore::new(50);
        store.execute(&create("u1"));
        store.execute(&transfer("broker", "u1", 20));

        let delete = OpKind::DeleteAccount {
            account: "u1".into(),
        };
        assert!(store.validate(&delete).is_err());
        assert_eq!(store.execute(&delete), ExecOutcome::Applied);
        assert!(!store.exists("u1"));
        assert_eq!(store.total_balance(), 30);
    }

    #[test]
    fn test_iter_sorted() {
        let mut store = AccountStore::new(1);
        store.execute(&create("zed"));
        store.execute(&create("amy"));
        let names: Vec<_> = store.iter().map(|(a, _)| a.as_str().to_owned()).collect();
        assert_eq!(names, vec!["amy", "broker", "zed"]);
    }
}
