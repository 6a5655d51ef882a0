//! Session transaction state as seen by the execution engine
//!
//! The engine only needs one answer from the transaction layer: whether a
//! DDL statement may run right now.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    #[default]
    Local,
    Xa,
    Base,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Local => "local",
            TransactionType::Xa => "xa",
            TransactionType::Base => "base",
        }
    }
}

pub trait TransactionStatus: Send + Sync {
    /// `false` while a distributed (XA) transaction is in progress
    fn is_ddl_allowed_now(&self) -> bool;
}

/// Transaction state of one client session
#[derive(Debug, Default)]
pub struct SessionTransaction {
    transaction_type: TransactionType,
    active: AtomicBool,
}

impl SessionTransaction {
    pub fn new(transaction_type: TransactionType) -> Self {
        Self {
            transaction_type,
            active: AtomicBool::new(false),
        }
    }

    pub fn transaction_type(&self) -> TransactionType {
        self.transaction_type
    }

    pub fn begin(&self) {
        self.active.store(true, Ordering::Release);
        tracing::debug!("{} transaction started", self.transaction_type.as_str());
    }

    pub fn commit(&self) {
        self.active.store(false, Ordering::Release);
        tracing::debug!("{} transaction committed", self.transaction_type.as_str());
    }

    pub fn rollback(&self) {
        self.active.store(false, Ordering::Release);
        tracing::debug!("{} transaction rolled back", self.transaction_type.as_str());
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl TransactionStatus for SessionTransaction {
    fn is_ddl_allowed_now(&self) -> bool {
        !(self.transaction_type == TransactionType::Xa && self.is_active())
    }
}
