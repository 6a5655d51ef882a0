use std::sync::Arc;

use crate::merge::{IteratorMergeStrategy, MergeStrategy};
use crate::metadata::{MetaDataRefresher, TableMetaDataCache};
use crate::metrics::EngineMetrics;
use crate::transaction::{SessionTransaction, TransactionStatus, TransactionType};

/// Collaborators of one logical execution, passed explicitly
#[derive(Clone)]
pub struct ExecutionContext {
    pub transaction: Arc<dyn TransactionStatus>,
    pub metadata: Arc<dyn MetaDataRefresher>,
    pub merge_strategy: Arc<dyn MergeStrategy>,
    pub metrics: Arc<EngineMetrics>,
}

impl ExecutionContext {
    pub fn new(transaction_type: TransactionType) -> Self {
        Self {
            transaction: Arc::new(SessionTransaction::new(transaction_type)),
            metadata: Arc::new(TableMetaDataCache::new()),
            merge_strategy: Arc::new(IteratorMergeStrategy),
            metrics: Arc::new(EngineMetrics::new()),
        }
    }

    pub fn with_transaction(mut self, transaction: Arc<dyn TransactionStatus>) -> Self {
        self.transaction = transaction;
        self
    }

    pub fn with_metadata(mut self, metadata: Arc<dyn MetaDataRefresher>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_merge_strategy(mut self, merge_strategy: Arc<dyn MergeStrategy>) -> Self {
        self.merge_strategy = merge_strategy;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<EngineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new(TransactionType::default())
    }
}
