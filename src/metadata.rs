use dashmap::DashMap;

/// Reloads table metadata after a schema change
pub trait MetaDataRefresher: Send + Sync {
    fn refresh(&self, logic_table: &str);
}

/// In-process table metadata versions.
///
/// Each refresh bumps the version of the logical table so that anything
/// caching its column layout can notice the change.
#[derive(Debug, Default)]
pub struct TableMetaDataCache {
    versions: DashMap<String, u64>,
}

impl TableMetaDataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current version of `logic_table`, 0 when it was never refreshed
    pub fn version(&self, logic_table: &str) -> u64 {
        self.versions
            .get(&logic_table.to_ascii_lowercase())
            .map(|v| *v)
            .unwrap_or(0)
    }

    pub fn tables(&self) -> Vec<String> {
        let mut tables: Vec<String> = self.versions.iter().map(|e| e.key().clone()).collect();
        tables.sort();
        tables
    }
}

impl MetaDataRefresher for TableMetaDataCache {
    fn refresh(&self, logic_table: &str) {
        let mut version = self
            .versions
            .entry(logic_table.to_ascii_lowercase())
            .or_insert(0);
        *version += 1;
        tracing::info!("Reloaded metadata of table '{}' (version {})", logic_table, *version);
    }
}
