use std::collections::HashMap;
use std::sync::Arc;
use parking_lot::RwLock;

/// Statement text per (table, statement name), shared by every session of
/// a store.
///
/// Built lazily on first use. Two sessions racing on the same entry may both
/// build it; the first one inserted wins and both get that value.
#[derive(Debug, Default)]
pub struct StatementCache {
    statements: Arc<RwLock<HashMap<String, HashMap<&'static str, Arc<str>>>>>,
}

impl StatementCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_build<F>(&self, table: &str, name: &'static str, build: F) -> Arc<str>
    where
        F: FnOnce(&str) -> String,
    {
        // Fast path: already built
        {
            let statements = self.statements.read();
            if let Some(sql) = statements.get(table).and_then(|t| t.get(name)) {
                return sql.clone();
            }
        }

        // Slow path: build outside the lock
        let built: Arc<str> = Arc::from(build(table));

        let mut statements = self.statements.write();
        statements
            .entry(table.to_string())
            .or_default()
            .entry(name)
            .or_insert(built)
            .clone()
    }

    /// Drops every statement built for `table`, e.g. after it was recreated.
    pub fn invalidate(&self, table: &str) {
        self.statements.write().remove(table);
    }

    pub fn stats(&self) -> CacheStats {
        let statements = self.statements.read();
        CacheStats {
            tables: statements.len(),
            statements: statements.values().map(HashMap::len).sum(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub tables: usize,
    pub statements: usize,
}

impl Clone for StatementCache {
    fn clone(&self) -> Self {
        StatementCache {
            statements: self.statements.clone(),
        }
    }
}
