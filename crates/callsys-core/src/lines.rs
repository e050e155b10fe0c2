//! Line registry.
//!
//! Lines live in the record store; this keeps a read-through cache so
//! queue operations do not hit the database to resolve a line id. A miss
//! reloads the cache, so lines created on another instance are found.

use callsys_db::RecordStore;
use callsys_types::{LineId, QueueLine};
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::info;

use crate::config::DefaultLineConfig;
use crate::error::QueueError;
use crate::validate;

/// Cached view of the configured lines.
#[derive(Debug)]
pub struct LineRegistry {
    records: RecordStore,
    cache: RwLock<Vec<QueueLine>>,
}

impl LineRegistry {
    /// Registry over `records`; the cache fills on first use.
    pub fn new(records: RecordStore) -> Self {
        Self {
            records,
            cache: RwLock::new(Vec::new()),
        }
    }

    /// Reload every line from the record store.
    pub async fn refresh(&self) -> Result<Vec<QueueLine>, QueueError> {
        let lines = self.records.list_lines().await?;
        (*self.cache.write().await).clone_from(&lines);
        Ok(lines)
    }

    /// All lines, oldest first.
    pub async fn list(&self) -> Result<Vec<QueueLine>, QueueError> {
        {
            let cache = self.cache.read().await;
            if !cache.is_empty() {
                return Ok(cache.clone());
            }
        }
        self.refresh().await
    }

    /// Resolve a line id.
    pub async fn get(&self, id: LineId) -> Result<QueueLine, QueueError> {
        if let Some(line) = self.cache.read().await.iter().find(|l| l.id == id) {
            return Ok(line.clone());
        }
        self.refresh()
            .await?
            .into_iter()
            .find(|l| l.id == id)
            .ok_or_else(|| QueueError::NotFound(format!("line {id}")))
    }

    /// Resolve a line by its prefix, ignoring case.
    pub async fn by_prefix(&self, prefix: &str) -> Result<QueueLine, QueueError> {
        let wanted = prefix.trim().to_ascii_uppercase();
        if let Some(line) = self.cache.read().await.iter().find(|l| l.prefix == wanted) {
            return Ok(line.clone());
        }
        self.refresh()
            .await?
            .into_iter()
            .find(|l| l.prefix == wanted)
            .ok_or_else(|| QueueError::NotFound(format!("line with prefix {wanted:?}")))
    }

    /// Create a line. Prefixes are unique.
    pub async fn create(
        &self,
        name: &str,
        prefix: &str,
        color: &str,
    ) -> Result<QueueLine, QueueError> {
        let name = validate::name(name)?;
        let prefix = validate::prefix(prefix)?;
        let color = validate::color(color)?;

        if self.refresh().await?.iter().any(|l| l.prefix == prefix) {
            return Err(QueueError::InvalidArgument(format!(
                "prefix {prefix:?} is already in use"
            )));
        }

        let line = QueueLine {
            id: LineId::new(),
            name,
            prefix,
            color,
            created_at: Utc::now(),
        };
        self.records.insert_line(&line).await?;
        self.cache.write().await.push(line.clone());
        info!(line_id = %line.id, prefix = %line.prefix, "line created");
        Ok(line)
    }

    /// Delete a line and return it.
    pub async fn delete(&self, id: LineId) -> Result<QueueLine, QueueError> {
        let line = self.get(id).await?;
        if !self.records.delete_line(id).await? {
            return Err(QueueError::NotFound(format!("line {id}")));
        }
        self.cache.write().await.retain(|l| l.id != id);
        info!(line_id = %id, prefix = %line.prefix, "line deleted");
        Ok(line)
    }

    /// Create the configured default line when no line exists yet.
    pub async fn ensure_default(
        &self,
        config: &DefaultLineConfig,
    ) -> Result<Option<QueueLine>, QueueError> {
        if !self.refresh().await?.is_empty() {
            return Ok(None);
        }
        self.create(&config.name, &config.prefix, &config.color)
            .await
            .map(Some)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_line_created_once() {
        let registry = LineRegistry::new(RecordStore::in_memory());
        let config = DefaultLineConfig::default();
        let created = registry.ensure_default(&config).await.unwrap();
        assert_eq!(created.map(|l| l.prefix), Some("A".to_owned()));
        assert!(registry.ensure_default(&config).await.unwrap().is_none());
        assert_eq!(registry.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_prefix_rejected() {
        let registry = LineRegistry::new(RecordStore::in_memory());
        registry.create("Cashier", "b", "#fff").await.unwrap();
        let err = registry.create("Other", "B", "#000").await.unwrap_err();
        assert!(matches!(err, QueueError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn lookup_by_prefix_and_delete() {
        let records = RecordStore::in_memory();
        let registry = LineRegistry::new(records.clone());
        let line = registry.create("Pharmacy", "P", "#00ff00").await.unwrap();
        assert_eq!(registry.by_prefix("p").await.unwrap().id, line.id);

        registry.delete(line.id).await.unwrap();
        assert!(matches!(
            registry.get(line.id).await,
            Err(QueueError::NotFound(_))
        ));
        assert!(records.list_lines().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn lines_created_elsewhere_are_found_on_miss() {
        let records = RecordStore::in_memory();
        let registry = LineRegistry::new(records.clone());
        registry.list().await.unwrap();

        let other = LineRegistry::new(records);
        let line = other.create("Late", "L", "#123456").await.unwrap();
        assert_eq!(registry.get(line.id).await.unwrap().name, "Late");
    }
}
