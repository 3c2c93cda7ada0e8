// Process settings and store bootstrap

use anyhow::{Context, Result};
use queuectl_core::port::TimeProvider;
use queuectl_infra_sqlite::{create_pool_at, run_migrations, SqliteJobStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Where the queue lives
#[derive(Debug, Clone)]
pub struct Settings {
    pub db_path: PathBuf,
}

impl Settings {
    /// `~` and `$VAR` are expanded; unknown variables are left as written
    pub fn from_raw_path(raw: &str) -> Self {
        let expanded = shellexpand::full(raw)
            .map(|p| p.into_owned())
            .unwrap_or_else(|_| shellexpand::tilde(raw).into_owned());
        Self {
            db_path: PathBuf::from(expanded),
        }
    }

    /// Open (creating if needed) the database and bring the schema up to date
    pub async fn open_store(&self, time_provider: Arc<dyn TimeProvider>) -> Result<SqliteJobStore> {
        if let Some(parent) = self.db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        debug!(db_path = %self.db_path.display(), "Opening job store");

        let pool = create_pool_at(&self.db_path)
            .await
            .with_context(|| format!("Failed to open database {}", self.db_path.display()))?;
        run_migrations(&pool).await.context("Migration failed")?;

        Ok(SqliteJobStore::new(pool, time_provider))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use queuectl_core::port::time_provider::SystemTimeProvider;
    use queuectl_core::port::JobStore;

    #[test]
    fn test_tilde_is_expanded() {
        let settings = Settings::from_raw_path("~/.queuectl/jobs.db");
        assert!(!settings.db_path.to_string_lossy().starts_with('~'));
        assert!(settings.db_path.ends_with(".queuectl/jobs.db"));
    }

    #[test]
    fn test_plain_path_is_kept() {
        let settings = Settings::from_raw_path("/var/lib/queue.db");
        assert_eq!(settings.db_path, PathBuf::from("/var/lib/queue.db"));
    }

    #[tokio::test]
    async fn test_open_store_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("jobs.db");
        let settings = Settings::from_raw_path(&db_path.to_string_lossy());

        let store = settings
            .open_store(Arc::new(SystemTimeProvider))
            .await
            .unwrap();

        assert!(db_path.exists());
        assert!(store.list(None).await.unwrap().is_empty());
    }
}
