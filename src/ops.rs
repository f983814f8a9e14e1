//! Operational commands: backup, restore, backup retention, migrate and
//! snapshot refresh.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Local, Utc};
use tracing::{info, warn};

use crate::analysis::{CoalitionParams, OutlierParams};
use crate::models::Chamber;
use crate::report::{build_snapshot, SnapshotCache};
use crate::store::{Store, TableCounts};

pub const BACKUP_PREFIX: &str = "coalitions_backup_";
const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";

/// A backup file on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct BackupFile {
    pub path: PathBuf,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

impl BackupFile {
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn age(&self) -> Duration {
        Utc::now() - self.modified
    }
}

/// File name for a backup taken at `at`.
pub fn backup_file_name(at: DateTime<Local>) -> String {
    format!("{}{}.db", BACKUP_PREFIX, at.format("%Y%m%d_%H%M%S"))
}

/// Backups in `dir`, newest first.
pub fn list_backups(dir: &Path) -> Result<Vec<BackupFile>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut backups = Vec::new();
    for entry in walkdir::WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
    {
        let name = entry.file_name().to_string_lossy();
        if !name.starts_with(BACKUP_PREFIX) || !name.ends_with(".db") {
            continue;
        }
        let metadata = entry
            .metadata()
            .with_context(|| format!("Failed to stat {}", entry.path().display()))?;
        let modified = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        backups.push(BackupFile {
            path: entry.path().to_path_buf(),
            size: metadata.len(),
            modified,
        });
    }
    backups.sort_by(|a, b| {
        b.modified
            .cmp(&a.modified)
            .then_with(|| b.path.cmp(&a.path))
    });
    Ok(backups)
}

/// Remove all but the `keep` newest backups. Returns the removed files.
pub fn prune_backups(dir: &Path, keep: usize) -> Result<Vec<BackupFile>> {
    let backups = list_backups(dir)?;
    let stale: Vec<BackupFile> = backups.into_iter().skip(keep).collect();
    for backup in &stale {
        std::fs::remove_file(&backup.path)
            .with_context(|| format!("Failed to remove {}", backup.path.display()))?;
        info!("Pruned backup {}", backup.name());
    }
    Ok(stale)
}

/// Backups older than `days`; removed unless `dry_run`.
pub fn cleanup_backups(dir: &Path, days: i64, dry_run: bool) -> Result<Vec<BackupFile>> {
    let Some(cutoff) = Duration::try_days(days).and_then(|age| Utc::now().checked_sub_signed(age))
    else {
        bail!("Cleanup age out of range: {} days", days);
    };
    let old: Vec<BackupFile> = list_backups(dir)?
        .into_iter()
        .filter(|b| b.modified < cutoff)
        .collect();
    if !dry_run {
        for backup in &old {
            std::fs::remove_file(&backup.path)
                .with_context(|| format!("Failed to remove {}", backup.path.display()))?;
        }
    }
    Ok(old)
}

/// Write a consistent copy of the database and apply retention.
///
/// `max_backups == 0` keeps everything.
pub async fn backup(store: &Store, dir: &Path, max_backups: usize) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create backup dir {}", dir.display()))?;
    let path = dir.join(backup_file_name(Local::now()));
    if path.exists() {
        bail!("Backup {} already exists", path.display());
    }

    store
        .vacuum_into(&path.to_string_lossy())
        .await
        .context("Failed to write backup")?;
    info!("Backup written to {}", path.display());

    if max_backups > 0 {
        let pruned = prune_backups(dir, max_backups)?;
        if !pruned.is_empty() {
            info!("Removed {} old backup(s)", pruned.len());
        }
    }
    Ok(path)
}

fn check_sqlite_file(path: &Path) -> Result<()> {
    let mut header = [0u8; 16];
    let mut file =
        std::fs::File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
    file.read_exact(&mut header)
        .with_context(|| format!("{} is too short to be a database", path.display()))?;
    if &header != SQLITE_MAGIC {
        bail!("{} is not a SQLite database", path.display());
    }
    Ok(())
}

/// Replace the database at `db_path` with `source`.
///
/// The copy goes to a temp file next to the database first, so an
/// interrupted restore leaves the old database intact.
pub fn restore(source: &Path, db_path: &Path) -> Result<()> {
    check_sqlite_file(source)?;
    let dir = match db_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let bytes = std::fs::read(source)
        .with_context(|| format!("Failed to read {}", source.display()))?;
    let mut tmp = tempfile::NamedTempFile::new_in(&dir)
        .context("Failed to create temporary database file")?;
    tmp.write_all(&bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(db_path)
        .with_context(|| format!("Failed to replace {}", db_path.display()))?;

    for suffix in ["-wal", "-shm"] {
        let sidecar = PathBuf::from(format!("{}{}", db_path.display(), suffix));
        if sidecar.exists() {
            if let Err(e) = std::fs::remove_file(&sidecar) {
                warn!("Could not remove {}: {}", sidecar.display(), e);
            }
        }
    }
    info!("Restored {} from {}", db_path.display(), source.display());
    Ok(())
}

/// Apply migrations and report table sizes.
pub async fn migrate(store: &Store) -> Result<TableCounts> {
    store.run_migrations().await?;
    Ok(store.table_counts().await?)
}

/// Recompute and cache the snapshot for each target.
pub async fn refresh(
    store: &Store,
    cache: &SnapshotCache,
    targets: &[(i64, Chamber)],
    outlier_params: &OutlierParams,
    coalition_params: &CoalitionParams,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for &(congress, chamber) in targets {
        info!("Refreshing analysis for Congress {} {}", congress, chamber);
        let snapshot =
            build_snapshot(store, congress, chamber, outlier_params, coalition_params).await?;
        written.push(cache.save(&snapshot)?);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::house_member;
    use chrono::TimeZone;
    use std::time::SystemTime;

    fn touch(path: &Path, age_days: u64) {
        let file = std::fs::File::create(path).unwrap();
        let modified = SystemTime::now() - std::time::Duration::from_secs(age_days * 86_400);
        file.set_modified(modified).unwrap();
    }

    #[test]
    fn test_backup_file_name() {
        let at = Local.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(backup_file_name(at), "coalitions_backup_20250304_050607.db");
    }

    #[test]
    fn test_list_ignores_other_files() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("coalitions_backup_20250101_000000.db"), 3);
        touch(&dir.path().join("coalitions_backup_20250102_000000.db"), 1);
        touch(&dir.path().join("notes.txt"), 0);
        std::fs::create_dir(dir.path().join("coalitions_backup_dir.db")).unwrap();

        let backups = list_backups(dir.path()).unwrap();
        assert_eq!(backups.len(), 2);
        assert_eq!(backups[0].name(), "coalitions_backup_20250102_000000.db");
        assert!(list_backups(&dir.path().join("missing")).unwrap().is_empty());
    }

    #[test]
    fn test_prune_keeps_newest() {
        let dir = tempfile::tempdir().unwrap();
        for (i, age) in [5, 4, 3, 2, 1].iter().enumerate() {
            touch(
                &dir.path().join(format!("coalitions_backup_2025010{}_000000.db", i + 1)),
                *age,
            );
        }
        let removed = prune_backups(dir.path(), 2).unwrap();
        assert_eq!(removed.len(), 3);

        let left: Vec<String> = list_backups(dir.path())
            .unwrap()
            .iter()
            .map(|b| b.name())
            .collect();
        assert_eq!(
            left,
            vec![
                "coalitions_backup_20250105_000000.db",
                "coalitions_backup_20250104_000000.db"
            ]
        );
    }

    #[test]
    fn test_cleanup_dry_run_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("coalitions_backup_old.db"), 40);
        touch(&dir.path().join("coalitions_backup_new.db"), 2);

        let planned = cleanup_backups(dir.path(), 30, true).unwrap();
        assert_eq!(planned.len(), 1);
        assert_eq!(list_backups(dir.path()).unwrap().len(), 2);

        let removed = cleanup_backups(dir.path(), 30, false).unwrap();
        assert_eq!(removed[0].name(), "coalitions_backup_old.db");
        assert_eq!(list_backups(dir.path()).unwrap().len(), 1);
    }

    #[test]
    fn test_cleanup_rejects_out_of_range_age() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("coalitions_backup_old.db"), 40);

        assert!(cleanup_backups(dir.path(), 100_000_000, true).is_err());
        assert!(cleanup_backups(dir.path(), i64::MAX, false).is_err());
        assert_eq!(list_backups(dir.path()).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_backup_and_restore() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("live.db");
        let backup_dir = dir.path().join("backups");

        let store = Store::open(&db_path.to_string_lossy()).await.unwrap();
        store.upsert_member(&house_member("A1", "D")).await.unwrap();
        let backup_path = backup(&store, &backup_dir, 10).await.unwrap();
        assert!(backup_path.exists());

        store.upsert_member(&house_member("B2", "R")).await.unwrap();
        drop(store);

        let target = dir.path().join("restored.db");
        restore(&backup_path, &target).unwrap();
        let restored = Store::open(&target.to_string_lossy()).await.unwrap();
        assert!(restored.get_member("A1").await.unwrap().is_some());
        assert!(restored.get_member("B2").await.unwrap().is_none());
    }

    #[test]
    fn test_restore_rejects_non_database() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("bogus.db");
        std::fs::write(&bogus, "definitely not sqlite").unwrap();
        let target = dir.path().join("live.db");
        std::fs::write(&target, "original").unwrap();

        assert!(restore(&bogus, &target).is_err());
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "original");
    }

    #[tokio::test]
    async fn test_migrate_and_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(":memory:").await.unwrap();
        let counts = migrate(&store).await.unwrap();
        assert_eq!(counts.tables["members"], 0);

        let cache = SnapshotCache::new(dir.path(), 24);
        let written = refresh(
            &store,
            &cache,
            &[(119, Chamber::House), (119, Chamber::Senate)],
            &OutlierParams::default(),
            &CoalitionParams::default(),
        )
        .await
        .unwrap();
        assert_eq!(written.len(), 2);
        assert!(cache.load_fresh(119, Chamber::Senate).is_some());
    }
}
