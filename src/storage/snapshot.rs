use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use super::records::{Account, Resource, UnlockGrant};
use super::Tables;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    created_ms: i64,
    accounts: Vec<Account>,
    resources: Vec<Resource>,
    grants: Vec<UnlockGrant>,
}

/// On-disk bincode image of the whole table set under `<dir>/snapshot.bin`.
#[derive(Debug, Clone)]
pub(crate) struct SnapshotFile {
    dir: PathBuf,
}

impl SnapshotFile {
    pub(crate) fn new(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create or access data dir: {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn path(&self) -> PathBuf { self.dir.join("snapshot.bin") }

    /// Serialize and atomically replace the snapshot (temp file then rename).
    pub(crate) fn save(&self, tables: &Tables) -> anyhow::Result<()> {
        let snap = Snapshot {
            version: SNAPSHOT_VERSION,
            created_ms: super::records::now_ms(),
            accounts: tables.accounts.values().cloned().collect(),
            resources: tables.resources.values().cloned().collect(),
            grants: tables.grants.values().cloned().collect(),
        };
        let bytes = bincode::serialize(&snap)?;
        let tmp = self.path().with_extension("bin.tmp");
        {
            let mut f = File::create(&tmp).with_context(|| format!("create {}", tmp.display()))?;
            f.write_all(&bytes)?;
            f.sync_all().with_context(|| format!("sync {}", tmp.display()))?;
        }
        std::fs::rename(&tmp, self.path())
            .with_context(|| format!("rename {} -> {}", tmp.display(), self.path().display()))?;
        // The rename itself lives in the directory entry.
        let _ = fsync_dir(&self.dir);
        Ok(())
    }

    /// Load the snapshot if present; a missing file yields empty tables.
    pub(crate) fn load(&self) -> anyhow::Result<Tables> {
        let path = self.path();
        if !path.exists() { return Ok(Tables::default()); }
        let bytes = std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
        let snap: Snapshot = bincode::deserialize(&bytes).with_context(|| format!("decoding {}", path.display()))?;
        if snap.version != SNAPSHOT_VERSION {
            anyhow::bail!("unsupported snapshot version {} in {}", snap.version, path.display());
        }
        let mut tables = Tables::default();
        for a in snap.accounts { tables.insert_account_row(a); }
        for r in snap.resources { tables.resources.insert(r.id, r); }
        for g in snap.grants { tables.grants.insert((g.account_id, g.resource_id), g); }
        tracing::debug!(
            accounts = tables.accounts.len(),
            resources = tables.resources.len(),
            grants = tables.grants.len(),
            created_ms = snap.created_ms,
            "snapshot loaded"
        );
        Ok(tables)
    }
}

fn fsync_dir(dir: &Path) -> anyhow::Result<()> {
    // Directories cannot be opened for sync on every platform.
    let f = File::open(dir).with_context(|| format!("open dir {}", dir.display()))?;
    f.sync_all()?;
    Ok(())
}
