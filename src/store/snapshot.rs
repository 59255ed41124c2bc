use std::{
    fs,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{error::StoreError, store::memory::StoreContents};

const SNAPSHOT_VERSION: u64 = 1;

/// JSON file holding a full `StoreContents`, used to seed an `InMemoryStore`
/// for local tooling.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedSnapshot {
    version: u64,
    #[serde(flatten)]
    contents: StoreContents,
}

fn snapshot_error(action: &str, path: &Path, err: impl std::fmt::Display) -> StoreError {
    StoreError::Snapshot(format!("failed to {action} '{}': {err}", path.display()))
}

impl SnapshotStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when the snapshot file does not exist yet.
    pub fn load(&self) -> Result<Option<StoreContents>, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(snapshot_error("read snapshot", &self.path, err)),
        };

        let parsed: PersistedSnapshot = serde_json::from_str(&content)
            .map_err(|err| snapshot_error("parse snapshot", &self.path, err))?;
        if parsed.version != SNAPSHOT_VERSION {
            return Err(StoreError::Snapshot(format!(
                "unsupported snapshot version {} at '{}'",
                parsed.version,
                self.path.display()
            )));
        }

        tracing::info!(
            target: "store",
            path = %self.path.display(),
            benefits = parsed.contents.benefits.len(),
            events = parsed.contents.events.len(),
            fulfillments = parsed.contents.fulfillments.len(),
            "snapshot_loaded"
        );
        Ok(Some(parsed.contents))
    }

    /// Writes through a temp file and renames it into place.
    pub fn save(&self, contents: &StoreContents) -> Result<(), StoreError> {
        let parent = self.path.parent().ok_or_else(|| {
            StoreError::Snapshot(format!(
                "snapshot path '{}' has no parent",
                self.path.display()
            ))
        })?;
        fs::create_dir_all(parent)
            .map_err(|err| snapshot_error("create snapshot directory", parent, err))?;

        let persisted = PersistedSnapshot {
            version: SNAPSHOT_VERSION,
            contents: contents.clone(),
        };

        let tmp_path = self.path.with_extension("tmp");
        let file = fs::File::create(&tmp_path)
            .map_err(|err| snapshot_error("create snapshot temp file", &tmp_path, err))?;
        {
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, &persisted)
                .map_err(|err| snapshot_error("serialize snapshot", &tmp_path, err))?;
            writer
                .write_all(b"\n")
                .and_then(|_| writer.flush())
                .map_err(|err| snapshot_error("flush snapshot", &tmp_path, err))?;
            writer
                .get_ref()
                .sync_all()
                .map_err(|err| snapshot_error("sync snapshot", &tmp_path, err))?;
        }

        fs::rename(&tmp_path, &self.path)
            .map_err(|err| snapshot_error("replace snapshot", &self.path, err))?;

        Ok(())
    }
}
