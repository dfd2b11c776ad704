use chrono::DateTime;
use chrono::Utc;
use sled::Batch;
use sled::Tree;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::instrument;
use tracing::trace;
use tracing::warn;

use super::WatcherStore;
use crate::constants::CURSOR_KEY_SEPARATOR;
use crate::constants::EDGE_CURSORS_TREE;
use crate::constants::WATCHERS_TREE;
use crate::model::EdgeCursor;
use crate::model::Watcher;
use crate::Result;
use crate::StorageError;

/// Sled-backed [`WatcherStore`] with one tree per table
pub struct SledWatcherStore {
    db: sled::Db,
    watchers: Tree,
    cursors: Tree,
}

impl SledWatcherStore {
    pub fn new(db: sled::Db) -> Result<Self> {
        let watchers = db.open_tree(WATCHERS_TREE).map_err(StorageError::from)?;
        let cursors = db.open_tree(EDGE_CURSORS_TREE).map_err(StorageError::from)?;
        info!(
            watchers = watchers.len(),
            cursors = cursors.len(),
            "Opened watcher store"
        );
        Ok(Self {
            db,
            watchers,
            cursors,
        })
    }

    /// Underlying database handle, shared with other collaborators
    pub fn db(&self) -> &sled::Db {
        &self.db
    }

    /// `composition \0 from \0 to`
    #[inline]
    pub fn cursor_key(
        composition_id: &str,
        from_glyph_id: &str,
        to_glyph_id: &str,
    ) -> Vec<u8> {
        let mut key = Self::cursor_prefix(composition_id);
        key.extend_from_slice(from_glyph_id.as_bytes());
        key.push(CURSOR_KEY_SEPARATOR);
        key.extend_from_slice(to_glyph_id.as_bytes());
        key
    }

    #[inline]
    fn cursor_prefix(composition_id: &str) -> Vec<u8> {
        let mut key = Vec::with_capacity(composition_id.len() + 1);
        key.extend_from_slice(composition_id.as_bytes());
        key.push(CURSOR_KEY_SEPARATOR);
        key
    }

    fn encode_watcher(watcher: &Watcher) -> Result<Vec<u8>> {
        watcher.validate()?;
        Ok(bincode::serialize(watcher).map_err(StorageError::from)?)
    }

    fn decode_watcher(bytes: &[u8]) -> Result<Watcher> {
        Ok(bincode::deserialize(bytes).map_err(StorageError::from)?)
    }

    /// Scans `iter`, skipping rows that no longer decode
    fn collect_watchers(
        iter: sled::Iter,
        mut keep: impl FnMut(&Watcher) -> bool,
    ) -> Result<Vec<Watcher>> {
        let mut watchers = Vec::new();
        for item in iter {
            let (key, value) = item.map_err(StorageError::from)?;
            match Self::decode_watcher(&value) {
                Ok(watcher) if keep(&watcher) => watchers.push(watcher),
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        key = %String::from_utf8_lossy(&key),
                        "Skipping undecodable watcher row: {:?}",
                        e
                    );
                }
            }
        }
        Ok(watchers)
    }

    /// Atomic read-modify-write of one watcher row
    fn update_in_place(
        &self,
        id: &str,
        mut apply: impl FnMut(&mut Watcher),
    ) -> Result<()> {
        let mut codec_error: Option<bincode::Error> = None;

        let updated = self
            .watchers
            .update_and_fetch(id.as_bytes(), |old| {
                codec_error = None;
                let bytes = old?;
                let encoded = bincode::deserialize::<Watcher>(bytes).and_then(|mut watcher| {
                    apply(&mut watcher);
                    bincode::serialize(&watcher)
                });
                match encoded {
                    Ok(value) => Some(value),
                    Err(e) => {
                        codec_error = Some(e);
                        Some(bytes.to_vec())
                    }
                }
            })
            .map_err(StorageError::from)?;

        if let Some(e) = codec_error {
            return Err(StorageError::Bincode(e).into());
        }
        match updated {
            Some(_) => Ok(()),
            None => Err(StorageError::NotFound(id.to_string()).into()),
        }
    }
}

impl WatcherStore for SledWatcherStore {
    #[instrument(skip(self))]
    fn get(
        &self,
        id: &str,
    ) -> Result<Option<Watcher>> {
        match self.watchers.get(id.as_bytes()).map_err(StorageError::from)? {
            Some(bytes) => Self::decode_watcher(&bytes).map(Some),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, watcher), fields(watcher_id = %watcher.id))]
    fn create(
        &self,
        watcher: &Watcher,
    ) -> Result<()> {
        let value = Self::encode_watcher(watcher)?;
        self.watchers
            .compare_and_swap(watcher.id.as_bytes(), None as Option<&[u8]>, Some(value))
            .map_err(StorageError::from)?
            .map_err(|_| StorageError::AlreadyExists(watcher.id.clone()))?;
        debug!("Created watcher");
        Ok(())
    }

    #[instrument(skip(self, watcher), fields(watcher_id = %watcher.id))]
    fn create_or_replace(
        &self,
        watcher: &Watcher,
    ) -> Result<Option<Watcher>> {
        let value = Self::encode_watcher(watcher)?;
        let previous = self
            .watchers
            .insert(watcher.id.as_bytes(), value)
            .map_err(StorageError::from)?;
        match previous {
            Some(bytes) => match Self::decode_watcher(&bytes) {
                Ok(old) => Ok(Some(old)),
                Err(e) => {
                    warn!("Replaced an undecodable watcher row: {:?}", e);
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    #[instrument(skip(self, watcher), fields(watcher_id = %watcher.id))]
    fn update(
        &self,
        watcher: &Watcher,
    ) -> Result<()> {
        let value = Self::encode_watcher(watcher)?;
        let existing = self.watchers.get(watcher.id.as_bytes()).map_err(StorageError::from)?;
        let Some(existing) = existing else {
            return Err(StorageError::NotFound(watcher.id.clone()).into());
        };
        self.watchers
            .compare_and_swap(watcher.id.as_bytes(), Some(existing), Some(value))
            .map_err(StorageError::from)?
            .map_err(|e| match e.current {
                Some(_) => StorageError::Conflict(watcher.id.clone()),
                None => StorageError::NotFound(watcher.id.clone()),
            })?;
        Ok(())
    }

    #[instrument(skip(self))]
    fn delete(
        &self,
        id: &str,
    ) -> Result<bool> {
        Ok(self.watchers.remove(id.as_bytes()).map_err(StorageError::from)?.is_some())
    }

    #[instrument(skip(self))]
    fn delete_by_prefix(
        &self,
        prefix: &str,
    ) -> Result<usize> {
        let mut batch = Batch::default();
        let mut removed = 0;
        for item in self.watchers.scan_prefix(prefix.as_bytes()) {
            let (key, _) = item.map_err(StorageError::from)?;
            batch.remove(key);
            removed += 1;
        }
        self.watchers.apply_batch(batch).map_err(StorageError::from)?;
        debug!(removed, "Deleted watchers by prefix");
        Ok(removed)
    }

    fn list(
        &self,
        include_disabled: bool,
    ) -> Result<Vec<Watcher>> {
        Self::collect_watchers(self.watchers.iter(), |w| include_disabled || w.enabled)
    }

    fn list_by_prefix(
        &self,
        prefix: &str,
    ) -> Result<Vec<Watcher>> {
        Self::collect_watchers(self.watchers.scan_prefix(prefix.as_bytes()), |_| true)
    }

    #[instrument(skip(self))]
    fn find_compound_watchers_for_target(
        &self,
        glyph_id: &str,
    ) -> Result<Vec<Watcher>> {
        Self::collect_watchers(self.watchers.iter(), |w| {
            w.enabled
                && w.is_compound()
                && w.edge_action().is_some_and(|action| action.target_glyph_id == glyph_id)
        })
    }

    #[instrument(skip(self))]
    fn record_fire(
        &self,
        id: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.update_in_place(id, |watcher| {
            watcher.fire_count += 1;
            watcher.last_fired_at = Some(at);
        })
    }

    #[instrument(skip(self))]
    fn record_error(
        &self,
        id: &str,
        message: &str,
    ) -> Result<()> {
        self.update_in_place(id, |watcher| {
            watcher.error_count += 1;
            watcher.last_error = Some(message.to_string());
        })
    }

    fn get_cursor(
        &self,
        composition_id: &str,
        from_glyph_id: &str,
        to_glyph_id: &str,
    ) -> Result<Option<EdgeCursor>> {
        let key = Self::cursor_key(composition_id, from_glyph_id, to_glyph_id);
        match self.cursors.get(key).map_err(StorageError::from)? {
            Some(bytes) => match bincode::deserialize::<EdgeCursor>(&bytes) {
                Ok(cursor) => Ok(Some(cursor)),
                Err(e) => {
                    error!(
                        composition_id,
                        from_glyph_id, to_glyph_id, "cursor row deserialize error. {}", e
                    );
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    #[instrument(skip(self, cursor), fields(composition_id = %cursor.composition_id))]
    fn upsert_cursor(
        &self,
        cursor: &EdgeCursor,
    ) -> Result<()> {
        let key = Self::cursor_key(
            &cursor.composition_id,
            &cursor.from_glyph_id,
            &cursor.to_glyph_id,
        );
        let value = bincode::serialize(cursor).map_err(StorageError::from)?;

        self.cursors
            .fetch_and_update(key, |old| {
                let ahead = old
                    .and_then(|bytes| bincode::deserialize::<EdgeCursor>(bytes).ok())
                    .is_some_and(|stored| stored.last_processed_at > cursor.last_processed_at);
                if ahead {
                    old.map(|bytes| bytes.to_vec())
                } else {
                    Some(value.clone())
                }
            })
            .map_err(StorageError::from)?;
        trace!(last_processed_id = %cursor.last_processed_id, "Cursor upserted");
        Ok(())
    }

    #[instrument(skip(self))]
    fn delete_cursors_for_composition(
        &self,
        composition_id: &str,
    ) -> Result<usize> {
        let mut batch = Batch::default();
        let mut removed = 0;
        for item in self.cursors.scan_prefix(Self::cursor_prefix(composition_id)) {
            let (key, _) = item.map_err(StorageError::from)?;
            batch.remove(key);
            removed += 1;
        }
        self.cursors.apply_batch(batch).map_err(StorageError::from)?;
        Ok(removed)
    }

    fn flush(&self) -> Result<()> {
        self.db.flush().map_err(StorageError::from)?;
        Ok(())
    }
}

impl std::fmt::Debug for SledWatcherStore {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("SledWatcherStore").finish()
    }
}

impl Drop for SledWatcherStore {
    fn drop(&mut self) {
        match self.db.flush() {
            Ok(_) => debug!("Successfully flushed watcher store"),
            Err(e) => error!(?e, "Failed to flush watcher store"),
        }
    }
}
