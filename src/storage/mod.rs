//! Durable watcher and edge cursor tables.
//!
//! The store is the single source of truth for rules; the engine's active set
//! is a cache rebuilt from it on every reload.

mod sled_watcher_store;


use std::path::Path;

use chrono::DateTime;
use chrono::Utc;
#[cfg(test)]
use mockall::automock;
pub use sled_watcher_store::*;
use tracing::debug;
use tracing::warn;

use crate::config::StorageConfig;
use crate::constants::WATCHER_STORE_DIR;
use crate::model::EdgeCursor;
use crate::model::Watcher;
use crate::Result;

#[cfg_attr(test, automock)]
pub trait WatcherStore: Send + Sync + 'static {
    fn get(
        &self,
        id: &str,
    ) -> Result<Option<Watcher>>;

    /// Inserts a new watcher; fails with `AlreadyExists` when the id is taken
    fn create(
        &self,
        watcher: &Watcher,
    ) -> Result<()>;

    /// Upsert keyed by id, returning the replaced row if there was one
    fn create_or_replace(
        &self,
        watcher: &Watcher,
    ) -> Result<Option<Watcher>>;

    /// Overwrites an existing watcher; fails with `NotFound` otherwise
    fn update(
        &self,
        watcher: &Watcher,
    ) -> Result<()>;

    /// Returns true when a row was removed
    fn delete(
        &self,
        id: &str,
    ) -> Result<bool>;

    fn delete_by_prefix(
        &self,
        prefix: &str,
    ) -> Result<usize>;

    fn list(
        &self,
        include_disabled: bool,
    ) -> Result<Vec<Watcher>>;

    fn list_by_prefix(
        &self,
        prefix: &str,
    ) -> Result<Vec<Watcher>>;

    /// Enabled compound watchers whose action payload targets `glyph_id`
    fn find_compound_watchers_for_target(
        &self,
        glyph_id: &str,
    ) -> Result<Vec<Watcher>>;

    /// Increments `fire_count` and stamps `last_fired_at`
    fn record_fire(
        &self,
        id: &str,
        at: DateTime<Utc>,
    ) -> Result<()>;

    /// Increments `error_count` and stores the failure message
    fn record_error(
        &self,
        id: &str,
        message: &str,
    ) -> Result<()>;

    fn get_cursor(
        &self,
        composition_id: &str,
        from_glyph_id: &str,
        to_glyph_id: &str,
    ) -> Result<Option<EdgeCursor>>;

    /// Writes the cursor unless the stored one is already further ahead
    fn upsert_cursor(
        &self,
        cursor: &EdgeCursor,
    ) -> Result<()>;

    /// Removes every cursor of a composition in one batch
    fn delete_cursors_for_composition(
        &self,
        composition_id: &str,
    ) -> Result<usize>;

    fn flush(&self) -> Result<()>;
}

/// Opens the sled database under `<sled_db_root_path>/watcher_store`
pub fn init_sled_storage_db(
    sled_db_root_path: impl AsRef<Path> + std::fmt::Debug,
    config: &StorageConfig,
) -> Result<sled::Db> {
    debug!("init_sled_storage_db from path: {:?}", &sled_db_root_path);

    let path = sled_db_root_path.as_ref().join(WATCHER_STORE_DIR);
    let flush_every_ms = match config.flush_every_ms {
        0 => None,
        ms => Some(ms),
    };

    sled::Config::default()
        .path(&path)
        .cache_capacity(config.cache_capacity_bytes)
        .flush_every_ms(flush_every_ms)
        .use_compression(true)
        .compression_factor(1)
        .open()
        .map_err(|e| {
            warn!(
                "Try to open DB at this location: {:?} and failed: {:?}",
                path, e
            );
            crate::StorageError::Sled(e).into()
        })
}
