// -
// Database namespaces

/// Sled database tree namespaces
pub(crate) const WATCHERS_TREE: &str = "watchers";
pub(crate) const EDGE_CURSORS_TREE: &str = "composition_edge_cursors";

/// Sub directory of `storage.db_root_dir` holding the sled files
pub(crate) const WATCHER_STORE_DIR: &str = "watcher_store";

/// Separator between the parts of an edge cursor key
pub(crate) const CURSOR_KEY_SEPARATOR: u8 = 0;

// -
// Watcher identifiers

/// Prefix of every watcher compiled from a composition edge
pub const MELD_EDGE_PREFIX: &str = "meld-edge";

/// Separator used inside compiled watcher ids
pub const MELD_EDGE_SEPARATOR: char = '/';

/// Standalone watcher owned by a semantic-source glyph
pub const SEMANTIC_GLYPH_PREFIX: &str = "se-glyph-";

/// Standalone watcher owned by a query-source glyph
pub const QUERY_GLYPH_PREFIX: &str = "ax-glyph-";

/// Synthetic actor stamped on attestations created by a producing glyph
pub const PRODUCER_ACTOR_PREFIX: &str = "producer:";

/// Direction tag of a data-flow edge
pub const DATA_FLOW_DIRECTION: &str = "right";

// -
// Matching

/// Length of one rate limiting window
pub(crate) const RATE_WINDOW_SECS: u64 = 60;
