//! Data model shared by the store, the match engine and the compiler.
//!
//! Attestations and glyphs are produced by external collaborators and are
//! read-only here. Watchers and edge cursors are the persisted rows this
//! crate owns.

mod attestation;
mod cursor;
mod glyph;
mod watcher;

pub use attestation::*;
pub use cursor::*;
pub use glyph::*;
pub use watcher::*;

#[cfg(test)]
mod watcher_test;
