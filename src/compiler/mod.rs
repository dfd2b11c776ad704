//! Composition compiler: turns the data-flow edges of a glyph graph into
//! watcher rules with deterministic ids, then asks the engine to reload.

mod composition_compiler;
mod ids;
mod report;
mod resolver;

pub use composition_compiler::*;
pub use ids::*;
pub use report::*;
pub use resolver::*;

#[cfg(test)]
mod ids_test;
