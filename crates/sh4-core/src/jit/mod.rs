//! Block translation and the translated-code cache.
//!
//! A block is a run of pre-decoded instructions ending after a branch and its
//! delay slot, at the configured instruction limit, at a 4 KiB page boundary
//! or before an undecodable word. Blocks share their handlers with the
//! interpreter.

/// Translated blocks and their compiled operations.
pub mod block;
/// Cache keyed by guest start address with code-page invalidation.
pub mod cache;
/// Guest code to block translation.
pub mod translate;

pub use block::{CompiledOp, TranslatedBlock};
pub use cache::{CacheStats, CodeCache};
pub use translate::Translator;
