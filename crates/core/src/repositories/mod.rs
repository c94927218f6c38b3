//! Episode storage services.
//!
//! Each episode is its own git repository holding a mutable `episode.yaml` header and a
//! write-once `ledger/` directory. [`shared::EpisodeStore`] owns the on-disk layout and the
//! per-episode write lock; the registry, ledger and query services sit on top of it.

pub mod episodes;
pub mod ledger;
pub mod query;
pub mod shared;
