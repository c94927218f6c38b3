//! Shared repository utilities.
//!
//! [`EpisodeStore`] owns the on-disk layout of episode repositories and is shared by the
//! registry, the ledger and the query service:
//!
//! ```text
//! <data>/episodes/<s1>/<s2>/<uuid>/
//!     .git/
//!     episode.yaml                    header, rewritten on status change and discharge
//!     ledger/00000001-vitals.yaml     write-once entries
//!     ledger/00000002-nursing_note.yaml
//! ```
//!
//! Writes to one episode are serialised through a per-episode lock. Reads take no lock: every
//! file is written to a hidden sibling and renamed into place, so a reader sees either the old
//! content or the new content, never a partial file.

use crate::actor::ActorContext;
use crate::clock::Clock;
use crate::config::CoreConfig;
use crate::constants::{COMMIT_EMAIL_DOMAIN, EPISODE_FILENAME, LEDGER_DIR_NAME};
use crate::directory::StaffDirectory;
use crate::episode::Episode;
use crate::error::{EpisodeError, EpisodeResult};
use crate::ledger::{EntryDraft, EntryKind, EntryStamp, LedgerEntry};
use crate::versioned_files::{
    CommitAuthor, CommitRecord, FileToWrite, IpdCommitAction, IpdCommitDomain, IpdCommitMessage,
    VersionedFileService,
};
use chrono::{DateTime, Utc};
use ipd_uuid::ShardableUuid;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Parse YAML, reporting the failing path on mismatch.
pub(crate) fn parse_yaml<T: DeserializeOwned>(yaml_text: &str, file: &str) -> EpisodeResult<T> {
    let deserializer = serde_yaml::Deserializer::from_str(yaml_text);

    match serde_path_to_error::deserialize(deserializer) {
        Ok(parsed) => Ok(parsed),
        Err(err) => {
            let path = err.path().to_string();
            let source = err.into_inner();
            let path = if path.is_empty() || path == "." {
                "<root>".to_string()
            } else {
                path
            };
            Err(EpisodeError::CorruptRecord {
                file: file.to_string(),
                path,
                message: source.to_string(),
            })
        }
    }
}

/// Allocate a fresh id and create its sharded directory.
///
/// Retries with a new id if the directory already exists, up to 5 times.
pub(crate) fn create_uuid_and_shard_dir(
    base_dir: &Path,
    mut uuid_source: impl FnMut() -> ShardableUuid,
) -> EpisodeResult<(ShardableUuid, PathBuf)> {
    for _attempt in 0..5 {
        let uuid = uuid_source();
        let candidate = uuid.sharded_dir(base_dir);

        if candidate.exists() {
            continue;
        }

        if let Some(parent) = candidate.parent() {
            fs::create_dir_all(parent).map_err(EpisodeError::StorageDirCreation)?;
        }

        match fs::create_dir(&candidate) {
            Ok(()) => return Ok((uuid, candidate)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(EpisodeError::EpisodeDirCreation(e)),
        }
    }

    Err(EpisodeError::EpisodeDirCreation(io::Error::new(
        ErrorKind::AlreadyExists,
        "failed to allocate a unique episode directory after 5 attempts",
    )))
}

/// One mutex per episode id. Entries are created on first use and kept for the process
/// lifetime.
#[derive(Debug, Default)]
pub(crate) struct EpisodeLocks {
    inner: Mutex<HashMap<ShardableUuid, Arc<Mutex<()>>>>,
}

impl EpisodeLocks {
    fn lock_for(&self, id: ShardableUuid) -> EpisodeResult<Arc<Mutex<()>>> {
        let mut map = self.inner.lock().map_err(|_| EpisodeError::LockPoisoned)?;
        Ok(map.entry(id).or_default().clone())
    }

    /// Run `f` while holding the lock for `id`.
    pub(crate) fn with<T>(
        &self,
        id: ShardableUuid,
        f: impl FnOnce() -> EpisodeResult<T>,
    ) -> EpisodeResult<T> {
        let lock = self.lock_for(id)?;
        let _guard = lock.lock().map_err(|_| EpisodeError::LockPoisoned)?;
        f()
    }
}

/// On-disk episode storage shared by the services.
#[derive(Debug)]
pub struct EpisodeStore {
    cfg: Arc<CoreConfig>,
    clock: Arc<dyn Clock>,
    staff: Arc<dyn StaffDirectory>,
    locks: EpisodeLocks,
}

impl EpisodeStore {
    pub fn new(
        cfg: Arc<CoreConfig>,
        clock: Arc<dyn Clock>,
        staff: Arc<dyn StaffDirectory>,
    ) -> Self {
        Self {
            cfg,
            clock,
            staff,
            locks: EpisodeLocks::default(),
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.cfg
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn episode_dir(&self, id: ShardableUuid) -> PathBuf {
        id.sharded_dir(&self.cfg.episodes_dir())
    }

    /// Build commit attribution for `actor`, falling back to the actor id when the staff
    /// directory has no name.
    pub(crate) fn commit_author(&self, actor: &ActorContext) -> CommitAuthor {
        let name = self
            .staff
            .display_name(actor.id())
            .unwrap_or_else(|| actor.id().to_string());
        CommitAuthor {
            id: actor.id().to_string(),
            name,
            role: actor.role().to_string(),
            email: format!("{}@{COMMIT_EMAIL_DOMAIN}", actor.id()),
        }
    }

    fn commit_message(
        &self,
        domain: IpdCommitDomain,
        action: IpdCommitAction,
        summary: &str,
    ) -> EpisodeResult<IpdCommitMessage> {
        IpdCommitMessage::new(domain, action, summary, self.cfg.care_location())
    }

    /// Create the repository for a new episode and commit its header.
    ///
    /// `build` receives the freshly allocated id. The directory is removed if anything fails.
    pub(crate) fn create_episode(
        &self,
        actor: &ActorContext,
        build: impl FnOnce(ShardableUuid) -> Episode,
    ) -> EpisodeResult<Episode> {
        let episodes_dir = self.cfg.episodes_dir();
        fs::create_dir_all(&episodes_dir).map_err(EpisodeError::StorageDirCreation)?;

        let (id, episode_dir) = create_uuid_and_shard_dir(&episodes_dir, ShardableUuid::new)?;
        let episode = build(id);
        let yaml = serde_yaml::to_string(&episode).map_err(EpisodeError::YamlSerialization)?;

        let message = self
            .commit_message(
                IpdCommitDomain::Episode,
                IpdCommitAction::Create,
                "Episode admitted",
            )?
            .with_trailer("Episode-Kind", episode.kind.as_str())?;

        VersionedFileService::init_and_commit(
            &episode_dir,
            &self.commit_author(actor),
            &message,
            &[FileToWrite {
                relative_path: Path::new(EPISODE_FILENAME),
                content: &yaml,
                old_content: None,
            }],
        )?;

        Ok(episode)
    }

    /// Load the header of an existing episode.
    pub fn load_episode(&self, id: ShardableUuid) -> EpisodeResult<Episode> {
        Ok(self.load_episode_with_raw(id)?.0)
    }

    fn load_episode_with_raw(&self, id: ShardableUuid) -> EpisodeResult<(Episode, String)> {
        let path = self.episode_dir(id).join(EPISODE_FILENAME);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(EpisodeError::NotFound),
            Err(e) => return Err(EpisodeError::FileRead(e)),
        };

        let episode: Episode = parse_yaml(&text, EPISODE_FILENAME)?;
        if episode.id != id {
            return Err(EpisodeError::CorruptRecord {
                file: EPISODE_FILENAME.into(),
                path: "id".into(),
                message: format!("stored id {} does not match directory {id}", episode.id),
            });
        }
        episode
            .check_consistency()
            .map_err(|message| EpisodeError::CorruptRecord {
                file: EPISODE_FILENAME.into(),
                path: "status".into(),
                message,
            })?;

        Ok((episode, text))
    }

    /// Load, change and re-commit an episode header under the episode lock.
    ///
    /// `change` sees the current header and either mutates it or returns an error, in which
    /// case nothing is written.
    pub(crate) fn update_episode(
        &self,
        actor: &ActorContext,
        id: ShardableUuid,
        summary: &str,
        change: impl FnOnce(&mut Episode) -> EpisodeResult<()>,
    ) -> EpisodeResult<Episode> {
        self.locks.with(id, || {
            let (mut episode, old_yaml) = self.load_episode_with_raw(id)?;
            change(&mut episode)?;

            let yaml = serde_yaml::to_string(&episode).map_err(EpisodeError::YamlSerialization)?;
            let message = self.commit_message(
                IpdCommitDomain::Episode,
                IpdCommitAction::Update,
                summary,
            )?;

            VersionedFileService::write_and_commit_files(
                &self.episode_dir(id),
                &self.commit_author(actor),
                &message,
                &[FileToWrite {
                    relative_path: Path::new(EPISODE_FILENAME),
                    content: &yaml,
                    old_content: Some(&old_yaml),
                }],
            )?;

            Ok(episode)
        })
    }

    /// Validate, stamp and commit a ledger entry under the episode lock.
    ///
    /// `check` runs against the current header before the draft is validated. The sequence
    /// number is one past the highest on disk, so numbers are gap-free per episode.
    pub(crate) fn append_entry<D: EntryDraft>(
        &self,
        actor: &ActorContext,
        id: ShardableUuid,
        check: impl FnOnce(&Episode) -> EpisodeResult<()>,
        draft: D,
    ) -> EpisodeResult<D::Entry> {
        self.locks.with(id, || {
            let episode = self.load_episode(id)?;
            check(&episode)?;
            let body = draft.validate()?;

            let seq = self.last_seq(id)? + 1;
            let entry = D::stamp(
                body,
                EntryStamp {
                    id: ShardableUuid::new(),
                    episode_ref: id,
                    seq,
                    author: actor.id().to_string(),
                    at: self.now(),
                },
            );
            let stored: LedgerEntry = entry.clone().into();
            let yaml = serde_yaml::to_string(&stored).map_err(EpisodeError::YamlSerialization)?;

            let relative = Path::new(LEDGER_DIR_NAME).join(D::KIND.file_name(seq));
            let message = self
                .commit_message(
                    IpdCommitDomain::Ledger,
                    IpdCommitAction::Append,
                    &format!("{} recorded", kind_label(D::KIND)),
                )?
                .with_trailer("Entry-Kind", D::KIND.as_str())?
                .with_trailer("Entry-Seq", seq.to_string())?;

            VersionedFileService::write_and_commit_files(
                &self.episode_dir(id),
                &self.commit_author(actor),
                &message,
                &[FileToWrite {
                    relative_path: &relative,
                    content: &yaml,
                    old_content: None,
                }],
            )?;

            tracing::info!(
                episode_id = %id,
                kind = %D::KIND,
                seq,
                actor_id = actor.id(),
                "ledger entry appended"
            );
            Ok(entry)
        })
    }

    fn ledger_files(&self, id: ShardableUuid) -> EpisodeResult<Vec<(u64, EntryKind, PathBuf)>> {
        let dir = self.episode_dir(id).join(LEDGER_DIR_NAME);
        let iter = match fs::read_dir(&dir) {
            Ok(iter) => iter,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(EpisodeError::FileRead(e)),
        };

        let mut files = Vec::new();
        for ent in iter {
            let ent = ent.map_err(EpisodeError::FileRead)?;
            let name = ent.file_name();
            let Some((seq, kind)) = name.to_str().and_then(EntryKind::parse_file_name) else {
                continue;
            };
            files.push((seq, kind, ent.path()));
        }
        files.sort_by_key(|(seq, _, _)| *seq);
        Ok(files)
    }

    fn last_seq(&self, id: ShardableUuid) -> EpisodeResult<u64> {
        Ok(self
            .ledger_files(id)?
            .last()
            .map(|(seq, _, _)| *seq)
            .unwrap_or(0))
    }

    /// All ledger entries of an episode in sequence order.
    pub fn read_ledger(&self, id: ShardableUuid) -> EpisodeResult<Vec<LedgerEntry>> {
        let mut entries = Vec::new();
        for (seq, kind, path) in self.ledger_files(id)? {
            let file = format!("{LEDGER_DIR_NAME}/{}", kind.file_name(seq));
            let text = fs::read_to_string(&path).map_err(EpisodeError::FileRead)?;
            let entry: LedgerEntry = parse_yaml(&text, &file)?;

            if entry.seq() != seq || entry.kind() != kind || entry.episode_ref() != id {
                return Err(EpisodeError::CorruptRecord {
                    file,
                    path: "<root>".into(),
                    message: "entry does not match its file name or episode".into(),
                });
            }
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Ids of every stored episode.
    ///
    /// Walks `<episodes>/<s1>/<s2>/<uuid>/`, skipping anything that is not a canonical id with
    /// an episode header.
    pub fn episode_ids(&self) -> EpisodeResult<Vec<ShardableUuid>> {
        let base = self.cfg.episodes_dir();
        let mut ids = Vec::new();

        let s1_iter = match fs::read_dir(&base) {
            Ok(it) => it,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(EpisodeError::FileRead(e)),
        };

        for s1 in s1_iter.flatten() {
            let s1_path = s1.path();
            if !s1_path.is_dir() {
                continue;
            }
            let Ok(s2_iter) = fs::read_dir(&s1_path) else {
                continue;
            };

            for s2 in s2_iter.flatten() {
                let s2_path = s2.path();
                if !s2_path.is_dir() {
                    continue;
                }
                let Ok(id_iter) = fs::read_dir(&s2_path) else {
                    continue;
                };

                for id_ent in id_iter.flatten() {
                    let id_path = id_ent.path();
                    if !id_path.join(EPISODE_FILENAME).is_file() {
                        continue;
                    }
                    let Some(id) = id_path
                        .file_name()
                        .and_then(|os| os.to_str())
                        .and_then(|s| ShardableUuid::parse(s).ok())
                    else {
                        continue;
                    };
                    ids.push(id);
                }
            }
        }

        Ok(ids)
    }

    /// Commit history of one episode, newest first.
    pub fn history(&self, id: ShardableUuid) -> EpisodeResult<Vec<CommitRecord>> {
        let dir = self.episode_dir(id);
        if !dir.join(EPISODE_FILENAME).is_file() {
            return Err(EpisodeError::NotFound);
        }
        VersionedFileService::open(&dir)?.history()
    }
}

fn kind_label(kind: EntryKind) -> &'static str {
    match kind {
        EntryKind::Vitals => "Vitals",
        EntryKind::Medication => "Medication",
        EntryKind::NursingNote => "Nursing note",
        EntryKind::Diagnosis => "Diagnosis",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::AccessPolicy;
    use crate::clock::SystemClock;
    use crate::directory::InMemoryStaffDirectory;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> EpisodeStore {
        let cfg = CoreConfig::new(
            dir.path().to_path_buf(),
            "Ward Block".into(),
            AccessPolicy::default(),
        )
        .unwrap();
        EpisodeStore::new(
            Arc::new(cfg),
            Arc::new(SystemClock),
            Arc::new(InMemoryStaffDirectory::new()),
        )
    }

    #[test]
    fn parse_yaml_reports_path() {
        #[derive(Debug, serde::Deserialize)]
        #[allow(dead_code)]
        struct Outer {
            inner: Inner,
        }
        #[derive(Debug, serde::Deserialize)]
        #[allow(dead_code)]
        struct Inner {
            count: u32,
        }

        let err = parse_yaml::<Outer>("inner:\n  count: lots\n", "test.yaml").unwrap_err();
        match err {
            EpisodeError::CorruptRecord { file, path, .. } => {
                assert_eq!(file, "test.yaml");
                assert_eq!(path, "inner.count");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn shard_dir_retries_on_collision() {
        let temp = TempDir::new().unwrap();
        let taken = ShardableUuid::new();
        fs::create_dir_all(taken.sharded_dir(temp.path())).unwrap();

        let fresh = ShardableUuid::new();
        let mut ids = vec![fresh, taken];
        let (id, dir) = create_uuid_and_shard_dir(temp.path(), || ids.pop().unwrap()).unwrap();
        assert_eq!(id, fresh);
        assert!(dir.is_dir());
    }

    #[test]
    fn shard_dir_gives_up_after_five_collisions() {
        let temp = TempDir::new().unwrap();
        let taken = ShardableUuid::new();
        fs::create_dir_all(taken.sharded_dir(temp.path())).unwrap();

        let err = create_uuid_and_shard_dir(temp.path(), || taken).unwrap_err();
        assert!(matches!(err, EpisodeError::EpisodeDirCreation(_)));
    }

    #[test]
    fn missing_episode_is_not_found() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        assert!(matches!(
            store.load_episode(ShardableUuid::new()),
            Err(EpisodeError::NotFound)
        ));
        assert!(matches!(
            store.history(ShardableUuid::new()),
            Err(EpisodeError::NotFound)
        ));
        assert!(store.episode_ids().unwrap().is_empty());
    }

    #[test]
    fn commit_author_falls_back_to_actor_id() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let actor = ActorContext::new("nurse-9", crate::actor::Role::Nurse);
        let author = store.commit_author(&actor);
        assert_eq!(author.name, "nurse-9");
        assert_eq!(author.role, "nurse");
        assert_eq!(author.email, "nurse-9@ipd.invalid");
    }

    #[test]
    fn locks_are_per_episode() {
        let locks = EpisodeLocks::default();
        let a = ShardableUuid::new();
        let b = ShardableUuid::new();
        let nested = locks.with(a, || locks.with(b, || Ok(7))).unwrap();
        assert_eq!(nested, 7);
    }
}
