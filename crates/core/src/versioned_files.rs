//! Versioned file operations with Git-based version control.
//!
//! Every episode directory is its own local Git repository (`git2`/libgit2). Episode headers and
//! ledger entries are plain YAML files in that directory, and every mutation is written and
//! committed as a single unit:
//!
//! - **Atomic Multi-file Operations**: files are written and committed together, and rolled
//!   back if the commit fails
//! - **Structured Commit Messages**: `<domain>:<action>: <summary>` followed by author and
//!   care-location trailers
//! - **Audit Trail**: commits are never rewritten, so the history of an episode can be read back
//!   with [`VersionedFileService::history`]
//!
//! ## Branch Policy
//!
//! All episode repositories use `refs/heads/main`.
//!
//! Safety/intent: commit messages are labels and indexes. They never carry patient identifiers
//! or clinical content.

use crate::error::{EpisodeError, EpisodeResult};
use chrono::{DateTime, TimeZone, Utc};
use ipd_types::NonEmptyText;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

#[cfg(test)]
use std::collections::HashSet;
#[cfg(test)]
use std::sync::{LazyLock, Mutex};

const MAIN_REF: &str = "refs/heads/main";

/// Commit message domains.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpdCommitDomain {
    /// The episode header (`episode.yaml`).
    Episode,
    /// Write-once ledger entries.
    Ledger,
}

impl IpdCommitDomain {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Episode => "episode",
            Self::Ledger => "ledger",
        }
    }
}

impl fmt::Display for IpdCommitDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Commit message actions.
///
/// There is no delete action. Ledger files only ever see `Append`; the episode header sees
/// `Create` once and then `Update`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpdCommitAction {
    Create,
    Update,
    Append,
}

impl IpdCommitAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Append => "append",
        }
    }
}

impl fmt::Display for IpdCommitAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who a commit is attributed to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommitAuthor {
    pub id: String,
    pub name: String,
    pub role: String,
    pub email: String,
}

impl CommitAuthor {
    fn validate(&self) -> EpisodeResult<()> {
        for (label, value) in [("id", &self.id), ("name", &self.name), ("role", &self.role)] {
            if value.trim().is_empty() || value.contains(['\n', '\r']) {
                return Err(EpisodeError::InvalidInput(format!(
                    "commit author {label} must be non-empty and single-line"
                )));
            }
        }
        Ok(())
    }

    /// Git signature for this author.
    ///
    /// libgit2 refuses `<` and `>` in names and emails, so those are replaced here. The
    /// `Author-Id` trailer keeps the id as given.
    fn signature(&self) -> EpisodeResult<git2::Signature<'static>> {
        git2::Signature::now(
            &signature_safe(self.name.trim()),
            &signature_safe(self.email.trim()),
        )
        .map_err(EpisodeError::GitSignature)
    }
}

fn signature_safe(value: &str) -> String {
    value
        .chars()
        .map(|c| if c == '<' || c == '>' || c.is_control() { '_' } else { c })
        .collect()
}

/// A single `Key: Value` trailer line.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct CommitTrailer {
    key: String,
    value: String,
}

impl CommitTrailer {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> EpisodeResult<Self> {
        let key = key.into().trim().to_string();
        let value = value.into().trim().to_string();

        if key.is_empty()
            || key.contains(['\n', '\r'])
            || key.contains(':')
            || value.is_empty()
            || value.contains(['\n', '\r'])
        {
            return Err(EpisodeError::InvalidInput(
                "commit trailer key/value must be non-empty and single-line (key cannot contain ':')"
                    .into(),
            ));
        }

        Ok(Self { key, value })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

/// A structured commit message.
///
/// Rendering rules:
///
/// - Subject line: `<domain>:<action>: <summary>`
/// - Blank line, then `Author-Id`, `Author-Name`, `Author-Role`, `Care-Location`
/// - Any extra trailers, sorted by key then value
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IpdCommitMessage {
    domain: IpdCommitDomain,
    action: IpdCommitAction,
    summary: NonEmptyText,
    care_location: NonEmptyText,
    trailers: Vec<CommitTrailer>,
}

impl IpdCommitMessage {
    pub fn new(
        domain: IpdCommitDomain,
        action: IpdCommitAction,
        summary: impl AsRef<str>,
        care_location: impl AsRef<str>,
    ) -> EpisodeResult<Self> {
        let summary = NonEmptyText::single_line(summary.as_ref()).map_err(|_| {
            EpisodeError::InvalidInput("commit summary must be non-empty and single-line".into())
        })?;
        let care_location = NonEmptyText::single_line(care_location.as_ref()).map_err(|_| {
            EpisodeError::InvalidInput("care location must be non-empty and single-line".into())
        })?;

        Ok(Self {
            domain,
            action,
            summary,
            care_location,
            trailers: Vec::new(),
        })
    }

    /// Add a trailer. `Author-*` and `Care-Location` are reserved.
    pub fn with_trailer(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> EpisodeResult<Self> {
        let key = key.into();
        if key.trim_start().starts_with("Author-") || key.trim() == "Care-Location" {
            return Err(EpisodeError::InvalidInput(format!(
                "commit trailer key '{}' is reserved",
                key.trim()
            )));
        }
        self.trailers.push(CommitTrailer::new(key, value.into())?);
        Ok(self)
    }

    pub fn domain(&self) -> IpdCommitDomain {
        self.domain
    }

    pub fn action(&self) -> IpdCommitAction {
        self.action
    }

    pub fn summary(&self) -> &str {
        self.summary.as_str()
    }

    pub fn render_with_author(&self, author: &CommitAuthor) -> EpisodeResult<String> {
        author.validate()?;

        let mut rendered = format!("{}:{}: {}", self.domain, self.action, self.summary);

        let mut other = self.trailers.clone();
        other.sort_by(|a, b| (a.key(), a.value()).cmp(&(b.key(), b.value())));

        rendered.push_str("\n\n");
        for (key, value) in [
            ("Author-Id", author.id.trim()),
            ("Author-Name", author.name.trim()),
            ("Author-Role", author.role.trim()),
            ("Care-Location", self.care_location.as_str()),
        ] {
            rendered.push_str(key);
            rendered.push_str(": ");
            rendered.push_str(value);
            rendered.push('\n');
        }
        for trailer in other {
            rendered.push_str(trailer.key());
            rendered.push_str(": ");
            rendered.push_str(trailer.value());
            rendered.push('\n');
        }

        Ok(rendered.trim_end().to_string())
    }
}

/// A file to be written and committed.
///
/// Used with [`VersionedFileService::write_and_commit_files`] to write multiple files in a
/// single commit.
#[derive(Debug, Clone)]
pub struct FileToWrite<'a> {
    /// Path relative to the repository directory.
    pub relative_path: &'a Path,
    pub content: &'a str,
    /// Previous content for rollback. `None` if this is a new file.
    pub old_content: Option<&'a str>,
}

/// One commit from an episode's history, newest first.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CommitRecord {
    pub id: String,
    pub subject: String,
    pub author_id: Option<String>,
    pub author_role: Option<String>,
    pub committed_at: DateTime<Utc>,
}

/// Git operations on a repository rooted at `workdir`.
pub struct VersionedFileService {
    repo: git2::Repository,
    workdir: PathBuf,
}

impl VersionedFileService {
    pub(crate) fn init(workdir: &Path) -> EpisodeResult<Self> {
        let repo = git2::Repository::init(workdir).map_err(EpisodeError::GitInit)?;
        // Use the workdir git2 reports so path stripping matches.
        let actual_workdir = repo
            .workdir()
            .ok_or_else(|| {
                EpisodeError::GitInit(git2::Error::from_str("repository has no working directory"))
            })?
            .to_path_buf();
        Ok(Self {
            repo,
            workdir: actual_workdir,
        })
    }

    /// Open exactly the repository at `workdir`; parent directories are never searched.
    pub(crate) fn open(workdir: &Path) -> EpisodeResult<Self> {
        let repo = git2::Repository::open_ext(
            workdir,
            git2::RepositoryOpenFlags::NO_SEARCH,
            std::iter::empty::<&std::ffi::OsStr>(),
        )
        .map_err(EpisodeError::GitOpen)?;
        let actual_workdir = repo
            .workdir()
            .ok_or_else(|| {
                EpisodeError::GitOpen(git2::Error::from_str("repository has no working directory"))
            })?
            .to_path_buf();
        Ok(Self {
            repo,
            workdir: actual_workdir,
        })
    }

    fn ensure_main_head(&self) -> EpisodeResult<()> {
        self.repo
            .set_head(MAIN_REF)
            .map_err(EpisodeError::GitSetHead)?;
        Ok(())
    }

    /// Commit only the given paths (workdir-relative, or absolute under the workdir).
    ///
    /// Paths containing `..` are rejected.
    pub(crate) fn commit_paths(
        &self,
        author: &CommitAuthor,
        message: &IpdCommitMessage,
        relative_paths: &[PathBuf],
    ) -> EpisodeResult<git2::Oid> {
        let rendered = message.render_with_author(author)?;

        self.ensure_main_head()?;
        let mut index = self.repo.index().map_err(EpisodeError::GitIndex)?;

        for path in relative_paths {
            let rel = if path.is_absolute() {
                path.strip_prefix(&self.workdir)
                    .map_err(|_| {
                        EpisodeError::InvalidInput(
                            "path is outside the repository working directory".into(),
                        )
                    })?
                    .to_path_buf()
            } else {
                path.to_path_buf()
            };

            if rel
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
            {
                return Err(EpisodeError::InvalidInput(
                    "path must not contain parent directory references (..)".into(),
                ));
            }

            index.add_path(&rel).map_err(EpisodeError::GitAdd)?;
        }
        index.write().map_err(EpisodeError::GitIndex)?;

        let tree_id = index.write_tree().map_err(EpisodeError::GitWriteTree)?;
        let tree = self
            .repo
            .find_tree(tree_id)
            .map_err(EpisodeError::GitFindTree)?;
        let sig = author.signature()?;

        let parents = self.resolve_head_parents()?;
        let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
        self.repo
            .commit(Some("HEAD"), &sig, &sig, &rendered, &tree, &parent_refs)
            .map_err(EpisodeError::GitCommit)
    }

    /// Write files and commit them together, rolling back on failure.
    ///
    /// On error, files that existed are restored, new files are removed and any directories
    /// created here are removed again.
    pub(crate) fn write_and_commit_files(
        repo_path: &Path,
        author: &CommitAuthor,
        msg: &IpdCommitMessage,
        files: &[FileToWrite],
    ) -> EpisodeResult<()> {
        let repo = Self::open(repo_path)?;

        let mut created_dirs: Vec<PathBuf> = Vec::new();
        let mut written_files: Vec<(PathBuf, Option<String>)> = Vec::new();

        let result: EpisodeResult<()> = (|| {
            let mut dirs_needed = std::collections::HashSet::new();
            for file in files {
                let full_path = repo.workdir.join(file.relative_path);
                if let Some(parent) = full_path.parent() {
                    let mut current = parent;
                    while current != repo.workdir && !current.exists() {
                        dirs_needed.insert(current.to_path_buf());
                        match current.parent() {
                            Some(p) => current = p,
                            None => break,
                        }
                    }
                }
            }

            // Shallowest first.
            let mut dirs_to_create: Vec<PathBuf> = dirs_needed.into_iter().collect();
            dirs_to_create.sort_by_key(|p| p.components().count());

            for dir in &dirs_to_create {
                std::fs::create_dir(dir).map_err(EpisodeError::FileWrite)?;
                created_dirs.push(dir.clone());
            }

            for file in files {
                let full_path = repo.workdir.join(file.relative_path);
                let old_content = file.old_content.map(|s| s.to_string());

                write_atomic(&full_path, file.content).map_err(EpisodeError::FileWrite)?;
                written_files.push((full_path, old_content));
            }

            let paths: Vec<PathBuf> = files
                .iter()
                .map(|f| f.relative_path.to_path_buf())
                .collect();
            repo.commit_paths(author, msg, &paths)?;

            Ok(())
        })();

        if let Err(write_error) = result {
            for (full_path, old_content) in written_files.iter().rev() {
                match old_content {
                    Some(contents) => {
                        let _ = write_atomic(full_path, contents);
                    }
                    None => {
                        let _ = std::fs::remove_file(full_path);
                    }
                }
            }

            for dir in created_dirs.iter().rev() {
                let _ = std::fs::remove_dir(dir);
            }

            return Err(write_error);
        }

        Ok(())
    }

    /// Initialise a repository and make its first commit; remove `episode_dir` on failure.
    pub(crate) fn init_and_commit(
        episode_dir: &Path,
        author: &CommitAuthor,
        message: &IpdCommitMessage,
        files: &[FileToWrite],
    ) -> EpisodeResult<()> {
        let result: EpisodeResult<()> = (|| {
            let _repo = Self::init(episode_dir)?;
            Self::write_and_commit_files(episode_dir, author, message, files)?;
            Ok(())
        })();

        match result {
            Ok(()) => Ok(()),
            Err(init_error) => {
                if let Err(cleanup_err) = cleanup_episode_dir(episode_dir) {
                    return Err(EpisodeError::CleanupAfterInitialiseFailed {
                        path: episode_dir.to_path_buf(),
                        init_error: Box::new(init_error),
                        cleanup_error: cleanup_err,
                    });
                }
                Err(init_error)
            }
        }
    }

    /// Commit history of the repository, newest first.
    pub(crate) fn history(&self) -> EpisodeResult<Vec<CommitRecord>> {
        if self.resolve_head_parents()?.is_empty() {
            return Ok(Vec::new());
        }

        let mut walk = self.repo.revwalk().map_err(EpisodeError::GitRevwalk)?;
        walk.push_head().map_err(EpisodeError::GitRevwalk)?;

        let mut records = Vec::new();
        for oid in walk {
            let oid = oid.map_err(EpisodeError::GitRevwalk)?;
            let commit = self.repo.find_commit(oid).map_err(EpisodeError::GitPeel)?;
            let message = commit.message().unwrap_or_default();
            let trailer = |key: &str| {
                message.lines().find_map(|line| {
                    line.strip_prefix(key)
                        .and_then(|rest| rest.strip_prefix(": "))
                        .map(str::to_string)
                })
            };

            records.push(CommitRecord {
                id: oid.to_string(),
                subject: commit.summary().unwrap_or_default().to_string(),
                author_id: trailer("Author-Id"),
                author_role: trailer("Author-Role"),
                committed_at: Utc
                    .timestamp_opt(commit.time().seconds(), 0)
                    .single()
                    .unwrap_or_default(),
            });
        }
        Ok(records)
    }

    /// Parent list for the next commit: HEAD's commit, or nothing on an unborn branch.
    fn resolve_head_parents(&self) -> EpisodeResult<Vec<git2::Commit<'_>>> {
        match self.repo.head() {
            Ok(head) => {
                let commit = head.peel_to_commit().map_err(EpisodeError::GitPeel)?;
                Ok(vec![commit])
            }
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => Ok(vec![]),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(vec![]),
            Err(e) => Err(EpisodeError::GitHead(e)),
        }
    }
}

/// Replace `path` with `contents` so readers see either the old file or the new one.
///
/// The bytes go to a hidden sibling first and are renamed over the target.
fn write_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    let file_name = path.file_name().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name")
    })?;
    let mut tmp_name = std::ffi::OsString::from(".");
    tmp_name.push(file_name);
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    std::fs::write(&tmp_path, contents)?;
    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
static FORCE_CLEANUP_ERROR_FOR_THREADS: LazyLock<Mutex<HashSet<std::thread::ThreadId>>> =
    LazyLock::new(|| Mutex::new(HashSet::new()));

fn cleanup_episode_dir(episode_dir: &Path) -> std::io::Result<()> {
    #[cfg(test)]
    {
        let current_id = std::thread::current().id();
        let mut guard = FORCE_CLEANUP_ERROR_FOR_THREADS
            .lock()
            .expect("FORCE_CLEANUP_ERROR_FOR_THREADS mutex poisoned");

        if guard.remove(&current_id) {
            return Err(std::io::Error::other("forced cleanup failure (test hook)"));
        }
    }

    std::fs::remove_dir_all(episode_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn author() -> CommitAuthor {
        CommitAuthor {
            id: "nurse-1".into(),
            name: "Nurse Jackie".into(),
            role: "nurse".into(),
            email: "nurse-1@ipd.invalid".into(),
        }
    }

    fn message(action: IpdCommitAction) -> IpdCommitMessage {
        IpdCommitMessage::new(
            IpdCommitDomain::Ledger,
            action,
            "vitals recorded",
            "Ward Block",
        )
        .unwrap()
    }

    #[test]
    fn domain_and_action_serialise_lowercase() {
        assert_eq!(
            serde_json::to_string(&IpdCommitDomain::Episode).unwrap(),
            "\"episode\""
        );
        assert_eq!(
            serde_json::to_string(&IpdCommitAction::Append).unwrap(),
            "\"append\""
        );
    }

    #[test]
    fn render_with_author_orders_trailers() {
        let msg = message(IpdCommitAction::Append)
            .with_trailer("Seq", "3")
            .unwrap()
            .with_trailer("Entry-Kind", "vitals")
            .unwrap();

        assert_eq!(
            msg.render_with_author(&author()).unwrap(),
            "ledger:append: vitals recorded\n\nAuthor-Id: nurse-1\nAuthor-Name: Nurse Jackie\n\
             Author-Role: nurse\nCare-Location: Ward Block\nEntry-Kind: vitals\nSeq: 3"
        );
    }

    #[test]
    fn rejects_multiline_summary() {
        let err = IpdCommitMessage::new(
            IpdCommitDomain::Episode,
            IpdCommitAction::Create,
            "line1\nline2",
            "Ward Block",
        )
        .unwrap_err();
        assert!(matches!(err, EpisodeError::InvalidInput(_)));
    }

    #[test]
    fn rejects_blank_care_location() {
        let err = IpdCommitMessage::new(
            IpdCommitDomain::Episode,
            IpdCommitAction::Create,
            "episode admitted",
            "  ",
        )
        .unwrap_err();
        assert!(matches!(err, EpisodeError::InvalidInput(_)));
    }

    #[test]
    fn rejects_reserved_trailer_keys() {
        assert!(message(IpdCommitAction::Append)
            .with_trailer("Author-Id", "x")
            .is_err());
        assert!(message(IpdCommitAction::Append)
            .with_trailer("Care-Location", "x")
            .is_err());
        assert!(CommitTrailer::new("Bad:Key", "Value").is_err());
    }

    #[test]
    fn init_and_commit_then_append_builds_history() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("ep");
        std::fs::create_dir(&dir).unwrap();

        let header = Path::new("episode.yaml");
        VersionedFileService::init_and_commit(
            &dir,
            &author(),
            &IpdCommitMessage::new(
                IpdCommitDomain::Episode,
                IpdCommitAction::Create,
                "episode admitted",
                "Ward Block",
            )
            .unwrap(),
            &[FileToWrite {
                relative_path: header,
                content: "status: admitted\n",
                old_content: None,
            }],
        )
        .unwrap();

        let entry = Path::new("ledger/00000001-vitals.yaml");
        VersionedFileService::write_and_commit_files(
            &dir,
            &author(),
            &message(IpdCommitAction::Append),
            &[FileToWrite {
                relative_path: entry,
                content: "heart_rate: 72\n",
                old_content: None,
            }],
        )
        .unwrap();

        assert!(dir.join(entry).is_file());
        let history = VersionedFileService::open(&dir).unwrap().history().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].subject, "ledger:append: vitals recorded");
        assert_eq!(history[1].subject, "episode:create: episode admitted");
        assert_eq!(history[0].author_id.as_deref(), Some("nurse-1"));
        assert_eq!(history[0].author_role.as_deref(), Some("nurse"));
    }

    #[test]
    fn failed_commit_rolls_back_new_files_and_dirs() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("ep");
        std::fs::create_dir(&dir).unwrap();
        VersionedFileService::init(&dir).unwrap();

        let bad_author = CommitAuthor {
            name: " ".into(),
            ..author()
        };
        let entry = Path::new("ledger/00000001-vitals.yaml");
        let err = VersionedFileService::write_and_commit_files(
            &dir,
            &bad_author,
            &message(IpdCommitAction::Append),
            &[FileToWrite {
                relative_path: entry,
                content: "heart_rate: 72\n",
                old_content: None,
            }],
        )
        .unwrap_err();

        assert!(matches!(err, EpisodeError::InvalidInput(_)));
        assert!(!dir.join(entry).exists());
        assert!(!dir.join("ledger").exists());
    }

    #[test]
    fn failed_init_removes_directory() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("ep");
        std::fs::create_dir(&dir).unwrap();

        let bad_author = CommitAuthor {
            role: "".into(),
            ..author()
        };
        let err = VersionedFileService::init_and_commit(
            &dir,
            &bad_author,
            &message(IpdCommitAction::Append),
            &[FileToWrite {
                relative_path: Path::new("episode.yaml"),
                content: "x: 1\n",
                old_content: None,
            }],
        )
        .unwrap_err();

        assert!(matches!(err, EpisodeError::InvalidInput(_)));
        assert!(!dir.exists());
    }

    #[test]
    fn rewrite_leaves_no_temporary_files_and_rollback_restores() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("ep");
        std::fs::create_dir(&dir).unwrap();
        let header = Path::new("episode.yaml");
        VersionedFileService::init_and_commit(
            &dir,
            &author(),
            &message(IpdCommitAction::Create),
            &[FileToWrite {
                relative_path: header,
                content: "status: admitted\n",
                old_content: None,
            }],
        )
        .unwrap();

        VersionedFileService::write_and_commit_files(
            &dir,
            &author(),
            &message(IpdCommitAction::Update),
            &[FileToWrite {
                relative_path: header,
                content: "status: critical\n",
                old_content: Some("status: admitted\n"),
            }],
        )
        .unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.join(header)).unwrap(),
            "status: critical\n"
        );

        let bad_author = CommitAuthor {
            name: " ".into(),
            ..author()
        };
        VersionedFileService::write_and_commit_files(
            &dir,
            &bad_author,
            &message(IpdCommitAction::Update),
            &[FileToWrite {
                relative_path: header,
                content: "status: stable\n",
                old_content: Some("status: critical\n"),
            }],
        )
        .unwrap_err();
        assert_eq!(
            std::fs::read_to_string(dir.join(header)).unwrap(),
            "status: critical\n"
        );

        let leftovers: Vec<_> = std::fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
    }

    #[test]
    fn angle_brackets_in_author_do_not_break_commits() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("ep");
        std::fs::create_dir(&dir).unwrap();
        let odd = CommitAuthor {
            id: "dr<1>".into(),
            name: "Dr <Who>".into(),
            role: "doctor".into(),
            email: "dr<1>@ipd.invalid".into(),
        };

        VersionedFileService::init_and_commit(
            &dir,
            &odd,
            &message(IpdCommitAction::Create),
            &[FileToWrite {
                relative_path: Path::new("episode.yaml"),
                content: "status: admitted\n",
                old_content: None,
            }],
        )
        .unwrap();

        let history = VersionedFileService::open(&dir).unwrap().history().unwrap();
        assert_eq!(history[0].author_id.as_deref(), Some("dr<1>"));
    }

    #[test]
    fn failed_cleanup_reports_both_errors() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("ep");
        std::fs::create_dir(&dir).unwrap();

        FORCE_CLEANUP_ERROR_FOR_THREADS
            .lock()
            .unwrap()
            .insert(std::thread::current().id());

        let bad_author = CommitAuthor {
            id: "".into(),
            ..author()
        };
        let err = VersionedFileService::init_and_commit(
            &dir,
            &bad_author,
            &message(IpdCommitAction::Append),
            &[FileToWrite {
                relative_path: Path::new("episode.yaml"),
                content: "x: 1\n",
                old_content: None,
            }],
        )
        .unwrap_err();

        assert!(matches!(
            err,
            EpisodeError::CleanupAfterInitialiseFailed { .. }
        ));
    }

    #[test]
    fn history_of_empty_repo_is_empty() {
        let temp = TempDir::new().unwrap();
        let service = VersionedFileService::init(temp.path()).unwrap();
        assert!(service.history().unwrap().is_empty());
    }
}
