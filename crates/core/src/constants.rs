//! Path and filename constants used throughout the IPD core crate.

/// Directory (under the data dir) holding one sharded git repository per episode.
pub const EPISODES_DIR_NAME: &str = "episodes";

/// Default data directory when none is configured.
pub const DEFAULT_DATA_DIR: &str = "ipd_data";

/// Default care location written into commit trailers.
pub const DEFAULT_CARE_LOCATION: &str = "Inpatient Department";

/// Mutable episode header file, rewritten on admission, status change and discharge.
pub const EPISODE_FILENAME: &str = "episode.yaml";

/// Directory inside an episode repository holding write-once ledger entries.
pub const LEDGER_DIR_NAME: &str = "ledger";

/// Width of the zero-padded sequence prefix on ledger entry filenames.
pub const LEDGER_SEQ_WIDTH: usize = 8;

/// Domain used to build commit author emails (`<actor-id>@<domain>`).
pub const COMMIT_EMAIL_DOMAIN: &str = "ipd.invalid";
