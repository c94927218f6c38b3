//! # IPD Core
//!
//! Core business logic for the inpatient episode lifecycle.
//!
//! This crate contains pure data operations and file/folder management:
//! - Episode admission, status changes and discharge ([`EpisodeRegistry`])
//! - The append-only clinical ledger of vitals, medications, nursing notes and diagnoses
//!   ([`ClinicalLedger`])
//! - Listing, search and detail reads ([`EpisodeQueryService`])
//! - Role and permission checks ([`authz`]) driven by an explicit [`ActorContext`]
//! - Git-versioned storage, one repository per episode under `<data_dir>/episodes/`
//!
//! **No API concerns**: authentication and HTTP servers belong in `api-rest` and `api-shared`.

pub mod actor;
pub mod authz;
pub mod clock;
pub mod config;
pub mod constants;
pub mod directory;
pub mod episode;
pub mod error;
pub mod ledger;
pub mod repositories;
pub mod validation;
pub mod versioned_files;

pub use actor::{ActorContext, Permission, Role};
pub use authz::{AccessPolicy, Operation};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::CoreConfig;
pub use error::{EpisodeError, EpisodeResult};
pub use repositories::episodes::{EpisodeRegistry, StatusChange};
pub use repositories::ledger::ClinicalLedger;
pub use repositories::query::{EpisodeDetail, EpisodeFilter, EpisodeQueryService, EpisodeSummary};

use directory::{PatientDirectory, StaffDirectory, WardDirectory};
use repositories::shared::EpisodeStore;
use std::sync::Arc;

/// Directory lookups the episode services depend on.
#[derive(Clone, Debug)]
pub struct Directories {
    pub patients: Arc<dyn PatientDirectory>,
    pub wards: Arc<dyn WardDirectory>,
    pub staff: Arc<dyn StaffDirectory>,
}

impl Default for Directories {
    fn default() -> Self {
        Self {
            patients: Arc::new(directory::InMemoryPatientDirectory::new()),
            wards: Arc::new(directory::LoggingWardDirectory::new()),
            staff: Arc::new(directory::InMemoryStaffDirectory::new()),
        }
    }
}

/// All episode services over one data directory.
///
/// The services share a single store and therefore a single set of per-episode write locks.
/// Build one `IpdService` per process and share it.
#[derive(Clone, Debug)]
pub struct IpdService {
    cfg: Arc<CoreConfig>,
    pub registry: Arc<EpisodeRegistry>,
    pub ledger: ClinicalLedger,
    pub queries: EpisodeQueryService,
}

impl IpdService {
    pub fn new(cfg: Arc<CoreConfig>, clock: Arc<dyn Clock>, directories: Directories) -> Self {
        let store = Arc::new(EpisodeStore::new(cfg.clone(), clock, directories.staff));
        Self {
            cfg,
            registry: Arc::new(EpisodeRegistry::new(
                store.clone(),
                directories.wards.clone(),
            )),
            ledger: ClinicalLedger::new(store.clone()),
            queries: EpisodeQueryService::new(store, directories.patients, directories.wards),
        }
    }

    /// Production wiring: system clock and in-process directories.
    pub fn with_defaults(cfg: Arc<CoreConfig>) -> Self {
        Self::new(cfg, Arc::new(SystemClock), Directories::default())
    }

    /// Gate `operation` for `actor` before any input is looked at.
    pub fn check_access(&self, actor: &ActorContext, operation: Operation) -> EpisodeResult<()> {
        self.cfg.access_policy().check(actor, operation)
    }
}
