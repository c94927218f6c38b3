//! Ports to the external directories an episode refers to.
//!
//! Patients, wards/beds and staff are owned elsewhere. The core only resolves display names
//! through these traits and tells the ward side when a bed should be released.

use crate::episode::DischargeReason;
use chrono::{DateTime, Utc};
use ipd_uuid::{AdmissionNumber, ShardableUuid};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

pub trait PatientDirectory: Send + Sync + fmt::Debug {
    /// Display name used for search and detail views. `None` if the patient is unknown.
    fn display_name(&self, patient_ref: &str) -> Option<String>;
}

pub trait WardDirectory: Send + Sync + fmt::Debug {
    fn ward_name(&self, ward_ref: &str) -> Option<String>;

    /// Best-effort notice that a discharged episode no longer needs its bed.
    ///
    /// Errors are reported back to the caller for logging only; they never undo a discharge.
    fn notify_discharge(&self, notice: &DischargeNotice) -> Result<(), String>;
}

pub trait StaffDirectory: Send + Sync + fmt::Debug {
    fn display_name(&self, actor_id: &str) -> Option<String>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DischargeNotice {
    pub episode_id: ShardableUuid,
    pub admission_number: AdmissionNumber,
    pub ward_ref: String,
    pub bed_ref: String,
    pub reason: DischargeReason,
    pub discharged_at: DateTime<Utc>,
}

/// Name lookup backed by a map, for tests and standalone deployments.
#[derive(Debug, Default)]
pub struct InMemoryPatientDirectory {
    names: RwLock<HashMap<String, String>>,
}

impl InMemoryPatientDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, patient_ref: impl Into<String>, name: impl Into<String>) {
        let mut names = self.names.write().unwrap_or_else(|p| p.into_inner());
        names.insert(patient_ref.into(), name.into());
    }
}

impl PatientDirectory for InMemoryPatientDirectory {
    fn display_name(&self, patient_ref: &str) -> Option<String> {
        let names = self.names.read().unwrap_or_else(|p| p.into_inner());
        names.get(patient_ref).cloned()
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStaffDirectory {
    names: RwLock<HashMap<String, String>>,
}

impl InMemoryStaffDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, actor_id: impl Into<String>, name: impl Into<String>) {
        let mut names = self.names.write().unwrap_or_else(|p| p.into_inner());
        names.insert(actor_id.into(), name.into());
    }
}

impl StaffDirectory for InMemoryStaffDirectory {
    fn display_name(&self, actor_id: &str) -> Option<String> {
        let names = self.names.read().unwrap_or_else(|p| p.into_inner());
        names.get(actor_id).cloned()
    }
}

/// Ward directory that knows ward names and logs discharge notices instead of delivering them.
///
/// Notices are also kept in memory so callers can inspect what would have been sent.
#[derive(Debug, Default)]
pub struct LoggingWardDirectory {
    wards: RwLock<HashMap<String, String>>,
    sent: RwLock<Vec<DischargeNotice>>,
    fail_with: RwLock<Option<String>>,
}

impl LoggingWardDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_ward(&self, ward_ref: impl Into<String>, name: impl Into<String>) {
        let mut wards = self.wards.write().unwrap_or_else(|p| p.into_inner());
        wards.insert(ward_ref.into(), name.into());
    }

    /// Make every subsequent notification fail with `message`.
    pub fn fail_notifications(&self, message: impl Into<String>) {
        let mut fail = self.fail_with.write().unwrap_or_else(|p| p.into_inner());
        *fail = Some(message.into());
    }

    pub fn sent(&self) -> Vec<DischargeNotice> {
        self.sent.read().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

impl WardDirectory for LoggingWardDirectory {
    fn ward_name(&self, ward_ref: &str) -> Option<String> {
        let wards = self.wards.read().unwrap_or_else(|p| p.into_inner());
        wards.get(ward_ref).cloned()
    }

    fn notify_discharge(&self, notice: &DischargeNotice) -> Result<(), String> {
        if let Some(message) = self
            .fail_with
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
        {
            return Err(message);
        }

        tracing::info!(
            episode_id = %notice.episode_id,
            ward = %notice.ward_ref,
            bed = %notice.bed_ref,
            "bed release requested"
        );
        self.sent
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .push(notice.clone());
        Ok(())
    }
}
