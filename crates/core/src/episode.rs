//! The inpatient episode and its admission/discharge state machine.
//!
//! ```text
//!   admitted ⇄ under_observation ⇄ critical ⇄ stable      (any non-terminal to any other)
//!        \____________________________________/
//!                          │ discharge (once)
//!                          ▼
//!                      discharged
//! ```
//!
//! Non-terminal statuses are a flat re-labelling of the patient's condition. `discharged` is
//! reachable only through [`Episode::discharge`] and nothing leaves it.

use crate::error::{EpisodeError, EpisodeResult};
use crate::validation;
use chrono::{DateTime, Utc};
use ipd_types::{NonEmptyText, PhoneNumber};
use ipd_uuid::{AdmissionNumber, ShardableUuid};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Selects which role policy applies to kind-dependent operations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeKind {
    #[default]
    Ward,
    Theatre,
}

impl EpisodeKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ward => "ward",
            Self::Theatre => "theatre",
        }
    }
}

impl FromStr for EpisodeKind {
    type Err = EpisodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "ward" => Ok(Self::Ward),
            "theatre" => Ok(Self::Theatre),
            other => Err(EpisodeError::validation(
                "kind",
                format!("unknown episode kind '{other}'"),
            )),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionType {
    Emergency,
    Elective,
    Transfer,
}

impl AdmissionType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Emergency => "emergency",
            Self::Elective => "elective",
            Self::Transfer => "transfer",
        }
    }
}

impl FromStr for AdmissionType {
    type Err = EpisodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "emergency" => Ok(Self::Emergency),
            "elective" => Ok(Self::Elective),
            "transfer" => Ok(Self::Transfer),
            other => Err(EpisodeError::validation(
                "admission_type",
                format!("unknown admission type '{other}'"),
            )),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeStatus {
    Admitted,
    UnderObservation,
    Critical,
    Stable,
    Discharged,
}

impl EpisodeStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Discharged)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admitted => "admitted",
            Self::UnderObservation => "under_observation",
            Self::Critical => "critical",
            Self::Stable => "stable",
            Self::Discharged => "discharged",
        }
    }
}

impl fmt::Display for EpisodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EpisodeStatus {
    type Err = EpisodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Self::Admitted,
            Self::UnderObservation,
            Self::Critical,
            Self::Stable,
            Self::Discharged,
        ]
        .into_iter()
        .find(|status| status.as_str() == s.trim())
        .ok_or_else(|| EpisodeError::validation("status", format!("unknown status '{s}'")))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DischargeReason {
    Recovered,
    Improved,
    Referred,
    Transferred,
    AgainstMedicalAdvice,
    Absconded,
    Deceased,
}

impl DischargeReason {
    pub const ALL: [DischargeReason; 7] = [
        Self::Recovered,
        Self::Improved,
        Self::Referred,
        Self::Transferred,
        Self::AgainstMedicalAdvice,
        Self::Absconded,
        Self::Deceased,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Recovered => "recovered",
            Self::Improved => "improved",
            Self::Referred => "referred",
            Self::Transferred => "transferred",
            Self::AgainstMedicalAdvice => "against_medical_advice",
            Self::Absconded => "absconded",
            Self::Deceased => "deceased",
        }
    }
}

impl FromStr for DischargeReason {
    type Err = EpisodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|reason| reason.as_str() == s.trim())
            .ok_or_else(|| EpisodeError::validation("reason", format!("unknown reason '{s}'")))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmergencyContact {
    pub name: NonEmptyText,
    pub phone: PhoneNumber,
    pub relationship: NonEmptyText,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Insurance {
    pub provider: NonEmptyText,
    pub policy_number: NonEmptyText,
}

/// Date, reason and summary of a discharge. Present exactly when the episode is discharged,
/// which keeps the three fields set together.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DischargeRecord {
    pub date: DateTime<Utc>,
    pub reason: DischargeReason,
    pub summary: NonEmptyText,
    pub discharged_by: String,
}

/// Raw emergency contact as submitted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EmergencyContactDraft {
    pub name: String,
    pub phone: String,
    pub relationship: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InsuranceDraft {
    pub provider: String,
    pub policy_number: String,
}

/// Raw admission request as submitted by the admission workflow.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdmissionDraft {
    pub patient_ref: String,
    pub ward_ref: String,
    pub bed_ref: String,
    /// `ward` or `theatre`; absent means ward.
    pub kind: Option<String>,
    pub admission_type: String,
    pub admission_reason: String,
    pub emergency_contact: EmergencyContactDraft,
    pub insurance: Option<InsuranceDraft>,
}

/// Validated admission details.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Admission {
    pub patient_ref: NonEmptyText,
    pub ward_ref: NonEmptyText,
    pub bed_ref: NonEmptyText,
    pub kind: EpisodeKind,
    pub admission_type: AdmissionType,
    pub admission_reason: NonEmptyText,
    pub emergency_contact: EmergencyContact,
    pub insurance: Option<Insurance>,
}

impl AdmissionDraft {
    /// Validate fields in declaration order; the first failure is reported.
    pub fn validate(self) -> EpisodeResult<Admission> {
        let patient_ref = validation::required("patient_ref", &self.patient_ref)?;
        let ward_ref = validation::required("ward_ref", &self.ward_ref)?;
        let bed_ref = validation::required("bed_ref", &self.bed_ref)?;
        let kind = match self.kind.as_deref().map(str::trim) {
            None | Some("") => EpisodeKind::default(),
            Some(kind) => kind.parse()?,
        };
        let admission_type = self.admission_type.parse()?;
        let admission_reason = validation::required("admission_reason", &self.admission_reason)?;

        let emergency_contact = EmergencyContact {
            name: validation::required("emergency_contact.name", &self.emergency_contact.name)?,
            phone: validation::phone("emergency_contact.phone", &self.emergency_contact.phone)?,
            relationship: validation::required(
                "emergency_contact.relationship",
                &self.emergency_contact.relationship,
            )?,
        };

        let insurance = self
            .insurance
            .map(|ins| -> EpisodeResult<Insurance> {
                Ok(Insurance {
                    provider: validation::required("insurance.provider", &ins.provider)?,
                    policy_number: validation::required(
                        "insurance.policy_number",
                        &ins.policy_number,
                    )?,
                })
            })
            .transpose()?;

        Ok(Admission {
            patient_ref,
            ward_ref,
            bed_ref,
            kind,
            admission_type,
            admission_reason,
            emergency_contact,
            insurance,
        })
    }
}

/// Discharge request as submitted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DischargeDraft {
    pub reason: String,
    pub summary: String,
}

impl DischargeDraft {
    pub fn validate(self) -> EpisodeResult<(DischargeReason, NonEmptyText)> {
        let reason = self.reason.parse()?;
        let summary = validation::required("summary", &self.summary)?;
        Ok((reason, summary))
    }
}

/// One inpatient admission-to-discharge record.
///
/// Patient, ward and bed are weak references into external directories; the episode never
/// owns them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Episode {
    pub id: ShardableUuid,
    pub admission_number: AdmissionNumber,
    pub kind: EpisodeKind,
    pub patient_ref: NonEmptyText,
    pub ward_ref: NonEmptyText,
    pub bed_ref: NonEmptyText,
    pub admission_date: DateTime<Utc>,
    pub admission_type: AdmissionType,
    pub admission_reason: NonEmptyText,
    pub admitted_by: String,
    pub status: EpisodeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discharge: Option<DischargeRecord>,
    pub emergency_contact: EmergencyContact,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insurance: Option<Insurance>,
    /// Bumped on every write of the episode header.
    pub version: u64,
}

impl Episode {
    pub fn admit(
        id: ShardableUuid,
        admission_number: AdmissionNumber,
        admission: Admission,
        admitted_at: DateTime<Utc>,
        admitted_by: impl Into<String>,
    ) -> Self {
        Self {
            id,
            admission_number,
            kind: admission.kind,
            patient_ref: admission.patient_ref,
            ward_ref: admission.ward_ref,
            bed_ref: admission.bed_ref,
            admission_date: admitted_at,
            admission_type: admission.admission_type,
            admission_reason: admission.admission_reason,
            admitted_by: admitted_by.into(),
            status: EpisodeStatus::Admitted,
            discharge: None,
            emergency_contact: admission.emergency_contact,
            insurance: admission.insurance,
            version: 1,
        }
    }

    pub fn is_discharged(&self) -> bool {
        self.status.is_terminal()
    }

    /// Fails with [`EpisodeError::EpisodeClosed`] once discharged.
    pub fn ensure_open(&self) -> EpisodeResult<()> {
        if self.is_discharged() {
            return Err(EpisodeError::EpisodeClosed);
        }
        Ok(())
    }

    /// Whole days between admission and discharge (or `now` while still admitted).
    ///
    /// Partial days are dropped and clock skew that would make the result negative yields 0.
    pub fn length_of_stay(&self, now: DateTime<Utc>) -> i64 {
        let end = self.discharge.as_ref().map_or(now, |d| d.date);
        (end - self.admission_date).num_days().max(0)
    }

    /// Re-label a non-terminal status.
    pub fn set_status(&mut self, status: EpisodeStatus) -> EpisodeResult<()> {
        self.ensure_open()?;
        if status.is_terminal() {
            return Err(EpisodeError::validation(
                "status",
                "discharged can only be set by the discharge operation",
            ));
        }
        self.status = status;
        self.version += 1;
        Ok(())
    }

    /// The terminal transition. Allowed exactly once.
    pub fn discharge(
        &mut self,
        reason: DischargeReason,
        summary: NonEmptyText,
        at: DateTime<Utc>,
        by: impl Into<String>,
    ) -> EpisodeResult<()> {
        self.ensure_open()?;
        self.status = EpisodeStatus::Discharged;
        self.discharge = Some(DischargeRecord {
            date: at,
            reason,
            summary,
            discharged_by: by.into(),
        });
        self.version += 1;
        Ok(())
    }

    /// Structural invariants that serde alone cannot express.
    pub(crate) fn check_consistency(&self) -> Result<(), String> {
        match (self.status.is_terminal(), &self.discharge) {
            (true, None) => Err("status is discharged but discharge details are missing".into()),
            (false, Some(_)) => Err(format!(
                "discharge details present but status is {}",
                self.status
            )),
            _ => Ok(()),
        }
    }
}
