//! JSON request and response bodies.
//!
//! Enumerated values (`kind`, `admission_type`, `status`, `reason`, `category`) travel as plain
//! strings and are checked by the core after authorization, so an unknown value is reported
//! as a field validation error rather than a body parse failure.

use chrono::{DateTime, NaiveDate, Utc};
use ipd_core::episode::{
    AdmissionDraft, DischargeDraft, DischargeRecord, EmergencyContactDraft, Episode,
    InsuranceDraft,
};
use ipd_core::ledger::{
    BloodPressure, DiagnosisDraft, DiagnosisEntry, EpisodeLedger, MedicationDraft,
    MedicationEntry, NursingNoteDraft, NursingNoteEntry, VitalsDraft, VitalsEntry,
};
use ipd_core::versioned_files::CommitRecord;
use ipd_core::{EpisodeDetail, EpisodeSummary, StatusChange};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// Requests

#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct EmergencyContactReq {
    pub name: String,
    pub phone: String,
    pub relationship: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct InsuranceReq {
    pub provider: String,
    pub policy_number: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct AdmitEpisodeReq {
    pub patient_ref: String,
    pub ward_ref: String,
    pub bed_ref: String,
    /// `ward` (default) or `theatre`.
    #[serde(default)]
    pub kind: Option<String>,
    /// `emergency`, `elective` or `transfer`.
    pub admission_type: String,
    pub admission_reason: String,
    pub emergency_contact: EmergencyContactReq,
    #[serde(default)]
    pub insurance: Option<InsuranceReq>,
}

impl From<AdmitEpisodeReq> for AdmissionDraft {
    fn from(req: AdmitEpisodeReq) -> Self {
        AdmissionDraft {
            patient_ref: req.patient_ref,
            ward_ref: req.ward_ref,
            bed_ref: req.bed_ref,
            kind: req.kind,
            admission_type: req.admission_type,
            admission_reason: req.admission_reason,
            emergency_contact: EmergencyContactDraft {
                name: req.emergency_contact.name,
                phone: req.emergency_contact.phone,
                relationship: req.emergency_contact.relationship,
            },
            insurance: req.insurance.map(|i| InsuranceDraft {
                provider: i.provider,
                policy_number: i.policy_number,
            }),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct SetStatusReq {
    pub status: String,
    #[serde(default)]
    pub expected_version: Option<u64>,
}

impl From<SetStatusReq> for StatusChange {
    fn from(req: SetStatusReq) -> Self {
        StatusChange {
            status: req.status,
            expected_version: req.expected_version,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct DischargeReq {
    pub reason: String,
    pub summary: String,
}

impl From<DischargeReq> for DischargeDraft {
    fn from(req: DischargeReq) -> Self {
        DischargeDraft {
            reason: req.reason,
            summary: req.summary,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BloodPressureDto {
    pub systolic: u32,
    pub diastolic: u32,
}

impl From<BloodPressure> for BloodPressureDto {
    fn from(bp: BloodPressure) -> Self {
        Self {
            systolic: bp.systolic,
            diastolic: bp.diastolic,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct VitalsReq {
    #[serde(default)]
    pub blood_pressure: Option<BloodPressureDto>,
    #[serde(default)]
    pub heart_rate: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub respiratory_rate: Option<u32>,
    #[serde(default)]
    pub oxygen_saturation: Option<u32>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl From<VitalsReq> for VitalsDraft {
    fn from(req: VitalsReq) -> Self {
        VitalsDraft {
            blood_pressure: req.blood_pressure.map(|bp| BloodPressure {
                systolic: bp.systolic,
                diastolic: bp.diastolic,
            }),
            heart_rate: req.heart_rate,
            temperature: req.temperature,
            respiratory_rate: req.respiratory_rate,
            oxygen_saturation: req.oxygen_saturation,
            notes: req.notes,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct MedicationReq {
    pub medication: String,
    pub dosage: String,
    pub frequency: String,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl From<MedicationReq> for MedicationDraft {
    fn from(req: MedicationReq) -> Self {
        MedicationDraft {
            medication: req.medication,
            dosage: req.dosage,
            frequency: req.frequency,
            start_date: req.start_date,
            end_date: req.end_date,
            notes: req.notes,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct NursingNoteReq {
    /// Defaults to `general`.
    #[serde(default)]
    pub category: Option<String>,
    pub note: String,
}

impl From<NursingNoteReq> for NursingNoteDraft {
    fn from(req: NursingNoteReq) -> Self {
        NursingNoteDraft {
            category: req.category,
            note: req.note,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct DiagnosisReq {
    pub condition: String,
    #[serde(default)]
    pub notes: Option<String>,
}

impl From<DiagnosisReq> for DiagnosisDraft {
    fn from(req: DiagnosisReq) -> Self {
        DiagnosisDraft {
            condition: req.condition,
            notes: req.notes,
        }
    }
}

// Responses

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct EmergencyContactRes {
    pub name: String,
    pub phone: String,
    pub relationship: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct InsuranceRes {
    pub provider: String,
    pub policy_number: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DischargeRes {
    pub date: DateTime<Utc>,
    pub reason: String,
    pub summary: String,
    pub discharged_by: String,
}

impl From<DischargeRecord> for DischargeRes {
    fn from(d: DischargeRecord) -> Self {
        Self {
            date: d.date,
            reason: d.reason.as_str().to_string(),
            summary: d.summary.into_inner(),
            discharged_by: d.discharged_by,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct EpisodeRes {
    pub id: String,
    pub admission_number: String,
    pub kind: String,
    pub patient_ref: String,
    pub ward_ref: String,
    pub bed_ref: String,
    pub admission_date: DateTime<Utc>,
    pub admission_type: String,
    pub admission_reason: String,
    pub admitted_by: String,
    pub status: String,
    pub discharge: Option<DischargeRes>,
    pub emergency_contact: EmergencyContactRes,
    pub insurance: Option<InsuranceRes>,
    pub version: u64,
}

impl From<Episode> for EpisodeRes {
    fn from(e: Episode) -> Self {
        Self {
            id: e.id.to_string(),
            admission_number: e.admission_number.to_string(),
            kind: e.kind.as_str().to_string(),
            patient_ref: e.patient_ref.into_inner(),
            ward_ref: e.ward_ref.into_inner(),
            bed_ref: e.bed_ref.into_inner(),
            admission_date: e.admission_date,
            admission_type: e.admission_type.as_str().to_string(),
            admission_reason: e.admission_reason.into_inner(),
            admitted_by: e.admitted_by,
            status: e.status.as_str().to_string(),
            discharge: e.discharge.map(DischargeRes::from),
            emergency_contact: EmergencyContactRes {
                name: e.emergency_contact.name.into_inner(),
                phone: e.emergency_contact.phone.to_string(),
                relationship: e.emergency_contact.relationship.into_inner(),
            },
            insurance: e.insurance.map(|i| InsuranceRes {
                provider: i.provider.into_inner(),
                policy_number: i.policy_number.into_inner(),
            }),
            version: e.version,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct EpisodeSummaryRes {
    pub episode: EpisodeRes,
    pub length_of_stay: i64,
    pub patient_name: Option<String>,
    pub ward_name: Option<String>,
}

impl From<EpisodeSummary> for EpisodeSummaryRes {
    fn from(s: EpisodeSummary) -> Self {
        Self {
            episode: s.episode.into(),
            length_of_stay: s.length_of_stay,
            patient_name: s.patient_name,
            ward_name: s.ward_name,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ListEpisodesRes {
    pub episodes: Vec<EpisodeSummaryRes>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct VitalsEntryRes {
    pub id: String,
    pub seq: u64,
    pub recorded_by: String,
    pub recorded_date: DateTime<Utc>,
    pub blood_pressure: Option<BloodPressureDto>,
    pub heart_rate: Option<u32>,
    pub temperature: Option<f64>,
    pub respiratory_rate: Option<u32>,
    pub oxygen_saturation: Option<u32>,
    pub notes: Option<String>,
}

impl From<VitalsEntry> for VitalsEntryRes {
    fn from(v: VitalsEntry) -> Self {
        Self {
            id: v.id.to_string(),
            seq: v.seq,
            recorded_by: v.recorded_by,
            recorded_date: v.recorded_date,
            blood_pressure: v.blood_pressure.map(BloodPressureDto::from),
            heart_rate: v.heart_rate,
            temperature: v.temperature,
            respiratory_rate: v.respiratory_rate,
            oxygen_saturation: v.oxygen_saturation,
            notes: v.notes.map(|n| n.into_inner()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MedicationEntryRes {
    pub id: String,
    pub seq: u64,
    pub medication: String,
    pub dosage: String,
    pub frequency: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub prescribed_by: String,
    pub prescribed_date: DateTime<Utc>,
    pub notes: Option<String>,
}

impl From<MedicationEntry> for MedicationEntryRes {
    fn from(m: MedicationEntry) -> Self {
        Self {
            id: m.id.to_string(),
            seq: m.seq,
            medication: m.medication.into_inner(),
            dosage: m.dosage.into_inner(),
            frequency: m.frequency.into_inner(),
            start_date: m.start_date,
            end_date: m.end_date,
            prescribed_by: m.prescribed_by,
            prescribed_date: m.prescribed_date,
            notes: m.notes.map(|n| n.into_inner()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct NursingNoteEntryRes {
    pub id: String,
    pub seq: u64,
    pub category: String,
    pub note: String,
    pub recorded_by: String,
    pub recorded_date: DateTime<Utc>,
}

impl From<NursingNoteEntry> for NursingNoteEntryRes {
    fn from(n: NursingNoteEntry) -> Self {
        Self {
            id: n.id.to_string(),
            seq: n.seq,
            category: n.category.as_str().to_string(),
            note: n.note.into_inner(),
            recorded_by: n.recorded_by,
            recorded_date: n.recorded_date,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DiagnosisEntryRes {
    pub id: String,
    pub seq: u64,
    pub condition: String,
    pub notes: Option<String>,
    pub diagnosed_by: String,
    pub diagnosed_date: DateTime<Utc>,
}

impl From<DiagnosisEntry> for DiagnosisEntryRes {
    fn from(d: DiagnosisEntry) -> Self {
        Self {
            id: d.id.to_string(),
            seq: d.seq,
            condition: d.condition.into_inner(),
            notes: d.notes.map(|n| n.into_inner()),
            diagnosed_by: d.diagnosed_by,
            diagnosed_date: d.diagnosed_date,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LedgerRes {
    pub vitals: Vec<VitalsEntryRes>,
    pub medications: Vec<MedicationEntryRes>,
    pub nursing_notes: Vec<NursingNoteEntryRes>,
    pub diagnoses: Vec<DiagnosisEntryRes>,
}

impl From<EpisodeLedger> for LedgerRes {
    fn from(l: EpisodeLedger) -> Self {
        Self {
            vitals: l.vitals.into_iter().map(Into::into).collect(),
            medications: l.medications.into_iter().map(Into::into).collect(),
            nursing_notes: l.nursing_notes.into_iter().map(Into::into).collect(),
            diagnoses: l.diagnoses.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EpisodeDetailRes {
    pub episode: EpisodeRes,
    pub length_of_stay: i64,
    pub patient_name: Option<String>,
    pub ward_name: Option<String>,
    pub ledger: LedgerRes,
}

impl From<EpisodeDetail> for EpisodeDetailRes {
    fn from(d: EpisodeDetail) -> Self {
        Self {
            episode: d.episode.into(),
            length_of_stay: d.length_of_stay,
            patient_name: d.patient_name,
            ward_name: d.ward_name,
            ledger: d.ledger.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CommitRes {
    pub id: String,
    pub subject: String,
    pub author_id: Option<String>,
    pub author_role: Option<String>,
    pub committed_at: DateTime<Utc>,
}

impl From<CommitRecord> for CommitRes {
    fn from(c: CommitRecord) -> Self {
        Self {
            id: c.id,
            subject: c.subject,
            author_id: c.author_id,
            author_role: c.author_role,
            committed_at: c.committed_at,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HistoryRes {
    pub commits: Vec<CommitRes>,
}

/// Error body. `field` is set for validation failures.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorRes {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}
