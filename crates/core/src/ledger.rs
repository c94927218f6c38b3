//! Clinical ledger entries.
//!
//! Four kinds of write-once entry hang off an episode. Each is stored as its own file
//! (`ledger/<seq>-<kind>.yaml`) and never rewritten; corrections are new entries. The per-episode
//! `seq` orders entries independently of wall-clock time.
//!
//! Callers submit a draft (`VitalsDraft`, `MedicationDraft`, ...). The draft is validated into a
//! body, and the store stamps it with id, sequence number, author and timestamp.

use crate::constants::LEDGER_SEQ_WIDTH;
use crate::error::{EpisodeError, EpisodeResult};
use crate::validation;
use chrono::{DateTime, NaiveDate, Utc};
use ipd_types::NonEmptyText;
use ipd_uuid::ShardableUuid;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Vitals,
    Medication,
    NursingNote,
    Diagnosis,
}

impl EntryKind {
    pub const ALL: [EntryKind; 4] = [
        Self::Vitals,
        Self::Medication,
        Self::NursingNote,
        Self::Diagnosis,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Vitals => "vitals",
            Self::Medication => "medication",
            Self::NursingNote => "nursing_note",
            Self::Diagnosis => "diagnosis",
        }
    }

    /// `00000007-vitals.yaml`
    pub fn file_name(self, seq: u64) -> String {
        format!("{seq:0width$}-{}.yaml", self.as_str(), width = LEDGER_SEQ_WIDTH)
    }

    /// Inverse of [`EntryKind::file_name`]. Anything else in the ledger directory is ignored.
    pub fn parse_file_name(name: &str) -> Option<(u64, EntryKind)> {
        let stem = name.strip_suffix(".yaml")?;
        let (seq, kind) = stem.split_once('-')?;
        if seq.len() != LEDGER_SEQ_WIDTH || !seq.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let kind = Self::ALL.into_iter().find(|k| k.as_str() == kind)?;
        Some((seq.parse().ok()?, kind))
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteCategory {
    #[default]
    General,
    Medication,
    VitalSigns,
    Treatment,
    Observation,
    Incident,
}

impl NoteCategory {
    pub const ALL: [NoteCategory; 6] = [
        Self::General,
        Self::Medication,
        Self::VitalSigns,
        Self::Treatment,
        Self::Observation,
        Self::Incident,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Medication => "medication",
            Self::VitalSigns => "vital_signs",
            Self::Treatment => "treatment",
            Self::Observation => "observation",
            Self::Incident => "incident",
        }
    }
}

impl FromStr for NoteCategory {
    type Err = EpisodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s.trim())
            .ok_or_else(|| EpisodeError::validation("category", format!("unknown category '{s}'")))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BloodPressure {
    pub systolic: u32,
    pub diastolic: u32,
}

/// Identity, ordering and attribution assigned by the store, never by the client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryStamp {
    pub id: ShardableUuid,
    pub episode_ref: ShardableUuid,
    pub seq: u64,
    pub author: String,
    pub at: DateTime<Utc>,
}

/// A draft entry that can be validated and then stamped by the store.
pub trait EntryDraft {
    const KIND: EntryKind;
    type Body;
    type Entry: Clone + Into<LedgerEntry>;

    fn validate(self) -> EpisodeResult<Self::Body>;

    fn stamp(body: Self::Body, stamp: EntryStamp) -> Self::Entry;
}

// Vitals

#[derive(Clone, Debug, Default, PartialEq)]
pub struct VitalsDraft {
    pub blood_pressure: Option<BloodPressure>,
    pub heart_rate: Option<u32>,
    pub temperature: Option<f64>,
    pub respiratory_rate: Option<u32>,
    pub oxygen_saturation: Option<u32>,
    pub notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Vitals {
    pub blood_pressure: Option<BloodPressure>,
    pub heart_rate: Option<u32>,
    pub temperature: Option<f64>,
    pub respiratory_rate: Option<u32>,
    pub oxygen_saturation: Option<u32>,
    pub notes: Option<NonEmptyText>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VitalsEntry {
    pub id: ShardableUuid,
    pub episode_ref: ShardableUuid,
    pub seq: u64,
    pub recorded_by: String,
    pub recorded_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blood_pressure: Option<BloodPressure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heart_rate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub respiratory_rate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oxygen_saturation: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<NonEmptyText>,
}

impl EntryDraft for VitalsDraft {
    const KIND: EntryKind = EntryKind::Vitals;
    type Body = Vitals;
    type Entry = VitalsEntry;

    fn validate(self) -> EpisodeResult<Vitals> {
        if self.blood_pressure.is_none()
            && self.heart_rate.is_none()
            && self.temperature.is_none()
            && self.respiratory_rate.is_none()
            && self.oxygen_saturation.is_none()
        {
            return Err(EpisodeError::validation(
                "vitals",
                "at least one measurement is required",
            ));
        }

        if let Some(bp) = self.blood_pressure {
            validation::in_range("blood_pressure.systolic", bp.systolic, 40, 300)?;
            validation::in_range("blood_pressure.diastolic", bp.diastolic, 20, 200)?;
            if bp.systolic <= bp.diastolic {
                return Err(EpisodeError::validation(
                    "blood_pressure.systolic",
                    "must be greater than diastolic",
                ));
            }
        }
        if let Some(hr) = self.heart_rate {
            validation::in_range("heart_rate", hr, 20, 300)?;
        }
        if let Some(t) = self.temperature {
            validation::finite_in_range("temperature", t, 25.0, 45.0)?;
        }
        if let Some(rr) = self.respiratory_rate {
            validation::in_range("respiratory_rate", rr, 4, 80)?;
        }
        if let Some(spo2) = self.oxygen_saturation {
            validation::in_range("oxygen_saturation", spo2, 0, 100)?;
        }

        Ok(Vitals {
            blood_pressure: self.blood_pressure,
            heart_rate: self.heart_rate,
            temperature: self.temperature,
            respiratory_rate: self.respiratory_rate,
            oxygen_saturation: self.oxygen_saturation,
            notes: validation::optional(self.notes.as_deref()),
        })
    }

    fn stamp(body: Vitals, stamp: EntryStamp) -> VitalsEntry {
        VitalsEntry {
            id: stamp.id,
            episode_ref: stamp.episode_ref,
            seq: stamp.seq,
            recorded_by: stamp.author,
            recorded_date: stamp.at,
            blood_pressure: body.blood_pressure,
            heart_rate: body.heart_rate,
            temperature: body.temperature,
            respiratory_rate: body.respiratory_rate,
            oxygen_saturation: body.oxygen_saturation,
            notes: body.notes,
        }
    }
}

// Medication

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MedicationDraft {
    pub medication: String,
    pub dosage: String,
    pub frequency: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Medication {
    pub medication: NonEmptyText,
    pub dosage: NonEmptyText,
    pub frequency: NonEmptyText,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub notes: Option<NonEmptyText>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicationEntry {
    pub id: ShardableUuid,
    pub episode_ref: ShardableUuid,
    pub seq: u64,
    pub medication: NonEmptyText,
    pub dosage: NonEmptyText,
    pub frequency: NonEmptyText,
    pub start_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    pub prescribed_by: String,
    pub prescribed_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<NonEmptyText>,
}

impl EntryDraft for MedicationDraft {
    const KIND: EntryKind = EntryKind::Medication;
    type Body = Medication;
    type Entry = MedicationEntry;

    fn validate(self) -> EpisodeResult<Medication> {
        let medication = validation::required("medication", &self.medication)?;
        let dosage = validation::required("dosage", &self.dosage)?;
        let frequency = validation::required("frequency", &self.frequency)?;
        if let Some(end) = self.end_date {
            if end < self.start_date {
                return Err(EpisodeError::validation(
                    "end_date",
                    "must not be before start_date",
                ));
            }
        }

        Ok(Medication {
            medication,
            dosage,
            frequency,
            start_date: self.start_date,
            end_date: self.end_date,
            notes: validation::optional(self.notes.as_deref()),
        })
    }

    fn stamp(body: Medication, stamp: EntryStamp) -> MedicationEntry {
        MedicationEntry {
            id: stamp.id,
            episode_ref: stamp.episode_ref,
            seq: stamp.seq,
            medication: body.medication,
            dosage: body.dosage,
            frequency: body.frequency,
            start_date: body.start_date,
            end_date: body.end_date,
            prescribed_by: stamp.author,
            prescribed_date: stamp.at,
            notes: body.notes,
        }
    }
}

// Nursing notes

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NursingNoteDraft {
    /// Absent or blank means `general`.
    pub category: Option<String>,
    pub note: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NursingNoteEntry {
    pub id: ShardableUuid,
    pub episode_ref: ShardableUuid,
    pub seq: u64,
    pub category: NoteCategory,
    pub note: NonEmptyText,
    pub recorded_by: String,
    pub recorded_date: DateTime<Utc>,
}

impl EntryDraft for NursingNoteDraft {
    const KIND: EntryKind = EntryKind::NursingNote;
    type Body = (NoteCategory, NonEmptyText);
    type Entry = NursingNoteEntry;

    fn validate(self) -> EpisodeResult<Self::Body> {
        let category = match self.category.as_deref().map(str::trim) {
            None | Some("") => NoteCategory::default(),
            Some(category) => category.parse()?,
        };
        Ok((category, validation::required("note", &self.note)?))
    }

    fn stamp((category, note): Self::Body, stamp: EntryStamp) -> NursingNoteEntry {
        NursingNoteEntry {
            id: stamp.id,
            episode_ref: stamp.episode_ref,
            seq: stamp.seq,
            category,
            note,
            recorded_by: stamp.author,
            recorded_date: stamp.at,
        }
    }
}

// Diagnoses

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DiagnosisDraft {
    pub condition: String,
    pub notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosisEntry {
    pub id: ShardableUuid,
    pub episode_ref: ShardableUuid,
    pub seq: u64,
    pub condition: NonEmptyText,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<NonEmptyText>,
    pub diagnosed_by: String,
    pub diagnosed_date: DateTime<Utc>,
}

impl EntryDraft for DiagnosisDraft {
    const KIND: EntryKind = EntryKind::Diagnosis;
    type Body = (NonEmptyText, Option<NonEmptyText>);
    type Entry = DiagnosisEntry;

    fn validate(self) -> EpisodeResult<Self::Body> {
        Ok((
            validation::required("condition", &self.condition)?,
            validation::optional(self.notes.as_deref()),
        ))
    }

    fn stamp((condition, notes): Self::Body, stamp: EntryStamp) -> DiagnosisEntry {
        DiagnosisEntry {
            id: stamp.id,
            episode_ref: stamp.episode_ref,
            seq: stamp.seq,
            condition,
            notes,
            diagnosed_by: stamp.author,
            diagnosed_date: stamp.at,
        }
    }
}

/// One stored ledger entry, tagged by kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerEntry {
    Vitals(VitalsEntry),
    Medication(MedicationEntry),
    NursingNote(NursingNoteEntry),
    Diagnosis(DiagnosisEntry),
}

impl LedgerEntry {
    pub fn kind(&self) -> EntryKind {
        match self {
            Self::Vitals(_) => EntryKind::Vitals,
            Self::Medication(_) => EntryKind::Medication,
            Self::NursingNote(_) => EntryKind::NursingNote,
            Self::Diagnosis(_) => EntryKind::Diagnosis,
        }
    }

    pub fn seq(&self) -> u64 {
        match self {
            Self::Vitals(e) => e.seq,
            Self::Medication(e) => e.seq,
            Self::NursingNote(e) => e.seq,
            Self::Diagnosis(e) => e.seq,
        }
    }

    pub fn episode_ref(&self) -> ShardableUuid {
        match self {
            Self::Vitals(e) => e.episode_ref,
            Self::Medication(e) => e.episode_ref,
            Self::NursingNote(e) => e.episode_ref,
            Self::Diagnosis(e) => e.episode_ref,
        }
    }
}

impl From<VitalsEntry> for LedgerEntry {
    fn from(e: VitalsEntry) -> Self {
        Self::Vitals(e)
    }
}

impl From<MedicationEntry> for LedgerEntry {
    fn from(e: MedicationEntry) -> Self {
        Self::Medication(e)
    }
}

impl From<NursingNoteEntry> for LedgerEntry {
    fn from(e: NursingNoteEntry) -> Self {
        Self::NursingNote(e)
    }
}

impl From<DiagnosisEntry> for LedgerEntry {
    fn from(e: DiagnosisEntry) -> Self {
        Self::Diagnosis(e)
    }
}

/// All ledger entries of one episode, per kind, each in sequence order.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct EpisodeLedger {
    pub vitals: Vec<VitalsEntry>,
    pub medications: Vec<MedicationEntry>,
    pub nursing_notes: Vec<NursingNoteEntry>,
    pub diagnoses: Vec<DiagnosisEntry>,
}

impl EpisodeLedger {
    /// Group entries by kind. Input order is kept, so pass entries sorted by `seq`.
    pub fn from_entries(entries: impl IntoIterator<Item = LedgerEntry>) -> Self {
        let mut ledger = Self::default();
        for entry in entries {
            match entry {
                LedgerEntry::Vitals(e) => ledger.vitals.push(e),
                LedgerEntry::Medication(e) => ledger.medications.push(e),
                LedgerEntry::NursingNote(e) => ledger.nursing_notes.push(e),
                LedgerEntry::Diagnosis(e) => ledger.diagnoses.push(e),
            }
        }
        ledger
    }

    pub fn len(&self) -> usize {
        self.vitals.len() + self.medications.len() + self.nursing_notes.len() + self.diagnoses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of<T: fmt::Debug>(result: EpisodeResult<T>) -> String {
        match result {
            Err(EpisodeError::Validation { field, .. }) => field,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    fn stamp(seq: u64) -> EntryStamp {
        EntryStamp {
            id: ShardableUuid::new(),
            episode_ref: ShardableUuid::new(),
            seq,
            author: "nurse-1".into(),
            at: Utc::now(),
        }
    }

    #[test]
    fn file_names_parse_back() {
        let name = EntryKind::NursingNote.file_name(12);
        assert_eq!(name, "00000012-nursing_note.yaml");
        assert_eq!(
            EntryKind::parse_file_name(&name),
            Some((12, EntryKind::NursingNote))
        );
        assert_eq!(EntryKind::parse_file_name("12-vitals.yaml"), None);
        assert_eq!(EntryKind::parse_file_name("00000001-billing.yaml"), None);
        assert_eq!(EntryKind::parse_file_name(".gitkeep"), None);
    }

    #[test]
    fn vitals_require_a_measurement() {
        assert_eq!(field_of(VitalsDraft::default().validate()), "vitals");
    }

    #[test]
    fn vitals_ranges_name_the_field() {
        let draft = |f: fn(&mut VitalsDraft)| {
            let mut d = VitalsDraft {
                heart_rate: Some(72),
                ..Default::default()
            };
            f(&mut d);
            d.validate()
        };

        assert_eq!(field_of(draft(|d| d.heart_rate = Some(301))), "heart_rate");
        assert_eq!(
            field_of(draft(|d| d.temperature = Some(46.1))),
            "temperature"
        );
        assert_eq!(
            field_of(draft(|d| d.respiratory_rate = Some(3))),
            "respiratory_rate"
        );
        assert_eq!(
            field_of(draft(|d| d.oxygen_saturation = Some(101))),
            "oxygen_saturation"
        );
        assert_eq!(
            field_of(draft(|d| d.blood_pressure = Some(BloodPressure {
                systolic: 35,
                diastolic: 20
            }))),
            "blood_pressure.systolic"
        );
        assert_eq!(
            field_of(draft(|d| d.blood_pressure = Some(BloodPressure {
                systolic: 120,
                diastolic: 201
            }))),
            "blood_pressure.diastolic"
        );
    }

    #[test]
    fn systolic_must_exceed_diastolic() {
        let draft = VitalsDraft {
            blood_pressure: Some(BloodPressure {
                systolic: 80,
                diastolic: 80,
            }),
            ..Default::default()
        };
        assert_eq!(field_of(draft.validate()), "blood_pressure.systolic");
    }

    #[test]
    fn vitals_stamp_carries_author_and_seq() {
        let body = VitalsDraft {
            heart_rate: Some(72),
            temperature: Some(37.0),
            notes: Some("  ".into()),
            ..Default::default()
        }
        .validate()
        .unwrap();
        let entry = VitalsDraft::stamp(body, stamp(4));
        assert_eq!(entry.recorded_by, "nurse-1");
        assert_eq!(entry.seq, 4);
        assert_eq!(entry.heart_rate, Some(72));
        assert!(entry.notes.is_none());
    }

    #[test]
    fn medication_end_date_not_before_start() {
        let draft = MedicationDraft {
            medication: "Amoxicillin".into(),
            dosage: "500mg".into(),
            frequency: "TDS".into(),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 1, 4),
            notes: None,
        };
        assert_eq!(field_of(draft.clone().validate()), "end_date");

        let same_day = MedicationDraft {
            end_date: NaiveDate::from_ymd_opt(2024, 1, 5),
            ..draft
        };
        assert!(same_day.validate().is_ok());
    }

    #[test]
    fn medication_requires_dosage() {
        let draft = MedicationDraft {
            medication: "Paracetamol".into(),
            dosage: "".into(),
            frequency: "QDS".into(),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: None,
            notes: None,
        };
        assert_eq!(field_of(draft.validate()), "dosage");
    }

    #[test]
    fn note_category_defaults_and_rejects_unknown() {
        let (category, _) = NursingNoteDraft {
            category: None,
            note: "Settled overnight".into(),
        }
        .validate()
        .unwrap();
        assert_eq!(category, NoteCategory::General);

        let unknown = NursingNoteDraft {
            category: Some("gossip".into()),
            note: "x".into(),
        };
        assert_eq!(field_of(unknown.validate()), "category");
    }

    #[test]
    fn note_and_condition_are_required() {
        assert_eq!(field_of(NursingNoteDraft::default().validate()), "note");
        assert_eq!(field_of(DiagnosisDraft::default().validate()), "condition");
    }

    #[test]
    fn tagged_entry_survives_yaml() {
        let body = NursingNoteDraft {
            category: Some("incident".into()),
            note: "Correction: previous BP entered against wrong time".into(),
        }
        .validate()
        .unwrap();
        let entry: LedgerEntry = NursingNoteDraft::stamp(body, stamp(2)).into();

        let yaml = serde_yaml::to_string(&entry).unwrap();
        assert!(yaml.contains("kind: nursing_note"));
        assert!(yaml.contains("category: incident"));

        let back: LedgerEntry = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, entry);
        assert_eq!(back.kind(), EntryKind::NursingNote);
        assert_eq!(back.seq(), 2);
    }

    #[test]
    fn episode_ledger_groups_by_kind_in_order() {
        let v1 = VitalsDraft::stamp(
            VitalsDraft {
                heart_rate: Some(70),
                ..Default::default()
            }
            .validate()
            .unwrap(),
            stamp(1),
        );
        let d2 = DiagnosisDraft::stamp(
            DiagnosisDraft {
                condition: "Pneumonia".into(),
                notes: None,
            }
            .validate()
            .unwrap(),
            stamp(2),
        );
        let v3 = VitalsDraft::stamp(
            VitalsDraft {
                heart_rate: Some(90),
                ..Default::default()
            }
            .validate()
            .unwrap(),
            stamp(3),
        );

        let ledger = EpisodeLedger::from_entries([v1.into(), d2.into(), v3.into()]);
        assert_eq!(ledger.len(), 3);
        assert_eq!(
            ledger.vitals.iter().map(|v| v.seq).collect::<Vec<_>>(),
            vec![1, 3]
        );
        assert_eq!(ledger.diagnoses.len(), 1);
        assert!(ledger.medications.is_empty());
    }
}
