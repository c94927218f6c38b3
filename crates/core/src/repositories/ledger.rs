//! Clinical ledger: append-only vitals, medications, nursing notes and diagnoses.
//!
//! Appends follow the same order as the registry: gate, existence, closed-episode check,
//! field validation. The author and timestamp come from the caller's [`ActorContext`] and the
//! store clock, never from the draft.

use crate::actor::ActorContext;
use crate::authz::{authorize, Operation};
use crate::error::EpisodeResult;
use crate::ledger::{
    DiagnosisDraft, DiagnosisEntry, EpisodeLedger, MedicationDraft, MedicationEntry,
    NursingNoteDraft, NursingNoteEntry, VitalsDraft, VitalsEntry,
};
use crate::repositories::shared::EpisodeStore;
use ipd_uuid::ShardableUuid;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct ClinicalLedger {
    store: Arc<EpisodeStore>,
}

impl ClinicalLedger {
    pub fn new(store: Arc<EpisodeStore>) -> Self {
        Self { store }
    }

    pub fn append_vitals(
        &self,
        actor: &ActorContext,
        episode_id: ShardableUuid,
        draft: VitalsDraft,
    ) -> EpisodeResult<VitalsEntry> {
        let policy = self.store.config().access_policy();
        authorize(actor, &policy.vitals, Operation::AppendVitals)?;
        self.store
            .append_entry(actor, episode_id, |episode| episode.ensure_open(), draft)
    }

    pub fn append_medication(
        &self,
        actor: &ActorContext,
        episode_id: ShardableUuid,
        draft: MedicationDraft,
    ) -> EpisodeResult<MedicationEntry> {
        let policy = self.store.config().access_policy();
        authorize(actor, &policy.medication, Operation::AppendMedication)?;
        self.store
            .append_entry(actor, episode_id, |episode| episode.ensure_open(), draft)
    }

    pub fn append_nursing_note(
        &self,
        actor: &ActorContext,
        episode_id: ShardableUuid,
        draft: NursingNoteDraft,
    ) -> EpisodeResult<NursingNoteEntry> {
        let policy = self.store.config().access_policy();
        authorize(actor, &policy.nursing_note, Operation::AppendNursingNote)?;
        self.store
            .append_entry(actor, episode_id, |episode| episode.ensure_open(), draft)
    }

    /// Diagnosis rights depend on the episode kind, so the kind-specific check runs once the
    /// episode is loaded.
    pub fn append_diagnosis(
        &self,
        actor: &ActorContext,
        episode_id: ShardableUuid,
        draft: DiagnosisDraft,
    ) -> EpisodeResult<DiagnosisEntry> {
        let policy = &self.store.config().access_policy().diagnosis;
        policy.authorize_any_kind(actor, Operation::AppendDiagnosis)?;
        self.store.append_entry(
            actor,
            episode_id,
            |episode| {
                policy.authorize(actor, episode.kind, Operation::AppendDiagnosis)?;
                episode.ensure_open()
            },
            draft,
        )
    }

    /// Every entry of an episode, grouped by kind in sequence order.
    pub fn entries(
        &self,
        actor: &ActorContext,
        episode_id: ShardableUuid,
    ) -> EpisodeResult<EpisodeLedger> {
        let policy = self.store.config().access_policy();
        authorize(actor, &policy.view, Operation::View)?;
        self.store.load_episode(episode_id)?;
        Ok(EpisodeLedger::from_entries(
            self.store.read_ledger(episode_id)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::Role;
    use crate::error::EpisodeError;
    use crate::ledger::{BloodPressure, NoteCategory};
    use crate::repositories::test_support::Harness;
    use chrono::{Duration, NaiveDate};

    fn vitals(hr: u32) -> VitalsDraft {
        VitalsDraft {
            heart_rate: Some(hr),
            ..Default::default()
        }
    }

    fn medication() -> MedicationDraft {
        MedicationDraft {
            medication: "Amoxicillin".into(),
            dosage: "500mg".into(),
            frequency: "TDS".into(),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: None,
            notes: None,
        }
    }

    #[test]
    fn author_and_timestamp_come_from_server() {
        let h = Harness::new();
        let ep = h.admit();
        h.clock.advance(Duration::hours(1));

        let entry = h
            .ledger
            .append_vitals(
                &h.actor(Role::Nurse),
                ep.id,
                VitalsDraft {
                    blood_pressure: Some(BloodPressure {
                        systolic: 120,
                        diastolic: 80,
                    }),
                    ..vitals(72)
                },
            )
            .unwrap();

        assert_eq!(entry.recorded_by, "nurse-1");
        assert_eq!(entry.recorded_date, h.start + Duration::hours(1));
        assert_eq!(entry.episode_ref, ep.id);
        assert_eq!(entry.seq, 1);
    }

    #[test]
    fn sequence_numbers_span_all_kinds() {
        let h = Harness::new();
        let ep = h.admit();

        let v = h
            .ledger
            .append_vitals(&h.actor(Role::Nurse), ep.id, vitals(80))
            .unwrap();
        let m = h
            .ledger
            .append_medication(&h.actor(Role::Doctor), ep.id, medication())
            .unwrap();
        let n = h
            .ledger
            .append_nursing_note(
                &h.actor(Role::Nurse),
                ep.id,
                NursingNoteDraft {
                    category: Some("observation".into()),
                    note: "Comfortable, eating well".into(),
                },
            )
            .unwrap();
        let d = h
            .ledger
            .append_diagnosis(
                &h.actor(Role::Doctor),
                ep.id,
                DiagnosisDraft {
                    condition: "Community acquired pneumonia".into(),
                    notes: Some("CURB-65 score 1".into()),
                },
            )
            .unwrap();

        assert_eq!((v.seq, m.seq, n.seq, d.seq), (1, 2, 3, 4));
        assert_eq!(m.prescribed_by, "doctor-1");
        assert_eq!(n.category, NoteCategory::Observation);
        assert_eq!(d.diagnosed_by, "doctor-1");

        let ledger = h.ledger.entries(&h.actor(Role::Nurse), ep.id).unwrap();
        assert_eq!(ledger.len(), 4);
        assert_eq!(ledger.vitals, vec![v]);
        assert_eq!(ledger.medications, vec![m]);
        assert_eq!(ledger.nursing_notes, vec![n]);
        assert_eq!(ledger.diagnoses, vec![d]);
    }

    #[test]
    fn receptionist_cannot_prescribe_and_nothing_is_written() {
        let h = Harness::new();
        let ep = h.admit();

        let err = h
            .ledger
            .append_medication(&h.actor(Role::Receptionist), ep.id, medication())
            .unwrap_err();
        assert!(matches!(err, EpisodeError::Forbidden));

        let ledger = h.ledger.entries(&h.actor(Role::Doctor), ep.id).unwrap();
        assert!(ledger.is_empty());
        assert_eq!(h.store.history(ep.id).unwrap().len(), 1);
    }

    #[test]
    fn role_lists_do_not_admit_unlisted_roles() {
        let h = Harness::new();
        let ep = h.admit();

        // Nursing notes are nurse/admin only.
        assert!(matches!(
            h.ledger.append_nursing_note(
                &h.actor(Role::Doctor),
                ep.id,
                NursingNoteDraft {
                    category: None,
                    note: "x".into()
                }
            ),
            Err(EpisodeError::Forbidden)
        ));
        // Admin is listed, so passes.
        assert!(h
            .ledger
            .append_nursing_note(
                &h.actor(Role::Admin),
                ep.id,
                NursingNoteDraft {
                    category: None,
                    note: "Chart reviewed".into()
                }
            )
            .is_ok());
    }

    #[test]
    fn forbidden_wins_over_invalid_payload_and_missing_episode() {
        let h = Harness::new();
        let err = h
            .ledger
            .append_vitals(
                &h.actor(Role::Pharmacist),
                ShardableUuid::new(),
                VitalsDraft::default(),
            )
            .unwrap_err();
        assert!(matches!(err, EpisodeError::Forbidden));
    }

    #[test]
    fn missing_episode_wins_over_invalid_payload() {
        let h = Harness::new();
        let err = h
            .ledger
            .append_vitals(
                &h.actor(Role::Nurse),
                ShardableUuid::new(),
                VitalsDraft::default(),
            )
            .unwrap_err();
        assert!(matches!(err, EpisodeError::NotFound));
    }

    #[test]
    fn invalid_payload_names_field_and_writes_nothing() {
        let h = Harness::new();
        let ep = h.admit();
        let err = h
            .ledger
            .append_vitals(&h.actor(Role::Nurse), ep.id, vitals(400))
            .unwrap_err();
        assert!(matches!(err, EpisodeError::Validation { ref field, .. } if field == "heart_rate"));

        // The next entry still gets seq 1.
        let ok = h
            .ledger
            .append_vitals(&h.actor(Role::Nurse), ep.id, vitals(70))
            .unwrap();
        assert_eq!(ok.seq, 1);
    }

    #[test]
    fn diagnosis_policy_depends_on_episode_kind() {
        let h = Harness::new();
        let ward = h.admit();
        let theatre = h.admit_kind("theatre");
        let dx = || DiagnosisDraft {
            condition: "Appendicitis".into(),
            notes: None,
        };

        assert!(h
            .ledger
            .append_diagnosis(&h.actor(Role::Surgeon), theatre.id, dx())
            .is_ok());
        assert!(matches!(
            h.ledger
                .append_diagnosis(&h.actor(Role::Surgeon), ward.id, dx()),
            Err(EpisodeError::Forbidden)
        ));
        // No role that could diagnose under any kind: forbidden before the lookup.
        assert!(matches!(
            h.ledger
                .append_diagnosis(&h.actor(Role::Nurse), ShardableUuid::new(), dx()),
            Err(EpisodeError::Forbidden)
        ));
    }

    #[test]
    fn concurrent_appends_all_persist_with_distinct_seq() {
        let h = Harness::new();
        let ep = h.admit();
        let ledger = h.ledger.clone();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let ledger = ledger.clone();
                let (role, id) = if i % 2 == 0 {
                    (Role::Nurse, "nurse-1")
                } else {
                    (Role::Doctor, "doctor-1")
                };
                std::thread::spawn(move || {
                    ledger.append_vitals(&ActorContext::new(id, role), ep.id, vitals(60 + i))
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        let entries = h.ledger.entries(&h.actor(Role::Nurse), ep.id).unwrap();
        let seqs: Vec<u64> = entries.vitals.iter().map(|v| v.seq).collect();
        assert_eq!(seqs, (1..=8).collect::<Vec<_>>());

        // Stable on re-read.
        let again = h.ledger.entries(&h.actor(Role::Nurse), ep.id).unwrap();
        assert_eq!(again, entries);
    }
}
