//! Read side: listing, search and episode detail.

use crate::actor::ActorContext;
use crate::authz::{authorize, Operation};
use crate::directory::{PatientDirectory, WardDirectory};
use crate::episode::{Episode, EpisodeStatus};
use crate::error::EpisodeResult;
use crate::ledger::EpisodeLedger;
use crate::repositories::shared::EpisodeStore;
use crate::versioned_files::CommitRecord;
use ipd_uuid::ShardableUuid;
use serde::Serialize;
use std::sync::Arc;

/// List filters. All are optional and combine with AND.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EpisodeFilter {
    pub status: Option<String>,
    pub ward: Option<String>,
    /// Case-insensitive match on admission number or patient name.
    pub search: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EpisodeSummary {
    pub episode: Episode,
    pub length_of_stay: i64,
    pub patient_name: Option<String>,
    pub ward_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EpisodeDetail {
    pub episode: Episode,
    pub length_of_stay: i64,
    pub patient_name: Option<String>,
    pub ward_name: Option<String>,
    pub ledger: EpisodeLedger,
}

#[derive(Clone, Debug)]
pub struct EpisodeQueryService {
    store: Arc<EpisodeStore>,
    patients: Arc<dyn PatientDirectory>,
    wards: Arc<dyn WardDirectory>,
}

impl EpisodeQueryService {
    pub fn new(
        store: Arc<EpisodeStore>,
        patients: Arc<dyn PatientDirectory>,
        wards: Arc<dyn WardDirectory>,
    ) -> Self {
        Self {
            store,
            patients,
            wards,
        }
    }

    /// Matching episodes, newest admission first.
    ///
    /// Episodes whose header cannot be read are logged and left out rather than failing the
    /// whole listing.
    pub fn list(
        &self,
        actor: &ActorContext,
        filter: EpisodeFilter,
    ) -> EpisodeResult<Vec<EpisodeSummary>> {
        authorize(
            actor,
            &self.store.config().access_policy().view,
            Operation::View,
        )?;

        let status = filter
            .status
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse::<EpisodeStatus>)
            .transpose()?;
        let ward = filter
            .ward
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let needle = filter
            .search
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());

        let now = self.store.now();
        let mut out = Vec::new();
        for id in self.store.episode_ids()? {
            let episode = match self.store.load_episode(id) {
                Ok(episode) => episode,
                Err(e) => {
                    tracing::warn!(episode_id = %id, error = %e, "skipping unreadable episode");
                    continue;
                }
            };

            if status.is_some_and(|s| episode.status != s) {
                continue;
            }
            if ward.is_some_and(|w| episode.ward_ref.as_str() != w) {
                continue;
            }

            let patient_name = self.patients.display_name(episode.patient_ref.as_str());
            if let Some(needle) = &needle {
                let number_hit = episode
                    .admission_number
                    .as_str()
                    .to_lowercase()
                    .contains(needle);
                let name_hit = patient_name
                    .as_deref()
                    .is_some_and(|n| n.to_lowercase().contains(needle));
                if !number_hit && !name_hit {
                    continue;
                }
            }

            out.push(EpisodeSummary {
                length_of_stay: episode.length_of_stay(now),
                ward_name: self.wards.ward_name(episode.ward_ref.as_str()),
                patient_name,
                episode,
            });
        }

        out.sort_by(|a, b| {
            b.episode
                .admission_date
                .cmp(&a.episode.admission_date)
                .then_with(|| a.episode.admission_number.cmp(&b.episode.admission_number))
        });
        Ok(out)
    }

    /// One episode with its full ledger.
    pub fn get(
        &self,
        actor: &ActorContext,
        episode_id: ShardableUuid,
    ) -> EpisodeResult<EpisodeDetail> {
        authorize(
            actor,
            &self.store.config().access_policy().view,
            Operation::View,
        )?;

        let episode = self.store.load_episode(episode_id)?;
        let ledger = EpisodeLedger::from_entries(self.store.read_ledger(episode_id)?);

        Ok(EpisodeDetail {
            length_of_stay: episode.length_of_stay(self.store.now()),
            patient_name: self.patients.display_name(episode.patient_ref.as_str()),
            ward_name: self.wards.ward_name(episode.ward_ref.as_str()),
            episode,
            ledger,
        })
    }

    /// Commit history of one episode, newest first.
    pub fn history(
        &self,
        actor: &ActorContext,
        episode_id: ShardableUuid,
    ) -> EpisodeResult<Vec<CommitRecord>> {
        authorize(
            actor,
            &self.store.config().access_policy().view,
            Operation::View,
        )?;
        self.store.history(episode_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::Role;
    use crate::episode::DischargeDraft;
    use crate::error::EpisodeError;
    use crate::ledger::VitalsDraft;
    use crate::repositories::episodes::StatusChange;
    use crate::repositories::test_support::Harness;
    use chrono::Duration;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn list_filters_by_status_and_ward() {
        let h = Harness::new();
        let a = h.admit();
        h.clock.advance(Duration::minutes(5));
        let b = h.admit_on_ward("ward-9");
        h.registry
            .set_status(
                &h.actor(Role::Nurse),
                b.id,
                StatusChange {
                    status: "critical".into(),
                    expected_version: None,
                },
            )
            .unwrap();

        let viewer = h.actor(Role::Pharmacist);
        let all = h.queries.list(&viewer, EpisodeFilter::default()).unwrap();
        assert_eq!(
            all.iter().map(|s| s.episode.id).collect::<Vec<_>>(),
            vec![b.id, a.id]
        );

        let critical = h
            .queries
            .list(
                &viewer,
                EpisodeFilter {
                    status: Some("critical".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(critical.len(), 1);
        assert_eq!(critical[0].episode.id, b.id);

        let ward7 = h
            .queries
            .list(
                &viewer,
                EpisodeFilter {
                    ward: Some("ward-7".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(ward7.len(), 1);
        assert_eq!(ward7[0].episode.id, a.id);
        assert_eq!(ward7[0].ward_name.as_deref(), Some("Nightingale"));
    }

    #[test]
    fn search_matches_patient_name_and_admission_number() {
        let h = Harness::new();
        let ep = h.admit();
        let viewer = h.actor(Role::Doctor);

        let by_name = h
            .queries
            .list(
                &viewer,
                EpisodeFilter {
                    search: Some("LOVELACE".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].patient_name.as_deref(), Some("Ada Lovelace"));

        let suffix = &ep.admission_number.as_str()[13..];
        let by_number = h
            .queries
            .list(
                &viewer,
                EpisodeFilter {
                    search: Some(suffix.to_lowercase()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(by_number.len(), 1);

        let none = h
            .queries
            .list(
                &viewer,
                EpisodeFilter {
                    search: Some("babbage".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn unknown_status_filter_is_a_validation_error() {
        let h = Harness::new();
        let err = h
            .queries
            .list(
                &h.actor(Role::Doctor),
                EpisodeFilter {
                    status: Some("asleep".into()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, EpisodeError::Validation { .. }));
    }

    #[test]
    fn reads_require_view_permission() {
        let h = Harness::new();
        let ep = h.admit();
        let mortuary = h.actor(Role::MortuaryAttendant);
        assert!(matches!(
            h.queries.list(&mortuary, EpisodeFilter::default()),
            Err(EpisodeError::Forbidden)
        ));
        assert!(matches!(
            h.queries.get(&mortuary, ep.id),
            Err(EpisodeError::Forbidden)
        ));
        assert!(matches!(
            h.queries.history(&mortuary, ep.id),
            Err(EpisodeError::Forbidden)
        ));
    }

    #[test]
    fn get_returns_ledger_and_length_of_stay() {
        let h = Harness::new();
        let ep = h.admit();
        h.ledger
            .append_vitals(
                &h.actor(Role::Nurse),
                ep.id,
                VitalsDraft {
                    heart_rate: Some(72),
                    ..Default::default()
                },
            )
            .unwrap();
        h.clock.advance(Duration::days(3) + Duration::hours(5));

        let detail = h.queries.get(&h.actor(Role::Doctor), ep.id).unwrap();
        assert_eq!(detail.length_of_stay, 3);
        assert_eq!(detail.ledger.vitals.len(), 1);
        assert_eq!(detail.episode, ep);

        assert!(matches!(
            h.queries.get(&h.actor(Role::Doctor), ShardableUuid::new()),
            Err(EpisodeError::NotFound)
        ));
    }

    #[test]
    fn history_lists_commits_newest_first() {
        let h = Harness::new();
        let ep = h.admit();
        h.registry
            .discharge(
                &h.actor(Role::Doctor),
                ep.id,
                DischargeDraft {
                    reason: "improved".into(),
                    summary: "Step-down to community care".into(),
                },
            )
            .unwrap();

        let history = h.queries.history(&h.actor(Role::Doctor), ep.id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].subject, "episode:update: Episode discharged");
        assert_eq!(history[0].author_id.as_deref(), Some("doctor-1"));
        assert_eq!(history[1].subject, "episode:create: Episode admitted");
        assert_eq!(history[1].author_role.as_deref(), Some("receptionist"));
    }

    #[test]
    fn reads_see_whole_files_while_writes_are_in_flight() {
        let h = Arc::new(Harness::new());
        let ep = h.admit();
        let done = Arc::new(AtomicBool::new(false));

        let writer = {
            let h = Arc::clone(&h);
            let done = Arc::clone(&done);
            std::thread::spawn(move || {
                let statuses = ["critical", "stable", "under_observation"];
                for i in 0..60 {
                    h.ledger
                        .append_vitals(
                            &h.actor(Role::Nurse),
                            ep.id,
                            VitalsDraft {
                                heart_rate: Some(70),
                                notes: Some("x".repeat(8 * 1024)),
                                ..Default::default()
                            },
                        )
                        .unwrap();
                    h.registry
                        .set_status(
                            &h.actor(Role::Nurse),
                            ep.id,
                            StatusChange {
                                status: statuses[i % statuses.len()].into(),
                                expected_version: None,
                            },
                        )
                        .unwrap();
                }
                done.store(true, Ordering::SeqCst);
            })
        };

        let viewer = h.actor(Role::Doctor);
        let mut last_seen = 0;
        while !done.load(Ordering::SeqCst) {
            let detail = h.queries.get(&viewer, ep.id).unwrap();
            let seqs: Vec<u64> = detail.ledger.vitals.iter().map(|v| v.seq).collect();
            assert_eq!(seqs, (1..=seqs.len() as u64).collect::<Vec<_>>());
            assert!(seqs.len() >= last_seen);
            last_seen = seqs.len();

            let listed = h.queries.list(&viewer, EpisodeFilter::default()).unwrap();
            assert_eq!(listed.len(), 1);
        }
        writer.join().unwrap();

        let detail = h.queries.get(&viewer, ep.id).unwrap();
        assert_eq!(detail.ledger.vitals.len(), 60);
    }
}
