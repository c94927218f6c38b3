//! Episode registry: admission, status changes and discharge.
//!
//! Every call checks authorization first, then that the episode exists, then that it is still
//! open, and only then validates the payload. A caller who fails the gate never learns whether
//! the episode exists or whether the payload would have been accepted.

use crate::actor::ActorContext;
use crate::authz::{authorize, Operation};
use crate::directory::{DischargeNotice, WardDirectory};
use crate::episode::{AdmissionDraft, DischargeDraft, Episode, EpisodeStatus};
use crate::error::{EpisodeError, EpisodeResult};
use crate::repositories::shared::EpisodeStore;
use ipd_uuid::{AdmissionNumber, ShardableUuid};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Requested non-terminal status change.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatusChange {
    pub status: String,
    /// When set, the change only applies if the episode is still at this version.
    pub expected_version: Option<u64>,
}

#[derive(Debug)]
pub struct EpisodeRegistry {
    store: Arc<EpisodeStore>,
    wards: Arc<dyn WardDirectory>,
    admissions: Mutex<()>,
}

impl EpisodeRegistry {
    pub fn new(store: Arc<EpisodeStore>, wards: Arc<dyn WardDirectory>) -> Self {
        Self {
            store,
            wards,
            admissions: Mutex::new(()),
        }
    }

    /// Admit a patient: create a new episode in status `admitted`.
    pub fn admit(&self, actor: &ActorContext, draft: AdmissionDraft) -> EpisodeResult<Episode> {
        let policy = self.store.config().access_policy();
        authorize(actor, &policy.admit, Operation::Admit)?;

        let admission = draft.validate()?;

        // Admission numbers are allocated one at a time so two admissions never share one.
        let _guard = self
            .admissions
            .lock()
            .map_err(|_| EpisodeError::LockPoisoned)?;
        let now = self.store.now();
        let admission_number = self.allocate_admission_number(now)?;

        let episode = self.store.create_episode(actor, |id| {
            Episode::admit(id, admission_number, admission, now, actor.id())
        })?;

        tracing::info!(
            episode_id = %episode.id,
            admission_number = %episode.admission_number,
            kind = episode.kind.as_str(),
            "episode admitted"
        );
        Ok(episode)
    }

    fn allocate_admission_number(
        &self,
        now: chrono::DateTime<chrono::Utc>,
    ) -> EpisodeResult<AdmissionNumber> {
        let mut taken = HashSet::new();
        for id in self.store.episode_ids()? {
            match self.store.load_episode(id) {
                Ok(episode) => {
                    taken.insert(episode.admission_number);
                }
                Err(e) => {
                    tracing::warn!(episode_id = %id, error = %e, "skipping unreadable episode");
                }
            }
        }

        for _attempt in 0..5 {
            let candidate = AdmissionNumber::generate(now);
            if !taken.contains(&candidate) {
                return Ok(candidate);
            }
        }
        Err(EpisodeError::AdmissionNumberExhausted)
    }

    /// Re-label a non-terminal status. `discharged` is rejected; use [`Self::discharge`].
    pub fn set_status(
        &self,
        actor: &ActorContext,
        episode_id: ShardableUuid,
        change: StatusChange,
    ) -> EpisodeResult<Episode> {
        let policy = self.store.config().access_policy();
        authorize(actor, &policy.set_status, Operation::SetStatus)?;

        let episode = self
            .store
            .update_episode(actor, episode_id, "Episode status changed", |episode| {
                episode.ensure_open()?;
                if let Some(expected) = change.expected_version {
                    if episode.version != expected {
                        return Err(EpisodeError::Conflict {
                            expected,
                            actual: episode.version,
                        });
                    }
                }
                let status: EpisodeStatus = change.status.parse()?;
                episode.set_status(status)
            })?;

        tracing::info!(
            episode_id = %episode.id,
            status = %episode.status,
            version = episode.version,
            "episode status changed"
        );
        Ok(episode)
    }

    /// The terminal transition.
    ///
    /// The status check and write happen under the episode lock, so of two concurrent calls
    /// exactly one succeeds and the other sees [`EpisodeError::EpisodeClosed`]. The ward is
    /// told afterwards; a failed notification is logged and the discharge stands.
    pub fn discharge(
        &self,
        actor: &ActorContext,
        episode_id: ShardableUuid,
        draft: DischargeDraft,
    ) -> EpisodeResult<Episode> {
        let policy = &self.store.config().access_policy().discharge;
        policy.authorize_any_kind(actor, Operation::Discharge)?;

        let episode = self
            .store
            .update_episode(actor, episode_id, "Episode discharged", |episode| {
                policy.authorize(actor, episode.kind, Operation::Discharge)?;
                episode.ensure_open()?;
                let (reason, summary) = draft.validate()?;
                episode.discharge(reason, summary, self.store.now(), actor.id())
            })?;

        tracing::info!(episode_id = %episode.id, "episode discharged");
        self.notify_ward(&episode);
        Ok(episode)
    }

    fn notify_ward(&self, episode: &Episode) {
        let Some(discharge) = &episode.discharge else {
            return;
        };
        let notice = DischargeNotice {
            episode_id: episode.id,
            admission_number: episode.admission_number.clone(),
            ward_ref: episode.ward_ref.to_string(),
            bed_ref: episode.bed_ref.to_string(),
            reason: discharge.reason,
            discharged_at: discharge.date,
        };
        if let Err(error) = self.wards.notify_discharge(&notice) {
            tracing::warn!(
                episode_id = %episode.id,
                ward = %episode.ward_ref,
                %error,
                "ward notification failed; discharge stands"
            );
        }
    }
}
