//! Authorization gate and access policy.
//!
//! A [`Requirement`] is either a role list (identity check, admin only passes if listed) or a
//! permission list (admin wildcard always passes). [`authorize`] is the single gate every
//! operation goes through before touching storage.
//!
//! Which requirement guards which operation is data, held in [`AccessPolicy`] and loadable from
//! YAML, so the production policy can change without code changes. Operations whose policy
//! depends on the episode kind use a [`KindPolicy`].

use crate::actor::{ActorContext, Permission, Role};
use crate::episode::EpisodeKind;
use crate::error::{EpisodeError, EpisodeResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// In YAML a requirement is written as `{ check: any_role, values: [doctor, admin] }`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "check", content = "values", rename_all = "snake_case")]
pub enum Requirement {
    AnyRole(Vec<Role>),
    AnyPermission(Vec<Permission>),
    AllPermissions(Vec<Permission>),
}

impl Requirement {
    pub fn roles(roles: &[Role]) -> Self {
        Self::AnyRole(roles.to_vec())
    }

    pub fn permission(permission: Permission) -> Self {
        Self::AnyPermission(vec![permission])
    }

    pub fn is_satisfied_by(&self, actor: &ActorContext) -> bool {
        match self {
            Self::AnyRole(roles) => actor.has_any_role(roles),
            Self::AnyPermission(permissions) => actor.has_any_permission(permissions),
            Self::AllPermissions(permissions) => actor.has_all_permissions(permissions),
        }
    }
}

/// Operation names used in gate decisions and log lines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Admit,
    View,
    SetStatus,
    AppendVitals,
    AppendMedication,
    AppendNursingNote,
    AppendDiagnosis,
    Discharge,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Admit => "admit",
            Self::View => "view",
            Self::SetStatus => "set_status",
            Self::AppendVitals => "append_vitals",
            Self::AppendMedication => "append_medication",
            Self::AppendNursingNote => "append_nursing_note",
            Self::AppendDiagnosis => "append_diagnosis",
            Self::Discharge => "discharge",
        })
    }
}

/// Allow or deny `actor` for `operation`.
///
/// A denial returns [`EpisodeError::Forbidden`] and carries no hint of what was required.
pub fn authorize(
    actor: &ActorContext,
    requirement: &Requirement,
    operation: Operation,
) -> EpisodeResult<()> {
    if requirement.is_satisfied_by(actor) {
        return Ok(());
    }
    tracing::debug!(
        actor_id = actor.id(),
        role = %actor.role(),
        %operation,
        "authorization denied"
    );
    Err(EpisodeError::Forbidden)
}

/// A requirement per episode kind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindPolicy {
    pub ward: Requirement,
    pub theatre: Requirement,
}

impl KindPolicy {
    pub fn uniform(requirement: Requirement) -> Self {
        Self {
            ward: requirement.clone(),
            theatre: requirement,
        }
    }

    pub fn for_kind(&self, kind: EpisodeKind) -> &Requirement {
        match kind {
            EpisodeKind::Ward => &self.ward,
            EpisodeKind::Theatre => &self.theatre,
        }
    }

    /// Kind-independent pre-check, run before the episode is loaded so a caller who could not
    /// pass for any kind learns nothing about whether the episode exists.
    pub fn authorize_any_kind(
        &self,
        actor: &ActorContext,
        operation: Operation,
    ) -> EpisodeResult<()> {
        if self.ward.is_satisfied_by(actor) || self.theatre.is_satisfied_by(actor) {
            return Ok(());
        }
        authorize(actor, &self.ward, operation)
    }

    pub fn authorize(
        &self,
        actor: &ActorContext,
        kind: EpisodeKind,
        operation: Operation,
    ) -> EpisodeResult<()> {
        authorize(actor, self.for_kind(kind), operation)
    }
}

/// Which requirement guards each operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AccessPolicy {
    pub admit: Requirement,
    pub view: Requirement,
    pub set_status: Requirement,
    pub vitals: Requirement,
    pub medication: Requirement,
    pub nursing_note: Requirement,
    pub diagnosis: KindPolicy,
    pub discharge: KindPolicy,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        use Role::*;
        Self {
            admit: Requirement::permission(Permission::ManageAdmissions),
            view: Requirement::permission(Permission::ViewPatients),
            set_status: Requirement::roles(&[Doctor, Nurse, Admin]),
            vitals: Requirement::roles(&[Doctor, Nurse, Admin]),
            medication: Requirement::roles(&[Doctor, Admin]),
            nursing_note: Requirement::roles(&[Nurse, Admin]),
            diagnosis: KindPolicy {
                ward: Requirement::roles(&[Doctor, Admin]),
                theatre: Requirement::roles(&[Doctor, Surgeon, Admin]),
            },
            discharge: KindPolicy::uniform(Requirement::roles(&[Doctor, Surgeon, Admin])),
        }
    }
}

impl AccessPolicy {
    /// Gate decision for `operation` without an episode in hand.
    ///
    /// Kind-dependent operations get the any-kind check here; the per-kind check runs once
    /// the episode is loaded.
    pub fn check(&self, actor: &ActorContext, operation: Operation) -> EpisodeResult<()> {
        let requirement = match operation {
            Operation::Admit => &self.admit,
            Operation::View => &self.view,
            Operation::SetStatus => &self.set_status,
            Operation::AppendVitals => &self.vitals,
            Operation::AppendMedication => &self.medication,
            Operation::AppendNursingNote => &self.nursing_note,
            Operation::AppendDiagnosis => {
                return self.diagnosis.authorize_any_kind(actor, operation);
            }
            Operation::Discharge => return self.discharge.authorize_any_kind(actor, operation),
        };
        authorize(actor, requirement, operation)
    }

    /// Parse a policy document. Keys left out keep their defaults.
    pub fn from_yaml_str(yaml_text: &str) -> EpisodeResult<Self> {
        crate::repositories::shared::parse_yaml(yaml_text, "access policy")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(role: Role) -> ActorContext {
        ActorContext::new(format!("{role}-1"), role)
    }

    #[test]
    fn role_requirement_does_not_admit_unlisted_admin() {
        let req = Requirement::roles(&[Role::Doctor]);
        assert!(matches!(
            authorize(&actor(Role::Admin), &req, Operation::Discharge),
            Err(EpisodeError::Forbidden)
        ));
        assert!(authorize(&actor(Role::Doctor), &req, Operation::Discharge).is_ok());
    }

    #[test]
    fn permission_requirement_admits_admin() {
        let req = Requirement::permission(Permission::PerformProcedures);
        assert!(authorize(&actor(Role::Admin), &req, Operation::Admit).is_ok());
        assert!(authorize(&actor(Role::Surgeon), &req, Operation::Admit).is_ok());
        assert!(authorize(&actor(Role::Nurse), &req, Operation::Admit).is_err());
    }

    #[test]
    fn all_permissions_requires_each() {
        let req = Requirement::AllPermissions(vec![
            Permission::ViewPatients,
            Permission::PrescribeMedications,
        ]);
        assert!(req.is_satisfied_by(&actor(Role::Doctor)));
        assert!(!req.is_satisfied_by(&actor(Role::Nurse)));
        assert!(req.is_satisfied_by(&actor(Role::Admin)));
    }

    #[test]
    fn default_policy_matches_clinical_roles() {
        let policy = AccessPolicy::default();
        assert!(policy.medication.is_satisfied_by(&actor(Role::Doctor)));
        assert!(!policy.medication.is_satisfied_by(&actor(Role::Receptionist)));
        assert!(!policy.medication.is_satisfied_by(&actor(Role::Nurse)));
        assert!(policy.nursing_note.is_satisfied_by(&actor(Role::Nurse)));
        assert!(!policy.nursing_note.is_satisfied_by(&actor(Role::Doctor)));
        assert!(policy
            .diagnosis
            .for_kind(EpisodeKind::Theatre)
            .is_satisfied_by(&actor(Role::Surgeon)));
        assert!(!policy
            .diagnosis
            .for_kind(EpisodeKind::Ward)
            .is_satisfied_by(&actor(Role::Surgeon)));
    }

    #[test]
    fn any_kind_precheck_accepts_role_valid_for_one_kind() {
        let policy = AccessPolicy::default();
        assert!(policy
            .diagnosis
            .authorize_any_kind(&actor(Role::Surgeon), Operation::AppendDiagnosis)
            .is_ok());
        assert!(policy
            .diagnosis
            .authorize_any_kind(&actor(Role::Nurse), Operation::AppendDiagnosis)
            .is_err());
    }

    #[test]
    fn check_gates_every_operation_before_an_episode_is_loaded() {
        let policy = AccessPolicy::default();
        let receptionist = actor(Role::Receptionist);
        assert!(policy.check(&receptionist, Operation::Admit).is_ok());
        for op in [
            Operation::SetStatus,
            Operation::AppendVitals,
            Operation::AppendMedication,
            Operation::AppendNursingNote,
            Operation::AppendDiagnosis,
            Operation::Discharge,
        ] {
            assert!(matches!(
                policy.check(&receptionist, op),
                Err(EpisodeError::Forbidden)
            ));
        }
        assert!(policy.check(&actor(Role::Surgeon), Operation::AppendDiagnosis).is_ok());
        assert!(policy.check(&actor(Role::Pharmacist), Operation::View).is_ok());
    }

    #[test]
    fn yaml_overrides_only_named_entries() {
        let yaml = r#"
discharge:
  ward:
    check: any_role
    values: [doctor, admin]
  theatre:
    check: any_role
    values: [surgeon, admin]
"#;
        let policy = AccessPolicy::from_yaml_str(yaml).unwrap();
        assert_eq!(
            policy.discharge.theatre,
            Requirement::AnyRole(vec![Role::Surgeon, Role::Admin])
        );
        assert_eq!(policy.vitals, AccessPolicy::default().vitals);
    }

    #[test]
    fn yaml_rejects_unknown_operation() {
        let yaml = "billing:\n  check: any_role\n  values: [admin]\n";
        let err = AccessPolicy::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, EpisodeError::CorruptRecord { .. }));
    }
}
