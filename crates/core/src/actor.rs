//! Caller identity and capabilities.
//!
//! Authentication happens upstream; the core receives an already-authenticated actor id and
//! role and derives the permission set from a static table. An [`ActorContext`] is passed
//! explicitly into every operation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The closed set of staff roles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Doctor,
    Nurse,
    Receptionist,
    Pharmacist,
    LabTechnician,
    Radiologist,
    Surgeon,
    MortuaryAttendant,
}

impl Role {
    pub const ALL: [Role; 9] = [
        Role::Admin,
        Role::Doctor,
        Role::Nurse,
        Role::Receptionist,
        Role::Pharmacist,
        Role::LabTechnician,
        Role::Radiologist,
        Role::Surgeon,
        Role::MortuaryAttendant,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Doctor => "doctor",
            Self::Nurse => "nurse",
            Self::Receptionist => "receptionist",
            Self::Pharmacist => "pharmacist",
            Self::LabTechnician => "lab_technician",
            Self::Radiologist => "radiologist",
            Self::Surgeon => "surgeon",
            Self::MortuaryAttendant => "mortuary_attendant",
        }
    }

    /// Static role → permission table.
    pub fn permissions(self) -> &'static [Permission] {
        use Permission::*;
        match self {
            Self::Admin => &[All],
            Self::Doctor => &[
                ViewPatients,
                EditPatients,
                CreateVisits,
                PrescribeMedications,
                OrderLabTests,
                ManageAdmissions,
            ],
            Self::Surgeon => &[
                ViewPatients,
                EditPatients,
                CreateVisits,
                PrescribeMedications,
                OrderLabTests,
                PerformProcedures,
            ],
            Self::Nurse => &[
                ViewPatients,
                RecordVitals,
                AdministerMedications,
                ManageAdmissions,
            ],
            Self::Receptionist => &[
                ViewPatients,
                RegisterPatients,
                ManageAppointments,
                ManageAdmissions,
            ],
            Self::Pharmacist => &[ViewPatients, ViewPrescriptions, DispenseMedications],
            Self::LabTechnician => &[ViewPatients, ViewLabOrders, EnterLabResults],
            Self::Radiologist => &[ViewPatients, ViewImagingOrders, EnterImagingResults],
            Self::MortuaryAttendant => &[ViewDeceasedRecords, ManageMortuary],
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == s.trim())
            .ok_or_else(|| UnknownRole(s.to_owned()))
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

/// A named right. `All` is the admin wildcard and satisfies every permission check.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    All,
    ViewPatients,
    EditPatients,
    RegisterPatients,
    CreateVisits,
    ManageAdmissions,
    PrescribeMedications,
    AdministerMedications,
    DispenseMedications,
    ViewPrescriptions,
    RecordVitals,
    OrderLabTests,
    ViewLabOrders,
    EnterLabResults,
    ViewImagingOrders,
    EnterImagingResults,
    PerformProcedures,
    ManageAppointments,
    ViewDeceasedRecords,
    ManageMortuary,
}

/// The authenticated caller of an operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActorContext {
    id: String,
    role: Role,
}

impl ActorContext {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn permissions(&self) -> &'static [Permission] {
        self.role.permissions()
    }

    /// Permission check; the admin wildcard satisfies any request.
    pub fn has_permission(&self, permission: Permission) -> bool {
        let held = self.permissions();
        held.contains(&Permission::All) || held.contains(&permission)
    }

    pub fn has_any_permission(&self, permissions: &[Permission]) -> bool {
        permissions.iter().any(|p| self.has_permission(*p))
    }

    /// True when every listed permission is held. An empty list is trivially satisfied.
    pub fn has_all_permissions(&self, permissions: &[Permission]) -> bool {
        permissions.iter().all(|p| self.has_permission(*p))
    }

    /// Identity check. Admin only passes if `role` is admin.
    pub fn has_role(&self, role: Role) -> bool {
        self.role == role
    }

    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        roles.contains(&self.role)
    }
}
