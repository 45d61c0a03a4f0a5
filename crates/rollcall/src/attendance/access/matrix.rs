use std::fmt;

use serde::{Deserialize, Serialize};

use super::super::domain::{DistrictScope, Role, User};
use super::AccessTarget;

/// Operations governed by the access matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    ViewAttendance,
    SubmitAttendance,
    EditAttendance,
    ManageExemption,
    CreateSession,
    EditSession,
    DeleteSession,
    CreateEvent,
    EditEvent,
    DeleteEvent,
    ChangeEventScope,
}

impl Operation {
    pub const fn label(self) -> &'static str {
        match self {
            Operation::ViewAttendance => "view attendance",
            Operation::SubmitAttendance => "submit attendance",
            Operation::EditAttendance => "edit attendance",
            Operation::ManageExemption => "manage exemptions",
            Operation::CreateSession => "create sessions",
            Operation::EditSession => "edit sessions",
            Operation::DeleteSession => "delete sessions",
            Operation::CreateEvent => "create events",
            Operation::EditEvent => "edit events",
            Operation::DeleteEvent => "delete events",
            Operation::ChangeEventScope => "change an event's district or type",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Predicate a role must satisfy against the target for an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Anyone,
    Owner,
    SameDistrict,
    SameDistrictAndPart,
    CreatorInDistrict,
    Nobody,
}

// Columns: ADMIN, DISTRICT_LEADER, PART_LEADER, MEMBER.
const MATRIX: &[(Operation, [Scope; 4])] = &[
    (
        Operation::ViewAttendance,
        [Scope::Anyone, Scope::SameDistrict, Scope::SameDistrictAndPart, Scope::Owner],
    ),
    (
        Operation::SubmitAttendance,
        [Scope::Anyone, Scope::SameDistrict, Scope::SameDistrictAndPart, Scope::Owner],
    ),
    (
        Operation::EditAttendance,
        [Scope::Anyone, Scope::SameDistrict, Scope::SameDistrictAndPart, Scope::Nobody],
    ),
    (
        Operation::ManageExemption,
        [Scope::Anyone, Scope::SameDistrict, Scope::Nobody, Scope::Nobody],
    ),
    (
        Operation::CreateSession,
        [Scope::Anyone, Scope::SameDistrict, Scope::Nobody, Scope::Nobody],
    ),
    (
        Operation::EditSession,
        [Scope::Anyone, Scope::CreatorInDistrict, Scope::Nobody, Scope::Nobody],
    ),
    (
        Operation::DeleteSession,
        [Scope::Anyone, Scope::CreatorInDistrict, Scope::Nobody, Scope::Nobody],
    ),
    (
        Operation::CreateEvent,
        [Scope::Anyone, Scope::SameDistrict, Scope::Nobody, Scope::Nobody],
    ),
    (
        Operation::EditEvent,
        [Scope::Anyone, Scope::CreatorInDistrict, Scope::Nobody, Scope::Nobody],
    ),
    (
        Operation::DeleteEvent,
        [Scope::Anyone, Scope::CreatorInDistrict, Scope::Nobody, Scope::Nobody],
    ),
    (
        Operation::ChangeEventScope,
        [Scope::Anyone, Scope::Nobody, Scope::Nobody, Scope::Nobody],
    ),
];

/// Operations the owner of the target may always perform on it.
const OWNER_OVERRIDES: &[Operation] = &[Operation::ViewAttendance, Operation::SubmitAttendance];

const fn column(role: Role) -> usize {
    match role {
        Role::Admin => 0,
        Role::DistrictLeader => 1,
        Role::PartLeader => 2,
        Role::Member => 3,
    }
}

pub fn scope_for(role: Role, operation: Operation) -> Scope {
    MATRIX
        .iter()
        .find(|(op, _)| *op == operation)
        .map(|(_, scopes)| scopes[column(role)])
        .unwrap_or(Scope::Nobody)
}

pub(crate) fn permits(actor: &User, operation: Operation, target: &AccessTarget) -> bool {
    let owns_target = target.owner.as_ref() == Some(&actor.id);
    if owns_target && OWNER_OVERRIDES.contains(&operation) {
        return true;
    }

    let same_district = matches!(
        &target.district,
        Some(DistrictScope::District(district)) if *district == actor.district_id
    );

    match scope_for(actor.role, operation) {
        Scope::Anyone => true,
        Scope::Owner => owns_target,
        Scope::SameDistrict => same_district,
        Scope::SameDistrictAndPart => {
            same_district && actor.voice_part.is_some() && target.voice_part == actor.voice_part
        }
        Scope::CreatorInDistrict => {
            same_district && target.creator.as_ref() == Some(&actor.id)
        }
        Scope::Nobody => false,
    }
}
