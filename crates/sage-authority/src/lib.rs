//! SAGE Authority - RBAC / department authority resolver
//!
//! Resolves what a user may do to an entity given their role, their department
//! and the entity's owning department. The same resolver answers both the
//! evaluator (should the action be visible?) and the dispatcher (should the
//! request be admitted?), so a visible action is never later refused for a
//! pure authority reason.

#![deny(unsafe_code)]

use sage_types::{
    ActionDefinition, AuthorityLevel, BlockReason, Bracket, Department, Role, UserContext,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Effective authority over one target entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorityGrant {
    /// May read but not mutate.
    ReadOnly,
    /// May mutate because the entity belongs to the user's department.
    OwnDepartment,
    /// May mutate regardless of owning department.
    CrossDepartment,
}

impl AuthorityGrant {
    pub fn can_mutate(&self) -> bool {
        !matches!(self, AuthorityGrant::ReadOnly)
    }
}

/// Stateless authority resolver
#[derive(Clone, Copy, Debug, Default)]
pub struct AuthorityResolver;

impl AuthorityResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve `(role, department, target department)` to a grant.
    ///
    /// An entity with no owning department can only be mutated with
    /// cross-department authority.
    pub fn resolve(
        &self,
        role: Role,
        department: Department,
        target: Option<Department>,
    ) -> AuthorityGrant {
        if role.authority_level().has_cross_department_authority() {
            return AuthorityGrant::CrossDepartment;
        }
        match target {
            Some(owner) if owner == department => AuthorityGrant::OwnDepartment,
            _ => AuthorityGrant::ReadOnly,
        }
    }

    /// Decide whether `user` may run `definition` against an entity owned by
    /// `target`.
    ///
    /// Checks run in a fixed order: role deny-list, role allow-list, then (for
    /// mutations only) assignment authority and department authority.
    pub fn admit(
        &self,
        user: &UserContext,
        definition: &ActionDefinition,
        target: Option<Department>,
    ) -> Result<AuthorityGrant, AuthorityError> {
        let (role, department) = match (user.role, user.department) {
            (Some(role), Some(department)) => (role, department),
            _ => return Err(AuthorityError::Unavailable),
        };

        if definition.trigger.forbidden_roles.contains(&role) {
            return Err(AuthorityError::RoleForbidden(role));
        }
        if !definition.trigger.roles.is_empty() && !definition.trigger.roles.contains(&role) {
            return Err(AuthorityError::RoleNotPermitted(role));
        }

        let grant = self.resolve(role, department, target);

        if definition.bracket == Bracket::Read {
            return Ok(grant);
        }

        if definition.assignment && role.authority_level() < AuthorityLevel::HeadOfDepartment {
            return Err(AuthorityError::AssignmentRequiresHead(role));
        }

        if !grant.can_mutate() {
            return Err(match target {
                Some(owner) => AuthorityError::DepartmentMismatch {
                    department,
                    owner,
                },
                None => AuthorityError::NoOwningDepartment,
            });
        }

        Ok(grant)
    }
}

/// Authority refusals. Each maps to a decision block reason.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum AuthorityError {
    #[error("Authority data unavailable")]
    Unavailable,

    #[error("Role {0} is barred from this action")]
    RoleForbidden(Role),

    #[error("Role {0} is not offered this action")]
    RoleNotPermitted(Role),

    #[error("Reassignment requires head of department or above, not {0}")]
    AssignmentRequiresHead(Role),

    #[error("Department {department} has no authority over {owner}")]
    DepartmentMismatch {
        department: Department,
        owner: Department,
    },

    #[error("Entity has no owning department")]
    NoOwningDepartment,
}

impl AuthorityError {
    pub fn block_reason(&self) -> BlockReason {
        match self {
            AuthorityError::RoleForbidden(_) => BlockReason::Forbidden,
            _ => BlockReason::Permission,
        }
    }

    /// Stable reason code, safe to return to callers.
    pub fn reason_code(&self) -> &'static str {
        match self {
            AuthorityError::Unavailable => "authority_unavailable",
            AuthorityError::RoleForbidden(_) => "role_forbidden",
            AuthorityError::RoleNotPermitted(_) => "role_not_permitted",
            AuthorityError::AssignmentRequiresHead(_) => "assignment_requires_head",
            AuthorityError::DepartmentMismatch { .. } => "department_mismatch",
            AuthorityError::NoOwningDepartment => "no_owning_department",
        }
    }
}
