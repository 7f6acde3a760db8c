//! Authorization
//!
//! The pipeline manager does not know how roles are stored. It asks a
//! [`RoleChecker`] injected at construction whether a caller may see a
//! pipeline, and omits the pipeline when the answer is no.

use pipespace_core::domain::user::{RoleScope, RoleType, User};
use regex::Regex;

/// A resource addressed inside its parent scope
#[derive(Debug, Clone, Copy)]
pub struct ScopedResource<'a> {
    pub scope: RoleScope,
    pub scope_id: i64,
    pub kind: RoleScope,
    pub id: i64,
    pub name: &'a str,
}

impl<'a> ScopedResource<'a> {
    /// A pipeline inside its workspace
    pub fn pipeline(workspace_id: i64, pipeline_id: i64, name: &'a str) -> Self {
        Self {
            scope: RoleScope::Workspace,
            scope_id: workspace_id,
            kind: RoleScope::Pipeline,
            id: pipeline_id,
            name,
        }
    }
}

/// Answers whether a user holds at least a role on a resource.
///
/// Implementations must not block: the manager calls this once per
/// pipeline while listing.
pub trait RoleChecker: Send + Sync {
    fn has_scope_role(&self, user: &User, resource: &ScopedResource<'_>, required: RoleType) -> bool;
}

/// A role held by a user on a scope
#[derive(Debug, Clone)]
pub struct RoleGrant {
    pub user_id: i64,
    pub scope: RoleScope,
    pub scope_id: i64,
    pub role: RoleType,
    /// Restricts a scope-wide grant to resources whose name matches
    pub name_pattern: Option<Regex>,
}

impl RoleGrant {
    pub fn new(user_id: i64, scope: RoleScope, scope_id: i64, role: RoleType) -> Self {
        Self {
            user_id,
            scope,
            scope_id,
            role,
            name_pattern: None,
        }
    }

    /// Narrow the grant to resources whose name matches `pattern`
    pub fn matching(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.name_pattern = Some(Regex::new(pattern)?);
        Ok(self)
    }

    fn applies_to(&self, resource: &ScopedResource<'_>) -> bool {
        if self.scope == resource.kind && self.scope_id == resource.id {
            return true;
        }

        self.scope == resource.scope
            && self.scope_id == resource.scope_id
            && self
                .name_pattern
                .as_ref()
                .is_none_or(|pattern| pattern.is_match(resource.name))
    }
}

/// In-process role checker over a fixed list of grants
#[derive(Debug, Clone, Default)]
pub struct GrantTable {
    grants: Vec<RoleGrant>,
}

impl GrantTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_grant(mut self, grant: RoleGrant) -> Self {
        self.grants.push(grant);
        self
    }
}

impl RoleChecker for GrantTable {
    fn has_scope_role(&self, user: &User, resource: &ScopedResource<'_>, required: RoleType) -> bool {
        if user.is_super_admin {
            return true;
        }

        self.grants
            .iter()
            .filter(|g| g.user_id == user.id && g.role.covers(required))
            .any(|g| g.applies_to(resource))
    }
}
