//! User and role domain types
//!
//! Identity is resolved outside this crate; these types only carry what
//! authorization checks need.

use serde::{Deserialize, Serialize};

/// An authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    /// Super admins pass every role check.
    pub is_super_admin: bool,
}

impl User {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            is_super_admin: false,
        }
    }

    pub fn super_admin(id: i64, name: impl Into<String>) -> Self {
        Self {
            is_super_admin: true,
            ..Self::new(id, name)
        }
    }
}

/// Kind of resource a role is granted on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoleScope {
    /// A pipeline workspace; grants cascade to its pipelines.
    Workspace,
    Pipeline,
}

/// Role levels, ordered from least to most privileged
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RoleType {
    Viewer,
    Editor,
    Admin,
}

impl RoleType {
    /// Whether holding `self` satisfies a check for `required`
    pub fn covers(self, required: RoleType) -> bool {
        self >= required
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_ordering() {
        assert!(RoleType::Admin.covers(RoleType::Viewer));
        assert!(RoleType::Editor.covers(RoleType::Editor));
        assert!(!RoleType::Viewer.covers(RoleType::Editor));
    }
}
