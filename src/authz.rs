//! Role-Based Authorization
//!
//! Two lookups decide every request: username → role through a pluggable
//! [`RoleResolver`], then role → permitted actions through the
//! [`RolePermissionTable`]. An action is allowed iff it is in the role's set.
//! Roles missing from the table have no permissions.
//!
//! Default roles:
//!
//! | Role   | Actions                     |
//! |--------|-----------------------------|
//! | admin  | read, write, delete, admin  |
//! | editor | read, write                 |
//! | viewer | read                        |
//!
//! The default resolver is a naming rule (`admin` → admin, `user` → editor,
//! anyone else → viewer). Real deployments plug in a directory lookup.
//!
//! The enforcer knows nothing about sessions: callers check authentication
//! first and pass the authenticated username.
//!
//! # Usage
//!
//! ```ignore
//! use warden::authz::{AuthorizationEnforcer, StaticRoleResolver};
//!
//! let authz = AuthorizationEnforcer::new();
//! assert!(authz.can_access("admin", "delete"));
//! assert!(!authz.can_access("someone", "write"));
//!
//! let authz = AuthorizationEnforcer::with_resolver(
//!     StaticRoleResolver::new("viewer").assign("carol", "editor"),
//! );
//! ```

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::audit::AuditLogger;
use crate::error::SecurityError;
use crate::observability::SecurityEvent;
use crate::validation::{ValidationError, ValidationErrorCode};

/// Read access
pub const READ: &str = "read";
/// Write access
pub const WRITE: &str = "write";
/// Delete access
pub const DELETE: &str = "delete";
/// Administrative access (role and permission management)
pub const ADMIN: &str = "admin";

// ============================================================================
// Role Permission Table
// ============================================================================

/// Role name → set of permitted action names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolePermissionTable {
    roles: HashMap<String, BTreeSet<String>>,
}

impl Default for RolePermissionTable {
    fn default() -> Self {
        Self::empty()
            .with_role("admin", [READ, WRITE, DELETE, ADMIN])
            .with_role("editor", [READ, WRITE])
            .with_role("viewer", [READ])
    }
}

impl RolePermissionTable {
    /// Table with no roles
    pub fn empty() -> Self {
        Self {
            roles: HashMap::new(),
        }
    }

    /// Add or replace a role
    pub fn with_role<I, S>(mut self, role: impl Into<String>, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles
            .insert(role.into(), actions.into_iter().map(Into::into).collect());
        self
    }

    /// Actions for `role`; empty for an unknown role
    pub fn permissions_for(&self, role: &str) -> BTreeSet<String> {
        self.roles.get(role).cloned().unwrap_or_default()
    }

    /// Whether `role` may perform `action`
    pub fn allows(&self, role: &str, action: &str) -> bool {
        self.roles
            .get(role)
            .is_some_and(|actions| actions.contains(action))
    }

    /// Whether the table defines `role`
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains_key(role)
    }

    /// Defined role names, sorted
    pub fn roles(&self) -> Vec<&str> {
        let mut roles: Vec<&str> = self.roles.keys().map(String::as_str).collect();
        roles.sort_unstable();
        roles
    }

    /// Add `action` to `role`, creating the role if needed.
    /// Returns whether the set changed.
    pub fn grant(&mut self, role: &str, action: &str) -> bool {
        self.roles
            .entry(role.to_string())
            .or_default()
            .insert(action.to_string())
    }

    /// Remove `action` from `role`. Returns whether the set changed.
    pub fn revoke(&mut self, role: &str, action: &str) -> bool {
        self.roles
            .get_mut(role)
            .is_some_and(|actions| actions.remove(action))
    }
}

// ============================================================================
// Role Resolution
// ============================================================================

/// Maps a username to a role name. Must be total.
pub trait RoleResolver: Send + Sync {
    /// Role for `username`
    fn resolve_role(&self, username: &str) -> String;
}

impl<F> RoleResolver for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn resolve_role(&self, username: &str) -> String {
        self(username)
    }
}

/// `admin` → admin, `user` → editor, anyone else → viewer
#[derive(Debug, Clone, Copy, Default)]
pub struct NamingRuleResolver;

impl RoleResolver for NamingRuleResolver {
    fn resolve_role(&self, username: &str) -> String {
        match username {
            "admin" => "admin",
            "user" => "editor",
            _ => "viewer",
        }
        .to_string()
    }
}

/// Explicit assignments with a fallback role for everyone else
#[derive(Debug, Clone)]
pub struct StaticRoleResolver {
    assignments: HashMap<String, String>,
    default_role: String,
}

impl Default for StaticRoleResolver {
    /// Everyone unlisted is a viewer
    fn default() -> Self {
        Self::new("viewer")
    }
}

impl StaticRoleResolver {
    /// Resolver whose unlisted users get `default_role`
    pub fn new(default_role: impl Into<String>) -> Self {
        Self {
            assignments: HashMap::new(),
            default_role: default_role.into(),
        }
    }

    /// Assign a role
    pub fn assign(mut self, username: impl Into<String>, role: impl Into<String>) -> Self {
        self.assignments.insert(username.into(), role.into());
        self
    }
}

impl RoleResolver for StaticRoleResolver {
    fn resolve_role(&self, username: &str) -> String {
        self.assignments
            .get(username)
            .cloned()
            .unwrap_or_else(|| self.default_role.clone())
    }
}

// ============================================================================
// Authorization Enforcer
// ============================================================================

/// Role-based access decisions.
///
/// Cheap to clone; clones share the permission table and role overrides.
#[derive(Clone)]
pub struct AuthorizationEnforcer {
    table: Arc<RwLock<RolePermissionTable>>,
    resolver: Arc<dyn RoleResolver>,
    overrides: Arc<RwLock<HashMap<String, String>>>,
    audit: Option<AuditLogger>,
}

impl std::fmt::Debug for AuthorizationEnforcer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationEnforcer")
            .field("table", &*self.table.read())
            .field("overrides", &*self.overrides.read())
            .finish_non_exhaustive()
    }
}

impl Default for AuthorizationEnforcer {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthorizationEnforcer {
    /// Default roles with the naming-rule resolver
    pub fn new() -> Self {
        Self::with_resolver(NamingRuleResolver)
    }

    /// Default roles with a custom resolver
    pub fn with_resolver(resolver: impl RoleResolver + 'static) -> Self {
        Self {
            table: Arc::new(RwLock::new(RolePermissionTable::default())),
            resolver: Arc::new(resolver),
            overrides: Arc::new(RwLock::new(HashMap::new())),
            audit: None,
        }
    }

    /// Replace the permission table
    pub fn with_table(self, table: RolePermissionTable) -> Self {
        *self.table.write() = table;
        self
    }

    /// Audit role and permission changes
    pub fn with_audit(mut self, audit: AuditLogger) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Role for `username`; an assignment made through
    /// [`change_role`](Self::change_role) takes precedence over the resolver
    pub fn resolve_role(&self, username: &str) -> String {
        if let Some(role) = self.overrides.read().get(username) {
            return role.clone();
        }
        self.resolver.resolve_role(username)
    }

    /// Whether `username` may perform `action`
    pub fn can_access(&self, username: &str, action: &str) -> bool {
        let role = self.resolve_role(username);
        self.table.read().allows(&role, action)
    }

    /// Every action `username` may perform
    pub fn permissions_for(&self, username: &str) -> BTreeSet<String> {
        let role = self.resolve_role(username);
        self.table.read().permissions_for(&role)
    }

    /// Snapshot of the permission table
    pub fn table(&self) -> RolePermissionTable {
        self.table.read().clone()
    }

    fn require_admin(&self, actor: &str) -> Result<(), SecurityError> {
        if self.can_access(actor, ADMIN) {
            return Ok(());
        }
        log_access_decision(actor, &self.resolve_role(actor), ADMIN, false);
        Err(SecurityError::Authorization {
            action: ADMIN.to_string(),
        })
    }

    /// Assign `new_role` to `target`. `actor` needs the `admin` action.
    ///
    /// Returns the previous role and audits `PERMISSION_CHANGE`.
    pub fn change_role(
        &self,
        actor: &str,
        target: &str,
        new_role: &str,
        ip: Option<&str>,
    ) -> Result<String, SecurityError> {
        self.require_admin(actor)?;
        if !self.table.read().has_role(new_role) {
            return Err(SecurityError::Validation(ValidationError::for_field(
                "role",
                ValidationErrorCode::OutOfRange,
                format!("Unknown role '{new_role}'"),
            )));
        }

        let before = self.resolve_role(target);
        self.overrides
            .write()
            .insert(target.to_string(), new_role.to_string());

        crate::security_event!(
            SecurityEvent::PermissionChanged,
            actor = %actor,
            target = %target,
            before = %before,
            after = %new_role,
            "Role changed"
        );
        if let Some(audit) = &self.audit {
            audit.permission_change(actor, target, before.as_str(), new_role, ip);
        }
        Ok(before)
    }

    /// Add `action` to `role`. `actor` needs the `admin` action.
    pub fn grant(
        &self,
        actor: &str,
        role: &str,
        action: &str,
        ip: Option<&str>,
    ) -> Result<bool, SecurityError> {
        self.require_admin(actor)?;
        self.update_table(actor, role, ip, |table| table.grant(role, action))
    }

    /// Remove `action` from `role`. `actor` needs the `admin` action.
    pub fn revoke(
        &self,
        actor: &str,
        role: &str,
        action: &str,
        ip: Option<&str>,
    ) -> Result<bool, SecurityError> {
        self.require_admin(actor)?;
        self.update_table(actor, role, ip, |table| table.revoke(role, action))
    }

    fn update_table(
        &self,
        actor: &str,
        role: &str,
        ip: Option<&str>,
        change: impl FnOnce(&mut RolePermissionTable) -> bool,
    ) -> Result<bool, SecurityError> {
        let (changed, before, after) = {
            let mut table = self.table.write();
            let before = table.permissions_for(role);
            let changed = change(&mut *table);
            (changed, before, table.permissions_for(role))
        };

        if changed {
            crate::security_event!(
                SecurityEvent::PermissionChanged,
                actor = %actor,
                role = %role,
                "Role permissions changed"
            );
            if let Some(audit) = &self.audit {
                audit.permission_change(
                    actor,
                    role,
                    before.into_iter().collect::<Vec<_>>(),
                    after.into_iter().collect::<Vec<_>>(),
                    ip,
                );
            }
        }
        Ok(changed)
    }
}

/// Log an access decision
pub fn log_access_decision(username: &str, role: &str, action: &str, allowed: bool) {
    let event = if allowed {
        SecurityEvent::AccessGranted
    } else {
        SecurityEvent::AccessDenied
    };

    crate::security_event!(
        event,
        username = %username,
        role = %role,
        action = %action,
        "Access decision made"
    );
}

// ============================================================================
// Tests
// ============================================================================
