//! Authorization decisions over a request's principal
//!
//! Every mutation of a vault or team goes through [`authorize`] (or one of
//! the composite rules below) before acting. Nothing here performs I/O; the
//! [`Principal`] is loaded fresh from the store for each request and dropped
//! with it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::auth::permissions::{PermissionSet, Scope};
use crate::types::{AccessError, Result, TeamId, UserId, VaultId};

/// Outcome of an authorization check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        self == Decision::Allow
    }

    fn from_bool(allowed: bool) -> Self {
        if allowed {
            Decision::Allow
        } else {
            Decision::Deny
        }
    }
}

/// Resource a permission set is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeId {
    Vault(VaultId),
    Team(TeamId),
}

impl ScopeId {
    pub fn scope(&self) -> Scope {
        match self {
            ScopeId::Vault(_) => Scope::Vault,
            ScopeId::Team(_) => Scope::Team,
        }
    }
}

impl From<VaultId> for ScopeId {
    fn from(id: VaultId) -> Self {
        ScopeId::Vault(id)
    }
}

impl From<TeamId> for ScopeId {
    fn from(id: TeamId) -> Self {
        ScopeId::Team(id)
    }
}

/// Authenticated caller and their grants, valid for one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,
    #[serde(default)]
    pub vault_permissions: HashMap<VaultId, PermissionSet>,
    #[serde(default)]
    pub team_permissions: HashMap<TeamId, PermissionSet>,
}

impl Principal {
    /// A principal with no grants
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            vault_permissions: HashMap::new(),
            team_permissions: HashMap::new(),
        }
    }

    pub fn with_vault(mut self, vault: VaultId, permissions: PermissionSet) -> Self {
        self.vault_permissions.insert(vault, permissions);
        self
    }

    pub fn with_team(mut self, team: TeamId, permissions: PermissionSet) -> Self {
        self.team_permissions.insert(team, permissions);
        self
    }

    /// Permission set for `scope`, restricted to that scope's bits.
    /// Absent grants are the empty set.
    pub fn permissions(&self, scope: ScopeId) -> PermissionSet {
        let set = match scope {
            ScopeId::Vault(id) => self.vault_permissions.get(&id),
            ScopeId::Team(id) => self.team_permissions.get(&id),
        };
        set.copied().unwrap_or_default().within(scope.scope())
    }
}

/// Pure allow/deny for `required` on `scope`
pub fn evaluate(principal: &Principal, scope: ScopeId, required: PermissionSet) -> Decision {
    // Bits outside the scope can never be held there.
    if !required.difference(scope.scope().mask()).is_empty() {
        return Decision::Deny;
    }
    Decision::from_bool(principal.permissions(scope).contains(required))
}

/// [`evaluate`] as a `Result`, for use with `?` before a mutation
pub fn authorize(principal: &Principal, scope: ScopeId, required: PermissionSet) -> Result<()> {
    match evaluate(principal, scope, required) {
        Decision::Allow => Ok(()),
        Decision::Deny => {
            let missing = if required.is_empty() {
                required
            } else {
                principal.permissions(scope).missing(required)
            };
            debug!(
                user = %principal.user_id,
                ?scope,
                required = %required,
                "authorization denied"
            );
            Err(AccessError::Unauthorized { missing })
        }
    }
}

/// Whether `principal` may attach `vault` to `team`.
///
/// The vault owner may always attach. Anyone else needs all of:
/// `ADD_GROUP` on the vault, admin-or-owner on the vault, and
/// admin-or-owner on the team.
pub fn can_add_vault_to_team(principal: &Principal, vault: VaultId, team: TeamId) -> Decision {
    let vault_perms = principal.permissions(ScopeId::Vault(vault));
    if vault_perms.contains(PermissionSet::OWNER) {
        return Decision::Allow;
    }

    let team_perms = principal.permissions(ScopeId::Team(team));
    let has_add_group = vault_perms.contains(PermissionSet::ADD_GROUP);
    let vault_admin = vault_perms.has_any(&[PermissionSet::VAULT_ADMIN, PermissionSet::OWNER]);
    let team_admin = team_perms.has_any(&[PermissionSet::TEAM_ADMIN, PermissionSet::GROUP_OWNER]);

    Decision::from_bool(has_add_group && vault_admin && team_admin)
}

/// [`can_add_vault_to_team`] as a `Result`
pub fn authorize_add_vault_to_team(principal: &Principal, vault: VaultId, team: TeamId) -> Result<()> {
    match can_add_vault_to_team(principal, vault, team) {
        Decision::Allow => Ok(()),
        Decision::Deny => {
            debug!(user = %principal.user_id, %vault, %team, "add vault to team denied");
            let vault_perms = principal.permissions(ScopeId::Vault(vault));
            let team_perms = principal.permissions(ScopeId::Team(team));

            let mut missing = vault_perms.missing(PermissionSet::ADD_GROUP | PermissionSet::VAULT_ADMIN);
            if !team_perms.has_any(&[PermissionSet::TEAM_ADMIN, PermissionSet::GROUP_OWNER]) {
                missing = missing | PermissionSet::TEAM_ADMIN;
            }
            Err(AccessError::Unauthorized { missing })
        }
    }
}

/// Apply a grant made by `actor` to `target` within one scope.
///
/// Role bits are always refused ([`AccessError::IllegalGrant`]). The actor
/// must be admin-or-owner of the scope, and only the owner may hand out the
/// scope's admin bit.
pub fn delegate_grant(
    actor: &Principal,
    scope: ScopeId,
    target: PermissionSet,
    bits: PermissionSet,
) -> Result<PermissionSet> {
    let kind = scope.scope();
    let outside = bits.difference(kind.mask());
    if !outside.is_empty() {
        return Err(AccessError::Unauthorized { missing: outside });
    }

    let granted = target.grant(bits)?;

    let actor_perms = actor.permissions(scope);
    let role = kind.role_bit();
    let admin = kind.admin_bit();

    if !actor_perms.has_any(&[role, admin]) {
        return Err(AccessError::Unauthorized { missing: admin });
    }
    if bits.contains(admin) && !actor_perms.contains(role) {
        return Err(AccessError::Unauthorized { missing: role });
    }

    Ok(granted)
}

/// Counterpart of [`delegate_grant`] for removing capabilities.
///
/// Admins cannot strip another admin; only the owner may.
pub fn delegate_revoke(
    actor: &Principal,
    scope: ScopeId,
    target: PermissionSet,
    bits: PermissionSet,
) -> Result<PermissionSet> {
    let kind = scope.scope();
    let revoked = target.revoke(bits)?;

    let actor_perms = actor.permissions(scope);
    let role = kind.role_bit();
    let admin = kind.admin_bit();

    if !actor_perms.has_any(&[role, admin]) {
        return Err(AccessError::Unauthorized { missing: admin });
    }
    if target.contains(admin) && !actor_perms.contains(role) {
        return Err(AccessError::Unauthorized { missing: role });
    }

    Ok(revoked)
}
