//! Capability bitmask for vault and team scopes
//!
//! A [`PermissionSet`] is a 64-bit vector with one bit per atomic capability:
//!
//! | bits  | scope                                   |
//! |-------|-----------------------------------------|
//! | 0–15  | vault capabilities                      |
//! | 16–31 | team capabilities                       |
//! | 62    | `GROUP_OWNER` (team role bit)           |
//! | 63    | `OWNER` (vault role bit)                |
//!
//! Role bits are never set or cleared by [`PermissionSet::grant`] or
//! [`PermissionSet::revoke`]; they only move through [`transfer_ownership`]
//! or the owner presets used at creation time.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr};

use crate::types::{AccessError, Result};

/// Resource scope a permission set is evaluated against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Vault,
    Team,
}

impl Scope {
    /// Capability bits belonging to this scope (role bit excluded)
    pub const fn capability_mask(self) -> PermissionSet {
        match self {
            Scope::Vault => PermissionSet(0x0000_0000_0000_FFFF),
            Scope::Team => PermissionSet(0x0000_0000_FFFF_0000),
        }
    }

    /// The owner role bit of this scope
    pub const fn role_bit(self) -> PermissionSet {
        match self {
            Scope::Vault => PermissionSet::OWNER,
            Scope::Team => PermissionSet::GROUP_OWNER,
        }
    }

    /// The admin capability of this scope
    pub const fn admin_bit(self) -> PermissionSet {
        match self {
            Scope::Vault => PermissionSet::VAULT_ADMIN,
            Scope::Team => PermissionSet::TEAM_ADMIN,
        }
    }

    /// Every bit that may appear in a set for this scope
    pub const fn mask(self) -> PermissionSet {
        self.capability_mask().union(self.role_bit())
    }

    /// Preset held by the owner of a resource in this scope
    pub const fn owner_preset(self) -> PermissionSet {
        match self {
            Scope::Vault => PermissionSet::VAULT_OWNER_PRESET,
            Scope::Team => PermissionSet::TEAM_OWNER_PRESET,
        }
    }

    /// Preset held by an admin of a resource in this scope
    pub const fn admin_preset(self) -> PermissionSet {
        match self {
            Scope::Vault => PermissionSet::VAULT_ADMIN_PRESET,
            Scope::Team => PermissionSet::TEAM_ADMIN_PRESET,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Vault => write!(f, "vault"),
            Scope::Team => write!(f, "team"),
        }
    }
}

/// Immutable 64-bit capability vector
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(u64);

impl PermissionSet {
    /// No capability at all
    pub const EMPTY: Self = Self(0);

    // Vault scope (bits 0-15)
    pub const VAULT_READ: Self = Self(1 << 0);
    pub const VAULT_UPDATE: Self = Self(1 << 1);
    pub const VAULT_DELETE: Self = Self(1 << 2);
    pub const VAULT_SHARE: Self = Self(1 << 3);
    pub const SECRET_CREATE: Self = Self(1 << 4);
    pub const SECRET_READ: Self = Self(1 << 5);
    pub const SECRET_UPDATE: Self = Self(1 << 6);
    pub const SECRET_DELETE: Self = Self(1 << 7);
    pub const VIEW_HISTORY: Self = Self(1 << 8);
    pub const VIEW_AUDIT_LOGS: Self = Self(1 << 9);
    /// Manage grants on the vault (only an owner can make admins)
    pub const VAULT_ADMIN: Self = Self(1 << 10);
    /// Attach the vault to a team; only effective together with admin rights
    pub const ADD_GROUP: Self = Self(1 << 11);

    // Team scope (bits 16-31)
    pub const TEAM_MEMBERS_READ: Self = Self(1 << 16);
    pub const TEAM_MEMBERS_CREATE: Self = Self(1 << 17);
    pub const TEAM_MEMBERS_UPDATE: Self = Self(1 << 18);
    pub const TEAM_MEMBERS_DELETE: Self = Self(1 << 19);
    pub const TEAM_VAULT_READ: Self = Self(1 << 20);
    pub const TEAM_VAULT_CREATE: Self = Self(1 << 21);
    pub const TEAM_VAULT_UPDATE: Self = Self(1 << 22);
    pub const TEAM_VAULT_DELETE: Self = Self(1 << 23);
    pub const TEAM_ADMIN: Self = Self(1 << 24);

    // Role bits
    pub const GROUP_OWNER: Self = Self(1 << 62);
    pub const OWNER: Self = Self(1 << 63);
    pub const ROLE_BITS: Self = Self::OWNER.union(Self::GROUP_OWNER);

    // Presets
    pub const VAULT_READ_ONLY_PRESET: Self = Self::VAULT_READ.union(Self::SECRET_READ);
    pub const VAULT_EDITOR_PRESET: Self = Self::VAULT_READ_ONLY_PRESET
        .union(Self::VAULT_UPDATE)
        .union(Self::SECRET_CREATE)
        .union(Self::SECRET_UPDATE)
        .union(Self::SECRET_DELETE);
    pub const VAULT_ADMIN_PRESET: Self = Self::VAULT_EDITOR_PRESET
        .union(Self::VAULT_SHARE)
        .union(Self::VIEW_HISTORY)
        .union(Self::VIEW_AUDIT_LOGS)
        .union(Self::VAULT_ADMIN);
    pub const VAULT_OWNER_PRESET: Self = Self::VAULT_ADMIN_PRESET
        .union(Self::VAULT_DELETE)
        .union(Self::ADD_GROUP)
        .union(Self::OWNER);

    pub const TEAM_MEMBER_PRESET: Self = Self::TEAM_MEMBERS_READ.union(Self::TEAM_VAULT_READ);
    pub const TEAM_ADMIN_PRESET: Self = Self::TEAM_MEMBER_PRESET
        .union(Self::TEAM_MEMBERS_CREATE)
        .union(Self::TEAM_MEMBERS_UPDATE)
        .union(Self::TEAM_MEMBERS_DELETE)
        .union(Self::TEAM_VAULT_CREATE)
        .union(Self::TEAM_VAULT_UPDATE)
        .union(Self::TEAM_ADMIN);
    pub const TEAM_OWNER_PRESET: Self = Self::TEAM_ADMIN_PRESET
        .union(Self::TEAM_VAULT_DELETE)
        .union(Self::GROUP_OWNER);

    /// Rebuild a set from its persisted bits
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Bitwise union
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// Bits of `self` not present in `other`
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Union of any number of sets
    pub fn combine(sets: impl IntoIterator<Item = PermissionSet>) -> Self {
        sets.into_iter().fold(Self::EMPTY, Self::union)
    }

    /// True iff every bit of `required` is present.
    ///
    /// An empty `required` is never satisfied.
    pub const fn contains(self, required: Self) -> bool {
        !required.is_empty() && self.0 & required.0 == required.0
    }

    /// True iff at least one bit of any candidate is present
    pub fn has_any(self, candidates: &[PermissionSet]) -> bool {
        candidates.iter().any(|c| !self.intersection(*c).is_empty())
    }

    /// Bits of `required` that are missing from `self`
    pub const fn missing(self, required: Self) -> Self {
        required.difference(self)
    }

    /// Role bits set in `self`
    pub const fn roles(self) -> Self {
        self.intersection(Self::ROLE_BITS)
    }

    /// Add capabilities. Fails with [`AccessError::IllegalGrant`] if `bits`
    /// touches a role bit.
    pub fn grant(self, bits: Self) -> Result<Self> {
        Self::reject_roles(bits)?;
        Ok(self.union(bits))
    }

    /// Remove capabilities. Role bits are refused the same way as in
    /// [`grant`](Self::grant).
    pub fn revoke(self, bits: Self) -> Result<Self> {
        Self::reject_roles(bits)?;
        Ok(self.difference(bits))
    }

    fn reject_roles(bits: Self) -> Result<()> {
        let roles = bits.roles();
        if roles.is_empty() {
            Ok(())
        } else {
            Err(AccessError::IllegalGrant { bits: roles })
        }
    }

    /// Restrict to the bits meaningful in `scope`
    pub const fn within(self, scope: Scope) -> Self {
        self.intersection(scope.mask())
    }

    /// 8-byte big endian persisted form
    pub const fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Decode the persisted form; any length other than 8 is rejected
    pub fn from_be_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; 8] = bytes.try_into().map_err(|_| {
            AccessError::Store(format!(
                "invalid permission bytes length: {} (expected 8)",
                bytes.len()
            ))
        })?;
        Ok(Self(u64::from_be_bytes(bytes)))
    }
}

/// Privileged ownership hand-over within one scope.
///
/// `current_owner` must hold the scope's role bit. Returns the new sets for
/// (previous owner, new owner): the previous owner keeps admin rights, the new
/// owner receives the owner preset on top of what it already had.
pub fn transfer_ownership(
    scope: Scope,
    current_owner: PermissionSet,
    new_owner: PermissionSet,
) -> Result<(PermissionSet, PermissionSet)> {
    let role = scope.role_bit();
    if !current_owner.contains(role) {
        return Err(AccessError::Unauthorized { missing: role });
    }

    let previous = current_owner
        .difference(role)
        .union(scope.admin_preset());
    let next = new_owner.union(scope.owner_preset());
    Ok((previous, next))
}

impl BitOr for PermissionSet {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitAnd for PermissionSet {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        self.intersection(rhs)
    }
}

const PRESET_NAMES: &[(PermissionSet, &str)] = &[
    (PermissionSet::VAULT_OWNER_PRESET, "VaultOwner"),
    (PermissionSet::VAULT_ADMIN_PRESET, "VaultAdmin"),
    (PermissionSet::VAULT_EDITOR_PRESET, "VaultEditor"),
    (PermissionSet::VAULT_READ_ONLY_PRESET, "VaultReadOnly"),
    (PermissionSet::TEAM_OWNER_PRESET, "TeamOwner"),
    (PermissionSet::TEAM_ADMIN_PRESET, "TeamAdmin"),
    (PermissionSet::TEAM_MEMBER_PRESET, "TeamMember"),
];

const CAPABILITY_NAMES: &[(PermissionSet, &str)] = &[
    (PermissionSet::VAULT_READ, "vault.read"),
    (PermissionSet::VAULT_UPDATE, "vault.update"),
    (PermissionSet::VAULT_DELETE, "vault.delete"),
    (PermissionSet::VAULT_SHARE, "vault.share"),
    (PermissionSet::SECRET_CREATE, "secret.create"),
    (PermissionSet::SECRET_READ, "secret.read"),
    (PermissionSet::SECRET_UPDATE, "secret.update"),
    (PermissionSet::SECRET_DELETE, "secret.delete"),
    (PermissionSet::VIEW_HISTORY, "vault.history"),
    (PermissionSet::VIEW_AUDIT_LOGS, "vault.audit"),
    (PermissionSet::VAULT_ADMIN, "vault.admin"),
    (PermissionSet::ADD_GROUP, "vault.add_group"),
    (PermissionSet::TEAM_MEMBERS_READ, "team.members.read"),
    (PermissionSet::TEAM_MEMBERS_CREATE, "team.members.create"),
    (PermissionSet::TEAM_MEMBERS_UPDATE, "team.members.update"),
    (PermissionSet::TEAM_MEMBERS_DELETE, "team.members.delete"),
    (PermissionSet::TEAM_VAULT_READ, "team.vault.read"),
    (PermissionSet::TEAM_VAULT_CREATE, "team.vault.create"),
    (PermissionSet::TEAM_VAULT_UPDATE, "team.vault.update"),
    (PermissionSet::TEAM_VAULT_DELETE, "team.vault.delete"),
    (PermissionSet::TEAM_ADMIN, "team.admin"),
    (PermissionSet::GROUP_OWNER, "team.owner"),
    (PermissionSet::OWNER, "vault.owner"),
];

impl fmt::Display for PermissionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "None");
        }

        if let Some((_, name)) = PRESET_NAMES.iter().find(|(preset, _)| preset == self) {
            return write!(f, "{name}");
        }

        let mut first = true;
        for (bit, name) in CAPABILITY_NAMES {
            if self.contains(*bit) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }

        let unnamed = CAPABILITY_NAMES
            .iter()
            .fold(*self, |rest, (bit, _)| rest.difference(*bit));
        if !unnamed.is_empty() {
            if !first {
                write!(f, "|")?;
            }
            write!(f, "{:#x}", unnamed.bits())?;
        }
        Ok(())
    }
}

impl fmt::Debug for PermissionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PermissionSet({:#018x}: {self})", self.0)
    }
}
