//! Typed, prefixed identifiers
//!
//! Every entity identifier carries its kind both in the type system and in
//! its text form, `<prefix>_<payload>`. The payload is a UUIDv7 encoded with
//! the base58 (Bitcoin) alphabet, so identifiers of one kind sort by creation
//! time through `Ord`.
//!
//! A `UserId` can never be passed where a `VaultId` is expected, and parsing
//! `vault_...` as a user identifier fails with [`AccessError::KindMismatch`].

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::types::{AccessError, Result};

/// Separator between prefix and payload
const SEPARATOR: char = '_';

/// Longest base58 encoding of 16 bytes
const MAX_PAYLOAD_LEN: usize = 22;

/// Entity kinds that own an identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdKind {
    User,
    Vault,
    Team,
    Session,
}

impl IdKind {
    /// All kinds, in prefix lookup order
    pub const ALL: [IdKind; 4] = [IdKind::User, IdKind::Vault, IdKind::Team, IdKind::Session];

    /// Text prefix for this kind
    pub fn prefix(self) -> &'static str {
        match self {
            IdKind::User => "user",
            IdKind::Vault => "vault",
            IdKind::Team => "team",
            IdKind::Session => "session",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.prefix() == prefix)
    }
}

impl fmt::Display for IdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Compile-time marker for an identifier kind
pub trait Kind: Send + Sync + 'static {
    const KIND: IdKind;
}

macro_rules! id_kind {
    ($(#[$meta:meta])* $marker:ident => $kind:ident, $alias:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $marker {}

        impl Kind for $marker {
            const KIND: IdKind = IdKind::$kind;
        }

        $(#[$meta])*
        pub type $alias = TypedId<$marker>;
    };
}

id_kind!(
    /// User account identifier (`user_...`)
    UserKind => User, UserId
);
id_kind!(
    /// Vault identifier (`vault_...`)
    VaultKind => Vault, VaultId
);
id_kind!(
    /// Team identifier (`team_...`)
    TeamKind => Team, TeamId
);
id_kind!(
    /// Session identifier (`session_...`), one per refresh token generation
    SessionKind => Session, SessionId
);

/// Identifier whose kind is fixed by `K`
pub struct TypedId<K: Kind> {
    value: Uuid,
    _kind: PhantomData<K>,
}

impl<K: Kind> TypedId<K> {
    /// Generate a new identifier from the current time and the OS RNG
    pub fn generate() -> Self {
        Self::from_uuid(Uuid::now_v7())
    }

    /// Wrap an existing payload
    pub fn from_uuid(value: Uuid) -> Self {
        Self {
            value,
            _kind: PhantomData,
        }
    }

    /// Parse `text`, requiring the prefix of `K`
    pub fn parse(text: &str) -> Result<Self> {
        let any = AnyId::parse(text)?;
        if any.kind != K::KIND {
            return Err(AccessError::KindMismatch {
                expected: K::KIND,
                found: any.kind,
            });
        }
        Ok(Self::from_uuid(any.value))
    }

    pub fn kind(&self) -> IdKind {
        K::KIND
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.value
    }
}

// Manual impls: derives would add bounds on `K`.

impl<K: Kind> Clone for TypedId<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K: Kind> Copy for TypedId<K> {}

impl<K: Kind> PartialEq for TypedId<K> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<K: Kind> Eq for TypedId<K> {}

impl<K: Kind> Hash for TypedId<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<K: Kind> PartialOrd for TypedId<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: Kind> Ord for TypedId<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value.cmp(&other.value)
    }
}

impl<K: Kind> fmt::Display for TypedId<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            K::KIND.prefix(),
            SEPARATOR,
            bs58::encode(self.value.as_bytes()).into_string()
        )
    }
}

impl<K: Kind> fmt::Debug for TypedId<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl<K: Kind> FromStr for TypedId<K> {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl<K: Kind> Serialize for TypedId<K> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de, K: Kind> Deserialize<'de> for TypedId<K> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(de::Error::custom)
    }
}

/// Identifier parsed without knowing its kind up front
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnyId {
    pub kind: IdKind,
    pub value: Uuid,
}

impl AnyId {
    /// Parse any well-formed identifier
    pub fn parse(text: &str) -> Result<Self> {
        let (prefix, payload) = text
            .split_once(SEPARATOR)
            .ok_or_else(|| AccessError::MalformedId(format!("missing '{SEPARATOR}' in {text:?}")))?;

        let kind = IdKind::from_prefix(prefix)
            .ok_or_else(|| AccessError::MalformedId(format!("unknown prefix {prefix:?}")))?;

        if payload.is_empty() || payload.contains(SEPARATOR) {
            return Err(AccessError::MalformedId(format!(
                "invalid payload in {text:?}"
            )));
        }
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(AccessError::MalformedId(format!(
                "{kind} payload longer than {MAX_PAYLOAD_LEN} characters"
            )));
        }

        let bytes = bs58::decode(payload)
            .into_vec()
            .map_err(|e| AccessError::MalformedId(format!("{text:?}: {e}")))?;
        let bytes: [u8; 16] = bytes.try_into().map_err(|b: Vec<u8>| {
            AccessError::MalformedId(format!("{text:?}: payload is {} bytes, expected 16", b.len()))
        })?;

        let value = Uuid::from_bytes(bytes);
        // Reject alternate encodings (e.g. extra leading '1's) so text form is canonical.
        if bs58::encode(value.as_bytes()).into_string() != payload {
            return Err(AccessError::MalformedId(format!(
                "non-canonical payload in {text:?}"
            )));
        }

        Ok(Self { kind, value })
    }
}
