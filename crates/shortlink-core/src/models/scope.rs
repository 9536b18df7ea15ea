//! Scope bitmask domain model.
//!
//! A permission grants a set of operations on a resource. The set is a
//! 32-bit mask where only the four low bits are defined; the remaining
//! bits are reserved and rejected on input.

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ShortlinkError, ShortlinkResult};

bitflags! {
    /// Operation rights held over a resource.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Scopes: u32 {
        const READ = 1 << 0;
        const CREATE = 1 << 1;
        const UPDATE = 1 << 2;
        const DELETE = 1 << 3;
    }
}

impl Default for Scopes {
    fn default() -> Self {
        Self::empty()
    }
}

impl Scopes {
    /// Parse a raw mask, rejecting reserved bits.
    pub fn try_from_bits(bits: u32) -> ShortlinkResult<Self> {
        Self::from_bits(bits).ok_or_else(|| {
            ShortlinkError::validation(format!("scope mask {bits:#x} sets reserved bits"))
        })
    }

    /// `true` iff every bit of `scope` is present.
    pub fn has_scope(self, scope: Scopes) -> bool {
        self.contains(scope)
    }

    pub fn with_scope(self, scope: Scopes) -> Self {
        self | scope
    }

    pub fn without_scope(self, scope: Scopes) -> Self {
        self.difference(scope)
    }

    /// Flip a single operation scope.
    pub fn toggle_scope(self, scope: Scopes) -> Self {
        if self.has_scope(scope) {
            self.without_scope(scope)
        } else {
            self.with_scope(scope)
        }
    }

    /// Number of defined scopes present (drives the "2/4" indicator).
    pub fn count_set(self) -> u32 {
        (self & Self::all()).bits().count_ones()
    }

    /// The operations contained in this mask, in bit order.
    pub fn operations(self) -> impl Iterator<Item = Operation> {
        Operation::ALL
            .into_iter()
            .filter(move |op| self.has_scope(op.scope()))
    }
}

impl fmt::Display for Scopes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let names: Vec<&str> = self.operations().map(Operation::as_str).collect();
        f.write_str(&names.join("|"))
    }
}

impl Serialize for Scopes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.bits())
    }
}

impl<'de> Deserialize<'de> for Scopes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bits = u32::deserialize(deserializer)?;
        Scopes::try_from_bits(bits).map_err(serde::de::Error::custom)
    }
}

/// A single operation checked by the authorization evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Read,
    Create,
    Update,
    Delete,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::Read,
        Operation::Create,
        Operation::Update,
        Operation::Delete,
    ];

    /// The scope bit this operation requires.
    pub fn scope(self) -> Scopes {
        match self {
            Operation::Read => Scopes::READ,
            Operation::Create => Scopes::CREATE,
            Operation::Update => Scopes::UPDATE,
            Operation::Delete => Scopes::DELETE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Read => "read",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = ShortlinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ShortlinkError::validation(format!("unknown operation `{s}`")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_layout() {
        assert_eq!(Scopes::READ.bits(), 1);
        assert_eq!(Scopes::CREATE.bits(), 2);
        assert_eq!(Scopes::UPDATE.bits(), 4);
        assert_eq!(Scopes::DELETE.bits(), 8);
        assert_eq!(Scopes::all().bits(), 0b1111);
    }

    #[test]
    fn has_requires_every_bit() {
        let mask = Scopes::READ | Scopes::UPDATE;
        assert!(mask.has_scope(Scopes::READ));
        assert!(mask.has_scope(Scopes::READ | Scopes::UPDATE));
        assert!(!mask.has_scope(Scopes::READ | Scopes::DELETE));
        assert!(mask.has_scope(Scopes::empty()));
    }

    #[test]
    fn with_and_without() {
        let mask = Scopes::READ.with_scope(Scopes::DELETE);
        assert_eq!(mask.bits(), 9);
        assert_eq!(mask.without_scope(Scopes::READ), Scopes::DELETE);
        assert_eq!(mask.without_scope(Scopes::CREATE), mask);
    }

    #[test]
    fn toggle_twice_restores_every_mask() {
        for bits in 0..=0b1111u32 {
            let mask = Scopes::from_bits_truncate(bits);
            for op in Operation::ALL {
                let scope = op.scope();
                assert_eq!(mask.toggle_scope(scope).toggle_scope(scope), mask);
                assert_ne!(mask.toggle_scope(scope), mask);
            }
        }
    }

    #[test]
    fn count_set_matches_progress_indicator() {
        assert_eq!(Scopes::empty().count_set(), 0);
        assert_eq!((Scopes::READ | Scopes::UPDATE).count_set(), 2);
        assert_eq!(Scopes::all().count_set(), 4);
    }

    #[test]
    fn reserved_bits_are_rejected() {
        assert!(Scopes::try_from_bits(0b1111).is_ok());
        let err = Scopes::try_from_bits(0b1_0000).unwrap_err();
        assert!(err.is_validation());
        assert!(serde_json::from_str::<Scopes>("16").is_err());
        assert!(serde_json::from_str::<Scopes>("-1").is_err());
    }

    #[test]
    fn serde_uses_plain_integer() {
        let mask = Scopes::READ | Scopes::UPDATE;
        assert_eq!(serde_json::to_string(&mask).unwrap(), "5");
        assert_eq!(serde_json::from_str::<Scopes>("5").unwrap(), mask);
    }

    #[test]
    fn display_lists_operations() {
        assert_eq!(Scopes::empty().to_string(), "none");
        assert_eq!((Scopes::READ | Scopes::DELETE).to_string(), "read|delete");
    }

    #[test]
    fn operation_parsing() {
        assert_eq!("delete".parse::<Operation>().unwrap(), Operation::Delete);
        assert_eq!(" Update ".parse::<Operation>().unwrap(), Operation::Update);
        assert!("purge".parse::<Operation>().is_err());
        assert_eq!(
            serde_json::from_str::<Operation>("\"create\"").unwrap(),
            Operation::Create
        );
    }
}
