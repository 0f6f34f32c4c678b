//! Component identity.
//!
//! A [`ComponentId`] is the stable, page-unique name other components use to
//! address a component. A [`Signature`] additionally distinguishes separately
//! constructed instances that share an id (for example the same markup being
//! attached twice across reloads).

use std::borrow::Borrow;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize, Serializer};

static NEXT_SIGNATURE_SERIAL: AtomicU64 = AtomicU64::new(1);

fn next_serial() -> u64 {
    NEXT_SIGNATURE_SERIAL.fetch_add(1, Ordering::Relaxed)
}

/// Stable, page-unique component identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentId(String);

impl ComponentId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ComponentId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ComponentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ComponentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl PartialEq<str> for ComponentId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ComponentId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Construction-time identity of one component instance.
///
/// Serials are process-wide and strictly increasing, so two signatures minted
/// for the same id never compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    id: ComponentId,
    serial: u64,
}

impl Signature {
    /// Mint a fresh signature for `id`.
    #[must_use]
    pub fn mint(id: &ComponentId) -> Self {
        Self {
            id: id.clone(),
            serial: next_serial(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &ComponentId {
        &self.id
    }

    #[must_use]
    pub fn serial(&self) -> u64 {
        self.serial
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.id, self.serial)
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
