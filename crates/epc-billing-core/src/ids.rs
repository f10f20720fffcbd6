//! Identifier types for EPC billing.
//!
//! Assessor identities come from the marketplace's account system and are UUIDs.
//! Ledger entities created by the billing engine (periods, invoices, credit notes)
//! use ULIDs so that storage indexes sort chronologically.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};
use ulid::{Generator, Ulid};

/// Shared generator so IDs minted in the same millisecond still increase.
static ULID_GENERATOR: Mutex<Generator> = Mutex::new(Generator::new());

/// Next ULID, strictly greater than every earlier one from this process.
fn next_ulid() -> Ulid {
    let mut generator = ULID_GENERATOR.lock().unwrap_or_else(PoisonError::into_inner);
    // The random part only overflows after 2^80 IDs in one millisecond.
    generator.generate().unwrap_or_else(|_| Ulid::new())
}

/// Define a UUID-based identifier type with standard trait implementations.
macro_rules! uuid_id_type {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(uuid::Uuid);

        impl $name {
            /// Create a new identifier from a UUID.
            #[must_use]
            pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }

            /// Generate a new random identifier.
            #[must_use]
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4())
            }

            /// Return the underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> &uuid::Uuid {
                &self.0
            }

            /// Return the bytes of the UUID (16 bytes).
            #[must_use]
            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }

            /// Create an identifier from raw UUID bytes.
            #[must_use]
            pub const fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(uuid::Uuid::from_bytes(bytes))
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = uuid::Uuid::parse_str(s).map_err(|_| IdError::InvalidUuid)?;
                Ok(Self(uuid))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0.to_string()
            }
        }
    };
}

/// Define a ULID-based, time-ordered identifier type.
macro_rules! ulid_id_type {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(Ulid);

        impl $name {
            /// Create an identifier from a ULID.
            #[must_use]
            pub const fn from_ulid(ulid: Ulid) -> Self {
                Self(ulid)
            }

            /// Generate a new identifier with the current timestamp.
            ///
            /// IDs from one process are strictly increasing, even within a
            /// millisecond.
            #[must_use]
            pub fn generate() -> Self {
                Self(next_ulid())
            }

            /// Return the underlying ULID.
            #[must_use]
            pub const fn as_ulid(&self) -> &Ulid {
                &self.0
            }

            /// Return the bytes of the ULID (16 bytes).
            #[must_use]
            pub fn to_bytes(&self) -> [u8; 16] {
                self.0.to_bytes()
            }

            /// Create an identifier from raw ULID bytes.
            #[must_use]
            pub fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(Ulid::from_bytes(bytes))
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let ulid = Ulid::from_string(s).map_err(|_| IdError::InvalidUlid)?;
                Ok(Self(ulid))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0.to_string()
            }
        }
    };
}

uuid_id_type!(AssessorId, "An EPC assessor identifier (UUID issued by the marketplace).");

ulid_id_type!(PeriodId, "A billing period identifier.");
ulid_id_type!(InvoiceId, "An invoice identifier.");
ulid_id_type!(CreditNoteId, "A credit note identifier.");

/// A lead identifier supplied by the lead-assignment service.
///
/// Lead IDs are opaque to billing; they are only compared for equality
/// (duplicate charge detection and credit note lead references).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeadId(String);

impl LeadId {
    /// Create a lead ID, rejecting empty strings.
    ///
    /// # Errors
    ///
    /// Returns `IdError::EmptyLeadId` if the value is blank.
    pub fn new(value: impl Into<String>) -> Result<Self, IdError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(IdError::EmptyLeadId);
        }
        Ok(Self(value))
    }

    /// Return the lead ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LeadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for LeadId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The input is not a valid UUID.
    #[error("invalid UUID format")]
    InvalidUuid,

    /// The input is not a valid ULID.
    #[error("invalid ULID format")]
    InvalidUlid,

    /// The lead identifier is empty.
    #[error("lead id must not be empty")]
    EmptyLeadId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assessor_id_roundtrip() {
        let id = AssessorId::generate();
        let parsed = AssessorId::from_str(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn assessor_id_serializes_as_string() {
        let id = AssessorId::generate();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
    }

    #[test]
    fn invoice_id_bytes_roundtrip() {
        let id = InvoiceId::generate();
        assert_eq!(InvoiceId::from_bytes(id.to_bytes()), id);
    }

    #[test]
    fn ulid_ids_reject_uuids() {
        let uuid = AssessorId::generate().to_string();
        assert_eq!(PeriodId::from_str(&uuid), Err(IdError::InvalidUlid));
    }

    #[test]
    fn later_ids_sort_after_earlier_ones() {
        let first = CreditNoteId::from_ulid(Ulid::from_parts(1_000, 0));
        let second = CreditNoteId::from_ulid(Ulid::from_parts(2_000, 0));
        assert!(first < second);
    }

    #[test]
    fn generated_ids_increase_within_a_millisecond() {
        let ids: Vec<CreditNoteId> = (0..1_000).map(|_| CreditNoteId::generate()).collect();
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn lead_id_rejects_blank() {
        assert_eq!(LeadId::new("  "), Err(IdError::EmptyLeadId));
        assert_eq!(LeadId::new("lead-42").unwrap().as_str(), "lead-42");
    }
}
