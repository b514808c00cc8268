// SPDX-License-Identifier: Apache-2.0
//! Identifier value objects.
//!
//! String-shaped identifiers are validated newtypes: construction goes
//! through `parse`, which enforces the documented bounds, so any held value
//! is known-good. UUID-shaped identifiers (events, requests, shares) are
//! generated v4 and never parsed from user input on the hot path.
//!
//! Using a dedicated wrapper per identifier prevents accidental mixing of,
//! say, a service ID and a team ID at a call site — the same discipline as
//! typed node/type identifiers in a graph store.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{codes, PlaneError, PlaneResult};

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident, $max:expr, $op:literal) => {
        $(#[$doc])*
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Validate and wrap a raw identifier string.
            ///
            /// # Errors
            ///
            /// Returns `InvalidArgument` when the value is empty or longer
            /// than the documented bound.
            pub fn parse(raw: impl Into<String>) -> PlaneResult<Self> {
                let raw = raw.into();
                if raw.is_empty() {
                    return Err(PlaneError::invalid_argument(
                        codes::ID_INVALID,
                        $op,
                        "identifier must be non-empty",
                    ));
                }
                if raw.chars().count() > $max {
                    return Err(PlaneError::invalid_argument(
                        codes::ID_INVALID,
                        $op,
                        format!("identifier exceeds {} characters", $max),
                    ));
                }
                Ok(Self(raw))
            }

            /// View the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Identity of an [`crate::ApplicationService`]. Non-empty, ≤ 100 chars.
    ServiceId,
    100,
    "service_id.parse"
);

string_id!(
    /// Globally unique identity of a [`crate::ServiceInstance`]. Non-empty, ≤ 128 chars.
    InstanceId,
    128,
    "instance_id.parse"
);

string_id!(
    /// Identity of an operator team. Non-empty, ≤ 100 chars.
    TeamId,
    100,
    "team_id.parse"
);

string_id!(
    /// Identity of a human operator. Non-empty, ≤ 100 chars.
    UserId,
    100,
    "user_id.parse"
);

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Mint a fresh random identifier.
            #[must_use]
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID (e.g. read back from storage).
            #[must_use]
            pub fn from_uuid(raw: Uuid) -> Self {
                Self(raw)
            }

            /// The underlying UUID.
            #[must_use]
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

uuid_id!(
    /// Identity of a [`crate::DriftEvent`].
    EventId
);

uuid_id!(
    /// Identity of an [`crate::ApprovalRequest`].
    RequestId
);

uuid_id!(
    /// Identity of a [`crate::ServiceShare`].
    ShareId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_oversized() {
        assert!(ServiceId::parse("").is_err());
        assert!(ServiceId::parse("a".repeat(101)).is_err());
        assert!(ServiceId::parse("a".repeat(100)).is_ok());
    }

    #[test]
    fn serde_is_transparent() {
        let id = ServiceId::parse("billing").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"billing\"");
        let back: ServiceId = serde_json::from_str("\"billing\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn uuid_ids_are_distinct() {
        assert_ne!(EventId::generate(), EventId::generate());
    }
}
