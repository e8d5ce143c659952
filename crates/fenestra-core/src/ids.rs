//! Branded ID newtypes for type safety.
//!
//! Every identity in the coordination core has a distinct ID type implemented
//! as a newtype wrapper around `String`. This prevents accidentally passing a
//! navigation ID where an RPC call ID is expected.
//!
//! All IDs are UUID v7 (time-ordered) generated via [`uuid::Uuid::now_v7`].

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Generate a new UUID v7 string (time-ordered).
fn new_v7() -> String {
    Uuid::now_v7().to_string()
}

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new random ID (UUID v7, time-ordered).
            #[must_use]
            pub fn new() -> Self {
                Self(new_v7())
            }

            /// Create from an existing string value.
            #[must_use]
            pub fn from_string(s: String) -> Self {
                Self(s)
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Unique identifier for one logical navigation operation.
    NavigationId
}

branded_id! {
    /// Groups a navigation and its same-gesture redirects.
    ///
    /// The engine reports every navigation action under a correlation ID;
    /// redirect hops share the correlation of the gesture that caused them.
    CorrelationId
}

branded_id! {
    /// Per-view-instance bridge channel identity.
    ///
    /// Prevents cross-instance bleed-through when multiple bridge-enabled
    /// views share a process.
    ChannelId
}

branded_id! {
    /// Correlation token for a host-to-peer RPC call awaiting a response.
    RpcCallId
}

branded_id! {
    /// Token returned by an event subscription, used for idempotent removal.
    SubscriptionId
}

impl From<&NavigationId> for CorrelationId {
    /// API-started navigations mint their correlation equal to their
    /// navigation ID; only engine-reported starts carry a foreign correlation.
    fn from(id: &NavigationId) -> Self {
        Self(id.0.clone())
    }
}
