//! Remote-assigned identifiers.
//!
//! The SFU assigns every transport, producer, and consumer an opaque string
//! identifier at creation time. The newtypes below keep the three id spaces
//! from mixing; they serialize as plain JSON strings.

use serde::{Deserialize, Serialize};

macro_rules! remote_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// The raw identifier string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

remote_id! {
    /// Identifier of a directional transport, assigned by the SFU when the
    /// transport's creation parameters are handed out.
    TransportId
}

remote_id! {
    /// Identifier of an outbound media unit (producer).
    ProducerId
}

remote_id! {
    /// Identifier of an inbound media unit (consumer).
    ConsumerId
}
