//! Newtype IDs for type-safe entity references.
//!
//! The Remote Commerce API hands out opaque string identifiers (document ids
//! such as `"665f1c2e9b1d4a0012ab34cd"`). Use the `define_id!` macro to wrap
//! them so a product id can never be passed where a user id is expected.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Macro to define a type-safe string ID wrapper.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - Conversion methods: `new()`, `as_str()`, `into_inner()`
/// - `From<&str>`, `From<String>` and `Display` implementations
///
/// # Example
///
/// ```rust
/// # use suraj_jewels_core::define_id;
/// define_id!(ShopperId);
/// define_id!(OrderRef);
///
/// let shopper = ShopperId::new("a1");
/// let order = OrderRef::new("a1");
///
/// // Same text, different types, so this won't compile:
/// // let _: ShopperId = order;
/// assert_eq!(shopper.as_str(), order.as_str());
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new ID from anything string-like.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the underlying identifier.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the ID and return the underlying string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id!(UserId);
define_id!(ProductId);

/// Identifier of the device a cart is persisted for.
///
/// The anonymous cart is keyed by device rather than by user, so it survives
/// logout and can be merged into the remote cart on the next login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(Uuid);

impl DeviceId {
    /// Generate a fresh random device id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl core::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_product_id_display_and_serde() {
        let id = ProductId::new("P1");
        assert_eq!(id.to_string(), "P1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"P1\"");

        let parsed: ProductId = serde_json::from_str("\"P2\"").unwrap();
        assert_eq!(parsed, ProductId::from("P2"));
    }

    #[test]
    fn test_device_ids_are_unique() {
        assert_ne!(DeviceId::generate(), DeviceId::generate());
    }
}
