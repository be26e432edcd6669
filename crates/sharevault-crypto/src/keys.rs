//! Fixed-size symmetric keys.
//!
//! All three key kinds are 16 bytes, but they are distinct types so a signing
//! key can never be passed where a session key is expected. Each zeroizes on
//! drop and redacts itself in `Debug`.

use std::fmt;

use subtle::ConstantTimeEq;
use zeroize::Zeroize;

/// Length of every symmetric key in bytes.
pub const KEY_LEN: usize = 16;

macro_rules! symmetric_key {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone)]
        pub struct $name {
            bytes: [u8; KEY_LEN],
        }

        impl $name {
            /// Wrap raw key bytes. Callers supply the randomness.
            pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
                Self { bytes }
            }

            /// Raw key bytes.
            pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
                &self.bytes
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.bytes.ct_eq(&other.bytes).into()
            }
        }

        impl Eq for $name {}

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(concat!(stringify!($name), "(<redacted>)"))
            }
        }

        impl Drop for $name {
            fn drop(&mut self) {
                self.bytes.zeroize();
            }
        }
    };
}

symmetric_key! {
    /// Per-connection AES-128 key for envelope confidentiality.
    SessionKey
}

symmetric_key! {
    /// Per-connection HMAC key for envelope integrity. Never used to encrypt.
    SigningKey
}

symmetric_key! {
    /// One version of a group's AES-128 file key.
    GroupKey
}
