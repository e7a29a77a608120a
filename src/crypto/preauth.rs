//! The SMB 3.1.1 pre-authentication integrity hash (`[MS-SMB2] 3.1.4.2`).
//!
//! A rolling SHA-512 hash chained over the raw bytes of every NEGOTIATE and
//! SESSION_SETUP message exchanged on a connection, up to and including the
//! SESSION_SETUP response that completes authentication. Only dialect 3.1.1
//! uses this; earlier dialects never construct one.

use sha2::{Digest, Sha512};

/// The all-zero value a hash starts from before any message has been hashed.
pub const INITIAL_VALUE: [u8; 64] = [0u8; 64];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreauthIntegrityHash {
    value: [u8; 64],
}

impl Default for PreauthIntegrityHash {
    fn default() -> Self {
        PreauthIntegrityHash { value: INITIAL_VALUE }
    }
}

impl PreauthIntegrityHash {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds `message` (the raw bytes of one negotiate/session-setup
    /// request or response) into the running hash.
    pub fn update(&mut self, message: &[u8]) {
        let mut hasher = Sha512::new();
        hasher.update(self.value);
        hasher.update(message);
        self.value.copy_from_slice(&hasher.finalize());
    }

    pub fn value(&self) -> &[u8; 64] {
        &self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_all_zeros() {
        assert_eq!(PreauthIntegrityHash::new().value(), &INITIAL_VALUE);
    }

    #[test]
    fn chains_messages_in_order() {
        let mut a = PreauthIntegrityHash::new();
        a.update(b"negotiate request");
        a.update(b"negotiate response");

        let mut b = PreauthIntegrityHash::new();
        b.update(b"negotiate response");
        b.update(b"negotiate request");

        assert_ne!(a.value(), b.value());
    }

    #[test]
    fn is_deterministic_for_the_same_message_sequence() {
        let mut a = PreauthIntegrityHash::new();
        let mut b = PreauthIntegrityHash::new();
        for msg in [&b"one"[..], &b"two"[..], &b"three"[..]] {
            a.update(msg);
            b.update(msg);
        }
        assert_eq!(a.value(), b.value());
    }
}
