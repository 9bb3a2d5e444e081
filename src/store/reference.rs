//! Reference-token generation for system-assigned ledger references

use rand::Rng;

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz";

/// Default length of a generated reference
pub const DEFAULT_REFERENCE_LEN: usize = 10;

/// Source of fresh reference strings
pub trait ReferenceGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Random lowercase ASCII reference of fixed length
#[derive(Debug, Clone, Copy)]
pub struct RandomReference {
    len: usize,
}

impl RandomReference {
    pub fn new(len: usize) -> Self {
        Self { len }
    }
}

impl Default for RandomReference {
    fn default() -> Self {
        Self::new(DEFAULT_REFERENCE_LEN)
    }
}

impl ReferenceGenerator for RandomReference {
    fn generate(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..self.len)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect()
    }
}
