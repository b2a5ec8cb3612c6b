use chacha20::ChaCha20;
use chacha20::cipher::{KeyIvInit, StreamCipher};
use rand::RngCore;
use rand::rngs::OsRng;
use zeroize::Zeroizing;

use crate::error::{Error, Result};

const BUFFER_LEN: usize = 1024;

/// ChaCha20 keystream used as the random source for candidate construction.
///
/// Every draw goes through unbiased rejection sampling, so `below(n)` is
/// uniform over `[0, n)` for any `n`.
pub struct Keystream {
    cipher: ChaCha20,
    buffer: Zeroizing<Vec<u8>>,
    pos: usize,
}

impl Keystream {
    /// Seeds a fresh keystream from the operating system CSPRNG.
    pub fn from_entropy() -> Result<Self> {
        let mut seed = Zeroizing::new([0u8; 32]);
        OsRng
            .try_fill_bytes(&mut seed[..])
            .map_err(|e| Error::EntropyUnavailable(e.to_string()))?;

        Ok(Self::from_seed(&seed))
    }

    /// Deterministic keystream for a fixed seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let mut cipher = ChaCha20::new(seed.into(), &[0u8; 12].into());

        let mut buffer = Zeroizing::new(vec![0u8; BUFFER_LEN]);
        cipher.apply_keystream(&mut buffer);

        Self {
            cipher,
            buffer,
            pos: 0,
        }
    }

    fn refill(&mut self) {
        self.buffer.fill(0);
        self.cipher.apply_keystream(&mut self.buffer);
        self.pos = 0;
    }

    fn next_u8(&mut self) -> u8 {
        if self.pos >= self.buffer.len() {
            self.refill();
        }

        let byte = self.buffer[self.pos];
        self.pos += 1;
        byte
    }

    fn next_u32(&mut self) -> u32 {
        u32::from_le_bytes([
            self.next_u8(),
            self.next_u8(),
            self.next_u8(),
            self.next_u8(),
        ])
    }

    /// Uniform index in `[0, bound)`.
    ///
    /// # Panics
    ///
    /// Panics if `bound` is zero or does not fit in a `u32`.
    pub fn below(&mut self, bound: usize) -> usize {
        assert!(bound > 0, "bound must be positive");

        if bound <= 256 {
            let rejection_threshold = 256 - (256 % bound);
            loop {
                let random_byte = self.next_u8() as usize;
                if random_byte < rejection_threshold {
                    return random_byte % bound;
                }
            }
        }

        let bound = bound as u64;
        assert!(bound <= u64::from(u32::MAX), "bound exceeds u32 range");

        let span = 1u64 << 32;
        let rejection_threshold = span - (span % bound);
        loop {
            let random_u32 = u64::from(self.next_u32());
            if random_u32 < rejection_threshold {
                return (random_u32 % bound) as usize;
            }
        }
    }

    /// Uniform value in `[low, high]`.
    pub fn range_inclusive(&mut self, low: usize, high: usize) -> usize {
        debug_assert!(low <= high);
        low + self.below(high - low + 1)
    }

    /// Uniformly chosen byte of `alphabet`.
    ///
    /// # Panics
    ///
    /// Panics if `alphabet` is empty.
    pub fn choose(&mut self, alphabet: &[u8]) -> u8 {
        alphabet[self.below(alphabet.len())]
    }

    /// Fisher-Yates shuffle.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.below(i + 1);
            items.swap(i, j);
        }
    }
}
