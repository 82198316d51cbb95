//! Merchant transaction id generation.
//!
//! Ids are `TXN` + milliseconds since the epoch + eight random base-36
//! characters. If the OS entropy source fails, the random part comes from a
//! pseudo-random generator seeded with the clock and a process counter, and
//! checkout carries on.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use domain::MerchantTransactionId;
use rand::rngs::{OsRng, SmallRng};
use rand::{Rng, RngCore, SeedableRng};

const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const RANDOM_LEN: usize = 8;

/// Source of random bytes for transaction ids.
pub trait EntropySource: Send + Sync {
    fn fill(&self, buf: &mut [u8]) -> Result<(), rand::Error>;
}

/// The operating system's entropy source.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill(&self, buf: &mut [u8]) -> Result<(), rand::Error> {
        OsRng.try_fill_bytes(buf)
    }
}

/// Generates merchant transaction ids.
#[derive(Clone)]
pub struct TransactionIdGenerator {
    entropy: Arc<dyn EntropySource>,
    counter: Arc<AtomicU64>,
}

impl TransactionIdGenerator {
    pub fn new(entropy: Arc<dyn EntropySource>) -> Self {
        Self {
            entropy,
            counter: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Generates a new id.
    pub fn generate(&self) -> MerchantTransactionId {
        let millis = Utc::now().timestamp_millis();
        let mut bytes = [0u8; RANDOM_LEN];

        let suffix = match self.entropy.fill(&mut bytes) {
            Ok(()) => bytes
                .iter()
                .map(|b| ALPHABET[*b as usize % ALPHABET.len()] as char)
                .collect::<String>(),
            Err(err) => {
                let count = self.counter.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %err, "entropy source failed, using seeded fallback");
                Self::fallback_suffix(millis, count)
            }
        };

        MerchantTransactionId::new(format!("TXN{millis}{suffix}"))
    }

    fn fallback_suffix(millis: i64, count: u64) -> String {
        let mut rng = SmallRng::seed_from_u64((millis as u64) ^ count.rotate_left(32));
        let random: String = (0..RANDOM_LEN - 4)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        format!("{:04}{random}", count % 10_000)
    }
}

impl Default for TransactionIdGenerator {
    fn default() -> Self {
        Self::new(Arc::new(OsEntropy))
    }
}

impl std::fmt::Debug for TransactionIdGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionIdGenerator").finish_non_exhaustive()
    }
}
