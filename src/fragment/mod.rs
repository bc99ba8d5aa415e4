//! One-shot store for rendered message bodies.
//!
//! Bodies are handed out under unguessable keys and served separately from
//! the page that references them. Each key can be redeemed exactly once.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};
use tracing::warn;

/// Bytes of randomness behind every key.
pub const KEY_BYTES: usize = 64;

/// Strong randomness for fragment keys.
pub trait EntropySource: Send + Sync {
    fn try_fill(&self, dest: &mut [u8]) -> Result<(), rand::Error>;
}

/// Operating system CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn try_fill(&self, dest: &mut [u8]) -> Result<(), rand::Error> {
        OsRng.try_fill_bytes(dest)
    }
}

pub struct FragmentCache {
    entries: Mutex<HashMap<String, String>>,
    entropy: Box<dyn EntropySource>,
    weak_keys: AtomicUsize,
    fallback_nonce: AtomicU64,
}

impl Default for FragmentCache {
    fn default() -> Self {
        Self::new()
    }
}

impl FragmentCache {
    pub fn new() -> Self {
        Self::with_entropy(OsEntropy)
    }

    pub fn with_entropy(entropy: impl EntropySource + 'static) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            entropy: Box::new(entropy),
            weak_keys: AtomicUsize::new(0),
            fallback_nonce: AtomicU64::new(0),
        }
    }

    /// Stores `value` and returns the key that redeems it.
    pub fn store(&self, value: impl Into<String>) -> String {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let mut key = self.gen_key();
        while entries.contains_key(&key) {
            key = self.gen_key();
        }
        entries.insert(key.clone(), value.into());
        key
    }

    /// Removes and returns the value for `key`; empty if unknown or already taken.
    pub fn take(&self, key: &str) -> String {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of keys produced by the non-cryptographic fallback.
    pub fn weak_keys_issued(&self) -> usize {
        self.weak_keys.load(Ordering::Relaxed)
    }

    fn gen_key(&self) -> String {
        let mut bytes = [0u8; KEY_BYTES];
        if let Err(e) = self.entropy.try_fill(&mut bytes) {
            warn!(error = %e, "strong entropy unavailable; fragment key comes from a weak generator");
            self.weak_keys.fetch_add(1, Ordering::Relaxed);
            self.fallback_rng().fill_bytes(&mut bytes);
        }
        URL_SAFE.encode(bytes)
    }

    fn fallback_rng(&self) -> StdRng {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        let nonce = self.fallback_nonce.fetch_add(1, Ordering::Relaxed);
        StdRng::seed_from_u64(nanos ^ nonce.rotate_left(32) ^ std::process::id() as u64)
    }
}
