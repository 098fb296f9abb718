//! Multi-threaded reference solver.
//!
//! Candidates are 8-byte little-endian counters appended to the decoded
//! fingerprint, the same layout the challenge page's script uses. Workers pull
//! counters from a shared [`NonceSource`] and report hits over a bounded
//! channel; the first hit stops everyone.

use crate::bits::is_zero_prefix;
use crate::config::MAX_DIFFICULTY;
use crate::error::Error;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use derive_builder::Builder;
use flume::{Receiver, Sender};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

/// Candidates a worker hashes between progress updates.
const PROGRESS_BATCH: u64 = 1024;

/// Hands out counters to workers. Never wraps.
#[derive(Debug)]
pub struct NonceSource {
    next: AtomicU64,
}

impl NonceSource {
    pub const fn new(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
        }
    }

    /// Next unclaimed counter, or `None` once `u64::MAX` is reached.
    #[inline]
    pub fn fetch(&self) -> Option<u64> {
        self.next
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_add(1))
            .ok()
    }
}

#[derive(Debug, Default)]
pub struct StopFlag {
    stop: AtomicBool,
}

impl StopFlag {
    pub const fn new() -> Self {
        Self {
            stop: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    pub fn force_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

/// A nonce that satisfies the challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Solution {
    pub counter: u64,
    pub nonce: [u8; 8],
    pub digest: [u8; 32],
}

impl Solution {
    /// The value to paste into the challenge form.
    pub fn submission(&self) -> String {
        STANDARD.encode(self.nonce)
    }
}

#[derive(Builder, Debug)]
#[builder(pattern = "owned")]
pub struct Solver {
    pub difficulty: u32,
    #[builder(default = "1")]
    pub threads: usize,
    /// First counter to try.
    #[builder(default = "0")]
    pub start: u64,
    /// Candidates hashed so far, updated in batches.
    #[builder(default = "Arc::new(AtomicU64::new(0))")]
    pub progress: Arc<AtomicU64>,
}

impl SolverBuilder {
    fn validate(&self) -> Result<(), Error> {
        match self.difficulty {
            None => return Err(Error::InvalidConfig("difficulty must be provided".into())),
            Some(bits) if bits > MAX_DIFFICULTY => {
                return Err(Error::InvalidConfig(format!(
                    "difficulty must be <= {MAX_DIFFICULTY}"
                )))
            }
            Some(_) => {}
        }
        if self.threads == Some(0) {
            return Err(Error::InvalidConfig("threads must be >= 1".into()));
        }
        Ok(())
    }

    pub fn build_validated(self) -> Result<Solver, Error> {
        self.validate()?;
        self.build()
            .map_err(|e| Error::InvalidConfig(e.to_string()))
    }
}

impl Solver {
    /// Search for a nonce whose digest with `fingerprint` has `difficulty`
    /// leading zero bits.
    pub fn solve(&self, fingerprint: &[u8]) -> Result<Solution, Error> {
        if self.difficulty > MAX_DIFFICULTY {
            return Err(Error::InvalidConfig(format!(
                "difficulty must be <= {MAX_DIFFICULTY}"
            )));
        }
        let threads = self.threads.max(1);
        let prefix = Sha256::new_with_prefix(fingerprint);
        let nonce_source = Arc::new(NonceSource::new(self.start));
        let stop = Arc::new(StopFlag::new());
        let (tx, rx): (Sender<Solution>, Receiver<Solution>) = flume::bounded(threads * 2);
        let mut joins = Vec::with_capacity(threads);

        for index in 0..threads {
            let worker = Worker {
                prefix: prefix.clone(),
                difficulty: self.difficulty,
                nonce_source: nonce_source.clone(),
                stop: stop.clone(),
                progress: self.progress.clone(),
                tx: tx.clone(),
            };
            let spawned = thread::Builder::new()
                .name(format!("powgate-solver-{index}"))
                .spawn(move || worker.run());
            match spawned {
                Ok(join) => joins.push(join),
                Err(err) => {
                    stop.force_stop();
                    join_handles(joins);
                    return Err(Error::SolverFailed(err.to_string()));
                }
            }
        }
        drop(tx);

        // Every sender gone without a hit means the counter space ran out.
        let found = rx.recv().map_err(|_| Error::NonceSpaceExhausted);
        stop.force_stop();
        join_handles(joins);
        found
    }
}

struct Worker {
    prefix: Sha256,
    difficulty: u32,
    nonce_source: Arc<NonceSource>,
    stop: Arc<StopFlag>,
    progress: Arc<AtomicU64>,
    tx: Sender<Solution>,
}

impl Worker {
    fn run(self) {
        let mut pending = 0u64;
        while !self.stop.should_stop() {
            let Some(counter) = self.nonce_source.fetch() else {
                break;
            };
            let nonce = counter.to_le_bytes();
            let mut hasher = self.prefix.clone();
            hasher.update(nonce);
            let digest: [u8; 32] = hasher.finalize().into();

            pending += 1;
            if pending == PROGRESS_BATCH {
                self.progress.fetch_add(pending, Ordering::Relaxed);
                pending = 0;
            }

            if is_zero_prefix(&digest, self.difficulty) {
                self.stop.force_stop();
                let _ = self.tx.send(Solution {
                    counter,
                    nonce,
                    digest,
                });
                break;
            }
        }
        self.progress.fetch_add(pending, Ordering::Relaxed);
    }
}

fn join_handles(joins: Vec<thread::JoinHandle<()>>) {
    for handle in joins {
        let _ = handle.join();
    }
}
