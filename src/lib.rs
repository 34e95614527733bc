use log::{debug, info};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use std::{
    fmt,
    ops::RangeInclusive,
    process,
    str::FromStr,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc,
    },
    thread::{spawn, JoinHandle},
    time::Instant,
};

mod digest;
mod error;

pub use digest::{
    finalize, hash_prefix, BlockCompressor, DigestState, Sha1Compressor, Sha1Hash, BLOCK_LEN,
    SHA1_INITIAL_STATE,
};
pub use error::PowError;

/// The suffix length used when none is configured.
pub const DEFAULT_SUFFIX_LEN: usize = 7;

/// Every byte of a suffix is in this range: printable ASCII, excluding the space.
pub const SUFFIX_CHARSET: RangeInclusive<u8> = 0x21..=0x7e;

/// How many trials a worker runs between hash rate reports, unless configured otherwise.
pub const DEFAULT_REPORT_INTERVAL: u64 = 10_000_000;

// How many trials a worker runs between checks of whether another worker has already won.
const CANCEL_CHECK_INTERVAL: u64 = 1 << 20;

// The message that gets hashed on each trial is the concatenation of:
// |--- PREFIX ---
// | * The 64 bytes supplied by the caller. This is exactly one SHA1 block, so the state vector
// |   after processing it never changes and is computed once per worker (see `hash_prefix`).
// |--- SUFFIX ---
// | * `suffix_len` printable bytes. This is the only part of the message that varies across
// |   trials. Each trial overwrites one randomly chosen byte with a new random byte.
// |--- SHA1 FINALIZATION PADDING ---
// | * 0x80, null bytes, then the bit-length of prefix and suffix together (see `finalize`). With
// |   the default 7-byte suffix, suffix and padding fit in a single block, so a trial costs one
// |   compression call.

/// A worker that, when invoked, mutates a suffix until the SHA1 hash of the prefix followed by
/// the suffix starts with enough zero hex digits.
#[derive(Debug, PartialEq, Clone)]
pub struct PowSearchWorker<C = Sha1Compressor> {
    prefix: Prefix,
    difficulty: Difficulty,
    compressor: C,
    suffix_len: usize,
    seed: u64,
    thread_count: usize,
    trial_limit: Option<u64>,
    report_interval: u64,
    worker_index: usize,
}

/// The fixed, 64-byte part of the hashed message.
#[derive(Debug, PartialEq, Clone)]
pub struct Prefix([u8; BLOCK_LEN]);

/// The required number of leading zero hex digits ("nibbles") in a hash.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub struct Difficulty(u32);

/// Generates and mutates suffixes.
///
/// This is a search heuristic rather than a security measure, so a small, fast, seedable
/// generator is all that's needed. Each worker owns its own.
#[derive(Debug, Clone)]
pub struct SuffixMutator {
    rng: SmallRng,
}

/// Counts trials and measures the hash rate over each fixed-size batch of them.
#[derive(Debug)]
pub struct HashrateMeter {
    interval: u64,
    count: u64,
    reports: u64,
    batch_started: Instant,
}

/// The result of a successful search
#[derive(Debug, PartialEq, Clone)]
pub struct PowSolution {
    /// The suffix that, appended to the prefix, gives a hash that meets the difficulty
    pub suffix: Vec<u8>,

    /// The hash of the prefix followed by the suffix
    pub hash: Sha1Hash,

    /// The number of trials the successful worker ran, including the successful one
    pub trials: u64,

    /// The number of hash rate reports the successful worker logged along the way
    pub hashrate_reports: u64,
}

impl PowSearchWorker<Sha1Compressor> {
    /// Creates a worker for a specific prefix and difficulty, using `sha-1`'s compression function,
    /// one thread per physical core, and a seed derived from the process id.
    ///
    /// The search is unbounded: a difficulty above 40 can never be met, and a worker given one
    /// runs until the process is killed unless its trials are capped.
    pub fn new(prefix: Prefix, difficulty: Difficulty) -> Self {
        Self {
            prefix,
            difficulty,
            compressor: Sha1Compressor,
            suffix_len: DEFAULT_SUFFIX_LEN,
            seed: u64::from(process::id()),
            thread_count: num_cpus::get_physical(),
            trial_limit: None,
            report_interval: DEFAULT_REPORT_INTERVAL,
            worker_index: 0,
        }
    }
}

impl<C: BlockCompressor> PowSearchWorker<C> {
    /// Swaps the block compression function used for hashing.
    pub fn with_compressor<D: BlockCompressor>(self, compressor: D) -> PowSearchWorker<D> {
        PowSearchWorker {
            prefix: self.prefix,
            difficulty: self.difficulty,
            compressor,
            suffix_len: self.suffix_len,
            seed: self.seed,
            thread_count: self.thread_count,
            trial_limit: self.trial_limit,
            report_interval: self.report_interval,
            worker_index: self.worker_index,
        }
    }

    pub fn with_suffix_len(mut self, suffix_len: usize) -> Self {
        assert_ne!(suffix_len, 0, "the suffix must be at least one byte long");
        self.suffix_len = suffix_len;
        self
    }

    /// Seeds the suffix generator. With a single thread, two searches with the same seed try
    /// exactly the same sequence of suffixes.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_threads(mut self, thread_count: usize) -> Self {
        assert_ne!(thread_count, 0, "a search needs at least one thread");
        self.thread_count = thread_count;
        self
    }

    /// Caps the total number of trials across all threads to approximately the given number.
    /// A capped search that doesn't find a match returns `None`.
    pub fn with_capped_trials(mut self, trial_limit: u64) -> Self {
        self.trial_limit = Some(trial_limit);
        self
    }

    pub fn with_report_interval(mut self, report_interval: u64) -> Self {
        assert_ne!(report_interval, 0);
        self.report_interval = report_interval;
        self
    }

    /// Splits this worker into one single-threaded worker per thread, each with its own seed.
    /// A trial cap is split roughly equally between them.
    fn split_across_threads(self) -> impl Iterator<Item = Self> {
        let divisor = self.thread_count as u64;
        (0..self.thread_count).map(move |index| {
            let trial_limit = self.trial_limit.map(|limit| {
                let amount_per_worker = limit / divisor;
                if index < self.thread_count - 1 {
                    amount_per_worker
                } else {
                    // Give the slack from an uneven division to the last worker.
                    limit - amount_per_worker * (divisor - 1)
                }
            });
            Self {
                prefix: self.prefix.clone(),
                difficulty: self.difficulty,
                compressor: self.compressor.clone(),
                suffix_len: self.suffix_len,
                seed: self.seed.wrapping_add(index as u64),
                thread_count: 1,
                trial_limit,
                report_interval: self.report_interval,
                worker_index: index,
            }
        })
    }

    /// Invokes the worker. The worker will return with a solution as soon as any of its threads
    /// finds one. It only returns `None` if its trials were capped and all of them failed.
    pub fn search(self) -> Option<PowSolution> {
        if self.thread_count == 1 {
            self.search_single_threaded(Arc::new(AtomicBool::new(false)))
        } else {
            self.search_with_cpus()
        }
    }

    #[allow(clippy::needless_collect)]
    fn search_with_cpus(self) -> Option<PowSolution> {
        let lame_duck_cancel_signal = Arc::new(AtomicBool::new(false));
        let (shared_sender, receiver) = mpsc::channel();

        let _handles = self
            .split_across_threads()
            .map(|worker| {
                let result_sender = shared_sender.clone();
                let worker_cancel_signal = Arc::clone(&lame_duck_cancel_signal);

                spawn(move || {
                    let _ = result_sender.send(worker.search_single_threaded(worker_cancel_signal));
                })
            })
            .collect::<Vec<JoinHandle<()>>>();

        // Only the workers hold senders now, so the receiver hangs up once they've all finished.
        drop(shared_sender);

        for result in receiver {
            if let Some(solution) = result {
                lame_duck_cancel_signal.store(true, Ordering::Relaxed);

                // Lame-duck threads halt within one cancel check interval. Waiting for them is
                // only useful for catching panics, so it's debug/test-only.
                #[cfg(debug_assertions)]
                _handles
                    .into_iter()
                    .map(JoinHandle::join)
                    .collect::<Result<Vec<_>, _>>()
                    .unwrap();

                return Some(solution);
            }
        }

        None
    }

    #[inline(never)]
    fn search_single_threaded(
        self,
        lame_duck_cancel_signal: Arc<AtomicBool>,
    ) -> Option<PowSolution> {
        let PowSearchWorker {
            prefix,
            difficulty,
            compressor,
            suffix_len,
            seed,
            trial_limit,
            report_interval,
            worker_index,
            ..
        } = self;

        let prefix_state = hash_prefix(&compressor, prefix.as_bytes());
        let message_len = BLOCK_LEN + suffix_len;

        let mut mutator = SuffixMutator::seeded(seed);
        let mut suffix = mutator.random_suffix(suffix_len);
        let mut hashrate = HashrateMeter::new(report_interval);

        debug!(
            "worker {} searching for {} leading zero nibbles with a {}-byte suffix (seed {})",
            worker_index, difficulty, suffix_len, seed
        );

        let mut trials = 0;
        while trial_limit.map_or(true, |limit| trials < limit) {
            trials += 1;

            mutator.mutate(&mut suffix);
            let hash = finalize(&compressor, &prefix_state, &suffix, message_len);

            if difficulty.is_met_by(&hash) {
                debug!("worker {} found a solution after {} trials", worker_index, trials);
                return Some(PowSolution {
                    suffix,
                    hash,
                    trials,
                    hashrate_reports: hashrate.reports(),
                });
            }

            if let Some(megahashes_per_second) = hashrate.record_trial() {
                info!(
                    "Hashrate: {:.1} MH/s (worker {})",
                    megahashes_per_second, worker_index
                );
            }

            if trials % CANCEL_CHECK_INTERVAL == 0
                && lame_duck_cancel_signal.load(Ordering::Relaxed)
            {
                debug!(
                    "worker {} stopping after {} trials, another worker already won",
                    worker_index, trials
                );
                break;
            }
        }

        None
    }
}

impl Prefix {
    /// Returns an error unless `bytes` is exactly one SHA1 block long.
    pub fn new(bytes: &[u8]) -> Result<Self, PowError> {
        <[u8; BLOCK_LEN]>::try_from(bytes)
            .map(Prefix)
            .map_err(|_| PowError::PrefixLength {
                actual: bytes.len(),
            })
    }

    pub fn as_bytes(&self) -> &[u8; BLOCK_LEN] {
        &self.0
    }
}

impl From<[u8; BLOCK_LEN]> for Prefix {
    fn from(bytes: [u8; BLOCK_LEN]) -> Self {
        Prefix(bytes)
    }
}

impl FromStr for Prefix {
    type Err = PowError;

    /// The length check is on bytes, not characters.
    fn from_str(prefix: &str) -> Result<Self, Self::Err> {
        Prefix::new(prefix.as_bytes())
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl Difficulty {
    pub const fn new(leading_zero_nibbles: u32) -> Self {
        Difficulty(leading_zero_nibbles)
    }

    #[inline(always)]
    pub fn is_met_by(self, hash: &Sha1Hash) -> bool {
        hash.leading_zero_nibbles() >= self.0
    }
}

impl FromStr for Difficulty {
    type Err = PowError;

    /// Any base-10 integer that fits in an `i64` is accepted. Negative difficulties are met by
    /// every hash, and ones beyond `u32::MAX` by none.
    fn from_str(difficulty: &str) -> Result<Self, Self::Err> {
        difficulty
            .parse::<i64>()
            .map(|nibbles| Difficulty(nibbles.clamp(0, i64::from(u32::MAX)) as u32))
            .map_err(|source| PowError::InvalidDifficulty {
                input: difficulty.to_owned(),
                source,
            })
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl SuffixMutator {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Generates a suffix of `len` independently chosen printable bytes.
    pub fn random_suffix(&mut self, len: usize) -> Vec<u8> {
        (0..len).map(|_| self.random_byte()).collect()
    }

    /// Overwrites one uniformly chosen byte of `suffix` with a new printable byte.
    #[inline(always)]
    pub fn mutate(&mut self, suffix: &mut [u8]) {
        let position = self.rng.gen_range(0..suffix.len());
        suffix[position] = self.random_byte();
    }

    #[inline(always)]
    fn random_byte(&mut self) -> u8 {
        self.rng.gen_range(SUFFIX_CHARSET)
    }
}

impl HashrateMeter {
    pub fn new(interval: u64) -> Self {
        Self {
            interval,
            count: 0,
            reports: 0,
            batch_started: Instant::now(),
        }
    }

    /// The number of batches completed so far.
    pub fn reports(&self) -> u64 {
        self.reports
    }

    /// Records one trial. Every `interval` trials, returns the rate of the batch that just ended
    /// in millions of hashes per second, and starts a new batch.
    #[inline(always)]
    pub fn record_trial(&mut self) -> Option<f64> {
        self.count += 1;
        if self.count < self.interval {
            return None;
        }

        let elapsed = self.batch_started.elapsed().as_secs_f64();
        let megahashes_per_second = self.count as f64 / elapsed / 1_000_000.0;

        self.count = 0;
        self.reports += 1;
        self.batch_started = Instant::now();

        Some(megahashes_per_second)
    }
}
