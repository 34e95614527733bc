use sha1_pow::{Difficulty, PowSearchWorker, Prefix, BLOCK_LEN};
use std::time::Instant;

const BENCHMARK_TRIALS: u64 = 1 << 25;

pub fn run_single_core_benchmark() {
    // Runs a benchmark for performance testing. Using a single core and a fixed seed, this hashes
    // a constant number of suffixes against a difficulty that can't be met, so every run does
    // exactly the same work.
    //
    // To use: run `target/release/sha1_pow --benchmark`.
    let started = Instant::now();
    assert_eq!(
        None,
        PowSearchWorker::new(Prefix::from([b'a'; BLOCK_LEN]), Difficulty::new(41))
            .with_threads(1)
            .with_seed(0)
            .with_capped_trials(BENCHMARK_TRIALS)
            .search()
    );
    let elapsed = started.elapsed();

    eprintln!(
        "Hashed {} suffixes in {:.2?} ({:.1} MH/s)",
        BENCHMARK_TRIALS,
        elapsed,
        BENCHMARK_TRIALS as f64 / elapsed.as_secs_f64() / 1_000_000.0
    );
}
