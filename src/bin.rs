mod benchmark;

use clap::{error::ErrorKind, CommandFactory, Parser};
use env_logger::Env;
use log::error;
use sha1_pow::{Difficulty, PowSearchWorker, PowSolution, Prefix, DEFAULT_SUFFIX_LEN};
use std::process::exit;

/// Finds a suffix that, appended to PREFIX, gives a SHA1 hash starting with DIFFICULTY zero hex
/// digits. The suffix is printed to stdout; a summary goes to stderr.
#[derive(Debug, Parser)]
#[command(name = "sha1_pow", version)]
struct Cli {
    /// The 64-byte string to find a suffix for
    #[arg(required_unless_present = "benchmark")]
    prefix: Option<Prefix>,

    /// The minimum number of leading zero hex digits in the hash
    #[arg(required_unless_present = "benchmark")]
    difficulty: Option<Difficulty>,

    /// Number of worker threads [default: number of physical cores]
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
    threads: Option<u32>,

    /// Length of the suffix, in bytes
    #[arg(long, default_value_t = DEFAULT_SUFFIX_LEN as u32, value_parser = clap::value_parser!(u32).range(1..))]
    suffix_len: u32,

    /// Seed for the suffix generator [default: the process id]
    #[arg(long)]
    seed: Option<u64>,

    /// Hash a fixed number of suffixes on a single core and report the hash rate
    #[arg(long, conflicts_with_all = ["prefix", "difficulty"])]
    benchmark: bool,
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    if cli.benchmark {
        benchmark::run_single_core_benchmark();
        return;
    }

    match (cli.prefix, cli.difficulty) {
        (Some(prefix), Some(difficulty)) => {
            let mut worker = PowSearchWorker::new(prefix.clone(), difficulty)
                .with_suffix_len(cli.suffix_len as usize);
            if let Some(threads) = cli.threads {
                worker = worker.with_threads(threads as usize);
            }
            if let Some(seed) = cli.seed {
                worker = worker.with_seed(seed);
            }
            run_sha1_pow(&prefix, worker)
        }
        _ => Cli::command()
            .error(
                ErrorKind::MissingRequiredArgument,
                "both <PREFIX> and <DIFFICULTY> are required",
            )
            .exit(),
    }
}

fn run_sha1_pow(prefix: &Prefix, worker: PowSearchWorker) {
    if let Some(PowSolution { suffix, hash, .. }) = worker.search() {
        let suffix = String::from_utf8_lossy(&suffix);
        println!("{}", suffix);
        eprintln!("Full string: {}{}", prefix, suffix);
        eprintln!("Hash: {}", hash);
    } else {
        error!("The search ended without finding a suffix");
        exit(1)
    }
}
