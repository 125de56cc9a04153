//! weakling - id hash walkthrough
//!
//! Registers a batch of objects in an [`IdHash`], drops them, collects, and
//! shows that the hash forgot them.

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::debug;
use weakling::util::config::{load_config, CONFIG_FILE};
use weakling::util::logger::{self, LogLevel};
use weakling::{Gc, Heap, IdHash, ObjectId, Processing, NAME, VERSION};

/// Weak handles with reclamation queues
#[derive(Parser, Debug)]
#[command(name = "weakling")]
#[command(version = VERSION)]
#[command(about = NAME, long_about = None)]
struct Args {
    /// Number of objects to register
    #[arg(short = 'n', long, default_value_t = 10)]
    count: usize,

    /// Configuration file
    #[arg(short, long, value_name = "FILE", default_value = CONFIG_FILE)]
    config: PathBuf,

    /// Reference processing mode (overrides the configuration file)
    #[arg(short, long, value_enum)]
    mode: Option<Mode>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    Inline,
    Deferred,
    Background,
}

impl From<Mode> for Processing {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Inline => Processing::Inline,
            Mode::Deferred => Processing::Deferred,
            Mode::Background => Processing::Background,
        }
    }
}

fn describe(object: Option<Gc<String>>) -> String {
    object
        .map(|o| o.to_string())
        .unwrap_or_else(|| "nil".to_string())
}

fn print_items(
    hash: &mut IdHash<String>,
    ids: &[ObjectId],
) {
    println!("all items in weak id hash:");
    for &id in ids {
        println!("{} = {}", id, describe(hash.get(id)));
    }
}

/// Wait for the reference handler to catch up, bounded by `limit`.
fn settle(
    heap: &Heap,
    expected: u64,
    limit: Duration,
) {
    let deadline = Instant::now() + limit;
    loop {
        heap.collect();
        if heap.stats().enqueued >= expected || Instant::now() >= deadline {
            break;
        }
        thread::sleep(Duration::from_millis(1));
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(&args.config)
        .with_context(|| format!("Failed to load config: {}", args.config.display()))?;
    let level = if args.verbose {
        LogLevel::Debug
    } else {
        config.log.level
    };
    logger::init_with_level(level);

    let mut heap_config = config.heap_config();
    if let Some(mode) = args.mode {
        heap_config.processing = mode.into();
    }
    debug!(?heap_config, count = args.count, "starting");

    let heap = Heap::with_config(heap_config);
    let mut hash = IdHash::new();

    let objects: Vec<_> = (0..args.count)
        .map(|i| heap.alloc(format!("object-{}", i)))
        .collect();
    let ids: Vec<_> = objects.iter().map(|o| hash.add(o)).collect();
    print_items(&mut hash, &ids);

    println!("dereferencing objects");
    drop(objects);

    println!("forcing GC");
    settle(&heap, args.count as u64, Duration::from_secs(1));

    print_items(&mut hash, &ids);
    hash.cleanup();
    println!("hash size: {}", hash.len());

    let stats = heap.stats();
    debug!(
        allocated = stats.allocated,
        reclaimed = stats.reclaimed,
        enqueued = stats.enqueued,
        "done"
    );
    Ok(())
}
