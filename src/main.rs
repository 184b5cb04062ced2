//! Tonnetz CLI — compile a pattern document and play it to the log sink.
//!
//! Real deployments implement [`tonnetz::sink::NoteSink`] over an actual
//! synth; this binary exists to audition documents and watch the engine work.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tonnetz::pattern;
use tonnetz::sched::{PlayState, Scheduler};
use tonnetz::sink::LogSink;

#[derive(Parser)]
#[command(name = "tonnetz", version, about = "Generative harmony pattern player")]
struct Args {
    /// Pattern document (JSON)
    doc: PathBuf,

    /// Master random seed
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Stop automatically after this many seconds
    #[arg(long)]
    duration: Option<f64>,
}

fn main() {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let json = match fs::read_to_string(&args.doc) {
        Ok(json) => json,
        Err(err) => {
            eprintln!("cannot read {}: {err}", args.doc.display());
            std::process::exit(1);
        }
    };
    let compiled = match pattern::compile_str(&json, args.seed) {
        Ok(compiled) => compiled,
        Err(err) => {
            eprintln!("cannot compile {}: {err}", args.doc.display());
            std::process::exit(1);
        }
    };
    info!(pattern = %compiled.name, seed = args.seed, "compiled");

    let mut scheduler = Scheduler::new(compiled, Arc::new(LogSink));
    scheduler.play();

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = Arc::clone(&interrupted);
        if let Err(err) = ctrlc::set_handler(move || {
            interrupted.store(true, Ordering::Relaxed);
        }) {
            eprintln!("cannot install interrupt handler: {err}");
        }
    }

    let deadline = args
        .duration
        .map(|secs| std::time::Instant::now() + Duration::from_secs_f64(secs.max(0.0)));
    while !interrupted.load(Ordering::Relaxed) && scheduler.state() == PlayState::Playing {
        if deadline.is_some_and(|d| std::time::Instant::now() >= d) {
            break;
        }
        thread::sleep(Duration::from_millis(50));
    }

    scheduler.stop();
}
