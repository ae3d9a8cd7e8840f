use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use clap::Parser;
use compass_tester_rs::config::{DEFAULT_EXPORT_FILE, MAX_POINTS};
use compass_tester_rs::export::export_csv;
use compass_tester_rs::history::RollingHistory;
use compass_tester_rs::replay::replay_lines;

/// Run a captured serial log through the parser and export the rolling history.
#[derive(Parser, Debug)]
#[command(name = "replay")]
struct Args {
    /// Text capture of the sensor's serial output
    #[arg(long)]
    log: PathBuf,

    /// Number of samples kept in the rolling history
    #[arg(long, default_value_t = MAX_POINTS)]
    capacity: usize,

    /// CSV file to write
    #[arg(long, default_value = DEFAULT_EXPORT_FILE)]
    output: PathBuf,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if args.capacity == 0 {
        anyhow::bail!("--capacity must be at least 1");
    }

    let reader = BufReader::new(File::open(&args.log)?);
    let mut history = RollingHistory::new(args.capacity);
    let replayed = replay_lines(reader, &mut history)?;

    log::info!(
        "Replayed {}: {} samples accepted, {} lines discarded",
        args.log.display(),
        replayed.accepted,
        replayed.discarded
    );

    let summary = export_csv(&args.output, &history)?;
    println!("Data saved to {} ({} rows)", summary.path.display(), summary.rows);

    Ok(())
}
