use anyhow::Result;
use clap::Parser;

use std::collections::HashMap;

use frametrace::{Detail, Frame, FrameKind, TraceMap};
use tracing_subscriber::filter::EnvFilter;

/// Counts the type of each frame in the trace.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Input trace file.
    #[arg(short, long)]
    input: String,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_env("FT_LOG"))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    // SAFETY: the trace is only read while mapped.
    let map = unsafe { TraceMap::open(&args.input)? };
    let trace = map.buffer();
    let header = trace.header()?;

    let mut stats: HashMap<FrameKind, u32> = HashMap::new();
    let mut elided: u32 = 0;

    for raw in trace.iter()? {
        let raw = raw?;
        *stats.entry(raw.kind()?).or_default() += 1;
        if let Frame::Std(frame) = raw.parse(Detail::Skim)? {
            if frame.is_elided() {
                elided += 1;
            }
        }
    }

    let mut stats: Vec<_> = stats.into_iter().collect();
    stats.sort();
    for (kind, count) in stats {
        println!("{kind:?} => {count}");
    }
    println!("Std (elided) => {elided}");
    println!("total => {}", header.frame_count);
    if header.has_toc() {
        println!("toc offset => {:#x}", header.toc_offset);
    }

    Ok(())
}
