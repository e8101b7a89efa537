use anyhow::Result;
use clap::Parser;

use frametrace::index::rewrite_toc;
use tracing_subscriber::filter::EnvFilter;

/// Attaches a table of contents to an existing trace, replacing any it already has.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Trace file to index in place.
    #[arg(short, long)]
    input: String,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_env("FT_LOG"))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let header = rewrite_toc(&args.input)?;
    eprintln!(
        "indexed {} frames, toc at {:#x}",
        header.frame_count, header.toc_offset
    );

    Ok(())
}
