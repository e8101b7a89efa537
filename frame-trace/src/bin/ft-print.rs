use anyhow::{bail, Result};
use clap::Parser;

use std::fs;
use std::io::{self, BufWriter, Write};

use frametrace::TraceReader;
use tracing_subscriber::filter::EnvFilter;

/// Prints the frames of a trace, one per line.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Input trace file.
    #[arg(short, long)]
    input: String,

    /// Output file or '-' to use stdout.
    #[arg(short, long, default_value_t = String::from("-"))]
    output: String,

    /// Index of the first frame to print.
    #[arg(short, long, default_value_t = 0)]
    start: u32,

    /// Maximum number of frames to print.
    #[arg(short = 'n', long)]
    count: Option<u32>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_env("FT_LOG"))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut trace = TraceReader::open(&args.input)?;
    let mut output = open_output(args.output.as_str())?;

    if !trace.seek(args.start)? && args.start != 0 {
        bail!(
            "frame {} is past the end of a trace of {} frames",
            args.start,
            trace.count()
        );
    }

    let limit = args.count.unwrap_or(u32::MAX);
    let mut index = trace.pos();
    for frame in trace.frames().take(limit as usize) {
        writeln!(output, "{index:>10} {}", frame?)?;
        index += 1;
    }
    output.flush()?;

    Ok(())
}

fn open_output(output: &str) -> io::Result<Box<dyn Write>> {
    if output == "-" {
        return Ok(Box::new(BufWriter::new(io::stdout().lock())));
    }
    Ok(Box::new(BufWriter::new(fs::File::create(output)?)))
}
