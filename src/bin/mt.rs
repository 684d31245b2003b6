//! MT: Transform coordinates read from files or stdin, line by line.
//!
//! Each line holds whitespace separated ordinates. Lines that are empty, or
//! start with `#`, are echoed unchanged.
use anyhow::Context as _;
use clap::Parser;
use log::{debug, trace, warn};
use mathtransform::definition;
use mathtransform::prelude::*;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

/// MT: The mathtransform command line program, applying a transform
/// definition (e.g. "geocentric ellps=intl | helmert x=-87 y=-96 z=-120 |
/// geocentric ellps=GRS80 inv") to coordinates.
#[derive(Parser, Debug)]
#[clap(name = "mt")]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Inverse operation
    #[clap(long = "inv")]
    inverse: bool,

    /// Number of decimals in output
    #[clap(short = 'd', long)]
    decimals: Option<usize>,

    /// Report fwd-inv roundtrip deviation
    #[clap(short, long)]
    roundtrip: bool,

    /// Echo input to output
    #[clap(short, long)]
    echo: bool,

    /// Print the transform, as simplified, and exit
    #[clap(long)]
    describe: bool,

    #[clap(flatten)]
    verbose: clap_verbosity_flag::Verbosity,

    /// Output file, stdout if not present
    #[clap(short, long)]
    output: Option<PathBuf>,

    /// The transform definition
    definition: String,

    /// The files to operate on, stdin if not present
    args: Vec<String>,
}

fn main() -> Result<(), anyhow::Error> {
    let options = Cli::parse();
    env_logger::Builder::new()
        .filter_level(options.verbose.log_level_filter())
        .init();
    trace!("This is MT");
    debug!("{:#?}", options);

    let mut tr = definition::parse(&options.definition)
        .with_context(|| format!("cannot parse '{}'", options.definition))?;
    if options.inverse {
        tr = tr.inverse()?;
    }
    let roundtrip = match options.roundtrip {
        true => Some(tr.clone().inverse()?),
        false => None,
    };

    let mut out: Box<dyn Write> = match &options.output {
        Some(path) => Box::new(io::BufWriter::new(
            std::fs::File::create(path).with_context(|| format!("cannot create {}", path.display()))?,
        )),
        None => Box::new(io::BufWriter::new(io::stdout().lock())),
    };

    if options.describe {
        writeln!(out, "{}", mathtransform::formatting::to_wkt(&tr))?;
        return Ok(());
    }

    if options.args.is_empty() {
        let stdin = io::stdin();
        transform_lines(&options, &tr, roundtrip.as_ref(), stdin.lock(), &mut out)?;
    }
    for path in &options.args {
        let file = std::fs::File::open(path).with_context(|| format!("cannot open {path}"))?;
        transform_lines(&options, &tr, roundtrip.as_ref(), io::BufReader::new(file), &mut out)?;
    }
    out.flush()?;
    Ok(())
}

fn transform_lines(
    options: &Cli,
    tr: &TransformRef,
    roundtrip: Option<&TransformRef>,
    input: impl BufRead,
    out: &mut dyn Write,
) -> Result<(), anyhow::Error> {
    let s = tr.source_dimensions();
    let decimals = options.decimals.unwrap_or(9);

    for (number, line) in input.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            writeln!(out, "{line}")?;
            continue;
        }

        let mut ordinates = Vec::with_capacity(s);
        for item in trimmed.split_whitespace() {
            let value: f64 = item
                .parse()
                .with_context(|| format!("line {}: cannot parse '{item}'", number + 1))?;
            ordinates.push(value);
        }
        if ordinates.len() < s {
            warn!("line {}: expected {s} ordinates, found {}", number + 1, ordinates.len());
            ordinates.resize(s, 0.);
        }
        // Ordinates beyond the source dimension are passed through unchanged
        let extra = ordinates.split_off(s);

        if options.echo {
            write!(out, "{trimmed}  =>  ")?;
        }
        let result = match tr.transform_point(&ordinates) {
            Ok(result) => result,
            Err(e) => {
                warn!("line {}: {e}", number + 1);
                vec![f64::NAN; tr.target_dimensions()]
            }
        };
        let text: Vec<String> = result
            .iter()
            .chain(extra.iter())
            .map(|v| format!("{v:.decimals$}"))
            .collect();
        write!(out, "{}", text.join(" "))?;

        if let Some(inverse) = roundtrip {
            let back = inverse.transform_point(&result)?;
            let deviation = back
                .iter()
                .zip(&ordinates)
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f64>()
                .sqrt();
            write!(out, "  # roundtrip deviation {deviation:e}")?;
        }
        writeln!(out)?;
    }
    Ok(())
}
