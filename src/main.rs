use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use kaiseki_core::{InstructionCatalog, StreamDisassembler};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Disassemble a raw unSP binary into `address: instruction` lines.
#[derive(Debug, Parser)]
#[command(name = "kaiseki-disasm", version)]
struct Cli {
    /// Raw binary to disassemble.
    input: PathBuf,

    /// Write the listing here instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Address of the first byte, decimal or 0x-prefixed hex.
    #[arg(short, long = "base-address", default_value = "0", value_parser = parse_address)]
    base: u32,

    /// Instruction-set description to load instead of the bundled unSP one.
    #[arg(short = 'j', long = "json")]
    catalog: Option<PathBuf>,

    /// Refuse catalogs with indistinguishable opcode patterns.
    #[arg(long)]
    strict: bool,
}

fn parse_address(text: &str) -> std::result::Result<u32, String> {
    let text = text.trim();
    let parsed = match text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|e| format!("invalid address {:?}: {}", text, e))
}

fn load_catalog(path: Option<&PathBuf>) -> Result<InstructionCatalog> {
    match path {
        Some(path) => InstructionCatalog::from_path(path)
            .with_context(|| format!("failed to load catalog {}", path.display())),
        None => kaiseki_unsp::load_catalog().context("failed to load the bundled unSP catalog"),
    }
}

fn main() -> Result<()> {
    let stderr_format = tracing_subscriber::fmt::layer().with_writer(io::stderr);
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(stderr_format)
        .with(filter)
        .init();

    let cli = Cli::parse();
    let catalog = load_catalog(cli.catalog.as_ref())?;
    if cli.strict {
        catalog
            .ensure_unambiguous()
            .context("catalog rejected in strict mode")?;
    }

    let program = fs::read(&cli.input)
        .with_context(|| format!("failed to read {}", cli.input.display()))?;
    tracing::info!(
        "disassembling {} bytes from 0x{:08x}",
        program.len(),
        cli.base
    );

    let stream = StreamDisassembler::new(&catalog);
    match &cli.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            stream
                .write_to(&mut BufWriter::new(file), &program, cli.base)
                .with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!("wrote listing to {}", path.display());
        }
        None => print_listing(&mut io::stdout().lock(), &stream, &program, cli.base)?,
    }
    Ok(())
}

fn print_listing<W: Write>(
    writer: &mut W,
    stream: &StreamDisassembler<'_>,
    program: &[u8],
    base: u32,
) -> Result<()> {
    stream
        .write_to(writer, program, base)
        .context("failed to write listing")?;
    if stream.lines(program, base).next().is_some() {
        writeln!(writer).context("failed to write listing")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_decimal_and_hex_addresses() {
        assert_eq!(parse_address("0"), Ok(0));
        assert_eq!(parse_address("4096"), Ok(4096));
        assert_eq!(parse_address("0x1000"), Ok(0x1000));
        assert_eq!(parse_address("0XfFfF"), Ok(0xFFFF));
        assert!(parse_address("0x").is_err());
        assert!(parse_address("ten").is_err());
        assert!(parse_address("0x1_0000_0000").is_err());
    }

    #[test]
    fn parses_arguments() {
        let cli = Cli::try_parse_from([
            "kaiseki-disasm",
            "rom.bin",
            "-o",
            "rom.txt",
            "--base-address",
            "0x8000",
            "-j",
            "isa.json",
            "--strict",
        ])
        .unwrap();
        assert_eq!(cli.input, PathBuf::from("rom.bin"));
        assert_eq!(cli.output, Some(PathBuf::from("rom.txt")));
        assert_eq!(cli.base, 0x8000);
        assert_eq!(cli.catalog, Some(PathBuf::from("isa.json")));
        assert!(cli.strict);

        let cli = Cli::try_parse_from(["kaiseki-disasm", "rom.bin"]).unwrap();
        assert_eq!(cli.base, 0);
        assert_eq!(cli.output, None);
        assert!(!cli.strict);
    }

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn printed_listing_ends_with_a_newline() {
        let catalog = load_catalog(None).unwrap();
        let stream = StreamDisassembler::new(&catalog);
        let mut out = Vec::new();
        print_listing(&mut out, &stream, &[0x65, 0xF1, 0x65, 0xF1], 0x10).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "00000010: NOP \n00000012: NOP \n"
        );

        let mut out = Vec::new();
        print_listing(&mut out, &stream, &[0x65], 0).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn closed_output_is_an_error() {
        let catalog = load_catalog(None).unwrap();
        let stream = StreamDisassembler::new(&catalog);
        let err = print_listing(&mut ClosedPipe, &stream, &[0x65, 0xF1], 0).unwrap_err();
        assert_eq!(err.to_string(), "failed to write listing");
        assert_eq!(
            err.downcast_ref::<io::Error>().map(io::Error::kind),
            Some(io::ErrorKind::BrokenPipe)
        );
    }

    #[test]
    fn falls_back_to_the_bundled_catalog() {
        let catalog = load_catalog(None).unwrap();
        assert!(catalog.ensure_unambiguous().is_ok());
    }
}
