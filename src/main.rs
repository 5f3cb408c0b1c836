//! fhandle - Plain and gzip files through one handle type
//!
//! Measures, prints and converts files with the library's `FileHandle`.

use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgMatches, Command};
use fhandle::file_handler::detect_compression;
use fhandle::{probe_size, Backend, FileHandle, Gzip, Plain, DEFAULT_BUFFER_SIZE, UNKNOWN_SIZE};
use std::io::Write;
use std::path::{Path, PathBuf};

const COPY_CHUNK: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Plain,
    Gzip,
}

fn cli() -> Command {
    let file_arg = |help: &'static str| Arg::new("file").help(help).required(true).index(1);

    Command::new("fhandle")
        .version(fhandle::VERSION)
        .about("Read, measure and convert plain or gzip files through one handle type")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("backend")
                .long("backend")
                .short('b')
                .help("Backend used to open input files")
                .value_parser(["auto", "plain", "gzip"])
                .default_value("auto")
                .global(true),
        )
        .arg(
            Arg::new("buffer-size")
                .long("buffer-size")
                .help("Staging buffer size in bytes")
                .value_parser(value_parser!(usize))
                .global(true),
        )
        .subcommand(
            Command::new("size")
                .about("Print the logical size of a file")
                .arg(file_arg("File to measure")),
        )
        .subcommand(
            Command::new("cat")
                .about("Write the logical content of a file to stdout")
                .arg(file_arg("File to print")),
        )
        .subcommand(
            Command::new("convert")
                .about("Copy a file, changing its compression")
                .arg(file_arg("Source file"))
                .arg(
                    Arg::new("output")
                        .help("Destination file")
                        .required(true)
                        .index(2),
                )
                .arg(
                    Arg::new("to")
                        .long("to")
                        .help("Backend used to write the destination")
                        .value_parser(["plain", "gzip"])
                        .default_value("gzip"),
                )
                .arg(
                    Arg::new("level")
                        .long("level")
                        .help("Gzip compression level")
                        .value_parser(value_parser!(u32).range(0..=9)),
                ),
        )
}

fn main() -> Result<()> {
    // Initialize logging (RUST_LOG controls the level)
    env_logger::init();

    let matches = cli().get_matches();
    match matches.subcommand() {
        Some(("size", sub)) => run_size(sub),
        Some(("cat", sub)) => run_cat(sub),
        Some(("convert", sub)) => run_convert(sub),
        _ => unreachable!("clap enforces a subcommand"),
    }
}

fn file_path(matches: &ArgMatches, id: &str) -> PathBuf {
    PathBuf::from(
        matches
            .get_one::<String>(id)
            .expect("path argument is required"),
    )
}

fn buffer_size(matches: &ArgMatches) -> usize {
    matches
        .get_one::<usize>("buffer-size")
        .copied()
        .unwrap_or(DEFAULT_BUFFER_SIZE)
}

/// Resolve `--backend`, sniffing the file when it is `auto`
fn input_kind(matches: &ArgMatches, path: &Path) -> Result<Kind> {
    let choice = matches
        .get_one::<String>("backend")
        .map(String::as_str)
        .unwrap_or("auto");
    match choice {
        "plain" => Ok(Kind::Plain),
        "gzip" => Ok(Kind::Gzip),
        _ => {
            let detected = detect_compression(path)?;
            log::debug!("detected {} compression for {}", detected.name(), path.display());
            Ok(if detected.is_compressed() {
                Kind::Gzip
            } else {
                Kind::Plain
            })
        }
    }
}

fn run_size(matches: &ArgMatches) -> Result<()> {
    let path = file_path(matches, "file");
    let size = match input_kind(matches, &path)? {
        Kind::Plain => probe_size::<Plain>(&path),
        Kind::Gzip => probe_size::<Gzip>(&path),
    };
    if size == UNKNOWN_SIZE {
        bail!("Cannot determine the size of {}", path.display());
    }
    println!("{size}");
    Ok(())
}

fn run_cat(matches: &ArgMatches) -> Result<()> {
    let path = file_path(matches, "file");
    let buffer_size = buffer_size(matches);
    let total = match input_kind(matches, &path)? {
        Kind::Plain => cat::<Plain>(&path, buffer_size)?,
        Kind::Gzip => cat::<Gzip>(&path, buffer_size)?,
    };
    log::debug!("printed {total} bytes from {}", path.display());
    Ok(())
}

/// Stream the content of `path` to stdout
fn cat<K: Backend>(path: &Path, buffer_size: usize) -> Result<u64> {
    let mut handle = FileHandle::<K>::with_buffer_size(buffer_size);
    handle.open(path, "rb")?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut chunk = vec![0u8; COPY_CHUNK];
    let mut total = 0u64;
    loop {
        let n = handle.bulk_read(&mut chunk);
        if n < 0 {
            bail!(
                "Failed to read {}: {}",
                path.display(),
                describe_error(&handle)
            );
        }
        if n == 0 {
            break;
        }
        out.write_all(&chunk[..n as usize])?;
        total += n as u64;
    }
    out.flush()?;
    Ok(total)
}

fn run_convert(matches: &ArgMatches) -> Result<()> {
    let input = file_path(matches, "file");
    let output = file_path(matches, "output");
    let buffer_size = buffer_size(matches);

    let to = match matches.get_one::<String>("to").map(String::as_str) {
        Some("plain") => Kind::Plain,
        _ => Kind::Gzip,
    };
    let mode = match (to, matches.get_one::<u32>("level")) {
        (Kind::Gzip, Some(level)) => format!("wb{level}"),
        _ => "wb".to_string(),
    };

    let copied = match (input_kind(matches, &input)?, to) {
        (Kind::Plain, Kind::Plain) => convert::<Plain, Plain>(&input, &output, &mode, buffer_size),
        (Kind::Plain, Kind::Gzip) => convert::<Plain, Gzip>(&input, &output, &mode, buffer_size),
        (Kind::Gzip, Kind::Plain) => convert::<Gzip, Plain>(&input, &output, &mode, buffer_size),
        (Kind::Gzip, Kind::Gzip) => convert::<Gzip, Gzip>(&input, &output, &mode, buffer_size),
    }?;

    log::info!(
        "converted {} -> {} ({copied} bytes)",
        input.display(),
        output.display()
    );
    Ok(())
}

/// Copy the logical content of `input` into `output` opened with `mode`
fn convert<S: Backend, D: Backend>(
    input: &Path,
    output: &Path,
    mode: &str,
    buffer_size: usize,
) -> Result<u64> {
    let mut source = FileHandle::<S>::with_buffer_size(buffer_size);
    source.open(input, "rb")?;
    let mut dest = FileHandle::<D>::with_buffer_size(buffer_size);
    dest.open(output, mode)?;

    let copied = std::io::copy(&mut source, &mut dest)
        .with_context(|| format!("Failed to copy {} to {}", input.display(), output.display()))?;

    if dest.close() != 0 {
        bail!(
            "Failed to finish {}: {}",
            output.display(),
            describe_error(&dest)
        );
    }
    Ok(copied)
}

fn describe_error<K: Backend>(handle: &FileHandle<K>) -> String {
    handle
        .last_error()
        .map(ToString::to_string)
        .unwrap_or_else(|| "unknown error".to_string())
}
