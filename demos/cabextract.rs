use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use cabset::{
    ArchiveSet, Cabinet, CompressionType, Decoder, ExtractOptions, FileEntry,
    Host, Notification, OpenMode, ProgressEvent, RecordKind, Reply,
};
use clap::{Parser, Subcommand};

// ========================================================================= //

#[derive(Parser)]
#[command(version, about = "Lists and extracts cabinet sets")]
struct Cli {
    /// Logs decoder activity to stderr
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Lists the files in every cabinet of a set
    Ls {
        /// Lists in long format
        #[arg(short, long)]
        long: bool,
        /// Any cabinet of the set
        cab: PathBuf,
    },
    /// Prints the members and total size of a set
    Size {
        /// Any cabinet of the set
        cab: PathBuf,
    },
    /// Extracts a whole set into a directory
    X {
        /// Any cabinet of the set
        cab: PathBuf,
        /// Existing destination directory
        #[arg(default_value = ".")]
        dest: PathBuf,
        /// Skips data block checksum verification
        #[arg(long)]
        no_verify: bool,
        /// Leaves timestamps and attributes alone
        #[arg(long)]
        no_metadata: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(io::stderr)
            .init();
    }
    match cli.command {
        Command::Ls { long, cab } => list_set(&cab, long)?,
        Command::Size { cab } => {
            let set = ArchiveSet::resolve(&cab)?;
            for member in set.members() {
                println!(
                    "{:>3} {} ({} files)",
                    member.ordinal(),
                    member.path().display(),
                    member.entry_count()
                );
            }
            println!("total {} bytes", set.total_size());
        }
        Command::X { cab, dest, no_verify, no_metadata } => {
            let options = ExtractOptions::default()
                .verify_checksums(!no_verify)
                .restore_timestamps(!no_metadata)
                .restore_attributes(!no_metadata);
            let mut report = |event: &ProgressEvent| {
                if event.kind == RecordKind::Completed {
                    eprintln!("\r{}: done{:40}", event.activity, "");
                } else {
                    eprint!(
                        "\r{}: {:>3}% [{}/{}] {:40}",
                        event.activity,
                        event.percent_complete,
                        event.cabinets_completed,
                        event.cabinets_total,
                        event.current_file.as_deref().unwrap_or(&event.cabinet)
                    );
                }
            };
            let manifest =
                cabset::extract(&cab, &dest, &options, &mut report)?;
            println!(
                "{} files, {} directories, {} bytes",
                manifest.file_count(),
                manifest.directory_count(),
                manifest.total_length()
            );
        }
    }
    Ok(())
}

// ========================================================================= //

fn list_set(cab: &Path, long: bool) -> anyhow::Result<()> {
    let set = ArchiveSet::resolve(cab)?;
    let dir = set.first_path().parent().unwrap_or_else(|| Path::new("."));
    let decoder = Decoder::new();
    for member in set.members() {
        let cabinet = decoder.cabinet_info(member.name(), dir, &mut Lister)?;
        println!("{}:", member.path().display());
        for file in cabinet.files() {
            list_file(&cabinet, file, long);
        }
    }
    Ok(())
}

/// A host that only ever reads cabinet tables.
struct Lister;

impl Host for Lister {
    type Stream = File;

    fn open(&mut self, path: &Path, mode: OpenMode) -> io::Result<File> {
        match mode {
            OpenMode::Read => File::open(path),
            OpenMode::Create => File::create(path),
        }
    }

    fn read(
        &mut self,
        stream: &mut File,
        buf: &mut [u8],
    ) -> io::Result<usize> {
        stream.read(buf)
    }

    fn write(&mut self, stream: &mut File, buf: &[u8]) -> io::Result<usize> {
        stream.write(buf)
    }

    fn seek(&mut self, stream: &mut File, pos: SeekFrom) -> io::Result<u64> {
        stream.seek(pos)
    }

    fn close(&mut self, _stream: File) -> io::Result<()> {
        Ok(())
    }

    fn notify(
        &mut self,
        _notification: Notification<'_, File>,
    ) -> io::Result<Reply<File>> {
        Ok(Reply::Skip)
    }
}

fn list_file(cabinet: &Cabinet, file: &FileEntry, long: bool) {
    if !long {
        println!("  {}", file.name());
        return;
    }
    let folder_index = file.folder().resolve(cabinet.folders().len());
    let ctype = match cabinet.folders().get(folder_index) {
        Some(folder) => match folder.compression_type() {
            CompressionType::None => "None".to_string(),
            CompressionType::MsZip => "MsZip".to_string(),
            CompressionType::Quantum(v, m) => format!("Q{}/{}", v, m),
            CompressionType::Lzx(w) => format!("Lzx{:?}", w),
        },
        None => "?".to_string(),
    };
    let folder = file.folder();
    let span = match (folder.is_from_prev(), folder.is_to_next()) {
        (true, true) => "<>",
        (true, false) => "< ",
        (false, true) => " >",
        (false, false) => "  ",
    };
    println!(
        "  {}{}{}{}{}{} {} {:>2} {:<8} {:>10} {} {}",
        if file.is_read_only() { 'R' } else { '-' },
        if file.is_hidden() { 'H' } else { '-' },
        if file.is_system() { 'S' } else { '-' },
        if file.is_archive() { 'A' } else { '-' },
        if file.is_exec() { 'E' } else { '-' },
        if file.is_name_utf() { 'U' } else { '-' },
        span,
        folder_index,
        ctype,
        file.uncompressed_size(),
        file.datetime()
            .map(|dt| dt.to_string())
            .unwrap_or_else(|| "invalid datetime".to_string()),
        file.name()
    );
}

// ========================================================================= //
