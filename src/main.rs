//! Skald CLI - Command-line tool for inspecting chunked game-data archives.
//!
//! This is the main entry point for the Skald command-line application.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use skald::esm::{file_name, GroupKind, GroupLabel};
use skald::prelude::*;

/// Skald - master, plugin and save archive inspection tool
#[derive(Parser)]
#[command(name = "skald")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the header record of an archive
    Header {
        /// Path to the archive
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Print the group and record tree of an archive
    Dump {
        /// Path to the archive
        #[arg(short, long)]
        input: PathBuf,

        /// Only show records of this type (e.g. NPC_)
        #[arg(short, long)]
        tag: Option<String>,

        /// Also list each record's subrecords
        #[arg(short, long)]
        fields: bool,

        /// Fail when a group is larger than its parent allows instead of clamping
        #[arg(long)]
        strict: bool,
    },

    /// Count records by type across every archive in a directory
    Stats {
        /// Directory holding the archives
        #[arg(short, long, env = "SKALD_DATA_DIR")]
        data_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Header { input } => {
            cmd_header(&input)?;
        }
        Commands::Dump {
            input,
            tag,
            fields,
            strict,
        } => {
            cmd_dump(&input, tag.as_deref(), fields, strict)?;
        }
        Commands::Stats { data_dir } => {
            cmd_stats(&data_dir)?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn progress_bar(len: u64) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

fn cmd_header(input: &Path) -> Result<()> {
    let header = read_archive_header(input).context("Failed to read archive header")?;

    println!("File:        {}", input.display());
    println!("Format:      {:?} ({}-byte headers)", header.format, header.format.header_size());
    println!("Version:     {}", header.version);
    println!("Records:     {}", header.record_count);
    println!("Next id:     {:#010X}", header.next_object_id);
    println!("Master:      {}", header.is_master());
    println!("Localized:   {}", header.is_localized());
    if let Some(author) = &header.author {
        println!("Author:      {author}");
    }
    if let Some(description) = &header.description {
        println!("Description: {description}");
    }
    println!("Overrides:   {}", header.overrides.len());

    println!("\nMasters ({}):", header.masters.len());
    for (slot, master) in header.masters.iter().enumerate() {
        println!("  [{slot:02X}] {}", master.name);
    }

    Ok(())
}

/// Load order for a single archive: its masters in declaration order, then itself.
fn standalone_load_order(input: &Path, header: &ArchiveHeader) -> Result<LoadOrder> {
    let mut order = LoadOrder::new();
    for master in &header.masters {
        order.register(master.name.as_str())?;
    }
    order.register(file_name(input))?;
    Ok(order)
}

fn parse_tag(tag: &str) -> Result<Tag> {
    Tag::from_slice(tag.as_bytes()).with_context(|| format!("Record type must be 4 bytes, got {tag:?}"))
}

fn cmd_dump(input: &Path, tag: Option<&str>, fields: bool, strict: bool) -> Result<()> {
    let filter = tag.map(parse_tag).transpose()?;

    let header = read_archive_header(input).context("Failed to read archive header")?;
    let order = standalone_load_order(input, &header)?;
    let options = ReaderOptions::default().tolerate_group_overrun(!strict);
    let mut cursor = open_archive(input, &order, options).context("Failed to open archive")?;

    let start = Instant::now();
    let mut records = 0usize;

    while let Some(chunk) = cursor.next_chunk()? {
        let depth = cursor.current_group_stack_depth();
        match chunk {
            Chunk::GroupStart(group) => {
                if let (Some(wanted), GroupKind::Top, GroupLabel::RecordType(label)) = (filter, group.kind, group.label)
                {
                    if label != wanted {
                        cursor.skip_group()?;
                        continue;
                    }
                }
                println!(
                    "{:indent$}GRUP {:?} {:?} ({} bytes)",
                    "",
                    group.kind,
                    group.label,
                    group.total_size,
                    indent = (depth - 1) * 2
                );
            }
            Chunk::GroupEnd(_) => {}
            Chunk::Record(record) => {
                if filter.is_some_and(|wanted| record.tag != wanted) {
                    cursor.skip_record()?;
                    continue;
                }
                records += 1;
                println!(
                    "{:indent$}{} {} {}({} bytes)",
                    "",
                    record.tag,
                    cursor.rebase_form_id(record.id),
                    if record.is_compressed() { "C " } else { "" },
                    record.data_size,
                    indent = depth * 2
                );

                if fields {
                    while cursor.next_sub_record_header()? {
                        if let Some(sub) = cursor.sub_record_header() {
                            println!("{:indent$}{} {}", "", sub.tag, sub.data_size, indent = depth * 2 + 2);
                        }
                    }
                }
            }
        }
    }

    println!("\nTotal: {} records in {:?}", records, start.elapsed());

    Ok(())
}

/// Archives in `dir`, masters before plugins, each group sorted by name.
fn find_archives(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut archives: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to read {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| matches!(ext.to_ascii_lowercase().as_str(), "esm" | "esp" | "esl"))
        })
        .collect();

    archives.sort_by_key(|path| {
        let is_plugin = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("esp"));
        (is_plugin, file_name(path).to_ascii_lowercase())
    });
    Ok(archives)
}

/// Order archives so every master comes before the archives that declare it.
///
/// Archives whose header cannot be read are left out.
fn dependency_order(archives: &[PathBuf]) -> Vec<PathBuf> {
    let mut headers = BTreeMap::new();
    for path in archives {
        match read_archive_header(path) {
            Ok(header) => {
                headers.insert(file_name(path).to_ascii_lowercase(), (path.clone(), header));
            }
            Err(e) => warn!(file = %path.display(), error = %e, "skipping archive"),
        }
    }

    fn visit(
        name: String,
        headers: &BTreeMap<String, (PathBuf, ArchiveHeader)>,
        visited: &mut HashSet<String>,
        ordered: &mut Vec<PathBuf>,
    ) {
        if !visited.insert(name.clone()) {
            return;
        }
        if let Some((path, header)) = headers.get(&name) {
            for master in &header.masters {
                visit(master.name.to_ascii_lowercase(), headers, visited, ordered);
            }
            ordered.push(path.clone());
        }
    }

    let mut visited = HashSet::new();
    let mut ordered = Vec::with_capacity(headers.len());
    for path in archives {
        visit(file_name(path).to_ascii_lowercase(), &headers, &mut visited, &mut ordered);
    }
    ordered
}

struct FileStats {
    groups: usize,
    records: BTreeMap<Tag, usize>,
    compressed: usize,
}

fn walk_archive(path: &Path, order: &LoadOrder, pb: &ProgressBar) -> skald::esm::Result<FileStats> {
    let cursor = open_archive(path, order, ReaderOptions::default())?;
    // The header record was read before the observer was attached.
    pb.inc(cursor.position());

    let progress = pb.clone();
    let mut cursor = cursor.with_observer(move |count: usize| progress.inc(count as u64));

    let mut stats = FileStats {
        groups: 0,
        records: BTreeMap::new(),
        compressed: 0,
    };
    while let Some(chunk) = cursor.next_chunk()? {
        match chunk {
            Chunk::GroupStart(_) => stats.groups += 1,
            Chunk::GroupEnd(_) => {}
            Chunk::Record(record) => {
                *stats.records.entry(record.tag).or_default() += 1;
                if record.is_compressed() {
                    stats.compressed += 1;
                }
            }
        }
    }
    Ok(stats)
}

fn cmd_stats(data_dir: &Path) -> Result<()> {
    let archives = dependency_order(&find_archives(data_dir)?);
    if archives.is_empty() {
        anyhow::bail!("No archives found in {}", data_dir.display());
    }

    let mut order = LoadOrder::new();
    let mut total_bytes = 0u64;
    for path in &archives {
        let slot = order.register(file_name(path))?;
        total_bytes += fs::metadata(path)?.len();
        info!(slot, file = %path.display(), "registered archive");
    }

    println!("Reading {} archives from {}...", archives.len(), data_dir.display());

    let pb = progress_bar(total_bytes)?;
    let start = Instant::now();

    let results: Vec<(&PathBuf, skald::esm::Result<FileStats>)> = archives
        .par_iter()
        .map(|path| (path, walk_archive(path, &order, &pb)))
        .collect();

    pb.finish_and_clear();

    let mut totals = BTreeMap::<Tag, usize>::new();
    let mut failed = 0;
    for (path, result) in results {
        match result {
            Ok(stats) => {
                let records: usize = stats.records.values().sum();
                println!(
                    "{:<40} {:>8} records {:>6} groups {:>6} compressed",
                    file_name(path),
                    records,
                    stats.groups,
                    stats.compressed
                );
                for (tag, count) in stats.records {
                    *totals.entry(tag).or_default() += count;
                }
            }
            Err(e) => {
                warn!(file = %path.display(), error = %e, "failed to read archive");
                println!("{:<40} error: {e}", file_name(path));
                failed += 1;
            }
        }
    }

    println!("\nRecords by type:");
    for (tag, count) in &totals {
        println!("  {tag} {count:>10}");
    }

    println!(
        "\nRead {} archives ({} failed) in {:?}",
        archives.len(),
        failed,
        start.elapsed()
    );

    Ok(())
}
