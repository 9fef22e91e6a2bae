//! Index command - register one source tree.

use crate::app::App;
use crate::OutputFormat;
use anyhow::Context;
use grove_core::{
    Config, FileSelection, IndexStats, SkippedEntry, TreeIdentity, WalkReport,
};
use serde::Serialize;
use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Arguments of the index command.
pub struct IndexArgs {
    pub root: PathBuf,
    pub name: Option<String>,
    pub metadata: Option<String>,
    pub files_from: Option<PathBuf>,
    pub start: Option<PathBuf>,
    pub max_file_size: Option<u64>,
    pub output: OutputFormat,
}

/// Machine-readable summary printed with `--output json`.
#[derive(Serialize)]
struct IndexSummary<'a> {
    tree: &'a str,
    root: String,
    registered: u64,
    registered_bytes: u64,
    not_files: u64,
    skipped: &'a [SkippedEntry],
    stats: &'a IndexStats,
    elapsed_secs: f64,
}

/// Run the index command.
pub fn run(config: Config, args: IndexArgs) -> anyhow::Result<()> {
    let app = App::new(config);

    let name = match args.name {
        Some(name) => name,
        None => default_tree_name(&args.root)?,
    };
    let mut identity = TreeIdentity::new(name.clone());
    if let Some(raw) = &args.metadata {
        identity = identity.with_metadata(parse_metadata(raw)?);
    }

    let selection = match &args.files_from {
        Some(list) => FileSelection::Explicit(read_file_list(list)?),
        None => FileSelection::Recursive(args.start.clone().unwrap_or_default()),
    };
    let options = app.walk_options(&name, args.max_file_size)?;

    let start = Instant::now();
    let report = app.index_tree(&args.root, identity, selection, options)?;
    let elapsed = start.elapsed();
    let stats = app.index.stats();

    match args.output {
        OutputFormat::Text => print_text(&name, &report, &stats, elapsed.as_secs_f64()),
        OutputFormat::Json => {
            let summary = IndexSummary {
                tree: &name,
                root: args.root.display().to_string(),
                registered: report.registered,
                registered_bytes: report.registered_bytes,
                not_files: report.not_files,
                skipped: &report.skipped,
                stats: &stats,
                elapsed_secs: elapsed.as_secs_f64(),
            };
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}

fn print_text(name: &str, report: &WalkReport, stats: &IndexStats, elapsed: f64) {
    println!("Tree {} sealed.", name);
    println!("  Registered:  {} files ({} bytes)", report.registered, report.registered_bytes);
    println!("  Not files:   {}", report.not_files);
    println!("  Skipped:     {}", report.skipped_count());
    for entry in &report.skipped {
        println!("    {}: {}", entry.path, entry.reason);
    }
    println!(
        "  Stored:      {} unique blobs ({} bytes, {:.1}% saved by dedup)",
        stats.unique_blobs,
        stats.unique_bytes,
        stats.dedup_ratio() * 100.0
    );
    println!("  Time:        {:.2}s", elapsed);
}

/// The last component of the root path, used when no name is given.
fn default_tree_name(root: &Path) -> anyhow::Result<String> {
    let resolved = fs::canonicalize(root)
        .with_context(|| format!("cannot resolve repository root {}", root.display()))?;
    resolved
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .with_context(|| format!("cannot derive a tree name from {}; pass --name", root.display()))
}

fn parse_metadata(raw: &str) -> anyhow::Result<serde_json::Value> {
    serde_json::from_str(raw).context("--metadata must be a JSON document")
}

/// Read an ordered path list, one path per line. Blank lines are ignored.
fn read_file_list(source: &Path) -> anyhow::Result<Vec<PathBuf>> {
    if source == Path::new("-") {
        return parse_file_list(io::stdin().lock());
    }
    let file = fs::File::open(source)
        .with_context(|| format!("cannot open file list {}", source.display()))?;
    parse_file_list(BufReader::new(file))
}

fn parse_file_list(reader: impl BufRead) -> anyhow::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim_end_matches('\r');
        if !line.trim().is_empty() {
            paths.push(PathBuf::from(line));
        }
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_file_list_keeps_order() {
        let input = "src/main.rs\n\nREADME.md\r\nCargo.toml\n";
        let paths = parse_file_list(input.as_bytes()).unwrap();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("src/main.rs"),
                PathBuf::from("README.md"),
                PathBuf::from("Cargo.toml"),
            ]
        );
    }

    #[test]
    fn test_read_file_list_from_file() {
        let dir = TempDir::new().unwrap();
        let list = dir.path().join("files.txt");
        fs::write(&list, "b.txt\na.txt\n").unwrap();

        let paths = read_file_list(&list).unwrap();
        assert_eq!(paths, vec![PathBuf::from("b.txt"), PathBuf::from("a.txt")]);
        assert!(read_file_list(&dir.path().join("missing.txt")).is_err());
    }

    #[test]
    fn test_default_tree_name() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("linux");
        fs::create_dir(&root).unwrap();
        assert_eq!(default_tree_name(&root).unwrap(), "linux");
    }

    #[test]
    fn test_parse_metadata() {
        let value = parse_metadata(r#"{"commit": "abc", "branch": "main"}"#).unwrap();
        assert_eq!(value["branch"], "main");
        assert!(parse_metadata("not json").is_err());
    }

    #[test]
    fn test_run_indexes_tree() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "hello").unwrap();

        let args = IndexArgs {
            root: dir.path().to_path_buf(),
            name: Some("demo".to_string()),
            metadata: Some(r#"{"commit": "abc"}"#.to_string()),
            files_from: None,
            start: None,
            max_file_size: None,
            output: OutputFormat::Json,
        };
        run(Config::default(), args).unwrap();
    }

    #[test]
    fn test_run_text_summary_with_duplicates() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("LICENSE"), "same").unwrap();
        fs::write(dir.path().join("COPYING"), "same").unwrap();
        let list = dir.path().join("files.txt");
        fs::write(&list, "LICENSE\nCOPYING\n").unwrap();

        let args = IndexArgs {
            root: dir.path().to_path_buf(),
            name: None,
            metadata: None,
            files_from: Some(list),
            start: None,
            max_file_size: None,
            output: OutputFormat::Text,
        };
        run(Config::default(), args).unwrap();
    }
}
