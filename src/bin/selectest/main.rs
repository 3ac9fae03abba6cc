//! The binary entrypoint for `selectest`.

use std::path::{Path, PathBuf};

use clap::{crate_version, Parser, Subcommand};
use color_eyre::eyre::{eyre, Context};
use color_eyre::Result;
use tracing_subscriber::util::SubscriberInitExt;

mod log;

#[derive(Clone, Debug, Parser)]
#[command(name = "selectest", about = "Fingerprint-based test-selection engine", version = crate_version!())]
struct TopLevelFlags {
    #[command(subcommand)]
    command: Command,

    /// When to colorize output
    #[arg(long, value_enum, default_value_t = log::WhenColor::Auto)]
    color: log::WhenColor,
}

#[derive(Clone, Debug, Subcommand)]
enum Command {
    /// Save a fresh baseline fingerprint for every file in scope
    Baseline {
        /// Store file to write to
        #[arg(long, default_value = ".selectest.db")]
        store: PathBuf,
        /// Project root files are reported relative to
        #[arg(long, default_value = ".")]
        root: PathBuf,
        /// Paths to scan (defaults to the whole project root)
        scope: Vec<PathBuf>,
    },

    /// Report which files changed since the last baseline
    Diff {
        #[arg(long, default_value = ".selectest.db")]
        store: PathBuf,
        #[arg(long, default_value = ".")]
        root: PathBuf,
        scope: Vec<PathBuf>,
    },

    /// Merge one or more baseline databases into a single output database
    Merge {
        /// Destination database (local path or file://.../s3://... URL)
        output: String,
        /// Source databases (local paths or file://.../s3://... URLs)
        #[arg(required = true)]
        inputs: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let top = TopLevelFlags::parse();

    let logger = log::make_logger(std::io::stderr, top.color)?;
    logger.init();

    match top.command {
        Command::Baseline { store, root, scope } => cmd_baseline(store, root, scope),
        Command::Diff { store, root, scope } => cmd_diff(store, root, scope),
        Command::Merge { output, inputs } => cmd_merge(output, inputs).await,
    }
}

fn cmd_baseline(store: PathBuf, root: PathBuf, scope: Vec<PathBuf>) -> Result<()> {
    let mut engine = selectest::Engine::open(&store, 100_000).context("open store")?;
    let count = engine.save_baseline(&root, &scope).context("save baseline")?;
    println!("saved baseline for {count} file(s)");
    Ok(())
}

fn cmd_diff(store: PathBuf, root: PathBuf, scope: Vec<PathBuf>) -> Result<()> {
    let engine = selectest::Engine::open(&store, 100_000).context("open store")?;
    let changes = engine.detect_changes(&root, &scope).context("detect changes")?;

    if !changes.has_changes() {
        println!("no changes");
        return Ok(());
    }

    for file in &changes.modified {
        println!("{file}");
    }
    Ok(())
}

/// Resolves one `merge` input argument into every local `.db` file it
/// denotes: a single local file, every `*.db` directly inside a local
/// directory (non-recursive), a single remote object, or every object
/// under a remote prefix (trailing slash — downloaded recursively).
async fn resolve_merge_input(arg: &str, scratch_dir: &std::path::Path, index: usize) -> Result<Vec<PathBuf>> {
    if arg.starts_with("file://") || arg.starts_with("s3://") {
        if arg.ends_with('/') {
            let backend = selectest::remote::RemoteBackend::connect(arg)
                .await
                .with_context(|| format!("connect to {arg}"))?;
            let dest = scratch_dir.join(format!("input-{index}"));
            tokio::fs::create_dir_all(&dest)
                .await
                .context("create scratch subdirectory")?;
            backend
                .download_all("", &dest)
                .await
                .with_context(|| format!("download baselines under {arg}"))
        } else {
            let local_path = scratch_dir.join(format!("input-{index}.db"));
            let (backend_url, key) = split_remote(arg)?;
            let backend = selectest::remote::RemoteBackend::connect(&backend_url)
                .await
                .with_context(|| format!("connect to {backend_url}"))?;
            backend
                .download(&key, &local_path)
                .await
                .with_context(|| format!("download {arg}"))?;
            Ok(vec![local_path])
        }
    } else {
        let path = PathBuf::from(arg);
        if path.is_dir() {
            expand_local_dir(&path)
        } else {
            Ok(vec![path])
        }
    }
}

/// Non-recursive glob of `*.db` files directly inside `dir`.
fn expand_local_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).with_context(|| format!("read directory {}", dir.display()))?;
    let mut out = Vec::new();
    for entry in entries {
        let entry = entry.context("read directory entry")?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("db") {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

/// Splits a remote URL into its backend root (`scheme://bucket-or-dir`) and
/// trailing object key.
fn split_remote(url: &str) -> Result<(String, String)> {
    let (scheme, rest) = url
        .split_once("://")
        .ok_or_else(|| eyre!("invalid remote URL: {url}"))?;
    let (root, key) = rest
        .rsplit_once('/')
        .ok_or_else(|| eyre!("remote URL has no object key: {url}"))?;
    Ok((format!("{scheme}://{root}"), key.to_string()))
}

async fn cmd_merge(output: String, inputs: Vec<String>) -> Result<()> {
    let scratch = tempfile::tempdir().context("create scratch dir")?;

    let mut local_inputs = Vec::new();
    for (i, input) in inputs.iter().enumerate() {
        local_inputs.extend(resolve_merge_input(input, scratch.path(), i).await?);
    }

    let local_output = if output.starts_with("file://") || output.starts_with("s3://") {
        scratch.path().join("output.db")
    } else {
        PathBuf::from(&output)
    };

    let report = selectest::merge::merge_databases(&local_output, &local_inputs).context("merge databases")?;

    for warning in &report.warnings {
        tracing::warn!("{warning}");
    }
    println!(
        "merged {} baseline(s) and {} test execution(s) into {}",
        report.total_baselines, report.total_tests, output
    );

    if output.starts_with("file://") || output.starts_with("s3://") {
        let (backend_url, key) = split_remote(&output)?;
        let backend = selectest::remote::RemoteBackend::connect(&backend_url)
            .await
            .with_context(|| format!("connect to {backend_url}"))?;
        backend
            .upload(&local_output, &key)
            .await
            .with_context(|| format!("upload merged database to {output}"))?;
    }

    Ok(())
}
