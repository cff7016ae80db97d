//! TraceSync - trace/image temporal alignment CLI
//!
//! The `tracesync` command labels every sample of a recorded robot
//! demonstration with the camera image captured closest to it.
//!
//! ## Commands
//!
//! - `align`: align a batch of episodes and write them back
//! - `index`: print the timestamp index of one image directory

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use tracesync_core::telemetry;
use tracesync_core::{
    build_index, render_summary_text, write_summary_json, AlignConfig, BatchRunner,
    BatchSummary, CancelFlag, ImageRecord, IndexWarning, StrategyKind,
};
use tracesync_store::{
    read_sidecar_dir, EpisodeId, EpisodeStore, FsLayout, FsStore, DEFAULT_SIDECAR_SUFFIX,
};

#[derive(Parser)]
#[command(name = "tracesync")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Align robot demonstration traces with their camera images", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines (and JSON from `index`)
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Align episodes with their image pools and write them back
    Align(AlignArgs),

    /// Build and print the timestamp index of one image directory
    Index {
        /// Directory holding the image metadata sidecars
        #[arg(long)]
        images: PathBuf,

        /// File-name suffix of metadata sidecars
        #[arg(long, default_value = DEFAULT_SIDECAR_SUFFIX)]
        suffix: String,
    },
}

#[derive(Args, Debug)]
struct AlignArgs {
    /// Root of a nested recording tree (`<root>/<n>/trace-<n>.json`)
    #[arg(long, env = "TRACESYNC_ROOT", conflicts_with_all = ["traces", "images"])]
    root: Option<PathBuf>,

    /// Directory of flat `<id>.json` traces
    #[arg(long, env = "TRACESYNC_TRACES", requires = "images")]
    traces: Option<PathBuf>,

    /// Directory of per-episode image folders (`<images>/<id>/`)
    #[arg(long, env = "TRACESYNC_IMAGES", requires = "traces")]
    images: Option<PathBuf>,

    /// Only align these episodes (repeatable; default: all)
    #[arg(long = "episode", value_name = "ID")]
    episodes: Vec<String>,

    /// Alignment strategy: nearest or proportional
    #[arg(long, env = "TRACESYNC_STRATEGY")]
    strategy: Option<StrategyKind>,

    /// Nearest-match acceptance window in milliseconds
    #[arg(long, env = "TRACESYNC_TOLERANCE_MS")]
    tolerance_ms: Option<u64>,

    /// Write aligned episodes over their source files
    #[arg(long, env = "TRACESYNC_OVERWRITE_ORIGINAL")]
    overwrite_original: bool,

    /// Write aligned episodes to `<dir>/<id>.json` instead of next to the source
    #[arg(long, env = "TRACESYNC_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Only keep direct matches; do not carry images forward
    #[arg(long)]
    no_fill: bool,

    /// Episodes aligned in flight at once
    #[arg(long, env = "TRACESYNC_CONCURRENCY")]
    concurrency: Option<usize>,

    /// TOML configuration file; flags override its values
    #[arg(long, env = "TRACESYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Also write the batch summary as JSON to this path
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Exit successfully even if episodes failed or none were aligned
    #[arg(long)]
    allow_failures: bool,
}

impl AlignArgs {
    fn layout(&self) -> Result<FsLayout> {
        match (&self.root, &self.traces, &self.images) {
            (Some(root), None, None) => Ok(FsLayout::Nested { root: root.clone() }),
            (None, Some(traces), Some(images)) => Ok(FsLayout::Flat {
                traces_dir: traces.clone(),
                images_dir: images.clone(),
            }),
            _ => bail!("pass either --root DIR or both --traces DIR and --images DIR"),
        }
    }

    /// Config file (if any) overridden by command-line flags.
    fn resolve_config(&self) -> Result<AlignConfig> {
        let mut config = match &self.config {
            Some(path) => AlignConfig::from_toml_file(path)
                .with_context(|| format!("load config {:?}", path))?,
            None => AlignConfig::default(),
        };
        if let Some(strategy) = self.strategy {
            config.strategy = strategy;
        }
        if let Some(tolerance_ms) = self.tolerance_ms {
            config.tolerance_ms = tolerance_ms;
        }
        if self.overwrite_original {
            config.overwrite_original = true;
        }
        if self.no_fill {
            config.fill_gaps = false;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        config.validate()?;
        Ok(config)
    }

    fn store(&self) -> Result<FsStore> {
        let mut store = FsStore::new(self.layout()?);
        if let Some(dir) = &self.output_dir {
            store = store.with_output_dir(dir);
        }
        Ok(store)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    telemetry::init_tracing(cli.json, telemetry::level_for(cli.verbose));

    match cli.command {
        Commands::Align(args) => {
            let cancel = CancelFlag::new();
            spawn_ctrl_c_handler(cancel.clone());

            let summary = cmd_align(&args, cancel).await?;
            print!("{}", render_summary_text(&summary));
            if let Some(path) = &args.summary {
                write_summary_json(path, &summary)?;
                info!(path = ?path, "summary written");
            }
            check_exit_policy(&summary, args.allow_failures)
        }
        Commands::Index { images, suffix } => cmd_index(&images, &suffix, cli.json).await,
    }
}

/// First Ctrl-C stops new episodes from starting; in-flight ones finish.
fn spawn_ctrl_c_handler(cancel: CancelFlag) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight episodes");
            cancel.cancel();
        }
    });
}

/// Align the selected episodes of one recording tree.
async fn cmd_align(args: &AlignArgs, cancel: CancelFlag) -> Result<BatchSummary> {
    let config = args.resolve_config()?;
    let store = Arc::new(args.store()?);

    let ids: Vec<EpisodeId> = if args.episodes.is_empty() {
        store
            .list_episodes()
            .await
            .context("Failed to list episodes")?
    } else {
        args.episodes.iter().cloned().map(EpisodeId::from).collect()
    };
    info!(
        episodes = ids.len(),
        strategy = %config.strategy,
        layout = ?store.layout(),
        "starting alignment"
    );

    let runner = BatchRunner::new(store.clone(), store, config)?.with_cancel_flag(cancel);
    Ok(runner.run(ids).await)
}

/// Non-zero exit when nothing was aligned or anything failed.
fn check_exit_policy(summary: &BatchSummary, allow_failures: bool) -> Result<()> {
    if allow_failures {
        return Ok(());
    }
    if summary.aligned == 0 {
        bail!("no episode could be aligned");
    }
    if summary.failed > 0 {
        bail!("{} of {} episodes failed", summary.failed, summary.total_episodes);
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct IndexListing {
    images: Vec<ImageRecord>,
    warnings: Vec<IndexWarning>,
    overwritten: usize,
    span_ms: Option<(i64, i64)>,
}

async fn build_listing(images: &Path, suffix: &str) -> Result<IndexListing> {
    let sidecars = read_sidecar_dir(images, suffix)
        .await
        .with_context(|| format!("read image sidecars from {:?}", images))?;
    let build = build_index(&sidecars);
    Ok(IndexListing {
        images: build
            .index
            .iter()
            .map(|(timestamp_ms, identifier)| ImageRecord {
                timestamp_ms,
                identifier: identifier.to_string(),
            })
            .collect(),
        span_ms: build.index.span(),
        warnings: build.warnings,
        overwritten: build.overwritten,
    })
}

/// Print the timestamp index of one image directory.
async fn cmd_index(images: &Path, suffix: &str, json: bool) -> Result<()> {
    let listing = build_listing(images, suffix).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    for record in &listing.images {
        println!("{:>16}  {}", record.timestamp_ms, record.identifier);
    }
    println!();
    println!("Images: {}", listing.images.len());
    if let Some((first, last)) = listing.span_ms {
        println!("Span:   {} .. {} ({} ms)", first, last, last.abs_diff(first));
    }
    if listing.overwritten > 0 {
        println!("Same-millisecond duplicates dropped: {}", listing.overwritten);
    }
    if !listing.warnings.is_empty() {
        println!("Skipped sidecars:");
        for warning in &listing.warnings {
            println!("  {}", warning);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse_align(args: &[&str]) -> AlignArgs {
        let mut argv = vec!["tracesync", "align"];
        argv.extend_from_slice(args);
        match Cli::try_parse_from(argv).expect("parse").command {
            Commands::Align(args) => args,
            Commands::Index { .. } => panic!("expected align"),
        }
    }

    fn write_json(path: &Path, value: &serde_json::Value) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, serde_json::to_vec(value).unwrap()).unwrap();
    }

    #[test]
    fn test_layout_from_flags() {
        let nested = parse_align(&["--root", "/runs"]);
        assert_eq!(
            nested.layout().unwrap(),
            FsLayout::Nested {
                root: PathBuf::from("/runs")
            }
        );

        let flat = parse_align(&["--traces", "/t", "--images", "/i"]);
        assert_eq!(
            flat.layout().unwrap(),
            FsLayout::Flat {
                traces_dir: PathBuf::from("/t"),
                images_dir: PathBuf::from("/i"),
            }
        );
    }

    #[test]
    fn test_root_conflicts_with_flat_layout() {
        let result = Cli::try_parse_from([
            "tracesync", "align", "--root", "/runs", "--traces", "/t", "--images", "/i",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("align.toml");
        std::fs::write(
            &config_path,
            "strategy = \"proportional\"\ntolerance_ms = 500\nconcurrency = 3\n",
        )
        .unwrap();
        let config_arg = config_path.to_str().unwrap();

        let from_file = parse_align(&["--root", "/runs", "--config", config_arg])
            .resolve_config()
            .unwrap();
        assert_eq!(from_file.strategy, StrategyKind::Proportional);
        assert_eq!(from_file.tolerance_ms, 500);
        assert_eq!(from_file.concurrency, 3);
        assert!(from_file.fill_gaps);

        let overridden = parse_align(&[
            "--root",
            "/runs",
            "--config",
            config_arg,
            "--strategy",
            "nearest",
            "--tolerance-ms",
            "80",
            "--no-fill",
            "--overwrite-original",
        ])
        .resolve_config()
        .unwrap();
        assert_eq!(overridden.strategy, StrategyKind::Nearest);
        assert_eq!(overridden.tolerance_ms, 80);
        assert_eq!(overridden.concurrency, 3);
        assert!(!overridden.fill_gaps);
        assert!(overridden.overwrite_original);
    }

    #[test]
    fn test_zero_concurrency_is_rejected() {
        let args = parse_align(&["--root", "/runs", "--concurrency", "0"]);
        assert!(args.resolve_config().is_err());
    }

    #[test]
    fn test_unknown_strategy_is_a_parse_error() {
        let result = Cli::try_parse_from([
            "tracesync", "align", "--root", "/runs", "--strategy", "fastest",
        ]);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_cmd_align_selected_episodes() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for id in ["1", "2"] {
            write_json(
                &root.join(format!("{id}/trace-{id}.json")),
                &json!({"trace": [{"timestamp_ms": 0}, {"timestamp_ms": 50}]}),
            );
            write_json(
                &root.join(format!("{id}/images-{id}/a.jpg.json")),
                &json!({"timestamp": "0.010", "filename": "a.jpg"}),
            );
        }
        let root_arg = root.to_str().unwrap();
        let args = parse_align(&["--root", root_arg, "--episode", "2", "--overwrite-original"]);

        let summary = cmd_align(&args, CancelFlag::new()).await.unwrap();
        assert_eq!(summary.total_episodes, 1);
        assert_eq!(summary.aligned, 1);
        assert_eq!(summary.matched, 2);
        assert!(check_exit_policy(&summary, false).is_ok());

        let rewritten: serde_json::Value =
            serde_json::from_slice(&std::fs::read(root.join("2/trace-2.json")).unwrap()).unwrap();
        assert_eq!(rewritten["trace"][1]["image"], "a.jpg");
        let untouched: serde_json::Value =
            serde_json::from_slice(&std::fs::read(root.join("1/trace-1.json")).unwrap()).unwrap();
        assert!(untouched["trace"][0].get("image").is_none());
    }

    #[tokio::test]
    async fn test_missing_episode_fails_exit_policy() {
        let dir = tempfile::tempdir().unwrap();
        let root_arg = dir.path().to_str().unwrap();
        let args = parse_align(&["--root", root_arg, "--episode", "404"]);

        let summary = cmd_align(&args, CancelFlag::new()).await.unwrap();
        assert_eq!(summary.failed, 1);
        assert!(check_exit_policy(&summary, false).is_err());
        assert!(check_exit_policy(&summary, true).is_ok());
    }

    #[tokio::test]
    async fn test_build_listing_reports_span_and_warnings() {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path();
        write_json(
            &images.join("a.jpg.json"),
            &json!({"timestamp": "1.000", "filename": "a.jpg"}),
        );
        write_json(
            &images.join("b.jpg.json"),
            &json!({"timestamp": "1.250", "filename": "b.jpg"}),
        );
        write_json(&images.join("c.jpg.json"), &json!({"filename": "c.jpg"}));
        std::fs::write(images.join("notes.txt"), "not a sidecar").unwrap();

        let listing = build_listing(images, DEFAULT_SIDECAR_SUFFIX).await.unwrap();
        assert_eq!(listing.images.len(), 2);
        assert_eq!(listing.images[0].identifier, "a.jpg");
        assert_eq!(listing.span_ms, Some((1_000, 1_250)));
        assert_eq!(listing.warnings.len(), 1);
        assert_eq!(listing.warnings[0].source, "c.jpg.json");
    }
}
