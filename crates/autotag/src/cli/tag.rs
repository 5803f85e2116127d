//! The `autotag tag` command: rank every catalog image and merge sidecars.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::{ArgGroup, Args};
use indicatif::{ProgressBar, ProgressStyle};

use autotag_core::{
    CatalogPipeline, Config, FolderCatalog, ImageOutcome, ImageRecord, ImageSource,
    LightroomCatalog, OnnxEmbedder, ProcessingStats, ReportWriter, RunOptions, StopSignal,
    Vocabulary,
};

/// Arguments for the `tag` command.
#[derive(Args, Debug, Default)]
#[command(group(
    ArgGroup::new("source")
        .required(true)
        .args(["catalog", "image_folder"]),
))]
pub struct TagArgs {
    /// Lightroom catalog (.lrcat) to read image paths from
    #[arg(long)]
    pub catalog: Option<PathBuf>,

    /// Folder to scan recursively instead of a catalog
    #[arg(long)]
    pub image_folder: Option<PathBuf>,

    /// Where to write the keyword report [default: from config]
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Do not write a keyword report
    #[arg(long, conflicts_with = "output")]
    pub no_report: bool,

    /// Minimum similarity for a keyword to be suggested
    #[arg(long)]
    pub threshold: Option<f32>,

    /// Maximum keywords per image
    #[arg(long)]
    pub max_keywords: Option<usize>,

    /// Keyword vocabulary file
    #[arg(long)]
    pub keywords_file: Option<PathBuf>,

    /// Replace existing sidecar keywords instead of adding to them
    #[arg(long)]
    pub overwrite: bool,

    /// Rank and report, but leave sidecars untouched
    #[arg(long)]
    pub dry_run: bool,
}

/// Execute the tag command.
pub async fn execute(args: TagArgs) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    apply_overrides(&mut config, &args)?;

    let vocabulary = Vocabulary::load(&config.keywords_file())?;
    let records = load_records(&args, &config)?;
    if records.is_empty() {
        tracing::warn!("No images to process");
        return Ok(());
    }
    tracing::info!("Found {} image(s) to process", records.len());

    let embedder = Arc::new(OnnxEmbedder::load(&config.embedding, &config.model_dir())?);
    let mut pipeline = CatalogPipeline::new(&config, vocabulary, embedder);

    tracing::info!(
        "Embedding vocabulary of {} terms",
        pipeline.vocabulary().len()
    );
    pipeline.warm()?;

    let stop = StopSignal::new();
    let trip = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted: finishing the current image, then stopping");
            trip.stop();
        }
    });

    let options = RunOptions {
        overwrite: config.sidecar.overwrite,
        dry_run: args.dry_run,
    };

    let progress = create_progress_bar(records.len() as u64)?;
    let start = Instant::now();
    let result = pipeline
        .run(&records, options, &stop, |record, outcome| {
            on_image(&progress, start, record, outcome)
        })
        .await?;
    progress.finish_and_clear();

    print_summary(&result.stats, result.stopped, args.dry_run);

    if let Some(path) = report_path(&config, &args) {
        ReportWriter::write_file(&path, &result, config.output.pretty)?;
    }

    Ok(())
}

/// Fold CLI flags into the loaded config, then re-check it.
fn apply_overrides(config: &mut Config, args: &TagArgs) -> anyhow::Result<()> {
    if let Some(threshold) = args.threshold {
        config.ranking.threshold = threshold;
    }
    if let Some(max_keywords) = args.max_keywords {
        config.ranking.max_keywords = max_keywords;
    }
    if let Some(keywords_file) = &args.keywords_file {
        config.general.keywords_file = keywords_file.clone();
    }
    if args.overwrite {
        config.sidecar.overwrite = true;
    }
    config.validate()?;
    Ok(())
}

fn report_path(config: &Config, args: &TagArgs) -> Option<PathBuf> {
    if args.no_report {
        return None;
    }
    args.output.clone().or_else(|| config.report_path())
}

fn load_records(args: &TagArgs, config: &Config) -> anyhow::Result<Vec<ImageRecord>> {
    let records = match (&args.catalog, &args.image_folder) {
        (Some(catalog), _) => LightroomCatalog::open(catalog)?.images()?,
        (None, Some(folder)) => {
            FolderCatalog::new(folder, &config.catalog.supported_formats)?.images()?
        }
        (None, None) => anyhow::bail!("Either --catalog or --image-folder is required"),
    };
    Ok(records)
}

fn on_image(progress: &ProgressBar, start: Instant, record: &ImageRecord, outcome: &ImageOutcome) {
    progress.inc(1);
    if outcome.is_failure() {
        progress.println(format!("failed: {}", record.path.display()));
    } else if !outcome.keywords().is_empty() {
        tracing::debug!("{:?}: {} keyword(s)", record.path, outcome.keywords().len());
    }
    let elapsed = start.elapsed().as_secs_f64();
    if elapsed > 0.0 {
        progress.set_message(format!("{:.1} img/sec", progress.position() as f64 / elapsed));
    }
}

fn create_progress_bar(total: u64) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
            )?
            .progress_chars("##-"),
    );
    pb.set_message("starting...");
    Ok(pb)
}

fn print_summary(stats: &ProcessingStats, stopped: bool, dry_run: bool) {
    eprintln!();
    eprintln!("  ====================================");
    eprintln!("               Summary");
    eprintln!("  ====================================");
    eprintln!("    Tagged:       {:>8}", stats.tagged);
    eprintln!("    No matches:   {:>8}", stats.no_matches);
    if stats.degraded > 0 {
        eprintln!("    Degraded:     {:>8}", stats.degraded);
    }
    if stats.failed > 0 {
        eprintln!("    Failed:       {:>8}", stats.failed);
    }
    if stats.skipped > 0 {
        eprintln!("    Skipped:      {:>8}", stats.skipped);
    }
    eprintln!("  ------------------------------------");
    eprintln!("    Keywords added:{:>7}", stats.keywords_added);
    eprintln!("    Duration:     {:>7.1}s", stats.total_seconds);
    eprintln!("    Rate:         {:>7.1} img/sec", stats.images_per_second);
    eprintln!("  ====================================");
    if stopped {
        eprintln!("  Stopped early; rerun to finish the remaining images.");
    }
    if dry_run {
        eprintln!("  Dry run: no sidecars were written.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(flatten)]
        args: TagArgs,
    }

    fn parse(argv: &[&str]) -> Result<TagArgs, clap::Error> {
        let mut full = vec!["tag"];
        full.extend_from_slice(argv);
        TestCli::try_parse_from(full).map(|cli| cli.args)
    }

    #[test]
    fn test_source_is_required() {
        assert!(parse(&[]).is_err());
    }

    #[test]
    fn test_sources_are_exclusive() {
        assert!(parse(&["--catalog", "a.lrcat", "--image-folder", "photos"]).is_err());
    }

    #[test]
    fn test_no_report_conflicts_with_output() {
        assert!(parse(&["--image-folder", "p", "--no-report", "-o", "r.json"]).is_err());
    }

    #[test]
    fn test_overrides_applied() {
        let args = parse(&[
            "--catalog",
            "a.lrcat",
            "--threshold",
            "0.3",
            "--max-keywords",
            "5",
            "--keywords-file",
            "terms.txt",
            "--overwrite",
        ])
        .unwrap();

        let mut config = Config::default();
        apply_overrides(&mut config, &args).unwrap();
        assert_eq!(config.ranking.threshold, 0.3);
        assert_eq!(config.ranking.max_keywords, 5);
        assert_eq!(config.general.keywords_file, PathBuf::from("terms.txt"));
        assert!(config.sidecar.overwrite);
    }

    #[test]
    fn test_defaults_come_from_config() {
        let args = parse(&["--catalog", "a.lrcat"]).unwrap();
        let mut config = Config::default();
        apply_overrides(&mut config, &args).unwrap();
        assert_eq!(config.ranking.threshold, 0.5);
        assert_eq!(config.ranking.max_keywords, 20);
        assert!(!config.sidecar.overwrite);
        assert_eq!(
            report_path(&config, &args),
            Some(PathBuf::from("keyword_suggestions.json"))
        );
    }

    #[test]
    fn test_invalid_override_rejected() {
        let args = parse(&["--catalog", "a.lrcat", "--max-keywords", "0"]).unwrap();
        let mut config = Config::default();
        assert!(apply_overrides(&mut config, &args).is_err());
    }

    #[test]
    fn test_report_path_flags() {
        let config = Config::default();

        let args = parse(&["--catalog", "a.lrcat", "--no-report"]).unwrap();
        assert_eq!(report_path(&config, &args), None);

        let args = parse(&["--catalog", "a.lrcat", "-o", "out.json"]).unwrap();
        assert_eq!(report_path(&config, &args), Some(PathBuf::from("out.json")));
    }

    #[test]
    fn test_folder_records() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.jpg"), b"x").unwrap();
        std::fs::write(dir.path().join("a.PNG"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let folder = dir.path().to_string_lossy().into_owned();
        let args = parse(&["--image-folder", &folder]).unwrap();
        let records = load_records(&args, &Config::default()).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0].path.ends_with("a.PNG"));
    }
}
