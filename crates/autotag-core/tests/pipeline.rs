//! End-to-end runs over a generated image folder with a deterministic embedder.

use std::path::Path;
use std::sync::Arc;

use image::{DynamicImage, GenericImageView, Rgb, RgbImage};

use autotag_core::catalog::{FolderCatalog, ImageSource};
use autotag_core::sidecar::{read_keywords, sidecar_path};
use autotag_core::{
    CatalogPipeline, Config, Embedder, ImageOutcome, PipelineError, ReportWriter, RunOptions,
    StopSignal, Vocabulary,
};

/// Embeds an image as its mean RGB color; color names map to their axis.
///
/// Images whose blue channel dominates fail to embed.
struct ColorEmbedder;

impl Embedder for ColorEmbedder {
    fn embed_image(&self, image: &DynamicImage) -> Result<Vec<f32>, PipelineError> {
        let rgb = image.to_rgb8();
        let count = (rgb.width() * rgb.height()).max(1) as f32;
        let mut sum = [0f32; 3];
        for pixel in rgb.pixels() {
            for (c, total) in sum.iter_mut().enumerate() {
                *total += pixel[c] as f32;
            }
        }
        if sum[2] > sum[0] && sum[2] > sum[1] {
            return Err(PipelineError::Embedding {
                path: Default::default(),
                message: "blue is not supported".to_string(),
            });
        }
        Ok(sum.iter().map(|s| s / count).collect())
    }

    fn embed_text(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        Ok(texts
            .iter()
            .map(|t| match t.as_str() {
                "red" => vec![1.0, 0.0, 0.0],
                "green" => vec![0.0, 1.0, 0.0],
                "blue" => vec![0.0, 0.0, 1.0],
                _ => vec![1.0, 1.0, 1.0],
            })
            .collect())
    }

    fn model_id(&self) -> &str {
        "mean-color"
    }
}

fn config() -> Config {
    let mut config = Config::default();
    config.embedding.cache_dir = None;
    config.ranking.threshold = 0.9;
    config
}

fn pipeline() -> CatalogPipeline {
    let vocabulary = Vocabulary::parse("[Colors]\n\tred\n\tgreen\n\tblue\n").unwrap();
    CatalogPipeline::new(&config(), vocabulary, Arc::new(ColorEmbedder))
}

fn write_image(dir: &Path, name: &str, color: [u8; 3]) {
    RgbImage::from_pixel(32, 24, Rgb(color))
        .save(dir.join(name))
        .unwrap();
}

/// red.png, green.png, gray.png, blue.png and a corrupt broken.jpg.
fn photo_folder() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_image(dir.path(), "red.png", [250, 0, 0]);
    write_image(dir.path(), "green.png", [0, 200, 0]);
    write_image(dir.path(), "gray.png", [128, 128, 128]);
    write_image(dir.path(), "blue.png", [0, 0, 255]);
    std::fs::write(dir.path().join("broken.jpg"), b"this is not a jpeg").unwrap();
    dir
}

fn records(dir: &Path) -> Vec<autotag_core::ImageRecord> {
    FolderCatalog::new(dir, &config().catalog.supported_formats)
        .unwrap()
        .images()
        .unwrap()
}

fn outcome_for<'a>(
    result: &'a autotag_core::ProcessingResult,
    name: &str,
) -> &'a ImageOutcome {
    &result
        .images
        .iter()
        .find(|r| r.record.path.file_name().and_then(|n| n.to_str()) == Some(name))
        .unwrap()
        .outcome
}

#[tokio::test]
async fn test_partial_failure_is_tolerated() {
    let dir = photo_folder();
    let records = records(dir.path());
    assert_eq!(records.len(), 5);

    let result = pipeline()
        .run(&records, RunOptions::default(), &StopSignal::new(), |_, _| {})
        .await
        .unwrap();

    assert_eq!(result.images.len(), 5);
    assert_eq!(result.stats.tagged, 2);
    assert_eq!(result.stats.no_matches, 1);
    assert_eq!(result.stats.degraded, 1);
    assert_eq!(result.stats.failed, 1);
    assert_eq!(result.stats.keywords_added, 2);
    assert!(!result.stopped);

    assert!(matches!(
        outcome_for(&result, "broken.jpg"),
        ImageOutcome::Failed {
            error: PipelineError::InvalidImage { .. }
        }
    ));
    assert!(matches!(
        outcome_for(&result, "blue.png"),
        ImageOutcome::EmbeddingFailed { .. }
    ));
    assert!(matches!(outcome_for(&result, "gray.png"), ImageOutcome::NoMatches));

    let red = std::fs::read(sidecar_path(&dir.path().join("red.png"))).unwrap();
    assert_eq!(read_keywords(&red), vec!["red"]);
    let green = std::fs::read(sidecar_path(&dir.path().join("green.png"))).unwrap();
    assert_eq!(read_keywords(&green), vec!["green"]);

    // Images without suggestions leave their sidecar alone.
    assert!(!dir.path().join("gray.xmp").exists());
    assert!(!dir.path().join("blue.xmp").exists());
    assert!(!dir.path().join("broken.xmp").exists());
}

#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let dir = photo_folder();
    let records = records(dir.path());
    let options = RunOptions {
        dry_run: true,
        ..Default::default()
    };

    let result = pipeline()
        .run(&records, options, &StopSignal::new(), |_, _| {})
        .await
        .unwrap();

    assert_eq!(result.stats.tagged, 2);
    match outcome_for(&result, "red.png") {
        ImageOutcome::Tagged { sidecar, .. } => assert!(!sidecar.written),
        other => panic!("unexpected outcome: {other:?}"),
    }
    let xmp_files = std::fs::read_dir(dir.path())
        .unwrap()
        .filter(|e| {
            e.as_ref()
                .unwrap()
                .path()
                .extension()
                .is_some_and(|ext| ext == "xmp")
        })
        .count();
    assert_eq!(xmp_files, 0);
}

#[tokio::test]
async fn test_stop_signal_halts_between_images() {
    let dir = photo_folder();
    let records = records(dir.path());
    let stop = StopSignal::new();
    let trip = stop.clone();

    let mut seen = 0;
    let result = pipeline()
        .run(&records, RunOptions::default(), &stop, |_, _| {
            seen += 1;
            if seen == 2 {
                trip.stop();
            }
        })
        .await
        .unwrap();

    assert!(result.stopped);
    assert_eq!(result.images.len(), 2);
    assert_eq!(result.stats.skipped, 3);
    assert_eq!(result.stats.processed(), 2);
}

#[tokio::test]
async fn test_second_run_is_stable() {
    let dir = photo_folder();
    let records = records(dir.path());
    let mut pipeline = pipeline();

    pipeline
        .run(&records, RunOptions::default(), &StopSignal::new(), |_, _| {})
        .await
        .unwrap();
    let first = std::fs::read(dir.path().join("red.xmp")).unwrap();

    let result = pipeline
        .run(&records, RunOptions::default(), &StopSignal::new(), |_, _| {})
        .await
        .unwrap();
    let second = std::fs::read(dir.path().join("red.xmp")).unwrap();

    assert_eq!(first, second);
    assert_eq!(result.stats.keywords_added, 0);
}

#[tokio::test]
async fn test_overwrite_replaces_existing_keywords() {
    let dir = photo_folder();
    let existing = autotag_core::sidecar::merge(None, ["stale"], false);
    std::fs::write(dir.path().join("red.xmp"), &existing.bytes).unwrap();
    std::fs::write(dir.path().join("green.xmp"), &existing.bytes).unwrap();

    let records = records(dir.path());
    let red_only: Vec<_> = records
        .iter()
        .filter(|r| r.path.ends_with("red.png"))
        .cloned()
        .collect();
    let options = RunOptions {
        overwrite: true,
        ..Default::default()
    };
    pipeline()
        .run(&red_only, options, &StopSignal::new(), |_, _| {})
        .await
        .unwrap();

    let red = std::fs::read(dir.path().join("red.xmp")).unwrap();
    assert_eq!(read_keywords(&red), vec!["red"]);

    let green_only: Vec<_> = records
        .iter()
        .filter(|r| r.path.ends_with("green.png"))
        .cloned()
        .collect();
    pipeline()
        .run(&green_only, RunOptions::default(), &StopSignal::new(), |_, _| {})
        .await
        .unwrap();

    let green = std::fs::read(dir.path().join("green.xmp")).unwrap();
    assert_eq!(read_keywords(&green), vec!["green", "stale"]);
}

#[tokio::test]
async fn test_report_contains_only_tagged_images() {
    let dir = photo_folder();
    let records = records(dir.path());
    let result = pipeline()
        .run(&records, RunOptions::default(), &StopSignal::new(), |_, _| {})
        .await
        .unwrap();

    let report_path = dir.path().join("keyword_suggestions.json");
    let written = ReportWriter::write_file(&report_path, &result, true).unwrap();
    assert_eq!(written, 2);

    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report_path).unwrap()).unwrap();
    let entries = report.as_object().unwrap();
    assert_eq!(entries.len(), 2);

    let red_key = dir.path().join("red.png").to_string_lossy().into_owned();
    assert_eq!(report[&red_key][0][0], "red");
    assert!(report[&red_key][0][1].as_f64().unwrap() > 0.9);
}

#[test]
fn test_large_images_are_downscaled_before_embedding() {
    struct SizeCheck;
    impl Embedder for SizeCheck {
        fn embed_image(&self, image: &DynamicImage) -> Result<Vec<f32>, PipelineError> {
            let (w, h) = image.dimensions();
            assert!(w.max(h) <= 1024);
            Ok(vec![1.0])
        }
        fn embed_text(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
            Ok(texts.iter().map(|_| vec![1.0]).collect())
        }
        fn model_id(&self) -> &str {
            "size-check"
        }
    }

    let vocabulary = Vocabulary::from_terms(["anything"]).unwrap();
    let mut cache = autotag_core::EmbeddingCache::in_memory();
    let embeddings = cache.get_text_embeddings(&vocabulary, &SizeCheck).unwrap();
    let ranker = autotag_core::KeywordRanker::new(Default::default());

    let image = DynamicImage::new_rgb8(3000, 1500);
    let keywords = ranker
        .try_rank(image, &vocabulary, embeddings, &SizeCheck, Path::new("big.png"))
        .unwrap();
    assert_eq!(keywords.len(), 1);
}

#[tokio::test]
async fn test_sidecar_failure_still_reports_keywords() {
    let dir = photo_folder();
    std::fs::create_dir(dir.path().join("red.xmp")).unwrap();
    let records = records(dir.path());

    let result = pipeline()
        .run(&records, RunOptions::default(), &StopSignal::new(), |_, _| {})
        .await
        .unwrap();

    match outcome_for(&result, "red.png") {
        ImageOutcome::SidecarFailed { keywords, error } => {
            assert_eq!(keywords[0].term, "red");
            assert!(matches!(error, PipelineError::SidecarRead { .. }));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(result.stats.tagged, 1);
    assert_eq!(result.stats.failed, 2);
    assert_eq!(result.failures().count(), 2);

    let report: serde_json::Value =
        serde_json::from_str(&autotag_core::output::to_json(&result, false).unwrap()).unwrap();
    let red_key = dir.path().join("red.png").to_string_lossy().into_owned();
    assert_eq!(report[&red_key][0][0], "red");
    assert_eq!(report.as_object().unwrap().len(), 2);
}
