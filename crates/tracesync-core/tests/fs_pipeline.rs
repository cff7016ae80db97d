//! End-to-end batch runs over real directory trees.

use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};
use tracesync_core::{
    render_summary_text, write_summary_json, AlignConfig, BatchRunner, EpisodeOutcome,
    StrategyKind,
};
use tracesync_store::{FsLayout, FsStore};

fn write_json(path: &Path, value: &Value) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, serde_json::to_vec_pretty(value).unwrap()).unwrap();
}

fn read_json(path: &Path) -> Value {
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}

fn images_of(value: &Value) -> Vec<Value> {
    value["trace"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["image"].clone())
        .collect()
}

#[tokio::test]
async fn nested_layout_nearest_writes_matched_copy() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    write_json(
        &root.join("1/trace-1.json"),
        &json!({
            "metadata": {"operator": "lab-a"},
            "trace": [
                {"timestamp_ms": 0, "joints": [0.1, 0.2]},
                {"timestamp_ms": 100, "joints": [0.1, 0.3]},
                {"joints": [0.0, 0.0]},
                {"timestamp_ms": 200, "joints": [0.2, 0.3]},
                {"timestamp_ms": 300, "joints": [0.2, 0.4], "image": "stale.jpg"}
            ],
            "session": "morning"
        }),
    );
    write_json(
        &root.join("1/images-1/a.jpg.json"),
        &json!({"timestamp": "0.050", "filename": "a.jpg"}),
    );
    write_json(
        &root.join("1/images-1/b.jpg.json"),
        &json!({"timestamp": 0.26, "filename": "b.jpg"}),
    );
    std::fs::write(root.join("1/images-1/c.jpg.json"), b"{truncated").unwrap();

    let store = Arc::new(FsStore::new(FsLayout::Nested {
        root: root.to_path_buf(),
    }));
    let config = AlignConfig {
        tolerance_ms: 60,
        ..AlignConfig::default()
    };
    let summary = BatchRunner::new(store.clone(), store.clone(), config)
        .unwrap()
        .run_all()
        .await
        .unwrap();

    assert_eq!(summary.aligned, 1);
    assert_eq!(summary.failed, 0);
    let report = &summary.episodes[0];
    assert_eq!(report.outcome, EpisodeOutcome::Aligned);
    assert_eq!(report.images, 2);
    assert_eq!(report.index_warnings.len(), 1);
    assert_eq!(report.missing_timestamps, 1);
    assert_eq!(report.alignment.matched, 4);
    assert_eq!(report.alignment.total, 4);

    let matched = read_json(&root.join("1/trace-1_matched.json"));
    assert_eq!(
        images_of(&matched),
        vec![
            json!("a.jpg"),
            json!("a.jpg"),
            json!("a.jpg"),
            json!("b.jpg"),
            json!("b.jpg")
        ]
    );
    // Everything else survives the round trip.
    assert_eq!(matched["metadata"]["operator"], "lab-a");
    assert_eq!(matched["session"], "morning");
    assert_eq!(matched["trace"][1]["joints"], json!([0.1, 0.3]));

    let source = read_json(&root.join("1/trace-1.json"));
    assert_eq!(source["trace"][4]["image"], "stale.jpg");
}

#[tokio::test]
async fn flat_layout_proportional_into_output_dir() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let out = root.join("aligned");

    let trace: Vec<Value> = [0, 250, 500, 750, 1000]
        .iter()
        .map(|ts| json!({"timestamp_ms": ts}))
        .collect();
    write_json(
        &root.join("traces/20250722155656.json"),
        &json!({"metadata": {}, "trace": trace}),
    );
    for (name, seconds) in [("a.jpg", "1721639400.010"), ("b.jpg", "1721639400.510"), ("c.jpg", "1721639401.010")] {
        write_json(
            &root.join(format!("images/20250722155656/{name}.json")),
            &json!({"timestamp": seconds, "filename": name}),
        );
    }
    // An episode without an image directory.
    write_json(
        &root.join("traces/7.json"),
        &json!({"trace": [{"timestamp_ms": 5}]}),
    );

    let store = Arc::new(
        FsStore::new(FsLayout::Flat {
            traces_dir: root.join("traces"),
            images_dir: root.join("images"),
        })
        .with_output_dir(&out),
    );
    std::fs::create_dir_all(&out).unwrap();
    let config = AlignConfig {
        strategy: StrategyKind::Proportional,
        ..AlignConfig::default()
    };
    let summary = BatchRunner::new(store.clone(), store.clone(), config)
        .unwrap()
        .run_all()
        .await
        .unwrap();

    assert_eq!(summary.aligned, 2);
    assert_eq!(summary.empty_image_pool, 1);
    // Numeric ids are listed first.
    assert_eq!(summary.episodes[0].episode_id.as_str(), "7");

    let auto = &summary.episodes[1];
    assert_eq!(auto.alignment.matched, 5);
    assert_eq!(auto.alignment.mean_offset_ms, Some(1_721_639_400_010.0));
    assert_eq!(auto.alignment.stddev_offset_ms, Some(0.0));

    let aligned = read_json(&out.join("20250722155656.json"));
    assert_eq!(
        images_of(&aligned),
        vec![
            json!("a.jpg"),
            json!("a.jpg"),
            json!("b.jpg"),
            json!("b.jpg"),
            json!("c.jpg")
        ]
    );
    let empty = read_json(&out.join("7.json"));
    assert_eq!(images_of(&empty), vec![Value::Null]);

    let summary_path = root.join("summary.json");
    write_summary_json(&summary_path, &summary).unwrap();
    let persisted = read_json(&summary_path);
    assert_eq!(persisted["aligned"], 2);
    assert_eq!(persisted["strategy"], "proportional");
    assert!(persisted["generated_at"].is_string());

    let text = render_summary_text(&summary);
    assert!(text.contains("autorecorded"));
    assert!(text.contains("numbered"));
}

#[tokio::test]
async fn repeated_runs_produce_identical_digests() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write_json(
        &root.join("2/trace-2.json"),
        &json!({"trace": [{"timestamp_ms": 10}, {"timestamp_ms": 40}, {"timestamp_ms": 90}]}),
    );
    write_json(
        &root.join("2/images-2/x.jpg.json"),
        &json!({"timestamp": "0.035", "filename": "x.jpg"}),
    );

    let store = Arc::new(FsStore::new(FsLayout::Nested {
        root: root.to_path_buf(),
    }));
    let runner = BatchRunner::new(store.clone(), store.clone(), AlignConfig::default()).unwrap();
    let first = runner.run_all().await.unwrap();
    let second = runner.run_all().await.unwrap();

    assert_eq!(
        first.episodes[0].assignment_digest,
        second.episodes[0].assignment_digest
    );
    assert_eq!(first.episodes, second.episodes);
}
