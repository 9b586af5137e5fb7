use std::path::PathBuf;

use cardioseg::model_loader::SegmentationEngine;
use cardioseg::pipeline::segment_ed_es;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let usage = "usage: cardioseg <weights> <ed-volume> <es-volume> [slice-index]";
    let weights = PathBuf::from(args.next().expect(usage));
    let ed_path = PathBuf::from(args.next().expect(usage));
    let es_path = PathBuf::from(args.next().expect(usage));
    let slice_index = args
        .next()
        .map(|raw| raw.parse::<i64>().expect("slice index must be an integer"));

    let engine = SegmentationEngine::new(weights);
    let report = segment_ed_es(&engine, &ed_path, &es_path, slice_index)
        .expect("segmentation should have completed");

    println!(
        "{}",
        serde_json::to_string_pretty(&report).expect("report should serialize")
    );
}
