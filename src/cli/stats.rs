use std::collections::BTreeMap;

use clap::Parser;
use serde_json::json;

use crate::cli::{SubCommandExtend, open_gallery, open_models};
use crate::config::Opts;
use crate::shape3d::FEATURE_NAMES;
use crate::similarity3d::corpus_stats;
use crate::store::GalleryStore;

#[derive(Parser, Debug, Clone)]
pub struct StatsCommand {}

impl SubCommandExtend for StatsCommand {
    fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let gallery = open_gallery(opts)?;
        let models = open_models(opts)?;

        let mut stats = json!({
            "gallery": gallery_stats(&gallery),
            "models3d": { "count": models.model_count() },
        });
        if let Some(corpus) = corpus_stats(&models) {
            stats["models3d"] = json!({
                "count": corpus.count,
                "feature_names": FEATURE_NAMES,
                "feature_means": corpus.means,
                "feature_stds": corpus.stds,
            });
        }

        println!("{}", serde_json::to_string_pretty(&stats)?);
        Ok(())
    }
}

fn gallery_stats(store: &GalleryStore) -> serde_json::Value {
    let total_objects: usize = store.images().map(|(_, e)| e.detections.len()).sum();
    let total_features: usize =
        store.images().map(|(_, e)| e.features.iter().flatten().count()).sum();

    let mut class_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for (_, entry) in store.images() {
        for det in &entry.detections {
            *class_counts.entry(det.class_name.as_str()).or_default() += 1;
        }
    }

    json!({
        "total_images": store.image_count(),
        "total_objects": total_objects,
        "total_features_extracted": total_features,
        "class_distribution": class_counts,
    })
}
