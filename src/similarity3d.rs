use serde::{Deserialize, Serialize};

use crate::shape3d::{GlobalMeshVector, MeshFeatures};
use crate::store::ModelStore;
use crate::utils::mean_std;

/// 3D 搜索的 7 维特征权重
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weights3d(pub [f64; 7]);

/// 语料库各维的均值与标准差
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusStats {
    pub count: usize,
    pub means: [f64; 7],
    pub stds: [f64; 7],
}

/// 统计当前库内全部模型的逐维均值与标准差
///
/// 统计量每次查询都从当前全量语料重新计算，不做缓存，
/// 库变化后距离随之变化是预期行为。
pub fn corpus_stats(store: &ModelStore) -> Option<CorpusStats> {
    if store.model_count() == 0 {
        return None;
    }
    let vectors: Vec<[f64; 7]> =
        store.models().map(|(_, entry)| entry.features.global.to_array()).collect();

    let mut means = [0.0; 7];
    let mut stds = [0.0; 7];
    for dim in 0..7 {
        let column: Vec<f64> = vectors.iter().map(|v| v[dim]).collect();
        (means[dim], stds[dim]) = mean_std(&column);
    }
    Some(CorpusStats { count: vectors.len(), means, stds })
}

/// 逐维 z-score 归一化
///
/// 标准差低于 1e-6 的维度按 1.0 处理避免放大噪声；
/// 库内不足两个模型时统计量没有意义，原样返回。
fn normalize(vector: &[f64; 7], stats: &CorpusStats) -> [f64; 7] {
    if stats.count < 2 {
        return *vector;
    }
    let mut out = [0.0; 7];
    for dim in 0..7 {
        let std = if stats.stds[dim] < 1e-6 { 1.0 } else { stats.stds[dim] };
        out[dim] = (vector[dim] - stats.means[dim]) / std;
    }
    out
}

fn weighted_distance(a: &[f64; 7], b: &[f64; 7], weights: Option<&Weights3d>) -> f64 {
    let mut acc = 0.0;
    for dim in 0..7 {
        let w = weights.map(|w| w.0[dim]).unwrap_or(1.0);
        acc += w * (a[dim] - b[dim]).powi(2);
    }
    acc.sqrt()
}

/// 一条 3D 搜索结果，附带库内记录的原始特征值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarModel {
    pub model_id: String,
    pub distance: f64,
    pub features: MeshFeatures,
    pub obj_path: String,
    pub metadata: std::collections::BTreeMap<String, String>,
}

/// 以 7 维全局几何向量为查询，按加权欧氏距离升序返回最近的模型
pub fn search_similar(
    store: &ModelStore,
    query: &GlobalMeshVector,
    top_k: usize,
    weights: Option<&Weights3d>,
) -> Vec<SimilarModel> {
    let Some(stats) = corpus_stats(store) else {
        return vec![];
    };
    let query_normalized = normalize(&query.to_array(), &stats);

    let mut results: Vec<SimilarModel> = store
        .models()
        .map(|(model_id, entry)| {
            let normalized = normalize(&entry.features.global.to_array(), &stats);
            SimilarModel {
                model_id: model_id.clone(),
                distance: weighted_distance(&query_normalized, &normalized, weights),
                features: entry.features.clone(),
                obj_path: entry.obj_path.clone(),
                metadata: entry.metadata.clone(),
            }
        })
        .collect();

    results.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap());
    results.truncate(top_k);
    results
}
