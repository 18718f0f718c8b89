use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::extract::DescriptorBundle;
use crate::store::GalleryStore;

/// 检测记录缺失时的类别占位
pub const UNKNOWN_CLASS: &str = "unknown";

/// 描述子的模态
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Color,
    TextureTamura,
    TextureGabor,
    TextureLbp,
    ShapeHu,
    ShapeHog,
    ShapeContour,
}

impl Modality {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Color => "color",
            Self::TextureTamura => "texture_tamura",
            Self::TextureGabor => "texture_gabor",
            Self::TextureLbp => "texture_lbp",
            Self::ShapeHu => "shape_hu",
            Self::ShapeHog => "shape_hog",
            Self::ShapeContour => "shape_contour",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        SCORERS.iter().map(|s| s.modality).find(|m| m.name() == name)
    }
}

/// 单个模态的打分项
///
/// 新模态只需在 [`SCORERS`] 表中登记一行，聚合逻辑不用改动。
pub struct ModalityScorer {
    pub modality: Modality,
    pub default_weight: f64,
    /// 任一侧缺失该模态时返回 `None`，聚合时跳过对应权重
    pub score: fn(&DescriptorBundle, &DescriptorBundle) -> Option<f64>,
}

/// 全部模态的打分表，默认权重之和为 1
pub static SCORERS: [ModalityScorer; 7] = [
    ModalityScorer { modality: Modality::Color, default_weight: 0.25, score: score_color },
    ModalityScorer {
        modality: Modality::TextureTamura,
        default_weight: 0.15,
        score: score_tamura,
    },
    ModalityScorer { modality: Modality::TextureGabor, default_weight: 0.15, score: score_gabor },
    ModalityScorer { modality: Modality::TextureLbp, default_weight: 0.10, score: score_lbp },
    ModalityScorer { modality: Modality::ShapeHu, default_weight: 0.10, score: score_hu },
    ModalityScorer { modality: Modality::ShapeHog, default_weight: 0.15, score: score_hog },
    ModalityScorer {
        modality: Modality::ShapeContour,
        default_weight: 0.10,
        score: score_contour,
    },
];

/// 直方图交：逐 bin 取较小值求和，归一化直方图下取值 [0, 1]
pub fn histogram_intersection(h1: &[f64], h2: &[f64]) -> f64 {
    if h1.is_empty() || h2.is_empty() {
        return 0.0;
    }
    h1.iter().zip(h2).map(|(&a, &b)| a.min(b)).sum()
}

/// 余弦相似度，负值截断为 0，零向量视为 0
pub fn cosine_similarity(v1: &[f64], v2: &[f64]) -> f64 {
    if v1.is_empty() || v2.is_empty() {
        return 0.0;
    }
    let norm1 = v1.iter().map(|v| v * v).sum::<f64>().sqrt();
    let norm2 = v2.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm1 == 0.0 || norm2 == 0.0 {
        return 0.0;
    }
    let dot: f64 = v1.iter().zip(v2).map(|(&a, &b)| a * b).sum();
    (dot / (norm1 * norm2)).max(0.0)
}

/// 距离倒数相似度 1 / (1 + ||v1 - v2||)
pub fn inverse_distance_similarity(v1: &[f64], v2: &[f64]) -> f64 {
    if v1.is_empty() || v2.is_empty() || v1.len() != v2.len() {
        return 0.0;
    }
    let distance = v1.iter().zip(v2).map(|(&a, &b)| (a - b).powi(2)).sum::<f64>().sqrt();
    1.0 / (1.0 + distance)
}

fn score_color(a: &DescriptorBundle, b: &DescriptorBundle) -> Option<f64> {
    Some(histogram_intersection(&a.color.as_ref()?.hist_rgb, &b.color.as_ref()?.hist_rgb))
}

fn score_tamura(a: &DescriptorBundle, b: &DescriptorBundle) -> Option<f64> {
    let (t1, t2) = (a.texture_tamura.as_ref()?, b.texture_tamura.as_ref()?);
    Some(cosine_similarity(
        &[t1.coarseness, t1.contrast, t1.directionality],
        &[t2.coarseness, t2.contrast, t2.directionality],
    ))
}

fn score_gabor(a: &DescriptorBundle, b: &DescriptorBundle) -> Option<f64> {
    Some(cosine_similarity(
        &a.texture_gabor.as_ref()?.responses,
        &b.texture_gabor.as_ref()?.responses,
    ))
}

fn score_lbp(a: &DescriptorBundle, b: &DescriptorBundle) -> Option<f64> {
    Some(histogram_intersection(&a.texture_lbp.as_ref()?.hist, &b.texture_lbp.as_ref()?.hist))
}

fn score_hu(a: &DescriptorBundle, b: &DescriptorBundle) -> Option<f64> {
    Some(inverse_distance_similarity(
        &a.shape_hu.as_ref()?.hu_moments,
        &b.shape_hu.as_ref()?.hu_moments,
    ))
}

fn score_hog(a: &DescriptorBundle, b: &DescriptorBundle) -> Option<f64> {
    Some(cosine_similarity(&a.shape_hog.as_ref()?.hog, &b.shape_hog.as_ref()?.hog))
}

fn score_contour(a: &DescriptorBundle, b: &DescriptorBundle) -> Option<f64> {
    Some(histogram_intersection(
        &a.shape_contour.as_ref()?.orientation_hist,
        &b.shape_contour.as_ref()?.orientation_hist,
    ))
}

/// 聚合多模态相似度：权重加权平均，按实际参与的权重之和归一
///
/// 只有双方都具备的模态参与打分，缺失模态不计入分母。
pub fn compute_similarity(
    query: &DescriptorBundle,
    target: &DescriptorBundle,
    weights: &BTreeMap<Modality, f64>,
) -> f64 {
    let mut total = 0.0;
    let mut total_weight = 0.0;
    for scorer in &SCORERS {
        if let Some(sim) = (scorer.score)(query, target) {
            let weight = weights.get(&scorer.modality).copied().unwrap_or(scorer.default_weight);
            total += sim * weight;
            total_weight += weight;
        }
    }
    if total_weight > 0.0 { total / total_weight } else { 0.0 }
}

/// 2D 搜索参数
#[derive(Debug, Clone)]
pub struct SearchParams {
    pub top_k: usize,
    /// 模态权重覆盖，未覆盖的模态沿用默认权重
    pub weights: BTreeMap<Modality, f64>,
    /// 排除的图片 id（通常为查询自身所在图片）
    pub exclude_image_id: Option<String>,
    /// 只比较同类目标，推荐开启
    pub same_class_only: bool,
    /// 关闭类别过滤时同类目标的加成权重
    pub class_weight: f64,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            top_k: 10,
            weights: BTreeMap::new(),
            exclude_image_id: None,
            same_class_only: true,
            class_weight: 0.8,
        }
    }
}

/// 一条搜索结果，携带足够的元信息供调用方定位展示用图
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarObject {
    pub image_id: String,
    pub object_id: usize,
    pub object_uid: Option<Uuid>,
    /// 最终得分，含类别加成，取值 [0, 1]
    pub similarity: f64,
    /// 纯视觉相似度，便于排查类别加成的影响
    pub visual_similarity: f64,
    pub class: String,
    pub confidence: f32,
    pub bbox: [f32; 4],
}

/// 在数据库全量候选中搜索与查询目标相似的目标
///
/// 默认按类别过滤（大小写不敏感）；关闭过滤时按 `class_weight`
/// 对同类加成、异类打折，最终得分截断到 [0, 1]。
/// 结果按得分降序，同分保持存储遍历顺序。
pub fn find_similar(
    store: &GalleryStore,
    query: &DescriptorBundle,
    query_class: &str,
    params: &SearchParams,
) -> Vec<SimilarObject> {
    let query_class_lower = query_class.to_lowercase();
    let mut results = vec![];

    for (image_id, entry) in store.images() {
        if params.exclude_image_id.as_deref() == Some(image_id.as_str()) {
            continue;
        }

        for (object_id, slot) in entry.features.iter().enumerate() {
            let Some(features) = slot else {
                continue;
            };
            let detection = entry.detections.get(object_id);
            let target_class =
                detection.map(|d| d.class_name.as_str()).unwrap_or(UNKNOWN_CLASS);

            if params.same_class_only && target_class.to_lowercase() != query_class_lower {
                continue;
            }

            let visual = compute_similarity(query, &features.bundle, &params.weights);
            let similarity = if params.same_class_only {
                visual
            } else if target_class.to_lowercase() == query_class_lower {
                visual * (1.0 - params.class_weight) + params.class_weight
            } else {
                visual * (1.0 - params.class_weight)
            };

            results.push(SimilarObject {
                image_id: image_id.clone(),
                object_id,
                object_uid: features.object_uid,
                similarity: similarity.clamp(0.0, 1.0),
                visual_similarity: visual,
                class: target_class.to_string(),
                confidence: detection.map(|d| d.confidence).unwrap_or(0.0),
                bbox: detection.map(|d| d.bbox).unwrap_or([0.0; 4]),
            });
        }
    }

    results.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap());
    results.truncate(params.top_k);
    results
}
