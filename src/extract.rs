use std::path::Path;

use anyhow::Context;
use image::{GrayImage, RgbImage, imageops};
use serde::{Deserialize, Serialize};

use crate::color::{ColorFeatures, extract_color_features};
use crate::detect::Detection;
use crate::region::{Region, clamp_bbox};
use crate::shape::{
    ContourFeatures, HogFeatures, HuMoments, extract_contour_features, extract_hog_features,
    extract_hu_moments,
};
use crate::texture::{
    GaborFeatures, LbpFeatures, TamuraFeatures, extract_gabor_features, extract_lbp_features,
    extract_tamura_features,
};

/// 一个目标的多模态描述子
///
/// 本地提取的结果七个模态齐全；从数据库读出的旧记录可能缺少个别模态，
/// 缺失的模态在相似度聚合时被跳过而不是按零分惩罚。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptorBundle {
    #[serde(default)]
    pub color: Option<ColorFeatures>,
    #[serde(default)]
    pub texture_tamura: Option<TamuraFeatures>,
    #[serde(default)]
    pub texture_gabor: Option<GaborFeatures>,
    #[serde(default)]
    pub texture_lbp: Option<LbpFeatures>,
    #[serde(default)]
    pub shape_hu: Option<HuMoments>,
    #[serde(default)]
    pub shape_hog: Option<HogFeatures>,
    #[serde(default)]
    pub shape_contour: Option<ContourFeatures>,
}

impl DescriptorBundle {
    /// 所有模态均为显式零值的束，用于没有可提取内容的退化区域
    pub fn zeros() -> Self {
        Self {
            color: Some(ColorFeatures::zeros()),
            texture_tamura: Some(TamuraFeatures {
                coarseness: 0.0,
                contrast: 0.0,
                directionality: 0.0,
            }),
            texture_gabor: Some(GaborFeatures { responses: vec![0.0; 16] }),
            texture_lbp: Some(LbpFeatures { hist: vec![0.0; 10], mean: 0.0, std: 0.0 }),
            shape_hu: Some(HuMoments::zeros()),
            shape_hog: Some(HogFeatures { hog: vec![0.0; 108] }),
            shape_contour: Some(ContourFeatures::zeros()),
        }
    }
}

/// 读取图片并转为 RGB
pub fn load_image(path: &Path) -> anyhow::Result<RgbImage> {
    let img = image::open(path).with_context(|| format!("无法读取图片 {:?}", path))?;
    Ok(img.to_rgb8())
}

/// 对单个区域提取全部模态的特征
///
/// 分割掩码只影响颜色统计：掩码为零的像素被视作背景排除在外。
pub fn extract_bundle(region: &Region, mask: Option<&GrayImage>) -> anyhow::Result<DescriptorBundle> {
    Ok(DescriptorBundle {
        color: Some(extract_color_features(region, mask)),
        texture_tamura: Some(extract_tamura_features(region)),
        texture_gabor: Some(extract_gabor_features(region)),
        texture_lbp: Some(extract_lbp_features(region)),
        shape_hu: Some(extract_hu_moments(region)),
        shape_hog: Some(extract_hog_features(region)?),
        shape_contour: Some(extract_contour_features(region)),
    })
}

/// 对一条检测记录提取特征
///
/// 检测框裁剪结果面积为零时返回 `Ok(None)`，调用方保持对应特征槽位为空。
/// `mask` 为整图尺寸的分割掩码，会按同一检测框裁剪后传入。
pub fn extract_object(
    image: &RgbImage,
    detection: &Detection,
    mask: Option<&GrayImage>,
) -> anyhow::Result<Option<DescriptorBundle>> {
    let Some(region) = Region::from_bbox(image, detection.bbox) else {
        return Ok(None);
    };
    let mask = mask.and_then(|m| {
        let (x, y, w, h) = clamp_bbox(m.dimensions(), detection.bbox)?;
        Some(imageops::crop_imm(m, x, y, w, h).to_image())
    });
    Ok(Some(extract_bundle(&region, mask.as_ref())?))
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;

    fn sample_image() -> RgbImage {
        RgbImage::from_fn(64, 64, |x, y| {
            if x > 16 && x < 48 && y > 16 && y < 48 { Rgb([200, 40, 40]) } else { Rgb([20; 3]) }
        })
    }

    fn detection(bbox: [f32; 4]) -> Detection {
        Detection { bbox, class_name: "cat".into(), confidence: 0.9, class_id: 15, uid: None }
    }

    #[test]
    fn test_extract_bundle_complete() {
        let region = Region::from_image(sample_image());
        let bundle = extract_bundle(&region, None).unwrap();

        assert!(bundle.color.is_some());
        assert_eq!(bundle.texture_gabor.unwrap().responses.len(), 16);
        assert_eq!(bundle.texture_lbp.unwrap().hist.len(), 10);
        assert_eq!(bundle.shape_hu.unwrap().hu_moments.len(), 7);
        assert_eq!(bundle.shape_hog.unwrap().hog.len(), 108);
        assert_eq!(bundle.shape_contour.unwrap().orientation_hist.len(), 18);
    }

    #[test]
    fn test_extract_object_degenerate_bbox() {
        let image = sample_image();
        let result = extract_object(&image, &detection([10.0, 10.0, 10.0, 30.0]), None).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_extract_object_idempotent() {
        let image = sample_image();
        let det = detection([8.0, 8.0, 56.0, 56.0]);
        let a = extract_object(&image, &det, None).unwrap().unwrap();
        let b = extract_object(&image, &det, None).unwrap().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_extract_object_mask_changes_color_only() {
        use image::{GrayImage, Luma};

        let image = sample_image();
        let det = detection([8.0, 8.0, 56.0, 56.0]);
        // 掩码只保留中心的红色方块
        let mask = GrayImage::from_fn(64, 64, |x, y| {
            if x > 16 && x < 48 && y > 16 && y < 48 { Luma([255]) } else { Luma([0]) }
        });

        let plain = extract_object(&image, &det, None).unwrap().unwrap();
        let masked = extract_object(&image, &det, Some(&mask)).unwrap().unwrap();

        assert_ne!(plain.color, masked.color);
        let mean = masked.color.unwrap().mean_rgb;
        assert!((mean[0] - 200.0).abs() < 1e-6);
        // 其余模态不受掩码影响
        assert_eq!(plain.texture_lbp, masked.texture_lbp);
        assert_eq!(plain.shape_hog, masked.shape_hog);
    }

    #[test]
    fn test_bundle_deserialize_missing_modalities() {
        // 旧版数据库记录可能没有 LBP 与轮廓模态
        let json = r#"{"color": null, "texture_tamura": {"coarseness": 1.0, "contrast": 2.0, "directionality": 0.5}}"#;
        let bundle: DescriptorBundle = serde_json::from_str(json).unwrap();
        assert!(bundle.color.is_none());
        assert!(bundle.texture_tamura.is_some());
        assert!(bundle.texture_lbp.is_none());
        assert!(bundle.shape_contour.is_none());
    }
}
