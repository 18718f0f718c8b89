use anyhow::anyhow;
use image::imageops::{self, FilterType};
use imageproc::contours::{Contour, find_contours};
use imageproc::contrast::{ThresholdType, otsu_level, threshold};
use imageproc::edges::canny;
use imageproc::hog::{HogOptions, hog};
use imageproc::point::Point;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::region::Region;

const EPS: f64 = 1e-7;
/// Hu 矩对数变换的防零偏移
const HU_LOG_EPS: f64 = 1e-10;
/// HOG 提取前的固定画布尺寸（宽 x 高）
const HOG_CANVAS: (u32, u32) = (32, 64);

/// Hu 不变矩，经符号对数变换
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HuMoments {
    pub hu_moments: Vec<f64>,
}

impl HuMoments {
    pub fn zeros() -> Self {
        Self { hu_moments: vec![0.0; 7] }
    }
}

/// 固定画布上的 HOG 描述子，长度 108
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HogFeatures {
    pub hog: Vec<f64>,
}

/// 轮廓方向直方图
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContourFeatures {
    /// 18 bin 归一化方向直方图，方向折叠到 [0, pi)
    pub orientation_hist: Vec<f64>,
    /// 主方向，单位为度（bin 下标 x 10）
    pub main_orientation: f64,
    /// 折叠方向的圆方差
    pub orientation_variance: f64,
}

impl ContourFeatures {
    pub fn zeros() -> Self {
        Self { orientation_hist: vec![0.0; 18], main_orientation: 0.0, orientation_variance: 0.0 }
    }
}

/// 多边形的 shoelace 面积（绝对值）
fn contour_area(points: &[Point<i32>]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let mut acc = 0.0;
    for i in 0..n {
        let p = points[i];
        let q = points[(i + 1) % n];
        acc += p.x as f64 * q.y as f64 - q.x as f64 * p.y as f64;
    }
    acc.abs() / 2.0
}

/// 取面积最大的外轮廓
fn largest_outer_contour(contours: &[Contour<i32>]) -> Option<&Contour<i32>> {
    contours
        .iter()
        .filter(|c| c.parent.is_none())
        .max_by(|a, b| contour_area(&a.points).partial_cmp(&contour_area(&b.points)).unwrap())
}

/// 提取 Hu 不变矩
///
/// 灰度图经 Otsu 二值化后取最大外轮廓，由 Green 公式算多边形矩，
/// 再做 `-sign(h) * log10(|h| + 1e-10)` 变换改善数值尺度。
/// 找不到轮廓时返回 7 维零向量。
pub fn extract_hu_moments(region: &Region) -> HuMoments {
    let gray = region.gray();
    let level = otsu_level(&gray);
    let binary = threshold(&gray, level, ThresholdType::Binary);

    let contours = find_contours::<i32>(&binary);
    let Some(contour) = largest_outer_contour(&contours) else {
        return HuMoments::zeros();
    };

    let Some(hu) = polygon_hu_moments(&contour.points) else {
        return HuMoments::zeros();
    };

    let hu_moments =
        hu.iter().map(|&h| -h.signum() * (h.abs() + HU_LOG_EPS).log10()).collect();
    HuMoments { hu_moments }
}

/// 由闭合多边形的 Green 公式矩计算 7 个 Hu 不变矩
///
/// 面积退化（共线轮廓）时返回 `None`。
fn polygon_hu_moments(points: &[Point<i32>]) -> Option<[f64; 7]> {
    let n = points.len();
    if n < 3 {
        return None;
    }

    let (mut m00, mut m10, mut m01) = (0.0, 0.0, 0.0);
    let (mut m20, mut m11, mut m02) = (0.0, 0.0, 0.0);
    let (mut m30, mut m21, mut m12, mut m03) = (0.0, 0.0, 0.0, 0.0);

    for i in 0..n {
        let p = points[i];
        let q = points[(i + 1) % n];
        let (x0, y0) = (p.x as f64, p.y as f64);
        let (x1, y1) = (q.x as f64, q.y as f64);
        let a = x0 * y1 - x1 * y0;

        m00 += a;
        m10 += a * (x0 + x1);
        m01 += a * (y0 + y1);
        m20 += a * (x0 * x0 + x0 * x1 + x1 * x1);
        m11 += a * (2.0 * x0 * y0 + x0 * y1 + x1 * y0 + 2.0 * x1 * y1);
        m02 += a * (y0 * y0 + y0 * y1 + y1 * y1);
        m30 += a * (x0 * x0 * x0 + x0 * x0 * x1 + x0 * x1 * x1 + x1 * x1 * x1);
        m21 += a
            * (x0 * x0 * (3.0 * y0 + y1)
                + 2.0 * x0 * x1 * (y0 + y1)
                + x1 * x1 * (y0 + 3.0 * y1));
        m12 += a
            * (y0 * y0 * (3.0 * x0 + x1)
                + 2.0 * y0 * y1 * (x0 + x1)
                + y1 * y1 * (x0 + 3.0 * x1));
        m03 += a * (y0 * y0 * y0 + y0 * y0 * y1 + y0 * y1 * y1 + y1 * y1 * y1);
    }

    let mut m00 = m00 / 2.0;
    let mut m10 = m10 / 6.0;
    let mut m01 = m01 / 6.0;
    let mut m20 = m20 / 12.0;
    let mut m11 = m11 / 24.0;
    let mut m02 = m02 / 12.0;
    let mut m30 = m30 / 20.0;
    let mut m21 = m21 / 60.0;
    let mut m12 = m12 / 60.0;
    let mut m03 = m03 / 20.0;

    // 顶点顺序决定符号，统一为正面积
    if m00 < 0.0 {
        for m in [
            &mut m00, &mut m10, &mut m01, &mut m20, &mut m11, &mut m02, &mut m30, &mut m21,
            &mut m12, &mut m03,
        ] {
            *m = -*m;
        }
    }
    if m00.abs() < 1e-12 {
        return None;
    }

    let cx = m10 / m00;
    let cy = m01 / m00;

    // 中心矩
    let mu20 = m20 - cx * m10;
    let mu11 = m11 - cx * m01;
    let mu02 = m02 - cy * m01;
    let mu30 = m30 - 3.0 * cx * m20 + 2.0 * cx * cx * m10;
    let mu21 = m21 - 2.0 * cx * m11 - cy * m20 + 2.0 * cx * cx * m01;
    let mu12 = m12 - 2.0 * cy * m11 - cx * m02 + 2.0 * cy * cy * m10;
    let mu03 = m03 - 3.0 * cy * m02 + 2.0 * cy * cy * m01;

    // 归一化中心矩
    let s2 = m00 * m00;
    let s3 = m00.powf(2.5);
    let n20 = mu20 / s2;
    let n11 = mu11 / s2;
    let n02 = mu02 / s2;
    let n30 = mu30 / s3;
    let n21 = mu21 / s3;
    let n12 = mu12 / s3;
    let n03 = mu03 / s3;

    let t0 = n30 + n12;
    let t1 = n21 + n03;
    let q0 = n30 - 3.0 * n12;
    let q1 = 3.0 * n21 - n03;

    Some([
        n20 + n02,
        (n20 - n02).powi(2) + 4.0 * n11 * n11,
        q0 * q0 + q1 * q1,
        t0 * t0 + t1 * t1,
        q0 * t0 * (t0 * t0 - 3.0 * t1 * t1) + q1 * t1 * (3.0 * t0 * t0 - t1 * t1),
        (n20 - n02) * (t0 * t0 - t1 * t1) + 4.0 * n11 * t0 * t1,
        q1 * t0 * (t0 * t0 - 3.0 * t1 * t1) - q0 * t1 * (3.0 * t0 * t0 - t1 * t1),
    ])
}

/// 提取 HOG 特征
///
/// 灰度图先缩放到 32x64 固定画布，9 方向、16x16 cell、2x2 block、
/// 步长 1 cell，输出长度恒为 108。
pub fn extract_hog_features(region: &Region) -> anyhow::Result<HogFeatures> {
    let gray = region.gray();
    let resized = imageops::resize(&gray, HOG_CANVAS.0, HOG_CANVAS.1, FilterType::Triangle);

    let options = HogOptions::new(9, false, 16, 2, 1);
    let descriptor = hog(&resized, options).map_err(|e| anyhow!("HOG 提取失败: {}", e))?;

    Ok(HogFeatures { hog: descriptor.into_iter().map(|v| v as f64).collect() })
}

/// 提取轮廓方向直方图
///
/// Canny 提边后取最大外轮廓，统计相邻轮廓点连线的方向，折叠到 [0, pi)
/// 后做 18 bin 直方图。轮廓不足 3 个点时返回全零特征。
pub fn extract_contour_features(region: &Region) -> ContourFeatures {
    let gray = region.gray();
    let edges = canny(&gray, 50.0, 150.0);

    let contours = find_contours::<i32>(&edges);
    let Some(contour) = largest_outer_contour(&contours) else {
        return ContourFeatures::zeros();
    };
    let points = &contour.points;
    if points.len() < 3 {
        return ContourFeatures::zeros();
    }

    // 相邻点连线的方向，首尾相接，重合点跳过
    let mut angles = vec![];
    for i in 0..points.len() {
        let p = points[i];
        let q = points[(i + 1) % points.len()];
        let dx = (q.x - p.x) as f64;
        let dy = (q.y - p.y) as f64;
        if dx != 0.0 || dy != 0.0 {
            angles.push(dy.atan2(dx));
        }
    }
    if angles.is_empty() {
        return ContourFeatures::zeros();
    }

    // 方向不区分正反，折叠到 [0, pi)
    let folded: Vec<f64> = angles.iter().map(|a| (a + PI).rem_euclid(PI)).collect();

    let mut hist = vec![0.0f64; 18];
    for &a in &folded {
        let bin = ((a / PI * 18.0) as usize).min(17);
        hist[bin] += 1.0;
    }
    let sum: f64 = hist.iter().sum();
    for v in hist.iter_mut() {
        *v /= sum + EPS;
    }

    let main_bin = hist
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap())
        .map(|(i, _)| i)
        .unwrap_or(0);

    ContourFeatures {
        orientation_hist: hist,
        main_orientation: (main_bin * 10) as f64,
        orientation_variance: circular_variance(&folded),
    }
}

/// 周期为 pi 的方向数据的圆方差，取值 [0, 1]
fn circular_variance(folded: &[f64]) -> f64 {
    let n = folded.len() as f64;
    let (mut c, mut s) = (0.0, 0.0);
    for &a in folded {
        c += (2.0 * a).cos();
        s += (2.0 * a).sin();
    }
    1.0 - (c * c + s * s).sqrt() / n
}
