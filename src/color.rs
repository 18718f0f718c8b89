use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::kmeans::kmeans_rgb;
use crate::region::{Region, rgb_to_hsv};

/// 直方图归一化时的除零保护
const EPS: f64 = 1e-7;
/// 主色聚类使用的最大像素采样数
const MAX_CLUSTER_PIXELS: usize = 5000;
/// 主色聚类的随机种子，固定以保证重复提取结果一致
const CLUSTER_SEED: u64 = 42;

/// 单个主色
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DominantColor {
    pub rgb: [u8; 3],
    pub hex: String,
    /// 占比，百分数，保留两位小数
    pub percentage: f64,
}

/// 主色提取结果
///
/// 聚类退化（如单像素区域）时回退为均值色，两种情况用显式的变体区分，
/// 调用方无需依赖异常路径即可知道是否发生了回退。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DominantColors {
    /// 正常聚类得到的主色，按占比降序
    Clustered(Vec<DominantColor>),
    /// 退化输入，回退为 100% 占比的均值色
    MeanFallback(DominantColor),
}

impl DominantColors {
    pub fn colors(&self) -> Vec<&DominantColor> {
        match self {
            Self::Clustered(colors) => colors.iter().collect(),
            Self::MeanFallback(color) => vec![color],
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::MeanFallback(_))
    }
}

/// 颜色特征
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorFeatures {
    /// R/G/B 三通道 16 bin 直方图的拼接，长度 48
    pub hist_rgb: Vec<f64>,
    /// H/S/V 三通道 16 bin 直方图的拼接，长度 48
    pub hist_hsv: Vec<f64>,
    pub mean_rgb: [f64; 3],
    pub std_rgb: [f64; 3],
    pub dominant_colors: DominantColors,
}

impl ColorFeatures {
    /// 区域内没有任何可用像素时的全零特征
    pub fn zeros() -> Self {
        Self {
            hist_rgb: vec![0.0; 48],
            hist_hsv: vec![0.0; 48],
            mean_rgb: [0.0; 3],
            std_rgb: [0.0; 3],
            dominant_colors: DominantColors::Clustered(vec![]),
        }
    }
}

/// 提取颜色特征
///
/// `mask` 为可选的外部分割掩码（与区域同尺寸，零值为背景）。
/// 提供掩码时背景像素不参与任何统计；区域被完全掩掉时返回全零特征。
pub fn extract_color_features(region: &Region, mask: Option<&GrayImage>) -> ColorFeatures {
    let rgb = region.rgb();
    let (w, h) = rgb.dimensions();

    let mut pixels: Vec<[u8; 3]> = Vec::with_capacity((w * h) as usize);
    for y in 0..h {
        for x in 0..w {
            if let Some(mask) = mask {
                if mask.get_pixel(x, y)[0] == 0 {
                    continue;
                }
            }
            pixels.push(rgb.get_pixel(x, y).0);
        }
    }

    if pixels.is_empty() {
        return ColorFeatures::zeros();
    }

    // 六个 16 bin 直方图
    let mut hist_rgb = vec![0.0f64; 48];
    let mut hist_hsv = vec![0.0f64; 48];
    let mut sum = [0.0f64; 3];
    for &[r, g, b] in &pixels {
        hist_rgb[r as usize / 16] += 1.0;
        hist_rgb[16 + g as usize / 16] += 1.0;
        hist_rgb[32 + b as usize / 16] += 1.0;

        let (hue, s, v) = rgb_to_hsv(r, g, b);
        hist_hsv[(hue as usize * 16 / 180).min(15)] += 1.0;
        hist_hsv[16 + s as usize / 16] += 1.0;
        hist_hsv[32 + v as usize / 16] += 1.0;

        sum[0] += r as f64;
        sum[1] += g as f64;
        sum[2] += b as f64;
    }
    for c in 0..3 {
        normalize_channel(&mut hist_rgb[c * 16..(c + 1) * 16]);
        normalize_channel(&mut hist_hsv[c * 16..(c + 1) * 16]);
    }

    let n = pixels.len() as f64;
    let mean_rgb = [sum[0] / n, sum[1] / n, sum[2] / n];
    let mut var = [0.0f64; 3];
    for &[r, g, b] in &pixels {
        var[0] += (r as f64 - mean_rgb[0]).powi(2);
        var[1] += (g as f64 - mean_rgb[1]).powi(2);
        var[2] += (b as f64 - mean_rgb[2]).powi(2);
    }
    let std_rgb = [(var[0] / n).sqrt(), (var[1] / n).sqrt(), (var[2] / n).sqrt()];

    let dominant_colors = extract_dominant_colors(&pixels, 5, mean_rgb);

    ColorFeatures { hist_rgb, hist_hsv, mean_rgb, std_rgb, dominant_colors }
}

fn normalize_channel(hist: &mut [f64]) {
    let sum: f64 = hist.iter().sum();
    for v in hist.iter_mut() {
        *v /= sum + EPS;
    }
}

fn hex_of(rgb: [u8; 3]) -> String {
    format!("#{:02x}{:02x}{:02x}", rgb[0], rgb[1], rgb[2])
}

/// 用 kmeans 聚类提取主色
///
/// 为控制耗时，超过 5000 像素时做固定种子的无放回采样。
fn extract_dominant_colors(pixels: &[[u8; 3]], n_colors: usize, mean_rgb: [f64; 3]) -> DominantColors {
    let samples: Vec<[f64; 3]> = if pixels.len() > MAX_CLUSTER_PIXELS {
        use rand::SeedableRng;
        let mut rng = rand::rngs::StdRng::seed_from_u64(CLUSTER_SEED);
        rand::seq::index::sample(&mut rng, pixels.len(), MAX_CLUSTER_PIXELS)
            .iter()
            .map(|i| {
                let p = pixels[i];
                [p[0] as f64, p[1] as f64, p[2] as f64]
            })
            .collect()
    } else {
        pixels.iter().map(|p| [p[0] as f64, p[1] as f64, p[2] as f64]).collect()
    };

    let mean_fallback = || {
        let rgb = [mean_rgb[0] as u8, mean_rgb[1] as u8, mean_rgb[2] as u8];
        DominantColors::MeanFallback(DominantColor {
            rgb,
            hex: hex_of(rgb),
            percentage: 100.0,
        })
    };

    // 样本不足以形成多个簇时直接回退为均值色
    if samples.len() < 2 {
        return mean_fallback();
    }

    let Some(result) = kmeans_rgb(&samples, n_colors.min(samples.len()), 100, CLUSTER_SEED) else {
        return mean_fallback();
    };

    let total: usize = result.counts.iter().sum();
    let mut colors: Vec<DominantColor> = result
        .centroids
        .iter()
        .zip(&result.counts)
        .filter(|&(_, &count)| count > 0)
        .map(|(c, &count)| {
            let rgb = [c[0] as u8, c[1] as u8, c[2] as u8];
            let percentage = count as f64 / total as f64 * 100.0;
            DominantColor {
                rgb,
                hex: hex_of(rgb),
                percentage: (percentage * 100.0).round() / 100.0,
            }
        })
        .collect();
    colors.sort_by(|a, b| b.percentage.partial_cmp(&a.percentage).unwrap());

    DominantColors::Clustered(colors)
}
