use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::region::{Region, box_mean, convolve_wrap, sobel};
use crate::utils::{mean_std, percentile};

const EPS: f64 = 1e-7;

/// Tamura 纹理特征
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TamuraFeatures {
    pub coarseness: f64,
    pub contrast: f64,
    pub directionality: f64,
}

/// Gabor 滤波响应：4 个方向 x 2 个频率，每个核记录均值与标准差，共 16 维
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaborFeatures {
    pub responses: Vec<f64>,
}

/// 旋转不变 uniform LBP 特征
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LbpFeatures {
    /// 10 bin 归一化直方图
    pub hist: Vec<f64>,
    pub mean: f64,
    pub std: f64,
}

/// 提取 Tamura 特征（粗糙度、对比度、方向性）
pub fn extract_tamura_features(region: &Region) -> TamuraFeatures {
    let gray = region.gray_f64();
    TamuraFeatures {
        coarseness: coarseness(&gray),
        contrast: contrast(&gray),
        directionality: directionality(&gray),
    }
}

/// 粗糙度：多尺度局部均值的最优尺度差分，取全图平均
///
/// 窗口尺寸为 2^k（k < 5），且小于区域短边的一半；区域太小时返回 0。
fn coarseness(gray: &Array2<f64>) -> f64 {
    let (h, w) = gray.dim();
    let limit = h.min(w) / 2;

    let mut avg_windows = vec![];
    for k in 0..5usize {
        let size = 1usize << k;
        if size >= limit {
            break;
        }
        avg_windows.push(box_mean(gray, size));
    }
    if avg_windows.is_empty() {
        return 0.0;
    }

    let mut s_best = Array2::zeros((h, w));
    for (k, avg) in avg_windows.iter().enumerate().take(avg_windows.len() - 1) {
        let shift = 1isize << k;
        for y in 0..h {
            for x in 0..w {
                // 水平与垂直两个方向的周期位移差分，取较大者
                let px = (x as isize - shift).rem_euclid(w as isize) as usize;
                let py = (y as isize - shift).rem_euclid(h as isize) as usize;
                let diff_h = (avg[(y, x)] - avg[(y, px)]).abs();
                let diff_v = (avg[(y, x)] - avg[(py, x)]).abs();
                let diff = diff_h.max(diff_v);
                if diff > s_best[(y, x)] {
                    s_best[(y, x)] = diff;
                }
            }
        }
    }

    s_best.iter().sum::<f64>() / (h * w) as f64
}

/// 对比度：标准差除以归一化峰度的四次方根
fn contrast(gray: &Array2<f64>) -> f64 {
    let values: Vec<f64> = gray.iter().copied().collect();
    let (mean, std) = mean_std(&values);
    let m4 = values.iter().map(|v| (v - mean).powi(4)).sum::<f64>() / values.len() as f64;
    let kurtosis = m4 / (std.powi(4) + EPS);
    std / (kurtosis.powf(0.25) + EPS)
}

/// 方向性：显著梯度像素（模长超过 75 分位数）方向直方图的熵
fn directionality(gray: &Array2<f64>) -> f64 {
    let (gx, gy) = sobel(gray);
    let magnitude: Vec<f64> =
        gx.iter().zip(gy.iter()).map(|(&x, &y)| (x * x + y * y).sqrt()).collect();
    let threshold = percentile(&magnitude, 75.0);

    // 方向取值 (-pi, pi]，16 bin
    let mut hist = [0.0f64; 16];
    let mut any = false;
    for ((&x, &y), &m) in gx.iter().zip(gy.iter()).zip(&magnitude) {
        if m > threshold {
            any = true;
            let angle = y.atan2(x);
            let bin = (((angle + PI) / (2.0 * PI) * 16.0) as usize).min(15);
            hist[bin] += 1.0;
        }
    }
    if !any {
        return 0.0;
    }

    let sum: f64 = hist.iter().sum();
    hist.iter().map(|&c| c / (sum + EPS)).map(|p| -p * (p + EPS).ln()).sum()
}

/// 构造 Gabor 实部核
///
/// sigma 由带宽 1 octave 推出（约 0.5622 / frequency），核半径为 3 sigma。
fn gabor_kernel(frequency: f64, theta: f64) -> Array2<f64> {
    let sigma = (2.0f64.ln() / 2.0).sqrt() / PI * 3.0 / frequency;
    let half = (3.0 * sigma).ceil() as isize;
    let size = (2 * half + 1) as usize;

    let norm = 1.0 / (2.0 * PI * sigma * sigma);
    Array2::from_shape_fn((size, size), |(r, c)| {
        let y = r as isize as f64 - half as f64;
        let x = c as isize as f64 - half as f64;
        let rot_x = x * theta.cos() + y * theta.sin();
        let rot_y = -x * theta.sin() + y * theta.cos();
        let envelope = (-(rot_x * rot_x + rot_y * rot_y) / (2.0 * sigma * sigma)).exp();
        norm * envelope * (2.0 * PI * frequency * rot_x).cos()
    })
}

/// 提取 Gabor 滤波特征：固定 8 核滤波（周期边界），每核取响应的均值与标准差
pub fn extract_gabor_features(region: &Region) -> GaborFeatures {
    let gray = region.gray_f64();

    let mut responses = Vec::with_capacity(16);
    for t in 0..4 {
        let theta = t as f64 / 4.0 * PI;
        for frequency in [0.1, 0.2] {
            let kernel = gabor_kernel(frequency, theta);
            let filtered = convolve_wrap(&gray, &kernel);
            let values: Vec<f64> = filtered.iter().copied().collect();
            let (mean, std) = mean_std(&values);
            responses.push(mean);
            responses.push(std);
        }
    }

    GaborFeatures { responses }
}

/// 把 8 bit 邻域模式映射为旋转不变 uniform 编码
///
/// 0/1 跳变不超过两次的模式编码为其中 1 的个数（0..=8），其余统一编码为 9。
fn uniform_code(pattern: u8) -> u8 {
    let transitions = (pattern ^ pattern.rotate_right(1)).count_ones();
    if transitions <= 2 { pattern.count_ones() as u8 } else { 9 }
}

/// 提取 LBP 特征：半径 1、8 采样点的旋转不变 uniform 模式
///
/// 对角采样点不在像素格点上，用双线性插值取值；只统计内部像素，
/// 区域不足 3x3 时返回全零直方图。
pub fn extract_lbp_features(region: &Region) -> LbpFeatures {
    let gray = region.gray_f64();
    let (h, w) = gray.dim();
    if h < 3 || w < 3 {
        return LbpFeatures { hist: vec![0.0; 10], mean: 0.0, std: 0.0 };
    }

    // 8 个采样点的 (dy, dx) 偏移，从正右方起逆时针
    const D: f64 = std::f64::consts::FRAC_1_SQRT_2;
    let offsets: [(f64, f64); 8] = [
        (0.0, 1.0),
        (-D, D),
        (-1.0, 0.0),
        (-D, -D),
        (0.0, -1.0),
        (D, -D),
        (1.0, 0.0),
        (D, D),
    ];

    let bilinear = |y: f64, x: f64| -> f64 {
        let y0 = y.floor();
        let x0 = x.floor();
        let fy = y - y0;
        let fx = x - x0;
        let (y0, x0) = (y0 as usize, x0 as usize);
        let y1 = (y0 + 1).min(h - 1);
        let x1 = (x0 + 1).min(w - 1);
        gray[(y0, x0)] * (1.0 - fy) * (1.0 - fx)
            + gray[(y0, x1)] * (1.0 - fy) * fx
            + gray[(y1, x0)] * fy * (1.0 - fx)
            + gray[(y1, x1)] * fy * fx
    };

    let mut codes = Vec::with_capacity((h - 2) * (w - 2));
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let center = gray[(y, x)];
            let mut pattern = 0u8;
            for (i, &(dy, dx)) in offsets.iter().enumerate() {
                if bilinear(y as f64 + dy, x as f64 + dx) >= center {
                    pattern |= 1 << i;
                }
            }
            codes.push(uniform_code(pattern) as f64);
        }
    }

    let mut hist = vec![0.0f64; 10];
    for &code in &codes {
        hist[code as usize] += 1.0;
    }
    let sum: f64 = hist.iter().sum();
    for v in hist.iter_mut() {
        *v /= sum + EPS;
    }

    let (mean, std) = mean_std(&codes);
    LbpFeatures { hist, mean, std }
}
