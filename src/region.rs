use image::{GrayImage, RgbImage, imageops};
use ndarray::Array2;

/// 图片中的一个矩形目标区域
///
/// 从检测框裁剪而来，持有像素数据的独立拷贝，生命周期与原图无关。
pub struct Region {
    image: RgbImage,
}

impl Region {
    /// 按检测框裁剪目标区域
    ///
    /// 检测框坐标为浮点像素坐标，会被截断并收缩到图片边界内。
    /// 裁剪结果面积为零时返回 `None`，调用方应跳过该目标而不是报错。
    pub fn from_bbox(image: &RgbImage, bbox: [f32; 4]) -> Option<Self> {
        let (x, y, w, h) = clamp_bbox(image.dimensions(), bbox)?;
        let image = imageops::crop_imm(image, x, y, w, h).to_image();
        Some(Self { image })
    }

    pub fn from_image(image: RgbImage) -> Self {
        Self { image }
    }

    pub fn rgb(&self) -> &RgbImage {
        &self.image
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// 灰度图
    pub fn gray(&self) -> GrayImage {
        imageops::grayscale(&self.image)
    }

    /// f64 灰度矩阵，行优先 (h, w)，取值范围 0..=255
    pub fn gray_f64(&self) -> Array2<f64> {
        let gray = self.gray();
        let (w, h) = gray.dimensions();
        Array2::from_shape_fn((h as usize, w as usize), |(y, x)| {
            gray.get_pixel(x as u32, y as u32)[0] as f64
        })
    }
}

/// 将浮点检测框截断并收缩到图片边界内，返回 `(x, y, w, h)`
///
/// 面积为零时返回 `None`。
pub fn clamp_bbox((w, h): (u32, u32), bbox: [f32; 4]) -> Option<(u32, u32, u32, u32)> {
    let x1 = (bbox[0].max(0.0) as u32).min(w);
    let y1 = (bbox[1].max(0.0) as u32).min(h);
    let x2 = (bbox[2].max(0.0) as u32).min(w);
    let y2 = (bbox[3].max(0.0) as u32).min(h);
    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    Some((x1, y1, x2 - x1, y2 - y1))
}

/// RGB 转 HSV，采用 OpenCV 的 8 位量化：H 取值 0..180，S/V 取值 0..=255
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (rf, gf, bf) = (r as f64 / 255.0, g as f64 / 255.0, b as f64 / 255.0);
    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let delta = max - min;

    let v = max;
    let s = if max > 0.0 { delta / max } else { 0.0 };
    let h = if delta == 0.0 {
        0.0
    } else if max == rf {
        60.0 * ((gf - bf) / delta)
    } else if max == gf {
        60.0 * ((bf - rf) / delta) + 120.0
    } else {
        60.0 * ((rf - gf) / delta) + 240.0
    };
    let h = if h < 0.0 { h + 360.0 } else { h };

    (((h / 2.0).round() as u32).min(179) as u8, (s * 255.0).round() as u8, (v * 255.0).round() as u8)
}

/// 3x3 Sobel 梯度，边界采用镜像（不含边缘像素本身，即 reflect-101）
pub fn sobel(gray: &Array2<f64>) -> (Array2<f64>, Array2<f64>) {
    let (h, w) = gray.dim();
    let mut gx = Array2::zeros((h, w));
    let mut gy = Array2::zeros((h, w));
    if h < 2 || w < 2 {
        return (gx, gy);
    }

    let refl = |i: isize, n: usize| -> usize {
        let n = n as isize;
        let i = if i < 0 { -i } else if i >= n { 2 * n - 2 - i } else { i };
        i as usize
    };

    const KX: [[f64; 3]; 3] = [[-1., 0., 1.], [-2., 0., 2.], [-1., 0., 1.]];
    const KY: [[f64; 3]; 3] = [[-1., -2., -1.], [0., 0., 0.], [1., 2., 1.]];

    for y in 0..h {
        for x in 0..w {
            let (mut sx, mut sy) = (0.0, 0.0);
            for dy in 0..3 {
                for dx in 0..3 {
                    let py = refl(y as isize + dy as isize - 1, h);
                    let px = refl(x as isize + dx as isize - 1, w);
                    let v = gray[(py, px)];
                    sx += v * KX[dy][dx];
                    sy += v * KY[dy][dx];
                }
            }
            gx[(y, x)] = sx;
            gy[(y, x)] = sy;
        }
    }
    (gx, gy)
}

/// size x size 的滑动窗口均值，边界按复制填充
///
/// 通过积分图实现，整体复杂度与窗口大小无关。
pub fn box_mean(gray: &Array2<f64>, size: usize) -> Array2<f64> {
    let (h, w) = gray.dim();
    if size <= 1 {
        return gray.clone();
    }

    // 积分图，ii[(y+1, x+1)] 为左上角 (0,0) 到 (y,x) 的和
    let mut ii: Array2<f64> = Array2::zeros((h + 1, w + 1));
    for y in 0..h {
        for x in 0..w {
            ii[(y + 1, x + 1)] = gray[(y, x)] + ii[(y, x + 1)] + ii[(y + 1, x)] - ii[(y, x)];
        }
    }

    let half = size / 2;
    let area = |y1: usize, x1: usize, y2: usize, x2: usize| -> f64 {
        ii[(y2, x2)] - ii[(y1, x2)] - ii[(y2, x1)] + ii[(y1, x1)]
    };

    Array2::from_shape_fn((h, w), |(y, x)| {
        let y1 = y.saturating_sub(half);
        let x1 = x.saturating_sub(half);
        let y2 = (y1 + size).min(h);
        let x2 = (x1 + size).min(w);
        let y1 = y2.saturating_sub(size);
        let x1 = x2.saturating_sub(size);
        area(y1, x1, y2, x2) / ((y2 - y1) * (x2 - x1)) as f64
    })
}

/// 周期边界（wrap-around）的二维相关运算
///
/// 本 crate 中只用于 Gabor 滤波，其实部核为中心对称，相关与卷积等价。
pub fn convolve_wrap(gray: &Array2<f64>, kernel: &Array2<f64>) -> Array2<f64> {
    let (h, w) = gray.dim();
    let (kh, kw) = kernel.dim();
    let (cy, cx) = (kh as isize / 2, kw as isize / 2);

    Array2::from_shape_fn((h, w), |(y, x)| {
        let mut acc = 0.0;
        for ky in 0..kh {
            for kx in 0..kw {
                let py = (y as isize + ky as isize - cy).rem_euclid(h as isize) as usize;
                let px = (x as isize + kx as isize - cx).rem_euclid(w as isize) as usize;
                acc += gray[(py, px)] * kernel[(ky, kx)];
            }
        }
        acc
    })
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;

    fn solid_image(w: u32, h: u32, color: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb(color))
    }

    #[test]
    fn test_from_bbox_clamped() {
        let img = solid_image(100, 50, [10, 20, 30]);
        let region = Region::from_bbox(&img, [-5.0, -5.0, 20.0, 20.0]).unwrap();
        assert_eq!(region.dimensions(), (20, 20));

        // 超出边界的部分被收缩
        let region = Region::from_bbox(&img, [90.0, 40.0, 200.0, 200.0]).unwrap();
        assert_eq!(region.dimensions(), (10, 10));
    }

    #[test]
    fn test_from_bbox_degenerate() {
        let img = solid_image(100, 50, [0, 0, 0]);
        assert!(Region::from_bbox(&img, [10.0, 10.0, 10.0, 20.0]).is_none());
        assert!(Region::from_bbox(&img, [30.0, 20.0, 10.0, 40.0]).is_none());
        assert!(Region::from_bbox(&img, [150.0, 10.0, 160.0, 20.0]).is_none());
    }

    #[test]
    fn test_rgb_to_hsv() {
        assert_eq!(rgb_to_hsv(255, 0, 0), (0, 255, 255));
        assert_eq!(rgb_to_hsv(0, 255, 0), (60, 255, 255));
        assert_eq!(rgb_to_hsv(0, 0, 255), (120, 255, 255));
        assert_eq!(rgb_to_hsv(0, 255, 255), (90, 255, 255));
        assert_eq!(rgb_to_hsv(0, 0, 0), (0, 0, 0));
        assert_eq!(rgb_to_hsv(255, 255, 255), (0, 0, 255));
    }

    #[test]
    fn test_box_mean_constant() {
        let gray = Array2::from_elem((8, 8), 5.0);
        let avg = box_mean(&gray, 4);
        for v in avg.iter() {
            assert!((v - 5.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_sobel_flat_is_zero() {
        let gray = Array2::from_elem((6, 6), 100.0);
        let (gx, gy) = sobel(&gray);
        assert!(gx.iter().all(|&v| v == 0.0));
        assert!(gy.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_sobel_vertical_edge() {
        // 左半 0 右半 255，水平方向梯度显著
        let gray = Array2::from_shape_fn((6, 6), |(_, x)| if x < 3 { 0.0 } else { 255.0 });
        let (gx, gy) = sobel(&gray);
        assert!(gx[(3, 3)].abs() > 0.0);
        assert_eq!(gy[(3, 3)], 0.0);
    }
}
