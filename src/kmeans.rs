use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index::sample;

/// Lloyd k-means 的聚类结果
#[derive(Debug, Clone)]
pub struct KMeansResult {
    /// 聚类中心，长度为 k
    pub centroids: Vec<[f64; 3]>,
    /// 每个样本所属的中心下标
    pub labels: Vec<usize>,
    /// 每个中心的样本数量
    pub counts: Vec<usize>,
}

fn dist2(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
}

fn nearest(point: &[f64; 3], centroids: &[[f64; 3]]) -> usize {
    let mut best = 0;
    let mut best_d = f64::INFINITY;
    for (i, c) in centroids.iter().enumerate() {
        let d = dist2(point, c);
        if d < best_d {
            best_d = d;
            best = i;
        }
    }
    best
}

/// 对 RGB 像素做 kmeans 聚类，返回聚类结果
///
/// 参数：
/// - pixels: 输入像素
/// - k: 聚类中心数量，超出样本数时自动缩减
/// - max_iter: 最大迭代次数
/// - seed: 随机种子，相同输入与种子保证逐位一致的结果
pub fn kmeans_rgb(
    pixels: &[[f64; 3]],
    k: usize,
    max_iter: usize,
    seed: u64,
) -> Option<KMeansResult> {
    if pixels.is_empty() || k == 0 {
        return None;
    }
    let k = k.min(pixels.len());

    // 随机选取 k 个互不相同的样本作为初始中心
    let mut rng = StdRng::seed_from_u64(seed);
    let mut centroids: Vec<[f64; 3]> =
        sample(&mut rng, pixels.len(), k).iter().map(|i| pixels[i]).collect();

    let mut labels = vec![0usize; pixels.len()];
    for _ in 0..max_iter {
        // 分配阶段
        let mut changed = false;
        for (i, p) in pixels.iter().enumerate() {
            let label = nearest(p, &centroids);
            if label != labels[i] {
                labels[i] = label;
                changed = true;
            }
        }

        // 更新阶段，空簇保留旧的中心
        let mut sums = vec![[0.0f64; 3]; k];
        let mut counts = vec![0usize; k];
        for (p, &label) in pixels.iter().zip(&labels) {
            for c in 0..3 {
                sums[label][c] += p[c];
            }
            counts[label] += 1;
        }
        for i in 0..k {
            if counts[i] > 0 {
                centroids[i] = [
                    sums[i][0] / counts[i] as f64,
                    sums[i][1] / counts[i] as f64,
                    sums[i][2] / counts[i] as f64,
                ];
            }
        }

        if !changed {
            break;
        }
    }

    let mut counts = vec![0usize; k];
    for &label in &labels {
        counts[label] += 1;
    }

    Some(KMeansResult { centroids, labels, counts })
}
