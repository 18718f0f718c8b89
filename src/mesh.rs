use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, bail};
use nalgebra::{Matrix3, Vector3};

/// 三角网格，顶点加三角面片
///
/// 四边形面在解析时沿对角线拆成两个三角形。
#[derive(Debug, Clone)]
pub struct Mesh {
    pub vertices: Vec<Vector3<f64>>,
    pub faces: Vec<[usize; 3]>,
}

impl Mesh {
    /// 从 OBJ 文件加载网格
    ///
    /// 只识别 `v` 与 `f` 记录；面片索引为 1 起始，`/vt/vn` 后缀忽略。
    /// 没有任何顶点或索引越界视为输入错误。
    pub fn load_obj(path: &Path) -> anyhow::Result<Self> {
        let file = File::open(path).with_context(|| format!("无法打开模型文件 {:?}", path))?;

        let mut vertices = vec![];
        let mut faces: Vec<[usize; 3]> = vec![];

        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            let parts: Vec<&str> = line.split_whitespace().collect();
            match parts.first() {
                Some(&"v") => {
                    if parts.len() < 4 {
                        bail!("{:?}:{} 顶点记录字段不足", path, lineno + 1);
                    }
                    let x: f64 = parts[1].parse()?;
                    let y: f64 = parts[2].parse()?;
                    let z: f64 = parts[3].parse()?;
                    vertices.push(Vector3::new(x, y, z));
                }
                Some(&"f") => {
                    let indices = parts[1..]
                        .iter()
                        .map(|p| parse_face_index(p, lineno + 1))
                        .collect::<anyhow::Result<Vec<usize>>>()?;
                    match indices.len() {
                        3 => faces.push([indices[0], indices[1], indices[2]]),
                        4 => {
                            faces.push([indices[0], indices[1], indices[2]]);
                            faces.push([indices[0], indices[2], indices[3]]);
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }

        if vertices.is_empty() {
            bail!("模型文件 {:?} 中没有顶点", path);
        }
        for face in &faces {
            if face.iter().any(|&i| i >= vertices.len()) {
                bail!("模型文件 {:?} 的面片索引越界", path);
            }
        }

        Ok(Self { vertices, faces })
    }

    /// 顶点重心
    pub fn centroid(&self) -> Vector3<f64> {
        self.vertices.iter().sum::<Vector3<f64>>() / self.vertices.len() as f64
    }

    /// 归一化网格，使特征与位姿和尺度无关
    ///
    /// 平移到重心，顶点数不少于 4 时按主轴对齐（保持右手系），
    /// 再缩放到单位球内。全部顶点重合时跳过缩放。
    pub fn normalized(&self) -> Mesh {
        let centroid = self.centroid();
        let mut vertices: Vec<Vector3<f64>> = self.vertices.iter().map(|v| v - centroid).collect();

        if vertices.len() >= 4 {
            let rotation = principal_axes(&vertices);
            for v in vertices.iter_mut() {
                *v = rotation.transpose() * *v;
            }
        }

        let max_dist = vertices.iter().map(|v| v.norm()).fold(0.0, f64::max);
        if max_dist > 0.0 {
            for v in vertices.iter_mut() {
                *v /= max_dist;
            }
        }

        Mesh { vertices, faces: self.faces.clone() }
    }

    /// 轴对齐包围盒的三边长 (width, height, depth)
    pub fn bounding_box(&self) -> (f64, f64, f64) {
        let mut min = Vector3::repeat(f64::INFINITY);
        let mut max = Vector3::repeat(f64::NEG_INFINITY);
        for v in &self.vertices {
            min = min.inf(v);
            max = max.sup(v);
        }
        (max.x - min.x, max.y - min.y, max.z - min.z)
    }
}

/// 主轴旋转矩阵：协方差矩阵的特征向量按特征值降序排列，行列式为负时翻转末轴
fn principal_axes(centered: &[Vector3<f64>]) -> Matrix3<f64> {
    let n = centered.len() as f64;
    let mut cov = Matrix3::zeros();
    for v in centered {
        cov += v * v.transpose();
    }
    cov /= n - 1.0;

    let eigen = cov.symmetric_eigen();
    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| eigen.eigenvalues[b].partial_cmp(&eigen.eigenvalues[a]).unwrap());

    let mut axes = Matrix3::from_columns(&[
        eigen.eigenvectors.column(order[0]).into_owned(),
        eigen.eigenvectors.column(order[1]).into_owned(),
        eigen.eigenvectors.column(order[2]).into_owned(),
    ]);
    if axes.determinant() < 0.0 {
        let flipped = -axes.column(2);
        axes.set_column(2, &flipped);
    }
    axes
}

fn parse_face_index(token: &str, lineno: usize) -> anyhow::Result<usize> {
    let first = token.split('/').next().unwrap_or(token);
    let idx: i64 = first.parse().with_context(|| format!("第 {} 行面片索引无效", lineno))?;
    if idx < 1 {
        bail!("第 {} 行面片索引必须为正数: {}", lineno, idx);
    }
    Ok(idx as usize - 1)
}
