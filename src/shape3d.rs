use std::f64::consts::PI;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::mesh::Mesh;

/// 7 维全局几何特征向量
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalMeshVector {
    pub volume: f64,
    pub surface_area: f64,
    pub compactness: f64,
    pub aspect_ratio_xy: f64,
    pub aspect_ratio_xz: f64,
    pub moment_inertia_x: f64,
    pub moment_inertia_y: f64,
}

/// 特征各维的名称，顺序与 [`GlobalMeshVector::to_array`] 一致
pub const FEATURE_NAMES: [&str; 7] = [
    "volume",
    "surface_area",
    "compactness",
    "aspect_ratio_xy",
    "aspect_ratio_xz",
    "moment_inertia_x",
    "moment_inertia_y",
];

impl GlobalMeshVector {
    pub fn to_array(&self) -> [f64; 7] {
        [
            self.volume,
            self.surface_area,
            self.compactness,
            self.aspect_ratio_xy,
            self.aspect_ratio_xz,
            self.moment_inertia_x,
            self.moment_inertia_y,
        ]
    }
}

/// 网格的辅助统计信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshInfo {
    pub num_vertices: usize,
    pub num_faces: usize,
    /// 归一化之前的原始包围盒
    pub bounding_box: BoundingBox,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub width: f64,
    pub height: f64,
    pub depth: f64,
}

/// 3D 模型的完整特征：7 维向量加网格统计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshFeatures {
    #[serde(flatten)]
    pub global: GlobalMeshVector,
    pub mesh_info: MeshInfo,
}

/// 从 OBJ 文件提取 3D 几何特征
///
/// 先归一化（平移、主轴对齐、单位球缩放）再测量，保证特征与位姿和尺度无关；
/// mesh_info 中的包围盒取归一化之前的原始尺寸。
pub fn extract_mesh_features(path: &Path) -> anyhow::Result<MeshFeatures> {
    let mesh = Mesh::load_obj(path)?;
    let (raw_w, raw_h, raw_d) = mesh.bounding_box();
    let normalized = mesh.normalized();

    let volume = compute_volume(&normalized);
    let surface_area = compute_surface_area(&normalized);
    let compactness = compute_compactness(volume, surface_area);
    let (aspect_ratio_xy, aspect_ratio_xz) = aspect_ratios(&normalized);
    let (moment_inertia_x, moment_inertia_y) = moments_of_inertia(&normalized);

    Ok(MeshFeatures {
        global: GlobalMeshVector {
            volume,
            surface_area,
            compactness,
            aspect_ratio_xy,
            aspect_ratio_xz,
            moment_inertia_x,
            moment_inertia_y,
        },
        mesh_info: MeshInfo {
            num_vertices: mesh.vertices.len(),
            num_faces: mesh.faces.len(),
            bounding_box: BoundingBox { width: raw_w, height: raw_h, depth: raw_d },
        },
    })
}

/// 有符号四面体分解求体积
///
/// 对闭合且绕向一致的网格为精确体积；开放网格的结果没有几何意义，
/// 这里不做闭合性校验，与包围盒等特征一样按原样输出。
fn compute_volume(mesh: &Mesh) -> f64 {
    let mut volume = 0.0;
    for face in &mesh.faces {
        let v1 = &mesh.vertices[face[0]];
        let v2 = &mesh.vertices[face[1]];
        let v3 = &mesh.vertices[face[2]];
        volume += v1.dot(&v2.cross(v3));
    }
    volume.abs() / 6.0
}

/// 三角形面积求和：每面两条边叉积模长的一半
fn compute_surface_area(mesh: &Mesh) -> f64 {
    let mut area = 0.0;
    for face in &mesh.faces {
        let v1 = &mesh.vertices[face[0]];
        let v2 = &mesh.vertices[face[1]];
        let v3 = &mesh.vertices[face[2]];
        area += (v2 - v1).cross(&(v3 - v1)).norm() / 2.0;
    }
    area
}

/// 紧凑度 A^3 / (36 pi V^2)，标准球为 1，零体积时取 0
fn compute_compactness(volume: f64, surface_area: f64) -> f64 {
    if volume > 0.0 { surface_area.powi(3) / (36.0 * PI * volume * volume) } else { 0.0 }
}

/// 包围盒长宽比 (width/height, width/depth)，分母接近零时取 1
fn aspect_ratios(mesh: &Mesh) -> (f64, f64) {
    let (width, height, depth) = mesh.bounding_box();
    let xy = if height > 1e-6 { width / height } else { 1.0 };
    let xz = if depth > 1e-6 { width / depth } else { 1.0 };
    (xy, xz)
}

/// 绕 x、y 轴的转动惯量，按顶点数归一
fn moments_of_inertia(mesh: &Mesh) -> (f64, f64) {
    let n = mesh.vertices.len() as f64;
    let mut ix = 0.0;
    let mut iy = 0.0;
    for v in &mesh.vertices {
        ix += v.y * v.y + v.z * v.z;
        iy += v.x * v.x + v.z * v.z;
    }
    (ix / n, iy / n)
}
