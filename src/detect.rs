use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 外部检测器报告的单个目标
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// 像素坐标的检测框 [x1, y1, x2, y2]
    pub bbox: [f32; 4],
    #[serde(rename = "class")]
    pub class_name: String,
    pub confidence: f32,
    pub class_id: i64,
    /// 目标的稳定标识，导入时自动补齐
    #[serde(default)]
    pub uid: Option<Uuid>,
}

impl Detection {
    /// 确保目标带有稳定标识，特征记录通过它与检测记录关联
    pub fn ensure_uid(&mut self) {
        if self.uid.is_none() {
            self.uid = Some(Uuid::new_v4());
        }
    }
}

/// 目标检测器的接口
///
/// 检测本身由外部模型完成，这里只约定输出：按顺序排列的检测框、
/// 类别与置信度。
pub trait Detector {
    fn detect(&self, image: &Path) -> anyhow::Result<Vec<Detection>>;
}

/// 从外部检测器导出的 JSON 文件读取检测结果
///
/// 文件为 `Detection` 数组；`uid` 字段缺失时在导入阶段生成。
pub struct ExportedDetector {
    path: PathBuf,
}

impl ExportedDetector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Detector for ExportedDetector {
    fn detect(&self, _image: &Path) -> anyhow::Result<Vec<Detection>> {
        let file = File::open(&self.path)
            .with_context(|| format!("无法打开检测结果文件 {:?}", self.path))?;
        let mut detections: Vec<Detection> = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("检测结果文件 {:?} 格式错误", self.path))?;
        for det in detections.iter_mut() {
            det.ensure_uid();
        }
        Ok(detections)
    }
}
