use std::path::{Path, PathBuf};

use clap::Parser;
use log::info;

use crate::cli::{SubCommandExtend, open_gallery};
use crate::config::Opts;
use crate::detect::{Detector, ExportedDetector};

#[derive(Parser, Debug, Clone)]
pub struct DetectCommand {
    /// 图片路径，同时作为数据库中的图片 id
    pub image: String,
    /// 外部检测器导出的检测结果（JSON 文件）
    pub detections: PathBuf,
}

impl SubCommandExtend for DetectCommand {
    fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let detector = ExportedDetector::new(&self.detections);
        let detections = detector.detect(Path::new(&self.image))?;
        info!("{} 检测到 {} 个目标", self.image, detections.len());

        let mut store = open_gallery(opts)?;
        store.save_detections(&self.image, detections)?;
        println!("[OK] {}", self.image);
        Ok(())
    }
}
