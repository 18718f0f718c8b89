use anyhow::anyhow;
use clap::Parser;

use crate::cli::{SubCommandExtend, open_gallery};
use crate::config::Opts;

#[derive(Parser, Debug, Clone)]
pub struct ShowCommand {
    /// 图片路径（图片 id）
    pub image: String,
}

impl SubCommandExtend for ShowCommand {
    fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let store = open_gallery(opts)?;
        let entry = store
            .get_entry(&self.image)
            .ok_or_else(|| anyhow!("图片 {} 不在数据库中", self.image))?;

        println!("{}: {} 个目标", self.image, entry.detections.len());
        for (i, det) in entry.detections.iter().enumerate() {
            let extracted = match entry.features.get(i) {
                Some(Some(_)) => "已提取",
                _ => "未提取",
            };
            let uid = det.uid.map(|u| u.to_string()).unwrap_or_else(|| "-".to_string());
            println!(
                "#{}\t{}\t{:.2}\t[{:.0},{:.0},{:.0},{:.0}]\t{}\t{}",
                i,
                det.class_name,
                det.confidence,
                det.bbox[0],
                det.bbox[1],
                det.bbox[2],
                det.bbox[3],
                extracted,
                uid,
            );
        }
        Ok(())
    }
}
