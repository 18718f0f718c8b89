use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use image::GrayImage;
use indicatif::{ParallelProgressIterator, ProgressBar};
use log::warn;
use rayon::prelude::*;

use crate::cli::{SubCommandExtend, open_gallery};
use crate::config::Opts;
use crate::extract::{DescriptorBundle, extract_object, load_image};
use crate::utils::pb_style;

#[derive(Parser, Debug, Clone)]
pub struct ExtractCommand {
    /// 图片路径，需要先通过 detect 登记检测结果
    pub image: String,
    /// 只提取指定下标的目标，缺省时提取全部目标
    #[arg(short, long)]
    pub object: Option<usize>,
    /// 整图尺寸的分割掩码，零值像素按背景处理（只影响颜色统计）
    #[arg(short, long)]
    pub mask: Option<PathBuf>,
}

impl SubCommandExtend for ExtractCommand {
    fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let mut store = open_gallery(opts)?;
        let detections = store
            .get_detections(&self.image)
            .with_context(|| format!("{} 尚未登记检测结果，请先运行 detect", self.image))?
            .to_vec();

        let image = load_image(Path::new(&self.image))?;
        let mask: Option<GrayImage> = match &self.mask {
            Some(path) => {
                let mask = image::open(path)
                    .with_context(|| format!("无法读取掩码 {:?}", path))?
                    .to_luma8();
                anyhow::ensure!(
                    mask.dimensions() == image.dimensions(),
                    "掩码 {:?} 与图片尺寸不一致",
                    path
                );
                Some(mask)
            }
            None => None,
        };

        let targets: Vec<usize> = match self.object {
            Some(object_id) => {
                anyhow::ensure!(object_id < detections.len(), "目标下标 {} 越界", object_id);
                vec![object_id]
            }
            None => (0..detections.len()).collect(),
        };

        // 特征提取逐目标独立，可以并行；数据库写入保持串行
        let pb = ProgressBar::new(targets.len() as u64).with_style(pb_style());
        let bundles: Vec<(usize, Option<DescriptorBundle>)> = targets
            .par_iter()
            .progress_with(pb.clone())
            .map(|&i| extract_object(&image, &detections[i], mask.as_ref()).map(|bundle| (i, bundle)))
            .collect::<Result<_>>()?;
        pb.finish_with_message("特征提取完成");

        for (object_id, bundle) in bundles {
            match bundle {
                Some(bundle) => store.save_features(&self.image, object_id, bundle)?,
                None => warn!("{} 目标 {} 的检测框面积为零，跳过", self.image, object_id),
            }
        }
        println!("[OK] {}", self.image);
        Ok(())
    }
}
