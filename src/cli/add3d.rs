use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::Parser;
use indicatif::{ParallelProgressIterator, ProgressBar};
use rayon::prelude::*;
use walkdir::WalkDir;

use crate::cli::{SubCommandExtend, open_models};
use crate::config::Opts;
use crate::shape3d::{MeshFeatures, extract_mesh_features};
use crate::store::ModelEntry;
use crate::utils::pb_style;

#[derive(Parser, Debug, Clone)]
pub struct Add3dCommand {
    /// OBJ 模型文件，或包含模型的目录
    pub path: PathBuf,
    /// 模型 id，缺省时使用文件名（不含扩展名）；只对单个文件有效
    #[arg(long)]
    pub id: Option<String>,
    /// 附加元数据，格式为 `键=值`，可重复指定
    #[arg(short, long, value_name = "K=V", value_parser = parse_meta)]
    pub meta: Vec<(String, String)>,
}

impl SubCommandExtend for Add3dCommand {
    fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let files: Vec<PathBuf> = if self.path.is_dir() {
            WalkDir::new(&self.path)
                .into_iter()
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.into_path())
                .filter(|p| {
                    p.is_file()
                        && p.extension().map(|e| e.eq_ignore_ascii_case("obj")) == Some(true)
                })
                .collect()
        } else {
            vec![self.path.clone()]
        };
        anyhow::ensure!(!files.is_empty(), "{:?} 下没有 OBJ 模型", self.path);
        if self.id.is_some() && files.len() > 1 {
            anyhow::bail!("--id 只能用于单个模型文件");
        }

        // 提取并行，入库串行
        let pb = ProgressBar::new(files.len() as u64).with_style(pb_style());
        let extracted: Vec<(PathBuf, Result<MeshFeatures>)> = files
            .par_iter()
            .progress_with(pb.clone())
            .map(|path| (path.clone(), extract_mesh_features(path)))
            .collect();
        pb.finish_with_message("特征提取完成");

        let metadata: BTreeMap<String, String> = self.meta.iter().cloned().collect();
        let mut store = open_models(opts)?;
        for (path, features) in extracted {
            match features {
                Ok(features) => {
                    let model_id = match &self.id {
                        Some(id) => id.clone(),
                        None => model_id_of(&path)?,
                    };
                    let entry = ModelEntry {
                        features,
                        obj_path: path.to_string_lossy().to_string(),
                        metadata: metadata.clone(),
                    };
                    store.save_model(&model_id, entry)?;
                    println!("[OK] {} <- {}", model_id, path.display());
                }
                Err(e) => eprintln!("[ERR] {}: {}", path.display(), e),
            }
        }
        Ok(())
    }
}

fn model_id_of(path: &PathBuf) -> Result<String> {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .ok_or_else(|| anyhow!("无法从 {:?} 推断模型 id", path))
}

fn parse_meta(s: &str) -> Result<(String, String)> {
    let Some((key, value)) = s.split_once('=') else {
        return Err(anyhow!("无效的元数据格式: {}", s));
    };
    Ok((key.to_string(), value.to_string()))
}
