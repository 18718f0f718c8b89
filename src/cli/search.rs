use std::convert::Infallible;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use clap::{Parser, ValueEnum};

use crate::cli::{SubCommandExtend, open_gallery};
use crate::config::{Opts, SearchOptions};
use crate::similarity::{SearchParams, SimilarObject, UNKNOWN_CLASS, find_similar};

#[derive(Parser, Debug, Clone)]
pub struct SearchCommand {
    #[command(flatten)]
    pub search: SearchOptions,
    /// 查询图片路径（图片 id）
    pub image: String,
    /// 查询目标在图片中的下标
    #[arg(default_value_t = 0)]
    pub object_id: usize,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for SearchCommand {
    fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let store = open_gallery(opts)?;
        let entry = store
            .get_entry(&self.image)
            .ok_or_else(|| anyhow!("图片 {} 不在数据库中", self.image))?;

        // 区分「图片不存在」与「特征尚未提取」
        let features = store
            .get_features(&self.image, self.object_id)
            .ok_or_else(|| {
                anyhow!("{} 目标 {} 尚未提取特征，请先运行 extract", self.image, self.object_id)
            })?;
        let query_class = entry
            .detections
            .get(self.object_id)
            .map(|d| d.class_name.as_str())
            .unwrap_or(UNKNOWN_CLASS);

        let params = SearchParams {
            top_k: self.search.count,
            weights: self.search.weight.iter().copied().collect(),
            exclude_image_id: Some(self.image.clone()),
            same_class_only: !self.search.all_classes,
            class_weight: self.search.class_weight,
        };
        let results = find_similar(&store, &features.bundle, query_class, &params);

        print_result(&results, self.output_format.clone())
    }
}

fn print_result(results: &[SimilarObject], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(results)?)
        }
        OutputFormat::Table => {
            for r in results {
                println!("{:.4}\t{}\t{}#{}", r.similarity, r.class, r.image_id, r.object_id);
            }
        }
    }
    Ok(())
}

#[derive(ValueEnum, Debug, Clone)]
pub enum OutputFormat {
    Json,
    Table,
}

impl FromStr for OutputFormat {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(Self::Json),
            "table" => Ok(Self::Table),
            _ => unreachable!(),
        }
    }
}
