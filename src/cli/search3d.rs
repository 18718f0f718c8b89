use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use crate::cli::{OutputFormat, SubCommandExtend, open_models};
use crate::config::{Opts, parse_weights3d};
use crate::shape3d::extract_mesh_features;
use crate::similarity3d::{SimilarModel, Weights3d, search_similar};

#[derive(Parser, Debug, Clone)]
pub struct Search3dCommand {
    /// 查询用的 OBJ 模型文件
    pub model: PathBuf,
    /// 返回的结果数量
    #[arg(long, value_name = "COUNT", default_value_t = 10)]
    pub count: usize,
    /// 7 维特征权重，逗号分隔，缺省时各维等权
    #[arg(short, long, value_name = "W1,..,W7", value_parser = parse_weights3d)]
    pub weights: Option<Weights3d>,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for Search3dCommand {
    fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let query = extract_mesh_features(&self.model)?;
        let store = open_models(opts)?;
        let results = search_similar(&store, &query.global, self.count, self.weights.as_ref());
        print_result(&results, self.output_format.clone())
    }
}

fn print_result(results: &[SimilarModel], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(results)?)
        }
        OutputFormat::Table => {
            for r in results {
                println!("{:.4}\t{}\t{}", r.distance, r.model_id, r.obj_path);
            }
        }
    }
    Ok(())
}
