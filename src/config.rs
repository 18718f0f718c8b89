use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use clap::{Parser, Subcommand};
use directories::ProjectDirs;

use crate::cli::*;
use crate::similarity::Modality;
use crate::similarity3d::Weights3d;

static CONF_DIR: LazyLock<ConfDir> = LazyLock::new(|| {
    let proj_dirs = ProjectDirs::from("", "", "visearch").expect("failed to get project dir");
    ConfDir { path: proj_dirs.config_dir().to_path_buf() }
});

fn default_config_dir() -> &'static str {
    CONF_DIR.path().to_str().unwrap()
}

#[derive(Parser, Debug, Clone)]
#[command(name = "visearch", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// visearch 配置文件目录
    #[arg(short, long, default_value = default_config_dir())]
    pub conf_dir: ConfDir,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 登记外部检测器的检测结果
    Detect(DetectCommand),
    /// 为图片中的检测目标提取特征
    Extract(ExtractCommand),
    /// 以图片中的某个目标为查询，搜索相似目标
    Search(SearchCommand),
    /// 添加 3D 模型到数据库
    Add3d(Add3dCommand),
    /// 以 3D 模型为查询，搜索相似模型
    Search3d(Search3dCommand),
    /// 查看图片的检测与特征提取状态
    Show(ShowCommand),
    /// 打印数据库统计信息
    Stats(StatsCommand),
    /// 删除图片或 3D 模型的数据
    Clean(CleanCommand),
}

/// 2D 相似度搜索的通用选项
#[derive(Parser, Debug, Clone)]
pub struct SearchOptions {
    /// 返回的结果数量
    #[arg(long, value_name = "COUNT", default_value_t = 10)]
    pub count: usize,
    /// 不按类别过滤候选（默认只比较同类目标）
    #[arg(long)]
    pub all_classes: bool,
    /// 关闭类别过滤时，同类目标的加成权重，范围 0 到 1
    #[arg(long, value_name = "W", default_value_t = 0.8)]
    pub class_weight: f64,
    /// 自定义模态权重，格式为 `模态=权重`，可重复指定
    /// 例：`-w color=0.5 -w shape_hog=0.2`
    #[arg(short, long, value_name = "K=V", value_parser = parse_weight, verbatim_doc_comment)]
    pub weight: Vec<(Modality, f64)>,
}

#[derive(Debug, Clone)]
pub struct ConfDir {
    path: PathBuf,
}

impl ConfDir {
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// 返回 2D 特征数据库的路径
    pub fn gallery(&self) -> PathBuf {
        self.path.join("gallery.json")
    }

    /// 返回 3D 特征数据库的路径
    pub fn models3d(&self) -> PathBuf {
        self.path.join("models3d.json")
    }
}

impl FromStr for ConfDir {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self { path: PathBuf::from(s) })
    }
}

fn parse_weight(s: &str) -> anyhow::Result<(Modality, f64)> {
    let Some((name, weight)) = s.split_once('=') else {
        return Err(anyhow::anyhow!("无效的权重格式: {}", s));
    };
    let modality = Modality::from_name(name)
        .ok_or_else(|| anyhow::anyhow!("未知的模态: {}", name))?;
    let weight: f64 = weight.parse()?;
    if weight < 0.0 {
        return Err(anyhow::anyhow!("权重不能为负数: {}", s));
    }
    Ok((modality, weight))
}

pub(crate) fn parse_weights3d(s: &str) -> anyhow::Result<Weights3d> {
    let parts = s.split(',').map(|p| p.trim().parse::<f64>()).collect::<Result<Vec<_>, _>>()?;
    let parts: [f64; 7] =
        parts.try_into().map_err(|_| anyhow::anyhow!("3D 权重必须为 7 个数字: {}", s))?;
    if parts.iter().any(|&w| w < 0.0) {
        return Err(anyhow::anyhow!("权重不能为负数: {}", s));
    }
    Ok(Weights3d(parts))
}
