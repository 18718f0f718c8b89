use clap::Parser;

use crate::cli::{SubCommandExtend, open_gallery, open_models};
use crate::config::Opts;

#[derive(Parser, Debug, Clone)]
pub struct CleanCommand {
    /// 图片 id 或模型 id
    pub id: String,
    /// 删除 3D 模型而不是图片
    #[arg(long)]
    pub model: bool,
}

impl SubCommandExtend for CleanCommand {
    fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let deleted = if self.model {
            open_models(opts)?.delete_model(&self.id)?
        } else {
            open_gallery(opts)?.delete_image_data(&self.id)?
        };
        match deleted {
            true => println!("[OK] 已删除 {}", self.id),
            false => println!("[SKIP] {} 不存在", self.id),
        }
        Ok(())
    }
}
