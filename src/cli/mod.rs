mod add3d;
mod clean;
mod detect;
mod extract;
mod search;
mod search3d;
mod show;
mod stats;

pub use add3d::*;
pub use clean::*;
pub use detect::*;
pub use extract::*;
pub use search::*;
pub use search3d::*;
pub use show::*;
pub use stats::*;

use crate::config::Opts;
use crate::store::{GalleryStore, JsonFileBackend, ModelStore};

pub trait SubCommandExtend {
    fn run(&self, opts: &Opts) -> anyhow::Result<()>;
}

pub(crate) fn open_gallery(opts: &Opts) -> anyhow::Result<GalleryStore> {
    GalleryStore::open(Box::new(JsonFileBackend::new(opts.conf_dir.gallery())))
}

pub(crate) fn open_models(opts: &Opts) -> anyhow::Result<ModelStore> {
    ModelStore::open(Box::new(JsonFileBackend::new(opts.conf_dir.models3d())))
}
