pub mod cli;
pub mod color;
pub mod config;
pub mod detect;
pub mod extract;
pub mod kmeans;
pub mod mesh;
pub mod region;
pub mod shape;
pub mod shape3d;
pub mod similarity;
pub mod similarity3d;
pub mod store;
pub mod texture;
pub mod utils;

pub use config::Opts;
pub use extract::DescriptorBundle;
pub use store::{GalleryStore, ModelStore};
