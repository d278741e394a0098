pub mod gi;
pub mod renderer;
pub mod replay;
pub mod scene;
pub mod settings;

pub use replay::{run, ReplayOptions, ReplaySummary};

pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init();
}
