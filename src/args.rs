use clap::{Parser, Subcommand};
use mesh_snap::config::AppConfig;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file (created with defaults if missing)
    #[arg(long, default_value = AppConfig::DEFAULT_PATH)]
    pub config: PathBuf,

    /// Detector to use (sidecar, onnx); overrides the config file
    #[arg(long)]
    pub detector: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Take a photo and preview its face mesh
    Capture {
        /// Import this photo instead of using the camera
        #[arg(long)]
        from: Option<PathBuf>,

        /// Camera Index (default 0)
        #[arg(short, long, default_value_t = 0)]
        cam_index: u32,

        /// Where to write the composited preview
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Preview the face mesh of an existing photo
    Preview {
        photo: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List available cameras
    ListCameras,
}
