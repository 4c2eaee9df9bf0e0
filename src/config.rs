use clap::Parser;
use std::path::{Path, PathBuf};

use crate::model::ModelKind;
use crate::writer::resolve_format;
use crate::RemovalOptions;

/// Remove the background from an image and save it as a transparent PNG.
#[derive(Parser, Clone, Debug)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Image to cut out
    pub input: PathBuf,

    /// Destination image [default: <INPUT stem>_Transparent.png next to INPUT]
    #[arg(value_parser = check_output)]
    pub output: Option<PathBuf>,

    /// ONNX segmentation model (u2net.onnx, isnet-general-use.onnx, ...)
    #[arg(short, long, env = "CUTOUT_MODEL")]
    pub model_path: PathBuf,

    #[arg(short = 'k', long, value_enum, default_value_t = ModelKind::U2net)]
    pub model_kind: ModelKind,

    #[arg(short, long, default_value_t = 0)]
    pub device_id: i32,

    /// Write the predicted mask instead of the cutout
    #[arg(long)]
    pub only_mask: bool,

    /// Remove specks and snap the mask to fully opaque/transparent
    #[arg(long)]
    pub post_process_mask: bool,

    /// Only change alpha; leave colour channels of background pixels as they are
    #[arg(long)]
    pub keep_colors: bool,

    /// Print errors only
    #[arg(short, long)]
    pub quiet: bool,
}

impl Config {
    /// The explicit output path, or `<stem>_Transparent.png` beside the input.
    pub fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| default_output_path(&self.input))
    }

    pub const fn removal_options(&self) -> RemovalOptions {
        RemovalOptions {
            only_mask: self.only_mask,
            post_process_mask: self.post_process_mask,
            blend_color: !self.keep_colors,
        }
    }
}

pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    input.with_file_name(format!("{stem}_Transparent.png"))
}

fn check_output(s: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(s);
    resolve_format(&path)?;
    Ok(path)
}
