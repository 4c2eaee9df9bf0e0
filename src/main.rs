use std::process::ExitCode;

use clap::Parser;
use env_logger::Env;
use log::{debug, info};

use cutout_rs::{Config, Cutout, OnnxRemover, Reporter};

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();

    let config = Config::parse();
    let output = config.output_path();
    debug!("{:?}", config);

    let remover = OnnxRemover::new(&config.model_path, config.model_kind, config.device_id);
    let cutout = Cutout::new(remover, config.removal_options());
    let mut reporter = Reporter::stdout(config.quiet);

    match cutout.run(&config.input, &output, &mut reporter) {
        Ok(summary) => {
            info!(
                "{}x{} image, {} fully transparent pixels, {} bytes written (model input {:?} from {})",
                summary.width,
                summary.height,
                summary.transparent_pixels,
                summary.bytes_written,
                cutout.remover().image_size(),
                cutout.remover().model_path().display()
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            reporter.failure(&err);
            ExitCode::FAILURE
        }
    }
}
