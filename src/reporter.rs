use std::io::{self, Stdout, Write};
use std::path::Path;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::errors::CutoutError;

/// Printed after every failure.
pub const REMEDIATION_HINT: &str =
    "Make sure the segmentation model is available:\n  pass --model-path <u2net.onnx> or set CUTOUT_MODEL";

/// Console output of a run: one line per step, a spinner while the model
/// runs, and the error plus [`REMEDIATION_HINT`] on failure.
///
/// Writes are best effort. A closed stdout never turns a successful run into
/// a failed one.
pub struct Reporter<W: Write> {
    out: W,
    quiet: bool,
}

impl Reporter<Stdout> {
    pub fn stdout(quiet: bool) -> Self {
        Self {
            out: io::stdout(),
            quiet,
        }
    }
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W) -> Self {
        Self { out, quiet: false }
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn progress(&mut self, line: &str) {
        if !self.quiet {
            let _ = writeln!(self.out, "{line}");
        }
    }

    pub fn opening(&mut self, input: &Path) {
        self.progress(&format!("Opening image: {}", input.display()));
    }

    /// Announce the removal step and keep a spinner going while `step` runs.
    pub fn removing<T>(&mut self, step: impl FnOnce() -> T) -> T {
        self.progress("Removing background...");
        let _ = self.out.flush();

        let spinner = if self.quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new_spinner()
        };
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.green} [{elapsed}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_message("running segmentation model");
        spinner.enable_steady_tick(Duration::from_millis(100));

        let result = step();
        spinner.finish_and_clear();
        result
    }

    pub fn saving(&mut self, output: &Path) {
        self.progress(&format!("Saving transparent image to: {}", output.display()));
    }

    pub fn success(&mut self, output: &Path) {
        self.progress("Success! Background removed.");
        self.progress(&format!("Transparent image saved to: {}", output.display()));
    }

    /// Report a failed run. Printed even in quiet mode.
    pub fn failure(&mut self, err: &CutoutError) {
        let _ = writeln!(self.out, "Error: {}", err.chain());
        let _ = writeln!(self.out);
        let _ = writeln!(self.out, "{REMEDIATION_HINT}");
        let _ = self.out.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn output_of(reporter: Reporter<Vec<u8>>) -> String {
        String::from_utf8(reporter.into_inner()).unwrap()
    }

    #[test]
    fn test_step_lines() {
        let mut reporter = Reporter::new(Vec::new());
        reporter.opening(Path::new("mascot.png"));
        let value = reporter.removing(|| 42);
        reporter.saving(Path::new("out.png"));
        reporter.success(Path::new("out.png"));

        assert_eq!(value, 42);
        assert_eq!(
            output_of(reporter),
            "Opening image: mascot.png\n\
             Removing background...\n\
             Saving transparent image to: out.png\n\
             Success! Background removed.\n\
             Transparent image saved to: out.png\n"
        );
    }

    #[test]
    fn test_failure_prints_hint() {
        let mut reporter = Reporter::new(Vec::new());
        reporter.failure(&CutoutError::FileNotFound {
            path: PathBuf::from("mascot.png"),
        });

        let text = output_of(reporter);
        assert!(text.starts_with("Error: Input image not found: \"mascot.png\"\n\n"));
        assert!(text.ends_with(&format!("{REMEDIATION_HINT}\n")));
    }

    #[test]
    fn test_quiet_keeps_errors() {
        let mut reporter = Reporter::new(Vec::new()).quiet(true);
        reporter.opening(Path::new("mascot.png"));
        reporter.failure(&CutoutError::FileNotFound {
            path: PathBuf::from("mascot.png"),
        });

        let text = output_of(reporter);
        assert!(!text.contains("Opening image"));
        assert!(text.contains("Error:"));
    }
}
