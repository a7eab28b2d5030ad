use std::io::Write;

use anyhow::Result;

/// The per-run diagnostic log for one pipeline stage. Every line is echoed through the process
/// logger and also collected, so the stage can save a plain-text log next to its output file.
pub struct RunLog {
    lines: Vec<String>,
}

impl RunLog {
    pub fn new() -> RunLog {
        RunLog { lines: Vec::new() }
    }

    pub fn note(&mut self, msg: String) {
        info!("{}", msg);
        self.lines.push(msg);
    }

    pub fn warn(&mut self, msg: String) {
        warn!("{}", msg);
        self.lines.push(format!("Warning: {}", msg));
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let mut f = fs_err::File::create(path)?;
        for line in &self.lines {
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }

    /// For tests: did any collected line mention this?
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.iter().any(|l| l.contains(needle))
    }
}

impl Default for RunLog {
    fn default() -> RunLog {
        RunLog::new()
    }
}
