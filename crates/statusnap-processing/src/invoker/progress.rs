//! Progress reporting from ffmpeg's `-progress pipe:1` key=value stream.
//!
//! Progress is observability only; nothing in the pipeline branches on it.

/// Tracks `out_time` against the expected output duration and decides when a new
/// percentage is worth logging.
#[derive(Debug)]
pub struct ProgressTracker {
    expected_secs: f64,
    out_time_secs: f64,
    last_reported: Option<u32>,
    step_percent: u32,
}

impl ProgressTracker {
    pub fn new(expected_secs: f64) -> Self {
        Self {
            expected_secs,
            out_time_secs: 0.0,
            last_reported: None,
            step_percent: 10,
        }
    }

    /// Feed one line of progress output. Returns a percentage when it crossed the next
    /// reporting step.
    pub fn update(&mut self, line: &str) -> Option<u32> {
        let (key, value) = line.trim().split_once('=')?;
        match key {
            // out_time_ms is in microseconds despite its name
            "out_time_us" | "out_time_ms" => {
                let micros = value.trim().parse::<f64>().ok()?;
                self.out_time_secs = micros / 1_000_000.0;
                None
            }
            "progress" => {
                let percent = if value.trim() == "end" {
                    100
                } else {
                    self.percent()?
                };
                let due = match self.last_reported {
                    None => true,
                    Some(last) => percent >= last + self.step_percent || (percent == 100 && last < 100),
                };
                if due {
                    self.last_reported = Some(percent);
                    Some(percent)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Current completion, clamped to 0..=100. `None` when the expected duration is unknown.
    pub fn percent(&self) -> Option<u32> {
        if self.expected_secs <= 0.0 {
            return None;
        }
        let ratio = (self.out_time_secs / self.expected_secs).clamp(0.0, 1.0);
        Some((ratio * 100.0).floor() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reports_in_steps() {
        let mut tracker = ProgressTracker::new(90.0);

        assert_eq!(tracker.update("out_time_us=9000000"), None);
        assert_eq!(tracker.update("progress=continue"), Some(10));

        tracker.update("out_time_us=13500000");
        assert_eq!(tracker.update("progress=continue"), None);

        tracker.update("out_time_us=45000000");
        assert_eq!(tracker.update("progress=continue"), Some(50));

        assert_eq!(tracker.update("progress=end"), Some(100));
        assert_eq!(tracker.update("progress=end"), None);
    }

    #[test]
    fn test_ignores_garbage_lines() {
        let mut tracker = ProgressTracker::new(10.0);
        assert_eq!(tracker.update("frame=12"), None);
        assert_eq!(tracker.update("not a pair"), None);
        assert_eq!(tracker.update("out_time_us=N/A"), None);
        assert_eq!(tracker.out_time_secs, 0.0);
    }

    #[test]
    fn test_percent_clamps_overshoot() {
        let mut tracker = ProgressTracker::new(10.0);
        tracker.update("out_time_us=12000000");
        assert_eq!(tracker.percent(), Some(100));
    }
}
