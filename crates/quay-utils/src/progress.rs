use std::time::Instant;

/// Minimum delay between rendered updates, mirroring the cadence clients
/// expect on the progress side-band.
const THROTTLE_MS: u128 = 100;

/// A rate-limited progress counter that renders its state as the
/// carriage-return terminated lines streamed to clients.
///
/// Unlike a terminal progress bar, the counter never touches stderr
/// itself; callers forward the rendered strings wherever they belong
/// (typically side-band channel 2).
pub struct Counter {
    label: String,
    total: Option<u64>,
    current: u64,
    started_at: Instant,
    last_render: Option<Instant>,
    last_percent: Option<u32>,
}

impl Counter {
    pub fn new(label: &str, total: Option<u64>) -> Self {
        Self {
            label: label.to_string(),
            total,
            current: 0,
            started_at: Instant::now(),
            last_render: None,
            last_percent: None,
        }
    }

    /// Advance to `count`. Returns a rendered line when enough has
    /// changed to warrant an update, `None` while throttled.
    pub fn set(&mut self, count: u64) -> Option<String> {
        self.current = count;

        let now = Instant::now();
        let at_end = self.total.is_some_and(|t| count >= t);

        if let Some(last) = self.last_render {
            if now.duration_since(last).as_millis() < THROTTLE_MS && !at_end {
                return None;
            }
        }

        if let Some(total) = self.total {
            if total > 0 {
                let percent = ((count as f64 / total as f64) * 100.0) as u32;
                if self.last_percent == Some(percent) && !at_end {
                    return None;
                }
                self.last_percent = Some(percent);
            }
        }

        self.last_render = Some(now);
        Some(self.render())
    }

    /// Advance by one.
    pub fn tick(&mut self) -> Option<String> {
        self.set(self.current + 1)
    }

    /// Terminal line including elapsed time, e.g.
    /// `"Resolving deltas: 100% (3/3), done.\n"`.
    pub fn finish(self) -> String {
        let elapsed = self.started_at.elapsed();
        let timing = if elapsed.as_secs() > 0 {
            format!(", {:.2}s", elapsed.as_secs_f64())
        } else {
            String::new()
        };
        match self.total {
            Some(total) if total > 0 => format!(
                "\r{}: 100% ({}/{}){}, done.\n",
                self.label, total, total, timing
            ),
            _ => format!("\r{}: {}{}, done.\n", self.label, self.current, timing),
        }
    }

    fn render(&self) -> String {
        match self.total {
            Some(total) if total > 0 => {
                let percent = (self.current as f64 / total as f64) * 100.0;
                format!(
                    "\r{}: {:3.0}% ({}/{})",
                    self.label, percent, self.current, total
                )
            }
            _ => format!("\r{}: {}", self.label, self.current),
        }
    }
}
