use std::time::Duration;

use tokio::time::Instant;

/// Decides, once per rendered frame, whether an input send cycle is due.
///
/// Leftover time carries into the next interval, but a long frame never
/// earns more than one interval of credit, so slow frames don't cause bursts.
#[derive(Debug, Clone)]
pub struct Ticker {
	interval: Option<Duration>,
	elapsed: Duration,
	last: Instant,
}

impl Ticker {
	/// A ticker firing `rate_hz` times per second; a rate of zero or less never fires.
	pub fn new(rate_hz: f32) -> Self {
		let interval = (rate_hz > 0.0 && rate_hz.is_finite()).then(|| Duration::from_secs_f64(1.0 / rate_hz as f64));

		Self {
			interval,
			// The first frame always fires.
			elapsed: interval.unwrap_or_default(),
			last: Instant::now(),
		}
	}

	pub fn interval(&self) -> Option<Duration> {
		self.interval
	}

	/// Advance to `now`, returning true if a send cycle is due on this frame.
	pub fn tick(&mut self, now: Instant) -> bool {
		let Some(interval) = self.interval else {
			return false;
		};

		self.elapsed += now.saturating_duration_since(self.last);
		self.last = now;

		if self.elapsed < interval {
			return false;
		}

		self.elapsed = (self.elapsed - interval).min(interval);
		true
	}
}
