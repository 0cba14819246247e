//! Adaptive polling interval

use core::time::Duration;

/// Bounds and thresholds for the polling interval
///
/// After each successful blocking poll, the interval doubles if the poll
/// needed more than `max_loop` sleeps, and halves if it needed fewer than
/// `min_loop`. The interval always stays within `[min_wait, max_wait]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calibration {
    /// Shortest sleep between two status samples
    pub min_wait: Duration,
    /// Longest sleep between two status samples
    pub max_wait: Duration,
    /// Below this many sleeps, the interval shrinks
    pub min_loop: u32,
    /// Above this many sleeps, the interval grows
    pub max_loop: u32,
}

impl Default for Calibration {
    fn default() -> Self {
        Calibration {
            min_wait: Duration::from_micros(100),
            max_wait: Duration::from_millis(10),
            min_loop: 5,
            max_loop: 10,
        }
    }
}

impl Calibration {
    /// The interval a new calibrator starts with
    ///
    /// Half of the distance between the bounds.
    pub fn initial_wait(&self) -> Duration {
        self.max_wait.saturating_sub(self.min_wait) / 2
    }
}

/// Tracks the sleep interval used by blocking polls
#[derive(Debug, Clone)]
pub struct WaitCalibrator {
    config: Calibration,
    current: Duration,
}

impl WaitCalibrator {
    /// Create a calibrator that starts from [`Calibration::initial_wait`]
    ///
    /// The start is kept within the bounds, so equal bounds give a
    /// calibrator that is saturated from the start.
    pub fn new(config: Calibration) -> Self {
        WaitCalibrator {
            config,
            current: config
                .initial_wait()
                .max(config.min_wait)
                .min(config.max_wait),
        }
    }

    /// The calibration bounds
    pub fn config(&self) -> &Calibration {
        &self.config
    }

    /// The current interval
    pub fn current(&self) -> Duration {
        self.current
    }

    /// The interval reached its upper bound
    ///
    /// This happens when completions are rare compared to the polling
    /// cadence.
    pub fn is_saturated(&self) -> bool {
        self.current == self.config.max_wait
    }

    /// Sleep step for a poll with the given timeout
    ///
    /// Blocking polls (`None`) use the calibrated interval. Polls with a
    /// deadline use the shortest interval.
    pub fn step(&self, timeout: Option<Duration>) -> Duration {
        match timeout {
            None => self.current,
            Some(_) => self.config.min_wait,
        }
    }

    /// Adjust the interval after a poll that needed `loops` sleeps
    pub fn calibrate(&mut self, loops: u32) {
        let previous = self.current;
        if loops > self.config.max_loop {
            self.current = self
                .current
                .saturating_mul(2)
                .min(self.config.max_wait);
        } else if loops < self.config.min_loop {
            self.current = (self.current / 2).max(self.config.min_wait);
        }
        if previous != self.current {
            log::debug!(
                "poll interval {previous:?} -> {:?} after {loops} loops",
                self.current
            );
        }
    }
}
