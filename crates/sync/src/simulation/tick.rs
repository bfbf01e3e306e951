/// Converts wall-clock time into a whole number of fixed simulation ticks.
#[derive(Debug, Clone)]
pub struct FixedTimestep {
    tick_rate: u32,
    tick_ms: f64,
    accumulator_ms: f64,
    max_step_ms: f64,
}

impl FixedTimestep {
    pub fn new(tick_rate: u32) -> Self {
        let tick_rate = tick_rate.max(1);
        Self {
            tick_rate,
            tick_ms: 1000.0 / tick_rate as f64,
            accumulator_ms: 0.0,
            max_step_ms: 250.0,
        }
    }

    pub fn tick_rate(&self) -> u32 {
        self.tick_rate
    }

    pub fn tick_ms(&self) -> f64 {
        self.tick_ms
    }

    /// Adds elapsed time. A single stall contributes at most 250 ms so a
    /// paused process does not come back to a burst of catch-up ticks.
    pub fn accumulate(&mut self, elapsed_ms: f64) {
        self.accumulator_ms += elapsed_ms.clamp(0.0, self.max_step_ms);
    }

    pub fn consume_tick(&mut self) -> bool {
        if self.accumulator_ms >= self.tick_ms {
            self.accumulator_ms -= self.tick_ms;
            true
        } else {
            false
        }
    }
}
