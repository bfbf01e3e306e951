use std::collections::VecDeque;
use std::time::Instant;

use tether::{Correction, FrameReport};

const SAMPLE_COUNT: usize = 60;

/// Rolling receive rate plus a tally of reconciliation outcomes.
pub struct BotStats {
    frame_times: VecDeque<Instant>,
    frame_rate: f32,
    pub frames: u64,
    pub malformed: u64,
    pub converged: u64,
    pub applied: u64,
    pub smoothed: u64,
    pub hard_resets: u64,
    pub correction_frames: u64,
    pub stale_bases: u64,
    pub max_error: f32,
}

impl Default for BotStats {
    fn default() -> Self {
        Self::new()
    }
}

impl BotStats {
    pub fn new() -> Self {
        Self {
            frame_times: VecDeque::with_capacity(SAMPLE_COUNT),
            frame_rate: 0.0,
            frames: 0,
            malformed: 0,
            converged: 0,
            applied: 0,
            smoothed: 0,
            hard_resets: 0,
            correction_frames: 0,
            stale_bases: 0,
            max_error: 0.0,
        }
    }

    pub fn record_frame(&mut self, now: Instant, report: &FrameReport) {
        self.frames += 1;
        self.stale_bases += report.stale as u64;
        if report.correction_frame {
            self.correction_frames += 1;
        }
        match report.correction {
            Some(Correction::Converged) => self.converged += 1,
            Some(Correction::Applied { error }) => {
                self.applied += 1;
                self.max_error = self.max_error.max(error);
            }
            Some(Correction::Smoothed { error, .. }) => {
                self.smoothed += 1;
                self.max_error = self.max_error.max(error);
            }
            Some(Correction::HardReset(_)) => self.hard_resets += 1,
            Some(Correction::Ignored) | None => {}
        }

        if self.frame_times.len() >= SAMPLE_COUNT {
            self.frame_times.pop_front();
        }
        self.frame_times.push_back(now);

        if let Some(oldest) = self.frame_times.front() {
            let elapsed = now.duration_since(*oldest).as_secs_f32();
            if elapsed > 0.0 {
                self.frame_rate = (self.frame_times.len() - 1) as f32 / elapsed;
            }
        }
    }

    pub fn record_malformed(&mut self) {
        self.malformed += 1;
    }

    pub fn log(&self, label: &str) {
        log::info!(
            "{}: {} frames ({:.1}/s), {} converged, {} applied, {} smoothed, {} hard resets, {} server corrections, {} resyncs, {} malformed, max error {:.4}",
            label,
            self.frames,
            self.frame_rate,
            self.converged,
            self.applied,
            self.smoothed,
            self.hard_resets,
            self.correction_frames,
            self.stale_bases,
            self.malformed,
            self.max_error
        );
    }
}
