// Debounced actuator liveness
//
// Each wheel gets a countdown. A liveness pulse (communicating, or
// power-cycled since the last check) resets it to the ceiling; a missed
// sample decrements it. The wheel counts as alive while the countdown is
// above zero, so a single missed sample never flips the flag.

/// Debounce counter for one actuator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessRecord {
    value: u8,
    ceiling: u8,
}

impl LivenessRecord {
    /// Starts at the ceiling: assumed alive until samples say otherwise
    pub fn new(ceiling: u8) -> Self {
        Self {
            value: ceiling,
            ceiling,
        }
    }

    pub fn update(&mut self, pulse: bool) {
        if pulse {
            self.value = self.ceiling;
        } else {
            self.value = self.value.saturating_sub(1);
        }
    }

    pub fn value(&self) -> u8 {
        self.value
    }

    pub fn is_alive(&self) -> bool {
        self.value > 0
    }
}

/// Liveness records for the four wheels, sampled every `subsample` ticks
#[derive(Debug, Clone)]
pub struct LivenessTracker {
    records: [LivenessRecord; 4],
    subsample: u64,
}

impl LivenessTracker {
    pub fn new(ceiling: u8, subsample: u64) -> Self {
        Self {
            records: [LivenessRecord::new(ceiling); 4],
            subsample: subsample.max(1),
        }
    }

    /// True when `tick` is a sampling tick
    pub fn is_sample_tick(&self, tick: u64) -> bool {
        tick % self.subsample == 0
    }

    /// Feed one set of instantaneous pulses, ordered like `Wheel::ALL`
    pub fn sample(&mut self, pulses: [bool; 4]) {
        for (record, pulse) in self.records.iter_mut().zip(pulses) {
            record.update(pulse);
        }
    }

    pub fn record(&self, index: usize) -> &LivenessRecord {
        &self.records[index]
    }

    pub fn alive(&self) -> [bool; 4] {
        self.records.map(|r| r.is_alive())
    }
}
