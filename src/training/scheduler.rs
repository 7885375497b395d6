/// Exponential learning rate decay keyed by step count
///
/// Staircase-quantized by default: the rate is multiplied by `decay_rate`
/// once per `decay_steps` interval and is constant inside an interval.
#[derive(Debug, Clone)]
pub struct ExponentialDecayConfig {
    /// Initial learning rate
    pub initial_lr: f64,
    /// Steps between rate changes
    pub decay_steps: usize,
    /// Multiplicative decay factor per interval
    pub decay_rate: f64,
    /// Quantize the exponent to interval boundaries
    pub staircase: bool,
}

impl Default for ExponentialDecayConfig {
    fn default() -> Self {
        // 200_000 examples / 32 batch size, decay constants from the
        // original PointNet training schedule.
        Self {
            initial_lr: 1e-3,
            decay_steps: 6250,
            decay_rate: 0.7,
            staircase: true,
        }
    }
}

/// Exponential decay scheduler
pub struct ExponentialDecay {
    config: ExponentialDecayConfig,
    current_step: usize,
}

impl ExponentialDecay {
    /// Create new scheduler
    pub fn new(config: ExponentialDecayConfig) -> Self {
        Self {
            config,
            current_step: 0,
        }
    }

    /// Scheduler with the original decay constants and a given initial rate
    pub fn with_initial_lr(initial_lr: f64) -> Self {
        Self::new(ExponentialDecayConfig {
            initial_lr,
            ..ExponentialDecayConfig::default()
        })
    }

    /// Get learning rate for current step
    pub fn get_lr(&self) -> f64 {
        self.get_lr_at_step(self.current_step)
    }

    /// Get learning rate for a specific step
    pub fn get_lr_at_step(&self, step: usize) -> f64 {
        let exponent = if self.config.staircase {
            (step / self.config.decay_steps) as f64
        } else {
            step as f64 / self.config.decay_steps as f64
        };
        self.config.initial_lr * self.config.decay_rate.powf(exponent)
    }

    /// Step the scheduler (increment step counter)
    pub fn step(&mut self) {
        self.current_step += 1;
    }

    /// Get current step
    pub fn get_step(&self) -> usize {
        self.current_step
    }

    /// Reset scheduler to initial state
    pub fn reset(&mut self) {
        self.current_step = 0;
    }
}
