use std::time::Duration;

/// One step of the concurrency curve: ramp to `target` clients over `duration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: usize,
}

impl Stage {
    pub fn new(duration: Duration, target: usize) -> Self {
        Self { duration, target }
    }
}

/// The full, immutable concurrency plan for a run.
///
/// The plan is fixed before any client starts and queried with wall-clock elapsed time, so
/// a slow scheduler tick can never compress the effective run duration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePlan {
    stages: Vec<Stage>,
}

impl StagePlan {
    pub fn new(stages: Vec<Stage>) -> anyhow::Result<Self> {
        if stages.is_empty() {
            anyhow::bail!("A stage plan must declare at least one stage");
        }
        if stages.iter().all(|stage| stage.duration.is_zero()) {
            anyhow::bail!("A stage plan must have a non-zero total duration");
        }

        Ok(Self { stages })
    }

    /// A flat plan: hold `target` clients for `duration`, then stop.
    ///
    /// The leading zero-duration stage floors the interpolation so the full target applies
    /// from the first tick rather than ramping up from zero.
    pub fn flat(target: usize, duration: Duration) -> anyhow::Result<Self> {
        if duration.is_zero() {
            anyhow::bail!("A flat plan must have a non-zero duration");
        }

        Self::new(vec![
            Stage::new(Duration::ZERO, target),
            Stage::new(duration, target),
        ])
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|stage| stage.duration).sum()
    }

    /// The highest concurrency any stage ramps towards.
    pub fn peak_target(&self) -> usize {
        self.stages
            .iter()
            .map(|stage| stage.target)
            .max()
            .unwrap_or(0)
    }

    /// The index of the stage covering `elapsed`, or None once the plan has run out.
    pub fn stage_index_at(&self, elapsed: Duration) -> Option<usize> {
        let mut start = Duration::ZERO;
        for (index, stage) in self.stages.iter().enumerate() {
            if elapsed < start + stage.duration {
                return Some(index);
            }
            start += stage.duration;
        }
        None
    }

    /// The number of clients that should be running at `elapsed`.
    ///
    /// Within a stage this interpolates linearly from the previous stage's target (0 before
    /// the first stage) to the stage's own target, rounded to the nearest integer. A
    /// zero-duration stage is never "inside" any instant, so it only contributes its target
    /// as the starting point of the next stage. Past the end of the plan the final stage's
    /// target holds.
    pub fn desired_at(&self, elapsed: Duration) -> usize {
        let mut start = Duration::ZERO;
        let mut from = 0usize;

        for stage in &self.stages {
            if elapsed < start + stage.duration {
                let fraction = (elapsed - start).as_secs_f64() / stage.duration.as_secs_f64();
                let desired =
                    from as f64 + (stage.target as f64 - from as f64) * fraction;
                return desired.round() as usize;
            }
            start += stage.duration;
            from = stage.target;
        }

        from
    }
}
