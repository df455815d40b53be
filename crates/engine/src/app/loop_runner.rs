use std::env;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use super::metrics::MetricsAccumulator;
use super::{MetricsHandle, Scene, SceneCommand};

pub const TPS_ENV_VAR: &str = "TILEROOM_TPS";
pub const SLOW_FRAME_ENV_VAR: &str = "TILEROOM_SLOW_FRAME_MS";

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub target_tps: u32,
    pub max_frame_delta: Duration,
    pub max_ticks_per_frame: u32,
    pub metrics_log_interval: Duration,
    pub simulated_slow_frame_ms: u64,
    /// Stops the loop once this much simulated time has run. `None` runs until the scene quits.
    pub max_sim_time: Option<Duration>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            target_tps: 60,
            max_frame_delta: Duration::from_millis(250),
            max_ticks_per_frame: 5,
            metrics_log_interval: Duration::from_secs(1),
            simulated_slow_frame_ms: 0,
            max_sim_time: None,
        }
    }
}

impl LoopConfig {
    /// Applies `TILEROOM_TPS` when it holds a positive integer.
    pub fn with_env_overrides(mut self) -> Self {
        match env::var(TPS_ENV_VAR) {
            Ok(value) => match value.trim().parse::<u32>() {
                Ok(tps) if tps > 0 => self.target_tps = tps,
                _ => warn!(
                    env_var = TPS_ENV_VAR,
                    value = value.as_str(),
                    "invalid tick-rate env var value; keeping config"
                ),
            },
            Err(env::VarError::NotPresent) => {}
            Err(err) => warn!(
                env_var = TPS_ENV_VAR,
                error = %err,
                "unable to read tick-rate env var; keeping config"
            ),
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    SceneQuit,
    SimTimeLimit,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopSummary {
    pub exit: LoopExit,
    pub ticks: u64,
    pub sim_seconds: f64,
}

pub fn run_app(config: LoopConfig, scene: &mut dyn Scene) -> LoopSummary {
    run_app_with_metrics(config, scene, MetricsHandle::default())
}

/// Drives `scene` with a fixed timestep paced against wall time, until the scene asks to
/// quit or the configured simulated-time limit is reached.
pub fn run_app_with_metrics(
    config: LoopConfig,
    scene: &mut dyn Scene,
    metrics_handle: MetricsHandle,
) -> LoopSummary {
    let target_tps = config.target_tps.max(1);
    let max_frame_delta =
        normalize_non_zero_duration(config.max_frame_delta, Duration::from_millis(250));
    let max_ticks_per_frame = config.max_ticks_per_frame.max(1);
    let metrics_log_interval =
        normalize_non_zero_duration(config.metrics_log_interval, Duration::from_secs(1));
    let fixed_dt = Duration::from_secs_f64(1.0 / target_tps as f64);
    let fixed_dt_seconds = fixed_dt.as_secs_f32();
    let slow_frame_delay = resolve_slow_frame_delay(config.simulated_slow_frame_ms);
    let max_ticks = config
        .max_sim_time
        .map(|limit| limit.as_nanos().div_ceil(fixed_dt.as_nanos().max(1)) as u64);

    info!(
        target_tps,
        max_frame_delta_ms = max_frame_delta.as_millis() as u64,
        max_ticks_per_frame,
        metrics_log_interval_ms = metrics_log_interval.as_millis() as u64,
        slow_frame_delay_ms = slow_frame_delay.as_millis() as u64,
        max_ticks = max_ticks.unwrap_or(0),
        "loop_config"
    );

    scene.load();
    info!(entity_count = scene.entity_count(), "scene_loaded");

    let mut accumulator = Duration::ZERO;
    let mut last_frame_instant = Instant::now();
    let mut metrics_accumulator = MetricsAccumulator::new(metrics_log_interval);
    let mut ticks = 0u64;

    let exit = 'frames: loop {
        if slow_frame_delay > Duration::ZERO {
            thread::sleep(slow_frame_delay);
        }

        let now = Instant::now();
        let raw_frame_dt = now.saturating_duration_since(last_frame_instant);
        last_frame_instant = now;
        accumulator = accumulator.saturating_add(clamp_frame_delta(raw_frame_dt, max_frame_delta));

        let step_plan = plan_sim_steps(accumulator, fixed_dt, max_ticks_per_frame);
        for _ in 0..step_plan.ticks_to_run {
            let tick_start = Instant::now();
            let command = scene.update(fixed_dt_seconds);
            metrics_accumulator.record_tick(tick_start.elapsed());
            ticks = ticks.saturating_add(1);

            if command == SceneCommand::Quit {
                info!(reason = "scene_quit", ticks, "shutdown_requested");
                break 'frames LoopExit::SceneQuit;
            }
            if max_ticks.is_some_and(|limit| ticks >= limit) {
                info!(reason = "sim_time_limit", ticks, "shutdown_requested");
                break 'frames LoopExit::SimTimeLimit;
            }
        }
        accumulator = step_plan.remaining_accumulator;

        if step_plan.dropped_backlog > Duration::ZERO {
            warn!(
                dropped_backlog_ms = step_plan.dropped_backlog.as_millis() as u64,
                max_ticks_per_frame, "sim_clamp_triggered"
            );
        }

        metrics_accumulator.record_frame(raw_frame_dt);
        if let Some(snapshot) = metrics_accumulator.maybe_snapshot(now) {
            metrics_handle.publish(snapshot);
            info!(
                tps = snapshot.tps,
                frame_time_ms = snapshot.frame_time_ms,
                tick_cost_ms = snapshot.tick_cost_ms,
                tick_cost_max_ms = snapshot.tick_cost_max_ms,
                entity_count = scene.entity_count(),
                "loop_metrics"
            );
        }

        // Sleep off whatever is left of this tick's budget.
        let idle = fixed_dt.saturating_sub(accumulator);
        let elapsed = Instant::now().saturating_duration_since(now);
        if idle > elapsed {
            thread::sleep(idle - elapsed);
        }
    };

    scene.unload();
    let summary = LoopSummary {
        exit,
        ticks,
        sim_seconds: ticks as f64 * fixed_dt.as_secs_f64(),
    };
    info!(
        exit = ?summary.exit,
        ticks = summary.ticks,
        sim_seconds = summary.sim_seconds,
        "shutdown"
    );
    summary
}

struct StepPlan {
    ticks_to_run: u32,
    remaining_accumulator: Duration,
    dropped_backlog: Duration,
}

fn plan_sim_steps(
    mut accumulator: Duration,
    fixed_dt: Duration,
    max_ticks_per_frame: u32,
) -> StepPlan {
    let mut ticks_to_run = 0u32;

    while accumulator >= fixed_dt && ticks_to_run < max_ticks_per_frame {
        accumulator = accumulator.saturating_sub(fixed_dt);
        ticks_to_run = ticks_to_run.saturating_add(1);
    }

    let dropped_backlog = if accumulator >= fixed_dt {
        std::mem::take(&mut accumulator)
    } else {
        Duration::ZERO
    };
    StepPlan {
        ticks_to_run,
        remaining_accumulator: accumulator,
        dropped_backlog,
    }
}

fn clamp_frame_delta(frame_dt: Duration, max_frame_delta: Duration) -> Duration {
    frame_dt.min(max_frame_delta)
}

fn normalize_non_zero_duration(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}

fn resolve_slow_frame_delay(config_slow_frame_ms: u64) -> Duration {
    match env::var(SLOW_FRAME_ENV_VAR) {
        Ok(value) => match value.parse::<u64>() {
            Ok(ms) => Duration::from_millis(ms),
            Err(_) => {
                warn!(
                    env_var = SLOW_FRAME_ENV_VAR,
                    value = value.as_str(),
                    "invalid slow-frame env var value; falling back to config"
                );
                Duration::from_millis(config_slow_frame_ms)
            }
        },
        Err(env::VarError::NotPresent) => Duration::from_millis(config_slow_frame_ms),
        Err(err) => {
            warn!(
                env_var = SLOW_FRAME_ENV_VAR,
                error = %err,
                "unable to read slow-frame env var; falling back to config"
            );
            Duration::from_millis(config_slow_frame_ms)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CountingScene {
        loaded: bool,
        unloaded: bool,
        ticks: u32,
        quit_after: Option<u32>,
        dt_seen: f32,
    }

    impl Scene for CountingScene {
        fn load(&mut self) {
            self.loaded = true;
        }

        fn update(&mut self, fixed_dt_seconds: f32) -> SceneCommand {
            self.ticks += 1;
            self.dt_seen = fixed_dt_seconds;
            match self.quit_after {
                Some(limit) if self.ticks >= limit => SceneCommand::Quit,
                _ => SceneCommand::None,
            }
        }

        fn unload(&mut self) {
            self.unloaded = true;
        }
    }

    fn fast_config() -> LoopConfig {
        LoopConfig {
            target_tps: 200,
            ..LoopConfig::default()
        }
    }

    #[test]
    fn clamp_frame_delta_caps_large_frame() {
        let max_frame_delta = Duration::from_millis(250);
        let raw_frame_dt = Duration::from_millis(600);

        assert_eq!(
            clamp_frame_delta(raw_frame_dt, max_frame_delta),
            max_frame_delta
        );
    }

    #[test]
    fn plan_sim_steps_runs_expected_ticks_without_drop() {
        let fixed_dt = Duration::from_millis(16);
        let result = plan_sim_steps(Duration::from_millis(48), fixed_dt, 5);

        assert_eq!(result.ticks_to_run, 3);
        assert_eq!(result.remaining_accumulator, Duration::ZERO);
        assert_eq!(result.dropped_backlog, Duration::ZERO);
    }

    #[test]
    fn plan_sim_steps_drops_backlog_when_tick_cap_hit() {
        let fixed_dt = Duration::from_millis(16);
        let result = plan_sim_steps(Duration::from_millis(120), fixed_dt, 3);

        assert_eq!(result.ticks_to_run, 3);
        assert_eq!(result.remaining_accumulator, Duration::ZERO);
        assert_eq!(result.dropped_backlog, Duration::from_millis(72));
    }

    #[test]
    fn plan_sim_steps_keeps_partial_tick() {
        let fixed_dt = Duration::from_millis(16);
        let result = plan_sim_steps(Duration::from_millis(20), fixed_dt, 5);

        assert_eq!(result.ticks_to_run, 1);
        assert_eq!(result.remaining_accumulator, Duration::from_millis(4));
    }

    #[test]
    fn zero_durations_fall_back() {
        assert_eq!(
            normalize_non_zero_duration(Duration::ZERO, Duration::from_secs(1)),
            Duration::from_secs(1)
        );
        assert_eq!(
            normalize_non_zero_duration(Duration::from_millis(3), Duration::from_secs(1)),
            Duration::from_millis(3)
        );
    }

    #[test]
    fn run_stops_when_scene_quits() {
        let mut scene = CountingScene {
            quit_after: Some(3),
            ..CountingScene::default()
        };

        let summary = run_app(fast_config(), &mut scene);

        assert_eq!(summary.exit, LoopExit::SceneQuit);
        assert_eq!(summary.ticks, 3);
        assert!(scene.loaded && scene.unloaded);
        assert!((scene.dt_seen - 0.005).abs() < 1e-6);
    }

    #[test]
    fn run_stops_at_sim_time_limit() {
        let mut scene = CountingScene::default();
        let config = LoopConfig {
            max_sim_time: Some(Duration::from_millis(50)),
            ..fast_config()
        };

        let summary = run_app(config, &mut scene);

        assert_eq!(summary.exit, LoopExit::SimTimeLimit);
        assert_eq!(summary.ticks, 10);
        assert_eq!(scene.ticks, 10);
        assert!((summary.sim_seconds - 0.05).abs() < 1e-9);
    }
}
