mod loop_runner;
mod metrics;
mod scene;

pub use loop_runner::{
    run_app, run_app_with_metrics, LoopConfig, LoopExit, LoopSummary, SLOW_FRAME_ENV_VAR,
    TPS_ENV_VAR,
};
pub use metrics::{LoopMetricsSnapshot, MetricsHandle};
pub use scene::{Scene, SceneCommand};
