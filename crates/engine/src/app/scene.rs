#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneCommand {
    None,
    Quit,
}

/// Simulation driven by [`super::run_app`] at a fixed tick rate.
pub trait Scene {
    fn load(&mut self);
    fn update(&mut self, fixed_dt_seconds: f32) -> SceneCommand;
    fn unload(&mut self);
    /// Reported alongside loop metrics.
    fn entity_count(&self) -> usize {
        0
    }
}
