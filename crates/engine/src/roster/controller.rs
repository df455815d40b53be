use std::collections::VecDeque;

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use thiserror::Error;
use tracing::{debug, warn};

use crate::content::CharacterDefinition;
use crate::grid::{Coordinates, GridBounds};
use crate::room::{CharacterRosterEntry, CharacterStats};

pub const DEFAULT_MAX_STEP_SECONDS: f32 = 1.0;

/// Slack when comparing accumulated tick time against step and entrance durations.
const TIME_EPSILON: f32 = 1e-5;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoveError {
    #[error("step from {from} to {to} is not between adjacent cells")]
    NotAdjacent { from: Coordinates, to: Coordinates },
    #[error("step target {target} lies outside the board")]
    OutOfBounds { target: Coordinates },
    #[error("path tile '{tile_id}' could not be resolved: {reason}")]
    UnresolvedTile { tile_id: String, reason: String },
}

/// How a `move_along_path` call ended. Every variant carries the settled position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    Completed { position: Coordinates },
    /// A newer path replaced this one before it finished.
    Superseded { position: Coordinates },
    /// A step was invalid; earlier steps were kept.
    Failed {
        position: Coordinates,
        error: MoveError,
    },
    /// The controller was released while moving.
    Released { position: Coordinates },
}

impl MoveOutcome {
    pub fn position(&self) -> Coordinates {
        match self {
            Self::Completed { position }
            | Self::Superseded { position }
            | Self::Failed { position, .. }
            | Self::Released { position } => *position,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "completed",
            Self::Superseded { .. } => "superseded",
            Self::Failed { .. } => "failed",
            Self::Released { .. } => "released",
        }
    }
}

/// Completion handle for one `move_along_path` call. Resolves exactly once.
#[derive(Debug)]
pub struct MoveTicket {
    origin: Coordinates,
    receiver: Receiver<MoveOutcome>,
    outcome: Option<MoveOutcome>,
}

impl MoveTicket {
    pub fn poll(&mut self) -> Option<&MoveOutcome> {
        if self.outcome.is_none() {
            self.outcome = match self.receiver.try_recv() {
                Ok(outcome) => Some(outcome),
                Err(TryRecvError::Empty) => None,
                // The owning controller vanished without settling the move.
                Err(TryRecvError::Disconnected) => Some(MoveOutcome::Released {
                    position: self.origin,
                }),
            };
        }
        self.outcome.as_ref()
    }

    pub fn is_resolved(&mut self) -> bool {
        self.poll().is_some()
    }
}

#[derive(Debug)]
struct MoveCompleter {
    sender: Sender<MoveOutcome>,
}

impl MoveCompleter {
    fn resolve(self, outcome: MoveOutcome) {
        let _ = self.sender.send(outcome);
    }
}

fn move_channel(origin: Coordinates) -> (MoveCompleter, MoveTicket) {
    let (sender, receiver) = bounded(1);
    (
        MoveCompleter { sender },
        MoveTicket {
            origin,
            receiver,
            outcome: None,
        },
    )
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovementTuning {
    /// Upper bound on one step's duration, whatever the definition's speed says.
    pub max_step_seconds: f32,
    pub bounds: Option<GridBounds>,
}

impl Default for MovementTuning {
    fn default() -> Self {
        Self {
            max_step_seconds: DEFAULT_MAX_STEP_SECONDS,
            bounds: None,
        }
    }
}

#[derive(Debug)]
struct StepTransition {
    target: Coordinates,
    elapsed: f32,
}

#[derive(Debug)]
struct ActiveMove {
    remaining: VecDeque<Coordinates>,
    step: Option<StepTransition>,
    /// Reported instead of completion once `remaining` runs out.
    dead_end: Option<MoveError>,
    completer: MoveCompleter,
}

/// Local runtime representation of one roster character.
#[derive(Debug)]
pub struct CharacterController {
    identity: String,
    display_name: String,
    character_class: String,
    definition: CharacterDefinition,
    stats: CharacterStats,
    position: Coordinates,
    step_seconds: f32,
    bounds: Option<GridBounds>,
    entrance_remaining: f32,
    active_move: Option<ActiveMove>,
}

impl CharacterController {
    pub fn initialize(
        definition: CharacterDefinition,
        entry: &CharacterRosterEntry,
        skip_intro: bool,
        tuning: MovementTuning,
    ) -> Self {
        let step_seconds = step_seconds_for(definition.move_speed, tuning.max_step_seconds);
        let entrance_remaining = if skip_intro {
            0.0
        } else {
            definition.intro_seconds.max(0.0)
        };
        Self {
            identity: entry.identity.clone(),
            display_name: entry.display_name.clone(),
            character_class: entry.character_class.clone(),
            definition,
            stats: entry.stats,
            position: entry.position,
            step_seconds,
            bounds: tuning.bounds,
            entrance_remaining,
            active_move: None,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn character_class(&self) -> &str {
        &self.character_class
    }

    pub fn definition(&self) -> &CharacterDefinition {
        &self.definition
    }

    pub fn stats(&self) -> CharacterStats {
        self.stats
    }

    pub fn position(&self) -> Coordinates {
        self.position
    }

    pub fn is_moving(&self) -> bool {
        self.active_move.is_some()
    }

    /// False while the entrance sequence is still playing.
    pub fn is_ready(&self) -> bool {
        self.entrance_remaining <= 0.0
    }

    pub fn step_seconds(&self) -> f32 {
        self.step_seconds
    }

    /// Refreshes the mirrored snapshot. Position is only taken over while idle; an
    /// in-flight move owns it until it settles.
    pub fn apply_snapshot(&mut self, entry: &CharacterRosterEntry) {
        self.display_name = entry.display_name.clone();
        self.stats = entry.stats;
        if self.active_move.is_none() && self.position != entry.position {
            debug!(
                identity = %self.identity,
                from = %self.position,
                to = %entry.position,
                "controller_position_resynced"
            );
            self.position = entry.position;
        }
    }

    /// Starts walking `path` from the current position, replacing any walk in progress.
    pub fn move_along_path(&mut self, path: Vec<Coordinates>) -> MoveTicket {
        self.start_move(path, None)
    }

    /// Walks `path`, then fails with `dead_end` where the rest of the route could not be
    /// resolved. Steps taken before that point are kept.
    pub fn move_along_truncated_path(
        &mut self,
        path: Vec<Coordinates>,
        dead_end: MoveError,
    ) -> MoveTicket {
        self.start_move(path, Some(dead_end))
    }

    fn start_move(&mut self, path: Vec<Coordinates>, dead_end: Option<MoveError>) -> MoveTicket {
        let (completer, ticket) = move_channel(self.position);

        if let Some(previous) = self.active_move.take() {
            debug!(
                identity = %self.identity,
                position = %self.position,
                abandoned_steps = previous.remaining.len() + usize::from(previous.step.is_some()),
                "move_superseded"
            );
            previous.completer.resolve(MoveOutcome::Superseded {
                position: self.position,
            });
        }

        let already_there = path.len() == 1 && path[0] == self.position;
        if path.is_empty() || already_there {
            let position = self.position;
            completer.resolve(match dead_end {
                Some(error) => MoveOutcome::Failed { position, error },
                None => MoveOutcome::Completed { position },
            });
            return ticket;
        }

        self.active_move = Some(ActiveMove {
            remaining: path.into(),
            step: None,
            dead_end,
            completer,
        });
        ticket
    }

    /// Advances the entrance and the active walk by `dt_seconds`. Steps run strictly
    /// one after another; a step begins only once the previous one has settled.
    pub fn advance(&mut self, dt_seconds: f32) {
        let mut budget = dt_seconds.max(0.0);

        if self.entrance_remaining > 0.0 {
            let consumed = budget.min(self.entrance_remaining);
            self.entrance_remaining -= consumed;
            budget -= consumed;
            if self.entrance_remaining > TIME_EPSILON {
                return;
            }
            self.entrance_remaining = 0.0;
        }

        loop {
            let Some(active) = self.active_move.as_mut() else {
                return;
            };

            if active.step.is_none() {
                let Some(target) = active.remaining.pop_front() else {
                    match active.dead_end.take() {
                        Some(error) => {
                            warn!(
                                identity = %self.identity,
                                position = %self.position,
                                error = %error,
                                "move_path_dead_end"
                            );
                            self.finish_move(|position| MoveOutcome::Failed { position, error });
                        }
                        None => self.finish_move(|position| MoveOutcome::Completed { position }),
                    }
                    return;
                };
                if target == self.position {
                    continue;
                }
                if let Err(error) = validate_step(self.position, target, self.bounds) {
                    warn!(
                        identity = %self.identity,
                        position = %self.position,
                        target = %target,
                        error = %error,
                        "move_step_rejected"
                    );
                    self.finish_move(|position| MoveOutcome::Failed { position, error });
                    return;
                }
                active.step = Some(StepTransition {
                    target,
                    elapsed: 0.0,
                });
            }

            let Some(step) = active.step.as_mut() else {
                return;
            };
            let needed = (self.step_seconds - step.elapsed).max(0.0);
            if budget + TIME_EPSILON < needed {
                step.elapsed += budget;
                return;
            }
            budget = (budget - needed).max(0.0);
            self.position = step.target;
            active.step = None;
        }
    }

    /// Settles any walk in progress as released. Called before the controller is dropped.
    pub fn release(&mut self) {
        if self.active_move.is_some() {
            self.finish_move(|position| MoveOutcome::Released { position });
        }
    }

    fn finish_move(&mut self, outcome: impl FnOnce(Coordinates) -> MoveOutcome) {
        if let Some(active) = self.active_move.take() {
            let outcome = outcome(self.position);
            debug!(
                identity = %self.identity,
                position = %self.position,
                outcome = outcome.label(),
                "move_settled"
            );
            active.completer.resolve(outcome);
        }
    }
}

fn step_seconds_for(move_speed: f32, max_step_seconds: f32) -> f32 {
    let cap = if max_step_seconds.is_finite() && max_step_seconds > 0.0 {
        max_step_seconds
    } else {
        DEFAULT_MAX_STEP_SECONDS
    };
    if move_speed.is_finite() && move_speed > 0.0 {
        move_speed.recip().min(cap)
    } else {
        cap
    }
}

fn validate_step(
    from: Coordinates,
    to: Coordinates,
    bounds: Option<GridBounds>,
) -> Result<(), MoveError> {
    if let Some(bounds) = bounds {
        if !bounds.contains(to) {
            return Err(MoveError::OutOfBounds { target: to });
        }
    }
    if !from.is_adjacent(to) {
        return Err(MoveError::NotAdjacent { from, to });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::RangedStat;

    const STEP: f32 = 0.25;

    fn definition(move_speed: f32, intro_seconds: f32) -> CharacterDefinition {
        CharacterDefinition {
            def_name: "knight".to_string(),
            label: "Knight".to_string(),
            move_speed,
            intro_seconds,
            avatar: None,
        }
    }

    fn entry_at(col: i32, row: i32) -> CharacterRosterEntry {
        CharacterRosterEntry {
            identity: "p1".to_string(),
            display_name: "Ada".to_string(),
            character_class: "knight".to_string(),
            stats: CharacterStats {
                health: RangedStat::new(10, 10),
                energy: RangedStat::new(3, 5),
            },
            position: Coordinates::new(col, row),
        }
    }

    fn controller_at(col: i32, row: i32) -> CharacterController {
        CharacterController::initialize(
            definition(1.0 / STEP, 0.0),
            &entry_at(col, row),
            true,
            MovementTuning::default(),
        )
    }

    fn line(cells: &[(i32, i32)]) -> Vec<Coordinates> {
        cells
            .iter()
            .map(|(col, row)| Coordinates::new(*col, *row))
            .collect()
    }

    #[test]
    fn initialize_copies_snapshot() {
        let controller = controller_at(3, 4);
        assert_eq!(controller.identity(), "p1");
        assert_eq!(controller.position(), Coordinates::new(3, 4));
        assert_eq!(controller.stats().energy, RangedStat::new(3, 5));
        assert!(controller.is_ready());
        assert!(!controller.is_moving());
    }

    #[test]
    fn empty_path_completes_immediately() {
        let mut controller = controller_at(0, 0);
        let mut ticket = controller.move_along_path(Vec::new());
        assert_eq!(
            ticket.poll(),
            Some(&MoveOutcome::Completed {
                position: Coordinates::new(0, 0)
            })
        );
        assert!(!controller.is_moving());
    }

    #[test]
    fn single_step_onto_current_cell_completes_immediately() {
        let mut controller = controller_at(2, 2);
        let mut ticket = controller.move_along_path(line(&[(2, 2)]));
        assert!(ticket.is_resolved());
        assert!(!controller.is_moving());
    }

    #[test]
    fn steps_settle_one_at_a_time_in_order() {
        let mut controller = controller_at(0, 0);
        let mut ticket = controller.move_along_path(line(&[(1, 0), (2, 0), (2, 1)]));

        let mut visited = Vec::new();
        for _ in 0..20 {
            controller.advance(0.1);
            if visited.last() != Some(&controller.position()) {
                visited.push(controller.position());
            }
        }

        assert_eq!(visited, line(&[(0, 0), (1, 0), (2, 0), (2, 1)]));
        assert_eq!(
            ticket.poll(),
            Some(&MoveOutcome::Completed {
                position: Coordinates::new(2, 1)
            })
        );
    }

    #[test]
    fn partial_step_does_not_move_the_entity() {
        let mut controller = controller_at(0, 0);
        let mut ticket = controller.move_along_path(line(&[(1, 0)]));
        controller.advance(STEP * 0.5);
        assert_eq!(controller.position(), Coordinates::new(0, 0));
        assert!(!ticket.is_resolved());
        controller.advance(STEP * 0.5);
        assert_eq!(controller.position(), Coordinates::new(1, 0));
        assert!(ticket.is_resolved());
    }

    #[test]
    fn one_large_tick_walks_the_whole_path() {
        let mut controller = controller_at(0, 0);
        let mut ticket = controller.move_along_path(line(&[(0, 1), (0, 2), (0, 3)]));
        controller.advance(10.0);
        assert_eq!(controller.position(), Coordinates::new(0, 3));
        assert!(ticket.is_resolved());
    }

    #[test]
    fn path_entries_on_current_cell_are_skipped() {
        let mut controller = controller_at(0, 0);
        let mut ticket = controller.move_along_path(line(&[(0, 0), (1, 0)]));
        controller.advance(STEP);
        assert_eq!(controller.position(), Coordinates::new(1, 0));
        assert!(ticket.is_resolved());
    }

    #[test]
    fn second_move_supersedes_first_and_both_resolve() {
        let mut controller = controller_at(0, 0);
        let mut first = controller.move_along_path(line(&[(1, 0), (2, 0), (3, 0)]));
        controller.advance(STEP);
        assert_eq!(controller.position(), Coordinates::new(1, 0));

        let mut second = controller.move_along_path(line(&[(1, 1), (1, 2)]));
        assert_eq!(
            first.poll(),
            Some(&MoveOutcome::Superseded {
                position: Coordinates::new(1, 0)
            })
        );
        assert!(!second.is_resolved());

        controller.advance(10.0);
        assert_eq!(controller.position(), Coordinates::new(1, 2));
        assert_eq!(
            second.poll(),
            Some(&MoveOutcome::Completed {
                position: Coordinates::new(1, 2)
            })
        );
    }

    #[test]
    fn superseding_mid_step_restarts_from_settled_cell() {
        let mut controller = controller_at(0, 0);
        let _first = controller.move_along_path(line(&[(1, 0)]));
        controller.advance(STEP * 0.9);
        let mut second = controller.move_along_path(line(&[(0, 1)]));
        controller.advance(STEP * 0.5);
        assert_eq!(controller.position(), Coordinates::new(0, 0));
        controller.advance(STEP * 0.5);
        assert_eq!(controller.position(), Coordinates::new(0, 1));
        assert!(second.is_resolved());
    }

    #[test]
    fn non_adjacent_step_fails_and_keeps_progress() {
        let mut controller = controller_at(0, 0);
        let mut ticket = controller.move_along_path(line(&[(1, 0), (3, 0), (4, 0)]));
        controller.advance(10.0);

        assert_eq!(controller.position(), Coordinates::new(1, 0));
        assert_eq!(
            ticket.poll(),
            Some(&MoveOutcome::Failed {
                position: Coordinates::new(1, 0),
                error: MoveError::NotAdjacent {
                    from: Coordinates::new(1, 0),
                    to: Coordinates::new(3, 0),
                },
            })
        );
        assert!(!controller.is_moving());
    }

    #[test]
    fn step_outside_bounds_fails() {
        let mut controller = CharacterController::initialize(
            definition(4.0, 0.0),
            &entry_at(0, 0),
            true,
            MovementTuning {
                bounds: Some(GridBounds::from_size(2, 2)),
                ..MovementTuning::default()
            },
        );
        let mut ticket = controller.move_along_path(line(&[(-1, 0)]));
        controller.advance(1.0);
        assert!(matches!(
            ticket.poll(),
            Some(MoveOutcome::Failed {
                error: MoveError::OutOfBounds { .. },
                ..
            })
        ));
        assert_eq!(controller.position(), Coordinates::new(0, 0));
    }

    #[test]
    fn truncated_path_walks_prefix_then_fails() {
        let mut controller = controller_at(0, 0);
        let dead_end = MoveError::UnresolvedTile {
            tile_id: "not_a_tile".to_string(),
            reason: "unknown".to_string(),
        };
        let mut ticket =
            controller.move_along_truncated_path(line(&[(0, 0), (1, 0)]), dead_end.clone());
        controller.advance(STEP * 0.5);
        assert!(!ticket.is_resolved());
        controller.advance(10.0);
        assert_eq!(controller.position(), Coordinates::new(1, 0));
        assert_eq!(
            ticket.poll(),
            Some(&MoveOutcome::Failed {
                position: Coordinates::new(1, 0),
                error: dead_end,
            })
        );
        assert!(!controller.is_moving());
    }

    #[test]
    fn truncated_empty_path_fails_in_place() {
        let mut controller = controller_at(2, 2);
        let mut ticket = controller.move_along_truncated_path(
            Vec::new(),
            MoveError::UnresolvedTile {
                tile_id: "tile_Z_9".to_string(),
                reason: "outside".to_string(),
            },
        );
        assert!(matches!(
            ticket.poll(),
            Some(MoveOutcome::Failed { position, .. }) if *position == Coordinates::new(2, 2)
        ));
        assert!(!controller.is_moving());
    }

    #[test]
    fn fixed_ticks_settle_steps_on_schedule() {
        for (dt, first_step, whole_path) in [(1.0 / 60.0, 15, 30), (0.05, 5, 10), (0.1, 3, 5)] {
            let mut controller = controller_at(0, 0);
            let mut ticket = controller.move_along_path(line(&[(1, 0), (2, 0)]));
            let mut ticks = 0;
            while controller.position() == Coordinates::new(0, 0) {
                controller.advance(dt);
                ticks += 1;
                assert!(ticks <= 100, "step never settled at dt {dt}");
            }
            assert_eq!(ticks, first_step, "first step at dt {dt}");
            while !ticket.is_resolved() {
                controller.advance(dt);
                ticks += 1;
                assert!(ticks <= 100, "path never settled at dt {dt}");
            }
            assert_eq!(ticks, whole_path, "whole path at dt {dt}");
            assert_eq!(controller.position(), Coordinates::new(2, 0));
        }
    }

    #[test]
    fn entrance_delays_movement_unless_skipped() {
        let mut controller = CharacterController::initialize(
            definition(4.0, 1.0),
            &entry_at(0, 0),
            false,
            MovementTuning::default(),
        );
        assert!(!controller.is_ready());
        let mut ticket = controller.move_along_path(line(&[(1, 0)]));
        controller.advance(0.9);
        assert_eq!(controller.position(), Coordinates::new(0, 0));
        controller.advance(0.1 + STEP);
        assert!(controller.is_ready());
        assert_eq!(controller.position(), Coordinates::new(1, 0));
        assert!(ticket.is_resolved());
    }

    #[test]
    fn release_resolves_active_move() {
        let mut controller = controller_at(0, 0);
        let mut ticket = controller.move_along_path(line(&[(1, 0), (2, 0)]));
        controller.advance(STEP);
        controller.release();
        assert_eq!(
            ticket.poll(),
            Some(&MoveOutcome::Released {
                position: Coordinates::new(1, 0)
            })
        );
    }

    #[test]
    fn dropped_controller_does_not_leave_ticket_hanging() {
        let mut controller = controller_at(4, 4);
        let mut ticket = controller.move_along_path(line(&[(4, 5)]));
        drop(controller);
        assert_eq!(
            ticket.poll(),
            Some(&MoveOutcome::Released {
                position: Coordinates::new(4, 4)
            })
        );
    }

    #[test]
    fn step_duration_is_capped() {
        assert_eq!(step_seconds_for(0.0, 0.5), 0.5);
        assert_eq!(step_seconds_for(1.0, 0.5), 0.5);
        assert_eq!(step_seconds_for(4.0, 0.5), 0.25);
        assert_eq!(step_seconds_for(f32::NAN, f32::NAN), DEFAULT_MAX_STEP_SECONDS);
    }

    #[test]
    fn snapshot_only_moves_idle_controllers() {
        let mut controller = controller_at(0, 0);
        let mut moved = entry_at(5, 5);
        moved.stats.health = RangedStat::new(4, 10);
        controller.apply_snapshot(&moved);
        assert_eq!(controller.position(), Coordinates::new(5, 5));
        assert_eq!(controller.stats().health, RangedStat::new(4, 10));

        let _ticket = controller.move_along_path(line(&[(5, 6)]));
        controller.apply_snapshot(&entry_at(9, 9));
        assert_eq!(controller.position(), Coordinates::new(5, 5));
    }
}
