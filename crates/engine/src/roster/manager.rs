use std::collections::HashMap;
use std::time::Duration;

use crossbeam_channel::{never, unbounded, Receiver, TryRecvError};
use tracing::{debug, error, info, warn};

use crate::board::Board;
use crate::content::{CharacterDefinition, CharacterLoader, LoadError, LoadPoll, PendingCharacter};
use crate::events::{EventBus, Handler, Notification, NotificationKind};
use crate::grid::Coordinates;
use crate::room::{
    CharacterRosterEntry, RoomCommand, RoomEvent, RoomEventKind, RoomOutbox, RoomSession,
    RoomSubscription,
};

use super::controller::{
    CharacterController, MoveError, MoveOutcome, MoveTicket, MovementTuning,
    DEFAULT_MAX_STEP_SECONDS,
};

pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(10);

const ROOM_EVENT_KINDS: [RoomEventKind; 5] = [
    RoomEventKind::RosterAdded,
    RoomEventKind::RosterChanged,
    RoomEventKind::RosterRemoved,
    RoomEventKind::CharacterMoved,
    RoomEventKind::BecomeZombie,
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RosterConfig {
    /// Simulated time a character load may take before it counts as failed.
    pub load_timeout: Duration,
    pub max_step_seconds: f32,
    pub skip_intro: bool,
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            load_timeout: DEFAULT_LOAD_TIMEOUT,
            max_step_seconds: DEFAULT_MAX_STEP_SECONDS,
            skip_intro: true,
        }
    }
}

/// Collaborators handed to the manager by whoever composes the client.
pub struct RosterDeps {
    pub bus: EventBus,
    pub loader: Box<dyn CharacterLoader>,
    pub board: Box<dyn Board>,
}

/// Where an identity currently sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RosterState {
    Unknown,
    Loading,
    Live,
}

#[derive(Debug)]
struct PendingLoad {
    sequence: u64,
    entry: CharacterRosterEntry,
    pending: PendingCharacter,
    waited_seconds: f32,
}

#[derive(Debug)]
struct PendingPlacement {
    identity: String,
    ticket: MoveTicket,
}

struct RoomLink {
    subscription: RoomSubscription,
    outbox: RoomOutbox,
    clicks: Receiver<Coordinates>,
    click_handler: Handler,
}

/// Mirrors the room's roster as live local controllers and owns the selected identity.
///
/// All state changes happen through `&mut self`, so adds, removes and lookups for the
/// same identity are sequenced. Asynchronous work is polled from [`RosterManager::update`].
pub struct RosterManager {
    player_id: String,
    bus: EventBus,
    loader: Box<dyn CharacterLoader>,
    board: Box<dyn Board>,
    config: RosterConfig,
    controllers: HashMap<String, CharacterController>,
    loading: HashMap<String, PendingLoad>,
    placements: Vec<PendingPlacement>,
    selected: Option<String>,
    deferred_take_over: Option<String>,
    next_load_sequence: u64,
    room: Option<RoomLink>,
}

impl RosterManager {
    pub fn new(player_id: impl Into<String>, deps: RosterDeps, config: RosterConfig) -> Self {
        Self {
            player_id: player_id.into(),
            bus: deps.bus,
            loader: deps.loader,
            board: deps.board,
            config,
            controllers: HashMap::new(),
            loading: HashMap::new(),
            placements: Vec::new(),
            selected: None,
            deferred_take_over: None,
            next_load_sequence: 0,
            room: None,
        }
    }

    /// Subscribes to the room and to tile clicks on the bus. Calling it twice is a no-op.
    pub fn start(&mut self, room: &mut dyn RoomSession) {
        if self.room.is_some() {
            warn!(player_id = %self.player_id, "roster_manager_already_started");
            return;
        }
        let subscription = room.subscribe(&ROOM_EVENT_KINDS);
        let outbox = room.outbox();

        let (click_tx, clicks) = unbounded();
        let click_handler = EventBus::handler(move |notification| {
            if let Notification::TileClicked { coordinates } = notification {
                // Receiver only goes away when the manager stops.
                let _ = click_tx.send(*coordinates);
            }
            Ok(())
        });
        self.bus.subscribe(NotificationKind::TileClicked, &click_handler);

        info!(
            player_id = %self.player_id,
            subscription = subscription.id.0,
            "roster_manager_started"
        );
        self.room = Some(RoomLink {
            subscription,
            outbox,
            clicks,
            click_handler,
        });
    }

    /// Drops every subscription and releases all controllers.
    pub fn stop(&mut self, room: &mut dyn RoomSession) {
        let Some(link) = self.room.take() else {
            return;
        };
        if !room.unsubscribe(link.subscription.id) {
            debug!(subscription = link.subscription.id.0, "room_subscription_already_gone");
        }
        self.bus.unsubscribe(NotificationKind::TileClicked, &link.click_handler);

        let cancelled_loads = self.loading.len();
        self.loading.clear();
        for controller in self.controllers.values_mut() {
            controller.release();
        }
        let released = self.controllers.len();
        self.controllers.clear();
        self.placements.clear();
        self.selected = None;
        self.deferred_take_over = None;
        info!(released, cancelled_loads, "roster_manager_stopped");
    }

    pub fn is_started(&self) -> bool {
        self.room.is_some()
    }

    /// One simulation tick: applies room traffic, then player intents, then async results.
    pub fn update(&mut self, dt_seconds: f32) {
        self.drain_room_events();
        self.drain_tile_clicks();
        self.poll_loads(dt_seconds);
        for controller in self.controllers.values_mut() {
            controller.advance(dt_seconds);
        }
        self.flush_placements();
    }

    fn drain_room_events(&mut self) {
        loop {
            let next = match &self.room {
                Some(link) => link.subscription.events.try_recv(),
                None => return,
            };
            match next {
                Ok(event) => self.handle_room_event(event),
                Err(TryRecvError::Empty) => return,
                Err(TryRecvError::Disconnected) => {
                    warn!("room_event_stream_closed");
                    if let Some(link) = self.room.as_mut() {
                        link.subscription.events = never();
                    }
                    return;
                }
            }
        }
    }

    pub fn handle_room_event(&mut self, event: RoomEvent) {
        match event {
            RoomEvent::RosterAdded { entry } => self.on_roster_added(entry),
            RoomEvent::RosterChanged { entry } => self.on_roster_changed(&entry),
            RoomEvent::RosterRemoved { entry } => self.on_roster_removed(&entry.identity),
            RoomEvent::CharacterMoved {
                identity,
                ordered_tile_ids,
            } => self.on_character_moved(&identity, &ordered_tile_ids),
            RoomEvent::BecomeZombie { identity } => self.on_take_over(&identity),
            other => debug!(kind = ?other.kind(), "room_event_ignored"),
        }
    }

    /// Starts resolving the entry's class. The controller goes live from `update`.
    pub fn on_roster_added(&mut self, entry: CharacterRosterEntry) {
        let identity = entry.identity.clone();
        match self.state_of(&identity) {
            RosterState::Live => {
                error!(identity = %identity, "roster_add_duplicate_live");
                return;
            }
            RosterState::Loading => {
                error!(identity = %identity, "roster_add_duplicate_loading");
                return;
            }
            RosterState::Unknown => {}
        }

        let pending = self.loader.resolve(&entry.character_class);
        let sequence = self.next_load_sequence;
        self.next_load_sequence += 1;
        info!(
            identity = %identity,
            character_class = %entry.character_class,
            "roster_load_started"
        );
        self.bus.publish(Notification::LoadStarted {
            identity: identity.clone(),
            character_class: entry.character_class.clone(),
        });
        self.loading.insert(
            identity,
            PendingLoad {
                sequence,
                entry,
                pending,
                waited_seconds: 0.0,
            },
        );
    }

    pub fn on_roster_removed(&mut self, identity: &str) {
        if let Some(load) = self.loading.remove(identity) {
            info!(
                identity,
                character_class = %load.entry.character_class,
                "roster_load_cancelled"
            );
            if self.deferred_take_over.as_deref() == Some(identity) {
                self.deferred_take_over = None;
            }
            self.bus.publish(Notification::toast(left_message(identity)));
            return;
        }

        let Some(mut controller) = self.controllers.remove(identity) else {
            debug!(identity, "roster_remove_unknown");
            return;
        };
        controller.release();
        drop(controller);
        info!(identity, "roster_controller_removed");

        self.bus.publish(Notification::RosterRemoved {
            identity: identity.to_string(),
        });
        self.bus.publish(Notification::toast(left_message(identity)));

        if self.deferred_take_over.as_deref() == Some(identity) {
            self.deferred_take_over = None;
        }
        if self.selected.as_deref() == Some(identity) {
            self.selected = None;
            if self.controllers.contains_key(&self.player_id) {
                let player_id = self.player_id.clone();
                self.set_selected(&player_id);
            } else {
                self.bus.publish(Notification::SelectionCleared {
                    previous: identity.to_string(),
                });
            }
        }
    }

    pub fn on_roster_changed(&mut self, entry: &CharacterRosterEntry) {
        let Some(controller) = self.controllers.get_mut(&entry.identity) else {
            if let Some(load) = self.loading.get_mut(&entry.identity) {
                // Keep the freshest snapshot for when the load lands.
                load.entry = entry.clone();
            } else {
                debug!(identity = %entry.identity, "roster_change_unknown");
            }
            return;
        };
        controller.apply_snapshot(entry);
        self.bus.publish(Notification::StatsChanged {
            identity: entry.identity.clone(),
            display_name: controller.display_name().to_string(),
            stats: controller.stats(),
        });
    }

    /// Wire order is destination first; the path is walked origin first.
    pub fn on_character_moved(&mut self, identity: &str, ordered_tile_ids: &[String]) {
        let Some(controller) = self.controllers.get_mut(identity) else {
            if self.loading.contains_key(identity) {
                warn!(identity, "character_moved_while_loading");
            } else {
                warn!(identity, "character_moved_unknown");
            }
            return;
        };

        // Walk origin first and stop at the first tile the board cannot place.
        let mut path = Vec::with_capacity(ordered_tile_ids.len());
        let mut dead_end = None;
        for tile_id in ordered_tile_ids.iter().rev() {
            match self.board.resolve_tile(tile_id) {
                Ok(cell) => path.push(cell),
                Err(error) => {
                    warn!(
                        identity,
                        tile_id = %tile_id,
                        error = %error,
                        "character_move_path_unresolved"
                    );
                    dead_end = Some(MoveError::UnresolvedTile {
                        tile_id: tile_id.clone(),
                        reason: error.to_string(),
                    });
                    break;
                }
            }
        }
        debug!(
            identity,
            steps = path.len(),
            truncated = dead_end.is_some(),
            "character_move_started"
        );

        let ticket = match dead_end {
            Some(error) => controller.move_along_truncated_path(path, error),
            None => controller.move_along_path(path),
        };
        self.placements.push(PendingPlacement {
            identity: identity.to_string(),
            ticket,
        });
    }

    /// Hands selection to `identity`, waiting for its load if one is in flight.
    pub fn on_take_over(&mut self, identity: &str) {
        match self.state_of(identity) {
            RosterState::Live => {
                self.deferred_take_over = None;
                self.set_selected(identity);
            }
            RosterState::Loading => {
                info!(identity, "take_over_deferred");
                self.deferred_take_over = Some(identity.to_string());
            }
            RosterState::Unknown => {
                warn!(identity, "take_over_unknown_rejected");
            }
        }
    }

    fn set_selected(&mut self, identity: &str) {
        let Some(controller) = self.controllers.get(identity) else {
            warn!(identity, "select_missing_controller");
            return;
        };
        let is_player = identity == self.player_id;
        self.selected = Some(identity.to_string());
        info!(identity, is_player, "selection_changed");
        self.bus.publish(Notification::SelectionChanged {
            identity: identity.to_string(),
            is_player,
            display_name: controller.display_name().to_string(),
            character_class: controller.character_class().to_string(),
            stats: controller.stats(),
            position: controller.position(),
            avatar: controller.definition().avatar.clone(),
        });
    }

    fn drain_tile_clicks(&mut self) {
        let clicks = match &self.room {
            Some(link) => link.clicks.try_iter().collect::<Vec<_>>(),
            None => return,
        };
        for destination in clicks {
            self.request_move(destination);
        }
    }

    /// Forwards a player intent to the room. Movement itself waits for the room's answer.
    pub fn request_move(&mut self, destination: Coordinates) {
        if !self.controllers.contains_key(&self.player_id) {
            debug!(destination = %destination, "move_request_without_player");
            return;
        }
        self.bus.publish(Notification::MoveRequested { destination });
        let Some(link) = &self.room else {
            return;
        };
        match link.outbox.send(RoomCommand::Move { destination }) {
            Ok(()) => debug!(destination = %destination, "move_request_sent"),
            Err(error) => warn!(destination = %destination, error = %error, "move_request_failed"),
        }
    }

    fn poll_loads(&mut self, dt_seconds: f32) {
        if self.loading.is_empty() {
            return;
        }
        let timeout_seconds = self.config.load_timeout.as_secs_f32();
        let mut finished = Vec::new();
        for (identity, load) in &mut self.loading {
            load.waited_seconds += dt_seconds.max(0.0);
            match load.pending.poll() {
                LoadPoll::Ready(result) => finished.push((load.sequence, identity.clone(), result)),
                LoadPoll::Pending if load.waited_seconds >= timeout_seconds => {
                    finished.push((
                        load.sequence,
                        identity.clone(),
                        Err(LoadError::TimedOut {
                            character_class: load.entry.character_class.clone(),
                            seconds: load.waited_seconds,
                        }),
                    ));
                }
                LoadPoll::Pending => {}
            }
        }
        // Stable order regardless of map iteration.
        finished.sort_by_key(|(sequence, _, _)| *sequence);

        for (_, identity, result) in finished {
            let Some(load) = self.loading.remove(&identity) else {
                continue;
            };
            match result {
                Ok(definition) => self.go_live(load.entry, definition),
                Err(error) => self.fail_load(&identity, &error),
            }
        }
    }

    fn go_live(&mut self, entry: CharacterRosterEntry, definition: CharacterDefinition) {
        let identity = entry.identity.clone();
        let controller = CharacterController::initialize(
            definition,
            &entry,
            self.config.skip_intro,
            MovementTuning {
                max_step_seconds: self.config.max_step_seconds,
                bounds: Some(self.board.bounds()),
            },
        );
        self.controllers.insert(identity.clone(), controller);
        info!(
            identity = %identity,
            character_class = %entry.character_class,
            position = %entry.position,
            "roster_controller_live"
        );

        self.bus.publish(Notification::toast(joined_message(&identity)));
        self.bus.publish(Notification::RosterAdded {
            identity: identity.clone(),
            display_name: entry.display_name,
            character_class: entry.character_class,
            position: entry.position,
        });

        if self.deferred_take_over.as_deref() == Some(identity.as_str()) {
            self.deferred_take_over = None;
            self.set_selected(&identity);
        } else if identity == self.player_id {
            self.set_selected(&identity);
        }
    }

    fn fail_load(&mut self, identity: &str, error: &LoadError) {
        warn!(identity, error = %error, "roster_load_failed");
        if self.deferred_take_over.as_deref() == Some(identity) {
            self.deferred_take_over = None;
        }
        self.bus.publish(Notification::toast(format!(
            "Failed to load character for {identity}: {error}"
        )));
    }

    fn flush_placements(&mut self) {
        if self.placements.is_empty() {
            return;
        }
        let mut settled = Vec::new();
        self.placements.retain_mut(|placement| match placement.ticket.poll() {
            Some(outcome) => {
                settled.push((placement.identity.clone(), outcome.clone()));
                false
            }
            None => true,
        });
        for (identity, outcome) in settled {
            if matches!(outcome, MoveOutcome::Released { .. }) {
                debug!(identity = %identity, "character_move_released");
                continue;
            }
            debug!(
                identity = %identity,
                outcome = outcome.label(),
                position = %outcome.position(),
                "character_placed"
            );
            self.bus.publish(Notification::CharacterPlaced { identity, outcome });
        }
    }

    pub fn state_of(&self, identity: &str) -> RosterState {
        if self.controllers.contains_key(identity) {
            RosterState::Live
        } else if self.loading.contains_key(identity) {
            RosterState::Loading
        } else {
            RosterState::Unknown
        }
    }

    pub fn controller(&self, identity: &str) -> Option<&CharacterController> {
        self.controllers.get(identity)
    }

    pub fn player_character(&self) -> Option<&CharacterController> {
        self.controllers.get(&self.player_id)
    }

    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    pub fn selected_identity(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn selected_character(&self) -> Option<&CharacterController> {
        self.selected
            .as_deref()
            .and_then(|identity| self.controllers.get(identity))
    }

    pub fn live_count(&self) -> usize {
        self.controllers.len()
    }

    pub fn loading_count(&self) -> usize {
        self.loading.len()
    }

    pub fn pending_placements(&self) -> usize {
        self.placements.len()
    }
}

fn joined_message(identity: &str) -> String {
    format!("Player {identity} has joined the game!")
}

fn left_message(identity: &str) -> String {
    format!("Player {identity} has left the game!")
}
