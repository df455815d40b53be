use std::collections::VecDeque;

use crossbeam_channel::Receiver;
use tileroom_engine::{
    CharacterLoader, Coordinates, EventBus, GridBoard, GridBounds, Notification, RoomEvent,
    RoomEventKind, RoomSession, RosterConfig, RosterDeps, RosterManager, Scene, SceneCommand,
    SubscriptionId,
};
use tracing::{info, warn};

use super::consumers::{CameraFollow, SelectionHeader, ToastLog};
use super::script::{SessionScript, TimedClick};
use super::scripted_room::ScriptedRoom;

/// One client connected to a scripted room, driven tick by tick.
pub(crate) struct GameSession {
    bus: EventBus,
    room: ScriptedRoom,
    roster: RosterManager,
    meta: Option<(SubscriptionId, Receiver<RoomEvent>)>,
    clicks: VecDeque<TimedClick>,
    toasts: ToastLog,
    header: SelectionHeader,
    camera: CameraFollow,
    clock: f32,
    end_at: f32,
    left: bool,
}

impl GameSession {
    pub fn new(
        script: SessionScript,
        loader: Box<dyn CharacterLoader>,
        roster_config: RosterConfig,
    ) -> Self {
        let end_at = script.end_at();
        let bounds = GridBounds::from_size(script.board.width, script.board.height);
        let mut room = ScriptedRoom::new(script.events, bounds);
        if script.echo_moves {
            room = room.with_move_echo(script.player_id.clone());
        }

        let bus = EventBus::new();
        let roster = RosterManager::new(
            script.player_id,
            RosterDeps {
                bus: bus.clone(),
                loader,
                board: Box::new(GridBoard::new(script.board.width, script.board.height)),
            },
            roster_config,
        );

        Self {
            bus,
            room,
            roster,
            meta: None,
            clicks: script.clicks.into(),
            toasts: ToastLog::new(),
            header: SelectionHeader::new(),
            camera: CameraFollow::new(),
            clock: 0.0,
            end_at,
            left: false,
        }
    }

    pub fn roster(&self) -> &RosterManager {
        &self.roster
    }

    pub fn toasts(&self) -> Vec<String> {
        self.toasts.messages()
    }

    pub fn header(&self) -> &SelectionHeader {
        &self.header
    }

    pub fn camera(&self) -> &CameraFollow {
        &self.camera
    }

    pub fn clock(&self) -> f32 {
        self.clock
    }

    fn publish_due_clicks(&mut self) {
        while self.clicks.front().is_some_and(|click| click.at <= self.clock) {
            if let Some(click) = self.clicks.pop_front() {
                self.publish_click(click.coordinates());
            }
        }
    }

    fn publish_click(&self, coordinates: Coordinates) {
        self.bus.publish(Notification::TileClicked { coordinates });
    }

    fn drain_meta(&mut self) {
        let Some((_, receiver)) = self.meta.as_ref() else {
            return;
        };
        let events = receiver.try_iter().collect::<Vec<_>>();
        for event in events {
            match event {
                RoomEvent::Notification { text } => {
                    self.bus.publish(Notification::Toast { text });
                }
                RoomEvent::Left { code } => {
                    warn!(code, "room_left");
                    self.bus.publish(Notification::toast(format!(
                        "Disconnected from room (code {code})"
                    )));
                    self.left = true;
                }
                other => {
                    warn!(kind = other.kind().wire_name(), "unexpected_meta_event");
                }
            }
        }
    }
}

impl Scene for GameSession {
    fn load(&mut self) {
        self.toasts.attach(&self.bus);
        self.header.attach(&self.bus);
        self.camera.attach(&self.bus);
        self.roster.start(&mut self.room);
        let subscription = self
            .room
            .subscribe(&[RoomEventKind::Notification, RoomEventKind::Left]);
        self.meta = Some((subscription.id, subscription.events));
        info!(
            player_id = self.roster.player_id(),
            end_at = self.end_at,
            "session_loaded"
        );
    }

    fn update(&mut self, fixed_dt_seconds: f32) -> SceneCommand {
        self.clock += fixed_dt_seconds;
        self.room.advance_to(self.clock);
        self.publish_due_clicks();
        self.roster.update(fixed_dt_seconds);
        self.room.process_commands();
        self.drain_meta();

        if self.left {
            return SceneCommand::Quit;
        }
        if self.clock >= self.end_at {
            info!(
                clock = self.clock,
                live = self.roster.live_count(),
                "session_script_finished"
            );
            return SceneCommand::Quit;
        }
        SceneCommand::None
    }

    fn unload(&mut self) {
        if let Some((id, _)) = self.meta.take() {
            self.room.unsubscribe(id);
        }
        self.roster.stop(&mut self.room);
        self.camera.detach(&self.bus);
        self.header.detach(&self.bus);
        self.toasts.detach(&self.bus);
        info!(
            toasts = self.toasts.messages().len(),
            delivered_events = self.room.delivered_events(),
            undelivered_events = self.room.remaining_events(),
            "session_unloaded"
        );
    }

    fn entity_count(&self) -> usize {
        self.roster.live_count()
    }
}
