use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tileroom_engine::{
    CharacterStats, Coordinates, EventBus, Handler, Notification, NotificationKind,
};
use tracing::{debug, info};

type Bindings = Vec<(NotificationKind, Handler)>;

fn attach_all(bus: &EventBus, bindings: &Bindings) {
    for (kind, handler) in bindings {
        bus.subscribe(*kind, handler);
    }
}

fn detach_all(bus: &EventBus, bindings: &Bindings) {
    for (kind, handler) in bindings {
        bus.unsubscribe(*kind, handler);
    }
}

/// Collects toast text in arrival order and logs each one.
pub(crate) struct ToastLog {
    messages: Rc<RefCell<Vec<String>>>,
    bindings: Bindings,
}

impl ToastLog {
    pub fn new() -> Self {
        let messages = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&messages);
        let on_toast = EventBus::handler(move |notification| {
            if let Notification::Toast { text } = notification {
                info!(text = text.as_str(), "toast");
                sink.borrow_mut().push(text.clone());
            }
            Ok(())
        });
        Self {
            messages,
            bindings: vec![(NotificationKind::Toast, on_toast)],
        }
    }

    pub fn attach(&self, bus: &EventBus) {
        attach_all(bus, &self.bindings);
    }

    pub fn detach(&self, bus: &EventBus) {
        detach_all(bus, &self.bindings);
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.borrow().clone()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct HeaderView {
    pub identity: String,
    pub display_name: String,
    pub character_class: String,
    pub is_player: bool,
    pub stats: CharacterStats,
    pub avatar: Option<String>,
}

impl fmt::Display for HeaderView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) hp {}/{} en {}/{}",
            self.display_name,
            self.character_class,
            self.stats.health.current,
            self.stats.health.max,
            self.stats.energy.current,
            self.stats.energy.max
        )?;
        if self.is_player {
            f.write_str(" [you]")?;
        }
        if let Some(avatar) = &self.avatar {
            write!(f, " <{avatar}>")?;
        }
        Ok(())
    }
}

/// Mirrors what a selection header panel would show.
pub(crate) struct SelectionHeader {
    view: Rc<RefCell<Option<HeaderView>>>,
    bindings: Bindings,
}

impl SelectionHeader {
    pub fn new() -> Self {
        let view: Rc<RefCell<Option<HeaderView>>> = Rc::new(RefCell::new(None));

        let state = Rc::clone(&view);
        let on_selected = EventBus::handler(move |notification| {
            if let Notification::SelectionChanged {
                identity,
                is_player,
                display_name,
                character_class,
                stats,
                avatar,
                ..
            } = notification
            {
                debug!(identity = identity.as_str(), is_player, "header_selection");
                *state.borrow_mut() = Some(HeaderView {
                    identity: identity.clone(),
                    display_name: display_name.clone(),
                    character_class: character_class.clone(),
                    is_player: *is_player,
                    stats: *stats,
                    avatar: avatar.clone(),
                });
            }
            Ok(())
        });

        let state = Rc::clone(&view);
        let on_cleared = EventBus::handler(move |notification| {
            if let Notification::SelectionCleared { .. } = notification {
                *state.borrow_mut() = None;
            }
            Ok(())
        });

        let state = Rc::clone(&view);
        let on_stats = EventBus::handler(move |notification| {
            if let Notification::StatsChanged {
                identity,
                display_name,
                stats,
            } = notification
            {
                if let Some(shown) = state.borrow_mut().as_mut() {
                    if &shown.identity == identity {
                        shown.display_name = display_name.clone();
                        shown.stats = *stats;
                    }
                }
            }
            Ok(())
        });

        let state = Rc::clone(&view);
        let on_removed = EventBus::handler(move |notification| {
            if let Notification::RosterRemoved { identity } = notification {
                let mut shown = state.borrow_mut();
                if shown.as_ref().is_some_and(|view| &view.identity == identity) {
                    *shown = None;
                }
            }
            Ok(())
        });

        Self {
            view,
            bindings: vec![
                (NotificationKind::SelectionChanged, on_selected),
                (NotificationKind::SelectionCleared, on_cleared),
                (NotificationKind::StatsChanged, on_stats),
                (NotificationKind::RosterRemoved, on_removed),
            ],
        }
    }

    pub fn attach(&self, bus: &EventBus) {
        attach_all(bus, &self.bindings);
    }

    pub fn detach(&self, bus: &EventBus) {
        detach_all(bus, &self.bindings);
    }

    pub fn view(&self) -> Option<HeaderView> {
        self.view.borrow().clone()
    }
}

#[derive(Debug, Default)]
struct FollowState {
    target: Option<String>,
    focus: Option<Coordinates>,
}

/// Keeps a camera focus on the selected character's settled tile.
pub(crate) struct CameraFollow {
    state: Rc<RefCell<FollowState>>,
    bindings: Bindings,
}

impl CameraFollow {
    pub fn new() -> Self {
        let state = Rc::new(RefCell::new(FollowState::default()));

        let follow = Rc::clone(&state);
        let on_selected = EventBus::handler(move |notification| {
            if let Notification::SelectionChanged {
                identity, position, ..
            } = notification
            {
                let mut follow = follow.borrow_mut();
                follow.target = Some(identity.clone());
                follow.focus = Some(*position);
            }
            Ok(())
        });

        let follow = Rc::clone(&state);
        let on_cleared = EventBus::handler(move |notification| {
            if let Notification::SelectionCleared { .. } = notification {
                follow.borrow_mut().target = None;
            }
            Ok(())
        });

        let follow = Rc::clone(&state);
        let on_placed = EventBus::handler(move |notification| {
            if let Notification::CharacterPlaced { identity, outcome } = notification {
                let mut follow = follow.borrow_mut();
                if follow.target.as_deref() == Some(identity.as_str()) {
                    let focus = outcome.position();
                    debug!(identity = identity.as_str(), focus = %focus, "camera_refocus");
                    follow.focus = Some(focus);
                }
            }
            Ok(())
        });

        Self {
            state,
            bindings: vec![
                (NotificationKind::SelectionChanged, on_selected),
                (NotificationKind::SelectionCleared, on_cleared),
                (NotificationKind::CharacterPlaced, on_placed),
            ],
        }
    }

    pub fn attach(&self, bus: &EventBus) {
        attach_all(bus, &self.bindings);
    }

    pub fn detach(&self, bus: &EventBus) {
        detach_all(bus, &self.bindings);
    }

    pub fn focus(&self) -> Option<Coordinates> {
        self.state.borrow().focus
    }

    pub fn target(&self) -> Option<String> {
        self.state.borrow().target.clone()
    }
}

#[cfg(test)]
mod tests {
    use tileroom_engine::MoveOutcome;

    use super::*;

    fn selected(identity: &str, col: i32, row: i32) -> Notification {
        Notification::SelectionChanged {
            identity: identity.to_string(),
            is_player: identity == "p1",
            display_name: identity.to_uppercase(),
            character_class: "knight".to_string(),
            stats: CharacterStats::default(),
            position: Coordinates::new(col, row),
            avatar: None,
        }
    }

    #[test]
    fn toast_log_records_in_order_and_detaches() {
        let bus = EventBus::new();
        let log = ToastLog::new();
        log.attach(&bus);

        bus.publish(Notification::toast("one"));
        bus.publish(Notification::toast("two"));
        log.detach(&bus);
        bus.publish(Notification::toast("three"));

        assert_eq!(log.messages(), vec!["one".to_string(), "two".to_string()]);
        assert_eq!(bus.subscriber_count(NotificationKind::Toast), 0);
    }

    #[test]
    fn header_follows_selection_and_clears_on_removal() {
        let bus = EventBus::new();
        let header = SelectionHeader::new();
        header.attach(&bus);

        bus.publish(selected("p2", 1, 1));
        let view = header.view().expect("view");
        assert_eq!(view.identity, "p2");
        assert!(!view.is_player);

        bus.publish(Notification::StatsChanged {
            identity: "p2".to_string(),
            display_name: "Renamed".to_string(),
            stats: CharacterStats::default(),
        });
        assert_eq!(
            header.view().expect("view").to_string(),
            "Renamed (knight) hp 0/0 en 0/0"
        );

        bus.publish(Notification::RosterRemoved {
            identity: "p3".to_string(),
        });
        assert!(header.view().is_some());

        bus.publish(Notification::RosterRemoved {
            identity: "p2".to_string(),
        });
        assert!(header.view().is_none());
    }

    #[test]
    fn header_shows_selected_avatar() {
        let bus = EventBus::new();
        let header = SelectionHeader::new();
        header.attach(&bus);

        let mut notification = selected("p1", 0, 0);
        if let Notification::SelectionChanged { avatar, .. } = &mut notification {
            *avatar = Some("avatars/knight.png".to_string());
        }
        bus.publish(notification);

        let view = header.view().expect("view");
        assert_eq!(view.avatar.as_deref(), Some("avatars/knight.png"));
        assert_eq!(
            view.to_string(),
            "P1 (knight) hp 0/0 en 0/0 [you] <avatars/knight.png>"
        );

        bus.publish(selected("p2", 1, 1));
        assert_eq!(header.view().expect("view").avatar, None);
    }

    #[test]
    fn camera_tracks_only_the_selected_character() {
        let bus = EventBus::new();
        let camera = CameraFollow::new();
        camera.attach(&bus);

        bus.publish(selected("p1", 0, 0));
        assert_eq!(camera.focus(), Some(Coordinates::new(0, 0)));

        bus.publish(Notification::CharacterPlaced {
            identity: "p2".to_string(),
            outcome: MoveOutcome::Completed {
                position: Coordinates::new(5, 5),
            },
        });
        assert_eq!(camera.focus(), Some(Coordinates::new(0, 0)));

        bus.publish(Notification::CharacterPlaced {
            identity: "p1".to_string(),
            outcome: MoveOutcome::Superseded {
                position: Coordinates::new(1, 0),
            },
        });
        assert_eq!(camera.focus(), Some(Coordinates::new(1, 0)));

        bus.publish(Notification::SelectionCleared {
            previous: "p1".to_string(),
        });
        assert_eq!(camera.target(), None);
    }
}
