mod bus;
mod notification;

pub use bus::{EventBus, Handler, HandlerError};
pub use notification::{Notification, NotificationKind};
