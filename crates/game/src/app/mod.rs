mod bootstrap;
mod consumers;
mod loop_runner;
mod script;
mod scripted_room;
mod session;

pub(crate) use bootstrap::build_app;
pub(crate) use loop_runner::run;
