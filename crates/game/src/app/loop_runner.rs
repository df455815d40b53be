use std::process::ExitCode;

use tileroom_engine::run_app;
use tracing::info;

use super::bootstrap::AppWiring;

pub(crate) fn run(app: AppWiring) -> ExitCode {
    let AppWiring { config, mut session } = app;
    let summary = run_app(config, &mut session);

    let selected = session
        .header()
        .view()
        .map(|view| view.to_string())
        .unwrap_or_else(|| "none".to_string());
    info!(
        exit = ?summary.exit,
        ticks = summary.ticks,
        clock = session.clock(),
        live = session.roster().live_count(),
        toasts = session.toasts().len(),
        selected = selected.as_str(),
        camera_target = ?session.camera().target(),
        camera_focus = ?session.camera().focus(),
        "session_finished"
    );

    ExitCode::SUCCESS
}
