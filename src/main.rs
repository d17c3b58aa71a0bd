use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rehab_tracker::config::Config;
use rehab_tracker::controller::RepetitionController;
use rehab_tracker::exercise::ExerciseRegistry;
use rehab_tracker::guide::VideoGuide;
use rehab_tracker::render::{Key, MinifbRenderer};
use rehab_tracker::session::sqlite::UserContext;
use rehab_tracker::session::SqliteSessionStore;
use rehab_tracker::worker::OnnxWorkerFactory;

const CONFIG_PATH: &str = "config.toml";
const PANE_WIDTH: usize = 640;
const PANE_HEIGHT: usize = 480;

/// 数字キー 1〜9 を種目の番号に
fn exercise_index(key: Key) -> Option<usize> {
    const KEYS: [Key; 9] = [
        Key::Key1,
        Key::Key2,
        Key::Key3,
        Key::Key4,
        Key::Key5,
        Key::Key6,
        Key::Key7,
        Key::Key8,
        Key::Key9,
    ];
    KEYS.iter().position(|k| *k == key)
}

fn title(controller: &RepetitionController) -> String {
    let fps = controller
        .fps()
        .map(|f| format!("{:.1} fps", f))
        .unwrap_or_else(|| "-- fps".to_string());
    let mut title = format!(
        "{} [{}/{}] {} ({})",
        controller.exercise().name,
        controller.current_rep().min(controller.total_reps()),
        controller.total_reps(),
        controller.status_text(),
        fps
    );
    if let Some(notice) = controller.notice() {
        title.push_str(" - ");
        title.push_str(notice);
    }
    title
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("rehab-tracker {}", env!("GIT_VERSION"));

    let config = Config::load_or_default(CONFIG_PATH);
    let registry = Arc::new(ExerciseRegistry::from_config_or_default(&config.exercises));
    info!(
        "exercises: {}",
        registry.names().collect::<Vec<_>>().join(", ")
    );

    let store = SqliteSessionStore::open(
        &config.session.database,
        UserContext::from_config(&config.session),
    )
    .context("Failed to open session database")?;

    let factory = OnnxWorkerFactory::new(config.clone(), Arc::clone(&registry));
    let mut controller = RepetitionController::new(
        &config.repetition,
        Arc::clone(&registry),
        Box::new(factory),
        Box::new(VideoGuide::new()),
        Box::new(store),
    )?;

    let mut renderer = MinifbRenderer::new("Rehab Tracker", PANE_WIDTH, PANE_HEIGHT)?;
    info!("Space: start repetition, 1-9: select exercise, Up/Down: repetitions, Esc: quit");

    let names: Vec<String> = controller.exercise_names();
    while renderer.is_open() {
        for key in renderer.pressed_keys() {
            let result = match key {
                Key::Space => controller.start_exercise(Instant::now()),
                Key::Up => controller.set_total_reps(controller.total_reps() + 1),
                Key::Down => controller.set_total_reps(controller.total_reps().saturating_sub(1)),
                other => match exercise_index(other).and_then(|i| names.get(i)) {
                    Some(name) => controller.select_exercise(name),
                    None => Ok(()),
                },
            };
            if let Err(e) = result {
                warn!("{}", e);
            }
        }

        controller.tick(Instant::now());

        let reps: Vec<_> = (1..=controller.total_reps())
            .map(|i| controller.rep_state(i))
            .collect();
        renderer.draw(controller.latest_frame(), controller.guide_frame(), &reps);
        renderer.set_title(&title(&controller));
        renderer.update()?;
    }

    controller.abort();
    if let Some(summary) = controller.last_summary() {
        info!(
            "last result: {} {}/{} incorrect, {}",
            summary.exercise, summary.incorrect_reps, summary.total_reps, summary.error_note
        );
    }
    info!("Shutting down...");
    Ok(())
}
