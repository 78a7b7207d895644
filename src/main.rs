use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use glyphgrid::config::types::Config;
use glyphgrid::config::Color;
use glyphgrid::renderer::cursor::{Cursor, CursorType};
use glyphgrid::window::{create_event_loop, App, WindowOptions};

const FLASH_INTERVAL: Duration = Duration::from_millis(500);
const CURSOR_COLOR: Color = Color::new(0.85, 0.47, 0.34, 1.0);

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();

    // Handle --print-default-config before any other initialization
    if args.iter().any(|a| a == "--print-default-config") {
        print!("{}", Config::print_default());
        return;
    }

    env_logger::init();
    log::info!("glyphgrid v{} starting", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(&args) {
        log::error!("Application error: {e:#}");
        std::process::exit(1);
    }
}

fn run(args: &[String]) -> anyhow::Result<()> {
    let config_path = match config_arg(args)? {
        Some(path) => path,
        None => default_config_path(),
    };
    let config = match Config::load(&config_path) {
        Ok(cfg) => {
            log::info!("Config loaded from {}", config_path.display());
            cfg
        }
        Err(e) => {
            log::warn!("Config load error ({e}), using defaults");
            Config::default()
        }
    };
    log::info!("Font: {} {}pt", config.font.family, config.font.size);

    let event_loop = create_event_loop().context("failed to create event loop")?;
    let mut app = App::new(WindowOptions::default(), config, &event_loop);
    let submitter = app.submitter();

    let labels = submitter.clone();
    app.set_grid_size_callback(move |columns, rows| {
        let queued = labels.submit(move |state| {
            let render_ms = state.last_render_duration().as_secs_f64() * 1000.0;
            let size = format!("{columns:3} {rows:3}");
            let grid = state.grid_mut();
            grid.print_at(0, 0, &size);
            grid.print_at(
                columns.saturating_sub(size.chars().count()),
                rows.saturating_sub(1),
                &size,
            );
            grid.print_at(0, 2, &format!("last render {render_ms:.3} ms"));
            grid.print_at(0, 4, "block > A  under > B");
            state.set_title(format!("glyphgrid {columns}x{rows}"));
        });
        if let Err(e) = queued {
            log::warn!("Could not queue size labels: {e}");
        }
    });

    let (id_tx, id_rx) = crossbeam_channel::bounded(1);
    submitter.submit(move |state| {
        let cursors = state.cursors_mut();
        cursors.add(Cursor::new(8, 4, CURSOR_COLOR, CursorType::Block));
        let underline = cursors.add(Cursor::new(19, 4, CURSOR_COLOR, CursorType::Under));
        let _ = id_tx.send(underline);
    })?;

    let flasher = submitter;
    thread::spawn(move || {
        let Ok(underline) = id_rx.recv() else {
            return;
        };
        loop {
            thread::sleep(FLASH_INTERVAL);
            let toggled = flasher.submit(move |state| {
                if let Some(cursor) = state.cursors_mut().get_mut(underline) {
                    cursor.visible = !cursor.visible;
                }
            });
            if toggled.is_err() {
                break;
            }
        }
    });

    app.run(event_loop)
}

/// Value of `--config <path>`, if given.
fn config_arg(args: &[String]) -> anyhow::Result<Option<PathBuf>> {
    let Some(pos) = args.iter().position(|a| a == "--config") else {
        return Ok(None);
    };
    let path = args
        .get(pos + 1)
        .context("--config requires a path argument")?;
    Ok(Some(PathBuf::from(path)))
}

/// Get the config file path (~/.config/glyphgrid/config.toml).
fn default_config_path() -> PathBuf {
    dirs_home()
        .join(".config")
        .join("glyphgrid")
        .join("config.toml")
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}
