//! devsel - terminal host for the device selection panel
//!
//! Loads a device catalog, forwards type/search/toggle/select-all events into
//! the selection controller and prints the resulting tree.

mod command;
mod config;
mod render;

use anyhow::Result;
use clap::Parser;
use devsel_core::{DeviceRegistry, EventReceiver, SelectionController, SelectionEvent, TypeView};
use std::io::BufRead;
use std::path::PathBuf;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::command::Command;

#[derive(Parser, Debug)]
#[command(name = "devsel")]
#[command(about = "Select devices from a type/group/device hierarchy")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "devsel.toml")]
    config: PathBuf,

    /// Device file (TOML or JSON); overrides the configured source
    #[arg(short, long)]
    devices: Option<PathBuf>,

    /// Type tab to show ("all" for every device)
    #[arg(short = 't', long = "type")]
    device_type: Option<String>,

    /// Search keyword
    #[arg(short, long)]
    search: Option<String>,

    /// Comma separated device IDs to select
    #[arg(long, value_delimiter = ',')]
    select: Vec<String>,

    /// Toggle a device, as `<id>=on|off` (repeatable)
    #[arg(long)]
    toggle: Vec<String>,

    /// Check or uncheck every visible device
    #[arg(long)]
    all: Option<String>,

    /// Read commands from stdin after applying the flags
    #[arg(short, long)]
    interactive: bool,

    /// Write a default configuration file and exit
    #[arg(long)]
    write_config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    if let Some(path) = &args.write_config {
        config::save_default_config(path)?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    info!("devsel v{}", env!("CARGO_PKG_VERSION"));

    let mut config = config::load_config(&args.config)?;
    if let Some(path) = &args.devices {
        config.source.kind = config::SourceKind::File;
        config.source.path = Some(path.display().to_string());
    }

    let mut controller =
        SelectionController::with_capacity(DeviceRegistry::new(), config.events.capacity);
    let mut events = controller.subscribe();

    let source = config.device_source()?;
    if let Err(e) = controller.load(source.as_ref()) {
        log_events(&mut events);
        print!("{}", render::render_tree(&controller));
        return Err(e.into());
    }

    // Startup state: config first, flags on top
    let view = match &args.device_type {
        Some(t) if t.eq_ignore_ascii_case("all") => TypeView::All,
        Some(t) => TypeView::from_label(t),
        None => config.initial_view(),
    };
    controller.set_device_type(view);

    let initial = if args.select.is_empty() {
        &config.selection.devices
    } else {
        &args.select
    };
    if !initial.is_empty() {
        controller.set_selected_devices(initial);
    }

    let search = args.search.as_deref().unwrap_or(config.view.search.as_str());
    controller.set_search_text(search);

    for arg in &args.toggle {
        let (id, state) = arg
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("expected <id>=on|off, got {:?}", arg))?;
        let checked = command::parse_switch(state)?;
        command::apply(
            &mut controller,
            &Command::Toggle {
                id: id.to_string(),
                checked,
            },
        );
    }

    if let Some(state) = &args.all {
        controller.toggle_select_all(command::parse_switch(state)?);
    }
    log_events(&mut events);

    if args.interactive {
        run_interactive(&mut controller, &mut events)?;
    } else {
        print_view(&controller);
        let ids: Vec<_> = controller
            .get_selected_devices()
            .into_iter()
            .map(|d| d.0)
            .collect();
        println!("{}", ids.join(","));
    }

    Ok(())
}

fn run_interactive(
    controller: &mut SelectionController,
    events: &mut EventReceiver,
) -> Result<()> {
    print_view(controller);
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let cmd = match command::parse(&line) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => continue,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };

        match cmd {
            Command::Quit => break,
            Command::Help => println!("{}", command::HELP),
            Command::Tabs => println!("{}", render::render_tabs(controller)),
            Command::Show => print_view(controller),
            other => {
                command::apply(controller, &other);
                log_events(events);
                print_view(controller);
            }
        }
    }
    Ok(())
}

fn print_view(controller: &SelectionController) {
    print!("{}", render::render_tree(controller));
    println!("{}", render::render_status(controller));
}

fn log_events(events: &mut EventReceiver) {
    while let Ok(event) = events.try_recv() {
        match event {
            SelectionEvent::SelectionChanged(ids) => {
                info!(selected = ids.len(), "Selection changed")
            }
            SelectionEvent::DataLoadError(message) => tracing::error!("{}", message),
            other => debug!(event = ?other, "Controller event"),
        }
    }
}
