mod app;
mod compare;
mod config;
mod edit_service;
mod editor;
mod error;
mod flatten;
mod geometry;
mod history;
mod job;
mod model;
mod prompt;
mod upload;
mod workflow;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use eframe::egui;

use crate::app::RedlineApp;
use crate::config::Config;
use crate::edit_service::GeminiEditor;
use crate::upload::IncomingFile;
use crate::workflow::Workflow;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() > 2 || args.get(1).is_some_and(|a| a == "-h" || a == "--help") {
        eprintln!("Usage: redline-edit [image.png|jpg]");
        std::process::exit(1);
    }

    let config = Config::load();
    if config.api_key.is_none() {
        log::warn!("no API key configured; generate will fail until GEMINI_API_KEY is set");
    }
    let service = GeminiEditor::new(&config).context("building HTTP client")?;
    let mut workflow = Workflow::new(config, Arc::new(service)).context("loading note font")?;

    let image_path = args.get(1).map(PathBuf::from);
    if let Some(path) = &image_path {
        workflow.open(IncomingFile::from_path(path));
    }

    let title = match &image_path {
        Some(path) => format!(
            "redline-edit — {}",
            path.file_name().and_then(|n| n.to_str()).unwrap_or("")
        ),
        None => "redline-edit".to_owned(),
    };

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1200.0, 800.0])
            .with_title(&title)
            .with_drag_and_drop(true),
        ..Default::default()
    };

    eframe::run_native(
        &title,
        options,
        Box::new(move |_cc| Ok(Box::new(RedlineApp::new(workflow)))),
    )
    .map_err(|err| anyhow::anyhow!("failed to run eframe: {err}"))
}
