use std::env;

use anyhow::{Context, Result};
use log::info;

use compute_raytracer::config::{Command, Config, USAGE};
use compute_raytracer::logging::init_logging;
use compute_raytracer::shaders::ShaderSources;

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let config = match Config::from_args(env::args().skip(1)).context(USAGE)? {
        Command::Help => {
            println!("{USAGE}");
            return Ok(());
        }
        Command::Run(config) => config,
    };
    init_logging(config.log_filter.as_deref());

    let shaders = match config.shader_dir.as_deref() {
        Some(dir) => {
            info!("loading shaders from {}", dir.display());
            ShaderSources::load_from_dir(dir).context("failed to load shaders")?
        }
        None => ShaderSources::builtin(),
    };

    compute_raytracer::app::run(config, shaders)
}
