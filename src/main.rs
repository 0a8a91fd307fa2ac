//! CLI entry point: set up the configured virtual pins, replay a script of
//! live-control commands against simulated time, and print pin status.

use clap::Parser;
use std::path::PathBuf;

use virtual_pins::config::{self, Config};
use virtual_pins::gcode::GCodeCommand;
use virtual_pins::hardware::pin::AdcSampleConfig;
use virtual_pins::hardware::PinType;
use virtual_pins::scheduler::Reactor;
use virtual_pins::{LiteralTemplateEvaluator, SimReactor, VirtualPins};

type Chip = VirtualPins<SimReactor, LiteralTemplateEvaluator>;

/// Virtual pin simulator
#[derive(Parser, Debug)]
#[command(name = "virtual-pins-sim", about = "Run virtual pins against a simulated reactor.")]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, default_value = "virtual_pins.toml")]
    config: PathBuf,

    /// Script of commands, one per line: SET_VIRTUAL_PIN, ADVANCE TIME=<s>,
    /// SET_VARIABLE NAME=<value> or STATUS
    #[arg(short, long)]
    script: Option<PathBuf>,

    /// Extra command to run after the script (repeatable)
    #[arg(long = "command", number_of_values = 1)]
    commands: Vec<String>,

    /// Simulated seconds to run after the last command
    #[arg(long, default_value_t = 0.0)]
    run_for: f64,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: tracing::Level,
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .init();

    tracing::info!("Starting virtual pin simulator");
    tracing::info!("Loading configuration from: {}", cli.config.display());

    let config = config::load_config(&cli.config).map_err(|e| {
        tracing::error!("Failed to load config from '{}': {}", cli.config.display(), e);
        Box::new(e) as Box<dyn std::error::Error + Send + Sync + 'static>
    })?;

    let mut chip = build_chip(&config)?;
    chip.handle_connect();
    chip.handle_ready();

    let mut lines = Vec::new();
    if let Some(path) = &cli.script {
        lines.extend(std::fs::read_to_string(path)?.lines().map(str::to_string));
    }
    lines.extend(cli.commands.iter().cloned());
    for line in &lines {
        run_line(&mut chip, line);
    }

    let end = chip.reactor().monotonic() + cli.run_for;
    chip.run_until(end);
    print_status(&chip)?;
    Ok(())
}

fn build_chip(config: &Config) -> Result<Chip, Box<dyn std::error::Error + Send + Sync + 'static>> {
    let mut chip = VirtualPins::from_config(
        &config.virtual_pins,
        SimReactor::new(),
        LiteralTemplateEvaluator::new(),
    )?;
    for pin in &config.pins {
        let id = chip.setup_pin(&pin.pin_type, &pin.params())?;
        if chip.pin(id).pin_type() == PinType::Adc {
            let name = pin.name.clone();
            let adc = chip.pin_mut(id);
            adc.setup_adc_sample(AdcSampleConfig {
                sample_time: 1.0,
                ..AdcSampleConfig::default()
            })?;
            adc.setup_adc_callback(move |samples| {
                for (time, value) in samples {
                    tracing::info!("ADC {} @ {:.3}: {:.4}", name, time, value);
                }
            })?;
        }
    }
    tracing::info!("Configured {} virtual pins", config.pins.len());
    Ok(chip)
}

fn run_line(chip: &mut Chip, line: &str) {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
        return;
    }
    let gcmd = match GCodeCommand::parse(line) {
        Ok(gcmd) => gcmd,
        Err(e) => {
            tracing::error!("{}: {}", line, e);
            return;
        }
    };
    match gcmd.command.as_str() {
        "ADVANCE" => match gcmd.get_float("TIME", Some(0.0), Some(0.0), None) {
            Ok(seconds) => {
                let until = chip.reactor().monotonic() + seconds.unwrap_or(0.0);
                chip.run_until(until);
            }
            Err(e) => tracing::error!("{}: {}", line, e),
        },
        "SET_VARIABLE" => {
            for (name, value) in &gcmd.parameters {
                chip.templates_mut().set_variable(name, value.clone());
            }
            chip.poll_templates();
        }
        "STATUS" => {
            if let Err(e) = print_status(chip) {
                tracing::error!("Failed to render status: {}", e);
            }
        }
        _ => {
            if let Err(e) = chip.run_command(line) {
                tracing::error!("{}: {}", line, e);
            }
        }
    }
}

fn print_status(chip: &Chip) -> Result<(), serde_json::Error> {
    let now = chip.reactor().monotonic();
    let status = chip.get_status(now);
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
