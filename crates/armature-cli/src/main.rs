//! `armature` – operator entry point for the arm driver stack.
//!
//! 1. Loads `~/.armature/config.toml` (or the path given as the first
//!    argument), writing the defaults on first run.
//! 2. Brings up a simulated WAM driver and a controller mux wired to it.
//! 3. Drops the operator into the command console.
//! 4. On `/quit`, EOF or **Ctrl-C**, stops and cleans up both components so
//!    the arm is left idle and the device closed.

mod config;
mod console;
mod system;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc;
use std::thread;

use armature_components::telemetry::{TelemetryConfig, init_tracing};
use colored::Colorize;
use tracing::warn;

use crate::system::ArmSystem;

fn main() -> ExitCode {
    let _telemetry = init_tracing(&TelemetryConfig::from_env("armature"));

    print_banner();

    // ── Configuration ─────────────────────────────────────────────────────
    let explicit = std::env::args().nth(1).map(PathBuf::from);
    let path = explicit.clone().unwrap_or_else(config::default_path);
    let cfg = match config::load_from(&path) {
        Ok(Some(cfg)) => {
            println!("  Config loaded from {}", path.display().to_string().bold());
            cfg
        }
        Ok(None) if explicit.is_some() => {
            println!("{}: {} does not exist", "Config error".red(), path.display());
            return ExitCode::FAILURE;
        }
        Ok(None) => {
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            match config::save_to(&config::Config::default(), &path) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    path.display().to_string().bold()
                ),
                Err(e) => println!("{}: {e}", "Error saving config".red()),
            }
            cfg
        }
        Err(e) => {
            println!("{}: {e}", "Config error".red());
            return ExitCode::FAILURE;
        }
    };

    // ── Bring-up ──────────────────────────────────────────────────────────
    let (system, controls) = match ArmSystem::start(&cfg) {
        Ok(started) => started,
        Err(e) => {
            println!("{} {e}", "✗ Bring-up failed:".red().bold());
            return ExitCode::FAILURE;
        }
    };
    println!(
        "  {} {}-DOF arm on {} at {} Hz",
        "✓".green().bold(),
        cfg.driver.degrees_of_freedom,
        cfg.driver.device_identifier.bold(),
        cfg.host.rate_hz
    );

    // ── Quit sources: Ctrl-C and the console ──────────────────────────────
    let (quit_tx, quit_rx) = mpsc::channel::<()>();
    let ctrlc_tx = quit_tx.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – idling the arm …".yellow().bold());
        let _ = ctrlc_tx.send(());
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler");
    }

    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());
    // Detached: a thread blocked on stdin cannot be joined after Ctrl-C.
    thread::spawn(move || {
        console::Console::new(controls).run();
        let _ = quit_tx.send(());
    });

    let _ = quit_rx.recv();
    system.shutdown();
    println!("{}", "  ✓ Arm idle, device closed.".green());
    ExitCode::SUCCESS
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"    __ _ _ __ _ __ ___   __ _| |_ _   _ _ __ ___"#.bold().cyan());
    println!("{}", r#"   / _` | '__| '_ ` _ \ / _` | __| | | | '__/ _ \"#.bold().cyan());
    println!("{}", r#"  | (_| | |  | | | | | | (_| | |_| |_| | | |  __/"#.bold().cyan());
    println!("{}", r#"   \__,_|_|  |_| |_| |_|\__,_|\__|\__,_|_|  \___|"#.bold().cyan());
    println!();
    println!("  {}", "WAM driver and controller mux".dimmed());
    println!();
}
