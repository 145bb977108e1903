//! Operator console – slash commands read line by line from stdin.
//!
//!   /load <name> <dof>          register a controller (starts disabled)
//!   /unload <name>              remove a controller
//!   /push <name> <t1> <t2> ...  write one torque sample for a controller
//!   /enable | /disable          gate the mux output
//!   /toggle +a +b -c            enable a and b, disable c
//!   /calibrate <q1> <q2> ...    set the encoder reference
//!   /threshold <kind> <value>   velocity-warning | velocity-fault | torque-warning | torque-fault
//!   /status                     lifecycle, controllers and latest joint state
//!   /help
//!   /quit | /exit

use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};

use armature_hal::SafetyThreshold;
use armature_middleware::{FlowStatus, OutputPort};
use armature_types::{ArmError, JointStateSnapshot, JointVector};
use colored::Colorize;

use crate::system::Controls;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Load { name: String, dof: usize },
    Unload(String),
    Push { name: String, torques: Vec<f64> },
    Enable,
    Disable,
    Toggle { enable: Vec<String>, disable: Vec<String> },
    Calibrate(Vec<f64>),
    Threshold { kind: SafetyThreshold, value: f64 },
    Status,
    Help,
    Quit,
}

/// Parse one console line.
pub fn parse(line: &str) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Err("empty command".into());
    };
    let args: Vec<&str> = words.collect();

    let command = match (head, args.as_slice()) {
        ("/load", [name, dof]) => Command::Load {
            name: name.to_string(),
            dof: dof
                .parse()
                .map_err(|_| format!("'{dof}' is not a joint count"))?,
        },
        ("/unload", [name]) => Command::Unload(name.to_string()),
        ("/push", [name, values @ ..]) if !values.is_empty() => Command::Push {
            name: name.to_string(),
            torques: parse_numbers(values)?,
        },
        ("/enable", []) => Command::Enable,
        ("/disable", []) => Command::Disable,
        ("/toggle", names) if !names.is_empty() => {
            let mut enable = Vec::new();
            let mut disable = Vec::new();
            for n in names {
                if let Some(name) = n.strip_prefix('+') {
                    enable.push(name.to_string());
                } else if let Some(name) = n.strip_prefix('-') {
                    disable.push(name.to_string());
                } else {
                    return Err(format!("'{n}' must start with + or -"));
                }
            }
            Command::Toggle { enable, disable }
        }
        ("/calibrate", values) if !values.is_empty() => Command::Calibrate(parse_numbers(values)?),
        ("/threshold", [kind, value]) => Command::Threshold {
            kind: kind.parse().map_err(|e: ArmError| e.to_string())?,
            value: value
                .parse()
                .map_err(|_| format!("'{value}' is not a number"))?,
        },
        ("/status", []) => Command::Status,
        ("/help", []) => Command::Help,
        ("/quit" | "/exit", []) => Command::Quit,
        (
            "/load" | "/unload" | "/push" | "/enable" | "/disable" | "/toggle" | "/calibrate"
            | "/threshold" | "/status" | "/help",
            _,
        ) => return Err(format!("wrong arguments for {head}, see /help")),
        (other, _) => return Err(format!("unknown command '{other}'")),
    };
    Ok(command)
}

fn parse_numbers(values: &[&str]) -> Result<Vec<f64>, String> {
    values
        .iter()
        .map(|v| v.parse::<f64>().map_err(|_| format!("'{v}' is not a number")))
        .collect()
}

/// Console state that outlives a single command.
pub struct Console {
    controls: Controls,
    /// One output per loaded controller, standing in for the controller.
    controllers: BTreeMap<String, OutputPort<JointVector>>,
}

impl Console {
    pub fn new(controls: Controls) -> Self {
        Self {
            controls,
            controllers: BTreeMap::new(),
        }
    }

    /// Read commands until EOF or `/quit`.
    pub fn run(mut self) {
        let stdin = io::stdin();
        let mut stdout = io::stdout();
        loop {
            print!("{} ", "armature>".bold().cyan());
            stdout.flush().ok();

            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    eprintln!("{}: {e}", "Read error".red());
                    break;
                }
            }
            if line.trim().is_empty() {
                continue;
            }

            match parse(&line) {
                Ok(Command::Quit) => {
                    println!("{}", "Shutting down.".green());
                    break;
                }
                Ok(command) => {
                    if let Err(e) = self.execute(command) {
                        println!("{} {e}", "✗".red().bold());
                    }
                }
                Err(e) => println!("{} {e}", "✗".red().bold()),
            }
        }
    }

    fn execute(&mut self, command: Command) -> Result<(), ArmError> {
        let rt = self.controls.runtime.clone();
        let mux = &self.controls.mux;
        let driver = &self.controls.driver;
        match command {
            Command::Load { name, dof } => {
                let port = OutputPort::new(format!("console.{name}"));
                rt.block_on(async {
                    mux.load(name.clone(), dof).await?;
                    mux.connect_controller(name.clone(), port.link()).await
                })?;
                self.controllers.insert(name.clone(), port);
                ok(format!("loaded {name} ({dof} DOF, disabled)"));
            }
            Command::Unload(name) => {
                let removed = rt.block_on(mux.unload(name.clone()))?;
                self.controllers.remove(&name);
                if removed {
                    ok(format!("unloaded {name}"));
                } else {
                    println!("  {} was not loaded", name.yellow());
                }
            }
            Command::Push { name, torques } => match self.controllers.get(&name) {
                Some(port) => {
                    port.write(JointVector::from(torques));
                    ok(format!("sample written to {name}"));
                }
                None => println!("  {} is not loaded", name.yellow()),
            },
            Command::Enable => {
                rt.block_on(mux.enable())?;
                ok("mux enabled".into());
            }
            Command::Disable => {
                rt.block_on(mux.disable())?;
                ok("mux disabled, transmitting zeros".into());
            }
            Command::Toggle { enable, disable } => {
                rt.block_on(mux.toggle(enable, disable))?;
                ok("controllers toggled".into());
            }
            Command::Calibrate(q) => {
                rt.block_on(driver.calibrate(JointVector::from(q)))?;
                ok("encoders calibrated".into());
            }
            Command::Threshold { kind, value } => {
                rt.block_on(driver.set_safety_threshold(kind, value))?;
                ok(format!("{kind} threshold set to {value}"));
            }
            Command::Status => self.status()?,
            Command::Help => help(),
            Command::Quit => {}
        }
        Ok(())
    }

    fn status(&mut self) -> Result<(), ArmError> {
        let rt = self.controls.runtime.clone();
        let (driver_state, mux_state, enabled, controllers) = rt.block_on(async {
            Ok::<_, ArmError>((
                self.controls.driver.state().await?,
                self.controls.mux.state().await?,
                self.controls.mux.is_enabled().await?,
                self.controls.mux.controllers().await?,
            ))
        })?;

        println!();
        println!("{}", "Status".bold().underline());
        println!("  driver : {}", driver_state.to_string().yellow());
        println!(
            "  mux    : {} ({})",
            mux_state.to_string().yellow(),
            if enabled { "enabled".green() } else { "disabled".red() }
        );
        if controllers.is_empty() {
            println!("  controllers : {}", "none".dimmed());
        }
        for c in controllers {
            let flag = if c.enabled { "on".green() } else { "off".dimmed() };
            println!("  • {} [{} DOF] {}", c.name.bold(), c.dof, flag);
        }

        let mut snapshot = JointStateSnapshot::new(Vec::new());
        match self.controls.driver_state.read(&mut snapshot) {
            FlowStatus::NoData => println!("  joint state : {}", "no data yet".dimmed()),
            _ => print_snapshot("arm", &snapshot),
        }
        if self.controls.mux_state.read(&mut snapshot) != FlowStatus::NoData {
            print_snapshot("mux", &snapshot);
        }
        println!();
        Ok(())
    }
}

fn print_snapshot(label: &str, snapshot: &JointStateSnapshot) {
    match serde_json::to_string(snapshot) {
        Ok(json) => println!("  {label} : {}", json.dimmed()),
        Err(e) => println!("  {label} : {}", e.to_string().red()),
    }
}

fn ok(message: String) {
    println!("{} {message}", "✓".green().bold());
}

fn help() {
    println!();
    println!("{}", "Armature Commands".bold().underline());
    let rows = [
        ("/load <name> <dof>", "register a controller (starts disabled)"),
        ("/unload <name>", "remove a controller"),
        ("/push <name> <t...>", "write one torque sample for a controller"),
        ("/enable  /disable", "gate the mux output"),
        ("/toggle +a -b", "enable a, disable b"),
        ("/calibrate <q...>", "set the encoder reference"),
        ("/threshold <kind> <v>", "set a pendant safety threshold"),
        ("/status", "lifecycle, controllers and joint state"),
        ("/quit  /exit", "stop both components and exit"),
    ];
    for (cmd, what) in rows {
        println!("  {:<24} – {what}", cmd.bold().cyan());
    }
    println!();
}
