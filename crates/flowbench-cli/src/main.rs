//! Terminal operator console for the waterflow bench engine.
//!
//! Connects to the rig, runs the bring-up handshake and starts the
//! engine, then accepts commands on stdin while telemetry prints as it
//! arrives:
//!
//! ```text
//! toggle <pins>         one-off valve toggle, e.g. `toggle 135`
//! preset <pins> <secs>  timed session: toggle, wait, toggle back
//! cancel                end the running preset early
//! quit
//! ```

use std::collections::BTreeMap;
use std::io::{self, BufRead};
use std::thread;

use anyhow::{bail, Context, Result};
use flowbench_core::engine::{handshake, EngineEvent, SerialEngine, DEFAULT_HANDSHAKE_ATTEMPTS};
use flowbench_core::protocol::{list_ports, Connection, ConnectionConfig};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let port = match std::env::args().nth(1) {
        Some(port) => port,
        None => {
            let ports = list_ports();
            if ports.is_empty() {
                bail!("no serial ports available; plug in the bench before starting");
            }
            eprintln!("available ports:");
            for p in &ports {
                eprintln!("  {}  {}", p.name, p.description.as_deref().unwrap_or(""));
            }
            bail!("usage: flowbench <port>");
        }
    };

    let mut conn = Connection::new(ConnectionConfig {
        port_name: port.clone(),
        ..Default::default()
    });
    handshake(&mut conn, DEFAULT_HANDSHAKE_ATTEMPTS)
        .with_context(|| format!("bring-up failed on {port}"))?;
    println!("connected to {port}");

    let (engine, events) = SerialEngine::start(conn);

    // Display state (valve states, last pressures) lives here, not in the
    // engine: it is rebuilt from telemetry events alone.
    let printer = thread::spawn(move || {
        let mut readings: BTreeMap<String, String> = BTreeMap::new();
        for event in events {
            match event {
                EngineEvent::Line(line) => println!("<- {line}"),
                EngineEvent::Telemetry(reading) => {
                    readings.insert(reading.destination(), reading.value().to_string());
                }
                EngineEvent::PresetStarted { pins, duration } => {
                    println!("** preset started: pins {pins}, {:.1}s", duration.as_secs_f64());
                }
                EngineEvent::PresetEnded => {
                    print!("** preset ended;");
                    for (dest, value) in &readings {
                        print!(" {dest}={value}");
                    }
                    println!();
                }
                EngineEvent::Fault(message) => {
                    eprintln!("!! engine fault: {message} (reconnect to continue)");
                }
                EngineEvent::Cleanup => break,
            }
        }
    });

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("stdin read failed")?;
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("toggle") => match parts.next() {
                Some(pins) => {
                    if let Err(e) = engine.send_toggle(Some(pins)) {
                        eprintln!("rejected: {e}");
                    }
                }
                None => eprintln!("usage: toggle <pins>"),
            },
            Some("preset") => match (parts.next(), parts.next()) {
                (Some(pins), Some(secs)) => {
                    if let Err(e) = engine.start_preset(pins, secs) {
                        eprintln!("rejected: {e}");
                    }
                }
                _ => eprintln!("usage: preset <pins> <seconds>"),
            },
            Some("cancel") => engine.cancel_preset(),
            Some("quit") | Some("exit") => break,
            Some(other) => eprintln!("unknown command: {other}"),
            None => {}
        }
    }

    engine.shutdown();
    let _ = printer.join();
    Ok(())
}
