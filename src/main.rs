use anyhow::Context;
use embassy_executor::{Executor, Spawner};
use embassy_time::Instant;
use env_logger::Builder;
use log::{LevelFilter, error, info};
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;

use crate::chan::SchedulerConfig;
use crate::log_capture::TeeLogger;
use crate::sim::{HostRequestChannel, Report, Scenario};

mod chan;
mod log_capture;
mod sim;
mod time_driver;

const USAGE: &str = "Usage: moonblokz-channel-scheduler <scenario.json> [--config <file.toml>] [--report <out.json>] [--speed <percent>]";

#[derive(Debug, PartialEq)]
struct CliArgs {
    scenario: PathBuf,
    config: Option<PathBuf>,
    report: Option<PathBuf>,
    speed: Option<u32>,
}

fn parse_args(args: &[String]) -> Result<CliArgs, String> {
    let mut scenario = None;
    let mut config = None;
    let mut report = None;
    let mut speed = None;

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" | "-c" => config = Some(PathBuf::from(iter.next().ok_or("--config needs a file")?)),
            "--report" | "-r" => report = Some(PathBuf::from(iter.next().ok_or("--report needs a file")?)),
            "--speed" | "-s" => {
                let value = iter.next().ok_or("--speed needs a percentage")?;
                speed = Some(value.parse::<u32>().map_err(|e| format!("Invalid speed '{}': {}", value, e))?);
            }
            option if option.starts_with('-') => return Err(format!("Unknown option {}", option)),
            path => {
                if scenario.is_some() {
                    return Err(format!("Unexpected argument {}", path));
                }
                scenario = Some(PathBuf::from(path));
            }
        }
    }

    Ok(CliArgs {
        scenario: scenario.ok_or("Missing scenario file")?,
        config,
        report,
        speed,
    })
}

fn init_logging() {
    let logger = Builder::new()
        .filter_level(LevelFilter::Info)
        .filter(Some("moonblokz_channel_scheduler"), LevelFilter::Debug)
        .parse_env("RUST_LOG")
        .build();
    let tee = TeeLogger::new(logger);
    let max_level = tee.filter();
    log_capture::init_log_capture();
    if log::set_logger(Box::leak(Box::new(tee))).is_ok() {
        log::set_max_level(max_level);
    }
}

fn embassy_init(spawner: Spawner, scenario: Scenario, config: SchedulerConfig, done: mpsc::Sender<anyhow::Result<Report>>) {
    let request_channel: &'static HostRequestChannel = Box::leak(Box::new(HostRequestChannel::new()));
    let requests = scenario.timeline();
    let start = Instant::now();
    let _ = spawner.spawn(sim::feeder_task(start, requests, request_channel.sender()));
    let _ = spawner.spawn(sim::engine_task(scenario, config, start, request_channel.receiver(), done));
}

fn run() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let cli = parse_args(&args).map_err(|e| anyhow::anyhow!("{}\n{}", e, USAGE))?;

    let config = match &cli.config {
        Some(path) => SchedulerConfig::load(path).map_err(anyhow::Error::msg)?,
        None => SchedulerConfig::default(),
    };
    let scenario = sim::load_scenario(&cli.scenario, &config)?;
    time_driver::set_speed_percent(cli.speed.unwrap_or(scenario.speed_percent));
    info!("Running {} at {}% speed", cli.scenario.display(), time_driver::speed_percent());

    let (done_tx, done_rx) = mpsc::channel();

    // Spawn Embassy executor on a dedicated background thread
    thread::Builder::new()
        .name("embassy-executor".to_string())
        .spawn(move || {
            // Leak the executor to satisfy the 'static lifetime required by run()
            let executor: &'static mut Executor = Box::leak(Box::new(Executor::new()));
            executor.run(|spawner| embassy_init(spawner, scenario, config, done_tx));
        })
        .context("Failed to spawn embassy thread")?;

    let report = done_rx.recv().context("Simulation stopped without a report")??;
    report.log_summary();
    if let Some(path) = &cli.report {
        report.write(path)?;
    }
    Ok(())
}

fn main() {
    init_logging();
    info!("Starting up");
    if let Err(e) = run() {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("moonblokz-channel-scheduler").chain(list.iter().copied()).map(String::from).collect()
    }

    #[test]
    fn parses_all_options() {
        let cli = parse_args(&args(&["run.json", "--config", "sched.toml", "--report", "out.json", "--speed", "400"])).unwrap();
        assert_eq!(
            cli,
            CliArgs {
                scenario: PathBuf::from("run.json"),
                config: Some(PathBuf::from("sched.toml")),
                report: Some(PathBuf::from("out.json")),
                speed: Some(400),
            }
        );
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(parse_args(&args(&[])).unwrap_err().contains("Missing scenario"));
        assert!(parse_args(&args(&["a.json", "b.json"])).is_err());
        assert!(parse_args(&args(&["a.json", "--speed", "fast"])).unwrap_err().contains("Invalid speed"));
        assert!(parse_args(&args(&["a.json", "--report"])).is_err());
        assert!(parse_args(&args(&["a.json", "--verbose"])).unwrap_err().contains("Unknown option"));
    }
}
