//! Command line parsing

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use fleetscope_core::reconcile::StatusFilter;
use fleetscope_core::telemetry::VehicleStatus;
use fleetscope_core::track::HistoryRange;

pub const USAGE: &str = "\
Usage:
  fleetscope-console live [--config PATH] [--demo] [--filter running,idle,...]
  fleetscope-console replay <vehicle> [--from TIME] [--to TIME] [--speed N]
                            [--config PATH] [--demo]

TIME is epoch milliseconds or an RFC 3339 date-time. --to defaults to now,
--from to one hour before --to.

Render events are written to stdout as JSON lines; logs go to stderr
(filter with RUST_LOG).";

/// Options shared by every subcommand
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Common {
    pub config: Option<PathBuf>,
    pub demo: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Live {
        common: Common,
        filter: Option<StatusFilter>,
    },
    Replay {
        common: Common,
        vehicle_id: String,
        range: HistoryRange,
        speed: Option<u32>,
    },
    Help,
}

/// Parse arguments (without the program name)
pub fn parse<I>(args: I, now: DateTime<Utc>) -> Result<Command>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let Some(subcommand) = args.next() else {
        return Ok(Command::Help);
    };

    let mut common = Common::default();
    let mut filter = None;
    let mut from = None;
    let mut to = None;
    let mut speed = None;
    let mut positional = Vec::new();
    // flags that only mean something to one subcommand
    let mut replay_only = None;
    let mut live_only = None;

    while let Some(arg) = args.next() {
        let mut value = |flag: &str| args.next().ok_or_else(|| anyhow!("{flag} needs a value"));
        match arg.as_str() {
            "--config" => common.config = Some(PathBuf::from(value("--config")?)),
            "--demo" => common.demo = true,
            "--filter" => {
                filter = Some(parse_filter(&value("--filter")?)?);
                live_only = live_only.or(Some("--filter"));
            }
            "--from" => {
                from = Some(parse_time(&value("--from")?)?);
                replay_only = replay_only.or(Some("--from"));
            }
            "--to" => {
                to = Some(parse_time(&value("--to")?)?);
                replay_only = replay_only.or(Some("--to"));
            }
            "--speed" => {
                let text = value("--speed")?;
                speed = Some(text.parse().with_context(|| format!("invalid speed '{text}'"))?);
                replay_only = replay_only.or(Some("--speed"));
            }
            "-h" | "--help" => return Ok(Command::Help),
            flag if flag.starts_with("--") => bail!("unknown option {flag}"),
            _ => positional.push(arg),
        }
    }

    match subcommand.as_str() {
        "live" => {
            if let Some(extra) = positional.first() {
                bail!("unexpected argument '{extra}'");
            }
            if let Some(flag) = replay_only {
                bail!("{flag} is only valid for replay");
            }
            Ok(Command::Live { common, filter })
        }
        "replay" => {
            let mut positional = positional.into_iter();
            let vehicle_id = positional
                .next()
                .ok_or_else(|| anyhow!("replay needs a vehicle id"))?;
            if let Some(extra) = positional.next() {
                bail!("unexpected argument '{extra}'");
            }
            if let Some(flag) = live_only {
                bail!("{flag} is only valid for live");
            }

            let to_ms = to.unwrap_or_else(|| now.timestamp_millis());
            let from_ms =
                from.unwrap_or(to_ms.saturating_sub(Duration::hours(1).num_milliseconds()));
            let range = HistoryRange::new(from_ms, to_ms)
                .ok_or_else(|| anyhow!("--from ({from_ms}) is after --to ({to_ms})"))?;

            Ok(Command::Replay {
                common,
                vehicle_id,
                range,
                speed,
            })
        }
        "help" | "-h" | "--help" => Ok(Command::Help),
        other => bail!("unknown command '{other}'"),
    }
}

fn parse_filter(text: &str) -> Result<StatusFilter> {
    text.split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.parse::<VehicleStatus>().map_err(|e| anyhow!(e)))
        .collect()
}

fn parse_time(text: &str) -> Result<i64> {
    if let Ok(ms) = text.parse::<i64>() {
        return Ok(ms);
    }
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.timestamp_millis())
        .with_context(|| format!("invalid time '{text}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn args(line: &str) -> Vec<String> {
        line.split_whitespace().map(String::from).collect()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_live_with_filter() {
        let command = parse(args("live --demo --filter running,no-data"), now()).unwrap();
        assert_eq!(
            command,
            Command::Live {
                common: Common {
                    config: None,
                    demo: true,
                },
                filter: Some(
                    [VehicleStatus::Running, VehicleStatus::NoData]
                        .into_iter()
                        .collect()
                ),
            }
        );
    }

    #[test]
    fn test_replay_defaults_to_last_hour() {
        let command = parse(args("replay KA-01 --speed 4"), now()).unwrap();
        let Command::Replay {
            vehicle_id,
            range,
            speed,
            ..
        } = command
        else {
            panic!("expected replay");
        };
        assert_eq!(vehicle_id, "KA-01");
        assert_eq!(speed, Some(4));
        assert_eq!(range.to_ms, now().timestamp_millis());
        assert_eq!(range.span_ms(), 3_600_000);
    }

    #[test]
    fn test_replay_explicit_range() {
        let command = parse(
            args("replay KA-01 --from 2024-03-01T08:00:00Z --to 1709287200000 --config fleet.json"),
            now(),
        )
        .unwrap();
        let Command::Replay { common, range, .. } = command else {
            panic!("expected replay");
        };
        assert_eq!(common.config, Some(PathBuf::from("fleet.json")));
        assert_eq!(range.from_ms, 1_709_280_000_000);
        assert_eq!(range.to_ms, 1_709_287_200_000);
    }

    #[test]
    fn test_errors() {
        assert!(parse(args("replay"), now()).is_err());
        assert!(parse(args("replay A --from 10 --to 5"), now()).is_err());
        assert!(parse(args("live --filter flying"), now()).is_err());
        assert!(parse(args("live --speed"), now()).is_err());
        assert!(parse(args("teleport"), now()).is_err());
        assert_eq!(parse(Vec::new(), now()).unwrap(), Command::Help);
    }

    #[test]
    fn test_flags_for_the_other_subcommand_are_rejected() {
        let err = parse(args("live --speed 4"), now()).unwrap_err();
        assert_eq!(err.to_string(), "--speed is only valid for replay");
        assert!(parse(args("live --from 10"), now()).is_err());
        assert!(parse(args("live --to 10"), now()).is_err());

        let err = parse(args("replay KA-01 --filter idle"), now()).unwrap_err();
        assert_eq!(err.to_string(), "--filter is only valid for live");
    }

    #[test]
    fn test_extreme_times_do_not_overflow() {
        let command = parse(args(&format!("replay KA-01 --to {}", i64::MIN)), now()).unwrap();
        let Command::Replay { range, .. } = command else {
            panic!("expected replay");
        };
        assert_eq!(range.from_ms, i64::MIN);
        assert_eq!(range.to_ms, i64::MIN);

        let command = parse(
            args(&format!("replay KA-01 --from {} --to {}", i64::MIN, i64::MAX)),
            now(),
        )
        .unwrap();
        let Command::Replay { range, .. } = command else {
            panic!("expected replay");
        };
        assert_eq!(range.span_ms(), i64::MAX);
    }
}
