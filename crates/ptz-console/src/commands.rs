//! Console command parsing

use ptz_protocol::{FocusDirection, PanTiltDirection, PtzCommand, ZoomDirection};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const HELP: &str = "\
commands:
  move <dir> [ms]       pan/tilt (up, down, left, right, up-left, ...)
  fast <dir> [ms]       pan/tilt at double speed
  zoom in|out [ms]
  focus near|far [ms]
  af on|off             auto-focus
  preset <n>            recall preset
  save <n>              store preset
  camera <n>            switch camera (1-based)
  snapshot <path>       save the latest frame
  status
  quit";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown command {0:?} (try \"help\")")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("not a number: {0:?}")]
    Number(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Move {
        direction: PanTiltDirection,
        fast: bool,
        hold: Option<Duration>,
    },
    Zoom {
        direction: ZoomDirection,
        hold: Option<Duration>,
    },
    Focus {
        direction: FocusDirection,
        hold: Option<Duration>,
    },
    AutoFocus(bool),
    PresetRecall(u8),
    PresetSave(u8),
    /// 0-based camera index
    Camera(usize),
    Snapshot(PathBuf),
    Status,
    Help,
    Quit,
}

/// Speeds and hold time applied to momentary controls
#[derive(Debug, Clone, Copy)]
pub struct MotionDefaults {
    pub pan_speed: u8,
    pub tilt_speed: u8,
    pub hold: Duration,
}

/// A camera command, plus how long to hold it before sending its stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Control {
    pub action: PtzCommand,
    pub hold: Option<Duration>,
}

impl ConsoleCommand {
    /// Camera command this console command drives, if any
    pub fn control(&self, defaults: &MotionDefaults) -> Option<Control> {
        let momentary = |action, hold: &Option<Duration>| Control {
            action,
            hold: Some(hold.unwrap_or(defaults.hold)),
        };
        let once = |action| Control { action, hold: None };

        let control = match self {
            ConsoleCommand::Move { direction, fast, hold } => {
                let factor = if *fast { 2 } else { 1 };
                momentary(
                    PtzCommand::Move {
                        direction: *direction,
                        pan_speed: defaults.pan_speed.saturating_mul(factor),
                        tilt_speed: defaults.tilt_speed.saturating_mul(factor),
                    },
                    hold,
                )
            }
            ConsoleCommand::Zoom { direction, hold } => {
                momentary(PtzCommand::Zoom { direction: *direction }, hold)
            }
            ConsoleCommand::Focus { direction, hold } => {
                momentary(PtzCommand::Focus { direction: *direction }, hold)
            }
            ConsoleCommand::AutoFocus(auto) => once(PtzCommand::SetFocusMode { auto: *auto }),
            ConsoleCommand::PresetRecall(index) => once(PtzCommand::PresetRecall { index: *index }),
            ConsoleCommand::PresetSave(index) => once(PtzCommand::PresetSet { index: *index }),
            _ => return None,
        };
        Some(control)
    }
}

fn number<T: std::str::FromStr>(word: &str) -> Result<T, ParseError> {
    word.parse().map_err(|_| ParseError::Number(word.to_string()))
}

fn hold(word: Option<&str>) -> Result<Option<Duration>, ParseError> {
    word.map(|ms| number(ms).map(Duration::from_millis)).transpose()
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Result<Option<ConsoleCommand>, ParseError> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((&verb, rest)) = words.split_first() else {
        return Ok(None);
    };

    let command = match (verb.to_ascii_lowercase().as_str(), rest) {
        (verb @ ("move" | "fast"), [dir, extra @ ..]) if extra.len() <= 1 => {
            let direction = PanTiltDirection::from_name(dir)
                .ok_or(ParseError::Usage("move|fast <dir> [ms]"))?;
            ConsoleCommand::Move {
                direction,
                fast: verb == "fast",
                hold: hold(extra.first().copied())?,
            }
        }
        ("zoom", [dir, extra @ ..]) if extra.len() <= 1 => {
            let direction = match dir.to_ascii_lowercase().as_str() {
                "in" | "tele" => ZoomDirection::In,
                "out" | "wide" => ZoomDirection::Out,
                _ => return Err(ParseError::Usage("zoom in|out [ms]")),
            };
            ConsoleCommand::Zoom {
                direction,
                hold: hold(extra.first().copied())?,
            }
        }
        ("focus", [dir, extra @ ..]) if extra.len() <= 1 => {
            let direction = match dir.to_ascii_lowercase().as_str() {
                "near" => FocusDirection::Near,
                "far" => FocusDirection::Far,
                _ => return Err(ParseError::Usage("focus near|far [ms]")),
            };
            ConsoleCommand::Focus {
                direction,
                hold: hold(extra.first().copied())?,
            }
        }
        ("af", [mode]) => match mode.to_ascii_lowercase().as_str() {
            "on" | "auto" => ConsoleCommand::AutoFocus(true),
            "off" | "manual" => ConsoleCommand::AutoFocus(false),
            _ => return Err(ParseError::Usage("af on|off")),
        },
        ("preset", [n]) => ConsoleCommand::PresetRecall(number(n)?),
        ("save", [n]) => ConsoleCommand::PresetSave(number(n)?),
        ("camera", [n]) => match number::<usize>(n)? {
            0 => return Err(ParseError::Usage("camera <n>, counting from 1")),
            n => ConsoleCommand::Camera(n - 1),
        },
        ("snapshot", [path]) => ConsoleCommand::Snapshot(PathBuf::from(path)),
        ("status", []) => ConsoleCommand::Status,
        ("help" | "?", []) => ConsoleCommand::Help,
        ("quit" | "exit", []) => ConsoleCommand::Quit,
        ("move" | "fast", _) => return Err(ParseError::Usage("move|fast <dir> [ms]")),
        ("zoom", _) => return Err(ParseError::Usage("zoom in|out [ms]")),
        ("focus", _) => return Err(ParseError::Usage("focus near|far [ms]")),
        ("af", _) => return Err(ParseError::Usage("af on|off")),
        ("preset" | "save", _) => return Err(ParseError::Usage("preset|save <n>")),
        ("camera", _) => return Err(ParseError::Usage("camera <n>")),
        ("snapshot", _) => return Err(ParseError::Usage("snapshot <path>")),
        _ => return Err(ParseError::Unknown(verb.to_string())),
    };
    Ok(Some(command))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULTS: MotionDefaults = MotionDefaults {
        pan_speed: 7,
        tilt_speed: 7,
        hold: Duration::from_millis(250),
    };

    #[test]
    fn test_blank_line() {
        assert_eq!(parse_command("   "), Ok(None));
    }

    #[test]
    fn test_move_and_fast() {
        let cmd = parse_command("move up-left").unwrap().unwrap();
        let control = cmd.control(&DEFAULTS).unwrap();
        assert_eq!(
            control.action,
            PtzCommand::Move {
                direction: PanTiltDirection::UpLeft,
                pan_speed: 7,
                tilt_speed: 7
            }
        );
        assert_eq!(control.hold, Some(Duration::from_millis(250)));
        assert_eq!(control.action.stop_counterpart(), Some(PtzCommand::StopMove));

        let fast = parse_command("FAST right 1000").unwrap().unwrap();
        let control = fast.control(&DEFAULTS).unwrap();
        assert_eq!(
            control.action,
            PtzCommand::Move {
                direction: PanTiltDirection::Right,
                pan_speed: 14,
                tilt_speed: 14
            }
        );
        assert_eq!(control.hold, Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_zoom_focus_af() {
        let zoom = parse_command("zoom out").unwrap().unwrap().control(&DEFAULTS).unwrap();
        assert_eq!(zoom.action, PtzCommand::Zoom { direction: ZoomDirection::Out });

        let focus = parse_command("focus near 50").unwrap().unwrap().control(&DEFAULTS).unwrap();
        assert_eq!(focus.action.stop_counterpart(), Some(PtzCommand::StopFocus));
        assert_eq!(focus.hold, Some(Duration::from_millis(50)));

        let af = parse_command("af off").unwrap().unwrap().control(&DEFAULTS).unwrap();
        assert_eq!(af.action, PtzCommand::SetFocusMode { auto: false });
        assert_eq!(af.hold, None);
    }

    #[test]
    fn test_presets_and_camera() {
        assert_eq!(parse_command("preset 3"), Ok(Some(ConsoleCommand::PresetRecall(3))));
        assert_eq!(parse_command("save 12"), Ok(Some(ConsoleCommand::PresetSave(12))));
        assert_eq!(parse_command("camera 2"), Ok(Some(ConsoleCommand::Camera(1))));
        assert!(matches!(parse_command("camera 0"), Err(ParseError::Usage(_))));
        assert!(matches!(parse_command("preset 300"), Err(ParseError::Number(_))));
        assert_eq!(ConsoleCommand::Camera(1).control(&DEFAULTS), None);
    }

    #[test]
    fn test_errors() {
        assert_eq!(parse_command("dance"), Err(ParseError::Unknown("dance".into())));
        assert!(matches!(parse_command("move sideways"), Err(ParseError::Usage(_))));
        assert!(matches!(parse_command("zoom"), Err(ParseError::Usage(_))));
        assert!(matches!(parse_command("move up soon"), Err(ParseError::Number(_))));
        assert!(matches!(parse_command("status now"), Err(ParseError::Unknown(_))));
    }

    #[test]
    fn test_misc() {
        assert_eq!(
            parse_command("snapshot /tmp/a.png"),
            Ok(Some(ConsoleCommand::Snapshot(PathBuf::from("/tmp/a.png"))))
        );
        assert_eq!(parse_command("quit"), Ok(Some(ConsoleCommand::Quit)));
        assert_eq!(parse_command("status"), Ok(Some(ConsoleCommand::Status)));
    }
}
