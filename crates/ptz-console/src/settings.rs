//! Operator settings
//!
//! Layered lowest to highest: built-in defaults, the optional TOML file,
//! `PTZ_*` environment variables, then command-line flags.

use camera_registry::RegistrySettings;
use camera_session::SessionSettings;
use clap::Parser;
use config::{Config, ConfigError, Environment, File};
use frame_source::StreamConfig;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Headless PTZ camera console: control from stdin, live preview in the background")]
pub struct Args {
    /// Settings file (TOML); missing is fine
    #[arg(long, default_value = "ptz-console.toml")]
    pub config: PathBuf,

    /// Camera list (JSON)
    #[arg(long)]
    pub cameras: Option<PathBuf>,

    /// Pan speed for normal moves ("fast" doubles it)
    #[arg(long)]
    pub pan_speed: Option<u8>,

    /// Tilt speed for normal moves ("fast" doubles it)
    #[arg(long)]
    pub tilt_speed: Option<u8>,

    /// Preview refresh rate in Hz
    #[arg(long)]
    pub display_hz: Option<u32>,

    /// Default hold time for momentary controls, in ms
    #[arg(long)]
    pub hold_ms: Option<u64>,

    /// trace, debug, info, warn or error
    #[arg(long)]
    pub log_level: Option<String>,

    /// Preview a synthetic pattern instead of the camera stream
    #[arg(long)]
    pub test_pattern: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConsoleSettings {
    pub cameras: PathBuf,
    pub pan_speed: u8,
    pub tilt_speed: u8,
    pub display_hz: u32,
    pub hold_ms: u64,
    pub connect_timeout_ms: u64,
    pub reply_timeout_ms: u64,
    pub stream_timeout_ms: u64,
    pub log_level: String,
    pub test_pattern: bool,
}

impl ConsoleSettings {
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        Self::load_with_env(args, Environment::with_prefix("PTZ"))
    }

    fn load_with_env(args: &Args, env: Environment) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("cameras", "cameras.json")?
            .set_default("pan_speed", 7_i64)?
            .set_default("tilt_speed", 7_i64)?
            .set_default("display_hz", 30_i64)?
            .set_default("hold_ms", 250_i64)?
            .set_default("connect_timeout_ms", 3000_i64)?
            .set_default("reply_timeout_ms", 1000_i64)?
            .set_default("stream_timeout_ms", 2000_i64)?
            .set_default("log_level", "info")?
            .set_default("test_pattern", false)?
            .add_source(File::from(args.config.clone()).required(false))
            .add_source(env)
            .set_override_option(
                "cameras",
                args.cameras.as_ref().map(|p| p.display().to_string()),
            )?
            .set_override_option("pan_speed", args.pan_speed.map(i64::from))?
            .set_override_option("tilt_speed", args.tilt_speed.map(i64::from))?
            .set_override_option("display_hz", args.display_hz.map(i64::from))?
            .set_override_option("hold_ms", args.hold_ms.map(|ms| ms as i64))?
            .set_override_option("log_level", args.log_level.clone())?;
        if args.test_pattern {
            builder = builder.set_override("test_pattern", true)?;
        }
        builder.build()?.try_deserialize()
    }

    pub fn display_interval(&self) -> Duration {
        Duration::from_secs(1) / self.display_hz.max(1)
    }

    pub fn hold(&self) -> Duration {
        Duration::from_millis(self.hold_ms)
    }

    pub fn registry_settings(&self) -> RegistrySettings {
        RegistrySettings {
            session: SessionSettings {
                connect_timeout: Duration::from_millis(self.connect_timeout_ms),
                reply_timeout: Duration::from_millis(self.reply_timeout_ms),
            },
            stream: StreamConfig {
                connect_timeout: Duration::from_millis(self.connect_timeout_ms),
                read_timeout: Duration::from_millis(self.stream_timeout_ms),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn isolated_env() -> Environment {
        Environment::with_prefix("PTZ_CONSOLE_TEST_UNSET")
    }

    fn args() -> Args {
        Args {
            config: std::env::temp_dir().join("ptz-console-missing.toml"),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let settings = ConsoleSettings::load_with_env(&args(), isolated_env()).unwrap();
        assert_eq!(settings.cameras, PathBuf::from("cameras.json"));
        assert_eq!((settings.pan_speed, settings.tilt_speed), (7, 7));
        assert_eq!(settings.hold(), Duration::from_millis(250));
        assert_eq!(settings.display_interval(), Duration::from_secs(1) / 30);
        assert!(!settings.test_pattern);
    }

    #[test]
    fn test_file_then_flags() {
        let path = std::env::temp_dir().join(format!("ptz-console-{}.toml", std::process::id()));
        std::fs::write(&path, "pan_speed = 10\ntilt_speed = 9\nlog_level = \"debug\"\n").unwrap();

        let args = Args {
            config: path.clone(),
            tilt_speed: Some(3),
            test_pattern: true,
            ..Default::default()
        };
        let settings = ConsoleSettings::load_with_env(&args, isolated_env()).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(settings.pan_speed, 10);
        assert_eq!(settings.tilt_speed, 3);
        assert_eq!(settings.log_level, "debug");
        assert!(settings.test_pattern);
    }

    #[test]
    fn test_registry_timeouts() {
        let settings = ConsoleSettings::load_with_env(&args(), isolated_env()).unwrap();
        let registry = settings.registry_settings();
        assert_eq!(registry.session.connect_timeout, Duration::from_secs(3));
        assert_eq!(registry.session.reply_timeout, Duration::from_secs(1));
        assert_eq!(registry.stream.read_timeout, Duration::from_secs(2));
    }
}
