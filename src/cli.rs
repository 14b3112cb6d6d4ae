// CLI definitions using clap

use analog_hub::DeviceId;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "analog-hub")]
#[command(author, version, about = "Aggregate analogue key readings from Hall Effect keyboards")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Use a scripted virtual keyboard instead of real hardware
    #[arg(long, global = true)]
    pub demo: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List connected analogue keyboards
    #[command(visible_alias = "ls")]
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print pressed keys until Ctrl-C
    #[command(visible_alias = "w")]
    Watch {
        /// Poll interval in milliseconds
        #[arg(short, long, default_value = "50")]
        interval_ms: u64,
        /// Only read this device (e.g. 0x3151503A)
        #[arg(short, long, value_parser = parse_device_id)]
        device: Option<DeviceId>,
    },

    /// Print the current magnitude of one output code
    Read {
        /// Output code (e.g. 0x1A for W)
        #[arg(value_parser = parse_u16)]
        code: u16,
        /// Only read this device
        #[arg(short, long, value_parser = parse_device_id)]
        device: Option<DeviceId>,
    },

    /// Show the effective configuration
    Config {
        /// Write it to the config file
        #[arg(long)]
        write: bool,
    },
}

fn parse_u64(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid number '{}': {}", s, e))
}

fn parse_u16(s: &str) -> Result<u16, String> {
    let value = parse_u64(s)?;
    u16::try_from(value).map_err(|_| format!("'{}' does not fit in 16 bits", s))
}

fn parse_device_id(s: &str) -> Result<DeviceId, String> {
    parse_u64(s).map(DeviceId)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_numbers() {
        assert_eq!(parse_u16("0x1A").unwrap(), 0x1A);
        assert_eq!(parse_u16("30").unwrap(), 30);
        assert!(parse_u16("0x10000").is_err());
        assert!(parse_u16("w").is_err());
        assert_eq!(parse_device_id("0x0001000A").unwrap(), DeviceId(0x0001000A));
    }

    #[test]
    fn test_cli_parses_watch() {
        let cli = Cli::try_parse_from(["analog-hub", "--demo", "watch", "-d", "0x0001000A"]).unwrap();
        assert!(cli.demo);
        match cli.command {
            Commands::Watch {
                interval_ms,
                device,
            } => {
                assert_eq!(interval_ms, 50);
                assert_eq!(device, Some(DeviceId(0x0001000A)));
            }
            _ => panic!("Expected watch"),
        }
    }
}
