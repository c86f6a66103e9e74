use anstyle::AnsiColor;
use clap::builder::styling::Styles;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::session::TransferConfig;

const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default())
    .usage(AnsiColor::Green.on_default())
    .literal(AnsiColor::Cyan.on_default())
    .placeholder(AnsiColor::Red.on_default());

#[derive(Parser, Debug)]
#[command(name = "upgrade", version, disable_version_flag = true)]
#[command(about = "Upload a firmware image to a device over TFTP")]
#[command(after_help = "All transfers are binary.\n\
    Retry 2 times every second.\n\
    Timeout after 30 seconds.")]
#[command(styles = STYLES)]
pub struct Cli {
    /// FQDN or IP address of the device
    pub destination: String,

    /// File to send
    pub file: PathBuf,

    /// TFTP port of the device
    #[arg(short, long, default_value_t = crate::DEF_PORT, value_parser = clap::value_parser!(u16).range(1..))]
    pub port: u16,

    /// Name given to the uploaded file
    #[arg(short = 'n', long, default_value = crate::DEF_REMOTE_NAME)]
    pub remote_name: String,

    /// Seconds to wait for the device to answer the write request
    #[arg(short, long, default_value_t = 30)]
    pub wait: u64,

    /// More logging (-d info, -dd debug)
    #[arg(short = 'd', long = "debug", action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Print version
    #[arg(short = 'v', long, action = clap::ArgAction::Version)]
    #[allow(dead_code)]
    version: Option<bool>,
}

impl Cli {
    pub fn transfer_config(&self) -> TransferConfig {
        TransferConfig {
            filename: self.remote_name.clone(),
            handshake_deadline: Duration::from_secs(self.wait),
            ..TransferConfig::default()
        }
    }

    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["upgrade", "192.168.1.1", "fw.bin"]).unwrap();
        assert_eq!(cli.port, 69);
        assert_eq!(cli.remote_name, "upgrade");
        assert_eq!(cli.log_level(), "warn");
        let config = cli.transfer_config();
        assert_eq!(config.filename, "upgrade");
        assert_eq!(config.handshake_deadline, Duration::from_secs(30));
    }

    #[test]
    fn options() {
        let cli = Cli::try_parse_from([
            "upgrade", "-p", "6969", "-n", "image", "-w", "5", "-dd", "router", "fw.bin",
        ])
        .unwrap();
        assert_eq!(cli.port, 6969);
        assert_eq!(cli.destination, "router");
        assert_eq!(cli.log_level(), "debug");
        let config = cli.transfer_config();
        assert_eq!(config.filename, "image");
        assert_eq!(config.handshake_deadline, Duration::from_secs(5));
    }

    #[test]
    fn lowercase_v_prints_version() {
        let err = Cli::try_parse_from(["upgrade", "-v"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }

    #[test]
    fn port_zero_is_rejected() {
        assert!(Cli::try_parse_from(["upgrade", "-p", "0", "router", "fw.bin"]).is_err());
    }

    #[test]
    fn both_positionals_required() {
        assert!(Cli::try_parse_from(["upgrade", "router"]).is_err());
    }
}
