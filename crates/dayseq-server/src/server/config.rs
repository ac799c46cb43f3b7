use anyhow::{Context, bail};
use clap::Parser;
use core::time::Duration;
use dayseq::{LocalClock, Prefix};
use std::path::PathBuf;

/// Runtime configuration for the `dayseq-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a
/// `.env` file is loaded first). The prefix and data directory have no
/// defaults: a deployment must name them explicitly.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "dayseq-server",
    version,
    about = "An HTTP service handing out durable daily serial numbers"
)]
pub struct CliArgs {
    /// Fixed tag every serial starts with, e.g. an organization code.
    ///
    /// Must be non-empty printable ASCII without whitespace and must not end
    /// in a digit.
    ///
    /// Environment variable: `SERIAL_PREFIX`
    #[arg(long, env = "SERIAL_PREFIX")]
    pub serial_prefix: String,

    /// Directory holding one counter file per day.
    ///
    /// Several server processes may share the same directory.
    ///
    /// Environment variable: `SERIAL_DATA_DIR`
    #[arg(long, env = "SERIAL_DATA_DIR")]
    pub serial_data_dir: PathBuf,

    /// UTC offset that decides where one day ends and the next begins.
    ///
    /// Example: "+08:00", "-05:00" or "Z".
    ///
    /// Environment variable: `SERIAL_UTC_OFFSET`
    #[arg(long, env = "SERIAL_UTC_OFFSET", default_value_t = String::from("+00:00"), allow_hyphen_values = true)]
    pub serial_utc_offset: String,

    /// Maximum time an allocation waits for exclusive access to its day, in
    /// milliseconds. Requests that wait longer fail with 503.
    ///
    /// Environment variable: `SERIAL_LOCK_TIMEOUT_MS`
    #[arg(long, env = "SERIAL_LOCK_TIMEOUT_MS", default_value_t = 2_000)]
    pub serial_lock_timeout_ms: u64,

    /// Address to listen on.
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:3000"))]
    pub server_addr: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub prefix: Prefix,
    pub data_dir: PathBuf,
    pub clock: LocalClock,
    pub lock_timeout: Duration,
    pub server_addr: String,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let prefix = Prefix::new(&args.serial_prefix)
            .with_context(|| format!("SERIAL_PREFIX {:?} is invalid", args.serial_prefix))?;

        let offset = LocalClock::parse_offset(&args.serial_utc_offset).with_context(|| {
            format!(
                "SERIAL_UTC_OFFSET {:?} is not an offset like +08:00",
                args.serial_utc_offset
            )
        })?;

        if args.serial_lock_timeout_ms == 0 {
            bail!("SERIAL_LOCK_TIMEOUT_MS must be greater than 0");
        }

        Ok(Self {
            prefix,
            data_dir: args.serial_data_dir,
            clock: LocalClock::new(offset),
            lock_timeout: Duration::from_millis(args.serial_lock_timeout_ms),
            server_addr: args.server_addr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_with_prefix(prefix: &str, extra: &[&str]) -> anyhow::Result<ServerConfig> {
        let mut argv = vec![
            "dayseq-server",
            "--serial-prefix",
            prefix,
            "--serial-data-dir",
            "/tmp/dayseq",
        ];
        argv.extend_from_slice(extra);
        ServerConfig::try_from(CliArgs::try_parse_from(argv)?)
    }

    fn parse(extra: &[&str]) -> anyhow::Result<ServerConfig> {
        parse_with_prefix("ORG", extra)
    }

    #[test]
    fn applies_defaults() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.prefix.as_str(), "ORG");
        assert_eq!(config.clock.offset().local_minus_utc(), 0);
        assert_eq!(config.lock_timeout, Duration::from_secs(2));
        assert_eq!(config.server_addr, "0.0.0.0:3000");
    }

    #[test]
    fn accepts_negative_offsets() {
        let config = parse(&["--serial-utc-offset", "-05:00"]).unwrap();
        assert_eq!(config.clock.offset().local_minus_utc(), -5 * 3600);
    }

    #[test]
    fn rejects_bad_prefix() {
        let err = parse_with_prefix("ORG1", &[]).unwrap_err();
        assert!(err.to_string().contains("SERIAL_PREFIX"));
    }

    #[test]
    fn rejects_bad_offset() {
        assert!(parse(&["--serial-utc-offset", "Asia/Shanghai"]).is_err());
    }

    #[test]
    fn rejects_zero_timeout() {
        assert!(parse(&["--serial-lock-timeout-ms", "0"]).is_err());
    }
}
