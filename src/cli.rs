//! Command-line interface definitions for rssgen.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Every global option can also be provided through an environment variable,
//! which is how container deployments configure the server.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use clap::builder::FalseyValueParser;
use clap::{Parser, Subcommand};

use crate::cache::CacheMode;
use crate::fetch::FetcherSettings;

/// Command-line arguments for rssgen.
///
/// # Examples
///
/// ```sh
/// # Serve feeds on port 3000 with a read-write cache
/// rssgen --caching readwrite
///
/// # Same, configured through the environment
/// PORT=8080 CACHING=read-only DEBUG=on rssgen serve
///
/// # Fetch one page with a chosen strategy
/// rssgen grab https://rumble.com/c/DailyShow --strategy stealth -o page.html
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Port the HTTP server listens on
    #[arg(long, env = "PORT", default_value_t = 3000, global = true)]
    pub port: u16,

    /// Address the HTTP server binds to
    #[arg(long, env = "BIND_ADDR", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED), global = true)]
    pub bind: IpAddr,

    /// Cache policy: disabled, readonly or readwrite
    #[arg(long, env = "CACHING", value_enum, default_value_t = CacheMode::Disabled, global = true)]
    pub caching: CacheMode,

    /// Root directory of the item cache
    #[arg(long, env = "CACHE_DIR", default_value = ".cache", global = true)]
    pub cache_dir: PathBuf,

    /// Verbose logging (overridden by RUST_LOG)
    #[arg(long, env = "DEBUG", value_parser = FalseyValueParser::new(), global = true)]
    pub debug: bool,

    /// Chrome/Chromium binary for rendered retrieval
    #[arg(long, env = "CHROME_PATH", global = true)]
    pub chrome_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Serve feeds over HTTP (the default)
    Serve,

    /// Retrieve one page and print or save the raw result
    Grab {
        /// Page to retrieve
        url: String,

        /// Retrieval strategy: plain, rendered, rendered-random-agent or stealth
        #[arg(short, long, default_value = "plain")]
        strategy: String,

        /// Write the page here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Pause before a plain request, in milliseconds
        #[arg(long)]
        delay_ms: Option<u64>,
    },
}

/// Process-wide settings, read once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub cache_mode: CacheMode,
    pub cache_root: PathBuf,
}

impl Cli {
    pub fn settings(&self) -> Settings {
        Settings {
            cache_mode: self.caching,
            cache_root: self.cache_dir.clone(),
        }
    }

    pub fn fetcher_settings(&self) -> FetcherSettings {
        FetcherSettings {
            chrome_path: self.chrome_path.clone(),
        }
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["rssgen"]);
        assert_eq!(cli.port, 3000);
        assert_eq!(cli.listen_addr().to_string(), "0.0.0.0:3000");
        assert_eq!(cli.caching, CacheMode::Disabled);
        assert_eq!(cli.cache_dir, PathBuf::from(".cache"));
        assert!(!cli.debug);
        assert_eq!(cli.command(), Command::Serve);
    }

    #[test]
    fn test_cache_mode_spellings() {
        for (flag, mode) in [
            ("disabled", CacheMode::Disabled),
            ("readonly", CacheMode::ReadOnly),
            ("read-only", CacheMode::ReadOnly),
            ("readwrite", CacheMode::ReadWrite),
            ("read-write", CacheMode::ReadWrite),
        ] {
            let cli = Cli::parse_from(["rssgen", "--caching", flag]);
            assert_eq!(cli.caching, mode, "{flag}");
        }
    }

    #[test]
    fn test_unknown_cache_mode_is_rejected() {
        assert!(Cli::try_parse_from(["rssgen", "--caching", "sometimes"]).is_err());
    }

    #[test]
    fn test_serve_flags() {
        let cli = Cli::parse_from([
            "rssgen",
            "serve",
            "--port",
            "8080",
            "--bind",
            "127.0.0.1",
            "--debug",
            "--cache-dir",
            "/tmp/feeds",
        ]);
        assert_eq!(cli.command(), Command::Serve);
        assert_eq!(cli.listen_addr().to_string(), "127.0.0.1:8080");
        assert!(cli.debug);
        assert_eq!(cli.settings().cache_root, PathBuf::from("/tmp/feeds"));
    }

    #[test]
    fn test_grab_subcommand() {
        let cli = Cli::parse_from([
            "rssgen",
            "grab",
            "https://banned.video/channel/x",
            "-s",
            "stealth",
            "-o",
            "page.html",
            "--delay-ms",
            "250",
        ]);
        assert_eq!(
            cli.command(),
            Command::Grab {
                url: "https://banned.video/channel/x".to_string(),
                strategy: "stealth".to_string(),
                output: Some(PathBuf::from("page.html")),
                delay_ms: Some(250),
            }
        );
    }

    #[test]
    fn test_grab_defaults_to_plain() {
        let cli = Cli::parse_from(["rssgen", "grab", "https://rumble.com/c/x"]);
        match cli.command() {
            Command::Grab {
                strategy, output, ..
            } => {
                assert_eq!(strategy, "plain");
                assert_eq!(output, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
