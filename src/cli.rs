use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::config::{FallbackPolicy, Options};

#[derive(Parser, Debug)]
#[command(name = "httpasset")]
#[command(version)]
#[command(about = "Serve static assets from a zip archive appended to this binary", long_about = None)]
#[command(after_help = "Examples:\n  \
  httpasset                          serve the appended archive, or ./assets\n  \
  httpasset -a 0.0.0.0:8080 -d web   listen on all interfaces, fall back to ./web\n  \
  httpasset --binary app.packaged    serve the archive appended to another file")]
pub struct Cli {
    /// Address to listen on
    #[arg(short = 'a', long, value_name = "ADDR", default_value = "127.0.0.1:8000")]
    pub addr: SocketAddr,

    /// Directory served when no archive is appended
    #[arg(short = 'd', long, value_name = "DIR", default_value = "assets")]
    pub assets: PathBuf,

    /// Read the archive from FILE instead of the running binary
    #[arg(long, value_name = "FILE")]
    pub binary: Option<PathBuf>,

    /// Refuse to fall back when the appended archive is corrupt
    #[arg(long)]
    pub strict: bool,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,
}

impl Cli {
    pub fn options(&self) -> Options {
        let mut options = Options::new();
        if let Some(binary) = &self.binary {
            options = options.binary(binary);
        }
        if self.strict {
            options = options.fallback_policy(FallbackPolicy::NotPackagedOnly);
        }
        options
    }

    /// Default log filter when `RUST_LOG` is unset.
    pub fn log_filter(&self) -> &'static str {
        match self.quiet {
            0 => "info",
            1 => "warn",
            _ => "error",
        }
    }
}
