use clap::Parser;
use std::path::PathBuf;

// Build version with target info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Target: ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Headless Butter session: scrape a layout, build the preview, edit a
/// track event over the editor channel and print the event journal.
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    /// Configuration file (default: butter.json in the config directory)
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    /// Media resource for scraped media elements (overrides config)
    #[arg(short = 'm', long = "media", value_name = "URL")]
    pub media: Option<String>,

    /// Simulated media duration in seconds
    #[arg(long = "duration", value_name = "SECS", default_value = "60")]
    pub duration: f64,

    /// Timeline seek after editing, as SMPTE (H:M:S:F, M:S:F, S:F or S)
    #[arg(short = 's', long = "seek", value_name = "TIMECODE")]
    pub seek: Option<String>,

    /// Text written by the simulated editor page
    #[arg(long = "text", value_name = "TEXT", default_value = "Edited in the editor")]
    pub text: String,

    /// Print the journal as JSON lines
    #[arg(long = "json")]
    pub json: bool,

    /// Write the effective configuration to the config directory and exit
    #[arg(long = "write-config")]
    pub write_config: bool,

    /// Print the exported presentation script
    #[arg(short = 'e', long = "export")]
    pub export: bool,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let args = Args::parse_from(["butter", "-vv", "--media", "baseplayer", "--seek", "0:05:0", "--json"]);
        assert_eq!(args.verbosity, 2);
        assert_eq!(args.media.as_deref(), Some("baseplayer"));
        assert_eq!(args.seek.as_deref(), Some("0:05:0"));
        assert!(args.json);
        assert_eq!(args.duration, 60.0);
    }
}
