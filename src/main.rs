use butter::cli::Args;
use butter::config::ButterConfig;
use butter::core::TIMELINE_DOMAIN;
use butter::entities::{PopcornOptions, Track, TrackEvent, TrackEventOptions};
use butter::paths::{self, PathConfig};
use butter::shell::{self, Shell};
use butter::timecode;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};
use serde_json::json;

fn main() -> Result<()> {
    let args = Args::parse();
    shell::init_logger(args.verbosity);
    debug!("Command-line args: {:?}", args);

    let path_config = PathConfig::from_env_and_cli(args.config_dir.clone());
    info!("Config path: {}", paths::config_file(butter::config::CONFIG_FILE, &path_config).display());
    let mut config = ButterConfig::locate(args.config.as_deref(), &path_config)?;
    if let Some(media) = &args.media {
        config.preview.media = Some(media.clone());
    }
    if args.write_config {
        let path = paths::ensure_dirs(&path_config)?.join(butter::config::CONFIG_FILE);
        config.save(&path)?;
        println!("{}", path.display());
        return Ok(());
    }

    let shell = Shell::new(config, args.duration).context("Failed to build project")?;
    shell.wait_preview_ready().context("Preview did not come up")?;

    shell.tray.add_plugin("footnote", Some("Footnote"))?;
    shell.tray.add_plugin("image", None)?;

    let butter = &shell.butter;
    butter.add_track(Track::named("Track1"))?;
    let event = TrackEvent::new(
        TrackEventOptions::new("footnote", 1.0, 4.0).name("intro").option("text", "Hello"),
    )?;
    let event = butter.add_track_event("Track1", event)?;

    let mut changes = PopcornOptions::new();
    changes.insert("text".into(), args.text.clone().into());
    shell.edit_session(event.id(), changes).context("Editor session failed")?;

    if let Some(tc) = &args.seek {
        let t = timecode::smpte_to_seconds(tc)?;
        butter.set_current_time(t, Some(TIMELINE_DOMAIN))?;
    }
    // Let the media play on for a second.
    let media = butter.get_current_media().context("No current media")?;
    if let Some(runtime) = shell.frame.runtime_for(media.id()) {
        runtime.play_to(butter.current_time()? + 1.0);
    }
    for e in shell.tick().errors {
        log::warn!("tick: {}", e);
    }

    for e in butter.bus().poll() {
        if args.json {
            let line = json!({
                "event": e.name.as_str(),
                "domain": e.domain,
                "data": e.data.describe(),
            });
            println!("{}", line);
        } else {
            println!("{:<24} {:<10} {}", e.name, e.domain.as_deref().unwrap_or("-"), e.data.describe());
        }
    }
    println!("playhead {}", timecode::seconds_to_smpte(butter.current_time()?)?);

    if args.export {
        println!("{}", shell.previewer.export_script()?);
    }
    Ok(())
}
