use std::path::PathBuf;

use clap::{ArgAction, Parser};
use waysnap::{
    Config,
    backend::{self, AreaChoice, OneShotRequest, RunMode},
    capture::{FileTarget, selector::parse_geometry},
    geometry::Rect,
};

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("WAYSNAP_GIT_HASH"), ")");

#[derive(Parser, Debug)]
#[command(name = "waysnap")]
#[command(version = VERSION, about = "Multi-output screenshots for wlroots compositors")]
struct Cli {
    /// Serve org.gnome.Shell.Screenshot on the session bus
    #[arg(
        long,
        short = 'd',
        action = ArgAction::SetTrue,
        conflicts_with_all = ["area", "select", "output", "clipboard", "cursor", "no_flash"]
    )]
    daemon: bool,

    /// Capture only this logical area, given as "x,y wxh"
    #[arg(long, short = 'a', value_name = "GEOMETRY", value_parser = parse_area, conflicts_with = "select")]
    area: Option<Rect>,

    /// Pick the area interactively with the configured selector
    #[arg(long, short = 's', action = ArgAction::SetTrue)]
    select: bool,

    /// Write the PNG to this path instead of an automatic name (must not exist)
    #[arg(long, short = 'o', value_name = "PATH")]
    output: Option<PathBuf>,

    /// Copy the PNG to the clipboard
    #[arg(long, short = 'c', action = ArgAction::SetTrue)]
    clipboard: bool,

    /// Include the pointer in the screenshot
    #[arg(long, action = ArgAction::SetTrue)]
    cursor: bool,

    /// Skip the flash and capture feedback
    #[arg(long, action = ArgAction::SetTrue)]
    no_flash: bool,
}

fn parse_area(text: &str) -> Result<Rect, String> {
    parse_geometry(text).map_err(|err| err.to_string())
}

impl Cli {
    /// Builds the one-shot request, falling back to the configured destination.
    fn one_shot(&self, config: &Config) -> OneShotRequest {
        let area = match (self.area, self.select) {
            (Some(area), _) => AreaChoice::Fixed(area),
            (None, true) => AreaChoice::Select,
            (None, false) => AreaChoice::Everything,
        };

        let (file, clipboard) = match (&self.output, self.clipboard) {
            (Some(path), clipboard) => (FileTarget::Path(path.clone()), clipboard),
            (None, true) => (FileTarget::None, true),
            (None, false) => config.capture.destination.intent_parts(),
        };

        OneShotRequest {
            area,
            include_cursor: self.cursor || config.capture.include_cursor,
            flash: config.capture.flash && !self.no_flash,
            file,
            clipboard,
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    // Check for Wayland environment
    if std::env::var("WAYLAND_DISPLAY").is_err() {
        log::error!("Please run on a wlroots compositor with wlr-screencopy (Sway, Phoc, etc.).");
        return Err(anyhow::anyhow!(
            "WAYLAND_DISPLAY not set, a Wayland session is required"
        ));
    }

    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            log::warn!("Failed to load config: {:#}. Using defaults.", err);
            Config::default()
        }
    };

    if cli.daemon {
        log::info!("Starting in daemon mode");
        backend::run_wayland(config, RunMode::Daemon)?;
    } else {
        let request = cli.one_shot(&config);
        log::debug!("One-shot request: {:?}", request);
        backend::run_wayland(config, RunMode::OneShot(request))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use waysnap::config::Destination;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("waysnap").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults_follow_config_destination() {
        let mut config = Config::default();
        config.capture.destination = Destination::Both;
        let request = parse(&[]).one_shot(&config);
        assert_eq!(request.area, AreaChoice::Everything);
        assert_eq!(request.file, FileTarget::Auto);
        assert!(request.clipboard);
        assert!(request.flash);
        assert!(!request.include_cursor);
    }

    #[test]
    fn explicit_flags_override_config() {
        let request = parse(&["--area", "10,20 300x200", "--clipboard", "--no-flash", "--cursor"])
            .one_shot(&Config::default());
        assert_eq!(
            request.area,
            AreaChoice::Fixed(Rect::new(10, 20, 300, 200).unwrap())
        );
        assert_eq!(request.file, FileTarget::None);
        assert!(request.clipboard);
        assert!(!request.flash);
        assert!(request.include_cursor);
    }

    #[test]
    fn output_path_keeps_clipboard_flag() {
        let request = parse(&["-o", "/tmp/shot.png", "-c", "--select"]).one_shot(&Config::default());
        assert_eq!(request.area, AreaChoice::Select);
        assert_eq!(request.file, FileTarget::Path(PathBuf::from("/tmp/shot.png")));
        assert!(request.clipboard);
    }

    #[test]
    fn malformed_area_is_rejected() {
        assert!(Cli::try_parse_from(["waysnap", "--area", "10,20 300"]).is_err());
        assert!(Cli::try_parse_from(["waysnap", "--area", "0,0 10x10", "--select"]).is_err());
        assert!(Cli::try_parse_from(["waysnap", "--daemon", "--clipboard"]).is_err());
    }
}
