use anyhow::{Context, Result};
use mapsearch_core::{
    ClickMode, MapFrame, MapSearchConfig, SearchOutcome, ViewChange, ViewportController,
};

mod cli;

fn main() -> Result<()> {
    let args = cli::parse_args();

    // Initialize logger with appropriate level based on verbose flag
    if std::env::var("RUST_LOG").is_err() {
        if args.verbose {
            std::env::set_var("RUST_LOG", "debug");
        } else {
            std::env::set_var("RUST_LOG", "info");
        }
    }
    env_logger::init();

    let config = match &args.config {
        Some(path) => MapSearchConfig::load(path)?,
        None => MapSearchConfig::default(),
    }
    .with_env_overrides();

    let mut controller = mapsearch_core::connect(&config)?;
    controller.set_map_style(args.style);

    let (outcome, query) = match (&args.address, args.at) {
        (Some(address), _) => (controller.search(address), address.clone()),
        (None, Some(point)) => {
            let mode = if args.organization {
                ClickMode::Organization
            } else {
                ClickMode::Place
            };
            (controller.reverse_geocode_at(point, mode), point.to_string())
        }
        (None, None) => anyhow::bail!("Either an address or --at LON,LAT is required"),
    };

    log::info!("search completed: outcome={:?} query={:?}", outcome.status(), query);
    if let Some(error) = controller.last_error() {
        log::debug!("{}", error);
    }

    match outcome {
        SearchOutcome::Ok {
            address,
            postal_code,
        } => {
            if args.postal {
                println!("{}, {}", address, postal_code.as_deref().unwrap_or("no postal code"));
            } else {
                println!("{}", address);
            }
            println!("{}", controller.center());
        }
        SearchOutcome::NotFound => {
            eprintln!("Nothing found! Please specify the address.");
            std::process::exit(1);
        }
        SearchOutcome::Forbidden => {
            eprintln!("This area is not allowed to display!");
            std::process::exit(1);
        }
    }

    if let Some(output) = &args.output {
        if let Some(zoom) = args.zoom {
            apply_zoom(&mut controller, zoom);
        }
        save_frame(&controller, output)?;
        log::info!("Map saved to {}", output.display());
    }

    Ok(())
}

/// Step the controller down (or up) to the requested zoom level
fn apply_zoom(controller: &mut ViewportController, zoom: u8) {
    while controller.zoom() != zoom {
        let change = if controller.zoom() > zoom {
            controller.zoom_out()
        } else {
            controller.zoom_in()
        };
        if change != ViewChange::Redrawn {
            log::warn!("Stopped zooming at level {}", controller.zoom());
            break;
        }
    }
}

fn save_frame(controller: &ViewportController, output: &std::path::Path) -> Result<()> {
    match controller.frame() {
        MapFrame::Image(bytes) => std::fs::write(output, bytes)
            .with_context(|| format!("Failed to write map to {}", output.display())),
        MapFrame::Placeholder => anyhow::bail!("No map image available to save"),
    }
}
