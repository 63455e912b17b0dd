mod config;
mod rig;
mod sensor;

use {
    crate::config::Config,
    color_eyre::Report,
    eyre::eyre,
    marionette::{BodyFrame, Retargeter, Rig as _, SharedFloorPlane},
    std::{path::Path, time::Duration},
    tracing_subscriber::{fmt, prelude::*, EnvFilter},
};

/// Bones whose rotations are logged periodically.
const WATCHED: &[&str] = &["hips", "upper_arm.l", "thigh.r", "head"];

fn main() -> Result<(), Report> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_error::ErrorLayer::default())
        .init();

    color_eyre::install()?;

    let config = Config::load_default()?;
    let settings = &config.marionette;

    let mut rig = rig::humanoid();
    let map = match &settings.map {
        Some(_) => settings.load_map(Path::new("."))?,
        None => rig::default_map(),
    };

    let mut retargeter = Retargeter::new(
        &rig,
        map,
        settings.smoothing,
        settings.mirror,
        settings.mode,
    )?;

    tracing::info!(
        "Smoothing {:?}, mode {:?}",
        retargeter.source().parameters(),
        retargeter.mode()
    );

    let floor = SharedFloorPlane::default();
    let (sensor, frames) = sensor::spawn(config.demo.clone(), floor.clone())?;

    let period =
        Duration::from_secs_f32(1.0 / config.demo.frame_rate.max(1.0));
    let mut applied = 0u32;
    let mut skipped = 0u32;

    for tick in 0..config.demo.frames {
        // Stale frames are dropped, only the newest one matters.
        let frame: Option<BodyFrame> = frames.try_iter().last();
        let body = frame.as_ref().and_then(BodyFrame::closest_body);

        if retargeter.frame(&mut rig, body, &floor) {
            applied += 1;
        } else {
            skipped += 1;
            tracing::trace!("Tick {} skipped", tick);
        }

        if tick % 30 == 0 {
            for &name in WATCHED {
                let transform = rig
                    .bone_by_name(name)
                    .and_then(|bone| rig.world_transform(bone));

                if let Some(transform) = transform {
                    let (roll, pitch, yaw) = transform.rotation.euler_angles();
                    tracing::info!(
                        "Tick {}: {} roll {:.3} pitch {:.3} yaw {:.3}",
                        tick,
                        name,
                        roll,
                        pitch,
                        yaw
                    );
                }
            }
        }

        std::thread::sleep(period);
    }

    drop(frames);
    sensor
        .join()
        .map_err(|_| eyre!("Sensor thread panicked"))?;

    tracing::info!("Applied {} frames, skipped {}", applied, skipped);
    Ok(())
}
