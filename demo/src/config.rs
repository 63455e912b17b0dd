use {
    eyre::{Report, WrapErr as _},
    std::path::{Path, PathBuf},
};

#[derive(Clone, Debug, Default, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub marionette: marionette::Config,

    #[serde(default)]
    pub demo: DemoConfig,
}

#[derive(Clone, Debug, serde::Deserialize)]
pub struct DemoConfig {
    /// Number of frame loop ticks to run.
    #[serde(default = "default_frames")]
    pub frames: u32,

    #[serde(default = "default_frame_rate")]
    pub frame_rate: f32,

    /// Amplitude of noise added to synthetic joint positions, in meters.
    #[serde(default = "default_jitter")]
    pub jitter: f32,

    /// Number of people walking in front of the sensor.
    #[serde(default = "default_bodies")]
    pub bodies: usize,

    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        DemoConfig {
            frames: default_frames(),
            frame_rate: default_frame_rate(),
            jitter: default_jitter(),
            bodies: default_bodies(),
            seed: None,
        }
    }
}

fn default_frames() -> u32 {
    300
}

fn default_frame_rate() -> f32 {
    30.0
}

fn default_jitter() -> f32 {
    0.01
}

fn default_bodies() -> usize {
    2
}

impl Config {
    /// Loads config from `MARIONETTE_DEMO_CONFIG_PATH` or `./demo.ron`.
    /// Missing default file means default config.
    pub fn load_default() -> Result<Self, Report> {
        match std::env::var("MARIONETTE_DEMO_CONFIG_PATH") {
            Ok(path) => Self::load(Path::new(&path)),
            Err(_) => {
                let path = PathBuf::from("./demo.ron");
                if path.exists() {
                    Self::load(&path)
                } else {
                    tracing::info!("No demo config found, using defaults");
                    Ok(Config::default())
                }
            }
        }
    }

    #[tracing::instrument]
    pub fn load(path: &Path) -> Result<Self, Report> {
        let file = std::fs::File::open(path)
            .wrap_err_with(|| format!("Failed to open '{}'", path.display()))?;
        let config = ron::de::from_reader(file)
            .wrap_err_with(|| format!("Failed to parse '{}'", path.display()))?;
        Ok(config)
    }
}
