use {
    crate::{filter::SmoothingParameters, map::RetargetMap, retarget::RetargetMode},
    eyre::{Report, WrapErr as _},
    std::path::{Path, PathBuf},
};

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub smoothing: SmoothingParameters,

    /// Convert sensor handedness to the rig's.
    #[serde(default = "default_mirror")]
    pub mirror: bool,

    #[serde(default)]
    pub mode: RetargetMode,

    /// Retarget map to load at start-up.
    #[serde(default)]
    pub map: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            smoothing: SmoothingParameters::default(),
            mirror: default_mirror(),
            mode: RetargetMode::default(),
            map: None,
        }
    }
}

fn default_mirror() -> bool {
    true
}

impl Config {
    pub fn load_default() -> Result<Self, Report> {
        // Load from predefined file path for desktop platforms.
        let path = std::env::var("MARIONETTE_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./marionette.ron"));

        Self::load(&path)
    }

    #[tracing::instrument]
    pub fn load(path: &Path) -> Result<Self, Report> {
        let file = std::fs::File::open(path)
            .wrap_err_with(|| format!("Failed to open '{}'", path.display()))?;
        let config = ron::de::from_reader(file)
            .wrap_err_with(|| format!("Failed to parse '{}'", path.display()))?;
        Ok(config)
    }

    /// Loads the configured retarget map, or empty map if none is set.
    /// Relative map path is resolved against `base`.
    pub fn load_map(&self, base: &Path) -> Result<RetargetMap, Report> {
        match &self.map {
            None => Ok(RetargetMap::new()),
            Some(path) => {
                let path = base.join(path);
                RetargetMap::load(&path).wrap_err("Failed to load retarget map")
            }
        }
    }
}
