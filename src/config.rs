use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, fs, ops::RangeBounds, path::Path};

/// Initial parameters of a single run.
///
/// Compared by exact equality: two runs share predictor history only when
/// every field matches.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
pub struct RunParams {
    /// Infectiousness of the disease (an infection roll succeeds when a
    /// uniform sample is at least `infectiousness / 10`).
    pub infectiousness: u32,
    /// Number of curers.
    pub n_doctors: u32,
    /// Number of carriers.
    pub n_patients: u32,
    /// Index bound of the carriers created as infected.
    pub n_infected: u32,
    /// Number of cycles a carrier survives without being cured.
    pub death_cycles: u32,
}

/// Grid and engine limits.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Side length of the square grid.
    pub grid_size: u32,
    /// Step proposals tried before an agent gives up moving for a tick.
    pub max_step_attempts: usize,
    /// Safety cap on the number of cycles of a run.
    pub max_cycles: u32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            grid_size: 25,
            max_step_attempts: 20,
            max_cycles: 1000,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    /// Largest death count considered when predicting.
    pub max_outcome: u32,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self { max_outcome: 50 }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Start a new run as soon as the previous one terminates.
    pub auto_restart: bool,
    /// Number of runs per session.
    pub n_runs: usize,
    /// Pause between ticks, in milliseconds.
    pub tick_interval_ms: u64,
    /// Seed of the random number generator (OS entropy if absent).
    pub seed: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            auto_restart: true,
            n_runs: 1,
            tick_interval_ms: 0,
            seed: None,
        }
    }
}

/// Simulation configuration.
///
/// Loaded from a TOML file and validated before use.
/// See [`Config::from_file`] for loading.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Config {
    pub params: RunParams,
    #[serde(default)]
    pub world: WorldConfig,
    #[serde(default)]
    pub predictor: PredictorConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

impl Config {
    /// Load a [`Config`] from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents =
            fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;
        Self::from_toml(&contents)
    }

    /// Parse and validate a [`Config`] from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("failed to deserialize config")?;
        config.validate().context("failed to validate config")?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let params = &self.params;
        let world = &self.world;

        check_num(world.grid_size, 1..=100).context("invalid grid size")?;
        check_num(world.max_cycles, 1..=100_000).context("invalid maximum number of cycles")?;

        check_num(params.infectiousness, 0..=100).context("invalid infectiousness")?;
        check_num(params.death_cycles, 1..).context("invalid number of death cycles")?;
        check_num(params.n_infected, 0..=params.n_patients)
            .context("invalid number of infected patients")?;

        let n_cells = u64::from(world.grid_size).pow(2);
        let n_agents = u64::from(params.n_patients) + u64::from(params.n_doctors);
        check_num(n_agents, 0..=n_cells).context("invalid number of agents")?;

        check_num(self.predictor.max_outcome, params.n_patients..)
            .context("invalid maximum predicted outcome")?;

        check_num(self.session.n_runs, 1..=100_000).context("invalid number of runs")?;
        if self.session.n_runs > 1 && !self.session.auto_restart {
            bail!("more than one run requires auto_restart");
        }

        Ok(())
    }
}

fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}
