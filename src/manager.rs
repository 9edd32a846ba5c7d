use crate::config::Config;
use crate::engine::{Engine, Report, Signal};
use crate::predictor::Predictor;
use crate::stats::SessionStats;
use anyhow::{Context, Result, bail};
use glob::glob;
use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;
use rmp_serde::encode;
use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    str::FromStr,
    thread,
    time::Duration,
};

/// Lifecycle request addressed to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Start,
    Stop,
    Reset,
    Restart,
}

impl FromStr for Lifecycle {
    type Err = anyhow::Error;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "reset" => Ok(Self::Reset),
            "restart" => Ok(Self::Restart),
            _ => bail!("unknown lifecycle signal {name:?}"),
        }
    }
}

/// Drives sessions of consecutive runs sharing one predictor.
pub struct Manager {
    sim_dir: PathBuf,
    cfg: Config,
    engine: Engine,
    predictor: Predictor,
}

impl Manager {
    pub fn new<P: AsRef<Path>>(sim_dir: P, seed: Option<u64>) -> Result<Self> {
        let sim_dir = sim_dir.as_ref().to_path_buf();

        let mut cfg =
            Config::from_file(sim_dir.join("config.toml")).context("failed to construct cfg")?;
        if seed.is_some() {
            cfg.session.seed = seed;
        }
        log::info!("{cfg:#?}");

        Self::from_config(sim_dir, cfg)
    }

    pub fn from_config(sim_dir: PathBuf, cfg: Config) -> Result<Self> {
        let rng = match cfg.session.seed {
            Some(seed) => ChaCha12Rng::seed_from_u64(seed),
            None => ChaCha12Rng::try_from_os_rng().context("failed to seed rng")?,
        };
        let engine = Engine::new(cfg.world.clone(), cfg.session.auto_restart, rng);
        let predictor = Predictor::new(cfg.predictor.max_outcome);

        Ok(Self {
            sim_dir,
            cfg,
            engine,
            predictor,
        })
    }

    /// Apply the lifecycle request called `name`.
    ///
    /// Unknown names are logged and leave the engine untouched.
    pub fn dispatch(&mut self, name: &str) -> Result<()> {
        match name.parse::<Lifecycle>() {
            Ok(lifecycle) => self.apply(lifecycle),
            Err(error) => {
                log::warn!("{error}");
                Ok(())
            }
        }
    }

    pub fn apply(&mut self, lifecycle: Lifecycle) -> Result<()> {
        match lifecycle {
            Lifecycle::Start => self.engine.start(self.cfg.params, &self.predictor)?,
            Lifecycle::Stop => self.engine.stop(),
            Lifecycle::Reset => self.engine.reset(),
            Lifecycle::Restart => self.engine.restart(&self.predictor)?,
        }
        Ok(())
    }

    /// Run until the engine stops, restarting up to `n_runs` times.
    pub fn run_session(&mut self) -> Result<Vec<Report>> {
        let interval = Duration::from_millis(self.cfg.session.tick_interval_ms);
        let mut reports = Vec::with_capacity(self.cfg.session.n_runs);
        let mut stats = SessionStats::default();

        self.dispatch("start").context("failed to start run")?;

        while self.engine.is_running() {
            if !interval.is_zero() {
                thread::sleep(interval);
            }

            let Some(outcome) = self
                .engine
                .step(&mut self.predictor)
                .context("failed to perform step")?
            else {
                continue;
            };

            stats.add(&outcome.report);
            reports.push(outcome.report);

            match outcome.signal {
                Signal::Restart if reports.len() < self.cfg.session.n_runs => {
                    log::info!("completed run {}/{}", reports.len(), self.cfg.session.n_runs);
                    self.dispatch("restart").context("failed to restart run")?;
                }
                _ => self.dispatch("stop")?,
            }
        }
        log::info!(
            "session ended in phase {:?} after {} runs",
            self.engine.phase(),
            reports.len()
        );

        log::info!("{:#?}", stats.summary());
        log::info!("predictor holds {} parameter sets", self.predictor.n_keys());

        Ok(reports)
    }

    /// Write `reports` to a new results file in the simulation directory.
    pub fn save_reports(&self, reports: &[Report]) -> Result<PathBuf> {
        let results_idx = self
            .count_results_files()
            .context("failed to count results files")?;
        let path = self.results_file(results_idx);

        let file = File::create(&path).with_context(|| format!("failed to create {path:?}"))?;
        let mut writer = BufWriter::new(file);
        encode::write(&mut writer, reports).context("failed to serialize reports")?;
        writer.flush().context("failed to flush writer stream")?;

        log::info!("saved {path:?}");
        Ok(path)
    }

    /// Remove every results file from the simulation directory.
    pub fn clean_results(&self) -> Result<()> {
        for path in self.results_files()? {
            fs::remove_file(&path).with_context(|| format!("failed to remove {path:?}"))?;
            log::info!("removed {path:?}");
        }
        Ok(())
    }

    fn results_files(&self) -> Result<Vec<PathBuf>> {
        let pattern = self.sim_dir.join("results-*.msgpack");
        let pattern = pattern.to_str().context("pattern is not valid UTF-8")?;
        let paths = glob(pattern)
            .context("failed to glob results files")?
            .filter_map(Result::ok)
            .collect();
        Ok(paths)
    }

    fn count_results_files(&self) -> Result<usize> {
        Ok(self.results_files()?.len())
    }

    fn results_file(&self, results_idx: usize) -> PathBuf {
        self.sim_dir
            .join(format!("results-{results_idx:04}.msgpack"))
    }
}
