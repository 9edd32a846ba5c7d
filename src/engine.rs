use crate::config::{RunParams, WorldConfig};
use crate::model::{Agent, Carrier, Curer, Kind, Position};
use crate::population::{AgentId, Population};
use crate::predictor::Predictor;
use anyhow::{Context, Result};
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use serde::{Deserialize, Serialize};

/// Lifecycle phase of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Running,
    Terminated,
}

/// Signal emitted once per terminated run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Stop,
    Restart,
}

/// Reason a run terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// No infected carriers remain.
    Contained,
    /// The cycle cap was reached.
    SafetyCap,
}

/// Summary of a terminated run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub deceased: usize,
    pub cycles: u32,
    pub infectiousness: u32,
    pub predicted: u32,
    pub cured: u32,
    pub termination: Termination,
}

#[derive(Debug)]
pub struct Outcome {
    pub signal: Signal,
    pub report: Report,
}

/// Simulation engine.
///
/// Owns the population and the random number generator and advances the
/// world one tick at a time.
pub struct Engine {
    world: WorldConfig,
    auto_restart: bool,
    rng: ChaCha12Rng,
    phase: Phase,
    params: Option<RunParams>,
    population: Population,
    cycle: u32,
    cured: u32,
    predicted: u32,
}

impl Engine {
    pub fn new(world: WorldConfig, auto_restart: bool, rng: ChaCha12Rng) -> Self {
        Self {
            world,
            auto_restart,
            rng,
            phase: Phase::Idle,
            params: None,
            population: Population::new(),
            cycle: 0,
            cured: 0,
            predicted: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.phase == Phase::Running
    }

    pub fn n_infected(&self) -> usize {
        self.population
            .live()
            .filter_map(Agent::as_carrier)
            .filter(|carrier| carrier.is_infected())
            .count()
    }

    pub fn n_deceased(&self) -> usize {
        self.population.n_deceased()
    }

    pub fn n_cured(&self) -> u32 {
        self.cured
    }

    pub fn cycle(&self) -> u32 {
        self.cycle
    }

    /// Populate the grid for a new run with `params`.
    ///
    /// Queries `predictor` for the expected death toll beforehand.
    /// Ignored while a run is in progress.
    pub fn start(&mut self, params: RunParams, predictor: &Predictor) -> Result<()> {
        if self.is_running() {
            log::warn!("ignored start request while running");
            return Ok(());
        }
        self.reset();

        self.predicted = predictor
            .predict(&params)
            .context("failed to predict outcome")?;
        log::info!("starting {params:?}, predicted deaths: {}", self.predicted);

        self.populate(&params)
            .context("failed to populate the grid")?;

        self.params = Some(params);
        self.phase = Phase::Running;
        Ok(())
    }

    /// Halt the current run before its next tick without reporting it.
    pub fn stop(&mut self) {
        if self.is_running() {
            log::info!("stopped at cycle {}", self.cycle);
            self.phase = Phase::Terminated;
        }
    }

    /// Clear the population and counters.
    pub fn reset(&mut self) {
        self.population.clear();
        self.cycle = 0;
        self.cured = 0;
        self.predicted = 0;
        self.phase = Phase::Idle;
    }

    /// Start a fresh run with the parameters of the previous one.
    pub fn restart(&mut self, predictor: &Predictor) -> Result<()> {
        let Some(params) = self.params else {
            log::warn!("ignored restart request without a previous start");
            return Ok(());
        };
        self.reset();
        self.start(params, predictor)
    }

    /// Advance the world by one tick.
    ///
    /// Returns the outcome of the run if it terminated during this tick,
    /// after training `predictor` with the number of deceased carriers.
    pub fn step(&mut self, predictor: &mut Predictor) -> Result<Option<Outcome>> {
        let Some(params) = self.params.filter(|_| self.is_running()) else {
            log::warn!("ignored step request in phase {:?}", self.phase);
            return Ok(None);
        };

        // Agents dying mid-tick are dropped from `live`, so walk a snapshot.
        let order = self.population.live_ids().to_vec();
        for id in order {
            let kind = *self.population.get(id).kind();
            match kind {
                Kind::Carrier(_) => self.move_carrier(id, &params),
                Kind::Curer(curer) => self.move_curer(id, curer),
            }
        }
        self.cycle += 1;
        log::debug!(
            "cycle {}: {} infected, {} deceased, {} cured",
            self.cycle(),
            self.n_infected(),
            self.n_deceased(),
            self.n_cured()
        );

        let Some(termination) = self.termination() else {
            return Ok(None);
        };
        self.phase = Phase::Terminated;

        let deceased = self.n_deceased();
        predictor
            .train(&params, deceased as u32)
            .context("failed to train predictor")?;

        let report = Report {
            deceased,
            cycles: self.cycle,
            infectiousness: params.infectiousness,
            predicted: self.predicted,
            cured: self.cured,
            termination,
        };
        log::info!("{report:?}");

        let signal = if self.auto_restart {
            Signal::Restart
        } else {
            Signal::Stop
        };

        Ok(Some(Outcome { signal, report }))
    }

    fn populate(&mut self, params: &RunParams) -> Result<()> {
        let grid_size = self.grid_size();

        for i_patient in 0..params.n_patients {
            let pos = self
                .population
                .find_unique_position(grid_size, &mut self.rng)?;
            let carrier = Carrier::new(i_patient <= params.n_infected, params.death_cycles);
            self.population.spawn(Agent::carrier(pos, carrier));
        }

        for _ in 0..params.n_doctors {
            let pos = self
                .population
                .find_unique_position(grid_size, &mut self.rng)?;
            self.population.spawn(Agent::curer(pos));
        }

        Ok(())
    }

    fn move_carrier(&mut self, id: AgentId, params: &RunParams) {
        let Some(carrier) = self.population.get_mut(id).as_carrier_mut() else {
            return;
        };
        carrier.tick_infection_age();
        if carrier.is_passed_away() {
            self.population.retire(id);
            log::debug!("carrier {id:?} passed away at cycle {}", self.cycle);
            return;
        }

        let target = self.population.get(id).step(&mut self.rng);
        if self.population.is_free(target, self.grid_size()) {
            self.population.get_mut(id).set_pos(target);
            return;
        }

        if let Some(other) = self.infected_carrier_at(target) {
            let should_infect = self.rng.random::<f64>() >= params.infectiousness as f64 / 10.0;
            if should_infect {
                if let Some(carrier) = self.population.get_mut(id).as_carrier_mut() {
                    carrier.expose_to(&other);
                }
            }
        }

        self.relocate(id);
    }

    fn move_curer(&mut self, id: AgentId, curer: Curer) {
        let target = self.population.get(id).step(&mut self.rng);
        if self.population.is_free(target, self.grid_size()) {
            self.population.get_mut(id).set_pos(target);
            return;
        }

        if let Some(patient_id) = self.population.occupant_at(target) {
            let agent = self.population.get_mut(patient_id);
            if let Some(carrier) = agent.as_carrier_mut().filter(|c| c.is_infected()) {
                log::debug!(
                    "carrier {patient_id:?} cured by {id:?} after {} cycles",
                    carrier.infection_age()
                );
                curer.cure(carrier);
                self.cured += 1;
            }
        }

        self.relocate(id);
    }

    fn infected_carrier_at(&self, pos: Position) -> Option<Carrier> {
        let id = self.population.occupant_at(pos)?;
        self.population
            .get(id)
            .as_carrier()
            .filter(|carrier| carrier.is_infected())
            .copied()
    }

    fn relocate(&mut self, id: AgentId) {
        let step = self.population.find_free_step(
            id,
            self.grid_size(),
            self.world.max_step_attempts,
            &mut self.rng,
        );
        if let Some(pos) = step {
            self.population.get_mut(id).set_pos(pos);
        }
    }

    fn termination(&self) -> Option<Termination> {
        if self.n_infected() == 0 {
            Some(Termination::Contained)
        } else if self.cycle >= self.world.max_cycles {
            Some(Termination::SafetyCap)
        } else {
            None
        }
    }

    fn grid_size(&self) -> i32 {
        self.world.grid_size as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn params(n_doctors: u32) -> RunParams {
        RunParams {
            infectiousness: 5,
            n_doctors,
            n_patients: 10,
            n_infected: 3,
            death_cycles: 5,
        }
    }

    fn engine(seed: u64) -> Engine {
        Engine::new(
            WorldConfig::default(),
            false,
            ChaCha12Rng::seed_from_u64(seed),
        )
    }

    fn run_to_end(engine: &mut Engine, predictor: &mut Predictor) -> Outcome {
        loop {
            if let Some(outcome) = engine.step(predictor).unwrap() {
                return outcome;
            }
            assert!(engine.cycle() <= 1000);
        }
    }

    #[test]
    fn start_infects_one_more_than_requested() {
        let mut engine = engine(1);
        engine.start(params(0), &Predictor::new(50)).unwrap();
        assert_eq!(engine.phase(), Phase::Running);
        assert_eq!(engine.n_infected(), 4);
        assert_eq!(engine.population.live().count(), 10);
    }

    #[test]
    fn start_places_agents_on_distinct_cells() {
        let mut engine = engine(2);
        let params = RunParams {
            n_doctors: 150,
            n_patients: 300,
            n_infected: 10,
            ..params(0)
        };
        engine.start(params, &Predictor::new(300)).unwrap();

        let cells: HashSet<_> = engine.population.live().map(Agent::pos).collect();
        assert_eq!(cells.len(), 450);
        assert!(cells.iter().all(|pos| pos.within(25)));
    }

    #[test]
    fn seeded_run_without_doctors_is_reproducible() {
        let mut reports = Vec::new();
        for _ in 0..2 {
            let mut predictor = Predictor::new(50);
            let mut engine = engine(42);
            engine.start(params(0), &predictor).unwrap();
            let outcome = run_to_end(&mut engine, &mut predictor);
            assert_eq!(outcome.signal, Signal::Stop);
            reports.push(outcome.report);
        }

        // Every carrier ages every cycle, so all of them die together.
        let report = &reports[0];
        assert_eq!(report.deceased, 10);
        assert_eq!(report.cycles, 5);
        assert_eq!(report.cured, 0);
        assert_eq!(report.infectiousness, 5);
        assert_eq!(report.termination, Termination::Contained);
        assert_eq!(reports[0], reports[1]);
    }

    #[test]
    fn seeded_run_with_doctors_is_reproducible() {
        let params = RunParams {
            n_doctors: 20,
            n_patients: 40,
            n_infected: 10,
            death_cycles: 30,
            ..params(0)
        };

        let mut reports = Vec::new();
        for _ in 0..2 {
            let mut predictor = Predictor::new(50);
            let mut engine = engine(9);
            engine.start(params, &predictor).unwrap();
            reports.push(run_to_end(&mut engine, &mut predictor).report);
        }
        assert_eq!(reports[0], reports[1]);
    }

    #[test]
    fn no_doctors_means_no_cures() {
        let mut predictor = Predictor::new(50);
        let mut engine = engine(3);
        let params = RunParams {
            death_cycles: 40,
            ..params(0)
        };
        engine.start(params, &predictor).unwrap();
        while engine.step(&mut predictor).unwrap().is_none() {
            assert_eq!(engine.n_cured(), 0);
        }
        assert_eq!(engine.n_cured(), 0);
    }

    #[test]
    fn infection_age_only_drops_on_cure() {
        let mut predictor = Predictor::new(60);
        let mut engine = engine(4);
        let params = RunParams {
            n_doctors: 30,
            n_patients: 60,
            n_infected: 30,
            death_cycles: 25,
            ..params(0)
        };
        engine.start(params, &predictor).unwrap();

        let ages = |engine: &Engine| -> Vec<(AgentId, u32)> {
            engine
                .population
                .live_ids()
                .iter()
                .filter_map(|&id| {
                    let carrier = engine.population.get(id).as_carrier()?;
                    Some((id, carrier.infection_age()))
                })
                .collect()
        };

        loop {
            let before = ages(&engine);
            let cured_before = engine.n_cured();
            let done = engine.step(&mut predictor).unwrap().is_some();

            let mut n_reset = 0;
            for (id, age) in before {
                let carrier = engine.population.get(id).as_carrier().unwrap();
                let now = carrier.infection_age();
                if !engine.population.is_live(id) {
                    assert!(carrier.is_passed_away());
                } else if now != age + 1 {
                    // Cured this tick, before or after its own move.
                    assert!(now <= 1);
                    n_reset += 1;
                }
            }
            assert!(n_reset as u32 <= engine.n_cured() - cured_before);

            if done {
                break;
            }
        }
    }

    #[test]
    fn deceased_never_reappear_in_live_population() {
        let mut predictor = Predictor::new(50);
        let mut engine = engine(5);
        let params = RunParams {
            n_doctors: 5,
            death_cycles: 8,
            ..params(0)
        };
        engine.start(params, &predictor).unwrap();

        loop {
            let done = engine.step(&mut predictor).unwrap().is_some();
            let population = &engine.population;
            for &id in population.deceased_ids() {
                assert!(!population.is_live(id));
                let carrier = population.get(id).as_carrier().unwrap();
                assert!(carrier.is_passed_away());
            }
            for agent in population.live() {
                assert!(
                    agent
                        .as_carrier()
                        .is_none_or(|carrier| !carrier.is_passed_away())
                );
            }
            if done {
                break;
            }
        }
    }

    fn small_engine(seed: u64) -> Engine {
        let world = WorldConfig {
            grid_size: 4,
            ..WorldConfig::default()
        };
        Engine::new(world, false, ChaCha12Rng::seed_from_u64(seed))
    }

    fn crowded_params(infectiousness: u32, n_doctors: u32) -> RunParams {
        RunParams {
            infectiousness,
            n_doctors,
            n_patients: 8,
            n_infected: 0,
            death_cycles: 5000,
        }
    }

    #[test]
    fn contact_spreads_infection_when_fully_infectious() {
        for seed in 0..10 {
            let mut predictor = Predictor::new(50);
            let mut engine = small_engine(seed);
            engine.start(crowded_params(0, 0), &predictor).unwrap();
            assert_eq!(engine.n_infected(), 1);

            while engine.n_infected() == 1 && engine.cycle() < 200 {
                engine.step(&mut predictor).unwrap();
            }
            assert!(engine.n_infected() > 1, "no spread with seed {seed}");
        }
    }

    #[test]
    fn contact_never_spreads_infection_at_ten() {
        for seed in 0..10 {
            let mut predictor = Predictor::new(50);
            let mut engine = small_engine(seed);
            engine.start(crowded_params(10, 0), &predictor).unwrap();

            for _ in 0..200 {
                engine.step(&mut predictor).unwrap();
                assert_eq!(engine.n_infected(), 1);
            }
            assert!(engine.is_running());
        }
    }

    #[test]
    fn curers_heal_every_infected_carrier() {
        for seed in 0..5 {
            let mut predictor = Predictor::new(50);
            let mut engine = small_engine(seed);
            let params = RunParams {
                n_infected: 3,
                ..crowded_params(10, 4)
            };
            engine.start(params, &predictor).unwrap();
            assert_eq!(engine.n_infected(), 4);

            let outcome = run_to_end(&mut engine, &mut predictor);
            assert_eq!(outcome.report.termination, Termination::Contained);
            assert!(outcome.report.cured >= 4);
            assert_eq!(outcome.report.deceased, 0);
            assert!(
                engine
                    .population
                    .live()
                    .filter_map(Agent::as_carrier)
                    .all(|carrier| !carrier.is_infected())
            );
        }
    }

    #[test]
    fn safety_cap_terminates_run() {
        let world = WorldConfig {
            max_cycles: 10,
            ..WorldConfig::default()
        };
        let mut engine = Engine::new(world, true, ChaCha12Rng::seed_from_u64(6));
        let mut predictor = Predictor::new(50);
        let params = RunParams {
            infectiousness: 0,
            death_cycles: 10_000,
            ..params(0)
        };
        engine.start(params, &predictor).unwrap();

        let outcome = run_to_end(&mut engine, &mut predictor);
        assert_eq!(outcome.report.cycles, 10);
        assert_eq!(outcome.report.termination, Termination::SafetyCap);
        assert_eq!(outcome.signal, Signal::Restart);
        assert_eq!(engine.phase(), Phase::Terminated);
        assert!(engine.step(&mut predictor).unwrap().is_none());
        assert_eq!(engine.cycle(), 10);
    }

    #[test]
    fn termination_trains_predictor() {
        let mut predictor = Predictor::new(50);
        let mut engine = engine(7);
        engine.start(params(0), &predictor).unwrap();
        run_to_end(&mut engine, &mut predictor);

        assert_eq!(predictor.predict(&params(0)).unwrap(), 10);

        engine.restart(&predictor).unwrap();
        assert!(engine.is_running());
        assert_eq!(engine.cycle(), 0);
        let outcome = run_to_end(&mut engine, &mut predictor);
        assert_eq!(outcome.report.predicted, 10);
    }

    #[test]
    fn stop_halts_without_training() {
        let mut predictor = Predictor::new(50);
        let mut engine = engine(8);
        engine.start(params(0), &predictor).unwrap();
        engine.step(&mut predictor).unwrap();
        engine.stop();

        assert_eq!(engine.phase(), Phase::Terminated);
        assert!(engine.step(&mut predictor).unwrap().is_none());
        assert_eq!(engine.cycle(), 1);
        assert_eq!(predictor.n_keys(), 0);

        engine.reset();
        assert_eq!(engine.phase(), Phase::Idle);
        assert_eq!(engine.population.live().count(), 0);
        assert_eq!(engine.n_deceased(), 0);
    }
}
