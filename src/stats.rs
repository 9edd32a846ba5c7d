use crate::engine::{Report, Termination};

/// Running mean and variance of a series of values (Welford's algorithm).
#[derive(Default)]
pub struct Accumulator {
    n_vals: usize,
    mean: f64,
    diff_2_sum: f64,
}

impl Accumulator {
    pub fn add(&mut self, val: f64) {
        self.n_vals += 1;

        let diff_a = val - self.mean;
        self.mean += diff_a / self.n_vals as f64;

        let diff_b = val - self.mean;
        self.diff_2_sum += diff_a * diff_b;
    }

    pub fn mean(&self) -> f64 {
        if self.n_vals > 0 { self.mean } else { f64::NAN }
    }

    pub fn std_dev(&self) -> f64 {
        if self.n_vals > 1 {
            (self.diff_2_sum / (self.n_vals as f64 - 1.0)).sqrt()
        } else {
            f64::NAN
        }
    }
}

/// Aggregate of the reports produced during a session.
#[derive(Default)]
pub struct SessionStats {
    deceased: Accumulator,
    cycles: Accumulator,
    n_runs: usize,
    n_hits: usize,
    n_capped: usize,
}

#[derive(Debug, PartialEq)]
pub struct SessionSummary {
    pub n_runs: usize,
    pub mean_deceased: f64,
    pub std_dev_deceased: f64,
    pub mean_cycles: f64,
    /// Runs whose death toll matched the prediction made before they started.
    pub n_hits: usize,
    /// Runs stopped by the cycle cap.
    pub n_capped: usize,
}

impl SessionStats {
    pub fn add(&mut self, report: &Report) {
        self.n_runs += 1;
        self.deceased.add(report.deceased as f64);
        self.cycles.add(f64::from(report.cycles));
        if report.predicted as usize == report.deceased {
            self.n_hits += 1;
        }
        if report.termination == Termination::SafetyCap {
            self.n_capped += 1;
        }
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            n_runs: self.n_runs,
            mean_deceased: self.deceased.mean(),
            std_dev_deceased: self.deceased.std_dev(),
            mean_cycles: self.cycles.mean(),
            n_hits: self.n_hits,
            n_capped: self.n_capped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(deceased: usize, predicted: u32, termination: Termination) -> Report {
        Report {
            deceased,
            cycles: 10,
            infectiousness: 5,
            predicted,
            cured: 0,
            termination,
        }
    }

    #[test]
    fn accumulator_matches_direct_formulas() {
        let mut acc = Accumulator::default();
        for val in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            acc.add(val);
        }
        assert!((acc.mean() - 5.0).abs() < 1e-12);
        assert!((acc.std_dev() - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn empty_accumulator_is_nan() {
        let acc = Accumulator::default();
        assert!(acc.mean().is_nan());
        assert!(acc.std_dev().is_nan());
    }

    #[test]
    fn session_counts_hits_and_caps() {
        let mut stats = SessionStats::default();
        stats.add(&report(3, 0, Termination::Contained));
        stats.add(&report(3, 3, Termination::Contained));
        stats.add(&report(6, 3, Termination::SafetyCap));

        let summary = stats.summary();
        assert_eq!(summary.n_runs, 3);
        assert_eq!(summary.n_hits, 1);
        assert_eq!(summary.n_capped, 1);
        assert!((summary.mean_deceased - 4.0).abs() < 1e-12);
        assert!((summary.mean_cycles - 10.0).abs() < 1e-12);
    }
}
