use serde::{Deserialize, Serialize};

/// Pluggable scorekeeper: a pure function of the two per-publisher counters.
///
/// In the default concave variant, duration enters sublinearly and visit
/// count only as a logarithmic term, so rapidly bouncing between pages
/// cannot outrank a site the user actually reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scorekeeper {
    #[default]
    Concave,
    /// Raw visit counter, duration ignored.
    Visits,
}

impl Scorekeeper {
    pub fn score(&self, duration_ms: u64, visits: u32) -> f64 {
        match self {
            Scorekeeper::Concave => {
                let seconds = duration_ms as f64 / 1_000.0;
                seconds.powf(0.6) + f64::from(visits).ln_1p()
            }
            Scorekeeper::Visits => f64::from(visits),
        }
    }
}
