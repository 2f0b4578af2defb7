use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use statrs::distribution::Normal;

use crate::error::CapitalError;
use crate::scenarios::deal::DriverShocks;
use crate::CapitalResult;

/// Tolerance for symmetry and unit-diagonal checks on a correlation matrix.
const MATRIX_TOLERANCE: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverDistribution {
    /// Multiplier `1 + N(0, sigma)`
    #[default]
    Normal,
    /// Multiplier `exp(N(0, sigma))`
    Lognormal,
    /// Not sampled natively; treated as normal
    Pert,
}

/// Volatility of one driver multiplier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverVolatility {
    #[serde(default)]
    pub std_dev: f64,
    #[serde(default)]
    pub distribution: DriverDistribution,
}

/// Drivers in the fixed order used by the correlation matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Driver {
    Occupancy,
    Adr,
    InterestRate,
}

impl Driver {
    pub const ORDER: [Driver; 3] = [Driver::Occupancy, Driver::Adr, Driver::InterestRate];

    pub fn field(self) -> &'static str {
        match self {
            Driver::Occupancy => "occupancy",
            Driver::Adr => "adr",
            Driver::InterestRate => "interestRate",
        }
    }
}

/// What was actually sampled, reported with the result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplingReport {
    pub occupancy: DriverDistribution,
    pub adr: DriverDistribution,
    pub interest_rate: DriverDistribution,
    pub correlated: bool,
}

// ---------------------------------------------------------------------------
// Random source
// ---------------------------------------------------------------------------

/// Source of standard normal draws. Swappable so runs can be driven by a
/// fixed sequence.
pub trait RandomSource {
    fn standard_normal(&mut self) -> f64;
}

/// `StdRng`-backed source; seeded runs are bit-reproducible.
pub struct SeededSource {
    rng: StdRng,
    normal: Normal,
}

impl SeededSource {
    pub fn new(seed: Option<u64>) -> CapitalResult<Self> {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        let normal = Normal::new(0.0, 1.0).map_err(|e| CapitalError::InvalidInput {
            field: "distribution".into(),
            reason: format!("Invalid Normal parameters: {e}"),
        })?;
        Ok(Self { rng, normal })
    }
}

impl RandomSource for SeededSource {
    fn standard_normal(&mut self) -> f64 {
        self.rng.sample(self.normal)
    }
}

// ---------------------------------------------------------------------------
// Sampling plan
// ---------------------------------------------------------------------------

/// Validated per-driver sampling setup.
#[derive(Debug, Clone)]
pub struct SamplingPlan {
    sigmas: [f64; 3],
    distributions: [DriverDistribution; 3],
    cholesky: Option<[[f64; 3]; 3]>,
}

impl SamplingPlan {
    /// Build a plan from per-driver volatilities and an optional correlation
    /// matrix. Unsupported choices fall back with a warning; only invalid
    /// volatilities are errors.
    pub fn new(
        volatilities: [DriverVolatility; 3],
        correlation: Option<&[[f64; 3]; 3]>,
        warnings: &mut Vec<String>,
    ) -> CapitalResult<Self> {
        let mut sigmas = [0.0; 3];
        let mut distributions = [DriverDistribution::Normal; 3];
        for (i, driver) in Driver::ORDER.iter().enumerate() {
            let vol = volatilities[i];
            if !vol.std_dev.is_finite() || vol.std_dev < 0.0 {
                return Err(CapitalError::InvalidInput {
                    field: format!("{}.stdDev", driver.field()),
                    reason: format!("standard deviation must be finite and >= 0 (got {})", vol.std_dev),
                });
            }
            sigmas[i] = vol.std_dev;
            distributions[i] = match vol.distribution {
                DriverDistribution::Pert => {
                    warnings.push(format!(
                        "pert distribution for {} is not supported; sampling normal instead",
                        driver.field()
                    ));
                    DriverDistribution::Normal
                }
                other => other,
            };
        }

        let cholesky = match correlation {
            None => None,
            Some(_)
                if volatilities
                    .iter()
                    .any(|v| v.distribution != DriverDistribution::Normal) =>
            {
                warnings.push(
                    "correlation requires normal distributions for every driver; sampling independently"
                        .into(),
                );
                None
            }
            Some(matrix) => match cholesky3(matrix) {
                Some(l) => Some(l),
                None => {
                    warnings.push(
                        "correlation matrix is not a valid positive-definite correlation matrix; sampling independently"
                            .into(),
                    );
                    None
                }
            },
        };

        Ok(Self {
            sigmas,
            distributions,
            cholesky,
        })
    }

    pub fn report(&self) -> SamplingReport {
        SamplingReport {
            occupancy: self.distributions[0],
            adr: self.distributions[1],
            interest_rate: self.distributions[2],
            correlated: self.cholesky.is_some(),
        }
    }

    /// Draw one set of driver multipliers. Always consumes exactly three
    /// standard normals so sequences stay aligned across configurations.
    pub fn draw(&self, source: &mut dyn RandomSource) -> DriverShocks {
        let z = [
            source.standard_normal(),
            source.standard_normal(),
            source.standard_normal(),
        ];
        let e = match &self.cholesky {
            Some(l) => {
                let mut e = [0.0; 3];
                for (i, row) in l.iter().enumerate() {
                    e[i] = (0..=i).map(|j| row[j] * z[j]).sum();
                }
                e
            }
            None => z,
        };

        let m: Vec<f64> = (0..3)
            .map(|i| multiplier(self.distributions[i], self.sigmas[i], e[i]))
            .collect();
        DriverShocks {
            occupancy: m[0],
            adr: m[1],
            interest_rate: m[2],
        }
    }
}

fn multiplier(distribution: DriverDistribution, sigma: f64, e: f64) -> f64 {
    if sigma == 0.0 {
        return 1.0;
    }
    match distribution {
        DriverDistribution::Normal | DriverDistribution::Pert => 1.0 + sigma * e,
        DriverDistribution::Lognormal => (sigma * e).exp(),
    }
}

/// Lower-triangular Cholesky factor of a 3x3 correlation matrix, or `None`
/// when the matrix is not symmetric with a unit diagonal, has entries
/// outside [-1, 1], or is not positive definite.
pub fn cholesky3(m: &[[f64; 3]; 3]) -> Option<[[f64; 3]; 3]> {
    for i in 0..3 {
        if (m[i][i] - 1.0).abs() > MATRIX_TOLERANCE {
            return None;
        }
        for j in 0..3 {
            if !m[i][j].is_finite()
                || m[i][j].abs() > 1.0 + MATRIX_TOLERANCE
                || (m[i][j] - m[j][i]).abs() > MATRIX_TOLERANCE
            {
                return None;
            }
        }
    }

    let mut l = [[0.0; 3]; 3];
    for i in 0..3 {
        for j in 0..=i {
            let sum: f64 = (0..j).map(|k| l[i][k] * l[j][k]).sum();
            if i == j {
                let d = m[i][i] - sum;
                if d <= MATRIX_TOLERANCE {
                    return None;
                }
                l[i][j] = d.sqrt();
            } else {
                l[i][j] = (m[i][j] - sum) / l[j][j];
            }
        }
    }
    Some(l)
}
