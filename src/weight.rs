//! Per-event weights: generator weight times trigger scale factor

use crate::{
    error::{SampleError, SampleResult},
    numeric::Float,
    store::EventStore,
};

use eyre::ensure;
use serde::Deserialize;

/// Name of the generator-level weight column
pub const GENERATOR_WEIGHT: &str = "FONLLweight";

/// Column on which the trigger scale factor depends, unless configured
pub const DEFAULT_SF_VARIABLE: &str = "BToKEE_fit_l2_pt";

/// Scale factor and uncertainty outside of all bins, and for real data
pub const DEFAULT_SF: (Float, Float) = (1.0, 0.0);

/// Upper edge of a scale factor bin, which may be written `.inf` or `"inf"`
#[derive(Deserialize)]
#[serde(untagged)]
enum Edge {
    Number(Float),
    Text(String),
}
//
impl Edge {
    fn value(&self) -> eyre::Result<Float> {
        match self {
            Edge::Number(x) => Ok(*x),
            Edge::Text(s) => s
                .trim()
                .parse::<Float>()
                .map_err(|_| eyre::eyre!("Invalid scale factor bin edge '{}'", s)),
        }
    }
}

/// Raw `[ptmin, ptmax, value, uncertainty]` configuration entry
#[derive(Deserialize)]
pub struct RawBin(Edge, Edge, Float, Float);

/// One bin of the trigger scale factor
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScaleFactorBin {
    /// Lower edge (inclusive)
    pub low: Float,

    /// Upper edge (exclusive), possibly infinite
    pub high: Float,

    /// Scale factor
    pub value: Float,

    /// Uncertainty on the scale factor
    pub uncertainty: Float,
}
//
impl ScaleFactorBin {
    /// Decode and check a configuration entry
    pub fn from_raw(raw: &RawBin) -> eyre::Result<Self> {
        let bin = Self {
            low: raw.0.value()?,
            high: raw.1.value()?,
            value: raw.2,
            uncertainty: raw.3,
        };
        ensure!(
            !bin.low.is_nan() && !bin.high.is_nan() && bin.low < bin.high,
            "Scale factor bin [{}, {}) is empty",
            bin.low,
            bin.high
        );
        Ok(bin)
    }

    /// Truth that a value falls in the bin
    fn contains(&self, x: Float) -> bool {
        x >= self.low && (self.high.is_infinite() || x < self.high)
    }
}

/// Piecewise-constant trigger efficiency correction
#[derive(Clone, Debug, PartialEq)]
pub struct ScaleFactorTable {
    /// Column that the bins refer to
    pub variable: String,

    /// Bins, looked up in configuration order
    pub bins: Vec<ScaleFactorBin>,
}
//
impl ScaleFactorTable {
    /// Scale factor and uncertainty for a value of the binning variable
    ///
    /// The first bin that contains the value wins. Values outside of all
    /// bins (including NaN) get the neutral scale factor.
    ///
    pub fn lookup(&self, x: Float) -> (Float, Float) {
        self.bins
            .iter()
            .find(|bin| bin.contains(x))
            .map_or(DEFAULT_SF, |bin| (bin.value, bin.uncertainty))
    }
}

/// Weights attached to one event
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EventWeight {
    /// Generator-level weight
    pub generator: Float,

    /// Trigger scale factor
    pub sf_value: Float,

    /// Trigger scale factor uncertainty
    pub sf_error: Float,

    /// Product of the generator weight and the scale factor
    pub total: Float,
}
//
impl EventWeight {
    /// Weight of every real data event
    pub const DATA: Self = Self {
        generator: 1.,
        sf_value: DEFAULT_SF.0,
        sf_error: DEFAULT_SF.1,
        total: 1.,
    };
}

/// Weight computation, bound to the columns of one sample
pub enum WeightModel<'store> {
    /// Real data is never reweighted
    Data,

    /// Simulation is reweighted by the generator weight and trigger SF
    Simulation {
        /// Generator weights, if the sample has them
        generator: Option<&'store [Float]>,

        /// Values of the scale factor binning variable
        sf_variable: &'store [Float],

        /// Scale factor bins
        table: &'store ScaleFactorTable,
    },
}
//
impl<'store> WeightModel<'store> {
    /// Set up weight computation for a sample
    pub fn bind(
        table: &'store ScaleFactorTable,
        store: &'store EventStore,
        is_data: bool,
    ) -> SampleResult<Self> {
        if is_data {
            return Ok(WeightModel::Data);
        }
        let sf_variable = store.numeric(&table.variable).ok_or_else(|| {
            SampleError::Config(format!(
                "scale factor variable '{}' is missing or not numeric",
                table.variable
            ))
        })?;
        let generator = match store.column(GENERATOR_WEIGHT) {
            None => None,
            Some(_) => Some(store.numeric(GENERATOR_WEIGHT).ok_or_else(|| {
                SampleError::Config(format!("'{GENERATOR_WEIGHT}' column is not numeric"))
            })?),
        };
        Ok(WeightModel::Simulation {
            generator,
            sf_variable,
            table,
        })
    }

    /// Compute the weights of one event
    pub fn weigh(&self, row: usize) -> EventWeight {
        match self {
            WeightModel::Data => EventWeight::DATA,
            WeightModel::Simulation {
                generator,
                sf_variable,
                table,
            } => {
                let generator = generator.map_or(1., |w| w[row]);
                let (sf_value, sf_error) = table.lookup(sf_variable[row]);
                EventWeight {
                    generator,
                    sf_value,
                    sf_error,
                    total: generator * sf_value,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Column;

    fn table() -> ScaleFactorTable {
        ScaleFactorTable {
            variable: DEFAULT_SF_VARIABLE.to_owned(),
            bins: vec![
                ScaleFactorBin {
                    low: 0.,
                    high: 5.,
                    value: 1.1,
                    uncertainty: 0.05,
                },
                ScaleFactorBin {
                    low: 5.,
                    high: Float::INFINITY,
                    value: 1.0,
                    uncertainty: 0.0,
                },
            ],
        }
    }

    #[test]
    fn piecewise_lookup() {
        let table = table();
        assert_eq!(table.lookup(3.), (1.1, 0.05));
        assert_eq!(table.lookup(0.), (1.1, 0.05));
        assert_eq!(table.lookup(5.), (1.0, 0.0));
        assert_eq!(table.lookup(10.), (1.0, 0.0));
        assert_eq!(table.lookup(1e30), (1.0, 0.0));
        assert_eq!(table.lookup(-1.), DEFAULT_SF);
        assert_eq!(table.lookup(Float::NAN), DEFAULT_SF);
    }

    #[test]
    fn first_matching_bin_wins() {
        let mut table = table();
        table.bins.insert(
            0,
            ScaleFactorBin {
                low: 2.,
                high: 4.,
                value: 0.9,
                uncertainty: 0.1,
            },
        );
        assert_eq!(table.lookup(3.), (0.9, 0.1));
        assert_eq!(table.lookup(1.), (1.1, 0.05));
    }

    #[test]
    fn raw_bins_accept_infinity_spellings() {
        let raw: Vec<RawBin> =
            serde_yaml::from_str("[[0, 5, 1.1, 0.05], [5, .inf, 1.0, 0.0], [5, \"inf\", 1, 0]]")
                .unwrap();
        let bins = raw
            .iter()
            .map(ScaleFactorBin::from_raw)
            .collect::<eyre::Result<Vec<_>>>()
            .unwrap();
        assert_eq!(bins[0].high, 5.);
        assert!(bins[1].high.is_infinite());
        assert!(bins[2].high.is_infinite());
    }

    #[test]
    fn inverted_bin_is_rejected() {
        let raw: RawBin = serde_yaml::from_str("[5, 1, 1.0, 0.0]").unwrap();
        assert!(ScaleFactorBin::from_raw(&raw).is_err());
    }

    #[test]
    fn data_weight_is_one() {
        let store = EventStore::from_columns(vec![
            (DEFAULT_SF_VARIABLE.to_owned(), Column::Numeric(vec![3., 10.])),
            (GENERATOR_WEIGHT.to_owned(), Column::Numeric(vec![2., 2.])),
        ])
        .unwrap();
        let table = table();
        let model = WeightModel::bind(&table, &store, true).unwrap();
        for row in 0..2 {
            assert_eq!(model.weigh(row), EventWeight::DATA);
        }
    }

    #[test]
    fn simulation_weight_is_generator_times_sf() {
        let store = EventStore::from_columns(vec![
            (DEFAULT_SF_VARIABLE.to_owned(), Column::Numeric(vec![3., 10., -1.])),
            (GENERATOR_WEIGHT.to_owned(), Column::Numeric(vec![2., 0.5, 4.])),
        ])
        .unwrap();
        let table = table();
        let model = WeightModel::bind(&table, &store, false).unwrap();
        let w = model.weigh(0);
        assert_eq!((w.generator, w.sf_value, w.sf_error), (2., 1.1, 0.05));
        assert_eq!(w.total, 2. * 1.1);
        assert_eq!(model.weigh(1).total, 0.5);
        assert_eq!(model.weigh(2).total, 4.);
    }

    #[test]
    fn missing_generator_weight_defaults_to_one() {
        let store = EventStore::from_columns(vec![(
            DEFAULT_SF_VARIABLE.to_owned(),
            Column::Numeric(vec![3.]),
        )])
        .unwrap();
        let table = table();
        let model = WeightModel::bind(&table, &store, false).unwrap();
        assert_eq!(model.weigh(0).generator, 1.);
        assert_eq!(model.weigh(0).total, 1.1);
    }

    #[test]
    fn text_generator_weight_is_rejected() {
        let store = EventStore::from_columns(vec![
            (DEFAULT_SF_VARIABLE.to_owned(), Column::Numeric(vec![3.])),
            (GENERATOR_WEIGHT.to_owned(), Column::Text(vec!["high".to_owned()])),
        ])
        .unwrap();
        let table = table();
        assert!(matches!(
            WeightModel::bind(&table, &store, false),
            Err(SampleError::Config(_))
        ));
        // Real data never reads it
        assert!(WeightModel::bind(&table, &store, true).is_ok());
    }

    #[test]
    fn simulation_needs_the_sf_variable() {
        let store = EventStore::default();
        let table = table();
        assert!(matches!(
            WeightModel::bind(&table, &store, false),
            Err(SampleError::Config(_))
        ));
        assert!(WeightModel::bind(&table, &store, true).is_ok());
    }
}
