//! The process-global potential table and its parameter-vector mapping.
//!
//! Columns are laid out in a fixed order for S species: the S(S+1)/2 pair
//! columns, the matching cutoff-function columns, then one angular column
//! per species. When electrostatics is active the parameter vector carries,
//! after all column parameters, the free charges of the first S-1 species
//! followed by the screening parameter; the last species' charge is derived
//! from electroneutrality.

use crate::numerics::spline::{self, SplineError, SplineSlot};
use crate::numerics::squared;
use serde::{Deserialize, Serialize};

/// Scale of the quadratic penalty added per out-of-bounds free parameter.
pub const BOUNDS_PUNISHMENT: f64 = 1.0e7;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TableError {
    #[error("parameter vector has {actual} entries, table expects {expected}")]
    ParameterLengthMismatch { expected: usize, actual: usize },
    #[error("free parameter {index} is not finite: {value}")]
    NonFiniteParameter { index: usize, value: f64 },
    #[error("column {column} has no analytic rule but the table mode requires one")]
    MissingAnalyticRule { column: usize },
    #[error("column {column} rule declares {expected} parameters but carries {actual} bounds")]
    BoundsCountMismatch {
        column: usize,
        expected: usize,
        actual: usize,
    },
    #[error("column {column} grid kind does not match the table mode")]
    GridKindMismatch { column: usize },
    #[error("table declares {declared} species but holds {actual} columns, expected {expected}")]
    ColumnCountMismatch {
        declared: usize,
        actual: usize,
        expected: usize,
    },
    #[error("column {column} holds {knots} knots, at least 2 are required")]
    TooFewKnots { column: usize, knots: usize },
    #[error("structure payload has {actual} entries, table expects {expected}")]
    StructurePayloadMismatch { expected: usize, actual: usize },
    #[error("table has no charge block")]
    MissingChargeBlock,
    #[error(transparent)]
    Spline(#[from] SplineError),
}

/// Knot coordinates of one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KnotGrid {
    Uniform { start: f64, step: f64 },
    Explicit { coords: Vec<f64> },
}

impl KnotGrid {
    pub fn coordinate(&self, index: usize) -> f64 {
        match self {
            Self::Uniform { start, step } => start + step * index as f64,
            Self::Explicit { coords } => coords[index],
        }
    }
}

/// Closed-form potential shapes available to the analytic table modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalyticForm {
    /// `depth·((1 - exp(-width·(r - r0)))² - 1)`, parameters
    /// `[depth, width, r0]`.
    Morse,
    /// `0.5·stiffness·(r - rest)²`, parameters `[stiffness, rest]`; the
    /// usual shape of a core-shell bonded column.
    HarmonicSpring,
    /// `0.5·stiffness·(x - x0)²` over an angular coordinate, parameters
    /// `[stiffness, x0]`.
    CosineHarmonic,
}

impl AnalyticForm {
    pub const fn parameter_count(self) -> usize {
        match self {
            Self::Morse => 3,
            Self::HarmonicSpring | Self::CosineHarmonic => 2,
        }
    }

    pub fn sample(self, params: &[f64], x: f64) -> f64 {
        match self {
            Self::Morse => {
                let ratio = 1.0 - (-params[1] * (x - params[2])).exp();
                params[0] * (ratio * ratio - 1.0)
            }
            Self::HarmonicSpring | Self::CosineHarmonic => {
                0.5 * params[0] * squared(x - params[1])
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamBounds {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticRule {
    pub form: AnalyticForm,
    pub bounds: Vec<ParamBounds>,
}

/// How the optimizer's flat parameter vector maps onto the dense table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMode {
    /// Mode 0: the parameter vector holds the knot values directly.
    Direct,
    /// Mode 3: analytic rules on uniform knot grids.
    AnalyticUniform,
    /// Mode 4: analytic rules on explicit knot grids.
    AnalyticScaled,
    /// Mode 5: analytic columns are resampled, the rest read dense values;
    /// afterwards the dense copy is used like mode 0.
    Hybrid,
}

impl SyncMode {
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Direct),
            3 => Some(Self::AnalyticUniform),
            4 => Some(Self::AnalyticScaled),
            5 => Some(Self::Hybrid),
            _ => None,
        }
    }

    pub const fn to_raw(self) -> u8 {
        match self {
            Self::Direct => 0,
            Self::AnalyticUniform => 3,
            Self::AnalyticScaled => 4,
            Self::Hybrid => 5,
        }
    }

    pub const fn is_analytic(self) -> bool {
        !matches!(self, Self::Direct)
    }
}

/// One tabulated column: knot grid, sampled values, boundary slopes, cutoff
/// radius, and the curvature cache rebuilt on every synchronization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableColumn {
    pub grid: KnotGrid,
    pub values: Vec<f64>,
    /// First-derivative clamp at the left end; [`spline::NATURAL_BOUNDARY`]
    /// selects a natural end.
    pub left_slope: f64,
    pub right_slope: f64,
    /// Cutoff radius of this column.
    pub end: f64,
    /// Zero marks a core-shell bonded pair column whose Coulomb share is
    /// already carried by the short-range spring.
    pub charge_weight: f64,
    pub analytic: Option<AnalyticRule>,
    #[serde(skip)]
    curvature: Vec<f64>,
}

impl TableColumn {
    pub fn new(grid: KnotGrid, values: Vec<f64>, left_slope: f64, right_slope: f64, end: f64) -> Self {
        Self {
            grid,
            values,
            left_slope,
            right_slope,
            end,
            charge_weight: 1.0,
            analytic: None,
            curvature: Vec::new(),
        }
    }

    pub fn with_charge_weight(mut self, charge_weight: f64) -> Self {
        self.charge_weight = charge_weight;
        self
    }

    pub fn with_analytic(mut self, rule: AnalyticRule) -> Self {
        self.analytic = Some(rule);
        self
    }

    /// Rebuild the curvature cache from the current values. Stale curvature
    /// silently corrupts every force and stress downstream, so the table
    /// calls this for every column on every synchronization.
    fn refresh_curvature(&mut self) -> Result<(), SplineError> {
        self.curvature = match &self.grid {
            KnotGrid::Uniform { step, .. } => spline::second_derivatives_uniform(
                *step,
                &self.values,
                self.left_slope,
                self.right_slope,
            )?,
            KnotGrid::Explicit { coords } => spline::second_derivatives_explicit(
                coords,
                &self.values,
                self.left_slope,
                self.right_slope,
            )?,
        };
        Ok(())
    }

    pub fn evaluate(&self, slot: SplineSlot) -> f64 {
        spline::evaluate(&self.values, &self.curvature, slot)
    }

    pub fn evaluate_with_gradient(&self, slot: SplineSlot) -> (f64, f64) {
        spline::evaluate_with_gradient(&self.values, &self.curvature, slot)
    }
}

/// Derived per-species charges and the screening parameter of one
/// evaluation round.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargeSet {
    pub charges: Vec<f64>,
    pub kappa: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PotentialTable {
    pub species_count: usize,
    pub mode: SyncMode,
    pub columns: Vec<TableColumn>,
    /// Whether the parameter vector carries the charge/screening block.
    pub with_charges: bool,
}

impl PotentialTable {
    pub const fn pair_column_count(species_count: usize) -> usize {
        species_count * (species_count + 1) / 2
    }

    /// Symmetric pair-column index for an (ordered or unordered) species
    /// pair.
    pub fn pair_column_index(&self, s1: usize, s2: usize) -> usize {
        let (a, b) = if s1 <= s2 { (s1, s2) } else { (s2, s1) };
        a * self.species_count + b - a * (a + 1) / 2
    }

    pub fn cutoff_column_index(&self, s1: usize, s2: usize) -> usize {
        Self::pair_column_count(self.species_count) + self.pair_column_index(s1, s2)
    }

    pub fn angular_column_index(&self, species: usize) -> usize {
        2 * Self::pair_column_count(self.species_count) + species
    }

    pub fn expected_column_count(&self) -> usize {
        2 * Self::pair_column_count(self.species_count) + self.species_count
    }

    /// Structural checks run once before the first evaluation.
    pub fn validate_shape(&self) -> Result<(), TableError> {
        let expected = self.expected_column_count();
        if self.columns.len() != expected {
            return Err(TableError::ColumnCountMismatch {
                declared: self.species_count,
                actual: self.columns.len(),
                expected,
            });
        }
        for (index, column) in self.columns.iter().enumerate() {
            if column.values.len() < 2 {
                return Err(TableError::TooFewKnots {
                    column: index,
                    knots: column.values.len(),
                });
            }
            match (&column.analytic, self.mode) {
                (Some(rule), _) => {
                    if rule.bounds.len() != rule.form.parameter_count() {
                        return Err(TableError::BoundsCountMismatch {
                            column: index,
                            expected: rule.form.parameter_count(),
                            actual: rule.bounds.len(),
                        });
                    }
                }
                (None, SyncMode::AnalyticUniform | SyncMode::AnalyticScaled) => {
                    return Err(TableError::MissingAnalyticRule { column: index });
                }
                (None, _) => {}
            }
            match (&column.grid, self.mode) {
                (KnotGrid::Explicit { .. }, SyncMode::AnalyticUniform)
                | (KnotGrid::Uniform { .. }, SyncMode::AnalyticScaled) => {
                    return Err(TableError::GridKindMismatch { column: index });
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn column_parameter_len(&self) -> usize {
        self.columns
            .iter()
            .map(|column| match (self.mode, &column.analytic) {
                (SyncMode::Direct, _) | (SyncMode::Hybrid, None) => column.values.len(),
                (_, Some(rule)) => rule.form.parameter_count(),
                (_, None) => 0,
            })
            .sum()
    }

    /// Index of the first charge parameter, when electrostatics is active.
    pub fn charge_offset(&self) -> Option<usize> {
        self.with_charges.then(|| self.column_parameter_len())
    }

    /// Total length of the flat parameter vector this table consumes.
    pub fn parameter_len(&self) -> usize {
        self.column_parameter_len() + if self.with_charges { self.species_count } else { 0 }
    }

    /// Map the optimizer's parameter vector onto the dense knot values and
    /// rebuild every column's curvature cache.
    pub fn sync(&mut self, params: &[f64]) -> Result<(), TableError> {
        let expected = self.parameter_len();
        if params.len() != expected {
            return Err(TableError::ParameterLengthMismatch {
                expected,
                actual: params.len(),
            });
        }

        let mode = self.mode;
        let mut cursor = 0;
        for (index, column) in self.columns.iter_mut().enumerate() {
            match (mode, &column.analytic) {
                (SyncMode::Direct, _) | (SyncMode::Hybrid, None) => {
                    let knots = column.values.len();
                    column.values.copy_from_slice(&params[cursor..cursor + knots]);
                    cursor += knots;
                }
                (_, Some(rule)) => {
                    let count = rule.form.parameter_count();
                    let segment = &params[cursor..cursor + count];
                    for (offset, &value) in segment.iter().enumerate() {
                        if !value.is_finite() {
                            return Err(TableError::NonFiniteParameter {
                                index: cursor + offset,
                                value,
                            });
                        }
                    }
                    let form = rule.form;
                    for knot in 0..column.values.len() {
                        column.values[knot] = form.sample(segment, column.grid.coordinate(knot));
                    }
                    cursor += count;
                }
                (_, None) => return Err(TableError::MissingAnalyticRule { column: index }),
            }
        }

        for column in &mut self.columns {
            column.refresh_curvature()?;
        }
        Ok(())
    }

    /// Per-species charges with the electroneutrality-derived last entry,
    /// plus the screening parameter.
    pub fn charges(&self, params: &[f64], abundance: &[f64]) -> Result<ChargeSet, TableError> {
        let offset = self.charge_offset().ok_or(TableError::MissingChargeBlock)?;
        let expected = self.parameter_len();
        if params.len() != expected {
            return Err(TableError::ParameterLengthMismatch {
                expected,
                actual: params.len(),
            });
        }

        let species_count = self.species_count;
        let mut charges = vec![0.0; species_count];
        let mut weighted_sum = 0.0;
        for (species, charge) in charges.iter_mut().take(species_count - 1).enumerate() {
            *charge = params[offset + species];
            weighted_sum += abundance[species] * *charge;
        }
        charges[species_count - 1] = -weighted_sum / abundance[species_count - 1];
        Ok(ChargeSet {
            charges,
            kappa: params[offset + species_count - 1],
        })
    }

    /// Quadratic penalty for free parameters outside their bounds; zero in
    /// direct mode.
    pub fn punishment(&self, params: &[f64]) -> f64 {
        if !self.mode.is_analytic() {
            return 0.0;
        }
        let mut sum = 0.0;
        let mut cursor = 0;
        for column in &self.columns {
            match &column.analytic {
                Some(rule) => {
                    for (bounds, &value) in rule.bounds.iter().zip(&params[cursor..]) {
                        if value < bounds.min {
                            sum += BOUNDS_PUNISHMENT * squared(bounds.min - value);
                        } else if value > bounds.max {
                            sum += BOUNDS_PUNISHMENT * squared(value - bounds.max);
                        }
                    }
                    cursor += rule.form.parameter_count();
                }
                None => cursor += column.values.len(),
            }
        }
        sum
    }

    /// Flatten the table structure (boundary slopes, cutoffs, knot grids)
    /// for the resynchronization broadcast.
    pub fn structure_to_vec(&self) -> Vec<f64> {
        let mut payload = Vec::new();
        for column in &self.columns {
            payload.push(column.left_slope);
            payload.push(column.right_slope);
            payload.push(column.end);
            match &column.grid {
                KnotGrid::Uniform { start, step } => {
                    payload.push(*start);
                    payload.push(*step);
                }
                KnotGrid::Explicit { coords } => payload.extend_from_slice(coords),
            }
        }
        payload
    }

    /// Inverse of [`Self::structure_to_vec`]; every rank holds the same
    /// column/grid shape, only the numbers change.
    pub fn structure_from_vec(&mut self, payload: &[f64]) -> Result<(), TableError> {
        let expected = self.structure_to_vec().len();
        if payload.len() != expected {
            return Err(TableError::StructurePayloadMismatch {
                expected,
                actual: payload.len(),
            });
        }
        let mut cursor = 0;
        for column in &mut self.columns {
            column.left_slope = payload[cursor];
            column.right_slope = payload[cursor + 1];
            column.end = payload[cursor + 2];
            cursor += 3;
            match &mut column.grid {
                KnotGrid::Uniform { start, step } => {
                    *start = payload[cursor];
                    *step = payload[cursor + 1];
                    cursor += 2;
                }
                KnotGrid::Explicit { coords } => {
                    let count = coords.len();
                    coords.copy_from_slice(&payload[cursor..cursor + count]);
                    cursor += count;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{
        AnalyticForm, AnalyticRule, KnotGrid, ParamBounds, PotentialTable, SyncMode, TableColumn,
        TableError,
    };
    use crate::numerics::spline::{NATURAL_BOUNDARY, SplineSlot};

    fn uniform_column(values: Vec<f64>) -> TableColumn {
        TableColumn::new(
            KnotGrid::Uniform {
                start: 0.0,
                step: 0.5,
            },
            values,
            NATURAL_BOUNDARY,
            NATURAL_BOUNDARY,
            2.0,
        )
    }

    fn single_species_table(mode: SyncMode) -> PotentialTable {
        // one species: 1 pair + 1 cutoff + 1 angular column
        PotentialTable {
            species_count: 1,
            mode,
            columns: vec![
                uniform_column(vec![0.0; 5]),
                uniform_column(vec![0.0; 5]),
                uniform_column(vec![0.0; 5]),
            ],
            with_charges: false,
        }
    }

    #[test]
    fn pair_column_indexing_is_symmetric_and_dense() {
        let table = PotentialTable {
            species_count: 2,
            mode: SyncMode::Direct,
            columns: Vec::new(),
            with_charges: false,
        };
        assert_eq!(table.pair_column_index(0, 0), 0);
        assert_eq!(table.pair_column_index(0, 1), 1);
        assert_eq!(table.pair_column_index(1, 0), 1);
        assert_eq!(table.pair_column_index(1, 1), 2);
        assert_eq!(table.cutoff_column_index(1, 0), 4);
        assert_eq!(table.angular_column_index(1), 7);
        assert_eq!(table.expected_column_count(), 8);
    }

    #[test]
    fn direct_sync_copies_values_and_builds_curvature() {
        let mut table = single_species_table(SyncMode::Direct);
        assert_eq!(table.parameter_len(), 15);

        let params: Vec<f64> = (0..15).map(|i| i as f64 * 0.1).collect();
        table.sync(&params).expect("sync");
        assert_eq!(table.columns[1].values, &params[5..10]);

        let slot = SplineSlot {
            interval: 1,
            fraction: 0.0,
            width: 0.5,
        };
        // exactly at a knot the spline reproduces the stored value
        assert!((table.columns[0].evaluate(slot) - params[1]).abs() < 1.0e-12);
    }

    #[test]
    fn sync_rejects_wrong_parameter_count() {
        let mut table = single_species_table(SyncMode::Direct);
        assert_eq!(
            table.sync(&[0.0; 4]),
            Err(TableError::ParameterLengthMismatch {
                expected: 15,
                actual: 4,
            })
        );
    }

    #[test]
    fn analytic_sync_resamples_columns_from_free_parameters() {
        let mut table = single_species_table(SyncMode::AnalyticUniform);
        let bounds = ParamBounds {
            min: -10.0,
            max: 10.0,
        };
        table.columns[0].analytic = Some(AnalyticRule {
            form: AnalyticForm::Morse,
            bounds: vec![bounds; 3],
        });
        table.columns[1].analytic = Some(AnalyticRule {
            form: AnalyticForm::HarmonicSpring,
            bounds: vec![bounds; 2],
        });
        table.columns[2].analytic = Some(AnalyticRule {
            form: AnalyticForm::CosineHarmonic,
            bounds: vec![bounds; 2],
        });
        assert_eq!(table.parameter_len(), 7);

        let params = [2.0, 1.5, 1.0, 4.0, 0.5, 1.0, -0.25];
        table.sync(&params).expect("sync");

        // spring column at knot 3 (r = 1.5): 0.5·4·(1.5-0.5)² = 2
        assert!((table.columns[1].values[3] - 2.0).abs() < 1.0e-12);
        // morse column at its minimum r0 = 1.0 (knot 2) gives -depth
        assert!((table.columns[0].values[2] + 2.0).abs() < 1.0e-12);
    }

    #[test]
    fn analytic_sync_rejects_non_finite_parameters() {
        let mut table = single_species_table(SyncMode::AnalyticUniform);
        let bounds = ParamBounds {
            min: -1.0,
            max: 1.0,
        };
        for column in &mut table.columns {
            column.analytic = Some(AnalyticRule {
                form: AnalyticForm::HarmonicSpring,
                bounds: vec![bounds; 2],
            });
        }
        let error = table
            .sync(&[0.5, 0.5, f64::NAN, 0.5, 0.5, 0.5])
            .expect_err("nan parameter");
        assert!(matches!(
            error,
            TableError::NonFiniteParameter { index: 2, .. }
        ));
    }

    #[test]
    fn charges_enforce_electroneutrality_against_abundance() {
        let mut table = PotentialTable {
            species_count: 2,
            mode: SyncMode::Direct,
            columns: (0..8).map(|_| uniform_column(vec![0.0; 3])).collect(),
            with_charges: true,
        };
        assert_eq!(table.parameter_len(), 8 * 3 + 2);

        let mut params = vec![0.0; table.parameter_len()];
        let offset = table.charge_offset().expect("charge block");
        params[offset] = 1.2; // q0
        params[offset + 1] = 0.4; // kappa
        let abundance = [0.25, 0.75];

        let set = table.charges(&params, &abundance).expect("charges");
        assert_eq!(set.charges[0], 1.2);
        assert_eq!(set.kappa, 0.4);
        let weighted: f64 = set
            .charges
            .iter()
            .zip(&abundance)
            .map(|(q, ratio)| q * ratio)
            .sum();
        assert!(weighted.abs() < 1.0e-12);

        table.with_charges = false;
        assert_eq!(
            table.charges(&params[..24], &abundance),
            Err(TableError::MissingChargeBlock)
        );
    }

    #[test]
    fn punishment_is_quadratic_in_the_bound_violation() {
        let mut table = single_species_table(SyncMode::AnalyticUniform);
        for column in &mut table.columns {
            column.analytic = Some(AnalyticRule {
                form: AnalyticForm::HarmonicSpring,
                bounds: vec![
                    ParamBounds { min: 0.0, max: 5.0 },
                    ParamBounds { min: 0.0, max: 5.0 },
                ],
            });
        }
        let inside = [1.0, 2.0, 1.0, 2.0, 1.0, 2.0];
        assert_eq!(table.punishment(&inside), 0.0);

        let outside = [-0.5, 2.0, 1.0, 6.0, 1.0, 2.0];
        let expected = super::BOUNDS_PUNISHMENT * (0.25 + 1.0);
        assert!((table.punishment(&outside) - expected).abs() < 1.0e-3);
    }

    #[test]
    fn validate_shape_catches_missing_rules_and_bad_counts() {
        let table = single_species_table(SyncMode::AnalyticUniform);
        assert_eq!(
            table.validate_shape(),
            Err(TableError::MissingAnalyticRule { column: 0 })
        );

        let mut short = single_species_table(SyncMode::Direct);
        short.columns.pop();
        assert!(matches!(
            short.validate_shape(),
            Err(TableError::ColumnCountMismatch { .. })
        ));
    }

    #[test]
    fn structure_payload_round_trips() {
        let mut source = single_species_table(SyncMode::Direct);
        source.columns[0].end = 3.5;
        source.columns[2].grid = KnotGrid::Explicit {
            coords: vec![-1.0, -0.5, 0.0, 0.5, 1.0],
        };
        let payload = source.structure_to_vec();

        let mut target = single_species_table(SyncMode::Direct);
        target.columns[2].grid = KnotGrid::Explicit {
            coords: vec![0.0; 5],
        };
        target.structure_from_vec(&payload).expect("apply");
        assert_eq!(target.columns[0].end, 3.5);
        assert_eq!(
            target.columns[2].grid,
            KnotGrid::Explicit {
                coords: vec![-1.0, -0.5, 0.0, 0.5, 1.0],
            }
        );

        assert_eq!(
            target.structure_from_vec(&payload[1..]),
            Err(TableError::StructurePayloadMismatch {
                expected: payload.len(),
                actual: payload.len() - 1,
            })
        );
    }

    #[test]
    fn json_snapshot_round_trips_and_rebuilds_curvature_on_sync() {
        let mut source = single_species_table(SyncMode::Direct);
        let params: Vec<f64> = (0..15).map(|i| (i as f64 * 0.3).sin()).collect();
        source.sync(&params).expect("sync source");

        let snapshot = serde_json::to_string(&source).expect("serialize");
        let mut restored: PotentialTable = serde_json::from_str(&snapshot).expect("deserialize");
        // the curvature cache is not part of the snapshot; a sync rebuilds it
        restored.sync(&params).expect("sync restored");
        assert_eq!(restored, source);

        let slot = SplineSlot {
            interval: 2,
            fraction: 0.4,
            width: 0.5,
        };
        let (source_value, source_slope) = source.columns[0].evaluate_with_gradient(slot);
        let (restored_value, restored_slope) = restored.columns[0].evaluate_with_gradient(slot);
        assert_eq!(source_value.to_bits(), restored_value.to_bits());
        assert_eq!(source_slope.to_bits(), restored_slope.to_bits());
    }

    #[test]
    fn sync_mode_raw_mapping_matches_the_wire_values() {
        assert_eq!(SyncMode::from_raw(0), Some(SyncMode::Direct));
        assert_eq!(SyncMode::from_raw(3), Some(SyncMode::AnalyticUniform));
        assert_eq!(SyncMode::from_raw(4), Some(SyncMode::AnalyticScaled));
        assert_eq!(SyncMode::from_raw(5), Some(SyncMode::Hybrid));
        assert_eq!(SyncMode::from_raw(1), None);
        for mode in [
            SyncMode::Direct,
            SyncMode::AnalyticUniform,
            SyncMode::AnalyticScaled,
            SyncMode::Hybrid,
        ] {
            assert_eq!(SyncMode::from_raw(mode.to_raw()), Some(mode));
        }
    }
}
