use std::collections::BTreeMap;
use std::ops::Range;

use indexmap::IndexSet;
use ndarray::{ArrayViewMut1, ArrayViewMut2};

use crate::buffers::{BufferPool, PoolGuard};
use crate::states::State;
use crate::Error;

use super::angular::AngularScratch;
use super::{check_gradient_size, check_values_size};
use super::{DegreeFunction, OneParticleBasis, RadialBasis};

/// One entry of a basis specification: radial index `n`, angular degree
/// `l` and angular order `m`.
///
/// The position of an entry in the specification list fixes the position of
/// its contribution in every output vector produced by the basis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(serde::Deserialize, serde::Serialize)]
#[serde(deny_unknown_fields)]
pub struct NlmIndex {
    pub n: usize,
    pub l: usize,
    pub m: isize,
}

/// A central atom species together with the list of neighbor states the
/// basis should accumulate over. This is the input type of
/// [`TensorProductBasis`].
#[derive(Debug, Clone)]
pub struct Environment {
    /// species of the central atom
    pub center_species: i32,
    /// neighbor states; each must carry a `position` field with the
    /// position relative to the central atom
    pub neighbors: Vec<State>,
}

impl Environment {
    pub fn new(center_species: i32, neighbors: Vec<State>) -> Environment {
        Environment { center_species, neighbors }
    }
}

/// Species-pair index map: for every ordered (central species, neighbor
/// species) pair, the contiguous range of the output vector receiving
/// contributions from neighbors of that species.
///
/// Built once at basis construction from the species list and the
/// specification length, and never serialized: deserialization rebuilds it
/// from scratch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairIndices {
    species: Vec<i32>,
    pair_len: usize,
    /// ranges in row-major (central species, neighbor species) order
    ranges: Vec<Range<usize>>,
}

impl PairIndices {
    fn new(species: &[i32], pair_len: usize) -> PairIndices {
        let n_species = species.len();
        let mut ranges = Vec::with_capacity(n_species * n_species);
        for _center_i in 0..n_species {
            for neighbor_i in 0..n_species {
                // blocks are packed by neighbor species, in the order of
                // the species list, identically for every central species
                let start = neighbor_i * pair_len;
                ranges.push(start..(start + pair_len));
            }
        }

        PairIndices {
            species: species.to_vec(),
            pair_len: pair_len,
            ranges: ranges,
        }
    }

    fn species_index(&self, species: i32) -> Result<usize, Error> {
        self.species.iter()
            .position(|&z| z == species)
            .ok_or(Error::SpeciesNotFound(species))
    }

    /// Get the output range written by neighbors with `neighbor_species`
    /// around a central atom with `center_species`
    pub fn range(&self, center_species: i32, neighbor_species: i32) -> Result<Range<usize>, Error> {
        let center_i = self.species_index(center_species)?;
        let neighbor_i = self.species_index(neighbor_species)?;
        return Ok(self.ranges[center_i * self.species.len() + neighbor_i].clone());
    }
}

/// Working memory for [`TensorProductBasis`], reused across evaluation
/// calls: the radial value/derivative buffers come from a [`BufferPool`],
/// the spherical harmonics keep their own recurrence storage.
pub struct TensorProductScratch {
    radial_values: PoolGuard<'static, f64>,
    radial_gradients: Option<PoolGuard<'static, f64>>,
    angular: AngularScratch,
}

/// The concrete one-particle basis: the tensor product of a radial basis
/// with the real spherical harmonics, restricted to the `(n, l, m)` tuples
/// of a specification list, over a fixed list of species.
///
/// Evaluating the basis on an [`Environment`] accumulates one contribution
/// per neighbor into a single output vector of length `n_species *
/// specification length`; the [`PairIndices`] map decides which slice of
/// the output each neighbor contributes to, based on its species. The
/// result is invariant under permutations of the neighbor list.
#[derive(Debug, Clone, PartialEq)]
#[derive(serde::Deserialize, serde::Serialize)]
#[serde(try_from = "SerializedBasis", into = "SerializedBasis")]
pub struct TensorProductBasis {
    radial: RadialBasis,
    specification: Vec<NlmIndex>,
    species: Vec<i32>,
    max_angular: usize,
    pair_indices: PairIndices,
}

impl TensorProductBasis {
    /// Create a basis from a `radial` sub-basis and the list of `species`,
    /// generating the specification with a sparse-grid search: all `(n, l)`
    /// pairs with `n <= radial.size()` and `degree.compute(n, l) <=
    /// max_degree` are kept, and each pair is expanded into its `2l + 1`
    /// angular orders.
    pub fn new(
        radial: RadialBasis,
        degree: DegreeFunction,
        max_degree: f64,
        species: Vec<i32>,
    ) -> Result<TensorProductBasis, Error> {
        radial.validate()?;

        let mut pairs = IndexSet::new();
        for (n, l) in degree.enumerate(max_degree)? {
            if n <= radial.size() {
                pairs.insert((n, l));
            }
        }

        let mut specification = Vec::new();
        for (n, l) in pairs {
            for m in -(l as isize)..=(l as isize) {
                specification.push(NlmIndex { n, l, m });
            }
        }

        return TensorProductBasis::from_parts(radial, specification, species);
    }

    /// Create a basis from an explicit `specification` list.
    ///
    /// The specification must contain complete angular blocks: for every
    /// `(n, l)` present, all `2l + 1` orders `m` from `-l` to `l` must be
    /// present. Incomplete blocks would break the rotational symmetry of
    /// anything built on top of this basis and are rejected.
    pub fn from_parts(
        radial: RadialBasis,
        specification: Vec<NlmIndex>,
        species: Vec<i32>,
    ) -> Result<TensorProductBasis, Error> {
        radial.validate()?;

        if species.is_empty() {
            return Err(Error::InvalidParameter(
                "a basis requires at least one species".into()
            ));
        }
        for (i, &z) in species.iter().enumerate() {
            if species[..i].contains(&z) {
                return Err(Error::InvalidParameter(format!(
                    "duplicated species {} in the species list", z
                )));
            }
        }

        let mut blocks: BTreeMap<(usize, usize), Vec<isize>> = BTreeMap::new();
        for (i, index) in specification.iter().enumerate() {
            if index.n == 0 || index.n > radial.size() {
                return Err(Error::InvalidParameter(format!(
                    "radial index n = {} is not part of the radial basis (size {})",
                    index.n, radial.size()
                )));
            }
            if index.m.unsigned_abs() > index.l {
                return Err(Error::InvalidParameter(format!(
                    "invalid angular order m = {} for degree l = {}", index.m, index.l
                )));
            }
            if specification[..i].contains(index) {
                return Err(Error::InvalidParameter(format!(
                    "duplicated specification entry (n = {}, l = {}, m = {})",
                    index.n, index.l, index.m
                )));
            }
            blocks.entry((index.n, index.l)).or_default().push(index.m);
        }

        for ((n, l), orders) in &blocks {
            if orders.len() != 2 * l + 1 {
                return Err(Error::InvalidParameter(format!(
                    "incomplete angular block for n = {}, l = {}: expected all {} \
                     orders from m = -{} to m = {}, got {}",
                    n, l, 2 * l + 1, l, l, orders.len()
                )));
            }
        }

        let max_angular = blocks.keys().map(|&(_, l)| l).max().unwrap_or(0);
        let pair_indices = PairIndices::new(&species, specification.len());

        log::debug!(
            "created tensor product basis with {} specification entries, \
             {} species, {} values per center",
            specification.len(), species.len(), species.len() * specification.len()
        );

        return Ok(TensorProductBasis {
            radial: radial,
            specification: specification,
            species: species,
            max_angular: max_angular,
            pair_indices: pair_indices,
        });
    }

    /// The radial sub-basis of this basis
    pub fn radial(&self) -> &RadialBasis {
        &self.radial
    }

    /// The ordered `(n, l, m)` specification list of this basis
    pub fn specification(&self) -> &[NlmIndex] {
        &self.specification
    }

    /// The species understood by this basis
    pub fn species(&self) -> &[i32] {
        &self.species
    }

    /// Largest angular degree in the specification
    pub fn max_angular(&self) -> usize {
        self.max_angular
    }

    /// The species-pair index map of this basis
    pub fn pair_indices(&self) -> &PairIndices {
        &self.pair_indices
    }

    /// Number of output values written by the neighbors of a single
    /// (central species, neighbor species) pair
    pub fn pair_len(&self) -> usize {
        self.specification.len()
    }

    /// Serialize this basis to a JSON string
    pub fn to_json(&self) -> Result<String, Error> {
        return Ok(serde_json::to_string(self)?);
    }

    /// Reconstruct a basis from the output of [`TensorProductBasis::to_json`]
    pub fn from_json(json: &str) -> Result<TensorProductBasis, Error> {
        return Ok(serde_json::from_str(json)?);
    }

    fn check_scratch(&self, scratch: &TensorProductScratch, do_gradients: bool) -> Result<(), Error> {
        if scratch.radial_values.len() != self.radial.size() {
            return Err(Error::BufferSizeMismatch {
                expected: self.radial.size(),
                got: scratch.radial_values.len(),
            });
        }
        if scratch.angular.values.max_angular() != self.max_angular {
            let expected = self.max_angular + 1;
            let got = scratch.angular.values.max_angular() + 1;
            return Err(Error::BufferSizeMismatch {
                expected: expected * expected,
                got: got * got,
            });
        }
        if do_gradients && scratch.radial_gradients.is_none() {
            return Err(Error::InvalidParameter(
                "this scratch was allocated without gradient storage, \
                 use allocate_grad_scratch instead".into()
            ));
        }
        return Ok(());
    }

    /// Accumulate the basis values for every neighbor of `environment`
    /// into `values`
    #[time_graph::instrument(name = "TensorProductBasis::accumulate")]
    fn accumulate(
        &self,
        values: &mut ArrayViewMut1<f64>,
        scratch: &mut TensorProductScratch,
        environment: &Environment,
    ) -> Result<(), Error> {
        values.fill(0.0);

        for (neighbor_i, neighbor) in environment.neighbors.iter().enumerate() {
            let position = neighbor.position()?;
            let range = self.pair_indices.range(environment.center_species, neighbor.species())?;

            let distance = position.norm();
            if distance == 0.0 {
                return Err(Error::InvalidParameter(format!(
                    "neighbor {} is sitting on top of the central atom", neighbor_i
                )));
            }
            if distance >= self.radial.cutoff() {
                continue;
            }
            let direction = position / distance;

            self.radial.compute(
                distance,
                ArrayViewMut1::from(&mut scratch.radial_values[..]),
                None,
            );
            self.angular_compute(&mut scratch.angular, direction, false);

            for (i, index) in self.specification.iter().enumerate() {
                let radial_value = scratch.radial_values[index.n - 1];
                let angular_value = scratch.angular.values[[index.l as isize, index.m]];
                values[range.start + i] += radial_value * angular_value;
            }
        }

        return Ok(());
    }

    /// Accumulate the basis values and the gradient contributions with
    /// respect to every neighbor position
    #[time_graph::instrument(name = "TensorProductBasis::accumulate_with_gradients")]
    fn accumulate_with_gradients(
        &self,
        values: &mut ArrayViewMut1<f64>,
        gradient: &mut ArrayViewMut2<f64>,
        scratch: &mut TensorProductScratch,
        environment: &Environment,
    ) -> Result<(), Error> {
        values.fill(0.0);
        gradient.fill(0.0);

        for (neighbor_i, neighbor) in environment.neighbors.iter().enumerate() {
            let position = neighbor.position()?;
            let range = self.pair_indices.range(environment.center_species, neighbor.species())?;

            let distance = position.norm();
            if distance == 0.0 {
                return Err(Error::InvalidParameter(format!(
                    "neighbor {} is sitting on top of the central atom", neighbor_i
                )));
            }
            if distance >= self.radial.cutoff() {
                continue;
            }
            let direction = position / distance;

            let radial_gradients = scratch.radial_gradients.as_mut()
                .expect("checked by check_scratch");
            self.radial.compute(
                distance,
                ArrayViewMut1::from(&mut scratch.radial_values[..]),
                Some(ArrayViewMut1::from(&mut radial_gradients[..])),
            );
            self.angular_compute(&mut scratch.angular, direction, true);
            let angular_gradients = scratch.angular.gradients()?;

            for (i, index) in self.specification.iter().enumerate() {
                let slot = range.start + i;
                let l = index.l as isize;

                let radial_value = scratch.radial_values[index.n - 1];
                let radial_grad = radial_gradients[index.n - 1];
                let angular_value = scratch.angular.values[[l, index.m]];

                values[slot] += radial_value * angular_value;

                // product rule for J(r) Y(r̂): the radial part varies along
                // the bond direction, the angular part in the plane
                // perpendicular to it (1/r from the normalization of r̂)
                for spatial in 0..3 {
                    let angular_grad = angular_gradients[spatial][[l, index.m]];
                    gradient[[slot, 3 * neighbor_i + spatial]] =
                        radial_grad * direction[spatial] * angular_value
                        + radial_value * angular_grad / distance;
                }
            }
        }

        return Ok(());
    }

    fn angular_compute(&self, scratch: &mut AngularScratch, direction: crate::Vector3D, gradients: bool) {
        if gradients {
            scratch.compute(direction);
        } else {
            scratch.code.compute(direction, &mut scratch.values, None);
        }
    }
}

impl OneParticleBasis for TensorProductBasis {
    type Point = Environment;
    type Scratch = TensorProductScratch;

    /// Output length for one central atom, all neighbor species included
    fn len(&self) -> usize {
        self.species.len() * self.specification.len()
    }

    fn gradient_dof(&self, environment: &Environment) -> usize {
        3 * environment.neighbors.len()
    }

    fn allocate_scratch_in(&self, pool: &'static BufferPool) -> TensorProductScratch {
        TensorProductScratch {
            radial_values: pool.acquire_scalars(self.radial.size()),
            radial_gradients: None,
            angular: AngularScratch::new(self.max_angular, false),
        }
    }

    fn allocate_grad_scratch_in(&self, pool: &'static BufferPool) -> TensorProductScratch {
        TensorProductScratch {
            radial_values: pool.acquire_scalars(self.radial.size()),
            radial_gradients: Some(pool.acquire_scalars(self.radial.size())),
            angular: AngularScratch::new(self.max_angular, true),
        }
    }

    fn evaluate_into(
        &self,
        mut values: ArrayViewMut1<f64>,
        scratch: &mut TensorProductScratch,
        environment: &Environment,
    ) -> Result<(), Error> {
        check_values_size(&values, self.len())?;
        self.check_scratch(scratch, false)?;
        return self.accumulate(&mut values, scratch, environment);
    }

    fn evaluate_with_gradient_into(
        &self,
        mut values: ArrayViewMut1<f64>,
        mut gradient: ArrayViewMut2<f64>,
        scratch: &mut TensorProductScratch,
        environment: &Environment,
    ) -> Result<(), Error> {
        check_values_size(&values, self.len())?;
        check_gradient_size(&gradient, (self.len(), self.gradient_dof(environment)))?;
        self.check_scratch(scratch, true)?;
        return self.accumulate_with_gradients(&mut values, &mut gradient, scratch, environment);
    }
}

/// Serialized form of a [`TensorProductBasis`]: a tagged record with an
/// explicit discriminator and format version. The species-pair index map
/// is deliberately absent, it is rebuilt on deserialization.
#[derive(Debug, Clone)]
#[derive(serde::Deserialize, serde::Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum SerializedBasis {
    TensorProduct {
        version: u32,
        radial: RadialBasis,
        specification: Vec<NlmIndex>,
        species: Vec<i32>,
    },
}

const SERIALIZATION_VERSION: u32 = 1;

impl From<TensorProductBasis> for SerializedBasis {
    fn from(basis: TensorProductBasis) -> SerializedBasis {
        SerializedBasis::TensorProduct {
            version: SERIALIZATION_VERSION,
            radial: basis.radial,
            specification: basis.specification,
            species: basis.species,
        }
    }
}

impl TryFrom<SerializedBasis> for TensorProductBasis {
    type Error = Error;

    fn try_from(serialized: SerializedBasis) -> Result<TensorProductBasis, Error> {
        match serialized {
            SerializedBasis::TensorProduct { version, radial, specification, species } => {
                if version != SERIALIZATION_VERSION {
                    return Err(Error::InvalidParameter(format!(
                        "can not read serialized basis with version {}, \
                         this code supports version {}",
                        version, SERIALIZATION_VERSION
                    )));
                }
                return TensorProductBasis::from_parts(radial, specification, species);
            }
        }
    }
}
