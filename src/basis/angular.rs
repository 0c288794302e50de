use ndarray::{ArrayViewMut1, ArrayViewMut2};

use crate::buffers::BufferPool;
use crate::math::{SphericalHarmonics, SphericalHarmonicsArray};
use crate::{Error, Vector3D};

use super::{check_gradient_size, check_values_size, OneParticleBasis};

/// Angular sub-basis: real spherical harmonics of the direction of a
/// neighbor, for all `(l, m)` with `l <= max_angular`.
///
/// The input vector does not have to be normalized; values only depend on
/// its direction, and gradients are taken with respect to the unnormalized
/// vector. Output positions follow the `(l, m) -> l² + l + m` convention of
/// [`SphericalHarmonicsArray`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[derive(serde::Deserialize, serde::Serialize)]
pub struct AngularBasis {
    max_angular: usize,
}

/// Working memory for [`AngularBasis`]: the spherical harmonics calculator
/// with its recurrence coefficients, and the arrays it fills.
pub struct AngularScratch {
    pub(crate) code: SphericalHarmonics,
    pub(crate) values: SphericalHarmonicsArray,
    pub(crate) gradients: Option<[SphericalHarmonicsArray; 3]>,
}

impl AngularScratch {
    pub(crate) fn new(max_angular: usize, do_gradients: bool) -> AngularScratch {
        let gradients = if do_gradients {
            Some([
                SphericalHarmonicsArray::new(max_angular),
                SphericalHarmonicsArray::new(max_angular),
                SphericalHarmonicsArray::new(max_angular),
            ])
        } else {
            None
        };

        AngularScratch {
            code: SphericalHarmonics::new(max_angular),
            values: SphericalHarmonicsArray::new(max_angular),
            gradients: gradients,
        }
    }

    /// Run the computation for the given normalized `direction`; results
    /// are read back from `self.values` and `self.gradients`
    pub(crate) fn compute(&mut self, direction: Vector3D) {
        self.code.compute(direction, &mut self.values, self.gradients.as_mut());
    }

    pub(crate) fn gradients(&self) -> Result<&[SphericalHarmonicsArray; 3], Error> {
        self.gradients.as_ref().ok_or_else(|| Error::InvalidParameter(
            "this scratch was allocated without gradient storage, \
             use allocate_grad_scratch instead".into()
        ))
    }
}

impl AngularBasis {
    pub fn new(max_angular: usize) -> AngularBasis {
        AngularBasis { max_angular }
    }

    /// Maximal angular degree `l` included in this basis
    pub fn max_angular(&self) -> usize {
        self.max_angular
    }

    fn direction_of(point: &Vector3D) -> Result<(Vector3D, f64), Error> {
        let norm = point.norm();
        if norm == 0.0 || !norm.is_finite() {
            return Err(Error::InvalidParameter(format!(
                "can not compute spherical harmonics for the vector [{}, {}, {}]",
                point.x, point.y, point.z
            )));
        }
        return Ok((*point / norm, norm));
    }
}

impl OneParticleBasis for AngularBasis {
    type Point = Vector3D;
    type Scratch = AngularScratch;

    fn len(&self) -> usize {
        (self.max_angular + 1) * (self.max_angular + 1)
    }

    fn gradient_dof(&self, _: &Vector3D) -> usize {
        3
    }

    fn allocate_scratch_in(&self, _: &'static BufferPool) -> AngularScratch {
        AngularScratch::new(self.max_angular, false)
    }

    fn allocate_grad_scratch_in(&self, _: &'static BufferPool) -> AngularScratch {
        AngularScratch::new(self.max_angular, true)
    }

    fn evaluate_into(
        &self,
        mut values: ArrayViewMut1<f64>,
        scratch: &mut AngularScratch,
        point: &Vector3D,
    ) -> Result<(), Error> {
        check_values_size(&values, self.len())?;
        let (direction, _) = AngularBasis::direction_of(point)?;

        scratch.code.compute(direction, &mut scratch.values, None);

        for l in 0..(self.max_angular + 1) {
            for m in -(l as isize)..=(l as isize) {
                values[SphericalHarmonicsArray::linear_index(l, m)] = scratch.values[[l as isize, m]];
            }
        }
        return Ok(());
    }

    fn evaluate_with_gradient_into(
        &self,
        mut values: ArrayViewMut1<f64>,
        mut gradient: ArrayViewMut2<f64>,
        scratch: &mut AngularScratch,
        point: &Vector3D,
    ) -> Result<(), Error> {
        check_values_size(&values, self.len())?;
        check_gradient_size(&gradient, (self.len(), 3))?;
        let (direction, norm) = AngularBasis::direction_of(point)?;

        scratch.compute(direction);
        let sph_gradients = scratch.gradients()?;

        for l in 0..(self.max_angular + 1) {
            for m in -(l as isize)..=(l as isize) {
                let index = SphericalHarmonicsArray::linear_index(l, m);
                values[index] = scratch.values[[l as isize, m]];
                for spatial in 0..3 {
                    // values only depend on the direction, so the gradient
                    // w.r.t. the full vector scales with 1 / norm
                    gradient[[index, spatial]] = sph_gradients[spatial][[l as isize, m]] / norm;
                }
            }
        }
        return Ok(());
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn output_positions() {
        let basis = AngularBasis::new(2);
        assert_eq!(basis.len(), 9);

        let values = basis.evaluate(&Vector3D::new(0.0, 0.0, 2.0)).unwrap();
        // at the north pole, all m != 0 harmonics are zero
        for l in 0..3_usize {
            for m in -(l as isize)..=(l as isize) {
                let value = values[SphericalHarmonicsArray::linear_index(l, m)];
                if m == 0 {
                    assert!(value > 0.0);
                } else {
                    assert_relative_eq!(value, 0.0, epsilon = 1e-15);
                }
            }
        }
    }

    #[test]
    fn scale_invariance() {
        let basis = AngularBasis::new(4);
        let point = Vector3D::new(1.2, -0.4, 0.8);

        let values = basis.evaluate(&point).unwrap();
        let scaled = basis.evaluate(&(point * 3.5)).unwrap();
        assert_relative_eq!(values, scaled, max_relative = 1e-14);
    }

    #[test]
    fn finite_differences() {
        let basis = AngularBasis::new(6);
        let point = Vector3D::new(0.9, -1.1, 0.4);
        let delta = 1e-7;

        let (values, gradient) = basis.evaluate_with_gradient(&point).unwrap();
        for spatial in 0..3 {
            let mut moved = point;
            moved[spatial] += delta;
            let values_delta = basis.evaluate(&moved).unwrap();

            for index in 0..basis.len() {
                let finite_difference = (values_delta[index] - values[index]) / delta;
                assert_relative_eq!(
                    finite_difference, gradient[[index, spatial]],
                    epsilon = 1e-6, max_relative = 1e-5
                );
            }
        }
    }

    #[test]
    fn zero_direction() {
        let basis = AngularBasis::new(2);
        assert!(basis.evaluate(&Vector3D::zero()).is_err());
    }
}
