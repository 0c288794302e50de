use std::f64::consts::SQRT_2;

use crate::Vector3D;

/// `sqrt(1 / 2π)`
const SQRT_1_OVER_2PI: f64 = 0.3989422804014327;
/// `sqrt(3)`
const SQRT_3: f64 = 1.7320508075688772;
/// `sqrt(3 / 2)`
const SQRT_3_OVER_2: f64 = 1.224744871391589;

/// Internal storage for quantities defined over `0 <= l <= l_max` and
/// `0 <= m <= l`, such as associated Legendre polynomials.
#[derive(Debug, Clone)]
struct TriangularArray {
    max_angular: usize,
    data: Vec<f64>,
}

impl TriangularArray {
    fn new(max_angular: usize) -> TriangularArray {
        TriangularArray {
            max_angular: max_angular,
            data: vec![0.0; (max_angular + 1) * (max_angular + 2) / 2],
        }
    }

    #[inline]
    fn linear_index(&self, index: [usize; 2]) -> usize {
        let [l, m] = index;
        debug_assert!(l <= self.max_angular && m <= l);
        return m + l * (l + 1) / 2;
    }
}

impl std::ops::Index<[usize; 2]> for TriangularArray {
    type Output = f64;
    fn index(&self, index: [usize; 2]) -> &f64 {
        &self.data[self.linear_index(index)]
    }
}

impl std::ops::IndexMut<[usize; 2]> for TriangularArray {
    fn index_mut(&mut self, index: [usize; 2]) -> &mut f64 {
        let i = self.linear_index(index);
        &mut self.data[i]
    }
}

/// Array storing one value for each spherical harmonic with `0 <= l <=
/// l_max` and `-l <= m <= l`, indexed by `[l, m]` pairs.
///
/// Values for a given `l` are stored contiguously with `m` running from
/// `-l` to `l`, so the linear position of `(l, m)` is `l² + l + m`. This is
/// the `(l, m) -> linear index` convention used by the specification
/// entries of a basis.
#[derive(Debug, Clone)]
pub struct SphericalHarmonicsArray {
    max_angular: isize,
    data: Vec<f64>,
}

impl SphericalHarmonicsArray {
    /// Create a new `SphericalHarmonicsArray` able to store values up to
    /// the given `max_angular`, initialized to zero
    pub fn new(max_angular: usize) -> SphericalHarmonicsArray {
        SphericalHarmonicsArray {
            max_angular: max_angular as isize,
            data: vec![0.0; (max_angular + 1) * (max_angular + 1)],
        }
    }

    /// Maximal angular degree this array can store
    pub fn max_angular(&self) -> usize {
        self.max_angular as usize
    }

    /// Linear position of the `(l, m)` entry inside this array
    #[inline]
    pub fn linear_index(l: usize, m: isize) -> usize {
        let l = l as isize;
        debug_assert!(-l <= m && m <= l);
        return (l * l + l + m) as usize;
    }
}

impl std::ops::Index<[isize; 2]> for SphericalHarmonicsArray {
    type Output = f64;
    fn index(&self, index: [isize; 2]) -> &f64 {
        let [l, m] = index;
        debug_assert!(l <= self.max_angular);
        &self.data[SphericalHarmonicsArray::linear_index(l as usize, m)]
    }
}

impl std::ops::IndexMut<[isize; 2]> for SphericalHarmonicsArray {
    fn index_mut(&mut self, index: [isize; 2]) -> &mut f64 {
        let [l, m] = index;
        debug_assert!(l <= self.max_angular);
        &mut self.data[SphericalHarmonicsArray::linear_index(l as usize, m)]
    }
}

/// Compute a full set of real spherical harmonics, and optionally their
/// cartesian gradients, for a given direction.
///
/// Follows the algorithm described in <https://arxiv.org/abs/1410.1748>,
/// with the recurrence for `sin(m φ)`/`cos(m φ)` modified to match the real
/// spherical harmonics convention without Condon-Shortley phase.
#[derive(Debug, Clone)]
pub struct SphericalHarmonics {
    max_angular: usize,
    /// associated Legendre polynomials at the current `cos(θ)`
    legendre: TriangularArray,
    /// 'A' recurrence coefficient from the arxiv paper
    coefficient_a: TriangularArray,
    /// 'B' recurrence coefficient from the arxiv paper
    coefficient_b: TriangularArray,
    /// `∆P_l^m = sqrt((l + m)(l - m + 1)) P_l^{m-1} - sqrt((l - m)(l + m + 1)) P_l^{m+1}`,
    /// used for the gradients
    delta_legendre: TriangularArray,
    /// either `m / sin(θ) P_l^m` or `-1 / (2 cos(θ)) ∆P_l^m` depending on
    /// the value of `θ`. This moves the `1 / sin(θ)` singularity from the
    /// poles to the equator, where the other expression takes over.
    legendre_over_sin_theta: TriangularArray,
}

impl SphericalHarmonics {
    /// Create a new calculator for the given `max_angular`, pre-computing
    /// the recurrence coefficients
    pub fn new(max_angular: usize) -> SphericalHarmonics {
        let mut coefficient_a = TriangularArray::new(max_angular);
        let mut coefficient_b = TriangularArray::new(max_angular);
        for l in 2..(max_angular + 1) {
            let ls = (l * l) as f64;
            let lm1s = ((l - 1) * (l - 1)) as f64;
            for m in 0..(l - 1) {
                let ms = (m * m) as f64;
                coefficient_a[[l, m]] = f64::sqrt((4.0 * ls - 1.0) / (ls - ms));
                coefficient_b[[l, m]] = -f64::sqrt((lm1s - ms) / (4.0 * lm1s - 1.0));
            }
        }

        SphericalHarmonics {
            max_angular: max_angular,
            legendre: TriangularArray::new(max_angular),
            delta_legendre: TriangularArray::new(max_angular),
            legendre_over_sin_theta: TriangularArray::new(max_angular),
            coefficient_a: coefficient_a,
            coefficient_b: coefficient_b,
        }
    }

    /// Maximal angular degree computed by this calculator
    pub fn max_angular(&self) -> usize {
        self.max_angular
    }

    /// Evaluate the (Schmidt semi-normalized) associated Legendre
    /// polynomials at `cos(θ)` into `self.legendre`
    fn compute_legendre(&mut self, cos_theta: f64, sin_theta: f64) {
        let mut value = SQRT_1_OVER_2PI;
        self.legendre[[0, 0]] = value;

        if self.max_angular > 0 {
            self.legendre[[1, 0]] = cos_theta * SQRT_3 * value;
            value *= -SQRT_3_OVER_2 * sin_theta;
            self.legendre[[1, 1]] = value;

            for l in 2..(self.max_angular + 1) {
                for m in 0..(l - 1) {
                    self.legendre[[l, m]] = self.coefficient_a[[l, m]] * (
                        cos_theta * self.legendre[[l - 1, m]]
                        + self.coefficient_b[[l, m]] * self.legendre[[l - 2, m]]
                    );
                }

                self.legendre[[l, l - 1]] = cos_theta * f64::sqrt(2.0 * l as f64 + 1.0) * value;
                value *= -f64::sqrt(1.0 + 0.5 / l as f64) * sin_theta;
                self.legendre[[l, l]] = value;
            }
        }
    }

    /// Compute `∆P_l^m` and the pole-safe `m / sin(θ) P_l^m` factor needed
    /// by the gradients, assuming `compute_legendre` just ran
    fn compute_gradient_factors(&mut self, cos_theta: f64, sin_theta: f64) {
        let delta = |l: usize, m: usize, p_m_minus_1: f64, p_m_plus_1: f64| {
            f64::sqrt(((l + m) * (l - m + 1)) as f64) * p_m_minus_1
            - f64::sqrt(((l - m) * (l + m + 1)) as f64) * p_m_plus_1
        };

        self.delta_legendre[[0, 0]] = 0.0;
        for l in 1..(self.max_angular + 1) {
            // m = 0, using P_l^{-1} = -1 / (l (l + 1)) P_l^1
            let p_m_minus_1 = -1.0 / ((l * l + l) as f64) * self.legendre[[l, 1]];
            self.delta_legendre[[l, 0]] = delta(l, 0, p_m_minus_1, self.legendre[[l, 1]]);

            for m in 1..l {
                self.delta_legendre[[l, m]] = delta(
                    l, m, self.legendre[[l, m - 1]], self.legendre[[l, m + 1]]
                );
            }

            self.delta_legendre[[l, l]] = delta(l, l, self.legendre[[l, l - 1]], 0.0);
        }

        if sin_theta > 0.1 {
            for l in 0..(self.max_angular + 1) {
                for m in 0..=l {
                    self.legendre_over_sin_theta[[l, m]] = m as f64 / sin_theta * self.legendre[[l, m]];
                }
            }
        } else {
            // close to the poles, use -1 / (2 cos(θ)) ∆P_l^m instead
            for l in 0..(self.max_angular + 1) {
                for m in 0..=l {
                    self.legendre_over_sin_theta[[l, m]] = -0.5 / cos_theta * self.delta_legendre[[l, m]];
                }
            }
        }
    }

    /// Evaluate all spherical harmonics at the given `direction` (which
    /// must be normalized), storing results in `values`. If `gradients` is
    /// `Some`, also compute the cartesian gradients on the unit sphere and
    /// store them in `gradients` (one array each for x/y/z).
    #[time_graph::instrument(name = "SphericalHarmonics::compute")]
    pub fn compute(
        &mut self,
        direction: Vector3D,
        values: &mut SphericalHarmonicsArray,
        mut gradients: Option<&mut [SphericalHarmonicsArray; 3]>,
    ) {
        assert!(
            (direction.norm2() - 1.0).abs() < 1e-9,
            "expected the direction vector to be normalized in spherical harmonics"
        );
        assert_eq!(
            values.max_angular as usize, self.max_angular,
            "wrong size for the values array, expected max_angular to be {}, got {}",
            self.max_angular, values.max_angular,
        );
        if let Some(ref gradients) = gradients {
            for gradient in gradients.iter() {
                assert_eq!(
                    gradient.max_angular as usize, self.max_angular,
                    "wrong size for one gradient array, expected max_angular to be {}, got {}",
                    self.max_angular, gradient.max_angular,
                );
            }
        }

        let sqrt_xy = f64::hypot(direction[0], direction[1]);
        let cos_theta = direction[2];
        let sin_theta = sqrt_xy;

        let (cos_phi, sin_phi) = if sqrt_xy > f64::EPSILON {
            (direction[0] / sqrt_xy, direction[1] / sqrt_xy)
        } else {
            (1.0, 0.0)
        };

        self.compute_legendre(cos_theta, sin_theta);
        if gradients.is_some() {
            self.compute_gradient_factors(cos_theta, sin_theta);
        }

        for l in 0..(self.max_angular + 1) {
            values[[l as isize, 0]] = self.legendre[[l, 0]] / SQRT_2;
        }

        if let Some(ref mut gradients) = gradients {
            gradients[0][[0, 0]] = 0.0;
            gradients[1][[0, 0]] = 0.0;
            gradients[2][[0, 0]] = 0.0;
            for l in 1..(self.max_angular + 1) {
                let legendre_factor = f64::sqrt(0.5 * (l * (l + 1)) as f64) * self.legendre[[l, 1]];

                // d/dx: cos(φ) cos(θ) sqrt(l (l + 1) / 2) P_l^1
                gradients[0][[l as isize, 0]] = cos_phi * cos_theta * legendre_factor;
                // d/dy: sin(φ) cos(θ) sqrt(l (l + 1) / 2) P_l^1
                gradients[1][[l as isize, 0]] = sin_phi * cos_theta * legendre_factor;
                // d/dz: -sin(θ) sqrt(l (l + 1) / 2) P_l^1
                gradients[2][[l as isize, 0]] = -sin_theta * legendre_factor;
            }
        }

        // recurrence on sin(m φ) / cos(m φ), with signs adjusted so that
        // the Condon-Shortley phase of the Legendre recursion cancels out
        let mut cos_1 = 1.0;
        let mut sin_1 = 0.0;
        let mut cos_2 = -cos_phi;
        let mut sin_2 = sin_phi;

        let minus_two_cos = -2.0 * cos_phi;
        for m in 1..(self.max_angular + 1) {
            let sin_m_phi = minus_two_cos * sin_1 - sin_2;
            let cos_m_phi = minus_two_cos * cos_1 - cos_2;
            sin_2 = sin_1;
            sin_1 = sin_m_phi;
            cos_2 = cos_1;
            cos_1 = cos_m_phi;

            for l in m..(self.max_angular + 1) {
                let p_lm = self.legendre[[l, m]];
                values[[l as isize, m as isize]] = p_lm * cos_m_phi;
                values[[l as isize, -(m as isize)]] = p_lm * sin_m_phi;
            }

            if let Some(ref mut gradients) = gradients {
                for l in m..(self.max_angular + 1) {
                    let delta_p_lm = self.delta_legendre[[l, m]];
                    let sin_m_phi_delta = sin_m_phi * delta_p_lm;
                    let cos_m_phi_delta = cos_m_phi * delta_p_lm;
                    let p_lm_over_sin = self.legendre_over_sin_theta[[l, m]];

                    // m>0, d/dx: m sin(φ)/sin(θ) sin(m φ) P_l^m - cos(θ) cos(φ)/2 cos(m φ) ∆P_l^m
                    gradients[0][[l as isize, m as isize]] = sin_phi * p_lm_over_sin * sin_m_phi - 0.5 * cos_theta * cos_phi * cos_m_phi_delta;
                    // m<0, d/dx: -m sin(φ)/sin(θ) cos(m φ) P_l^m - cos(θ) cos(φ)/2 sin(m φ) ∆P_l^m
                    gradients[0][[l as isize, -(m as isize)]] = -sin_phi * p_lm_over_sin * cos_m_phi - 0.5 * cos_theta * cos_phi * sin_m_phi_delta;

                    // m>0, d/dy: -m cos(φ)/sin(θ) sin(m φ) P_l^m - cos(θ) sin(φ)/2 cos(m φ) ∆P_l^m
                    gradients[1][[l as isize, m as isize]] = -cos_phi * p_lm_over_sin * sin_m_phi - 0.5 * cos_theta * sin_phi * cos_m_phi_delta;
                    // m<0, d/dy: m cos(φ)/sin(θ) cos(m φ) P_l^m - cos(θ) sin(φ)/2 sin(m φ) ∆P_l^m
                    gradients[1][[l as isize, -(m as isize)]] = cos_phi * p_lm_over_sin * cos_m_phi - 0.5 * cos_theta * sin_phi * sin_m_phi_delta;

                    // m>0, d/dz: sin(θ)/2 cos(m φ) ∆P_l^m
                    gradients[2][[l as isize, m as isize]] = 0.5 * sin_theta * cos_m_phi_delta;
                    // m<0, d/dz: sin(θ)/2 sin(m φ) ∆P_l^m
                    gradients[2][[l as isize, -(m as isize)]] = 0.5 * sin_theta * sin_m_phi_delta;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use approx::assert_relative_eq;
    use super::*;

    #[test]
    fn linear_index_triangular() {
        let max_angular = 15;
        let array = TriangularArray::new(max_angular);

        let mut count = 0;
        let mut seen = HashSet::new();
        for l in 0..(max_angular + 1) {
            for m in 0..=l {
                seen.insert(array.linear_index([l, m]));
                count += 1;
            }
        }

        assert_eq!(count, seen.len());
        assert_eq!(array.data.len(), seen.len());
    }

    #[test]
    fn linear_index_full() {
        let max_angular = 15;
        let array = SphericalHarmonicsArray::new(max_angular);

        let mut count = 0;
        let mut seen = HashSet::new();
        for l in 0..(max_angular + 1) {
            for m in -(l as isize)..=(l as isize) {
                seen.insert(SphericalHarmonicsArray::linear_index(l, m));
                count += 1;
            }
        }

        assert_eq!(count, seen.len());
        assert_eq!(array.data.len(), seen.len());
    }

    #[test]
    fn low_degree_values() {
        // check l = 0 and l = 1 against the explicit expressions for real
        // spherical harmonics
        let direction = Vector3D::new(0.3, -0.4, 0.5);
        let direction = direction / direction.norm();

        let mut code = SphericalHarmonics::new(1);
        let mut values = SphericalHarmonicsArray::new(1);
        code.compute(direction, &mut values, None);

        let sqrt_1_over_4pi = 0.28209479177387814;
        assert_relative_eq!(values[[0, 0]], sqrt_1_over_4pi, max_relative = 1e-14);

        let factor = f64::sqrt(3.0) * sqrt_1_over_4pi;
        assert_relative_eq!(values[[1, -1]], factor * direction.y, max_relative = 1e-14);
        assert_relative_eq!(values[[1, 0]], factor * direction.z, max_relative = 1e-14);
        assert_relative_eq!(values[[1, 1]], factor * direction.x, max_relative = 1e-14);
    }

    #[test]
    fn finite_differences() {
        let mut directions = [
            Vector3D::new(1.0, 0.0, 0.0),
            Vector3D::new(0.0, 0.0, 1.0),
            Vector3D::new(1.0, 1.0, 1.0),
            Vector3D::new(1.0, -3.0, 9.0),
            Vector3D::new(-52.0, 81.0, 2.0),
        ];
        for d in &mut directions {
            *d /= d.norm();
        }

        let max_angular = 10;
        let mut code = SphericalHarmonics::new(max_angular);
        let mut values = SphericalHarmonicsArray::new(max_angular);
        let mut values_delta = SphericalHarmonicsArray::new(max_angular);
        let mut gradients = [
            SphericalHarmonicsArray::new(max_angular),
            SphericalHarmonicsArray::new(max_angular),
            SphericalHarmonicsArray::new(max_angular),
        ];

        let delta = 1e-9;
        for &direction in &directions {
            code.compute(direction, &mut values, Some(&mut gradients));

            for spatial in 0..3 {
                let mut moved = direction;
                moved[spatial] += delta;
                moved /= moved.norm();
                code.compute(moved, &mut values_delta, None);

                for l in 0..(max_angular as isize + 1) {
                    for m in -l..=l {
                        let finite_difference = (values_delta[[l, m]] - values[[l, m]]) / delta;
                        assert_relative_eq!(
                            finite_difference, gradients[spatial][[l, m]],
                            epsilon = 1e-5, max_relative = 1e-5
                        );
                    }
                }
            }
        }
    }

    #[test]
    #[should_panic = "wrong size for the values array, expected max_angular to be 3, got 5"]
    fn values_array_size() {
        let mut code = SphericalHarmonics::new(3);
        let mut values = SphericalHarmonicsArray::new(5);

        code.compute(Vector3D::new(1.0, 0.0, 0.0), &mut values, None);
    }

    #[test]
    #[should_panic = "expected the direction vector to be normalized"]
    fn non_normalized_direction() {
        let mut code = SphericalHarmonics::new(3);
        let mut values = SphericalHarmonicsArray::new(3);

        code.compute(Vector3D::new(1.0, 1.0, 1.0), &mut values, None);
    }
}
