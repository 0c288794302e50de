use ndarray::{ArrayViewMut1, ArrayViewMut2, Axis};

use crate::buffers::BufferPool;
use crate::math::CutoffFunction;
use crate::Error;

use super::{check_gradient_size, check_values_size, OneParticleBasis};

/// The radial sub-bases usable in a tensor product basis.
///
/// All variants are scalar functions of the neighbor distance, smoothly
/// brought to zero at the cutoff radius by the given [`CutoffFunction`]:
/// values and derivatives are exactly zero for any distance at or beyond
/// the cutoff. The radial index `n` runs from 1 to `max_radial`
/// (inclusive), matching the convention of the degree functions; the value
/// for index `n` is stored at position `n - 1` of the output.
#[derive(Debug, Clone, PartialEq)]
#[derive(serde::Deserialize, serde::Serialize)]
#[serde(tag = "type")]
pub enum RadialBasis {
    /// Chebyshev polynomials of the first kind on `x(r) = 2 r / cutoff - 1`,
    /// `R_n(r) = T_{n-1}(x(r)) f_cut(r)`
    Chebyshev {
        max_radial: usize,
        cutoff: f64,
        cutoff_function: CutoffFunction,
    },
    /// A radial basis similar to Gaussian-Type Orbitals,
    /// `R_n(r) = r^{n-1} e^{-r² / (2 σ_n²)} f_cut(r)`, where
    /// `σ_n = cutoff √n / max_radial`
    Gto {
        max_radial: usize,
        cutoff: f64,
        cutoff_function: CutoffFunction,
    },
}

impl RadialBasis {
    pub fn validate(&self) -> Result<(), Error> {
        let (max_radial, cutoff, cutoff_function) = match self {
            RadialBasis::Chebyshev { max_radial, cutoff, cutoff_function } |
            RadialBasis::Gto { max_radial, cutoff, cutoff_function } => {
                (*max_radial, *cutoff, cutoff_function)
            }
        };

        if max_radial == 0 {
            return Err(Error::InvalidParameter(
                "max_radial must be at least 1 for a radial basis".into()
            ));
        }

        if !cutoff.is_finite() || cutoff <= 0.0 {
            return Err(Error::InvalidParameter(format!(
                "cutoff must be a finite positive number for a radial basis, got {}",
                cutoff
            )));
        }

        cutoff_function.validate()?;
        return Ok(());
    }

    /// Number of radial basis functions
    pub fn size(&self) -> usize {
        match self {
            RadialBasis::Chebyshev { max_radial, .. } |
            RadialBasis::Gto { max_radial, .. } => *max_radial,
        }
    }

    /// Cutoff radius beyond which every basis function is zero
    pub fn cutoff(&self) -> f64 {
        match self {
            RadialBasis::Chebyshev { cutoff, .. } |
            RadialBasis::Gto { cutoff, .. } => *cutoff,
        }
    }

    /// Evaluate all radial basis functions at `distance`, writing values in
    /// `values` and, if requested, the derivatives with respect to the
    /// distance in `gradients`
    pub fn compute(
        &self,
        distance: f64,
        mut values: ArrayViewMut1<f64>,
        mut gradients: Option<ArrayViewMut1<f64>>,
    ) {
        let size = self.size();
        assert_eq!(
            values.len(), size,
            "wrong size for the radial values array, expected {}, got {}",
            size, values.len()
        );
        if let Some(ref gradients) = gradients {
            assert_eq!(
                gradients.len(), size,
                "wrong size for the radial gradients array, expected {}, got {}",
                size, gradients.len()
            );
        }

        if distance >= self.cutoff() {
            values.fill(0.0);
            if let Some(ref mut gradients) = gradients {
                gradients.fill(0.0);
            }
            return;
        }

        match self {
            RadialBasis::Chebyshev { cutoff, cutoff_function, .. } => {
                let f_cut = cutoff_function.compute(distance, *cutoff);
                let f_cut_grad = cutoff_function.derivative(distance, *cutoff);

                let x = 2.0 * distance / cutoff - 1.0;
                let dx_dr = 2.0 / cutoff;

                // T_{k+1} = 2x T_k - T_{k-1}, same recurrence for the
                // derivatives with the 2 T_k cross term
                let mut t_prev = 1.0;
                let mut t = x;
                let mut dt_prev = 0.0;
                let mut dt = 1.0;
                for n in 0..size {
                    let (t_n, dt_n) = if n == 0 {
                        (1.0, 0.0)
                    } else if n == 1 {
                        (x, 1.0)
                    } else {
                        let t_next = 2.0 * x * t - t_prev;
                        let dt_next = 2.0 * t + 2.0 * x * dt - dt_prev;
                        t_prev = t;
                        t = t_next;
                        dt_prev = dt;
                        dt = dt_next;
                        (t_next, dt_next)
                    };

                    values[n] = t_n * f_cut;
                    if let Some(ref mut gradients) = gradients {
                        gradients[n] = dt_n * dx_dr * f_cut + t_n * f_cut_grad;
                    }
                }
            }
            RadialBasis::Gto { max_radial, cutoff, cutoff_function } => {
                let f_cut = cutoff_function.compute(distance, *cutoff);
                let f_cut_grad = cutoff_function.derivative(distance, *cutoff);

                // r^(n-1) and (n-1) r^(n-2), updated as n increases
                let mut r_pow = 1.0;
                let mut r_pow_grad = 0.0;
                for n in 1..(max_radial + 1) {
                    let sigma = cutoff * f64::sqrt(n as f64) / (*max_radial as f64);
                    let sigma2 = sigma * sigma;
                    let gaussian = f64::exp(-0.5 * distance * distance / sigma2);

                    let value = r_pow * gaussian;
                    values[n - 1] = value * f_cut;
                    if let Some(ref mut gradients) = gradients {
                        let grad = (r_pow_grad - r_pow * distance / sigma2) * gaussian;
                        gradients[n - 1] = grad * f_cut + value * f_cut_grad;
                    }

                    r_pow_grad = n as f64 * r_pow;
                    r_pow *= distance;
                }
            }
        }
    }
}

impl OneParticleBasis for RadialBasis {
    type Point = f64;
    type Scratch = ();

    fn len(&self) -> usize {
        self.size()
    }

    fn gradient_dof(&self, _: &f64) -> usize {
        1
    }

    fn allocate_scratch_in(&self, _: &'static BufferPool) -> () {}

    fn allocate_grad_scratch_in(&self, _: &'static BufferPool) -> () {}

    fn evaluate_into(
        &self,
        values: ArrayViewMut1<f64>,
        _: &mut (),
        point: &f64,
    ) -> Result<(), Error> {
        check_values_size(&values, self.len())?;
        self.compute(*point, values, None);
        return Ok(());
    }

    fn evaluate_with_gradient_into(
        &self,
        values: ArrayViewMut1<f64>,
        mut gradient: ArrayViewMut2<f64>,
        _: &mut (),
        point: &f64,
    ) -> Result<(), Error> {
        check_values_size(&values, self.len())?;
        check_gradient_size(&gradient, (self.len(), 1))?;
        self.compute(*point, values, Some(gradient.index_axis_mut(Axis(1), 0)));
        return Ok(());
    }
}
