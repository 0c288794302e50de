use crate::Error;

/// Smoothing functions bringing a radial basis continuously to zero at the
/// cutoff radius
#[derive(Debug, Clone, Copy, PartialEq)]
#[derive(serde::Deserialize, serde::Serialize)]
#[serde(tag = "type")]
pub enum CutoffFunction {
    /// Step function, 1 if `r < cutoff` and 0 if `r >= cutoff`
    Step {},
    /// Shifted cosine switching function
    /// `f(r) = 1/2 * (1 + cos(π (r - cutoff + width) / width ))`
    ShiftedCosine {
        width: f64,
    },
}

impl CutoffFunction {
    pub fn validate(&self) -> Result<(), Error> {
        match self {
            CutoffFunction::Step {} => {}
            CutoffFunction::ShiftedCosine { width } => {
                if !width.is_finite() || *width <= 0.0 {
                    return Err(Error::InvalidParameter(format!(
                        "expected a positive width for the shifted cosine cutoff function, got {}",
                        width
                    )));
                }
            }
        }
        return Ok(());
    }

    /// Evaluate the cutoff function at the distance `r` for the given `cutoff`
    pub fn compute(&self, r: f64, cutoff: f64) -> f64 {
        match self {
            CutoffFunction::Step {} => {
                if r >= cutoff { 0.0 } else { 1.0 }
            }
            CutoffFunction::ShiftedCosine { width } => {
                if r <= (cutoff - width) {
                    1.0
                } else if r >= cutoff {
                    0.0
                } else {
                    let s = std::f64::consts::PI * (r - cutoff + width) / width;
                    0.5 * (1. + f64::cos(s))
                }
            }
        }
    }

    /// Evaluate the derivative of the cutoff function at the distance `r`
    /// for the given `cutoff`
    pub fn derivative(&self, r: f64, cutoff: f64) -> f64 {
        match self {
            CutoffFunction::Step {} => 0.0,
            CutoffFunction::ShiftedCosine { width } => {
                if r <= (cutoff - width) || r >= cutoff {
                    0.0
                } else {
                    let s = std::f64::consts::PI * (r - cutoff + width) / width;
                    return -0.5 * std::f64::consts::PI * f64::sin(s) / width;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step() {
        let function = CutoffFunction::Step {};
        let cutoff = 4.0;

        assert_eq!(function.compute(2.0, cutoff), 1.0);
        assert_eq!(function.compute(5.0, cutoff), 0.0);
        assert_eq!(function.derivative(2.0, cutoff), 0.0);
        assert_eq!(function.derivative(5.0, cutoff), 0.0);
    }

    #[test]
    fn shifted_cosine() {
        let function = CutoffFunction::ShiftedCosine { width: 0.5 };
        let cutoff = 4.0;

        assert_eq!(function.compute(2.0, cutoff), 1.0);
        assert_eq!(function.compute(3.5, cutoff), 1.0);
        assert_eq!(function.compute(3.8, cutoff), 0.34549150281252683);
        assert_eq!(function.compute(4.0, cutoff), 0.0);
        assert_eq!(function.compute(5.0, cutoff), 0.0);
    }

    #[test]
    fn shifted_cosine_derivative() {
        let function = CutoffFunction::ShiftedCosine { width: 0.5 };
        let cutoff = 4.0;

        assert_eq!(function.derivative(2.0, cutoff), 0.0);
        assert_eq!(function.derivative(3.5, cutoff), 0.0);
        assert_eq!(function.derivative(3.8, cutoff), -2.987832164741557);
        assert_eq!(function.derivative(4.0, cutoff), 0.0);
        assert_eq!(function.derivative(5.0, cutoff), 0.0);
    }

    #[test]
    fn invalid_width() {
        let function = CutoffFunction::ShiftedCosine { width: -1.0 };
        assert!(function.validate().is_err());
    }
}
