use crate::Error;

/// Total-degree functionals over `(n, l)` pairs, used to bound the
/// sparse-grid enumeration when generating a basis specification.
///
/// The radial index `n` starts at 1, so `deg(1, 0) = 0` for every variant
/// and the constant entry is always part of a basis with a non-negative
/// maximal degree.
#[derive(Debug, Clone, Copy, PartialEq)]
#[derive(serde::Deserialize, serde::Serialize)]
#[serde(tag = "type")]
pub enum DegreeFunction {
    /// `deg(n, l) = (n - 1) + angular_weight * l`
    Total {
        angular_weight: f64,
    },
    /// `deg(n, l) = sqrt((n - 1)² + (angular_weight * l)²)`
    Euclidean {
        angular_weight: f64,
    },
}

/// Hard cap on the index search along either axis. A well-formed degree
/// function grows without bound in both `n` and `l`, so hitting this cap
/// means the function is malformed (e.g. a zero angular weight).
const MAX_INDEX: usize = 10_000;

impl DegreeFunction {
    pub fn validate(&self) -> Result<(), Error> {
        let angular_weight = match self {
            DegreeFunction::Total { angular_weight } |
            DegreeFunction::Euclidean { angular_weight } => *angular_weight,
        };

        if !angular_weight.is_finite() || angular_weight < 0.0 {
            return Err(Error::InvalidParameter(format!(
                "expected a non-negative angular weight for the degree function, got {}",
                angular_weight
            )));
        }
        return Ok(());
    }

    /// Evaluate the degree of the `(n, l)` pair
    pub fn compute(&self, n: usize, l: usize) -> f64 {
        debug_assert!(n >= 1, "radial index starts at 1, got n = {}", n);
        let n = n.saturating_sub(1) as f64;
        let l = l as f64;
        match self {
            DegreeFunction::Total { angular_weight } => n + angular_weight * l,
            DegreeFunction::Euclidean { angular_weight } => {
                f64::hypot(n, angular_weight * l)
            }
        }
    }

    /// Enumerate all `(n, l)` pairs with degree at most `max_degree`,
    /// visiting `n` in increasing order and `l` in increasing order within
    /// each `n`.
    ///
    /// Fails with [`Error::DegreeBoundExceeded`] if the search does not
    /// terminate, i.e. if this degree function does not grow along one of
    /// the axes.
    pub fn enumerate(&self, max_degree: f64) -> Result<Vec<(usize, usize)>, Error> {
        self.validate()?;
        if !max_degree.is_finite() {
            return Err(Error::InvalidParameter(format!(
                "expected a finite maximal degree, got {}", max_degree
            )));
        }

        let mut pairs = Vec::new();
        let mut n = 1;
        while self.compute(n, 0) <= max_degree {
            if n > MAX_INDEX {
                return Err(Error::DegreeBoundExceeded(format!(
                    "radial index reached {} while searching up to degree {}",
                    n, max_degree
                )));
            }

            let mut l = 0;
            while self.compute(n, l) <= max_degree {
                if l > MAX_INDEX {
                    return Err(Error::DegreeBoundExceeded(format!(
                        "angular index reached {} at n = {} while searching up to degree {}",
                        l, n, max_degree
                    )));
                }
                pairs.push((n, l));
                l += 1;
            }

            n += 1;
        }

        return Ok(pairs);
    }
}
