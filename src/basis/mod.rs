use ndarray::{Array1, Array2, ArrayViewMut1, ArrayViewMut2};

use crate::buffers::BufferPool;
use crate::Error;

mod degree;
pub use self::degree::DegreeFunction;

mod radial;
pub use self::radial::RadialBasis;

mod angular;
pub use self::angular::{AngularBasis, AngularScratch};

mod tensor_product;
pub use self::tensor_product::{Environment, NlmIndex, PairIndices};
pub use self::tensor_product::{TensorProductBasis, TensorProductScratch};

/// The evaluation and allocation contract shared by every basis type:
/// radial, angular, or composite.
///
/// A basis maps an input point (a distance, a direction, or a full
/// [`Environment`]) to a fixed-size vector of values, and optionally to the
/// Jacobian of those values with respect to the differentiable coordinates
/// of the input. The mutating `*_into` operations write into caller-provided
/// buffers and use caller-provided scratch space, so repeated evaluation
/// does not allocate; the non-mutating wrappers allocate fresh buffers and
/// are intended for code where allocation cost does not matter.
///
/// Composite bases implement this contract by delegating to the contracts
/// of their sub-bases and combining the results positionally according to
/// their own specification.
pub trait OneParticleBasis {
    /// Input type of this basis
    type Point: ?Sized;
    /// Working memory reused across evaluation calls, never read by callers
    type Scratch;

    /// Number of values produced by one evaluation
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of differentiable degrees of freedom of `point`; the Jacobian
    /// has shape `(self.len(), self.gradient_dof(point))`
    fn gradient_dof(&self, point: &Self::Point) -> usize;

    /// Allocate a value buffer sized for one evaluation
    fn allocate_values(&self) -> Array1<f64> {
        Array1::zeros(self.len())
    }

    /// Allocate a gradient buffer sized for one evaluation at `point`
    fn allocate_gradient(&self, point: &Self::Point) -> Array2<f64> {
        Array2::zeros((self.len(), self.gradient_dof(point)))
    }

    /// Allocate scratch space for value-only evaluation, taking reusable
    /// storage from `pool`
    fn allocate_scratch_in(&self, pool: &'static BufferPool) -> Self::Scratch;

    /// Allocate scratch space sized for evaluation with gradients, taking
    /// reusable storage from `pool`
    fn allocate_grad_scratch_in(&self, pool: &'static BufferPool) -> Self::Scratch;

    /// Allocate value-only scratch space from the global buffer pool
    fn allocate_scratch(&self) -> Self::Scratch {
        self.allocate_scratch_in(BufferPool::global())
    }

    /// Allocate gradient-ready scratch space from the global buffer pool
    fn allocate_grad_scratch(&self) -> Self::Scratch {
        self.allocate_grad_scratch_in(BufferPool::global())
    }

    /// Evaluate this basis at `point`, writing the values into `values`.
    ///
    /// This is a pure function of `point` and the basis parameters;
    /// `scratch` is working memory only.
    fn evaluate_into(
        &self,
        values: ArrayViewMut1<f64>,
        scratch: &mut Self::Scratch,
        point: &Self::Point,
    ) -> Result<(), Error>;

    /// Evaluate this basis at `point`, writing the values into `values` and
    /// the Jacobian with respect to the differentiable coordinates of
    /// `point` into `gradient`.
    ///
    /// The values written are identical to the ones produced by
    /// [`OneParticleBasis::evaluate_into`].
    fn evaluate_with_gradient_into(
        &self,
        values: ArrayViewMut1<f64>,
        gradient: ArrayViewMut2<f64>,
        scratch: &mut Self::Scratch,
        point: &Self::Point,
    ) -> Result<(), Error>;

    /// Evaluate this basis at `point`, returning freshly allocated values
    fn evaluate(&self, point: &Self::Point) -> Result<Array1<f64>, Error> {
        let mut values = self.allocate_values();
        let mut scratch = self.allocate_scratch();
        self.evaluate_into(values.view_mut(), &mut scratch, point)?;
        return Ok(values);
    }

    /// Evaluate this basis and its Jacobian at `point`, returning freshly
    /// allocated buffers
    fn evaluate_with_gradient(&self, point: &Self::Point) -> Result<(Array1<f64>, Array2<f64>), Error> {
        let mut values = self.allocate_values();
        let mut gradient = self.allocate_gradient(point);
        let mut scratch = self.allocate_grad_scratch();
        self.evaluate_with_gradient_into(
            values.view_mut(), gradient.view_mut(), &mut scratch, point
        )?;
        return Ok((values, gradient));
    }
}

/// Check a caller-provided value buffer against the expected basis length
pub(crate) fn check_values_size(values: &ArrayViewMut1<f64>, expected: usize) -> Result<(), Error> {
    if values.len() != expected {
        return Err(Error::BufferSizeMismatch {
            expected: expected,
            got: values.len(),
        });
    }
    return Ok(());
}

/// Check a caller-provided gradient buffer against the expected Jacobian
/// shape
pub(crate) fn check_gradient_size(
    gradient: &ArrayViewMut2<f64>,
    expected: (usize, usize),
) -> Result<(), Error> {
    if gradient.shape() != [expected.0, expected.1] {
        return Err(Error::BufferSizeMismatch {
            expected: expected.0 * expected.1,
            got: gradient.len(),
        });
    }
    return Ok(());
}
