mod cutoff;
pub use self::cutoff::CutoffFunction;

mod spherical_harmonics;
pub use self::spherical_harmonics::{SphericalHarmonics, SphericalHarmonicsArray};
