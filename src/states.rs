use rand::Rng;
use rand_distr::StandardNormal;

use crate::{Error, Vector3D};

/// A single named field inside a [`State`].
///
/// `Scalar` and `Vector` fields take part in the vector-space algebra;
/// `Species` fields are categorical and are carried through unchanged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    Scalar(f64),
    Vector(Vector3D),
    Species(i32),
}

impl FieldValue {
    fn kind(&self) -> &'static str {
        match self {
            FieldValue::Scalar(_) => "scalar",
            FieldValue::Vector(_) => "vector",
            FieldValue::Species(_) => "species",
        }
    }
}

/// Distinguish a point in the space of physical quantities from a
/// directional derivative over the same field schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateVariant {
    Value,
    Tangent,
}

/// An immutable bundle of named physical quantities describing one
/// neighbor's configuration.
///
/// Two states share a schema when they have the same field names, the same
/// field kinds, and the same species values, in the same order. All binary
/// operations require matching schemas and fail with
/// [`Error::SchemaMismatch`] otherwise. Every operation is pure and returns
/// a freshly allocated state.
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    variant: StateVariant,
    fields: Vec<(&'static str, FieldValue)>,
}

impl State {
    /// Create a new state with the given `variant` and `fields`. Field
    /// names must be unique.
    pub fn new(variant: StateVariant, fields: Vec<(&'static str, FieldValue)>) -> Result<State, Error> {
        for (i, (name, _)) in fields.iter().enumerate() {
            if fields[..i].iter().any(|(other, _)| other == name) {
                return Err(Error::InvalidParameter(format!(
                    "duplicated field name '{}' in state", name
                )));
            }
        }
        return Ok(State { variant, fields });
    }

    /// Create a value state describing an atom at relative `position` with
    /// the given `species`.
    pub fn atom(position: Vector3D, species: i32) -> State {
        State {
            variant: StateVariant::Value,
            fields: vec![
                ("position", FieldValue::Vector(position)),
                ("species", FieldValue::Species(species)),
            ],
        }
    }

    /// Which variant (value or tangent) is this state?
    pub fn variant(&self) -> StateVariant {
        self.variant
    }

    /// Get a copy of this state with the given `variant`
    pub fn with_variant(&self, variant: StateVariant) -> State {
        State { variant, fields: self.fields.clone() }
    }

    /// Get a copy of this state with the field `name` replaced by `value`.
    /// The replacement must keep the field kind unchanged.
    pub fn with_field(&self, name: &str, value: FieldValue) -> Result<State, Error> {
        let mut fields = self.fields.clone();
        for (field_name, field) in &mut fields {
            if *field_name == name {
                if field.kind() != value.kind() {
                    return Err(Error::SchemaMismatch(format!(
                        "can not replace {} field '{}' with a {} value",
                        field.kind(), name, value.kind()
                    )));
                }
                *field = value;
                return Ok(State { variant: self.variant, fields });
            }
        }
        return Err(Error::InvalidParameter(format!(
            "no field named '{}' in state {}", name, self
        )));
    }

    /// Get the value of the field with the given `name`, if any
    pub fn get(&self, name: &str) -> Option<FieldValue> {
        self.fields.iter()
            .find(|(field_name, _)| *field_name == name)
            .map(|(_, value)| *value)
    }

    /// Get the relative position stored in this state. This is the one
    /// field the evaluation engine requires.
    pub fn position(&self) -> Result<Vector3D, Error> {
        match self.get("position") {
            Some(FieldValue::Vector(position)) => Ok(position),
            Some(other) => Err(Error::SchemaMismatch(format!(
                "'position' field should be a vector, got a {} value", other.kind()
            ))),
            None => Err(Error::InvalidParameter(
                "state has no 'position' field".into()
            )),
        }
    }

    /// Get the species stored in this state, defaulting to 0 when the state
    /// does not carry a species field.
    pub fn species(&self) -> i32 {
        match self.get("species") {
            Some(FieldValue::Species(species)) => species,
            _ => 0,
        }
    }

    fn schema_string(&self) -> String {
        let fields = self.fields.iter()
            .map(|(name, value)| match value {
                FieldValue::Species(z) => format!("{}: species({})", name, z),
                other => format!("{}: {}", name, other.kind()),
            })
            .collect::<Vec<_>>();
        return format!("{{{}}}", fields.join(", "));
    }

    /// Check that `self` and `other` share a schema: same field names, same
    /// field kinds, same species values, in the same order.
    fn check_same_schema(&self, other: &State) -> Result<(), Error> {
        let matches = self.fields.len() == other.fields.len()
            && std::iter::zip(&self.fields, &other.fields).all(|((name_a, a), (name_b, b))| {
                name_a == name_b && a.kind() == b.kind() && match (a, b) {
                    (FieldValue::Species(za), FieldValue::Species(zb)) => za == zb,
                    _ => true,
                }
            });

        if matches {
            return Ok(());
        }
        return Err(Error::SchemaMismatch(format!(
            "{} and {} do not share a schema", self.schema_string(), other.schema_string()
        )));
    }

    /// Field-wise addition. Both operands must share a schema; the result
    /// takes the variant of `self`, so `value + scaled tangent` is a value.
    pub fn add(&self, other: &State) -> Result<State, Error> {
        self.check_same_schema(other)?;
        let fields = std::iter::zip(&self.fields, &other.fields)
            .map(|((name, a), (_, b))| {
                let value = match (a, b) {
                    (FieldValue::Scalar(a), FieldValue::Scalar(b)) => FieldValue::Scalar(a + b),
                    (FieldValue::Vector(a), FieldValue::Vector(b)) => FieldValue::Vector(*a + *b),
                    (FieldValue::Species(z), FieldValue::Species(_)) => FieldValue::Species(*z),
                    _ => unreachable!("checked by check_same_schema"),
                };
                (*name, value)
            })
            .collect();
        return Ok(State { variant: self.variant, fields });
    }

    /// Field-wise subtraction, with the same schema requirements as
    /// [`State::add`]
    pub fn sub(&self, other: &State) -> Result<State, Error> {
        self.check_same_schema(other)?;
        let fields = std::iter::zip(&self.fields, &other.fields)
            .map(|((name, a), (_, b))| {
                let value = match (a, b) {
                    (FieldValue::Scalar(a), FieldValue::Scalar(b)) => FieldValue::Scalar(a - b),
                    (FieldValue::Vector(a), FieldValue::Vector(b)) => FieldValue::Vector(*a - *b),
                    (FieldValue::Species(z), FieldValue::Species(_)) => FieldValue::Species(*z),
                    _ => unreachable!("checked by check_same_schema"),
                };
                (*name, value)
            })
            .collect();
        return Ok(State { variant: self.variant, fields });
    }

    /// Multiply every continuous field of this state by `scalar`
    pub fn scale(&self, scalar: f64) -> State {
        let fields = self.fields.iter()
            .map(|(name, value)| {
                let value = match value {
                    FieldValue::Scalar(v) => FieldValue::Scalar(scalar * v),
                    FieldValue::Vector(v) => FieldValue::Vector(scalar * *v),
                    FieldValue::Species(z) => FieldValue::Species(*z),
                };
                (*name, value)
            })
            .collect();
        return State { variant: self.variant, fields };
    }

    /// `sqrt(Σ squared field-wise norms)` over the continuous fields
    pub fn norm(&self) -> f64 {
        let mut norm2 = 0.0;
        for (_, value) in &self.fields {
            match value {
                FieldValue::Scalar(v) => norm2 += v * v,
                FieldValue::Vector(v) => norm2 += v.norm2(),
                FieldValue::Species(_) => {}
            }
        }
        return f64::sqrt(norm2);
    }

    /// Create a state with the same schema as `self`, with every continuous
    /// field set to zero. Species fields are carried through unchanged, so
    /// that `A + A.zero_like() == A`.
    pub fn zero_like(&self) -> State {
        self.generate_like(&mut || 0.0)
    }

    /// Create a state with the same schema as `self`, with every continuous
    /// component drawn uniformly from `[-1, 1)`
    pub fn rand_like(&self, rng: &mut impl Rng) -> State {
        self.generate_like(&mut || rng.gen_range(-1.0..1.0))
    }

    /// Create a state with the same schema as `self`, with every continuous
    /// component drawn from the standard normal distribution
    pub fn randn_like(&self, rng: &mut impl Rng) -> State {
        self.generate_like(&mut || -> f64 { rng.sample(StandardNormal) })
    }

    fn generate_like(&self, sample: &mut dyn FnMut() -> f64) -> State {
        let fields = self.fields.iter()
            .map(|(name, value)| {
                let value = match value {
                    FieldValue::Scalar(_) => FieldValue::Scalar(sample()),
                    FieldValue::Vector(_) => FieldValue::Vector(
                        Vector3D::new(sample(), sample(), sample())
                    ),
                    FieldValue::Species(z) => FieldValue::Species(*z),
                };
                (*name, value)
            })
            .collect();
        return State { variant: self.variant, fields };
    }
}

impl std::ops::Mul<f64> for &State {
    type Output = State;

    fn mul(self, scalar: f64) -> State {
        self.scale(scalar)
    }
}

impl std::ops::Mul<&State> for f64 {
    type Output = State;

    fn mul(self, state: &State) -> State {
        state.scale(self)
    }
}

impl approx::AbsDiffEq for State {
    type Epsilon = f64;

    fn default_epsilon() -> f64 {
        f64::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &State, epsilon: f64) -> bool {
        if self.variant != other.variant || self.check_same_schema(other).is_err() {
            return false;
        }
        return std::iter::zip(&self.fields, &other.fields).all(|((_, a), (_, b))| {
            match (a, b) {
                (FieldValue::Scalar(a), FieldValue::Scalar(b)) => a.abs_diff_eq(b, epsilon),
                (FieldValue::Vector(a), FieldValue::Vector(b)) => a.abs_diff_eq(b, epsilon),
                (FieldValue::Species(a), FieldValue::Species(b)) => a == b,
                _ => false,
            }
        });
    }
}

impl approx::RelativeEq for State {
    fn default_max_relative() -> f64 {
        f64::default_max_relative()
    }

    fn relative_eq(&self, other: &State, epsilon: f64, max_relative: f64) -> bool {
        if self.variant != other.variant || self.check_same_schema(other).is_err() {
            return false;
        }
        return std::iter::zip(&self.fields, &other.fields).all(|((_, a), (_, b))| {
            match (a, b) {
                (FieldValue::Scalar(a), FieldValue::Scalar(b)) => a.relative_eq(b, epsilon, max_relative),
                (FieldValue::Vector(a), FieldValue::Vector(b)) => a.relative_eq(b, epsilon, max_relative),
                (FieldValue::Species(a), FieldValue::Species(b)) => a == b,
                _ => false,
            }
        });
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i != 0 {
                write!(f, ", ")?;
            }
            match value {
                FieldValue::Scalar(v) => write!(f, "{} = {}", name, v)?,
                FieldValue::Vector(v) => write!(f, "{} = [{}, {}, {}]", name, v.x, v.y, v.z)?,
                FieldValue::Species(z) => write!(f, "{} = {}", name, z)?,
            }
        }
        write!(f, "}}")?;
        if self.variant == StateVariant::Tangent {
            write!(f, "'")?;
        }
        return Ok(());
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn sample_state() -> State {
        State::new(StateVariant::Value, vec![
            ("position", FieldValue::Vector(Vector3D::new(1.0, -2.0, 0.5))),
            ("charge", FieldValue::Scalar(0.3)),
            ("species", FieldValue::Species(6)),
        ]).unwrap()
    }

    #[test]
    fn duplicated_field() {
        let result = State::new(StateVariant::Value, vec![
            ("position", FieldValue::Vector(Vector3D::zero())),
            ("position", FieldValue::Vector(Vector3D::zero())),
        ]);

        assert_eq!(
            result.unwrap_err().to_string(),
            "invalid parameter: duplicated field name 'position' in state"
        );
    }

    #[test]
    fn schema_closure() {
        let mut rng = StdRng::seed_from_u64(0x57a7e);
        let a = sample_state();
        let b = a.rand_like(&mut rng);

        for state in [a.add(&b).unwrap(), a.sub(&b).unwrap(), a.scale(-3.0)] {
            assert!(state.check_same_schema(&a).is_ok());
            assert_eq!(state.variant(), StateVariant::Value);
        }
    }

    #[test]
    fn schema_mismatch() {
        let a = sample_state();
        let b = State::atom(Vector3D::zero(), 6);

        let error = a.add(&b).unwrap_err();
        assert_eq!(
            error.to_string(),
            "state schema mismatch: {position: vector, charge: scalar, species: species(6)} \
             and {position: vector, species: species(6)} do not share a schema"
        );

        // same field names, different species value
        let c = State::atom(Vector3D::zero(), 6);
        let d = State::atom(Vector3D::zero(), 8);
        assert!(c.add(&d).is_err());
    }

    #[test]
    fn vector_space_laws() {
        let mut rng = StdRng::seed_from_u64(0xacc);
        let a = sample_state();
        let b = a.randn_like(&mut rng);
        let c = a.randn_like(&mut rng);

        assert_eq!(a.add(&b).unwrap(), b.add(&a).unwrap());
        assert_relative_eq!(
            a.add(&b).unwrap().add(&c).unwrap(),
            a.add(&b.add(&c).unwrap()).unwrap(),
            max_relative = 1e-15
        );

        assert_eq!(a.scale(1.0), a);
        assert_relative_eq!(a.scale(2.0).scale(3.0), a.scale(6.0), max_relative = 1e-15);
        assert_eq!(2.0 * &a, a.scale(2.0));
        assert_eq!(&a * 2.0, a.scale(2.0));

        assert_eq!(a.add(&a.zero_like()).unwrap(), a);
    }

    #[test]
    fn norm() {
        let a = sample_state();
        assert!(a.norm() >= 0.0);
        assert_eq!(a.zero_like().norm(), 0.0);

        // species does not contribute to the norm
        let expected = f64::sqrt(Vector3D::new(1.0, -2.0, 0.5).norm2() + 0.3 * 0.3);
        assert_eq!(a.norm(), expected);
    }

    #[test]
    fn value_plus_tangent() {
        let x = State::atom(Vector3D::new(1.0, 0.0, 0.0), 1);
        let dx = State::atom(Vector3D::new(0.0, 1.0, 0.0), 1).with_variant(StateVariant::Tangent);

        let moved = x.add(&dx.scale(0.5)).unwrap();
        assert_eq!(moved.variant(), StateVariant::Value);
        assert_eq!(moved.position().unwrap(), Vector3D::new(1.0, 0.5, 0.0));
        assert_eq!(moved.species(), 1);
    }

    #[test]
    fn display() {
        let state = sample_state();
        assert_eq!(
            state.to_string(),
            "{position = [1, -2, 0.5], charge = 0.3, species = 6}"
        );

        let tangent = state.with_variant(StateVariant::Tangent);
        assert!(tangent.to_string().ends_with("}'"));
    }

    #[test]
    fn accessors() {
        let state = State::atom(Vector3D::new(0.0, 0.0, 1.5), 8);
        assert_eq!(state.position().unwrap(), Vector3D::new(0.0, 0.0, 1.5));
        assert_eq!(state.species(), 8);

        let no_species = State::new(StateVariant::Value, vec![
            ("position", FieldValue::Vector(Vector3D::zero())),
        ]).unwrap();
        assert_eq!(no_species.species(), 0);

        let no_position = State::new(StateVariant::Value, vec![
            ("charge", FieldValue::Scalar(0.0)),
        ]).unwrap();
        assert!(no_position.position().is_err());

        let replaced = state.with_field(
            "position", FieldValue::Vector(Vector3D::new(1.0, 1.0, 1.0))
        ).unwrap();
        assert_eq!(replaced.position().unwrap(), Vector3D::new(1.0, 1.0, 1.0));
        assert!(state.with_field("position", FieldValue::Scalar(1.0)).is_err());
        assert!(state.with_field("missing", FieldValue::Scalar(1.0)).is_err());
    }
}
