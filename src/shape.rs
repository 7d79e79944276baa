//! Shape and leaf-type checks for nested tree arrays.
//!
//! A fixed-size field such as a 2×2×2 detector-limit tensor travels through
//! the tree as nested arrays.  Before a value is copied out of the tree, the
//! node must have exactly the declared dimensions and its innermost arrays
//! must be homogeneous in the expected leaf type.  Nothing is coerced: an
//! integer leaf never satisfies a real check.

use serde_json::Value;

// ── Kind ──────────────────────────────────────────────────────────────────────

/// Dynamic type of a tree node.  Integers and reals are distinct kinds, as
/// the document text distinguishes `1` from `1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Null,
    Bool,
    Integer,
    Real,
    String,
    Array,
    Object,
}

impl Kind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null                  => Kind::Null,
            Value::Bool(_)               => Kind::Bool,
            Value::Number(n) if n.is_f64() => Kind::Real,
            Value::Number(_)             => Kind::Integer,
            Value::String(_)             => Kind::String,
            Value::Array(_)              => Kind::Array,
            Value::Object(_)             => Kind::Object,
        }
    }

    /// Article-prefixed name, for error messages.
    pub fn describe(self) -> &'static str {
        match self {
            Kind::Null    => "null",
            Kind::Bool    => "a boolean",
            Kind::Integer => "an integer",
            Kind::Real    => "a real",
            Kind::String  => "a string",
            Kind::Array   => "an array",
            Kind::Object  => "an object",
        }
    }
}

// ── Homogeneous ───────────────────────────────────────────────────────────────

/// Leaf predicate applied to the innermost array of a shaped node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Homogeneous {
    /// Accepts anything; used when only cardinality matters.
    #[default]
    Any,
    Object,
    Array,
    String,
    Integer,
    Real,
}

impl Homogeneous {
    /// `true` if every item is of this kind.  An empty slice passes.
    pub fn accepts(self, items: &[Value]) -> bool {
        let want = match self {
            Homogeneous::Any     => return true,
            Homogeneous::Object  => Kind::Object,
            Homogeneous::Array   => Kind::Array,
            Homogeneous::String  => Kind::String,
            Homogeneous::Integer => Kind::Integer,
            Homogeneous::Real    => Kind::Real,
        };
        items.iter().all(|item| Kind::of(item) == want)
    }
}

/// `true` if `value` is an array whose items are all of `leaf` kind.
pub fn is_array_of(value: &Value, leaf: Homogeneous) -> bool {
    value.as_array().is_some_and(|items| leaf.accepts(items))
}

// ── Dimension checks ──────────────────────────────────────────────────────────

/// Check `node` against `dims` with no leaf-type constraint.
pub fn check_dimensions(node: &Value, dims: &[usize]) -> bool {
    check_dimensions_with(node, dims, Homogeneous::Any)
}

/// Check that `node` is nested arrays of exactly `dims` whose innermost
/// arrays satisfy `leaf`.
///
/// Empty `dims` is a degenerate base case: it only matches an empty array.
/// Any failing element fails the whole check.
pub fn check_dimensions_with(node: &Value, dims: &[usize], leaf: Homogeneous) -> bool {
    let Some(items) = node.as_array() else {
        return false;
    };
    match dims {
        [] => items.is_empty(),
        [len] => items.len() == *len && leaf.accepts(items),
        [len, inner @ ..] => {
            items.len() == *len
                && items.iter().all(|item| check_dimensions_with(item, inner, leaf))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn real_matrix_matches_its_own_shape() {
        let m = json!([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        assert!(check_dimensions_with(&m, &[2, 3], Homogeneous::Real));
        assert!(!check_dimensions_with(&m, &[3, 2], Homogeneous::Real));
        assert!(check_dimensions(&m, &[2, 3]));
    }

    #[test]
    fn mixed_leaf_row_fails_regardless_of_dims() {
        let m = json!([[1.0, 2.0, 3.0], [4.0, "x", 6.0]]);
        assert!(!check_dimensions_with(&m, &[2, 3], Homogeneous::Real));
        assert!(!check_dimensions_with(&m, &[3, 2], Homogeneous::Real));
    }

    #[test]
    fn integers_are_not_reals() {
        let v = json!([1, 2, 3]);
        assert!(!check_dimensions_with(&v, &[3], Homogeneous::Real));
        assert!(check_dimensions_with(&v, &[3], Homogeneous::Integer));
        assert_eq!(Kind::of(&json!(1.0)), Kind::Real);
        assert_eq!(Kind::of(&json!(1)), Kind::Integer);
    }

    #[test]
    fn ragged_inner_array_fails() {
        let t = json!([[[1.0, 2.0], [3.0, 4.0]], [[5.0, 6.0], [7.0]]]);
        assert!(!check_dimensions_with(&t, &[2, 2, 2], Homogeneous::Real));
        let t = json!([[[1.0, 2.0], [3.0, 4.0]], [[5.0, 6.0], [7.0, 8.0]]]);
        assert!(check_dimensions_with(&t, &[2, 2, 2], Homogeneous::Real));
    }

    #[test]
    fn empty_dims_matches_only_empty_array() {
        assert!(check_dimensions(&json!([]), &[]));
        assert!(!check_dimensions(&json!([1]), &[]));
        assert!(!check_dimensions(&json!("x"), &[]));
    }

    #[test]
    fn non_array_fails() {
        assert!(!check_dimensions(&json!({"a": 1}), &[1]));
        assert!(!check_dimensions(&json!(1.0), &[1]));
    }

    #[test]
    fn homogeneity_predicates() {
        assert!(Homogeneous::String.accepts(&[json!("a"), json!("b")]));
        assert!(!Homogeneous::Object.accepts(&[json!({}), json!([])]));
        assert!(Homogeneous::Array.accepts(&[]));
        assert!(is_array_of(&json!([{}, {}]), Homogeneous::Object));
        assert!(!is_array_of(&json!({}), Homogeneous::Any));
    }
}
