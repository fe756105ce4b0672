//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use std::time::Duration;
use wirecanvas::{Object, ObjectId};

/// Create a test timeout duration
pub fn test_timeout() -> Duration {
    Duration::from_secs(2)
}

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}

/// Numeric property of the object with `id` in `objects`.
pub fn numeric_of(objects: &[Object], id: &str, property: &str) -> Option<f64> {
    objects
        .iter()
        .find(|o| o.id() == &ObjectId::new(id))
        .and_then(|o| o.numeric(property))
}
