//! Typed numeric field tables.
//!
//! Any numeric field of an object is a legal binding target. Instead of
//! reflecting over a dynamic record, every variant publishes a static table
//! mapping the property name to a getter/setter pair. Binding records store
//! the name as a key into that table.

/// One enumerable numeric property of `T`.
pub struct NumericField<T> {
    pub name: &'static str,
    pub get: fn(&T) -> f64,
    pub set: fn(&mut T, f64),
}

impl<T> std::fmt::Debug for NumericField<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NumericField")
            .field("name", &self.name)
            .finish()
    }
}

/// Read `name` from `target` through its table.
pub fn read<T>(fields: &[NumericField<T>], target: &T, name: &str) -> Option<f64> {
    fields.iter().find(|f| f.name == name).map(|f| (f.get)(target))
}

/// Write `name` on `target` through its table. Returns `false` if the table has no such field.
pub fn write<T>(fields: &[NumericField<T>], target: &mut T, name: &str, value: f64) -> bool {
    match fields.iter().find(|f| f.name == name) {
        Some(f) => {
            (f.set)(target, value);
            true
        }
        None => false,
    }
}

/// Whether the table declares `name`.
pub fn declares<T>(fields: &[NumericField<T>], name: &str) -> bool {
    fields.iter().any(|f| f.name == name)
}

/// `(name, value)` for every entry of the table.
pub fn enumerate<T>(fields: &[NumericField<T>], target: &T) -> Vec<(String, f64)> {
    fields
        .iter()
        .map(|f| (f.name.to_string(), (f.get)(target)))
        .collect()
}

/// Builds a `&'static [NumericField<T>]` from `"name" => field` pairs for plain `f64` fields.
///
/// Fields stored as something other than `f64` go in a trailing `with [..]`
/// list of hand-written entries, appended after the plain ones.
#[macro_export]
#[doc(hidden)]
macro_rules! numeric_fields {
    ($ty:ty { $($name:literal => $field:ident),* $(,)? } $(with [ $($extra:expr),* $(,)? ])?) => {
        &[
            $(
                $crate::graph::fields::NumericField::<$ty> {
                    name: $name,
                    get: |o: &$ty| o.$field,
                    set: |o: &mut $ty, v: f64| o.$field = v,
                },
            )*
            $($($extra,)*)?
        ]
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sample {
        a: f64,
        b: f64,
        count: u32,
    }

    const SAMPLE_FIELDS: &[NumericField<Sample>] = crate::numeric_fields!(Sample {
        "a" => a,
        "b" => b,
    } with [
        NumericField {
            name: "count",
            get: |o: &Sample| f64::from(o.count),
            set: |o: &mut Sample, v| o.count = v.max(0.0).round() as u32,
        },
    ]);

    #[test]
    fn test_read_write() {
        let mut p = Sample { a: 1.0, b: 2.0, count: 0 };
        assert_eq!(read(SAMPLE_FIELDS, &p, "a"), Some(1.0));
        assert!(write(SAMPLE_FIELDS, &mut p, "b", 7.0));
        assert_eq!(p.b, 7.0);
        assert!(!write(SAMPLE_FIELDS, &mut p, "c", 1.0));
        assert_eq!(read(SAMPLE_FIELDS, &p, "c"), None);
    }

    #[test]
    fn test_hand_written_entries_convert() {
        let mut p = Sample { a: 0.0, b: 0.0, count: 0 };
        assert!(write(SAMPLE_FIELDS, &mut p, "count", 2.6));
        assert_eq!(p.count, 3);
        assert!(write(SAMPLE_FIELDS, &mut p, "count", -4.0));
        assert_eq!(read(SAMPLE_FIELDS, &p, "count"), Some(0.0));
    }

    #[test]
    fn test_enumerate_in_table_order() {
        let p = Sample { a: 3.0, b: 4.0, count: 5 };
        let all = enumerate(SAMPLE_FIELDS, &p);
        assert_eq!(
            all,
            vec![
                ("a".to_string(), 3.0),
                ("b".to_string(), 4.0),
                ("count".to_string(), 5.0)
            ]
        );
        assert!(declares(SAMPLE_FIELDS, "a"));
        assert!(!declares(SAMPLE_FIELDS, "z"));
    }
}
