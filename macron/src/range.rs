use crate::error::{MacroError, MacroErrorKind};

/// A range specification, already classified into one of the four recognized
/// shapes. Mappings are ordered key/value pair lists; insertion order is the
/// iteration order. The type is generic over the value representation so the
/// core stays independent of the generator's runtime values.
#[derive(Debug, Clone, PartialEq)]
pub enum RangeSpec<V> {
    /// All values of a mapping, in insertion order.
    Each(Vec<(String, V)>),
    /// All keys of a mapping, as strings, in insertion order.
    Keys(Vec<(String, V)>),
    /// An explicit list of values, verbatim.
    Values(Vec<V>),
    /// All integers from `from` to `to`, inclusive.
    Interval { from: i64, to: i64 },
}

/// Expand a range specification into the concrete ordered list of values it
/// denotes. Fails with `BadInterval` when `from > to`.
pub fn expand<V>(spec: RangeSpec<V>) -> Result<Vec<V>, MacroError>
where
    V: From<i64> + From<String>,
{
    match spec {
        RangeSpec::Each(pairs) => Ok(pairs.into_iter().map(|(_, v)| v).collect()),
        RangeSpec::Keys(pairs) => Ok(pairs.into_iter().map(|(k, _)| V::from(k)).collect()),
        RangeSpec::Values(values) => Ok(values),
        RangeSpec::Interval { from, to } => {
            if from > to {
                return Err(MacroError::new(
                    MacroErrorKind::BadInterval,
                    format!("interval runs from {} to {}", from, to),
                ));
            }
            Ok((from..=to).map(V::from).collect())
        }
    }
}

/// Cartesian product of a set of expanded ranges, in mixed-radix counting
/// order with the last range varying fastest:
/// `[[a, b], [x, y]]` yields `[a,x], [a,y], [b,x], [b,y]`.
///
/// An empty set of ranges yields an empty product, not a single empty tuple;
/// so does any constituent empty range.
pub fn combine<V: Clone>(ranges: &[Vec<V>]) -> Vec<Vec<V>> {
    if ranges.is_empty() {
        return Vec::new();
    }
    let mut tuples: Vec<Vec<V>> = vec![Vec::new()];
    for range in ranges {
        let mut next = Vec::with_capacity(tuples.len() * range.len());
        for prefix in &tuples {
            for value in range {
                let mut tuple = prefix.clone();
                tuple.push(value.clone());
                next.push(tuple);
            }
        }
        tuples = next;
    }
    tuples
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Val {
        Int(i64),
        Text(String),
    }

    impl From<i64> for Val {
        fn from(n: i64) -> Self {
            Val::Int(n)
        }
    }

    impl From<String> for Val {
        fn from(s: String) -> Self {
            Val::Text(s)
        }
    }

    fn pairs(entries: &[(&str, i64)]) -> Vec<(String, Val)> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), Val::Int(*v)))
            .collect()
    }

    #[test]
    fn expands_each_range() {
        let spec = RangeSpec::Each(pairs(&[("a", 0), ("b", 15), ("c", 7)]));
        let res = expand(spec).unwrap();
        assert_eq!(res, vec![Val::Int(0), Val::Int(15), Val::Int(7)]);
    }

    #[test]
    fn expands_each_range_empty_mapping() {
        let spec: RangeSpec<Val> = RangeSpec::Each(Vec::new());
        assert!(expand(spec).unwrap().is_empty());
    }

    #[test]
    fn expands_keys_range() {
        let spec = RangeSpec::Keys(pairs(&[("a", 0), ("b", 15), ("c", 7)]));
        let res = expand(spec).unwrap();
        assert_eq!(
            res,
            vec![
                Val::Text("a".into()),
                Val::Text("b".into()),
                Val::Text("c".into())
            ]
        );
    }

    #[test]
    fn expands_interval() {
        let spec: RangeSpec<Val> = RangeSpec::Interval { from: 10, to: 14 };
        let res = expand(spec).unwrap();
        assert_eq!(
            res,
            (10..=14).map(Val::Int).collect::<Vec<_>>()
        );
    }

    #[test]
    fn expands_interval_single_point() {
        let spec: RangeSpec<Val> = RangeSpec::Interval { from: 10, to: 10 };
        assert_eq!(expand(spec).unwrap(), vec![Val::Int(10)]);
    }

    #[test]
    fn expands_values_verbatim() {
        let spec = RangeSpec::Values(vec![Val::Int(0), Val::Int(10), Val::Int(20)]);
        assert_eq!(
            expand(spec).unwrap(),
            vec![Val::Int(0), Val::Int(10), Val::Int(20)]
        );
    }

    #[test]
    fn expands_empty_values_list() {
        let spec: RangeSpec<Val> = RangeSpec::Values(Vec::new());
        assert!(expand(spec).unwrap().is_empty());
    }

    #[test]
    fn rejects_backwards_interval() {
        let spec: RangeSpec<Val> = RangeSpec::Interval { from: 20, to: 10 };
        let err = expand(spec).unwrap_err();
        assert_eq!(err.kind, MacroErrorKind::BadInterval);
    }

    #[test]
    fn combines_three_ranges_last_varies_fastest() {
        let ranges = vec![vec![0, 1, 2], vec![5, 6], vec![8, 9]];
        let res = combine(&ranges);
        assert_eq!(res.len(), 12);
        assert_eq!(res[0], vec![0, 5, 8]);
        assert_eq!(res[1], vec![0, 5, 9]);
        assert_eq!(res[2], vec![0, 6, 8]);
        assert_eq!(res[3], vec![0, 6, 9]);
        assert_eq!(res[4], vec![1, 5, 8]);
        assert_eq!(res[11], vec![2, 6, 9]);
    }

    #[test]
    fn combines_single_range() {
        let res = combine(&[vec!['a', 'b', 'c']]);
        assert_eq!(res, vec![vec!['a'], vec!['b'], vec!['c']]);
    }

    #[test]
    fn combines_single_value() {
        let res = combine(&[vec![0]]);
        assert_eq!(res, vec![vec![0]]);
    }

    #[test]
    fn combines_nothing() {
        let res: Vec<Vec<i64>> = combine(&[]);
        assert!(res.is_empty());
    }

    #[test]
    fn empty_constituent_range_empties_the_product() {
        let res = combine(&[vec![1, 2], Vec::new()]);
        assert!(res.is_empty());
    }
}
