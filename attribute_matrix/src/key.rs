//! Canonical key codec for attribute assignments.
//!
//! A key is the `attribute_id:value` pairs of an assignment, sorted by
//! attribute id and joined with [`PAIR_DELIMITER`]. Any permutation of the same
//! pairs encodes to the same key, so matrix lookups are a single unique-index
//! probe on `(product_id, combination_key)`.
//!
//! Catalog normalization guarantees that attribute ids never contain `:`, `|`
//! or `§` and that values never contain `|`, so the encoding is unambiguous.
//! Values may contain `:` because decoding splits on the first one.
//!
//! ```
//! use attribute_matrix::key::{Assignment, encode};
//!
//! let mut a = Assignment::new();
//! a.insert("uv".into(), "Spot UV§Logo".into());
//! a.insert("paper".into(), "350".into());
//! assert_eq!(encode(&a).as_str(), "paper:350|uv:Spot UV§Logo");
//! ```

use std::{collections::BTreeMap, fmt};

use serde::Serialize;
use thiserror::Error;

/// Separator between `id:value` pairs.
pub const PAIR_DELIMITER: char = '|';
/// Separator between an attribute id and its value inside one pair.
pub const ID_VALUE_DELIMITER: char = ':';

/// Attribute id -> selected value. `BTreeMap` keeps ids sorted, which is the
/// canonical order.
pub type Assignment = BTreeMap<String, String>;

/// Canonical, order-independent encoding of an [`Assignment`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct CombinationKey(String);

impl CombinationKey {
    /// Wrap a key read back from storage after checking it decodes.
    pub fn parse(raw: impl Into<String>) -> Result<Self, KeyError> {
        let raw = raw.into();
        decode_str(&raw)?;
        Ok(Self(raw))
    }

    /// Borrow the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode back into the assignment it was built from.
    pub fn decode(&self) -> Assignment {
        // Construction guarantees the key decodes.
        decode_str(&self.0).unwrap_or_default()
    }
}

impl fmt::Display for CombinationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CombinationKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Errors raised when decoding a stored key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    /// A pair has no `:` separating id from value.
    #[error("key segment '{segment}' is missing the ':' separator")]
    MissingSeparator {
        /// The offending segment.
        segment: String,
    },
    /// The same attribute id appears twice.
    #[error("attribute '{attribute}' appears more than once in key")]
    DuplicateAttribute {
        /// The repeated attribute id.
        attribute: String,
    },
    /// Pairs are not in ascending attribute order.
    #[error("key is not in canonical order at attribute '{attribute}'")]
    NotCanonical {
        /// First attribute found out of order.
        attribute: String,
    },
}

/// Encode an assignment. The map is already sorted by attribute id.
pub fn encode(assignment: &Assignment) -> CombinationKey {
    encode_pairs(assignment.iter().map(|(k, v)| (k.as_str(), v.as_str())))
}

/// Encode pairs given in any order.
///
/// If an attribute id repeats, the last value wins, matching map insertion.
pub fn encode_pairs<'a, I>(pairs: I) -> CombinationKey
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let sorted: BTreeMap<&str, &str> = pairs.into_iter().collect();
    let mut out = String::new();
    for (i, (id, value)) in sorted.into_iter().enumerate() {
        if i > 0 {
            out.push(PAIR_DELIMITER);
        }
        out.push_str(id);
        out.push(ID_VALUE_DELIMITER);
        out.push_str(value);
    }
    CombinationKey(out)
}

/// Decode a raw key string.
pub fn decode(raw: &str) -> Result<Assignment, KeyError> {
    decode_str(raw)
}

fn decode_str(raw: &str) -> Result<Assignment, KeyError> {
    let mut out = Assignment::new();
    if raw.is_empty() {
        return Ok(out);
    }
    let mut prev: Option<&str> = None;
    for segment in raw.split(PAIR_DELIMITER) {
        let (id, value) =
            segment
                .split_once(ID_VALUE_DELIMITER)
                .ok_or_else(|| KeyError::MissingSeparator {
                    segment: segment.to_string(),
                })?;
        if let Some(p) = prev {
            if p == id {
                return Err(KeyError::DuplicateAttribute {
                    attribute: id.to_string(),
                });
            }
            if p > id {
                return Err(KeyError::NotCanonical {
                    attribute: id.to_string(),
                });
            }
        }
        prev = Some(id);
        out.insert(id.to_string(), value.to_string());
    }
    Ok(out)
}

/// True if `id` may be used as an attribute id inside a key.
pub fn is_valid_attribute_id(id: &str) -> bool {
    !id.is_empty()
        && !id.contains(ID_VALUE_DELIMITER)
        && !id.contains(PAIR_DELIMITER)
        && !id.contains(crate::engine::expand::COMPOSITE_SEPARATOR)
}

/// True if `value` may be used as a (base or sub) value inside a key.
pub fn is_valid_value(value: &str) -> bool {
    !value.is_empty()
        && !value.contains(PAIR_DELIMITER)
        && !value.contains(crate::engine::expand::COMPOSITE_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn assignment(pairs: &[(&str, &str)]) -> Assignment {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn encodes_sorted_pairs() {
        let a = assignment(&[("uv", "None"), ("paper", "350"), ("finish", "matte")]);
        assert_eq!(encode(&a).as_str(), "finish:matte|paper:350|uv:None");
    }

    #[test]
    fn empty_assignment_is_empty_key() {
        let key = encode(&Assignment::new());
        assert_eq!(key.as_str(), "");
        assert!(key.decode().is_empty());
    }

    #[test]
    fn value_may_contain_colon() {
        let a = assignment(&[("size", "A4:landscape")]);
        let key = encode(&a);
        assert_eq!(decode(key.as_str()).unwrap(), a);
    }

    #[test]
    fn decode_rejects_non_canonical_keys() {
        assert_eq!(
            decode("uv:None|paper:350").unwrap_err(),
            KeyError::NotCanonical {
                attribute: "paper".into()
            }
        );
        assert!(matches!(
            decode("paper:350|paper:400"),
            Err(KeyError::DuplicateAttribute { .. })
        ));
        assert!(matches!(
            decode("paper"),
            Err(KeyError::MissingSeparator { .. })
        ));
    }

    #[test]
    fn parse_accepts_encoded_keys() {
        let a = assignment(&[("paper", "300"), ("uv", "Spot UV§Full")]);
        let key = encode(&a);
        let parsed = CombinationKey::parse(key.as_str().to_string()).unwrap();
        assert_eq!(parsed, key);
        assert_eq!(parsed.decode(), a);
    }

    #[test]
    fn identifier_rules() {
        assert!(is_valid_attribute_id("paper"));
        assert!(!is_valid_attribute_id("pa:per"));
        assert!(!is_valid_attribute_id("pa|per"));
        assert!(!is_valid_attribute_id(""));
        assert!(is_valid_value("A4:landscape"));
        assert!(!is_valid_value("a|b"));
        assert!(!is_valid_value("a§b"));
    }

    proptest! {
        #[test]
        fn encode_is_permutation_invariant(
            pairs in proptest::collection::btree_map("[a-z]{1,6}", "[A-Za-z0-9 ]{1,6}", 0..6),
            seed in any::<u64>(),
        ) {
            let mut shuffled: Vec<(&str, &str)> =
                pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
            // Deterministic rotation + reversal driven by the seed.
            if !shuffled.is_empty() {
                let n = shuffled.len();
                shuffled.rotate_left((seed as usize) % n);
                if seed % 2 == 0 {
                    shuffled.reverse();
                }
            }
            let canonical = encode(&pairs);
            prop_assert_eq!(encode_pairs(shuffled), canonical.clone());
            prop_assert_eq!(decode(canonical.as_str()).unwrap(), pairs);
        }
    }
}
