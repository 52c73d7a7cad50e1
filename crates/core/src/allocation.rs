//! Integer-cent apportionment.
//!
//! Both primitives use the largest-remainder method: every entry first receives
//! the floor of its exact share, then the cents lost to flooring are handed out
//! one at a time to the entries with the largest remainders. Ties go to the
//! entry that appeared first in the input, so results are reproducible.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationError {
    #[error("Invalid allocation input: {0}")]
    InvalidInput(String),
    #[error("Total weight must be greater than zero")]
    ZeroWeight,
}

/// One allocation target and its weight (units, or value in cents).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Weight<K> {
    pub key: K,
    pub weight: i64,
}

impl<K> Weight<K> {
    pub fn new(key: K, weight: i64) -> Self {
        Self { key, weight }
    }
}

/// Result of an allocation: key → cents, in first-seen input order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation<K> {
    shares: Vec<(K, i64)>,
}

impl<K: PartialEq> Allocation<K> {
    pub fn get(&self, key: &K) -> Option<i64> {
        self.shares.iter().find(|(k, _)| k == key).map(|(_, c)| *c)
    }
}

impl<K> Allocation<K> {
    pub fn iter(&self) -> impl Iterator<Item = (&K, i64)> {
        self.shares.iter().map(|(k, c)| (k, *c))
    }

    pub fn total(&self) -> i64 {
        self.shares.iter().map(|(_, c)| *c).sum()
    }

    pub fn len(&self) -> usize {
        self.shares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shares.is_empty()
    }

    pub fn into_vec(self) -> Vec<(K, i64)> {
        self.shares
    }
}

impl<K: Ord> Allocation<K> {
    pub fn into_map(self) -> BTreeMap<K, i64> {
        self.shares.into_iter().collect()
    }
}

/// Splits `total_cents` across `weights` so the shares sum to `total_cents` exactly.
///
/// Each share is within one cent of `total_cents * weight / total_weight`.
/// Repeated keys are merged (their weights summed) before allocating.
pub fn allocate_by_weight<K, I>(total_cents: i64, weights: I) -> Result<Allocation<K>, AllocationError>
where
    K: Clone + PartialEq,
    I: IntoIterator<Item = Weight<K>>,
{
    let mut merged: Vec<(K, i64)> = Vec::new();
    for Weight { key, weight } in weights {
        if weight < 0 {
            return Err(AllocationError::InvalidInput(format!(
                "weight {weight} is negative"
            )));
        }
        match merged.iter_mut().find(|(k, _)| *k == key) {
            Some((_, w)) => {
                *w = w.checked_add(weight).ok_or_else(|| {
                    AllocationError::InvalidInput("total weight overflows".to_string())
                })?
            }
            None => merged.push((key, weight)),
        }
    }

    let total_weight: i128 = merged.iter().map(|(_, w)| i128::from(*w)).sum();
    if total_weight <= 0 {
        return Err(AllocationError::ZeroWeight);
    }

    let total = i128::from(total_cents);
    let parts: Vec<(i128, i128)> = merged
        .iter()
        .map(|(_, w)| {
            let numerator = total * i128::from(*w);
            (
                numerator.div_euclid(total_weight),
                numerator.rem_euclid(total_weight),
            )
        })
        .collect();

    let shares = distribute_residual(total, parts)?;
    Ok(Allocation {
        shares: merged.into_iter().map(|(k, _)| k).zip(shares).collect(),
    })
}

/// Portion of each component's value attributable to `units_to_remove` of
/// `on_hand_units`, summing exactly to `floor(total * units_to_remove / on_hand_units)`.
pub fn remove_proportional_components(
    values_by_component: &BTreeMap<String, i64>,
    units_to_remove: i64,
    on_hand_units: i64,
) -> Result<BTreeMap<String, i64>, AllocationError> {
    if units_to_remove <= 0 {
        return Err(AllocationError::InvalidInput(format!(
            "units to remove must be positive, got {units_to_remove}"
        )));
    }
    if on_hand_units <= 0 {
        return Err(AllocationError::InvalidInput(format!(
            "on-hand units must be positive, got {on_hand_units}"
        )));
    }
    if units_to_remove > on_hand_units {
        return Err(AllocationError::InvalidInput(format!(
            "cannot remove {units_to_remove} units with only {on_hand_units} on hand"
        )));
    }

    let remove = i128::from(units_to_remove);
    let on_hand = i128::from(on_hand_units);
    let total_value: i128 = values_by_component.values().map(|v| i128::from(*v)).sum();
    let target = (total_value * remove).div_euclid(on_hand);

    let parts: Vec<(i128, i128)> = values_by_component
        .values()
        .map(|v| {
            let numerator = i128::from(*v) * remove;
            (numerator.div_euclid(on_hand), numerator.rem_euclid(on_hand))
        })
        .collect();

    let shares = distribute_residual(target, parts)?;
    Ok(values_by_component.keys().cloned().zip(shares).collect())
}

/// Adds the cents lost to flooring back onto the largest remainders.
///
/// `parts` holds `(floor, remainder)` per entry. The residual is always in
/// `[0, parts.len())` because each floor loses strictly less than one cent.
fn distribute_residual(target: i128, parts: Vec<(i128, i128)>) -> Result<Vec<i64>, AllocationError> {
    let floors_sum: i128 = parts.iter().map(|(q, _)| *q).sum();
    let residual = target - floors_sum;
    if residual < 0 || residual > parts.len() as i128 {
        return Err(AllocationError::InvalidInput(format!(
            "residual {residual} out of range for {} entries",
            parts.len()
        )));
    }

    let mut order: Vec<usize> = (0..parts.len()).collect();
    // Stable: equal remainders keep input order.
    order.sort_by(|&a, &b| parts[b].1.cmp(&parts[a].1));

    let mut shares: Vec<i128> = parts.iter().map(|(q, _)| *q).collect();
    for &idx in order.iter().take(residual as usize) {
        shares[idx] += 1;
    }

    shares
        .into_iter()
        .map(|s| {
            i64::try_from(s)
                .map_err(|_| AllocationError::InvalidInput(format!("share {s} overflows cents")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn w(key: &str, weight: i64) -> Weight<String> {
        Weight::new(key.to_string(), weight)
    }

    #[test]
    fn three_way_split_gives_extra_cent_to_first() {
        let alloc = allocate_by_weight(100, vec![w("A", 1), w("B", 1), w("C", 1)]).unwrap();
        assert_eq!(alloc.get(&"A".to_string()), Some(34));
        assert_eq!(alloc.get(&"B".to_string()), Some(33));
        assert_eq!(alloc.get(&"C".to_string()), Some(33));
        assert_eq!(alloc.total(), 100);
    }

    #[test]
    fn largest_remainder_wins_the_residual() {
        // 10 * 1/6 = 1.67, 10 * 2/6 = 3.33, 10 * 3/6 = 5.0
        let alloc = allocate_by_weight(10, vec![w("A", 1), w("B", 2), w("C", 3)]).unwrap();
        assert_eq!(alloc.clone().into_map().get("A"), Some(&2));
        assert_eq!(alloc.clone().into_map().get("B"), Some(&3));
        assert_eq!(alloc.into_map().get("C"), Some(&5));
    }

    #[test]
    fn preserves_input_order() {
        let alloc = allocate_by_weight(7, vec![w("Z", 1), w("A", 1)]).unwrap();
        let keys: Vec<&String> = alloc.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["Z", "A"]);
    }

    #[test]
    fn zero_weight_entries_get_nothing() {
        let alloc = allocate_by_weight(500, vec![w("A", 0), w("B", 5)]).unwrap();
        assert_eq!(alloc.get(&"A".to_string()), Some(0));
        assert_eq!(alloc.get(&"B".to_string()), Some(500));
    }

    #[test]
    fn negative_total_still_sums_exactly() {
        let alloc = allocate_by_weight(-100, vec![w("A", 1), w("B", 1), w("C", 1)]).unwrap();
        assert_eq!(alloc.total(), -100);
        for (_, cents) in alloc.iter() {
            assert!((-34..=-33).contains(&cents));
        }
    }

    #[test]
    fn duplicate_keys_are_merged() {
        let alloc = allocate_by_weight(90, vec![w("A", 1), w("B", 1), w("A", 1)]).unwrap();
        assert_eq!(alloc.len(), 2);
        assert_eq!(alloc.get(&"A".to_string()), Some(60));
        assert_eq!(alloc.get(&"B".to_string()), Some(30));
    }

    #[test]
    fn zero_total_weight_fails() {
        assert_eq!(
            allocate_by_weight(100, vec![w("A", 0), w("B", 0)]),
            Err(AllocationError::ZeroWeight)
        );
        assert_eq!(
            allocate_by_weight::<String, _>(100, Vec::new()),
            Err(AllocationError::ZeroWeight)
        );
    }

    #[test]
    fn negative_weight_fails() {
        assert!(matches!(
            allocate_by_weight(100, vec![w("A", -1), w("B", 3)]),
            Err(AllocationError::InvalidInput(_))
        ));
    }

    #[test]
    fn extreme_values_do_not_overflow() {
        let alloc = allocate_by_weight(i64::MAX, vec![w("A", i64::MAX), w("B", 1)]).unwrap();
        assert_eq!(
            alloc.iter().map(|(_, c)| i128::from(c)).sum::<i128>(),
            i128::from(i64::MAX)
        );
    }

    fn components(values: &[(&str, i64)]) -> BTreeMap<String, i64> {
        values.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn remove_half_of_even_values() {
        let values = components(&[("duty", 200), ("freight", 400), ("manufacturing", 1000)]);
        let removed = remove_proportional_components(&values, 5, 10).unwrap();
        assert_eq!(removed["duty"], 100);
        assert_eq!(removed["freight"], 200);
        assert_eq!(removed["manufacturing"], 500);
    }

    #[test]
    fn remove_hits_floor_of_total() {
        // total 301, 1/3 → floor(100.33) = 100
        let values = components(&[("a", 100), ("b", 100), ("c", 101)]);
        let removed = remove_proportional_components(&values, 1, 3).unwrap();
        assert_eq!(removed.values().sum::<i64>(), 100);
    }

    #[test]
    fn remove_residual_goes_to_largest_remainder() {
        // total 2, remove 1 of 2 → target 1; both floors are 0 with equal remainders
        let values = components(&[("a", 1), ("b", 1)]);
        let removed = remove_proportional_components(&values, 1, 2).unwrap();
        assert_eq!(removed["a"], 1);
        assert_eq!(removed["b"], 0);

        // total 10, remove 1 of 3 → target 3; floors 0 + 2 = 2, "a" has remainder 2
        let values = components(&[("a", 2), ("b", 8)]);
        let removed = remove_proportional_components(&values, 1, 3).unwrap();
        assert_eq!(removed["a"], 1);
        assert_eq!(removed["b"], 2);
    }

    #[test]
    fn remove_all_units_returns_everything() {
        let values = components(&[("freight", 333), ("manufacturing", 12_345)]);
        let removed = remove_proportional_components(&values, 7, 7).unwrap();
        assert_eq!(removed, values);
    }

    #[test]
    fn remove_rejects_bad_unit_counts() {
        let values = components(&[("a", 100)]);
        assert!(remove_proportional_components(&values, 0, 10).is_err());
        assert!(remove_proportional_components(&values, 1, 0).is_err());
        assert!(remove_proportional_components(&values, -1, 10).is_err());
        assert!(remove_proportional_components(&values, 11, 10).is_err());
    }

    #[test]
    fn remove_from_empty_components_is_empty() {
        let removed = remove_proportional_components(&BTreeMap::new(), 1, 2).unwrap();
        assert!(removed.is_empty());
    }
}
