/// Locates the rightmost debt whose current amount does not exceed `target`
/// on an ascending-by-key slice.
///
/// - If some element's key equals `target` exactly, returns the rightmost
///   such index.
/// - Otherwise returns the index of the largest element with key strictly
///   less than `target` (the insertion point minus one), clamped to `0` when
///   `target` is smaller than every element.
/// - Returns `-1` on an empty slice.
/// - Skip-zero rule: if the chosen index's key is zero and a next index
///   exists, that next index is returned instead — fully paid-off debts
///   cluster at the front of the list and must never be picked as an offset
///   target.
pub(super) fn find_rightmost_index<T>(
    target: i64,
    sorted: &[T],
    key_of: impl Fn(&T) -> i64,
) -> i64 {
    if sorted.is_empty() {
        return -1;
    }
    let upper = sorted.partition_point(|item| key_of(item) <= target);
    let idx: i64 = if upper == 0 { 0 } else { (upper - 1) as i64 };
    skip_zero(idx, sorted, &key_of)
}

fn skip_zero<T>(idx: i64, sorted: &[T], key_of: &impl Fn(&T) -> i64) -> i64 {
    if idx < 0 {
        return idx;
    }
    let i = idx as usize;
    if key_of(&sorted[i]) == 0 && i + 1 < sorted.len() {
        (i + 1) as i64
    } else {
        idx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idx(v: &i64) -> i64 {
        *v
    }

    #[test]
    fn empty_slice_returns_negative_one() {
        let data: Vec<i64> = vec![];
        assert_eq!(find_rightmost_index(5, &data, idx), -1);
    }

    #[test]
    fn exact_match_returns_rightmost_occurrence() {
        let data = vec![1, 3, 3, 3, 7];
        assert_eq!(find_rightmost_index(3, &data, idx), 3);
    }

    #[test]
    fn no_match_returns_insertion_point_minus_one() {
        let data = vec![1, 3, 8];
        assert_eq!(find_rightmost_index(5, &data, idx), 1);
    }

    #[test]
    fn target_smaller_than_all_clamps_to_zero() {
        let data = vec![5, 8, 9];
        assert_eq!(find_rightmost_index(1, &data, idx), 0);
    }

    #[test]
    fn target_larger_than_all_returns_last_index() {
        let data = vec![1, 2, 3];
        assert_eq!(find_rightmost_index(100, &data, idx), 2);
    }

    #[test]
    fn skip_zero_rule_advances_past_a_zero_with_a_successor() {
        let data = vec![0, 0, 4, 9];
        // target 0 matches exactly, rightmost zero is index 1, but a
        // successor exists so we advance to index 2.
        assert_eq!(find_rightmost_index(0, &data, idx), 2);
    }

    #[test]
    fn skip_zero_rule_has_no_effect_without_a_successor() {
        let data = vec![0];
        assert_eq!(find_rightmost_index(5, &data, idx), 0);
    }
}
