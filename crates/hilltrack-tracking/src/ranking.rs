//! Top-k selection over score vectors.

use std::cmp::Ordering;

/// Indices of the `k` highest scores, best first.
///
/// Equal scores keep their original order, so the earliest index wins a tie.
pub fn top_k_indices(scores: &[f32], k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| match scores[b].total_cmp(&scores[a]) {
        Ordering::Equal => a.cmp(&b),
        other => other,
    });
    order.truncate(k);
    order
}

/// Index of the highest score; the first one on ties.
pub fn arg_max(scores: &[f32]) -> Option<usize> {
    top_k_indices(scores, 1).first().copied()
}

/// Mean of the scores at `indices`, or negative infinity when empty.
pub fn mean_at(scores: &[f32], indices: &[usize]) -> f32 {
    if indices.is_empty() {
        return f32::NEG_INFINITY;
    }
    indices.iter().map(|&i| scores[i]).sum::<f32>() / indices.len() as f32
}

/// Top-`k` indices of `scores` and their mean score.
pub fn top_k_mean(scores: &[f32], k: usize) -> (Vec<usize>, f32) {
    let idx = top_k_indices(scores, k);
    let mean = mean_at(scores, &idx);
    (idx, mean)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_k_order() {
        let s = [0.1, 3.0, -2.0, 3.0, 1.5];
        assert_eq!(top_k_indices(&s, 3), vec![1, 3, 4]);
        assert_eq!(top_k_indices(&s, 10).len(), 5);
    }

    #[test]
    fn test_arg_max_first_on_tie() {
        assert_eq!(arg_max(&[2.0, 5.0, 5.0]), Some(1));
        assert_eq!(arg_max(&[]), None);
    }

    #[test]
    fn test_top_k_mean() {
        let (idx, mean) = top_k_mean(&[1.0, 2.0, 3.0, 4.0], 2);
        assert_eq!(idx, vec![3, 2]);
        assert!((mean - 3.5).abs() < 1e-6);
        assert_eq!(top_k_mean(&[], 5).1, f32::NEG_INFINITY);
    }
}
