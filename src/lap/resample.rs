// Index-uniform downsampling and explicit loop closing

/// Pick `target` evenly spaced elements, at indices `floor(i * len / target)`.
///
/// This is uniform in sample index, not in arc length: where the vehicle slowed
/// down the kept points sit closer together. Inputs no longer than `target` are
/// returned unchanged.
pub fn downsample<T: Copy>(points: &[T], target: usize) -> Vec<T> {
    let len = points.len();
    if target == 0 || len <= target {
        return points.to_vec();
    }
    (0..target).map(|i| points[i * len / target]).collect()
}

/// Append the first point when the sequence does not already end on it
pub fn close_loop<T: Copy + PartialEq>(points: &mut Vec<T>) {
    if let (Some(&first), Some(last)) = (points.first(), points.last()) {
        if *last != first {
            points.push(first);
        }
    }
}
