use std::ops::Range;

use itertools::{EitherOrBoth, Itertools};

/// Contiguous slice of `num_items` assigned to `thread_id`. Sizes differ by at most one.
pub fn get_partition_range(num_threads: usize, thread_id: usize, num_items: usize) -> Range<usize> {
    let min_partition_size = num_items / num_threads;
    let remainder = num_items % num_threads;

    if thread_id < remainder {
        let partition_size = min_partition_size + 1;
        let start = partition_size * thread_id;
        let end = start + partition_size;
        Range { start, end }
    } else {
        let start =
            (min_partition_size + 1) * remainder + min_partition_size * (thread_id - remainder);
        let end = start + min_partition_size;
        Range { start, end }
    }
}

/// Merges two ascending id lists into (only in left, only in right).
pub fn sorted_difference(left: &[usize], right: &[usize]) -> (Vec<usize>, Vec<usize>) {
    let mut only_left = Vec::new();
    let mut only_right = Vec::new();

    for item in left.iter().merge_join_by(right.iter(), |l, r| l.cmp(r)) {
        match item {
            EitherOrBoth::Left(nid) => only_left.push(*nid),
            EitherOrBoth::Right(nid) => only_right.push(*nid),
            EitherOrBoth::Both(_, _) => {}
        }
    }

    (only_left, only_right)
}
