/// How to walk a batch when source and destination share one buffer.
///
/// Point `k` reads ordinates `[src_off + k·src_step, … + src_step)` and writes
/// `[dst_off + k·dst_step, … + dst_step)`. An order of iteration is safe if no
/// write ever lands on source ordinates of a point not yet read. When neither
/// order is safe, one of the two spans must be copied to a temporary buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationStrategy {
    /// Iterate from the first point to the last
    Ascending,
    /// Iterate from the last point to the first
    Descending,
    /// Copy the source span to a temporary buffer before transforming
    BufferSource,
    /// Transform into a temporary buffer, then copy to the destination
    BufferTarget,
}

impl IterationStrategy {
    /// Suggest a strategy for transforming `num_pts` points within one buffer.
    pub fn suggest(
        src_off: usize,
        src_step: usize,
        dst_off: usize,
        dst_step: usize,
        num_pts: usize,
    ) -> IterationStrategy {
        if num_pts <= 1 {
            return IterationStrategy::Ascending;
        }
        let s = src_off as i64;
        let d = dst_off as i64;
        let ss = src_step as i64;
        let ds = dst_step as i64;
        let n = num_pts as i64;

        if ascending_is_safe(s, ss, d, ds, n) {
            return IterationStrategy::Ascending;
        }
        // Descending order is ascending order in a mirrored buffer
        if ascending_is_safe(-s - n * ss, ss, -d - n * ds, ds, n) {
            return IterationStrategy::Descending;
        }
        if src_step <= dst_step {
            IterationStrategy::BufferSource
        } else {
            IterationStrategy::BufferTarget
        }
    }
}

// Ascending order is safe iff, for every point k in [0, n-2], the write of
// point k ends before the source of point k+1 starts, or starts after the
// source of the last point ends:
//
//     A(k): d + k·D + D ≤ s + (k+1)·S
//     B(k): d + k·D     ≥ s + n·S
//
// A(k) is linear in k, so we locate the first k where it fails and check B
// there. B(k) is non-decreasing in k, so that single check suffices.
fn ascending_is_safe(s: i64, ss: i64, d: i64, ds: i64, n: i64) -> bool {
    let a0 = d + ds - s - ss;
    let slope = ds - ss;
    let b = |k: i64| d + k * ds - s - n * ss >= 0;

    if slope > 0 {
        let first_failure = if a0 > 0 { 0 } else { -a0 / slope + 1 };
        first_failure > n - 2 || b(first_failure)
    } else {
        a0 <= 0 || b(0)
    }
}

// ----- T E S T S ------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use IterationStrategy::*;

    // Brute force check of an order: simulate reads and writes on a buffer of
    // point labels, and see if every point reads its own source
    fn simulate(s: usize, ss: usize, d: usize, ds: usize, n: usize, descending: bool) -> bool {
        let len = (s + n * ss).max(d + n * ds);
        let mut owner: Vec<Option<usize>> = vec![None; len];
        for k in 0..n {
            for i in 0..ss {
                owner[s + k * ss + i] = Some(k);
            }
        }
        let order: Vec<usize> = if descending {
            (0..n).rev().collect()
        } else {
            (0..n).collect()
        };
        for k in order {
            for i in 0..ss {
                if owner[s + k * ss + i] != Some(k) {
                    return false;
                }
            }
            for i in 0..ds {
                owner[d + k * ds + i] = None;
            }
        }
        true
    }

    #[test]
    fn known_cases() {
        assert_eq!(IterationStrategy::suggest(0, 2, 0, 2, 10), Ascending);
        assert_eq!(IterationStrategy::suggest(4, 2, 0, 2, 10), Ascending);
        assert_eq!(IterationStrategy::suggest(0, 2, 1, 2, 10), Descending);
        assert_eq!(IterationStrategy::suggest(0, 2, 0, 3, 10), Descending);
        assert_eq!(IterationStrategy::suggest(0, 3, 0, 2, 10), Ascending);
        assert_eq!(IterationStrategy::suggest(10, 1, 0, 3, 10), BufferSource);
        assert_eq!(IterationStrategy::suggest(0, 3, 10, 1, 10), BufferTarget);
        assert_eq!(IterationStrategy::suggest(5, 3, 0, 7, 1), Ascending);
        assert_eq!(IterationStrategy::suggest(0, 2, 100, 2, 10), Ascending);
    }

    #[test]
    fn exhaustive() {
        for n in 2..6 {
            for ss in 1..4 {
                for ds in 1..4 {
                    for s in 0..12 {
                        for d in 0..12 {
                            let asc = simulate(s, ss, d, ds, n, false);
                            let desc = simulate(s, ss, d, ds, n, true);
                            match IterationStrategy::suggest(s, ss, d, ds, n) {
                                Ascending => assert!(asc, "{s} {ss} {d} {ds} {n}"),
                                Descending => {
                                    assert!(!asc && desc, "{s} {ss} {d} {ds} {n}")
                                }
                                _ => assert!(!asc && !desc, "{s} {ss} {d} {ds} {n}"),
                            }
                        }
                    }
                }
            }
        }
    }
}
