//! Binary morphology along the time axis of a boolean chroma mask.
//!
//! The structuring element is a horizontal run of three pixels, so rows never
//! interact: every operation here is the same 1D operation applied per row.

use ndarray::{Array2, Zip};

/// Erodes every row with a 3-tap horizontal structuring element.
///
/// Pixels beyond the matrix edges count as inactive, so the first and last
/// pixel of a run touching an edge are removed as well.
pub fn erode_rows(active: &Array2<bool>) -> Array2<bool> {
    let n_cols = active.ncols();
    Array2::from_shape_fn(active.dim(), |(r, c)| {
        active[[r, c]] && c > 0 && active[[r, c - 1]] && c + 1 < n_cols && active[[r, c + 1]]
    })
}

/// Marks the first and last pixel of every horizontal run.
///
/// A run of length one has a single boundary pixel.
pub fn run_boundaries(active: &Array2<bool>) -> Array2<bool> {
    let eroded = erode_rows(active);
    let mut boundary = active.clone();
    Zip::from(&mut boundary)
        .and(&eroded)
        .for_each(|b, &e| *b ^= e);
    boundary
}

/// Labels horizontal runs of active pixels.
///
/// Labels start at 1 and increase in row-major order; 0 marks background.
/// Runs on different rows always get different labels.
///
/// # Returns
/// * `(labels, count)` - label matrix and number of runs found
pub fn label_rows(active: &Array2<bool>) -> (Array2<usize>, usize) {
    let mut labels = Array2::<usize>::zeros(active.dim());
    let mut count = 0;
    for (r, row) in active.outer_iter().enumerate() {
        let mut previous = false;
        for (c, &on) in row.iter().enumerate() {
            if on {
                if !previous {
                    count += 1;
                }
                labels[[r, c]] = count;
            }
            previous = on;
        }
    }
    (labels, count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn erosion_removes_run_ends() {
        let active = array![[true, true, true, false, true], [false, true, true, true, true]];
        let eroded = erode_rows(&active);
        assert_eq!(
            eroded,
            array![[false, true, false, false, false], [false, false, true, true, false]]
        );
    }

    #[test]
    fn boundaries_of_runs() {
        let active = array![[true, true, true, false, true, false, true, true]];
        let boundary = run_boundaries(&active);
        assert_eq!(
            boundary,
            array![[true, false, true, false, true, false, true, true]]
        );
    }

    #[test]
    fn labels_never_cross_rows() {
        let active = array![[false, true, true, false, true], [true, true, false, false, true]];
        let (labels, count) = label_rows(&active);
        assert_eq!(count, 4);
        let expected: Array2<usize> = array![[0, 1, 1, 0, 2], [3, 3, 0, 0, 4]];
        assert_eq!(labels, expected);
    }

    #[test]
    fn empty_mask_has_no_labels() {
        let active = Array2::from_elem((12, 6), false);
        let (_, count) = label_rows(&active);
        assert_eq!(count, 0);
        assert!(run_boundaries(&active).iter().all(|&b| !b));
    }
}
