//! Non-copying reshaping of flat sequences
//!
//! `fold(items, width)` splits `N` items into `width` contiguous rows of
//! `N / width` items each. Rows borrow the original storage, so writes through
//! a folded view are writes to the flat buffer.
//!
//! Folds compose. A buffer of `w × h × d` elements becomes a `[w][h][d]` cube
//! by folding into `w × h` rows and then folding the rows by `w`:
//!
//! ```rust
//! use gridlane_core::fold;
//!
//! let flat: Vec<u32> = (0..24).collect();
//! let rows = fold(&flat, 2 * 3).unwrap();
//! let cube = fold(&rows, 2).unwrap();
//! assert_eq!(cube[1][2][3], 23);
//! ```

/// Split `items` into `width` equal rows.
///
/// Returns `None` when `items` is empty, `width < 1`, or `width` does not
/// divide `items.len()`.
pub fn fold<T>(items: &[T], width: i64) -> Option<Vec<&[T]>> {
    let height = row_len(items.len(), width)?;
    Some(items.chunks_exact(height).collect())
}

/// Mutable variant of [`fold`].
pub fn fold_mut<T>(items: &mut [T], width: i64) -> Option<Vec<&mut [T]>> {
    let height = row_len(items.len(), width)?;
    Some(items.chunks_exact_mut(height).collect())
}

fn row_len(len: usize, width: i64) -> Option<usize> {
    if len == 0 || width < 1 {
        return None;
    }
    let width = usize::try_from(width).ok()?;
    (len % width == 0).then(|| len / width)
}
