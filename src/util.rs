use nalgebra::{DMatrix, RealField, Scalar};

/// Largest absolute entry, zero for an empty matrix.
pub(crate) fn max_abs<F>(m: &DMatrix<F>) -> F
where
    F: Scalar + Copy + RealField,
{
    m.iter().fold(F::zero(), |acc, x| acc.max(x.abs()))
}

/// Largest absolute entry of `a - b` without materializing the difference.
pub(crate) fn max_abs_diff<F>(a: &DMatrix<F>, b: &DMatrix<F>) -> F
where
    F: Scalar + Copy + RealField,
{
    a.iter()
        .zip(b.iter())
        .fold(F::zero(), |acc, (x, y)| acc.max((*x - *y).abs()))
}

/// Shift all columns one step towards the front, duplicating the last column.
pub(crate) fn shift_columns<F: Scalar + Copy>(m: &mut DMatrix<F>) {
    let n = m.ncols();
    if n < 2 {
        return;
    }
    // Walks column 0 to the back, then overwrite it with its new neighbour
    for i in 0..n - 1 {
        m.swap_columns(i, i + 1);
    }
    for r in 0..m.nrows() {
        m[(r, n - 1)] = m[(r, n - 2)];
    }
}

/// True when every entry is finite.
pub(crate) fn all_finite<'a, F>(mut values: impl Iterator<Item = &'a F>) -> bool
where
    F: Scalar + Copy + RealField,
{
    values.all(|x| x.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::dmatrix;

    #[test]
    fn shift_discards_first_and_duplicates_last() {
        let mut m = dmatrix![1.0, 2.0, 3.0; 10.0, 20.0, 30.0];
        shift_columns(&mut m);
        assert_eq!(m, dmatrix![2.0, 3.0, 3.0; 20.0, 30.0, 30.0]);
    }

    #[test]
    fn max_abs_helpers() {
        let a = dmatrix![1.0, -4.0; 2.0, 0.5];
        let b = dmatrix![1.0, 1.0; 2.5, 0.5];
        assert_eq!(max_abs(&a), 4.0);
        assert_eq!(max_abs_diff(&a, &b), 5.0);
        assert_eq!(max_abs(&DMatrix::<f64>::zeros(0, 0)), 0.0);
    }
}
