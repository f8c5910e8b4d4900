//! Cyclic Latin-square construction
//!
//! `square[i][j] = ((i + j) mod n) + 1`: every row and every column is a
//! permutation of `1..=n`, and each row is the previous one rotated left by
//! one. The rotation is what balances presentation order across evaluator
//! positions; there is no randomness here.

/// An `n x n` Latin square with values in `1..=n`
pub type LatinSquare = Vec<Vec<usize>>;

/// Generate the cyclic Latin square of order `n` (empty for `n == 0`)
pub fn generate(n: usize) -> LatinSquare {
    (0..n)
        .map(|i| (0..n).map(|j| (i + j) % n + 1).collect())
        .collect()
}
