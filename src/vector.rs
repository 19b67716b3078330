//! Vector operations used by the pivoting searches of the compression
//! engine, defined as a trait on 1-d `ndarray` arrays.

use crate::types::HScalar;
use ndarray::{ArrayBase, Data, Ix1};

pub trait VectorOps {
    type A: HScalar;

    /// Conjugated dot product `sum conj(x_i) * y_i`.
    ///
    /// The conjugate is taken of `self`, i.e. the left argument. The
    /// running norm estimate of the cross approximation loops relies on
    /// this convention; swapping the arguments silently flips signs for
    /// complex scalars.
    fn conj_dot<S2: Data<Elem = Self::A>>(&self, other: &ArrayBase<S2, Ix1>) -> Self::A;

    /// Index of the element with the largest modulus (first on ties).
    fn absolute_max_index(&self) -> usize;

    /// Squared l2 norm as f64.
    fn norm_sqr_f64(&self) -> f64;

    /// True iff the largest modulus element is exactly zero.
    fn is_zero(&self) -> bool;
}

impl<A, S> VectorOps for ArrayBase<S, Ix1>
where
    A: HScalar,
    S: Data<Elem = A>,
{
    type A = A;

    fn conj_dot<S2: Data<Elem = A>>(&self, other: &ArrayBase<S2, Ix1>) -> A {
        assert_eq!(self.len(), other.len());
        self.iter()
            .zip(other.iter())
            .fold(A::zero(), |acc, (&x, &y)| acc + x.conj() * y)
    }

    fn absolute_max_index(&self) -> usize {
        let mut index = 0;
        let mut max_norm = 0.0;
        for (i, &item) in self.iter().enumerate() {
            let norm = item.squared_norm();
            if norm > max_norm {
                max_norm = norm;
                index = i;
            }
        }
        index
    }

    fn norm_sqr_f64(&self) -> f64 {
        self.iter().map(|&item| item.squared_norm()).sum()
    }

    fn is_zero(&self) -> bool {
        if self.is_empty() {
            return true;
        }
        self[self.absolute_max_index()] == A::zero()
    }
}
