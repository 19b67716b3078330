//! Scalar types and the crate wide error definitions.
//!
//! The compression kernels are instantiated for the four scalar kinds
//! f32, f64, c32 and c64. Each input type is associated with a higher
//! precision accumulator type `Dp` in which rows, columns and low-rank
//! factors are produced (single precision kernels accumulate in double
//! precision, double precision kernels accumulate in place).

use ndarray_linalg::error::LinalgError;
use std::io::{Read, Write};
use thiserror::Error;

pub use ndarray_linalg::{c32, c64, Lapack, Scalar};

#[derive(Error, Debug)]
pub enum HmatrixError {
    #[error("LAPACK routine {routine} failed with info = {info}")]
    Lapack { routine: &'static str, info: i32 },
    #[error(transparent)]
    Linalg(#[from] LinalgError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("matrix dump has scalar code {found}, expected {expected}")]
    DumpTypeMismatch { found: i32, expected: i32 },
    #[error("matrix dump declares element size {found}, expected {expected}")]
    DumpSizeMismatch { found: i32, expected: i32 },
}

pub type Result<T> = std::result::Result<T, HmatrixError>;

/// Convert a `lax` failure into an error naming the LAPACK routine.
pub(crate) fn lapack_failure(routine: &'static str, err: lax::error::Error) -> HmatrixError {
    let info = match err {
        lax::error::Error::LapackComputationalFailure { return_code }
        | lax::error::Error::LapackInvalidValue { return_code } => return_code,
        _ => 0,
    };
    HmatrixError::Lapack { routine, info }
}

/// The scalar kinds understood by the compression engine.
///
/// Everything the engine needs beyond [`Scalar`] + [`Lapack`] lives here:
/// the accumulator type, modulus computations carried out in f64 as the
/// pivoting searches require, and the little-endian element codec used by
/// the matrix dump format.
pub trait HScalar: Scalar + Lapack {
    /// The accumulator type used when sampling kernel rows and columns.
    type Dp: HScalar;

    /// Scalar type code stored in dump file headers.
    const TYPE_CODE: i32;

    fn upcast(self) -> Self::Dp;

    /// `|x|^2` as f64, for all four scalar kinds.
    fn squared_norm(self) -> f64;

    /// Real part as f64.
    fn real_f64(self) -> f64;

    fn is_nan(self) -> bool;

    fn write_le<W: Write>(self, w: &mut W) -> std::io::Result<()>;

    fn read_le<R: Read>(r: &mut R) -> std::io::Result<Self>;
}

macro_rules! hscalar_real_impl {
    ($scalar:ty, $dp:ty, $code:expr) => {
        impl HScalar for $scalar {
            type Dp = $dp;

            const TYPE_CODE: i32 = $code;

            fn upcast(self) -> Self::Dp {
                self as $dp
            }

            fn squared_norm(self) -> f64 {
                let x = self as f64;
                x * x
            }

            fn real_f64(self) -> f64 {
                self as f64
            }

            fn is_nan(self) -> bool {
                <$scalar>::is_nan(self)
            }

            fn write_le<W: Write>(self, w: &mut W) -> std::io::Result<()> {
                w.write_all(&self.to_le_bytes())
            }

            fn read_le<R: Read>(r: &mut R) -> std::io::Result<Self> {
                let mut buf = [0u8; std::mem::size_of::<$scalar>()];
                r.read_exact(&mut buf)?;
                Ok(<$scalar>::from_le_bytes(buf))
            }
        }
    };
}

macro_rules! hscalar_complex_impl {
    ($scalar:ty, $real:ty, $dp:ty, $code:expr) => {
        impl HScalar for $scalar {
            type Dp = $dp;

            const TYPE_CODE: i32 = $code;

            fn upcast(self) -> Self::Dp {
                <$dp>::new(self.re as f64, self.im as f64)
            }

            fn squared_norm(self) -> f64 {
                let re = self.re as f64;
                let im = self.im as f64;
                re * re + im * im
            }

            fn real_f64(self) -> f64 {
                self.re as f64
            }

            fn is_nan(self) -> bool {
                self.re.is_nan() || self.im.is_nan()
            }

            fn write_le<W: Write>(self, w: &mut W) -> std::io::Result<()> {
                w.write_all(&self.re.to_le_bytes())?;
                w.write_all(&self.im.to_le_bytes())
            }

            fn read_le<R: Read>(r: &mut R) -> std::io::Result<Self> {
                let mut buf = [0u8; std::mem::size_of::<$real>()];
                r.read_exact(&mut buf)?;
                let re = <$real>::from_le_bytes(buf);
                r.read_exact(&mut buf)?;
                let im = <$real>::from_le_bytes(buf);
                Ok(<$scalar>::new(re, im))
            }
        }
    };
}

hscalar_real_impl!(f32, f64, 0);
hscalar_real_impl!(f64, f64, 1);
hscalar_complex_impl!(c32, f32, c64, 2);
hscalar_complex_impl!(c64, f64, c64, 3);
