//! Binary matrix dumps for the validation-dump mode.
//!
//! The file format is a header of five little-endian 32-bit integers
//! `{type code, rows, cols, element size, 0}` followed by the elements in
//! column major order. The type code identifies the scalar kind (see
//! [`HScalar::TYPE_CODE`]).

use crate::full_matrix::FullMatrix;
use crate::types::{HScalar, HmatrixError, Result};
use ndarray::Axis;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

pub fn write_matrix<A: HScalar, P: AsRef<Path>>(m: &FullMatrix<A>, path: P) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    let header = [
        A::TYPE_CODE,
        m.nrows() as i32,
        m.ncols() as i32,
        std::mem::size_of::<A>() as i32,
        0,
    ];
    for value in header.iter() {
        writer.write_all(&value.to_le_bytes())?;
    }
    for col in m.data.axis_iter(Axis(1)) {
        for &item in col.iter() {
            item.write_le(&mut writer)?;
        }
    }
    writer.flush()?;
    Ok(())
}

pub fn read_matrix<A: HScalar, P: AsRef<Path>>(path: P) -> Result<FullMatrix<A>> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut header = [0i32; 5];
    for value in header.iter_mut() {
        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf)?;
        *value = i32::from_le_bytes(buf);
    }
    if header[0] != A::TYPE_CODE {
        return Err(HmatrixError::DumpTypeMismatch {
            found: header[0],
            expected: A::TYPE_CODE,
        });
    }
    let element_size = std::mem::size_of::<A>() as i32;
    if header[3] != element_size {
        return Err(HmatrixError::DumpSizeMismatch {
            found: header[3],
            expected: element_size,
        });
    }

    let rows = header[1] as usize;
    let cols = header[2] as usize;
    let mut result = FullMatrix::<A>::zeros(rows, cols);
    for col in 0..cols {
        for row in 0..rows {
            result.data[[row, col]] = A::read_le(&mut reader)?;
        }
    }
    Ok(result)
}
