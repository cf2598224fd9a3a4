// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Fixed-width big-endian integer codec.
//!
//! Every integer the queue writes to disk (record length prefixes, index
//! entries) goes through these helpers so the byte order is defined in one
//! place. Decoding only looks at the leading bytes of the input; a buffer
//! shorter than the integer width is an [`Encoding`](QueueError::Encoding)
//! error rather than a panic.

use snafu::ensure;

use crate::{Result, error::EncodingSnafu};

/// Width of an encoded `i64`.
pub const I64_SIZE: usize = 8;

/// Width of an encoded `i32`.
pub const I32_SIZE: usize = 4;

#[inline]
#[must_use]
pub const fn encode_i64(value: i64) -> [u8; I64_SIZE] { value.to_be_bytes() }

#[inline]
#[must_use]
pub const fn encode_i32(value: i32) -> [u8; I32_SIZE] { value.to_be_bytes() }

/// Decodes the first 8 bytes of `buf` as a big-endian `i64`.
#[inline]
pub fn decode_i64(buf: &[u8]) -> Result<i64> {
    let bytes = leading::<I64_SIZE>(buf)?;
    Ok(i64::from_be_bytes(bytes))
}

/// Decodes the first 4 bytes of `buf` as a big-endian `i32`.
#[inline]
pub fn decode_i32(buf: &[u8]) -> Result<i32> {
    let bytes = leading::<I32_SIZE>(buf)?;
    Ok(i32::from_be_bytes(bytes))
}

/// Writes `value` into the first 8 bytes of `buf`.
#[inline]
pub fn put_i64(buf: &mut [u8], value: i64) -> Result<()> {
    ensure!(
        buf.len() >= I64_SIZE,
        EncodingSnafu {
            expected: I64_SIZE,
            actual:   buf.len(),
        }
    );
    buf[..I64_SIZE].copy_from_slice(&encode_i64(value));
    Ok(())
}

/// Writes `value` into the first 4 bytes of `buf`.
#[inline]
pub fn put_i32(buf: &mut [u8], value: i32) -> Result<()> {
    ensure!(
        buf.len() >= I32_SIZE,
        EncodingSnafu {
            expected: I32_SIZE,
            actual:   buf.len(),
        }
    );
    buf[..I32_SIZE].copy_from_slice(&encode_i32(value));
    Ok(())
}

fn leading<const N: usize>(buf: &[u8]) -> Result<[u8; N]> {
    ensure!(
        buf.len() >= N,
        EncodingSnafu {
            expected: N,
            actual:   buf.len(),
        }
    );
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[..N]);
    Ok(out)
}
