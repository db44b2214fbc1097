// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

pub mod stream;

use crate::*;

pub fn usize_from_u32(value: u32) -> AnimResult<usize> {
    usize::try_from(value).or(Err(AnimError::ContainerParseFailed("value out of range".into())))
}

pub fn u32_from_usize(value: usize) -> AnimResult<u32> {
    u32::try_from(value).or(Err(AnimError::ContainerParseFailed("value out of range".into())))
}

macro_rules! checked_add {
    ($a:expr, $b:expr) => {
        $a.checked_add($b)
            .ok_or(AnimError::ContainerParseFailed("arithmetic overflow".into()))
    };
}

macro_rules! checked_sub {
    ($a:expr, $b:expr) => {
        $a.checked_sub($b)
            .ok_or(AnimError::ContainerParseFailed("arithmetic overflow".into()))
    };
}

macro_rules! checked_mul {
    ($a:expr, $b:expr) => {
        $a.checked_mul($b)
            .ok_or(AnimError::ContainerParseFailed("arithmetic overflow".into()))
    };
}

macro_rules! checked_incr {
    ($a:expr, $b:expr) => {
        $a = checked_add!($a, $b)?
    };
}

pub(crate) use checked_add;
pub(crate) use checked_incr;
pub(crate) use checked_mul;
pub(crate) use checked_sub;

/// Allocates a Vec with exactly the requested capacity, reporting allocation
/// failure instead of aborting.
pub fn create_vec_exact<T>(size: usize) -> AnimResult<Vec<T>> {
    let mut vec = Vec::new();
    vec.try_reserve_exact(size).or(Err(AnimError::OutOfMemory))?;
    Ok(vec)
}

pub fn check_limits(width: u32, height: u32, size_limit: u32, dimension_limit: u32) -> bool {
    if height == 0 {
        return false;
    }
    if width > size_limit / height {
        return false;
    }
    if dimension_limit != 0 && (width > dimension_limit || height > dimension_limit) {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits() {
        assert!(check_limits(100, 100, 16384 * 16384, 16384));
        assert!(!check_limits(100, 0, 16384 * 16384, 16384));
        assert!(!check_limits(16385, 2, 16384 * 16384, 16384));
        assert!(!check_limits(u32::MAX, u32::MAX, 16384 * 16384, 0));
    }

    #[test]
    fn checked_macros() {
        fn add(a: u32, b: u32) -> AnimResult<u32> {
            checked_add!(a, b)
        }
        assert_eq!(add(1, 2), Ok(3));
        assert!(add(u32::MAX, 1).is_err());
    }
}
