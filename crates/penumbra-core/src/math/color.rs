// Copyright 2025 eraflo
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

//! Defines the `LinearRgba` color type used for light colours.

use crate::math::vector::Vec3;
use serde::{Deserialize, Serialize};
use std::ops::Mul;

/// Represents a color in a **linear RGBA** color space using `f32` components.
///
/// Components may exceed `1.0` for HDR light colours.
#[derive(
    Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable, Serialize, Deserialize,
)]
#[repr(C)]
pub struct LinearRgba {
    /// The red component in linear space.
    pub r: f32,
    /// The green component in linear space.
    pub g: f32,
    /// The blue component in linear space.
    pub b: f32,
    /// The alpha component.
    pub a: f32,
}

impl LinearRgba {
    /// Opaque white (`[1.0, 1.0, 1.0, 1.0]`).
    pub const WHITE: Self = Self::rgb(1.0, 1.0, 1.0);
    /// Opaque black (`[0.0, 0.0, 0.0, 1.0]`).
    pub const BLACK: Self = Self::rgb(0.0, 0.0, 0.0);

    /// Creates a new `LinearRgba` with explicit RGBA values.
    #[inline]
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Creates a new opaque `LinearRgba` (alpha = 1.0).
    #[inline]
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    /// Relative luminance of the colour (Rec. 709 weights).
    #[inline]
    pub fn luminance(&self) -> f32 {
        0.2126 * self.r + 0.7152 * self.g + 0.0722 * self.b
    }

    /// Returns the colour scaled so its luminance is `1.0`.
    ///
    /// Black (zero luminance) is returned unchanged.
    pub fn normalized_luminance(&self) -> Self {
        let lum = self.luminance();
        if lum <= 0.0 {
            return *self;
        }
        Self::new(self.r / lum, self.g / lum, self.b / lum, self.a)
    }

    /// Approximates the linear sRGB colour of a black-body radiator.
    ///
    /// `kelvin` is clamped to the `[1000, 25000]` range the approximation covers.
    pub fn from_temperature(kelvin: f32) -> Self {
        let t = kelvin.clamp(1000.0, 25000.0);
        let mm = 1000.0 / t;
        let mm2 = mm * mm;
        let mm3 = mm2 * mm;

        // Planckian locus in CIE xy.
        let x = if t < 4000.0 {
            -0.2661239 * mm3 - 0.2343580 * mm2 + 0.8776956 * mm + 0.179910
        } else {
            -3.0258469 * mm3 + 2.1070379 * mm2 + 0.2226347 * mm + 0.240390
        };
        let x2 = x * x;
        let x3 = x2 * x;
        let y = if t < 2222.0 {
            -1.1063814 * x3 - 1.34811020 * x2 + 2.18555832 * x - 0.20219683
        } else if t < 4000.0 {
            -0.9549476 * x3 - 1.37418593 * x2 + 2.09137015 * x - 0.16748867
        } else {
            3.0817580 * x3 - 5.87338670 * x2 + 3.75112997 * x - 0.37001483
        };

        // xyY -> XYZ with Y = 1, then XYZ -> linear sRGB.
        let (cx, cy, cz) = (x / y, 1.0, (1.0 - x - y) / y);
        Self::rgb(
            3.2406 * cx - 1.5372 * cy - 0.4986 * cz,
            -0.9689 * cx + 1.8758 * cy + 0.0415 * cz,
            0.0557 * cx - 0.2050 * cy + 1.0570 * cz,
        )
    }

    /// Returns the RGB part as a `Vec3`.
    #[inline]
    pub fn to_vec3(&self) -> Vec3 {
        Vec3::new(self.r, self.g, self.b)
    }
}

impl Default for LinearRgba {
    fn default() -> Self {
        Self::WHITE
    }
}

impl Mul<f32> for LinearRgba {
    type Output = Self;
    /// Scales the RGB channels, leaving alpha untouched.
    #[inline]
    fn mul(self, rhs: f32) -> Self::Output {
        Self::new(self.r * rhs, self.g * rhs, self.b * rhs, self.a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::approx_eq_eps;

    #[test]
    fn test_normalized_luminance_is_one() {
        let c = LinearRgba::rgb(0.5, 0.2, 0.9).normalized_luminance();
        assert!(approx_eq_eps(c.luminance(), 1.0, 1e-4));
    }

    #[test]
    fn test_black_normalization_is_noop() {
        assert_eq!(LinearRgba::BLACK.normalized_luminance(), LinearRgba::BLACK);
    }

    #[test]
    fn test_temperature_warm_vs_cool() {
        let warm = LinearRgba::from_temperature(2000.0);
        let cool = LinearRgba::from_temperature(10000.0);
        assert!(warm.r > warm.b, "low temperatures should be reddish");
        assert!(cool.b > cool.r, "high temperatures should be bluish");
    }

    #[test]
    fn test_daylight_is_near_white() {
        let d65 = LinearRgba::from_temperature(6504.0).normalized_luminance();
        assert!(approx_eq_eps(d65.r, 1.0, 0.1));
        assert!(approx_eq_eps(d65.g, 1.0, 0.1));
        assert!(approx_eq_eps(d65.b, 1.0, 0.1));
    }

    #[test]
    fn test_scale_keeps_alpha() {
        let c = LinearRgba::new(1.0, 0.5, 0.25, 0.5) * 2.0;
        assert_eq!(c, LinearRgba::new(2.0, 1.0, 0.5, 0.5));
    }
}
