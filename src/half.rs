
//! Conversion between 32 bit and 16 bit floating point numbers.
//!
//! The bit patterns produced here are part of the file format:
//! ties round away from zero, every 32 bit NaN collapses to the
//! quiet NaN `0xFE00`, and 32 bit subnormals flush to signed zero.
//! The `half` crate rounds ties to even instead, so the explicit
//! algorithm lives here and the crate type is only used as storage.

use ::half::f16;

/// Quiet NaN with only the first mantissa bit set.
const HALF_NAN: u16 = 0xFE00;

/// Quiet NaN with only the first mantissa bit set.
const SINGLE_NAN: u32 = 0xFFC0_0000;


/// Convert a 32 bit float to the closest 16 bit float bit pattern.
///
/// Subnormal inputs become signed zero, infinities stay infinite,
/// and all NaN payloads collapse to one quiet NaN without sign.
/// Values of large magnitude overflow to signed infinity.
pub fn f32_to_f16_bits(value: f32) -> u16 {
    let bits = value.to_bits();

    if bits & 0x7FFF_FFFF == 0 {
        return (bits >> 16) as u16; // preserve the sign of zero
    }

    let sign = ((bits >> 16) & 0x8000) as u16;
    let exponent = bits & 0x7F80_0000;
    let mut mantissa = bits & 0x007F_FFFF;

    if exponent == 0 {
        // subnormal single precision, smaller than any half can express
        return sign;
    }

    if exponent == 0x7F80_0000 {
        if mantissa == 0 { return sign | 0x7C00 }
        return HALF_NAN;
    }

    // unbias the single exponent, then bias for half precision
    let half_exponent = (exponent >> 23) as i32 - 127 + 15;

    if half_exponent >= 0x1F {
        return sign | 0x7C00; // overflow to signed infinity
    }

    if half_exponent <= 0 {
        let shift = (14 - half_exponent) as u32;
        if shift > 24 {
            return sign; // shifted all the way out, not even rounding remains
        }

        mantissa |= 0x0080_0000; // make the hidden leading bit explicit
        let mut half_mantissa = (mantissa >> shift) as u16;

        if (mantissa >> (shift - 1)) & 1 != 0 {
            half_mantissa += 1; // round half away from zero, may carry into the exponent bits
        }

        return sign | half_mantissa; // biased exponent of a subnormal is zero
    }

    let half_exponent = (half_exponent as u16) << 10;
    let half_mantissa = (mantissa >> 13) as u16;

    if mantissa & 0x0000_1000 != 0 {
        // round half away from zero, may overflow into infinity
        (sign | half_exponent | half_mantissa) + 1
    }
    else {
        sign | half_exponent | half_mantissa
    }
}

/// Convert a 16 bit float bit pattern to the 32 bit float with the same value.
/// Exact except for NaN, where all payloads collapse to one quiet NaN without sign.
pub fn f16_bits_to_f32(half: u16) -> f32 {
    if half & 0x7FFF == 0 {
        return f32::from_bits((half as u32) << 16); // preserve the sign of zero
    }

    let sign = ((half & 0x8000) as u32) << 16;
    let exponent = half & 0x7C00;
    let mut mantissa = half & 0x03FF;

    let bits = if exponent == 0 {
        // subnormal half, renormalize by shifting
        // until the leading bit falls into the exponent
        let mut shifts = 0_i32;
        mantissa <<= 1;

        while mantissa & 0x0400 == 0 {
            shifts += 1;
            mantissa <<= 1;
        }

        let single_exponent = (-15 + 127 - shifts) as u32;
        sign | (single_exponent << 23) | (((mantissa & 0x03FF) as u32) << 13)
    }
    else if exponent == 0x7C00 {
        if mantissa == 0 { sign | 0x7F80_0000 }
        else { SINGLE_NAN }
    }
    else {
        // rebias in signed math, the result only turns
        // positive after adding the single precision bias
        let single_exponent = ((exponent >> 10) as i32 - 15 + 127) as u32;
        sign | (single_exponent << 23) | ((mantissa as u32) << 13)
    };

    f32::from_bits(bits)
}

/// Convert to the half type used for pixel storage.
#[inline]
pub fn to_f16(value: f32) -> f16 {
    f16::from_bits(f32_to_f16_bits(value))
}

/// Convert a stored half back to full precision.
#[inline]
pub fn to_f32(value: f16) -> f32 {
    f16_bits_to_f32(value.to_bits())
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn simple_values(){
        assert_eq!(f32_to_f16_bits(0.0), 0x0000);
        assert_eq!(f32_to_f16_bits(-0.0), 0x8000);
        assert_eq!(f32_to_f16_bits(1.0), 0x3C00);
        assert_eq!(f32_to_f16_bits(-1.0), 0xBC00);
        assert_eq!(f32_to_f16_bits(0.5), 0x3800);
        assert_eq!(f32_to_f16_bits(2.0), 0x4000);
        assert_eq!(f32_to_f16_bits(65504.0), 0x7BFF); // largest finite half

        assert_eq!(f16_bits_to_f32(0x3C00), 1.0);
        assert_eq!(f16_bits_to_f32(0xBC00), -1.0);
        assert_eq!(f16_bits_to_f32(0x3800), 0.5);
        assert_eq!(f16_bits_to_f32(0x7BFF), 65504.0);
    }

    #[test]
    fn normals_below_one_decode(){
        // every biased exponent below the half bias of 15
        for biased_exponent in 1_u16 ..= 14 {
            let bits = biased_exponent << 10;
            let expected = (2.0_f32).powi(biased_exponent as i32 - 15);
            assert_eq!(f16_bits_to_f32(bits), expected, "exponent {}", biased_exponent);
        }

        assert_eq!(f16_bits_to_f32(0x0400), 0.00006103515625); // smallest normal half
    }

    #[test]
    fn specials(){
        assert_eq!(f32_to_f16_bits(f32::INFINITY), 0x7C00);
        assert_eq!(f32_to_f16_bits(f32::NEG_INFINITY), 0xFC00);
        assert_eq!(f32_to_f16_bits(f32::NAN), 0xFE00);
        assert_eq!(f32_to_f16_bits(-f32::NAN), 0xFE00);
        assert_eq!(f32_to_f16_bits(f32::from_bits(0x7F80_0001)), 0xFE00); // any payload

        assert_eq!(f16_bits_to_f32(0x7C00), f32::INFINITY);
        assert_eq!(f16_bits_to_f32(0xFC00), f32::NEG_INFINITY);
        assert_eq!(f16_bits_to_f32(0x7C01).to_bits(), 0xFFC0_0000);
        assert_eq!(f16_bits_to_f32(0xFE00).to_bits(), 0xFFC0_0000);
    }

    #[test]
    fn overflow_saturates_to_infinity(){
        assert_eq!(f32_to_f16_bits(65536.0), 0x7C00);
        assert_eq!(f32_to_f16_bits(-65536.0), 0xFC00);
        assert_eq!(f32_to_f16_bits(1.0e10), 0x7C00);

        // 65520 is the tie between the largest finite half and infinity, and rounds up
        assert_eq!(f32_to_f16_bits(65520.0), 0x7C00);
    }

    #[test]
    fn underflow(){
        // single precision subnormals flush to signed zero
        assert_eq!(f32_to_f16_bits(f32::from_bits(0x0000_0001)), 0x0000);
        assert_eq!(f32_to_f16_bits(f32::from_bits(0x8000_0001)), 0x8000);

        // smallest subnormal half
        let tiny = (-24.0_f32).exp2();
        assert_eq!(f32_to_f16_bits(tiny), 0x0001);
        assert_eq!(f16_bits_to_f32(0x0001), tiny);

        // half of that still rounds up, a quarter is gone
        assert_eq!(f32_to_f16_bits((-25.0_f32).exp2()), 0x0001);
        assert_eq!(f32_to_f16_bits((-26.0_f32).exp2()), 0x0000);
    }

    #[test]
    fn ties_round_away_from_zero(){
        // exactly between 0x3C00 and 0x3C01
        let tie = f32::from_bits(0x3F80_1000);
        assert_eq!(f32_to_f16_bits(tie), 0x3C01);

        // exactly between 0x3C01 and 0x3C02, round to even would stay at 0x3C02 as well
        let tie = f32::from_bits(0x3F80_3000);
        assert_eq!(f32_to_f16_bits(tie), 0x3C02);

        // negative ties round towards negative infinity
        assert_eq!(f32_to_f16_bits(-f32::from_bits(0x3F80_1000)), 0xBC01);
    }

    #[test]
    fn mantissa_rounding_can_carry_into_exponent(){
        // slightly below 2.0, rounds up across the exponent boundary
        let almost_two = f16_bits_to_f32(0x3FFF) + (-11.0_f32).exp2();
        assert_eq!(f32_to_f16_bits(almost_two), 0x4000);
    }

    #[test]
    fn decode_matches_storage_type(){
        // the half crate decodes exactly, so every non-nan pattern must agree
        for bits in 0 ..= u16::MAX {
            let is_nan = bits & 0x7C00 == 0x7C00 && bits & 0x03FF != 0;
            if is_nan { continue }

            assert_eq!(
                f16_bits_to_f32(bits).to_bits(),
                f16::from_bits(bits).to_f32().to_bits(),
                "half bit pattern {:#06x}", bits
            );
        }
    }

    #[test]
    fn exact_round_trip(){
        // every value a half can represent survives the conversion to f32 and back
        for bits in 0 ..= u16::MAX {
            let is_nan = bits & 0x7C00 == 0x7C00 && bits & 0x03FF != 0;
            if is_nan { continue }

            assert_eq!(
                f32_to_f16_bits(f16_bits_to_f32(bits)), bits,
                "half bit pattern {:#06x}", bits
            );
        }
    }
}
