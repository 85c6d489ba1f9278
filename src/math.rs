
//! Small numeric helpers used across the crate.

use std::convert::TryFrom;
use crate::error::i32_to_usize;
use crate::error::Result;

/// A pair of numbers, used for positions, sizes and sampling rates.
/// Deliberately plain, offering only the operations this crate needs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Vec2<T> (pub T, pub T);

impl<T> Vec2<T> {

    /// Componentwise maximum of two vectors.
    pub fn max(self, other: Self) -> Self where T: Ord {
        Vec2(self.0.max(other.0), self.1.max(other.1))
    }

    /// Apply a function to both components.
    pub fn map<B>(self, map: impl Fn(T) -> B) -> Vec2<B> {
        Vec2(map(self.0), map(self.1))
    }

    /// Convert both components to another type, failing if either does not fit.
    pub fn try_from<S>(value: Vec2<S>) -> std::result::Result<Self, T::Error> where T: TryFrom<S> {
        Ok(Vec2(T::try_from(value.0)?, T::try_from(value.1)?))
    }

    /// Width times height, when this vector is a size.
    pub fn area(self) -> T where T: std::ops::Mul<T, Output = T> {
        self.0 * self.1
    }

    /// The horizontal component.
    pub fn x(self) -> T { self.0 }

    /// The vertical component.
    pub fn y(self) -> T { self.1 }

    /// The horizontal component, when this vector is a size.
    pub fn width(self) -> T { self.0 }

    /// The vertical component, when this vector is a size.
    pub fn height(self) -> T { self.1 }
}


impl Vec2<i32> {

    /// Fails with the specified message if a component is negative.
    pub fn to_usize(self, error_message: &'static str) -> Result<Vec2<usize>> {
        let x = i32_to_usize(self.0, error_message)?;
        let y = i32_to_usize(self.1, error_message)?;
        Ok(Vec2(x, y))
    }
}

impl Vec2<usize> {

    /// Panics if a component exceeds the integer range.
    pub fn to_i32(self) -> Vec2<i32> {
        let x = i32::try_from(self.0).expect("vector x coordinate too large");
        let y = i32::try_from(self.1).expect("vector y coordinate too large");
        Vec2(x, y)
    }
}


impl<T: std::ops::Add<T>> std::ops::Add<Vec2<T>> for Vec2<T> {
    type Output = Vec2<T::Output>;
    fn add(self, other: Vec2<T>) -> Self::Output {
        Vec2(self.0 + other.0, self.1 + other.1)
    }
}

impl<T: std::ops::Sub<T>> std::ops::Sub<Vec2<T>> for Vec2<T> {
    type Output = Vec2<T::Output>;
    fn sub(self, other: Vec2<T>) -> Self::Output {
        Vec2(self.0 - other.0, self.1 - other.1)
    }
}

impl<T: std::ops::Div<T>> std::ops::Div<Vec2<T>> for Vec2<T> {
    type Output = Vec2<T::Output>;
    fn div(self, other: Vec2<T>) -> Self::Output {
        Vec2(self.0 / other.0, self.1 / other.1)
    }
}

impl<T: std::ops::Mul<T>> std::ops::Mul<Vec2<T>> for Vec2<T> {
    type Output = Vec2<T::Output>;
    fn mul(self, other: Vec2<T>) -> Self::Output {
        Vec2(self.0 * other.0, self.1 * other.1)
    }
}

impl<T> From<(T, T)> for Vec2<T> {
    fn from((x, y): (T, T)) -> Self { Vec2(x, y) }
}

impl<T> From<Vec2<T>> for (T, T) {
    fn from(vec2: Vec2<T>) -> Self { (vec2.0, vec2.1) }
}


/// The direction to round in calculations that may not divide evenly.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum RoundingMode {

    /// Towards negative infinity.
    Down,

    /// Towards positive infinity.
    Up,
}

impl RoundingMode {

    // both values must be positive
    pub(crate) fn divide(self, dividend: usize, divisor: usize) -> usize {
        match self {
            RoundingMode::Down => dividend / divisor,
            RoundingMode::Up => (dividend + divisor - 1) / divisor,
        }
    }

    /// The base-two logarithm, rounded in this direction.
    /// The number must not be zero.
    pub(crate) fn log2(self, number: usize) -> usize {
        debug_assert_ne!(number, 0, "log2 of zero");
        let rounded_down = usize::BITS as usize - 1 - number.leading_zeros() as usize;

        match self {
            RoundingMode::Down => rounded_down,
            RoundingMode::Up if number.is_power_of_two() => rounded_down,
            RoundingMode::Up => rounded_down + 1,
        }
    }
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn division_rounding() {
        assert_eq!(RoundingMode::Down.divide(8, 2), 4);
        assert_eq!(RoundingMode::Up.divide(8, 2), 4);
        assert_eq!(RoundingMode::Down.divide(7, 2), 3);
        assert_eq!(RoundingMode::Up.divide(7, 2), 4);
        assert_eq!(RoundingMode::Up.divide(1, 16), 1);
        assert_eq!(RoundingMode::Down.divide(1, 16), 0);
    }

    #[test]
    fn log2_rounding() {
        assert_eq!(RoundingMode::Down.log2(1), 0);
        assert_eq!(RoundingMode::Up.log2(1), 0);
        assert_eq!(RoundingMode::Down.log2(4), 2);
        assert_eq!(RoundingMode::Up.log2(4), 2);
        assert_eq!(RoundingMode::Down.log2(5), 2);
        assert_eq!(RoundingMode::Up.log2(5), 3);
        assert_eq!(RoundingMode::Down.log2(7), 2);
        assert_eq!(RoundingMode::Up.log2(7), 3);
    }
}
