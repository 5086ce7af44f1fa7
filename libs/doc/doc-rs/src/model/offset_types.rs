use std::cmp::{Ordering, max, min};
use std::fmt::{Debug, Formatter};
use std::ops::{Add, AddAssign, Sub, SubAssign};

use serde::{Deserialize, Serialize};

/// A character position in the flattened document stream. The engine never
/// addresses bytes; every offset handed to the synchronization layer counts
/// graphemes and structure markers.
#[repr(transparent)]
#[derive(Default, Copy, Clone, PartialEq, PartialOrd, Eq, Ord, Hash, Serialize, Deserialize)]
pub struct DocCharOffset(pub usize);

/// A character offset from a position in the stream or a distance between
/// two positions.
#[repr(transparent)]
#[derive(Default, Copy, Clone, PartialEq, PartialOrd, Eq, Ord, Hash, Serialize, Deserialize)]
pub struct RelCharOffset(pub usize);

// rel +/- rel = rel, doc +/- rel = doc, doc - doc = rel
impl Add<RelCharOffset> for RelCharOffset {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub<RelCharOffset> for RelCharOffset {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl AddAssign<RelCharOffset> for RelCharOffset {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0
    }
}

impl SubAssign<RelCharOffset> for RelCharOffset {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0
    }
}

impl Add<RelCharOffset> for DocCharOffset {
    type Output = Self;

    fn add(self, rhs: RelCharOffset) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub<RelCharOffset> for DocCharOffset {
    type Output = Self;

    fn sub(self, rhs: RelCharOffset) -> Self::Output {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl AddAssign<RelCharOffset> for DocCharOffset {
    fn add_assign(&mut self, rhs: RelCharOffset) {
        self.0 += rhs.0
    }
}

impl SubAssign<RelCharOffset> for DocCharOffset {
    fn sub_assign(&mut self, rhs: RelCharOffset) {
        self.0 -= rhs.0
    }
}

impl Sub<DocCharOffset> for DocCharOffset {
    type Output = RelCharOffset;

    fn sub(self, rhs: Self) -> Self::Output {
        RelCharOffset(self.0.saturating_sub(rhs.0))
    }
}

// both offset types impl From<usize>, PartialEq<usize>, PartialOrd<usize>, Add<usize>, Sub<usize>
impl From<usize> for DocCharOffset {
    fn from(value: usize) -> Self {
        Self(value)
    }
}

impl PartialEq<usize> for DocCharOffset {
    fn eq(&self, other: &usize) -> bool {
        &self.0 == other
    }
}

impl PartialOrd<usize> for DocCharOffset {
    fn partial_cmp(&self, other: &usize) -> Option<Ordering> {
        self.0.partial_cmp(other)
    }
}

impl PartialEq<DocCharOffset> for usize {
    fn eq(&self, other: &DocCharOffset) -> bool {
        self == &other.0
    }
}

impl PartialOrd<DocCharOffset> for usize {
    fn partial_cmp(&self, other: &DocCharOffset) -> Option<Ordering> {
        self.partial_cmp(&other.0)
    }
}

impl Add<usize> for DocCharOffset {
    type Output = Self;

    fn add(self, rhs: usize) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl Sub<usize> for DocCharOffset {
    type Output = Self;

    fn sub(self, rhs: usize) -> Self::Output {
        Self(self.0.saturating_sub(rhs))
    }
}

impl AddAssign<usize> for DocCharOffset {
    fn add_assign(&mut self, rhs: usize) {
        self.0 += rhs
    }
}

impl SubAssign<usize> for DocCharOffset {
    fn sub_assign(&mut self, rhs: usize) {
        self.0 -= rhs
    }
}

impl From<usize> for RelCharOffset {
    fn from(value: usize) -> Self {
        Self(value)
    }
}

impl PartialEq<usize> for RelCharOffset {
    fn eq(&self, other: &usize) -> bool {
        &self.0 == other
    }
}

impl PartialOrd<usize> for RelCharOffset {
    fn partial_cmp(&self, other: &usize) -> Option<Ordering> {
        self.0.partial_cmp(other)
    }
}

impl Add<usize> for RelCharOffset {
    type Output = Self;

    fn add(self, rhs: usize) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl Sub<usize> for RelCharOffset {
    type Output = Self;

    fn sub(self, rhs: usize) -> Self::Output {
        Self(self.0.saturating_sub(rhs))
    }
}

impl AddAssign<usize> for RelCharOffset {
    fn add_assign(&mut self, rhs: usize) {
        self.0 += rhs
    }
}

impl SubAssign<usize> for RelCharOffset {
    fn sub_assign(&mut self, rhs: usize) {
        self.0 -= rhs
    }
}

impl Debug for DocCharOffset {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl Debug for RelCharOffset {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

pub trait RangeExt: Sized {
    type Element: Copy + Sub<Self::Element> + Ord;

    fn contains(&self, value: Self::Element, start_inclusive: bool, end_inclusive: bool) -> bool;
    fn start(&self) -> Self::Element;
    fn end(&self) -> Self::Element;
    fn len(&self) -> <Self::Element as Sub>::Output;
    fn is_empty(&self) -> bool;

    fn contains_inclusive(&self, value: Self::Element) -> bool {
        self.contains(value, true, true)
    }
}

impl<T> RangeExt for (T, T)
where
    T: Ord + Sized + Copy + Sub<T>,
{
    type Element = T;

    /// returns whether the range includes the value; the tuple is not
    /// assumed ordered (selection direction is preserved at capture)
    fn contains(&self, value: T, start_inclusive: bool, end_inclusive: bool) -> bool {
        (self.start() < value || (start_inclusive && self.start() == value))
            && (value < self.end() || (end_inclusive && self.end() == value))
    }

    fn start(&self) -> T {
        *min(&self.0, &self.1)
    }

    fn end(&self) -> T {
        *max(&self.0, &self.1)
    }

    fn len(&self) -> <T as Sub>::Output {
        self.end() - self.start()
    }

    fn is_empty(&self) -> bool {
        self.0 == self.1
    }
}

#[cfg(test)]
mod test {
    use super::{DocCharOffset, RangeExt as _};

    #[test]
    fn range_normalizes_backward_tuples() {
        let range = (DocCharOffset(12), DocCharOffset(4));
        assert_eq!(range.start(), DocCharOffset(4));
        assert_eq!(range.end(), DocCharOffset(12));
        assert_eq!(range.len(), 8);
        assert!(range.contains_inclusive(DocCharOffset(4)));
        assert!(!range.contains(DocCharOffset(12), true, false));
    }

    #[test]
    fn doc_minus_doc_saturates() {
        assert_eq!(DocCharOffset(3) - DocCharOffset(9), 0);
        assert_eq!(DocCharOffset(9) - DocCharOffset(3), 6);
    }
}
