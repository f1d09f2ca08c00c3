/// Finds the index range of elements in a sorted slice whose keys fall within
/// `[low, high]`.
///
/// The slice must be sorted by `key_fn`. Works for partially ordered keys such as
/// `f64`, which is what makes it usable on m/z sorted peak arrays.
///
/// # Examples
///
/// ```
/// use ms1query::utils::binary_search_range_by_key;
///
/// let mzs = [100.0, 200.0, 200.5, 300.0, 400.0];
/// let range = binary_search_range_by_key(&mzs, (200.0, 300.0), |x| *x);
/// assert_eq!(&mzs[range], &[200.0, 200.5, 300.0]);
///
/// let empty = binary_search_range_by_key(&mzs, (500.0, 600.0), |x| *x);
/// assert!(mzs[empty].is_empty());
/// ```
pub fn binary_search_range_by_key<T, K, F>(
    slice: &[T],
    key_range: (K, K),
    key_fn: F,
) -> std::ops::Range<usize>
where
    F: Fn(&T) -> K,
    K: PartialOrd,
{
    let start_idx = slice.partition_point(|x| key_fn(x) < key_range.0);
    let end_idx = start_idx + slice[start_idx..].partition_point(|x| key_fn(x) <= key_range.1);

    start_idx..end_idx
}

/// TupleRange represents a range defined by a tuple of two elements (T, T).
///
/// It represents a range as closed-closed [a, b], meaning both endpoints are inclusive.
/// The first element is always less than or equal to the second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct TupleRange<T: Copy + PartialOrd>(T, T);

#[derive(Debug, Clone, PartialEq)]
pub enum TupleRangeError<T: Copy + PartialOrd + std::fmt::Debug> {
    ExpectedOrderedRange(T, T),
}

impl<T: Copy + PartialOrd + std::fmt::Debug> std::fmt::Display for TupleRangeError<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExpectedOrderedRange(a, b) => write!(
                f,
                "Expected the first element to be less than or equal to the second, got ({:?}, {:?})",
                a, b
            ),
        }
    }
}

impl<T: Copy + PartialOrd + std::fmt::Debug> TupleRange<T> {
    pub fn try_new(left: T, right: T) -> Result<Self, TupleRangeError<T>> {
        if left > right {
            Err(TupleRangeError::ExpectedOrderedRange(left, right))
        } else {
            Ok(Self(left, right))
        }
    }

    /// Range holding a single value.
    pub fn single(x: T) -> Self {
        Self(x, x)
    }

    pub fn as_tuple(&self) -> (T, T) {
        (self.0, self.1)
    }

    pub fn contains(&self, x: T) -> bool {
        self.0 <= x && x <= self.1
    }

    pub fn start(&self) -> T {
        self.0
    }

    pub fn end(&self) -> T {
        self.1
    }

    pub fn intersects(&self, other: Self) -> bool {
        !(self.end() < other.start() || other.end() < self.start())
    }

    /// Smallest range covering both ranges.
    pub fn union(&self, other: Self) -> Self {
        let start = if other.0 < self.0 { other.0 } else { self.0 };
        let end = if other.1 > self.1 { other.1 } else { self.1 };
        Self(start, end)
    }
}

impl TupleRange<f64> {
    /// Symmetric window around `center`.
    ///
    /// The half width is taken as an absolute value so the range is always ordered.
    pub fn around(center: f64, half_width: f64) -> Self {
        let half_width = half_width.abs();
        Self(center - half_width, center + half_width)
    }

    pub fn width(&self) -> f64 {
        self.1 - self.0
    }
}

impl<T> TryInto<TupleRange<T>> for (T, T)
where
    T: Copy + PartialOrd + std::fmt::Debug,
{
    type Error = TupleRangeError<T>;

    fn try_into(self) -> Result<TupleRange<T>, Self::Error> {
        TupleRange::try_new(self.0, self.1)
    }
}
