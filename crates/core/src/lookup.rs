#![forbid(unsafe_code)]

/// Outcome of a read that should match at most one row.
///
/// `TooMany` is a data-integrity anomaly rather than an error: callers log it
/// and continue with the first row, which queries order so that the first row
/// is the deterministic winner (highest ordinal).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Lookup<T> {
    Missing,
    One(T),
    TooMany(Vec<T>),
}

impl<T> Lookup<T> {
    pub fn from_rows(mut rows: Vec<T>) -> Self {
        match rows.len() {
            0 => Self::Missing,
            1 => match rows.pop() {
                Some(row) => Self::One(row),
                None => Self::Missing,
            },
            _ => Self::TooMany(rows),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    pub fn row_count(&self) -> usize {
        match self {
            Self::Missing => 0,
            Self::One(_) => 1,
            Self::TooMany(rows) => rows.len(),
        }
    }

    /// Collapses the lookup to its deterministic winner.
    pub fn into_first(self) -> Option<T> {
        match self {
            Self::Missing => None,
            Self::One(row) => Some(row),
            Self::TooMany(rows) => rows.into_iter().next(),
        }
    }

    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> Lookup<U> {
        match self {
            Self::Missing => Lookup::Missing,
            Self::One(row) => Lookup::One(f(row)),
            Self::TooMany(rows) => Lookup::TooMany(rows.into_iter().map(f).collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Lookup;

    #[test]
    fn from_rows_distinguishes_missing_one_and_many() {
        assert_eq!(Lookup::<i64>::from_rows(Vec::new()), Lookup::Missing);
        assert_eq!(Lookup::from_rows(vec![7]), Lookup::One(7));
        assert_eq!(Lookup::from_rows(vec![9, 3]), Lookup::TooMany(vec![9, 3]));
    }

    #[test]
    fn into_first_keeps_the_leading_row_of_an_anomaly() {
        let lookup = Lookup::from_rows(vec![12, 4, 1]);
        assert_eq!(lookup.row_count(), 3);
        assert_eq!(lookup.into_first(), Some(12));
        assert_eq!(Lookup::<i64>::Missing.into_first(), None);
    }
}
