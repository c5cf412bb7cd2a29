use std::fmt;

/// A value that was either successfully recognized as a known variant `T`,
/// or is an unrecognized raw value `Raw`.
///
/// Files carry enumerations as plain integers, and a value we have no name
/// for is not an error: it is kept as-is so it can be written back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Recognized<T, Raw = u32> {
    Known(T),
    Unknown(Raw),
}

impl<T: Copy, Raw: Copy> Copy for Recognized<T, Raw> {}

/// An enumeration with a fixed raw encoding.
pub trait RawEnum: Sized + Copy {
    type Raw: Copy;

    fn from_raw(raw: Self::Raw) -> Option<Self>;

    fn to_raw(self) -> Self::Raw;
}

impl<T, Raw> Recognized<T, Raw> {
    pub fn known(&self) -> Option<&T> {
        match self {
            Recognized::Known(t) => Some(t),
            Recognized::Unknown(_) => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Recognized::Known(_))
    }
}

impl<T: RawEnum> Recognized<T, T::Raw> {
    pub fn from_raw(raw: T::Raw) -> Self {
        match T::from_raw(raw) {
            Some(t) => Recognized::Known(t),
            None => Recognized::Unknown(raw),
        }
    }

    /// The value as stored in the file.
    pub fn raw(&self) -> T::Raw {
        match *self {
            Recognized::Known(t) => t.to_raw(),
            Recognized::Unknown(raw) => raw,
        }
    }
}

impl<T, Raw> From<T> for Recognized<T, Raw> {
    fn from(value: T) -> Self {
        Recognized::Known(value)
    }
}

impl<T: fmt::Display, Raw: fmt::Display> fmt::Display for Recognized<T, Raw> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recognized::Known(t) => t.fmt(f),
            Recognized::Unknown(raw) => write!(f, "unknown({raw})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Side {
        Left,
        Right,
    }

    impl RawEnum for Side {
        type Raw = u32;

        fn from_raw(raw: u32) -> Option<Self> {
            match raw {
                0 => Some(Side::Left),
                1 => Some(Side::Right),
                _ => None,
            }
        }

        fn to_raw(self) -> u32 {
            self as u32
        }
    }

    #[test]
    fn unknown_values_are_preserved() {
        let known = Recognized::<Side>::from_raw(1);
        assert_eq!(known, Recognized::Known(Side::Right));
        assert_eq!(known.raw(), 1);

        let unknown = Recognized::<Side>::from_raw(77);
        assert!(!unknown.is_known());
        assert_eq!(unknown.raw(), 77);
        assert_eq!(unknown.known(), None);
    }
}
