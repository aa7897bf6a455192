//! Foot side enumeration.

use std::fmt;

/// Which foot (or both, for a double support).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
    /// Both feet on the ground (double support).
    Both,
}

impl Side {
    /// The opposite single side. `Both` maps to itself.
    pub const fn other(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
            Self::Both => Self::Both,
        }
    }

    /// Parse `"left"`/`"right"`. Anything else defaults to `Left`, matching
    /// the permissive behavior expected by configuration strings.
    pub fn from_str_lossy(s: &str) -> Self {
        if s.eq_ignore_ascii_case("right") {
            Self::Right
        } else {
            Self::Left
        }
    }

    /// Lateral sign of this side in the support frame: +1 for `Left`,
    /// -1 for `Right`, 0 for `Both`.
    pub const fn lateral_sign(self) -> f64 {
        match self {
            Self::Left => 1.0,
            Self::Right => -1.0,
            Self::Both => 0.0,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Left => "left",
            Self::Right => "right",
            Self::Both => "both",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn other_swaps_single_sides() {
        assert_eq!(Side::Left.other(), Side::Right);
        assert_eq!(Side::Right.other(), Side::Left);
        assert_eq!(Side::Both.other(), Side::Both);
    }

    #[test]
    fn parses_side_strings() {
        assert_eq!(Side::from_str_lossy("right"), Side::Right);
        assert_eq!(Side::from_str_lossy("RIGHT"), Side::Right);
        assert_eq!(Side::from_str_lossy("left"), Side::Left);
        assert_eq!(Side::from_str_lossy("anything"), Side::Left);
    }

    #[test]
    fn lateral_signs() {
        assert_eq!(Side::Left.lateral_sign(), 1.0);
        assert_eq!(Side::Right.lateral_sign(), -1.0);
        assert_eq!(Side::Both.lateral_sign(), 0.0);
    }

    #[test]
    fn display_names() {
        assert_eq!(Side::Left.to_string(), "left");
        assert_eq!(Side::Right.to_string(), "right");
        assert_eq!(Side::Both.to_string(), "both");
    }
}
