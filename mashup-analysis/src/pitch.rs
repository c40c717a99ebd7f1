//! Pitch classes on the 12-tone chromatic circle
//!
//! Maps the 12 pitch classes to indices (0 = C) and names, and computes the
//! shortest semitone rotation between two of them for key matching.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors produced when a key cannot be interpreted as a pitch class
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("Unknown key name: {0:?}")]
    UnknownName(String),
    #[error("Key index {0} is outside 0-11")]
    IndexOutOfRange(i64),
}

/// One of the 12 pitch classes (enharmonic spellings collapse to the sharp form)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PitchClass {
    C,
    CSharp,
    D,
    DSharp,
    E,
    F,
    FSharp,
    G,
    GSharp,
    A,
    ASharp,
    B,
}

impl PitchClass {
    /// All pitch classes in index order
    pub const ALL: [PitchClass; 12] = [
        PitchClass::C,
        PitchClass::CSharp,
        PitchClass::D,
        PitchClass::DSharp,
        PitchClass::E,
        PitchClass::F,
        PitchClass::FSharp,
        PitchClass::G,
        PitchClass::GSharp,
        PitchClass::A,
        PitchClass::ASharp,
        PitchClass::B,
    ];

    /// Index on the chromatic circle (0 = C, 11 = B)
    pub fn index(self) -> u8 {
        self as u8
    }

    /// Pitch class for an index in 0-11
    pub fn from_index(index: u8) -> Result<Self, KeyError> {
        Self::ALL
            .get(index as usize)
            .copied()
            .ok_or(KeyError::IndexOutOfRange(index as i64))
    }

    /// Pitch class for any integer, wrapping around the circle
    pub fn wrapping(index: i32) -> Self {
        Self::ALL[index.rem_euclid(12) as usize]
    }

    /// Sharp-spelled name ("C", "C#", ...)
    pub fn name(self) -> &'static str {
        use PitchClass::*;
        match self {
            C => "C",
            CSharp => "C#",
            D => "D",
            DSharp => "D#",
            E => "E",
            F => "F",
            FSharp => "F#",
            G => "G",
            GSharp => "G#",
            A => "A",
            ASharp => "A#",
            B => "B",
        }
    }

    /// Pitch class this one lands on after transposing by `semitones`
    pub fn transpose(self, semitones: i32) -> Self {
        Self::wrapping(self.index() as i32 + semitones)
    }

    /// Signed semitone shift that takes `self` to `target` the short way round.
    ///
    /// The result is congruent to `target - self` mod 12 and lies in -5..=6:
    /// a tritone (6 semitones either way) always resolves upward.
    pub fn shift_to(self, target: PitchClass) -> i32 {
        let cur = self.index() as i32;
        let tgt = target.index() as i32;
        let below = (cur - tgt).rem_euclid(12);
        let above = (tgt - cur).rem_euclid(12);

        if below < above {
            -below
        } else {
            above
        }
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PitchClass {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let mut chars = trimmed.chars();
        let letter = chars
            .next()
            .map(|c| c.to_ascii_uppercase())
            .ok_or_else(|| KeyError::UnknownName(s.to_string()))?;

        let natural: i32 = match letter {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return Err(KeyError::UnknownName(s.to_string())),
        };

        let accidental = match chars.as_str() {
            "" => 0,
            "#" | "♯" => 1,
            "b" | "♭" => -1,
            _ => return Err(KeyError::UnknownName(s.to_string())),
        };

        Ok(Self::wrapping(natural + accidental))
    }
}

impl TryFrom<i64> for PitchClass {
    type Error = KeyError;

    fn try_from(index: i64) -> Result<Self, Self::Error> {
        if (0..12).contains(&index) {
            Ok(Self::ALL[index as usize])
        } else {
            Err(KeyError::IndexOutOfRange(index))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_name_roundtrip() {
        for i in 0..12u8 {
            let pc = PitchClass::from_index(i).unwrap();
            let parsed: PitchClass = pc.name().parse().unwrap();
            assert_eq!(parsed.index(), i);
        }
    }

    #[test]
    fn test_flat_aliases() {
        assert_eq!("Db".parse::<PitchClass>().unwrap(), PitchClass::CSharp);
        assert_eq!("Bb".parse::<PitchClass>().unwrap(), PitchClass::ASharp);
        assert_eq!("g#".parse::<PitchClass>().unwrap(), PitchClass::GSharp);
        // Cb wraps to B
        assert_eq!("Cb".parse::<PitchClass>().unwrap(), PitchClass::B);
    }

    #[test]
    fn test_invalid_keys() {
        assert!(matches!(
            "H".parse::<PitchClass>(),
            Err(KeyError::UnknownName(_))
        ));
        assert!(matches!(
            "C##".parse::<PitchClass>(),
            Err(KeyError::UnknownName(_))
        ));
        assert!("".parse::<PitchClass>().is_err());
        assert_eq!(
            PitchClass::from_index(12),
            Err(KeyError::IndexOutOfRange(12))
        );
        assert_eq!(
            PitchClass::try_from(-1i64),
            Err(KeyError::IndexOutOfRange(-1))
        );
    }

    #[test]
    fn test_shift_minimal_rotation_all_pairs() {
        for a in PitchClass::ALL {
            for b in PitchClass::ALL {
                let s = a.shift_to(b);
                let diff = b.index() as i32 - a.index() as i32;
                assert_eq!((s - diff).rem_euclid(12), 0, "{a} -> {b} gave {s}");
                assert!(s.abs() <= 6, "{a} -> {b} gave {s}");
                assert_eq!(a.transpose(s), b);
            }
        }
    }

    #[test]
    fn test_tritone_resolves_upward() {
        for a in PitchClass::ALL {
            let b = a.transpose(6);
            assert_eq!(a.shift_to(b), 6);
        }
    }

    #[test]
    fn test_c_to_g_goes_down_five() {
        assert_eq!(PitchClass::C.shift_to(PitchClass::G), -5);
        assert_eq!(PitchClass::G.shift_to(PitchClass::C), 5);
        assert_eq!(PitchClass::B.shift_to(PitchClass::C), 1);
        assert_eq!(PitchClass::E.shift_to(PitchClass::E), 0);
    }
}
