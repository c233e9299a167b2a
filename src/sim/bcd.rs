//! Character codes and the fixed tables the arithmetic unit works from.
//!
//! A memory character is six bits: two zone bits (`B`, `A`) over four digit bits (8-4-2-1).
//! The seventh bit, the word mark, is kept alongside it in a [`Cell`].
//!
//! Decimal addition is never done with native integer arithmetic. Every digit step
//! goes through [`SUM_TABLE`] and [`CARRY_TABLE`], the same way the hardware adder did.
//!
//! [`Cell`]: super::mem::Cell

/// Word mark bit.
pub const WM: u8 = 0o100;
/// Both zone bits.
pub const ZONE: u8 = 0o060;
/// The four digit bits.
pub const DIGIT: u8 = 0o017;
/// All six character bits.
pub const CHAR: u8 = 0o077;
/// The `A` zone bit.
pub const ABIT: u8 = 0o020;
/// The `B` zone bit.
pub const BBIT: u8 = 0o040;

/// Blank.
pub const BLANK: u8 = 0o00;
/// The digit zero (8-2 punch).
pub const ZERO: u8 = 0o12;
/// `#`
pub const HASH: u8 = 0o13;
/// `@`
pub const AT: u8 = 0o14;
/// Tape mark.
pub const TAPE_MARK: u8 = 0o17;
/// `/`
pub const SLASH: u8 = 0o21;
/// Record mark.
pub const RECORD_MARK: u8 = 0o32;
/// `,`
pub const COMMA: u8 = 0o33;
/// `%`
pub const PERCENT: u8 = 0o34;
/// `-`
pub const MINUS: u8 = 0o40;
/// `$`
pub const DOLLAR: u8 = 0o53;
/// `*`
pub const ASTERISK: u8 = 0o54;
/// `&`, also the plus sign.
pub const AMPERSAND: u8 = 0o60;
/// `.`
pub const PERIOD: u8 = 0o73;
/// Lozenge, printed as `)`.
pub const LOZENGE: u8 = 0o74;
/// Group mark.
pub const GROUP_MARK: u8 = 0o77;
/// `C`, used by the edit unit's credit symbol.
pub const LETTER_C: u8 = 0o63;
/// `R`, used by the edit unit's credit symbol.
pub const LETTER_R: u8 = 0o51;

/// Zone written on the units digit of a positive arithmetic result.
pub const SIGN_PLUS: u8 = ABIT | BBIT;
/// Zone written on the units digit of a negative arithmetic result.
pub const SIGN_MINUS: u8 = BBIT;

const ASCII: [u8; 64] = *b" 1234567890#@:>(^/STUVWXYZ|,%='\"-JKLMNOPQR!$*];_&ABCDEFGHI?.)[<}";

/// Converts a character code to its printable ASCII form.
pub fn bcd_to_ascii(c: u8) -> char {
    char::from(ASCII[usize::from(c & CHAR)])
}

/// Converts an ASCII character to its character code, if it has one.
///
/// Lower-case letters are accepted as their upper-case counterparts.
pub fn ascii_to_bcd(c: char) -> Option<u8> {
    let c = c.to_ascii_uppercase();
    ASCII.iter()
        .position(|&a| char::from(a) == c)
        .map(|p| p as u8)
}

/// Maps a 4-bit digit code to its binary value.
///
/// The zero code (10) and the blank code (0) trade places; the remaining codes map to themselves.
/// This is a bijection over all 16 codes, so [`binary_to_bcd`] undoes it exactly.
pub const fn bcd_to_binary(d: u8) -> u8 {
    match d & DIGIT {
        0  => 10,
        10 => 0,
        x  => x,
    }
}

/// Maps a binary value (0-15) to its 4-bit digit code. Inverse of [`bcd_to_binary`].
pub const fn binary_to_bcd(n: u8) -> u8 {
    match n & DIGIT {
        0  => ZERO,
        10 => BLANK,
        x  => x,
    }
}

/// The value the adder sees for a character's digit bits.
///
/// Blank and zero are both 0. The illegal codes 11-15 lose their 8-bit in the adder.
pub const fn to_binary_digit(c: u8) -> u8 {
    match c & DIGIT {
        0 | 10 => 0,
        x @ 1..=9 => x,
        x => x - 8,
    }
}

/// Whether this character is one of the digits 1-9 with no zone.
pub const fn is_significant_digit(c: u8) -> bool {
    matches!(c & CHAR, 1..=9)
}

const fn build_sum_table() -> [u8; 100] {
    let mut table = [0; 100];
    let mut i = 0;
    while i < 100 {
        table[i] = ((i / 10 + i % 10) % 10) as u8;
        i += 1;
    }
    table
}
const fn build_carry_table() -> [u8; 100] {
    let mut table = [0; 100];
    let mut i = 0;
    while i < 100 {
        table[i] = (i / 10 + i % 10 >= 10) as u8;
        i += 1;
    }
    table
}

/// Decimal digit sums, indexed by `a * 10 + b`.
pub static SUM_TABLE: [u8; 100] = build_sum_table();
/// Decimal carries (0 or 1), indexed by `a * 10 + b`.
pub static CARRY_TABLE: [u8; 100] = build_carry_table();

/// Adds two decimal digits and an incoming carry through the adder tables.
///
/// Returns the result digit and the outgoing carry.
pub fn add_digit(a: u8, b: u8, carry: bool) -> (u8, bool) {
    debug_assert!(a <= 9 && b <= 9, "adder only accepts decimal digits");

    let i = usize::from(a) * 10 + usize::from(b);
    let (sum, c) = (SUM_TABLE[i], CARRY_TABLE[i] != 0);
    match carry {
        true => {
            let j = usize::from(sum) * 10 + 1;
            (SUM_TABLE[j], c || CARRY_TABLE[j] != 0)
        },
        false => (sum, c)
    }
}

// Collating sequence, lowest first.
const COLLATE_ORDER: [u8; 64] = [
    0o00, 0o73, 0o74, 0o75, 0o76, 0o77, 0o60, 0o53, 0o54, 0o55, 0o56, 0o57,
    0o40, 0o21, 0o33, 0o34, 0o35, 0o36, 0o37, 0o20, 0o13, 0o14, 0o15, 0o16, 0o17,
    0o72, 0o61, 0o62, 0o63, 0o64, 0o65, 0o66, 0o67, 0o70, 0o71,
    0o52, 0o41, 0o42, 0o43, 0o44, 0o45, 0o46, 0o47, 0o50, 0o51,
    0o32, 0o22, 0o23, 0o24, 0o25, 0o26, 0o27, 0o30, 0o31,
    0o12, 0o01, 0o02, 0o03, 0o04, 0o05, 0o06, 0o07, 0o10, 0o11,
];
const fn build_collate_table() -> [u8; 64] {
    let mut table = [0; 64];
    let mut i = 0;
    while i < 64 {
        table[COLLATE_ORDER[i] as usize] = i as u8;
        i += 1;
    }
    table
}

/// Collating position of every character code.
pub static COLLATE_TABLE: [u8; 64] = build_collate_table();

/// Collating position of a character (word mark ignored).
pub fn collate(c: u8) -> u8 {
    COLLATE_TABLE[usize::from(c & CHAR)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adder_tables() {
        for a in 0..10u8 {
            for b in 0..10u8 {
                for c in [false, true] {
                    let total = a + b + u8::from(c);
                    assert_eq!(add_digit(a, b, c), (total % 10, total >= 10), "{a} + {b} + {c}");
                }
            }
        }
    }

    #[test]
    fn test_bcd_round_trip() {
        for d in 0..16u8 {
            assert_eq!(binary_to_bcd(bcd_to_binary(d)), d);
        }
        assert_eq!(bcd_to_binary(ZERO), 0);
        assert_eq!(binary_to_bcd(0), ZERO);
        assert_eq!(binary_to_bcd(7), 7);
    }

    #[test]
    fn test_adder_digit_values() {
        assert_eq!(to_binary_digit(BLANK), 0);
        assert_eq!(to_binary_digit(ZERO), 0);
        assert_eq!(to_binary_digit(5), 5);
        // J is minus-one
        assert_eq!(to_binary_digit(0o41), 1);
        assert_eq!(to_binary_digit(HASH), 3);
        assert_eq!(to_binary_digit(TAPE_MARK), 7);
    }

    #[test]
    fn test_ascii() {
        for c in 0..64u8 {
            assert_eq!(ascii_to_bcd(bcd_to_ascii(c)), Some(c));
        }
        assert_eq!(ascii_to_bcd('m'), Some(0o44));
        assert_eq!(ascii_to_bcd('0'), Some(ZERO));
        assert_eq!(ascii_to_bcd('~'), None);
        assert_eq!(bcd_to_ascii(GROUP_MARK | WM), '}');
    }

    #[test]
    fn test_collating_sequence() {
        let mut seen = [false; 64];
        for c in 0..64u8 {
            let pos = usize::from(collate(c));
            assert!(!seen[pos], "duplicate collating position {pos}");
            seen[pos] = true;
        }

        assert!(collate(BLANK) < collate(PERIOD));
        assert!(collate(0o61) < collate(0o41)); // A < J
        assert!(collate(0o31) < collate(ZERO)); // Z < 0
        assert!(collate(3) < collate(4));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn add_digit_matches_integer_add(a in 0u8..10, b in 0u8..10, c in any::<bool>()) {
            let (d, carry) = add_digit(a, b, c);
            let total = a + b + u8::from(c);
            prop_assert_eq!(d, total % 10);
            prop_assert_eq!(carry, total >= 10);
        }

        #[test]
        fn every_digit_code_round_trips(d in 0u8..16) {
            prop_assert_eq!(binary_to_bcd(bcd_to_binary(d)), d);
        }
    }
}
