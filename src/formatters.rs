// Input masks for Brazilian identifiers
// CNPJ (company tax id), CEP (postal code) and phone numbers
//
// Every mask works the same way:
//   1. strip everything that is not a digit
//   2. keep at most `max_digits` digits (leftmost ones win)
//   3. punctuate progressively, so a half-typed value still reads well
//
// Nothing here fails. Garbage in gives a shorter (possibly empty) string out.

use serde::{Deserialize, Serialize};

// ============================================================================
// MASK
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mask {
    /// `XX.XXX.XXX/XXXX-XX`
    Cnpj,

    /// `XXXXX-XXX`
    Cep,

    /// `(XX) XXXX-XXXX` or `(XX) XXXXX-XXXX`
    Phone,
}

impl Mask {
    pub fn max_digits(&self) -> usize {
        match self {
            Mask::Cnpj => 14,
            Mask::Cep => 8,
            Mask::Phone => 11,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mask::Cnpj => "cnpj",
            Mask::Cep => "cep",
            Mask::Phone => "phone",
        }
    }

    /// Parse a mask name as typed on the command line
    pub fn from_name(name: &str) -> Option<Mask> {
        match name.trim().to_lowercase().as_str() {
            "cnpj" | "tax-id" | "taxid" => Some(Mask::Cnpj),
            "cep" | "postal-code" | "postalcode" => Some(Mask::Cep),
            "phone" | "telefone" | "tel" => Some(Mask::Phone),
            _ => None,
        }
    }

    /// Digits only, truncated to this mask's maximum length.
    /// This is the value that gets stored and sent to the backend.
    pub fn normalize(&self, value: &str) -> String {
        value
            .chars()
            .filter(|c| c.is_ascii_digit())
            .take(self.max_digits())
            .collect()
    }

    /// Normalize, then punctuate for display
    pub fn apply(&self, value: &str) -> String {
        let digits = self.normalize(value);
        match self {
            Mask::Cnpj => punctuate_cnpj(&digits),
            Mask::Cep => punctuate_cep(&digits),
            Mask::Phone => punctuate_phone(&digits),
        }
    }
}

// ============================================================================
// PUBLIC HELPERS
// ============================================================================

/// Strip every non-digit character, keeping digit order
pub fn digits_only(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_digit()).collect()
}

pub fn format_cnpj(value: &str) -> String {
    Mask::Cnpj.apply(value)
}

pub fn format_cep(value: &str) -> String {
    Mask::Cep.apply(value)
}

pub fn format_phone(value: &str) -> String {
    Mask::Phone.apply(value)
}

/// Phone rendering for table cells: an empty value shows as `-`
pub fn display_phone(value: &str) -> String {
    if value.trim().is_empty() {
        "-".to_string()
    } else {
        format_phone(value)
    }
}

// ============================================================================
// PUNCTUATION (input is already digits-only and truncated, so ASCII slicing is safe)
// ============================================================================

fn punctuate_cnpj(d: &str) -> String {
    match d.len() {
        0..=2 => d.to_string(),
        3..=5 => format!("{}.{}", &d[..2], &d[2..]),
        6..=8 => format!("{}.{}.{}", &d[..2], &d[2..5], &d[5..]),
        9..=12 => format!("{}.{}.{}/{}", &d[..2], &d[2..5], &d[5..8], &d[8..]),
        _ => format!(
            "{}.{}.{}/{}-{}",
            &d[..2],
            &d[2..5],
            &d[5..8],
            &d[8..12],
            &d[12..]
        ),
    }
}

fn punctuate_cep(d: &str) -> String {
    if d.len() <= 5 {
        d.to_string()
    } else {
        format!("{}-{}", &d[..5], &d[5..])
    }
}

fn punctuate_phone(d: &str) -> String {
    match d.len() {
        0..=2 => d.to_string(),
        3..=6 => format!("({}) {}", &d[..2], &d[2..]),
        7..=10 => format!("({}) {}-{}", &d[..2], &d[2..6], &d[6..]),
        _ => format!("({}) {}-{}", &d[..2], &d[2..7], &d[7..]),
    }
}

// ============================================================================
// MASKED INPUT (keystroke buffer for form fields)
// ============================================================================

/// Editing buffer behind a masked form field.
///
/// Holds only digits. Typing past the mask's limit is ignored, the same way
/// a browser input stops accepting characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskedInput {
    mask: Mask,
    digits: String,
}

impl MaskedInput {
    pub fn new(mask: Mask) -> Self {
        Self {
            mask,
            digits: String::new(),
        }
    }

    pub fn with_value(mask: Mask, value: &str) -> Self {
        Self {
            mask,
            digits: mask.normalize(value),
        }
    }

    pub fn mask(&self) -> Mask {
        self.mask
    }

    /// Returns true when the character was accepted
    pub fn push(&mut self, c: char) -> bool {
        if !c.is_ascii_digit() || self.is_full() {
            return false;
        }
        self.digits.push(c);
        true
    }

    pub fn pop(&mut self) -> Option<char> {
        self.digits.pop()
    }

    pub fn clear(&mut self) {
        self.digits.clear();
    }

    pub fn is_full(&self) -> bool {
        self.digits.len() >= self.mask.max_digits()
    }

    pub fn digits(&self) -> &str {
        &self.digits
    }

    pub fn display(&self) -> String {
        self.mask.apply(&self.digits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_cnpj_full() {
        assert_eq!(format_cnpj("12345678000199"), "12.345.678/0001-99");
    }

    #[test]
    fn test_format_cnpj_progressive() {
        assert_eq!(format_cnpj("1"), "1");
        assert_eq!(format_cnpj("12"), "12");
        assert_eq!(format_cnpj("123"), "12.3");
        assert_eq!(format_cnpj("1234"), "12.34");
        assert_eq!(format_cnpj("123456"), "12.345.6");
        assert_eq!(format_cnpj("123456789"), "12.345.678/9");
        assert_eq!(format_cnpj("1234567800019"), "12.345.678/0001-9");
    }

    #[test]
    fn test_format_cnpj_ignores_noise_and_truncates() {
        assert_eq!(format_cnpj("12.345.678/0001-99"), "12.345.678/0001-99");
        assert_eq!(format_cnpj("ab12 345x678/0001-99"), "12.345.678/0001-99");
        assert_eq!(format_cnpj("1234567800019977"), "12.345.678/0001-99");
    }

    #[test]
    fn test_format_cep() {
        assert_eq!(format_cep("01310100"), "01310-100");
        assert_eq!(format_cep("01310"), "01310");
        assert_eq!(format_cep("013101"), "01310-1");
        assert_eq!(format_cep("01310-100 extra 99"), "01310-100");
    }

    #[test]
    fn test_format_phone() {
        assert_eq!(format_phone("11987654321"), "(11) 98765-4321");
        assert_eq!(format_phone("1133334444"), "(11) 3333-4444");
        assert_eq!(format_phone("11"), "11");
        assert_eq!(format_phone("119"), "(11) 9");
        assert_eq!(format_phone("119876"), "(11) 9876");
        assert_eq!(format_phone("1198765"), "(11) 9876-5");
        assert_eq!(format_phone("(11) 98765-4321 ramal 22"), "(11) 98765-4321");
    }

    #[test]
    fn test_empty_input_formats_to_empty() {
        for mask in [Mask::Cnpj, Mask::Cep, Mask::Phone] {
            assert_eq!(mask.apply(""), "");
            assert_eq!(mask.apply("abc-./"), "");
        }
    }

    #[test]
    fn test_display_phone_placeholder() {
        assert_eq!(display_phone(""), "-");
        assert_eq!(display_phone("   "), "-");
        assert_eq!(display_phone("1133334444"), "(11) 3333-4444");
    }

    #[test]
    fn test_mask_from_name() {
        assert_eq!(Mask::from_name("CNPJ"), Some(Mask::Cnpj));
        assert_eq!(Mask::from_name("postal-code"), Some(Mask::Cep));
        assert_eq!(Mask::from_name("phone"), Some(Mask::Phone));
        assert_eq!(Mask::from_name("cpf"), None);
    }

    #[test]
    fn test_masked_input_typing() {
        let mut input = MaskedInput::new(Mask::Cep);
        for c in "0131a0-100".chars() {
            input.push(c);
        }
        assert_eq!(input.digits(), "01310100");
        assert_eq!(input.display(), "01310-100");
        assert!(input.is_full());

        // Full buffer stops accepting digits
        assert!(!input.push('9'));
        assert_eq!(input.digits(), "01310100");

        assert_eq!(input.pop(), Some('0'));
        assert_eq!(input.display(), "01310-10");
    }

    #[test]
    fn test_masked_input_with_value() {
        let input = MaskedInput::with_value(Mask::Phone, "(11) 98765-4321");
        assert_eq!(input.digits(), "11987654321");
        assert_eq!(input.mask(), Mask::Phone);
    }
}
