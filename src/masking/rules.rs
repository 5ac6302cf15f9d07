// Per-category masking rules and the detectors that pick a category
use once_cell::sync::Lazy;
use regex::{Captures, Regex, Replacer};
use std::borrow::Cow;

use crate::types::MaskLevel;

pub const SSN_MASK: &str = "XXX-XX-XXXX";
pub const ADDRESS_MASK: &str = "[Address Masked]";
const STRICT_EMAIL_MASK: &str = "***@***.***";
const FULL_PHONE_MASK: &str = "***-***-****";

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("email pattern")
});
static EMBEDDED_EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("email pattern")
});
static EMBEDDED_PHONE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{3}[-.]?\d{3}[-.]?\d{4}\b").expect("phone pattern"));
static EMBEDDED_SSN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").expect("ssn pattern"));

const TEXT_BLOB_KEYS: [&str; 6] = [
    "raw_text_preview",
    "document_text",
    "extracted_text",
    "full_text",
    "merged_text",
    "text",
];

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SensitiveKind {
    Name,
    Email,
    Phone,
    Address,
    Account,
    Identifier,
    Ssn,
}

/// Category implied by a field name. `owner` is the key holding the enclosing object.
pub fn classify_key(key: &str, owner: Option<&str>, level: MaskLevel) -> Option<SensitiveKind> {
    match key {
        "borrower_name" => Some(SensitiveKind::Name),
        "name" if matches!(owner, Some("co_signer" | "co_signers")) => Some(SensitiveKind::Name),
        "address" | "borrower_address" => Some(SensitiveKind::Address),
        "ssn" | "social_security_number" => Some(SensitiveKind::Ssn),
        "id_number" | "driver_license" => Some(SensitiveKind::Identifier),
        "account_number" | "bank_account" | "loan_account_number" if level == MaskLevel::Strict => {
            Some(SensitiveKind::Account)
        }
        _ => None,
    }
}

/// Contact lists are masked element-wise whatever the elements look like.
pub fn contact_list_kind(key: &str) -> Option<SensitiveKind> {
    match key {
        "emails" => Some(SensitiveKind::Email),
        "phone_numbers" => Some(SensitiveKind::Phone),
        _ => None,
    }
}

/// Category implied by the value of an otherwise unremarkable string leaf.
pub fn classify_content(value: &str) -> Option<SensitiveKind> {
    if is_email(value) {
        Some(SensitiveKind::Email)
    } else if is_phone(value) {
        Some(SensitiveKind::Phone)
    } else {
        None
    }
}

pub fn is_text_blob(key: &str) -> bool {
    TEXT_BLOB_KEYS.contains(&key) || key.ends_with("_text")
}

pub fn is_email(value: &str) -> bool {
    EMAIL.is_match(value)
}

/// Only phone punctuation around 10 to 15 digits.
pub fn is_phone(value: &str) -> bool {
    let phone_chars = value
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '+' | '-' | '(' | ')' | '.'));
    let digits = value.chars().filter(char::is_ascii_digit).count();
    phone_chars && (10..=15).contains(&digits)
}

pub fn apply(kind: SensitiveKind, value: &str, level: MaskLevel) -> String {
    match kind {
        SensitiveKind::Name => mask_name(value, level),
        SensitiveKind::Email => mask_email(value, level),
        SensitiveKind::Phone => mask_phone(value, level),
        SensitiveKind::Address => mask_address(value, level),
        SensitiveKind::Account | SensitiveKind::Identifier => mask_identifier(value, level),
        SensitiveKind::Ssn => SSN_MASK.to_string(),
    }
}

fn stars(count: usize) -> String {
    "*".repeat(count)
}

pub fn mask_name(name: &str, level: MaskLevel) -> String {
    match level {
        MaskLevel::Minimal => {
            let mut tokens = name.split_whitespace();
            let Some(first) = tokens.next() else {
                return name.to_string();
            };
            let mut masked = first.to_string();
            for token in tokens {
                masked.push(' ');
                masked.push_str(&stars(token.chars().count()));
            }
            masked
        }
        MaskLevel::Standard => {
            let trimmed = name.trim();
            let mut chars = trimmed.chars();
            match chars.next() {
                Some(first) => format!("{}{}", first, stars(chars.count())),
                None => name.to_string(),
            }
        }
        MaskLevel::Strict => stars(name.chars().count()),
    }
}

pub fn mask_email(email: &str, level: MaskLevel) -> String {
    let Some((local, domain)) = email.split_once('@') else {
        return email.to_string();
    };
    match level {
        MaskLevel::Minimal => {
            let local_len = local.chars().count();
            let masked_local = if local_len > 2 {
                let head: String = local.chars().take(2).collect();
                format!("{}{}", head, stars(local_len - 2))
            } else {
                stars(2)
            };
            format!("{}@{}", masked_local, domain)
        }
        MaskLevel::Standard => {
            let mut local_chars = local.chars();
            let masked_local = match local_chars.next() {
                Some(first) => format!("{}{}", first, stars(local_chars.count())),
                None => stars(1),
            };
            let masked_domain = match domain.split_once('.') {
                Some((label, rest)) => format!("{}.{}", stars(label.chars().count()), rest),
                None => stars(domain.chars().count()),
            };
            format!("{}@{}", masked_local, masked_domain)
        }
        MaskLevel::Strict => STRICT_EMAIL_MASK.to_string(),
    }
}

pub fn mask_phone(phone: &str, level: MaskLevel) -> String {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    match level {
        MaskLevel::Minimal if digits.len() >= 4 => format!("***-***-{}", &digits[digits.len() - 4..]),
        MaskLevel::Minimal => "***-****".to_string(),
        // Area code sits just before the last seven digits, after any country code.
        MaskLevel::Standard if digits.len() >= 10 => {
            let area = digits.len() - 10;
            format!("({}) ***-****", &digits[area..area + 3])
        }
        MaskLevel::Standard | MaskLevel::Strict => FULL_PHONE_MASK.to_string(),
    }
}

pub fn mask_address(address: &str, level: MaskLevel) -> String {
    let segments: Vec<&str> = address.split(',').map(str::trim).collect();
    match level {
        MaskLevel::Minimal if segments.len() > 1 => {
            format!("*** {}", segments[segments.len() - 2..].join(", "))
        }
        MaskLevel::Minimal => format!("*** {}", ADDRESS_MASK),
        MaskLevel::Standard => match segments.last() {
            Some(last) if !last.is_empty() => format!("*** {}", last),
            _ => ADDRESS_MASK.to_string(),
        },
        MaskLevel::Strict => ADDRESS_MASK.to_string(),
    }
}

/// Account numbers and identity documents.
pub fn mask_identifier(value: &str, level: MaskLevel) -> String {
    let digits: String = value.chars().filter(char::is_ascii_digit).collect();
    if level == MaskLevel::Minimal && digits.len() >= 4 {
        return format!("****{}", &digits[digits.len() - 4..]);
    }
    stars(value.chars().count())
}

/// Substitute emails, then phone numbers, then SSNs embedded in free text.
pub fn mask_text_blob(text: &str, level: MaskLevel) -> Cow<'_, str> {
    let masked = substitute(Cow::Borrowed(text), &EMBEDDED_EMAIL, |caps: &Captures| {
        mask_email(&caps[0], level)
    });
    let masked = substitute(masked, &EMBEDDED_PHONE, |caps: &Captures| {
        mask_phone(&caps[0], level)
    });
    substitute(masked, &EMBEDDED_SSN, SSN_MASK)
}

fn substitute<'t>(text: Cow<'t, str>, pattern: &Regex, replacement: impl Replacer) -> Cow<'t, str> {
    let replaced = match pattern.replace_all(&text, replacement) {
        Cow::Borrowed(_) => None,
        Cow::Owned(owned) => Some(owned),
    };
    replaced.map_or(text, Cow::Owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(MaskLevel::Minimal, "Jane Marie Smith", "Jane ***** *****")]
    #[case(MaskLevel::Minimal, "Cher", "Cher")]
    #[case(MaskLevel::Standard, "Jane Smith", "J*********")]
    #[case(MaskLevel::Strict, "Jane Smith", "**********")]
    fn names(#[case] level: MaskLevel, #[case] input: &str, #[case] expected: &str) {
        assert_eq!(mask_name(input, level), expected);
    }

    #[rstest]
    #[case(MaskLevel::Minimal, "john.doe@example.com", "jo******@example.com")]
    #[case(MaskLevel::Minimal, "jo@example.com", "**@example.com")]
    #[case(MaskLevel::Standard, "john.doe@example.com", "j*******@*******.com")]
    #[case(MaskLevel::Standard, "a@mail.bank.co.uk", "a@****.bank.co.uk")]
    #[case(MaskLevel::Strict, "john.doe@example.com", "***@***.***")]
    fn emails(#[case] level: MaskLevel, #[case] input: &str, #[case] expected: &str) {
        assert_eq!(mask_email(input, level), expected);
    }

    #[rstest]
    #[case(MaskLevel::Minimal, "(555) 123-4567", "***-***-4567")]
    #[case(MaskLevel::Minimal, "12", "***-****")]
    #[case(MaskLevel::Standard, "555.123.4567", "(555) ***-****")]
    #[case(MaskLevel::Standard, "+1 555 123 4567", "(555) ***-****")]
    #[case(MaskLevel::Standard, "123-4567", "***-***-****")]
    #[case(MaskLevel::Strict, "555-123-4567", "***-***-****")]
    fn phones(#[case] level: MaskLevel, #[case] input: &str, #[case] expected: &str) {
        assert_eq!(mask_phone(input, level), expected);
    }

    #[rstest]
    #[case(MaskLevel::Minimal, "12 Oak St, Springfield, IL", "*** Springfield, IL")]
    #[case(MaskLevel::Minimal, "12 Oak St", "*** [Address Masked]")]
    #[case(MaskLevel::Standard, "12 Oak St, Springfield, IL", "*** IL")]
    #[case(MaskLevel::Strict, "12 Oak St, Springfield, IL", "[Address Masked]")]
    fn addresses(#[case] level: MaskLevel, #[case] input: &str, #[case] expected: &str) {
        assert_eq!(mask_address(input, level), expected);
    }

    #[rstest]
    #[case(MaskLevel::Minimal, "ACC-99887766", "****7766")]
    #[case(MaskLevel::Minimal, "D12", "***")]
    #[case(MaskLevel::Standard, "ACC-99887766", "************")]
    #[case(MaskLevel::Strict, "D1234567", "********")]
    fn identifiers(#[case] level: MaskLevel, #[case] input: &str, #[case] expected: &str) {
        assert_eq!(mask_identifier(input, level), expected);
    }

    #[test]
    fn ssn_is_masked_the_same_at_every_level() {
        for level in [MaskLevel::Minimal, MaskLevel::Standard, MaskLevel::Strict] {
            assert_eq!(apply(SensitiveKind::Ssn, "123-45-6789", level), SSN_MASK);
        }
    }

    #[test]
    fn account_keys_only_count_under_strict() {
        assert_eq!(classify_key("account_number", None, MaskLevel::Standard), None);
        assert_eq!(
            classify_key("bank_account", None, MaskLevel::Strict),
            Some(SensitiveKind::Account)
        );
        assert_eq!(classify_key("name", None, MaskLevel::Strict), None);
        assert_eq!(
            classify_key("name", Some("co_signers"), MaskLevel::Minimal),
            Some(SensitiveKind::Name)
        );
    }

    #[test]
    fn content_detection() {
        assert_eq!(classify_content("jane@lender.com"), Some(SensitiveKind::Email));
        assert_eq!(classify_content("+1 (555) 123-4567"), Some(SensitiveKind::Phone));
        assert_eq!(classify_content("Invoice 5551234567"), None);
        assert_eq!(classify_content("123-4567"), None);
        assert_eq!(classify_content("2026-10-19T08:00:00Z"), None);
    }

    #[test]
    fn text_blobs_hide_embedded_contacts() {
        let text = "Call 555-123-4567 or write jane@lender.com; SSN 123-45-6789.";
        assert_eq!(
            mask_text_blob(text, MaskLevel::Standard),
            "Call (555) ***-**** or write j***@******.com; SSN XXX-XX-XXXX."
        );
        assert!(matches!(mask_text_blob("nothing here", MaskLevel::Strict), Cow::Borrowed(_)));
        assert!(is_text_blob("doc_ocr_text"));
        assert!(!is_text_blob("texture"));
    }
}
