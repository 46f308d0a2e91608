//! Kenyan MSISDN handling for M-PESA.
use std::sync::LazyLock;

static MSISDN_REGEX: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^254[17]\d{8}$").expect("MSISDN regex invalid"));

/// A Safaricom-routable phone number in `254XXXXXXXXX` form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Normalise a user supplied number. Accepts `07…`/`01…`, `+254…` and
    /// `254…` forms, ignoring spaces and dashes.
    pub fn normalize(raw: &str) -> Option<Self> {
        let digits: String = raw
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .collect();
        let digits = digits.strip_prefix('+').unwrap_or(&digits);
        let normalized = match digits.strip_prefix('0') {
            Some(rest) => format!("254{rest}"),
            None => digits.to_owned(),
        };
        MSISDN_REGEX
            .is_match(&normalized)
            .then_some(Self(normalized))
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<PhoneNumber> for String {
    fn from(phone: PhoneNumber) -> Self {
        phone.0
    }
}
