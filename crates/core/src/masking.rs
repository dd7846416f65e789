//! Masks sensitive fields before request/response bodies reach the logs.

use std::sync::LazyLock;

use regex::Regex;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("valid email regex")
});
static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{3}[-.]?\d{3}[-.]?\d{4}\b").expect("valid phone regex"));
static CARD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d{4}[\s-]?\d{4}[\s-]?\d{4}[\s-]?\d{4}\b").expect("valid card regex")
});
static CVV_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)"cvv"\s*:\s*"?\d{3,4}"?"#).expect("valid cvv regex"));
static PASSWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)"password"\s*:\s*"[^"]*""#).expect("valid password regex")
});

/// Mask emails, phone numbers, card numbers (keeping the last 4 digits),
/// CVVs and passwords in free-form text.
pub fn mask_sensitive(data: &str) -> String {
    if data.is_empty() {
        return String::new();
    }

    let data = EMAIL_RE.replace_all(data, |caps: &regex::Captures<'_>| mask_email(&caps[0]));
    let data = PHONE_RE.replace_all(&data, "***-***-****");
    let data = CARD_RE.replace_all(&data, |caps: &regex::Captures<'_>| mask_card(&caps[0]));
    let data = CVV_RE.replace_all(&data, r#""cvv":"***""#);
    let data = PASSWORD_RE.replace_all(&data, r#""password":"***""#);
    data.into_owned()
}

fn mask_email(email: &str) -> String {
    let Some((local, domain)) = email.split_once('@') else {
        return "***@***.com".to_string();
    };
    let masked_local = if local.len() > 2 {
        let mut chars = local.chars();
        let first = chars.next().unwrap_or('*');
        let last = local.chars().next_back().unwrap_or('*');
        format!("{first}***{last}")
    } else {
        "***".to_string()
    };
    format!("{masked_local}@{domain}")
}

fn mask_card(card: &str) -> String {
    let digits: String = card.chars().filter(|c| c.is_ascii_digit()).collect();
    let last4 = &digits[digits.len().saturating_sub(4)..];
    format!("****-****-****-{last4}")
}
