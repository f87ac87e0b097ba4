// service/referral_code.rs
use rand::{distr::Alphanumeric, Rng};

pub const REFERRAL_CODE_LEN: usize = 8;

pub fn generate_referral_code() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(REFERRAL_CODE_LEN)
        .map(char::from)
        .collect::<String>()
        .to_uppercase()
}

/// Codes are case-insensitive for users typing them in.
pub fn normalize_referral_code(raw: &str) -> Option<String> {
    let code = raw.trim().to_uppercase();
    if code.is_empty() || code.len() > 32 || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(code)
}

pub fn referral_link(app_url: &str, code: &str) -> String {
    format!("{}/?ref={}", app_url.trim_end_matches('/'), code)
}
