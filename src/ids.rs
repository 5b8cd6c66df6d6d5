use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Generates a server-side session identifier.
///
/// Returns a 43-character URL-safe string (32 random bytes → base64url).
#[must_use]
pub fn generate_session_id() -> String {
    let random_bytes: [u8; 32] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(random_bytes)
}

/// Generates a one-time state value for the authorization round trip.
///
/// Returns a 22-character URL-safe string (16 random bytes → base64url).
#[must_use]
pub fn generate_state() -> String {
    let random_bytes: [u8; 16] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(random_bytes)
}

/// Browser-local session correlator: `sess_<base36 ms timestamp><7 base36 chars>`.
#[must_use]
pub fn generate_local_session_id(now_ms: i64) -> String {
    format!("sess_{}{}", to_base36(now_ms.max(0) as u64), random_base36(7))
}

/// Click id minted locally when a referral parameter carries none.
#[must_use]
pub fn generate_click_id(now_ms: i64) -> String {
    format!("clk_{}{}", to_base36(now_ms.max(0) as u64), random_base36(9))
}

fn to_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".into();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(BASE36[(n % 36) as usize]);
        n /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}

fn random_base36(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| BASE36[rng.random_range(0..36)] as char)
        .collect()
}
