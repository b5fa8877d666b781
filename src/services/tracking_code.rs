//! Códigos de seguimiento
//!
//! Formato `REQ-YYYYMMDD-XXXXXXXX`: fecha UTC de envío y ocho símbolos
//! aleatorios de un alfabeto de 32 sin caracteres ambiguos (0/O/1/I).

use chrono::{DateTime, Utc};
use rand::Rng;

pub const TRACKING_PREFIX: &str = "REQ";
pub const TRACKING_ALPHABET: &[u8; 32] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";
pub const TRACKING_RANDOM_LEN: usize = 8;

/// Genera un código para la fecha dada
pub fn generate_tracking_code<R: Rng + ?Sized>(rng: &mut R, at: DateTime<Utc>) -> String {
    let suffix: String = (0..TRACKING_RANDOM_LEN)
        .map(|_| TRACKING_ALPHABET[rng.gen_range(0..TRACKING_ALPHABET.len())] as char)
        .collect();
    format!("{}-{}-{}", TRACKING_PREFIX, at.format("%Y%m%d"), suffix)
}
