//! 邀请码 / 组织者口令生成
//!
//! 每一位独立地从 `[A-Z0-9]` 中均匀抽取，不检查与已有活动的冲突。

use rand::Rng;

pub const CODE_ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub const EVENT_CODE_LEN: usize = 6;
pub const ORGANIZER_CODE_LEN: usize = 8;

/// 用给定随机源生成指定长度的口令
pub fn generate_code_with<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// 生成 6 位公开邀请码
pub fn generate_event_code() -> String {
    generate_code_with(&mut rand::thread_rng(), EVENT_CODE_LEN)
}

/// 生成 8 位组织者口令
pub fn generate_organizer_code() -> String {
    generate_code_with(&mut rand::thread_rng(), ORGANIZER_CODE_LEN)
}
