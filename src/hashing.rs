use sha2::{Digest, Sha256};

use crate::cache::{sha_hash_key, QueryCache};
use crate::error::AppResult;

/// Rounds used for user IDs and IP addresses.
pub const DEFAULT_HASH_TIMES: usize = 5000;

/// Applies `times` rounds of hex-encoded SHA-256. Zero rounds yields an
/// empty string.
pub fn get_hash(value: &str, times: usize) -> String {
    if times == 0 {
        return String::new();
    }

    let mut current = value.to_string();
    for _ in 0..times {
        current = format!("{:x}", Sha256::digest(current.as_bytes()));
    }
    current
}

/// The full [`DEFAULT_HASH_TIMES`] hash, memoised under the key of the first
/// round so repeated requests from one IP only pay for it once.
pub async fn hash_cached(cache: &QueryCache, value: &str) -> AppResult<String> {
    let first_round = get_hash(value, 1);
    let key = sha_hash_key(&first_round);

    cache
        .get_or_compute(&key, None, || async move { Ok(get_hash(&first_round, DEFAULT_HASH_TIMES - 1)) })
        .await
}

pub async fn hashed_ip(cache: &QueryCache, ip: &str, salt: &str) -> AppResult<String> {
    hash_cached(cache, &format!("{}{}", ip, salt)).await
}
