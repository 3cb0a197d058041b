use ring::hmac;

/// Signs `payload` with HMAC-SHA256 and returns the tag as lowercase hex.
pub fn sign(payload: &str, key: &[u8]) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    let tag = hmac::sign(&key, payload.as_bytes());
    hex::encode(tag.as_ref())
}

/// Constant-time check of a hex signature produced by [`sign`].
pub fn verify(payload: &str, signature: &str, key: &[u8]) -> bool {
    let Ok(tag) = hex::decode(signature.trim()) else {
        return false;
    };

    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    hmac::verify(&key, payload.as_bytes(), &tag).is_ok()
}
