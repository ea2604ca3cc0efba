//! HMAC-SHA256 message signing.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{WireError, WireResult};

type HmacSha256 = Hmac<Sha256>;

/// Signs and verifies the JSON frames of a message.
///
/// A signer built from an empty key is a no-op: it produces empty signatures
/// and accepts anything, matching kernels started with signing disabled.
#[derive(Clone)]
pub struct Signer {
    key: Option<Vec<u8>>,
}

impl Signer {
    pub fn new(key: impl AsRef<[u8]>) -> Self {
        let key = key.as_ref();
        Self {
            key: (!key.is_empty()).then(|| key.to_vec()),
        }
    }

    /// A signer that neither signs nor verifies.
    pub fn unsigned() -> Self {
        Self { key: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.key.is_some()
    }

    /// Returns the lowercase hex signature over `parts`.
    pub fn sign(&self, parts: &[&[u8]]) -> WireResult<String> {
        match self.mac(parts)? {
            Some(mac) => Ok(hex::encode(mac.finalize().into_bytes())),
            None => Ok(String::new()),
        }
    }

    /// Checks `signature` against `parts` in constant time.
    pub fn verify(&self, signature: &[u8], parts: &[&[u8]]) -> WireResult<()> {
        let Some(mac) = self.mac(parts)? else {
            return Ok(());
        };
        let expected = hex::decode(signature).map_err(|_| WireError::InvalidSignature)?;
        mac.verify_slice(&expected)
            .map_err(|_| WireError::InvalidSignature)
    }

    fn mac(&self, parts: &[&[u8]]) -> WireResult<Option<HmacSha256>> {
        let Some(key) = &self.key else {
            return Ok(None);
        };
        let mut mac =
            HmacSha256::new_from_slice(key).map_err(|e| WireError::InvalidKey(e.to_string()))?;
        for part in parts {
            mac.update(part);
        }
        Ok(Some(mac))
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the key.
        f.debug_struct("Signer")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_vector() {
        // RFC 4231 test case 2.
        let signer = Signer::new("Jefe");
        let sig = signer
            .sign(&[b"what do ya want ", b"for nothing?"])
            .unwrap();
        assert_eq!(
            sig,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_unsigned_accepts_anything() {
        let signer = Signer::unsigned();
        assert!(!signer.is_enabled());
        assert_eq!(signer.sign(&[b"x"]).unwrap(), "");
        assert!(signer.verify(b"garbage", &[b"x"]).is_ok());
    }

    #[test]
    fn test_empty_key_means_unsigned() {
        assert!(!Signer::new("").is_enabled());
    }

    #[test]
    fn test_rejects_non_hex_signature() {
        let signer = Signer::new("k");
        assert!(matches!(
            signer.verify(b"not-hex", &[b"x"]),
            Err(WireError::InvalidSignature)
        ));
    }

    #[test]
    fn test_debug_hides_key() {
        let rendered = format!("{:?}", Signer::new("super-secret"));
        assert!(!rendered.contains("super-secret"));
    }

    proptest! {
        /// Property: a signature verifies against the parts it was made from
        #[test]
        fn prop_sign_then_verify(
            key in proptest::collection::vec(any::<u8>(), 1..64),
            a in proptest::collection::vec(any::<u8>(), 0..128),
            b in proptest::collection::vec(any::<u8>(), 0..128),
        ) {
            let signer = Signer::new(&key);
            let sig = signer.sign(&[&a, &b]).unwrap();
            prop_assert!(signer.verify(sig.as_bytes(), &[&a, &b]).is_ok());
        }

        /// Property: flipping any byte of the body invalidates the signature
        #[test]
        fn prop_tampered_body_fails(
            body in proptest::collection::vec(any::<u8>(), 1..128),
            idx in any::<prop::sample::Index>(),
        ) {
            let signer = Signer::new("key");
            let sig = signer.sign(&[&body]).unwrap();
            let mut tampered = body.clone();
            let i = idx.index(tampered.len());
            tampered[i] ^= 0xff;
            prop_assert!(signer.verify(sig.as_bytes(), &[&tampered]).is_err());
        }
    }
}
