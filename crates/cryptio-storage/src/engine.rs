//! Authenticated encryption and the standalone hash/sign/verify primitives.
//!
//! Text arguments are run through [`codec::encode`] before they reach the
//! provider, so signatures cover the exact UTF-8 bytes of the plaintext.

use std::sync::Arc;

use cryptio_core::{codec, CryptioError};

use crate::{
    key_manager::KeyMaterial,
    provider::{CryptoProvider, Hashing, IV_LEN},
};

/// Output of [`CryptoEngine::encrypt`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub iv: [u8; IV_LEN],
    pub ciphertext: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct CryptoEngine {
    provider: Arc<dyn CryptoProvider>,
    hashing: Hashing,
}

impl CryptoEngine {
    pub fn new(provider: Arc<dyn CryptoProvider>, hashing: Hashing) -> Self {
        Self { provider, hashing }
    }

    pub fn hashing(&self) -> Hashing {
        self.hashing
    }

    pub async fn hash(&self, data: &str) -> Result<Vec<u8>, CryptioError> {
        let bytes = codec::encode(data)?;
        self.provider
            .digest(self.hashing, &bytes)
            .await
            .map_err(|e| CryptioError::Hash {
                reason: e.to_string(),
            })
    }

    /// Fresh random nonce on every call.
    pub fn iv(&self) -> Result<[u8; IV_LEN], CryptioError> {
        let mut iv = [0u8; IV_LEN];
        self.provider
            .fill_random(&mut iv)
            .map_err(|e| CryptioError::Encrypt {
                reason: e.to_string(),
            })?;
        Ok(iv)
    }

    pub async fn sign(&self, keys: &KeyMaterial, data: &str) -> Result<Vec<u8>, CryptioError> {
        let bytes = codec::encode(data)?;
        self.provider
            .sign(keys.signing_key(), &bytes)
            .await
            .map_err(|e| CryptioError::Sign {
                reason: e.to_string(),
            })
    }

    /// `Ok(false)` on mismatch; `Err` only when the check itself cannot run.
    pub async fn verify(
        &self,
        keys: &KeyMaterial,
        signature: &[u8],
        data: &str,
    ) -> Result<bool, CryptioError> {
        let bytes = codec::encode(data)?;
        self.provider
            .verify(keys.signing_key(), signature, &bytes)
            .await
            .map_err(|e| CryptioError::Verify {
                reason: e.to_string(),
            })
    }

    pub async fn encrypt(&self, keys: &KeyMaterial, plaintext: &[u8]) -> Result<Sealed, CryptioError> {
        let iv = self.iv()?;
        let ciphertext = self
            .provider
            .encrypt(keys.encryption_key(), &iv, plaintext)
            .await
            .map_err(|e| CryptioError::Encrypt {
                reason: e.to_string(),
            })?;
        Ok(Sealed { iv, ciphertext })
    }

    pub async fn decrypt(
        &self,
        keys: &KeyMaterial,
        iv: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, CryptioError> {
        self.provider
            .decrypt(keys.encryption_key(), iv, ciphertext)
            .await
            .map_err(|e| CryptioError::Decrypt {
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use cryptio_core::config::Options;

    use super::*;
    use crate::{
        key_manager::{KeyManager, StaticFingerprint},
        provider::{KeySpec, ProviderError, RustCryptoProvider, SecretKey},
    };

    async fn keys(passphrase: &str) -> KeyMaterial {
        let settings = Options {
            passphrase: Some(passphrase.into()),
            ..Options::default()
        }
        .resolve()
        .expect("resolve");
        KeyManager::new(
            Arc::new(RustCryptoProvider),
            Arc::new(StaticFingerprint::default()),
        )
        .derive_or_generate(&settings)
        .await
        .expect("keys")
    }

    fn engine() -> CryptoEngine {
        CryptoEngine::new(Arc::new(RustCryptoProvider), Hashing::Sha512)
    }

    #[tokio::test]
    async fn hash_covers_utf8_bytes() {
        let digest = engine().hash("😀").await.expect("hash");
        let expected = RustCryptoProvider
            .digest(Hashing::Sha512, &[0xF0, 0x9F, 0x98, 0x80])
            .await
            .expect("digest");
        assert_eq!(digest, expected);
    }

    #[test]
    fn iv_is_fresh_each_call() {
        let engine = engine();
        let first = engine.iv().expect("iv");
        let second = engine.iv().expect("iv");
        assert_eq!(first.len(), 12);
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn sign_then_verify() {
        let keys = keys("p@ss").await;
        let engine = engine();
        let signature = engine.sign(&keys, r#"{"id":7}"#).await.expect("sign");

        assert_eq!(signature.len(), 64);
        assert!(engine.verify(&keys, &signature, r#"{"id":7}"#).await.unwrap());
        assert!(!engine.verify(&keys, &signature, r#"{"id":8}"#).await.unwrap());
    }

    #[tokio::test]
    async fn signatures_do_not_verify_under_another_passphrase() {
        let engine = engine();
        let signature = engine.sign(&keys("one").await, "data").await.unwrap();
        assert!(!engine
            .verify(&keys("two").await, &signature, "data")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn encrypt_uses_fresh_iv_per_call() {
        let keys = keys("p@ss").await;
        let engine = engine();
        let first = engine.encrypt(&keys, b"same").await.expect("encrypt");
        let second = engine.encrypt(&keys, b"same").await.expect("encrypt");

        assert_ne!(first.iv, second.iv);
        assert_ne!(first.ciphertext, second.ciphertext);

        let plaintext = engine
            .decrypt(&keys, &second.iv, &second.ciphertext)
            .await
            .expect("decrypt");
        assert_eq!(plaintext, b"same");
    }

    #[tokio::test]
    async fn decrypt_with_wrong_iv_fails() {
        let keys = keys("p@ss").await;
        let engine = engine();
        let sealed = engine.encrypt(&keys, b"payload").await.expect("encrypt");

        let mut iv = sealed.iv;
        iv[0] ^= 0xFF;
        let err = engine
            .decrypt(&keys, &iv, &sealed.ciphertext)
            .await
            .expect_err("wrong iv");
        assert!(matches!(err, CryptioError::Decrypt { .. }));
    }

    #[derive(Debug)]
    struct BrokenProvider;

    #[async_trait]
    impl CryptoProvider for BrokenProvider {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn fill_random(&self, _buf: &mut [u8]) -> Result<(), ProviderError> {
            Err(broken())
        }

        async fn digest(&self, _: Hashing, _: &[u8]) -> Result<Vec<u8>, ProviderError> {
            Err(broken())
        }

        async fn generate_key(&self, _: KeySpec) -> Result<SecretKey, ProviderError> {
            Err(broken())
        }

        async fn derive_key(
            &self,
            _: KeySpec,
            _: Hashing,
            _: &[u8],
            _: &[u8],
            _: &[u8],
        ) -> Result<SecretKey, ProviderError> {
            Err(broken())
        }

        async fn sign(&self, _: &SecretKey, _: &[u8]) -> Result<Vec<u8>, ProviderError> {
            Err(broken())
        }

        async fn verify(&self, _: &SecretKey, _: &[u8], _: &[u8]) -> Result<bool, ProviderError> {
            Err(broken())
        }

        async fn encrypt(&self, _: &SecretKey, _: &[u8], _: &[u8]) -> Result<Vec<u8>, ProviderError> {
            Err(broken())
        }

        async fn decrypt(&self, _: &SecretKey, _: &[u8], _: &[u8]) -> Result<Vec<u8>, ProviderError> {
            Err(broken())
        }
    }

    fn broken() -> ProviderError {
        ProviderError::Operation {
            reason: "engine offline".to_string(),
        }
    }

    #[tokio::test]
    async fn provider_failures_map_to_operation_errors() {
        let keys = keys("p@ss").await;
        let engine = CryptoEngine::new(Arc::new(BrokenProvider), Hashing::Sha512);

        assert!(matches!(engine.hash("x").await, Err(CryptioError::Hash { .. })));
        assert!(matches!(engine.iv(), Err(CryptioError::Encrypt { .. })));
        assert!(matches!(
            engine.sign(&keys, "x").await,
            Err(CryptioError::Sign { .. })
        ));
        assert!(matches!(
            engine.verify(&keys, b"sig", "x").await,
            Err(CryptioError::Verify { .. })
        ));
        assert!(matches!(
            engine.encrypt(&keys, b"x").await,
            Err(CryptioError::Encrypt { .. })
        ));
        assert!(matches!(
            engine.decrypt(&keys, &[0u8; IV_LEN], b"x").await,
            Err(CryptioError::Decrypt { .. })
        ));
    }
}
