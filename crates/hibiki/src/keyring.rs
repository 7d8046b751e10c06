//! Encryption key cache.
//!
//! Keys are 16-byte AES-128 secrets addressed by URI. The ring caches a
//! bounded number of them and guarantees a given URI is fetched at most
//! once no matter how many streams ask for it concurrently.

use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, KeyIvInit};
use bytes::Bytes;
use lru::LruCache;
use url::Url;

use crate::error::{HibikiError, HibikiResult};
use crate::http::{ChunkType, ConnectionManager};
use crate::logic::StreamId;

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

pub const KEY_LENGTH: usize = 16;
const KEYRING_CAPACITY: usize = 50;

pub type Key = Arc<[u8; KEY_LENGTH]>;

pub struct Keyring {
    keys: Mutex<LruCache<String, Key>>,
    // per-URI gates so concurrent misses collapse into one fetch
    inflight: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Default for Keyring {
    fn default() -> Self {
        Self {
            keys: Mutex::new(LruCache::new(
                NonZeroUsize::new(KEYRING_CAPACITY).unwrap_or(NonZeroUsize::MIN),
            )),
            inflight: Mutex::new(HashMap::new()),
        }
    }
}

impl Keyring {
    pub fn new() -> Self {
        Self::default()
    }

    fn keys(&self) -> MutexGuard<'_, LruCache<String, Key>> {
        self.keys.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn inflight(&self) -> MutexGuard<'_, HashMap<String, Arc<tokio::sync::Mutex<()>>>> {
        self.inflight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Key for `uri`, fetching through `fetch` on a miss. A cache hit
    /// refreshes the entry's recency; concurrent misses on the same URI
    /// run `fetch` once and share the result.
    pub async fn get<F, Fut>(&self, uri: &str, fetch: F) -> HibikiResult<Key>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = HibikiResult<Bytes>>,
    {
        if let Some(key) = self.keys().get(uri).cloned() {
            return Ok(key);
        }

        let gate = self
            .inflight()
            .entry(uri.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let _held = gate.lock().await;

        // the fetch racing us may have filled the cache while we waited
        if let Some(key) = self.keys().get(uri).cloned() {
            return Ok(key);
        }

        let result = async {
            let body = fetch().await?;
            if body.len() != KEY_LENGTH {
                return Err(HibikiError::InvalidKeyLength(body.len()));
            }
            let mut key = [0u8; KEY_LENGTH];
            key.copy_from_slice(&body);
            let key: Key = Arc::new(key);
            self.keys().put(uri.to_string(), key.clone());
            Ok(key)
        }
        .await;

        // only retire the gate once the key is cached; a failed fetch keeps
        // it so retries and late arrivals still serialize on the same lock
        if result.is_ok() {
            self.inflight().remove(uri);
        }
        result
    }

    /// Miss path backed by the connection manager's key queue.
    pub async fn get_key(
        &self,
        manager: &ConnectionManager,
        stream_id: StreamId,
        url: &Url,
    ) -> HibikiResult<Key> {
        self.get(url.as_str(), || async {
            let chunk = manager.make_source(url.clone(), stream_id, ChunkType::Key, None)?;
            manager.start(&chunk);
            chunk.read_all().await
        })
        .await
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.keys().contains(uri)
    }
}

/// AES-128-CBC with PKCS#7 padding, the whole segment as one message.
pub fn decrypt_aes128(data: &[u8], key: &[u8; KEY_LENGTH], iv: &[u8; 16]) -> HibikiResult<Vec<u8>> {
    Ok(Aes128CbcDec::new(key.into(), iv.into()).decrypt_padded_vec_mut::<Pkcs7>(data)?)
}

/// Parse a manifest IV attribute (hex, optionally `0x`-prefixed).
pub fn parse_iv(value: &str) -> HibikiResult<[u8; 16]> {
    let hex_str = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    let bytes = hex::decode(hex_str)?;
    bytes
        .try_into()
        .map_err(|_| HibikiError::InvalidHexKey(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use aes::cipher::BlockEncryptMut;

    type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;

    #[tokio::test]
    async fn test_concurrent_misses_fetch_once() {
        let ring = Arc::new(Keyring::new());
        let fetches = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let ring = ring.clone();
            let fetches = fetches.clone();
            handles.push(tokio::spawn(async move {
                ring.get("https://keys.example.com/k1", || async move {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                    Ok(Bytes::from_static(&[7u8; 16]))
                })
                .await
            }));
        }
        for handle in handles {
            let key = handle.await.unwrap().unwrap();
            assert_eq!(*key, [7u8; 16]);
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_later_callers_serialized() {
        use std::sync::atomic::AtomicBool;
        use std::time::Duration;

        let ring = Arc::new(Keyring::new());
        let active = Arc::new(AtomicUsize::new(0));
        let overlapped = Arc::new(AtomicBool::new(false));
        let calls = Arc::new(AtomicUsize::new(0));

        // the third caller arrives after the first fetch has already
        // failed, while the second caller's retry is still in flight
        let mut handles = Vec::new();
        for delay_ms in [0u64, 2, 25] {
            let ring = ring.clone();
            let active = active.clone();
            let overlapped = overlapped.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                ring.get("https://keys.example.com/flaky", || async move {
                    if active.fetch_add(1, Ordering::SeqCst) > 0 {
                        overlapped.store(true, Ordering::SeqCst);
                    }
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    let attempt = calls.fetch_add(1, Ordering::SeqCst);
                    active.fetch_sub(1, Ordering::SeqCst);
                    if attempt == 0 {
                        Err(HibikiError::Timeout)
                    } else {
                        Ok(Bytes::from_static(&[3u8; 16]))
                    }
                })
                .await
            }));
        }

        let mut failures = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(key) => assert_eq!(*key, [3u8; 16]),
                Err(HibikiError::Timeout) => failures += 1,
                Err(other) => panic!("unexpected {other}"),
            }
        }
        assert_eq!(failures, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!overlapped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_wrong_length_key_is_rejected_and_not_cached() {
        let ring = Keyring::new();
        let err = ring
            .get("https://keys.example.com/bad", || async {
                Ok(Bytes::from_static(b"short"))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, HibikiError::InvalidKeyLength(5)));
        assert!(!ring.contains("https://keys.example.com/bad"));
    }

    #[tokio::test]
    async fn test_capacity_evicts_least_recent() {
        let ring = Keyring::new();
        for i in 0..=KEYRING_CAPACITY {
            let uri = format!("https://keys.example.com/{i}");
            ring.get(&uri, || async { Ok(Bytes::from_static(&[1u8; 16])) })
                .await
                .unwrap();
        }
        // 51 inserts into a 50-entry ring: the first one is gone
        assert!(!ring.contains("https://keys.example.com/0"));
        assert!(ring.contains("https://keys.example.com/1"));
        assert!(ring.contains(&format!("https://keys.example.com/{KEYRING_CAPACITY}")));
    }

    #[test]
    fn test_parse_iv() {
        let iv = parse_iv("0x000102030405060708090a0b0c0d0e0f").unwrap();
        assert_eq!(iv[1], 0x01);
        assert_eq!(iv[15], 0x0f);
        assert!(parse_iv("0xdeadbeef").is_err());
        assert!(parse_iv("zzzz").is_err());
    }

    #[test]
    fn test_decrypt_roundtrip() {
        let key = [0x42u8; 16];
        let iv = [0x24u8; 16];
        let plaintext = b"attack at dawn";
        let ciphertext = Aes128CbcEnc::new(&key.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        let decrypted = decrypt_aes128(&ciphertext, &key, &iv).unwrap();
        assert_eq!(decrypted, plaintext);

        // tampered padding fails
        let mut broken = ciphertext.clone();
        let last = broken.len() - 1;
        broken[last] ^= 0xff;
        assert!(decrypt_aes128(&broken, &key, &iv).is_err());
    }
}
