//! Device parameter store
//!
//! Owns the persisted viewer calibration bytes and exposes change detection
//! through a generation counter. Bytes leave the store only as immutable
//! snapshots; a save replaces them wholesale.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use log::{info, warn};
use parking_lot::{Mutex, RwLock};
use url::Url;

use crate::error::{CardboardError, Result};
use crate::viewer;

/// Short link that stands for the original Cardboard viewer
pub const CARDBOARD_V1_URL: &str = "https://g.co/cardboard";
/// Prefix of a calibration URL carrying encoded device params in `p`
pub const DEVICE_PARAMS_URL_PREFIX: &str = "https://google.com/cardboard/cfg?p=";

// URL-safe alphabet, padding optional on input
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Where the current device params came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamSource {
    /// Built-in Cardboard v1 profile
    Default,
    /// Saved from a calibration URL (QR scan)
    Scanned,
    /// Assigned explicitly, or restored from storage
    Explicit,
}

/// Immutable snapshot of a viewer calibration profile
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceParameters {
    bytes: Arc<[u8]>,
    source: ParamSource,
}

impl DeviceParameters {
    pub fn new(bytes: &[u8], source: ParamSource) -> Self {
        Self {
            bytes: Arc::from(bytes),
            source,
        }
    }

    /// The built-in profile
    pub fn default_profile() -> Self {
        Self::new(&viewer::cardboard_v1_device_params(), ParamSource::Default)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn source(&self) -> ParamSource {
        self.source
    }

    /// URL-safe base64 form exposed to callers
    pub fn encoded(&self) -> String {
        encode_device_params(&self.bytes)
    }
}

/// Base64 with the URL-safe alphabet (`-` for `+`, `_` for `/`)
pub fn encode_device_params(bytes: &[u8]) -> String {
    base64::engine::general_purpose::URL_SAFE.encode(bytes)
}

/// Decode URL-safe base64. Standard-alphabet input is accepted too.
pub fn decode_device_params(encoded: &str) -> Result<Vec<u8>> {
    // Form decoding turns '+' into ' ', so spaces are payload, not padding
    let normalized: String = encoded
        .trim_matches(|c: char| matches!(c, '\n' | '\r' | '\t'))
        .chars()
        .map(|c| match c {
            '+' | ' ' => '-',
            '/' => '_',
            other => other,
        })
        .collect();
    URL_SAFE_LENIENT
        .decode(normalized)
        .map_err(|e| CardboardError::InvalidParameterEncoding(format!("bad base64: {e}")))
}

/// Calibration URL for encoded params. Empty means the Cardboard v1 short link.
pub fn device_params_url(encoded: &str) -> String {
    if encoded.is_empty() {
        CARDBOARD_V1_URL.to_string()
    } else {
        format!("{DEVICE_PARAMS_URL_PREFIX}{encoded}")
    }
}

/// Decoded content of a calibration URL
#[derive(Clone, Debug, PartialEq)]
pub enum ViewerUri {
    /// The g.co/cardboard short link
    CardboardV1,
    /// Raw device-params bytes from the `p` query parameter
    Params(Vec<u8>),
}

/// Parse a viewer calibration URL.
pub fn parse_viewer_uri(uri: &str) -> Result<ViewerUri> {
    let url = Url::parse(uri.trim())
        .map_err(|e| CardboardError::InvalidParameterEncoding(format!("{uri}: {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(CardboardError::InvalidParameterEncoding(format!(
            "unsupported scheme '{}'",
            url.scheme()
        )));
    }

    let host = url.host_str().unwrap_or_default();
    let path = url.path().trim_end_matches('/');
    match (host, path) {
        ("g.co", "/cardboard") => Ok(ViewerUri::CardboardV1),
        ("google.com" | "www.google.com", "/cardboard/cfg") => {
            let encoded = url
                .query_pairs()
                .find(|(key, _)| key == "p")
                .map(|(_, value)| value.into_owned())
                .ok_or_else(|| {
                    CardboardError::InvalidParameterEncoding("missing 'p' parameter".to_string())
                })?;
            let bytes = decode_device_params(&encoded)?;
            if bytes.is_empty() {
                return Err(CardboardError::InvalidParameterEncoding(
                    "empty 'p' parameter".to_string(),
                ));
            }
            Ok(ViewerUri::Params(bytes))
        }
        _ => Err(CardboardError::InvalidParameterEncoding(format!(
            "not a Cardboard viewer URL: {uri}"
        ))),
    }
}

/// Persistence capability for device-params bytes
pub trait ParamStorage: Send + Sync {
    /// Saved bytes, `None` if nothing was ever saved
    fn load(&self) -> Result<Option<Vec<u8>>>;
    fn store(&self, bytes: &[u8]) -> Result<()>;
}

/// Device params kept in a single file
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ParamStorage for FileStorage {
    fn load(&self) -> Result<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn store(&self, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        // Write-then-rename so a reader never sees half a profile
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Non-persistent storage, for hosts without a writable location and for tests
#[derive(Default)]
pub struct MemoryStorage {
    bytes: Mutex<Option<Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bytes(bytes: &[u8]) -> Self {
        Self {
            bytes: Mutex::new(Some(bytes.to_vec())),
        }
    }
}

impl ParamStorage for MemoryStorage {
    fn load(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.bytes.lock().clone())
    }

    fn store(&self, bytes: &[u8]) -> Result<()> {
        *self.bytes.lock() = Some(bytes.to_vec());
        Ok(())
    }
}

/// Authoritative owner of the device-params bytes
pub struct DeviceParameterStore {
    storage: Box<dyn ParamStorage>,
    current: RwLock<DeviceParameters>,
    generation: AtomicU64,
}

impl DeviceParameterStore {
    /// Open the store, restoring whatever the storage already holds.
    pub fn open(storage: Box<dyn ParamStorage>) -> Result<Self> {
        let saved = storage.load()?.unwrap_or_default();
        info!("Device params store opened ({} saved bytes)", saved.len());
        Ok(Self {
            storage,
            current: RwLock::new(DeviceParameters::new(&saved, ParamSource::Explicit)),
            generation: AtomicU64::new(0),
        })
    }

    /// Store backed by [`MemoryStorage`]
    pub fn in_memory() -> Self {
        Self {
            storage: Box::new(MemoryStorage::new()),
            current: RwLock::new(DeviceParameters::new(&[], ParamSource::Explicit)),
            generation: AtomicU64::new(0),
        }
    }

    /// Currently persisted params. Empty if none were saved.
    pub fn saved_parameters(&self) -> DeviceParameters {
        self.current.read().clone()
    }

    /// Saved params, or the built-in profile when nothing is saved
    pub fn effective_parameters(&self) -> DeviceParameters {
        let saved = self.saved_parameters();
        if saved.is_empty() {
            DeviceParameters::default_profile()
        } else {
            saved
        }
    }

    /// Built-in, parameter-free default profile bytes
    pub fn default_profile() -> Vec<u8> {
        viewer::cardboard_v1_device_params()
    }

    /// Replace the persisted bytes.
    ///
    /// Saving the bytes already held is a no-op and does not advance the
    /// generation. Returns whether anything changed.
    pub fn save_parameters(&self, bytes: &[u8]) -> Result<bool> {
        self.replace(bytes, ParamSource::Explicit)
    }

    /// Save URL-safe base64 params. Empty selects the Cardboard v1 profile.
    pub fn save_encoded(&self, encoded: &str) -> Result<bool> {
        if encoded.is_empty() {
            return self.replace(&Self::default_profile(), ParamSource::Default);
        }
        let bytes = decode_device_params(encoded)?;
        self.replace(&bytes, ParamSource::Explicit)
    }

    /// Save params from a calibration URL (the result of a QR scan).
    ///
    /// Malformed URIs fail with `InvalidParameterEncoding` and leave the
    /// previous bytes untouched.
    pub fn save_parameters_from_url(&self, uri: &str) -> Result<bool> {
        match parse_viewer_uri(uri) {
            Ok(ViewerUri::CardboardV1) => self.replace(&Self::default_profile(), ParamSource::Default),
            Ok(ViewerUri::Params(bytes)) => self.replace(&bytes, ParamSource::Scanned),
            Err(e) => {
                warn!("Ignoring viewer URL: {}", e);
                Err(e)
            }
        }
    }

    /// Saved params as URL-safe base64 (empty if none)
    pub fn saved_device_params_encoded(&self) -> String {
        self.current.read().encoded()
    }

    /// Monotonic change counter
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// A watcher that has already observed the current generation
    pub fn watcher(&self) -> ChangeWatcher {
        ChangeWatcher {
            last_seen: self.generation(),
        }
    }

    fn replace(&self, bytes: &[u8], source: ParamSource) -> Result<bool> {
        let mut current = self.current.write();
        if current.bytes() == bytes {
            return Ok(false);
        }
        self.storage.store(bytes)?;
        *current = DeviceParameters::new(bytes, source);
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        info!(
            "Device params saved: {} bytes from {:?} (generation {})",
            bytes.len(),
            source,
            generation
        );
        Ok(true)
    }
}

/// Caller-side record of the last observed store generation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChangeWatcher {
    last_seen: u64,
}

impl ChangeWatcher {
    /// Check-and-reset: true once per observed change.
    pub fn has_changed_since_last_check(&mut self, store: &DeviceParameterStore) -> bool {
        let current = store.generation();
        let changed = current != self.last_seen;
        self.last_seen = current;
        changed
    }

    pub fn last_seen(&self) -> u64 {
        self.last_seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_empty_store_falls_back_to_default() {
        let store = DeviceParameterStore::in_memory();
        assert!(store.saved_parameters().is_empty());
        assert_eq!(store.saved_device_params_encoded(), "");

        let effective = store.effective_parameters();
        assert_eq!(effective.source(), ParamSource::Default);
        assert_eq!(effective.bytes(), DeviceParameterStore::default_profile().as_slice());
    }

    #[test]
    fn test_identical_save_is_noop() {
        let store = DeviceParameterStore::in_memory();
        let mut watcher = store.watcher();

        assert!(store.save_parameters(&[1, 2, 3]).unwrap());
        assert!(!store.save_parameters(&[1, 2, 3]).unwrap());
        assert_eq!(store.generation(), 1);

        assert!(watcher.has_changed_since_last_check(&store));
        assert!(!watcher.has_changed_since_last_check(&store));
    }

    #[test]
    fn test_watcher_sees_each_distinct_save_once() {
        let store = DeviceParameterStore::in_memory();
        let mut watcher = store.watcher();
        assert!(!watcher.has_changed_since_last_check(&store));

        store.save_parameters(&[1]).unwrap();
        assert!(watcher.has_changed_since_last_check(&store));
        store.save_parameters(&[2]).unwrap();
        store.save_parameters(&[3]).unwrap();
        assert!(watcher.has_changed_since_last_check(&store));
        assert!(!watcher.has_changed_since_last_check(&store));
    }

    #[test]
    fn test_url_round_trip() {
        let store = DeviceParameterStore::in_memory();
        store
            .save_parameters_from_url("https://google.com/cardboard/cfg?p=AbCd")
            .unwrap();
        let first = store.saved_parameters();
        assert_eq!(first.source(), ParamSource::Scanned);
        assert_eq!(first.bytes(), &[0x01, 0xB0, 0x9D]);

        let encoded = store.saved_device_params_encoded();
        assert_eq!(encoded, "AbCd");
        let generation = store.generation();
        assert!(!store.save_parameters_from_url(&device_params_url(&encoded)).unwrap());
        assert_eq!(store.saved_parameters().bytes(), first.bytes());
        assert_eq!(store.generation(), generation);
    }

    #[test]
    fn test_url_safe_alphabet() {
        let bytes = [0xFB, 0xFF, 0xBF];
        let encoded = encode_device_params(&bytes);
        assert_eq!(encoded, "-_-_");
        assert_eq!(decode_device_params(&encoded).unwrap(), bytes);
        // Standard alphabet and padding are tolerated on input
        assert_eq!(decode_device_params("+/+/").unwrap(), bytes);
        assert_eq!(decode_device_params("AQ==").unwrap(), vec![1]);
        assert_eq!(decode_device_params("AQ").unwrap(), vec![1]);
    }

    #[test]
    fn test_trailing_plus_survives_form_decoding() {
        assert_eq!(decode_device_params("AAA+").unwrap(), vec![0, 0, 62]);
        assert_eq!(decode_device_params("AAA ").unwrap(), vec![0, 0, 62]);
        assert_eq!(decode_device_params("AAA+\n").unwrap(), vec![0, 0, 62]);
        assert_eq!(
            parse_viewer_uri("https://google.com/cardboard/cfg?p=AAA+").unwrap(),
            ViewerUri::Params(vec![0, 0, 62])
        );
    }

    #[test]
    fn test_malformed_urls_keep_previous_bytes() {
        let store = DeviceParameterStore::in_memory();
        store.save_parameters(&[9, 9]).unwrap();

        let bad = [
            "not a url",
            "ftp://google.com/cardboard/cfg?p=AbCd",
            "https://example.com/cardboard/cfg?p=AbCd",
            "https://google.com/cardboard/cfg",
            "https://google.com/cardboard/cfg?p=",
            "https://google.com/cardboard/cfg?p=%%%%",
        ];
        for uri in bad {
            let err = store.save_parameters_from_url(uri).unwrap_err();
            assert!(
                matches!(err, CardboardError::InvalidParameterEncoding(_)),
                "{uri}: {err}"
            );
        }
        assert_eq!(store.saved_parameters().bytes(), &[9, 9]);
        assert_eq!(store.generation(), 1);
    }

    #[test]
    fn test_short_link_selects_default_profile() {
        let store = DeviceParameterStore::in_memory();
        store.save_parameters_from_url(CARDBOARD_V1_URL).unwrap();
        let saved = store.saved_parameters();
        assert_eq!(saved.source(), ParamSource::Default);
        assert_eq!(saved.bytes(), DeviceParameterStore::default_profile().as_slice());
    }

    #[test]
    fn test_save_encoded_empty_means_default() {
        let store = DeviceParameterStore::in_memory();
        assert!(store.save_encoded("").unwrap());
        assert_eq!(
            store.saved_parameters().bytes(),
            DeviceParameterStore::default_profile().as_slice()
        );
        assert_eq!(device_params_url(""), CARDBOARD_V1_URL);
    }

    #[test]
    fn test_file_storage_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("params").join("current_device_params");

        let store = DeviceParameterStore::open(Box::new(FileStorage::new(&path))).unwrap();
        assert!(store.saved_parameters().is_empty());
        store.save_parameters(&[4, 5, 6]).unwrap();

        let reopened = DeviceParameterStore::open(Box::new(FileStorage::new(&path))).unwrap();
        assert_eq!(reopened.saved_parameters().bytes(), &[4, 5, 6]);
        assert_eq!(reopened.generation(), 0);
    }

    #[test]
    fn test_snapshot_is_immutable() {
        let store = DeviceParameterStore::in_memory();
        store.save_parameters(&[1, 2]).unwrap();
        let snapshot = store.saved_parameters();
        store.save_parameters(&[3, 4]).unwrap();
        assert_eq!(snapshot.bytes(), &[1, 2]);
        assert_eq!(store.saved_parameters().bytes(), &[3, 4]);
    }
}
