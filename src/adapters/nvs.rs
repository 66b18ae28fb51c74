//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements [`StoragePort`] on top of ESP-IDF NVS blobs.  The pump table
//! lives under namespace `bomb-config`, key `bombas`.
//!
//! - Atomic writes: ESP-IDF NVS commits are atomic per `nvs_commit()`.
//! - The simulation backend is an in-memory map keyed `"namespace::key"`.

use crate::app::ports::{StorageError, StoragePort};
use log::info;

#[cfg(not(feature = "espidf"))]
use std::collections::HashMap;

#[cfg(feature = "espidf")]
use esp_idf_svc::sys::*;
#[cfg(feature = "espidf")]
use log::warn;

/// NVS limits namespace and key names to 15 bytes plus terminator.
#[cfg(feature = "espidf")]
const NVS_NAME_LEN: usize = 16;

pub struct NvsAdapter {
    available: bool,
    #[cfg(not(feature = "espidf"))]
    store: HashMap<String, Vec<u8>>,
}

impl NvsAdapter {
    /// Initialise NVS flash.
    ///
    /// On a full partition or a version mismatch the partition is erased
    /// and re-initialised.  Returns `Err(StorageError::Unavailable)` if
    /// flash cannot be brought up at all.
    pub fn new() -> Result<Self, StorageError> {
        #[cfg(feature = "espidf")]
        {
            // SAFETY: called once from the main task before any other
            // NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NVS: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK || unsafe { nvs_flash_init() } != ESP_OK {
                    return Err(StorageError::Unavailable);
                }
            } else if ret != ESP_OK {
                return Err(StorageError::Unavailable);
            }
            info!("NvsAdapter: ESP-IDF NVS initialised");
            Ok(Self { available: true })
        }

        #[cfg(not(feature = "espidf"))]
        {
            info!("NvsAdapter: simulation backend");
            Ok(Self {
                available: true,
                store: HashMap::new(),
            })
        }
    }

    /// A store that failed to initialise.  Every access reports
    /// `Unavailable`, so the controller keeps running on in-memory state.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            #[cfg(not(feature = "espidf"))]
            store: HashMap::new(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    #[cfg(not(feature = "espidf"))]
    fn composite_key(namespace: &str, key: &str) -> String {
        format!("{}::{}", namespace, key)
    }

    /// NUL-terminated copy of an NVS name, truncated to 15 bytes.
    #[cfg(feature = "espidf")]
    fn c_name(name: &str) -> [u8; NVS_NAME_LEN] {
        let mut buf = [0u8; NVS_NAME_LEN];
        let len = name.len().min(NVS_NAME_LEN - 1);
        buf[..len].copy_from_slice(&name.as_bytes()[..len]);
        buf
    }

    /// Open a namespace, run `f` with the handle, then close it.
    #[cfg(feature = "espidf")]
    fn with_handle<T>(
        namespace: &str,
        write: bool,
        f: impl FnOnce(nvs_handle_t) -> Result<T, esp_err_t>,
    ) -> Result<T, esp_err_t> {
        let ns = Self::c_name(namespace);
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };
        let mut handle: nvs_handle_t = 0;
        // SAFETY: `ns` is NUL-terminated and outlives the call.
        let ret = unsafe { nvs_open(ns.as_ptr().cast(), mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }
        let result = f(handle);
        // SAFETY: `handle` was opened above and is not used afterwards.
        unsafe { nvs_close(handle) };
        result
    }
}

impl StoragePort for NvsAdapter {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        if !self.available {
            return Err(StorageError::Unavailable);
        }
        #[cfg(not(feature = "espidf"))]
        {
            match self.store.get(&Self::composite_key(namespace, key)) {
                Some(data) => {
                    let len = data.len().min(buf.len());
                    buf[..len].copy_from_slice(&data[..len]);
                    Ok(len)
                }
                None => Err(StorageError::NotFound),
            }
        }

        #[cfg(feature = "espidf")]
        {
            let key = Self::c_name(key);
            let result = Self::with_handle(namespace, false, |handle| {
                let mut size = buf.len();
                // SAFETY: `buf` is valid for `size` bytes; NVS writes at
                // most that many and updates `size`.
                let ret = unsafe {
                    nvs_get_blob(handle, key.as_ptr().cast(), buf.as_mut_ptr().cast(), &mut size)
                };
                if ret == ESP_OK { Ok(size) } else { Err(ret) }
            });
            match result {
                Ok(size) => Ok(size),
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Err(StorageError::NotFound),
                Err(e) => {
                    warn!("NvsAdapter: read from {} failed ({})", namespace, e);
                    Err(StorageError::IoError)
                }
            }
        }
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        if !self.available {
            return Err(StorageError::Unavailable);
        }
        #[cfg(not(feature = "espidf"))]
        {
            self.store
                .insert(Self::composite_key(namespace, key), data.to_vec());
            Ok(())
        }

        #[cfg(feature = "espidf")]
        {
            let key = Self::c_name(key);
            let result = Self::with_handle(namespace, true, |handle| {
                // SAFETY: `data` is valid for `data.len()` bytes.
                let ret = unsafe {
                    nvs_set_blob(handle, key.as_ptr().cast(), data.as_ptr().cast(), data.len())
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                // SAFETY: handle is open read-write.
                let ret = unsafe { nvs_commit(handle) };
                if ret == ESP_OK { Ok(()) } else { Err(ret) }
            });
            result.map_err(|e| {
                if e == ESP_ERR_NVS_NOT_ENOUGH_SPACE {
                    StorageError::Full
                } else {
                    StorageError::IoError
                }
            })?;
            info!("NvsAdapter: wrote {} bytes to {}", data.len(), namespace);
            Ok(())
        }
    }
}
