//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements [`ConfigPort`] (engine configuration as a postcard blob) and
//! [`StoragePort`] (namespaced key/value blobs, used by the crash log).
//!
//! - **`target_os = "espidf"`**: ESP-IDF `nvs_*` calls, one handle per
//!   operation, committed before close.
//! - **otherwise**: an in-memory map for host tests and simulation.
//!
//! Configuration is range-checked before it is persisted; an out-of-range
//! value is rejected, never clamped.

use log::info;
#[cfg(target_os = "espidf")]
use log::warn;

use crate::app::ports::{ConfigError, ConfigPort, StorageError, StoragePort};
use crate::config::EngineConfig;

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const CONFIG_NAMESPACE: &str = "heishamon";
const CONFIG_KEY: &str = "rulecfg";

#[cfg(target_os = "espidf")]
const MAX_BLOB_SIZE: usize = 512;

pub struct NvsStorage {
    #[cfg(not(target_os = "espidf"))]
    store: std::cell::RefCell<HashMap<String, Vec<u8>>>,
}

impl NvsStorage {
    /// Initialise NVS flash.  A partition from an older IDF version, or one
    /// without free pages, is erased and re-initialised.
    pub fn new() -> Result<Self, ConfigError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: called once from the main task before any other NVS use.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NvsStorage: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK || unsafe { nvs_flash_init() } != ESP_OK {
                    return Err(ConfigError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(ConfigError::IoError);
            }
            info!("NvsStorage: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsStorage: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            store: std::cell::RefCell::new(HashMap::new()),
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn composite_key(namespace: &str, key: &str) -> String {
        format!("{}::{}", namespace, key)
    }

    /// NUL-terminated copy of an NVS name (max 15 bytes).
    #[cfg(target_os = "espidf")]
    fn c_name(name: &str) -> [u8; 16] {
        let mut buf = [0u8; 16];
        let len = name.len().min(15);
        buf[..len].copy_from_slice(&name.as_bytes()[..len]);
        buf
    }

    #[cfg(target_os = "espidf")]
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
        let ret = unsafe { nvs_open(ns.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }
        let result = f(handle).and_then(|v| {
            if write {
                // SAFETY: handle was opened read-write above.
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
            }
            Ok(v)
        });
        // SAFETY: handle is open and not used after this point.
        unsafe { nvs_close(handle) };
        result
    }
}

fn validate_config(cfg: &EngineConfig) -> Result<(), ConfigError> {
    if !cfg.rules_path.starts_with('/') {
        return Err(ConfigError::ValidationFailed("rules_path must be absolute"));
    }
    if !(64..=16384).contains(&cfg.arena_capacity) {
        return Err(ConfigError::ValidationFailed("arena_capacity must be 64–16384"));
    }
    if !(1..=256).contains(&cfg.max_local_slots) {
        return Err(ConfigError::ValidationFailed("max_local_slots must be 1–256"));
    }
    if !(1..=1024).contains(&cfg.max_global_slots) {
        return Err(ConfigError::ValidationFailed("max_global_slots must be 1–1024"));
    }
    if !(1..=255).contains(&cfg.max_rules) {
        return Err(ConfigError::ValidationFailed("max_rules must be 1–255"));
    }
    if !(1..=32).contains(&cfg.max_chain_depth) {
        return Err(ConfigError::ValidationFailed("max_chain_depth must be 1–32"));
    }
    if !(64..=4096).contains(&cfg.dump_bytes) {
        return Err(ConfigError::ValidationFailed("dump_bytes must be 64–4096"));
    }
    Ok(())
}

impl ConfigPort for NvsStorage {
    fn load(&self) -> Result<EngineConfig, ConfigError> {
        let mut buf = [0u8; 256];
        match self.read(CONFIG_NAMESPACE, CONFIG_KEY, &mut buf) {
            Ok(len) => {
                let cfg: EngineConfig =
                    postcard::from_bytes(&buf[..len]).map_err(|_| ConfigError::Corrupted)?;
                info!("NvsStorage: loaded config ({} bytes)", len);
                Ok(cfg)
            }
            Err(StorageError::NotFound) => {
                info!("NvsStorage: no stored config, using defaults");
                Ok(EngineConfig::default())
            }
            Err(_) => Err(ConfigError::IoError),
        }
    }

    fn save(&self, config: &EngineConfig) -> Result<(), ConfigError> {
        validate_config(config)?;
        let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::IoError)?;

        #[cfg(not(target_os = "espidf"))]
        {
            let key = Self::composite_key(CONFIG_NAMESPACE, CONFIG_KEY);
            self.store.borrow_mut().insert(key, bytes);
            info!("NvsStorage: config saved (simulation)");
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            if bytes.len() > MAX_BLOB_SIZE {
                return Err(ConfigError::IoError);
            }
            let key = Self::c_name(CONFIG_KEY);
            let result = Self::with_handle(CONFIG_NAMESPACE, true, |handle| {
                // SAFETY: key is NUL-terminated; bytes outlives the call.
                let ret = unsafe {
                    nvs_set_blob(handle, key.as_ptr() as *const _, bytes.as_ptr() as *const _, bytes.len())
                };
                if ret == ESP_OK { Ok(()) } else { Err(ret) }
            });
            result.map_err(|e| {
                warn!("NvsStorage: config write error {}", e);
                ConfigError::IoError
            })?;
            info!("NvsStorage: config saved ({} bytes)", bytes.len());
            Ok(())
        }
    }
}

impl StoragePort for NvsStorage {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let store = self.store.borrow();
            let data = store
                .get(&Self::composite_key(namespace, key))
                .ok_or(StorageError::NotFound)?;
            let len = data.len().min(buf.len());
            buf[..len].copy_from_slice(&data[..len]);
            Ok(len)
        }

        #[cfg(target_os = "espidf")]
        {
            let key = Self::c_name(key);
            let result = Self::with_handle(namespace, false, |handle| {
                let mut size = buf.len();
                // SAFETY: buf is valid for `size` bytes.
                let ret = unsafe {
                    nvs_get_blob(handle, key.as_ptr() as *const _, buf.as_mut_ptr() as *mut _, &mut size)
                };
                if ret == ESP_OK { Ok(size) } else { Err(ret) }
            });
            match result {
                Ok(size) => Ok(size),
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Err(StorageError::NotFound),
                Err(_) => Err(StorageError::IoError),
            }
        }
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            self.store
                .borrow_mut()
                .insert(Self::composite_key(namespace, key), data.to_vec());
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let key = Self::c_name(key);
            Self::with_handle(namespace, true, |handle| {
                // SAFETY: data is valid for its length.
                let ret = unsafe {
                    nvs_set_blob(handle, key.as_ptr() as *const _, data.as_ptr() as *const _, data.len())
                };
                if ret == ESP_OK { Ok(()) } else { Err(ret) }
            })
            .map_err(|e| {
                if e == ESP_ERR_NVS_NOT_ENOUGH_SPACE {
                    StorageError::Full
                } else {
                    StorageError::IoError
                }
            })
        }
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            self.store
                .borrow_mut()
                .remove(&Self::composite_key(namespace, key));
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let key = Self::c_name(key);
            Self::with_handle(namespace, true, |handle| {
                // SAFETY: key is NUL-terminated.
                let ret = unsafe { nvs_erase_key(handle, key.as_ptr() as *const _) };
                if ret == ESP_OK || ret == ESP_ERR_NVS_NOT_FOUND { Ok(()) } else { Err(ret) }
            })
            .map_err(|_| StorageError::IoError)
        }
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        #[cfg(not(target_os = "espidf"))]
        {
            self.store
                .borrow()
                .contains_key(&Self::composite_key(namespace, key))
        }

        #[cfg(target_os = "espidf")]
        {
            let key = Self::c_name(key);
            Self::with_handle(namespace, false, |handle| {
                // SAFETY: key is NUL-terminated; a null type pointer is allowed.
                let ret = unsafe { nvs_find_key(handle, key.as_ptr() as *const _, core::ptr::null_mut()) };
                Ok(ret == ESP_OK)
            })
            .unwrap_or(false)
        }
    }
}
