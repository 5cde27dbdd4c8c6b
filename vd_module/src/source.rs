//! Where face states come from.
//!
//! The streamer owns the shared record and signals a named event after each
//! write. [`FaceStateSource`] is the seam the module drives; the Windows
//! implementation lives in [`shared_memory`].

use anyhow::Result;
use std::time::Duration;

use crate::config::{ModuleConfig, MAX_WAIT_TIMEOUT_MS};
use crate::face_state::FaceState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    Signaled,
    TimedOut,
}

pub trait FaceStateSource {
    /// Blocks until the producer signals a new frame or `timeout` elapses.
    fn wait(&mut self, timeout: Duration) -> WaitResult;

    /// Copies and decodes the current record.
    fn read(&self) -> Result<FaceState>;

    /// Releases the underlying resources. Must be safe to call repeatedly.
    fn close(&mut self);
}

/// Opens a source for the given configuration.
pub type SourceOpener = Box<dyn FnMut(&ModuleConfig) -> Result<Box<dyn FaceStateSource>>>;

/// Milliseconds for a native wait. Never reaches the infinite sentinel.
pub fn wait_millis(timeout: Duration) -> u32 {
    let millis = timeout.as_millis().min(u128::from(MAX_WAIT_TIMEOUT_MS));
    u32::try_from(millis).unwrap_or(MAX_WAIT_TIMEOUT_MS as u32)
}

/// The platform's named shared memory source.
pub fn open_shared_memory(config: &ModuleConfig) -> Result<Box<dyn FaceStateSource>> {
    #[cfg(windows)]
    {
        let source = shared_memory::SharedMemorySource::open(
            &config.face_state_map_name,
            &config.face_state_event_name,
        )?;
        Ok(Box::new(source))
    }
    #[cfg(not(windows))]
    {
        anyhow::bail!(
            "Shared memory section {:?} is only published on Windows",
            config.face_state_map_name
        )
    }
}

#[cfg(windows)]
pub mod shared_memory {
    use super::{wait_millis, FaceStateSource, WaitResult};
    use crate::face_state::{FaceState, FACE_STATE_SIZE};
    use anyhow::{anyhow, Result};
    use std::time::Duration;
    use windows::core::PCWSTR;
    use windows::Win32::Foundation::{CloseHandle, HANDLE, WAIT_OBJECT_0};
    use windows::Win32::System::Memory::{
        MapViewOfFile, OpenFileMappingW, UnmapViewOfFile, FILE_MAP_READ,
        MEMORY_MAPPED_VIEW_ADDRESS,
    };
    use windows::Win32::System::Threading::{OpenEventW, WaitForSingleObject, EVENT_ALL_ACCESS};

    fn wide(name: &str) -> Vec<u16> {
        name.encode_utf16().chain(std::iter::once(0)).collect()
    }

    pub struct SharedMemorySource {
        mapping_handle: HANDLE,
        view: MEMORY_MAPPED_VIEW_ADDRESS,
        event_handle: HANDLE,
    }

    impl SharedMemorySource {
        pub fn open(map_name: &str, event_name: &str) -> Result<Self> {
            let map_name_wide = wide(map_name);
            let event_name_wide = wide(event_name);

            unsafe {
                let mapping_handle = match OpenFileMappingW(
                    FILE_MAP_READ.0,
                    false,
                    PCWSTR(map_name_wide.as_ptr()),
                ) {
                    Ok(handle) if !handle.is_invalid() => handle,
                    _ => return Err(anyhow!("Failed to open file mapping {:?}", map_name)),
                };

                let view = MapViewOfFile(mapping_handle, FILE_MAP_READ, 0, 0, FACE_STATE_SIZE);
                if view.Value.is_null() {
                    let _ = CloseHandle(mapping_handle);
                    return Err(anyhow!("Failed to map view of {:?}", map_name));
                }

                let event_handle =
                    match OpenEventW(EVENT_ALL_ACCESS, false, PCWSTR(event_name_wide.as_ptr())) {
                        Ok(event) if !event.is_invalid() => event,
                        _ => {
                            let _ = UnmapViewOfFile(view);
                            let _ = CloseHandle(mapping_handle);
                            return Err(anyhow!("Failed to open event {:?}", event_name));
                        }
                    };

                Ok(Self {
                    mapping_handle,
                    view,
                    event_handle,
                })
            }
        }
    }

    impl FaceStateSource for SharedMemorySource {
        fn wait(&mut self, timeout: Duration) -> WaitResult {
            if self.event_handle.is_invalid() {
                return WaitResult::TimedOut;
            }
            let result = unsafe { WaitForSingleObject(self.event_handle, wait_millis(timeout)) };
            if result == WAIT_OBJECT_0 {
                WaitResult::Signaled
            } else {
                WaitResult::TimedOut
            }
        }

        fn read(&self) -> Result<FaceState> {
            if self.view.Value.is_null() {
                return Err(anyhow!("Face state view is not mapped"));
            }
            let mut bytes = [0u8; FACE_STATE_SIZE];
            // SAFETY: the view spans at least FACE_STATE_SIZE bytes and stays
            // mapped until close(). Only the streamer writes to it.
            unsafe {
                std::ptr::copy_nonoverlapping(
                    self.view.Value as *const u8,
                    bytes.as_mut_ptr(),
                    FACE_STATE_SIZE,
                );
            }
            FaceState::decode(&bytes)
        }

        fn close(&mut self) {
            unsafe {
                if !self.view.Value.is_null() {
                    let _ = UnmapViewOfFile(self.view);
                    self.view = MEMORY_MAPPED_VIEW_ADDRESS {
                        Value: std::ptr::null_mut(),
                    };
                }
                if !self.mapping_handle.is_invalid() {
                    let _ = CloseHandle(self.mapping_handle);
                    self.mapping_handle = HANDLE(std::ptr::null_mut());
                }
                if !self.event_handle.is_invalid() {
                    let _ = CloseHandle(self.event_handle);
                    self.event_handle = HANDLE(std::ptr::null_mut());
                }
            }
        }
    }

    impl Drop for SharedMemorySource {
        fn drop(&mut self) {
            self.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_wait_is_always_finite() {
        assert_eq!(wait_millis(Duration::from_millis(50)), 50);
        assert_eq!(wait_millis(Duration::MAX), MAX_WAIT_TIMEOUT_MS as u32);
        assert_ne!(wait_millis(Duration::from_secs(u64::from(u32::MAX))), u32::MAX);
    }
}
