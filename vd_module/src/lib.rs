//! Virtual Desktop face and eye tracking module.
//!
//! Reads the face state the Virtual Desktop Streamer publishes in shared
//! memory and converts it into unified tracking data once per host tick.

pub mod config;
pub mod face_state;
pub mod gaze;
pub mod mapping;
pub mod smoothing;
pub mod source;
pub mod virtual_desktop;

use api::TrackingModule;
pub use virtual_desktop::{ConnectionState, ModuleStatus, VirtualDesktopModule};

#[no_mangle]
#[allow(improper_ctypes_definitions)]
pub extern "C" fn create_module() -> Box<dyn TrackingModule> {
    Box::new(VirtualDesktopModule::new())
}
