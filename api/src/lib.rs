//! Host-facing contract shared by tracking modules.
//!
//! A module is loaded by the host, handed a [`ModuleLogger`], and then driven
//! through [`TrackingModule::update`] from the host's own loop. Everything a
//! module produces ends up in [`UnifiedTrackingData`].

use anyhow::Result;
use glam::Vec2;
use serde::{Deserialize, Serialize};
use std::ffi::{c_char, CString};

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UnifiedSingleEyeData {
    /// Gaze angles in radians, `x` horizontal and `y` vertical.
    pub gaze: Vec2,
    pub pupil_diameter_mm: f32,
    pub openness: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnifiedEyeData {
    pub left: UnifiedSingleEyeData,
    pub right: UnifiedSingleEyeData,
    pub min_dilation: f32,
    pub max_dilation: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnifiedExpressionShape {
    pub weight: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedTrackingData {
    pub eye: UnifiedEyeData,
    pub shapes: Vec<UnifiedExpressionShape>,
}

impl Default for UnifiedTrackingData {
    fn default() -> Self {
        Self {
            eye: UnifiedEyeData::default(),
            shapes: vec![UnifiedExpressionShape::default(); UnifiedExpressions::Max as usize],
        }
    }
}

impl UnifiedTrackingData {
    pub fn shape(&self, expression: UnifiedExpressions) -> f32 {
        self.shapes
            .get(expression as usize)
            .map_or(0.0, |shape| shape.weight)
    }

    pub fn set_shape(&mut self, expression: UnifiedExpressions, weight: f32) {
        if let Some(shape) = self.shapes.get_mut(expression as usize) {
            shape.weight = weight;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum UnifiedExpressions {
    // Eye Expressions
    EyeSquintRight = 0,
    EyeSquintLeft,
    EyeWideRight,
    EyeWideLeft,

    // Eyebrow Expressions
    BrowPinchRight,
    BrowPinchLeft,
    BrowLowererRight,
    BrowLowererLeft,
    BrowInnerUpRight,
    BrowInnerUpLeft,
    BrowOuterUpRight,
    BrowOuterUpLeft,

    // Nose Expressions
    NasalDilationRight,
    NasalDilationLeft,
    NasalConstrictRight,
    NasalConstrictLeft,

    // Cheek Expressions
    CheekSquintRight,
    CheekSquintLeft,
    CheekPuffRight,
    CheekPuffLeft,
    CheekSuckRight,
    CheekSuckLeft,

    // Jaw Exclusive Expressions
    JawOpen,
    JawRight,
    JawLeft,
    JawForward,
    JawBackward,
    JawClench,
    JawMandibleRaise,
    MouthClosed,

    // Lip Expressions
    LipSuckUpperRight,
    LipSuckUpperLeft,
    LipSuckLowerRight,
    LipSuckLowerLeft,
    LipSuckCornerRight,
    LipSuckCornerLeft,
    LipFunnelUpperRight,
    LipFunnelUpperLeft,
    LipFunnelLowerRight,
    LipFunnelLowerLeft,
    LipPuckerUpperRight,
    LipPuckerUpperLeft,
    LipPuckerLowerRight,
    LipPuckerLowerLeft,

    // Upper lip raiser group
    MouthUpperUpRight,
    MouthUpperUpLeft,
    MouthUpperDeepenRight,
    MouthUpperDeepenLeft,
    NoseSneerRight,
    NoseSneerLeft,

    // Lower lip depressor group
    MouthLowerDownRight,
    MouthLowerDownLeft,

    // Mouth Direction group
    MouthUpperRight,
    MouthUpperLeft,
    MouthLowerRight,
    MouthLowerLeft,

    // Smile group
    MouthCornerPullRight,
    MouthCornerPullLeft,
    MouthCornerSlantRight,
    MouthCornerSlantLeft,

    // Sad group
    MouthFrownRight,
    MouthFrownLeft,
    MouthStretchRight,
    MouthStretchLeft,
    MouthDimpleRight,
    MouthDimpleLeft,
    MouthRaiserUpper,
    MouthRaiserLower,
    MouthPressRight,
    MouthPressLeft,
    MouthTightenerRight,
    MouthTightenerLeft,

    // Tongue Expressions
    TongueOut,
    TongueUp,
    TongueDown,
    TongueRight,
    TongueLeft,
    TongueRoll,
    TongueBendDown,
    TongueCurlUp,
    TongueSquish,
    TongueFlat,
    TongueTwistRight,
    TongueTwistLeft,

    // Throat/Neck Expressions
    SoftPalateClose,
    ThroatSwallow,
    NeckFlexRight,
    NeckFlexLeft,

    Max,
}

impl UnifiedExpressions {
    pub const COUNT: usize = Self::Max as usize;

    /// Every real channel in discriminant order, `Max` excluded.
    pub fn all() -> impl Iterator<Item = Self> {
        (0..Self::COUNT).filter_map(|i| Self::try_from(i).ok())
    }
}

impl TryFrom<usize> for UnifiedExpressions {
    type Error = ();

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        if value >= Self::Max as usize {
            return Err(());
        }
        // Range checked above; the enum is repr(usize) with contiguous
        // discriminants starting from 0.
        Ok(unsafe { std::mem::transmute::<usize, UnifiedExpressions>(value) })
    }
}

/// Which data groups a module provides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSupport {
    pub eye: bool,
    pub expression: bool,
}

impl ModuleSupport {
    pub const NONE: Self = Self {
        eye: false,
        expression: false,
    };
    pub const ALL: Self = Self {
        eye: true,
        expression: true,
    };

    pub fn new(eye: bool, expression: bool) -> Self {
        Self { eye, expression }
    }

    pub fn intersect(self, other: Self) -> Self {
        Self {
            eye: self.eye && other.eye,
            expression: self.expression && other.expression,
        }
    }
}

/// log level for module logging
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl From<LogLevel> for log::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => log::Level::Error,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Trace => log::Level::Trace,
        }
    }
}

/// logger callback for modules
pub type LogCallback =
    extern "C" fn(level: LogLevel, target: *const c_char, message: *const c_char);

#[derive(Clone, Copy)]
enum LogSink {
    Callback(LogCallback),
    Facade,
}

/// Logger interface for modules.
///
/// A module loaded as a dynamic library has no logger of its own, so the
/// host hands it a callback. Hosts running the module in-process can use
/// [`ModuleLogger::from_log`] to go straight through the `log` facade.
#[derive(Clone)]
pub struct ModuleLogger {
    sink: LogSink,
    module_name: String,
}

impl ModuleLogger {
    pub fn new(callback: LogCallback, module_name: String) -> Self {
        Self {
            sink: LogSink::Callback(callback),
            module_name,
        }
    }

    pub fn from_log(module_name: impl Into<String>) -> Self {
        Self {
            sink: LogSink::Facade,
            module_name: module_name.into(),
        }
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn trace(&self, message: &str) {
        self.log(LogLevel::Trace, message);
    }

    fn log(&self, level: LogLevel, message: &str) {
        match self.sink {
            LogSink::Facade => {
                log::log!(target: self.module_name.as_str(), level.into(), "{}", message);
            }
            LogSink::Callback(callback) => {
                let target = to_c_string(&self.module_name);
                let msg = to_c_string(message);
                callback(level, target.as_ptr(), msg.as_ptr());
            }
        }
    }
}

/// Interior NULs would truncate the message on the C side, so they are dropped.
fn to_c_string(text: &str) -> CString {
    CString::new(text.replace('\0', "")).unwrap_or_default()
}

/// A tracking module as seen by the host.
pub trait TrackingModule {
    /// Data groups the module can provide at all, before initialization.
    fn supported(&self) -> ModuleSupport;

    /// Acquire resources. Returns the granted subset of `requested`; an error
    /// means the module stays inactive for the rest of the session.
    fn initialize(&mut self, logger: ModuleLogger, requested: ModuleSupport)
        -> Result<ModuleSupport>;

    /// One host tick. `Ok` means fresh data was written into `data`.
    fn update(&mut self, data: &mut UnifiedTrackingData) -> Result<()>;

    /// Release everything. Safe to call repeatedly, and without a prior
    /// successful `initialize`.
    fn teardown(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn expressions_round_trip_through_index() {
        for (i, expression) in UnifiedExpressions::all().enumerate() {
            assert_eq!(expression as usize, i);
        }
        assert_eq!(UnifiedExpressions::all().count(), UnifiedExpressions::COUNT);
        assert!(UnifiedExpressions::try_from(UnifiedExpressions::COUNT).is_err());
    }

    #[test]
    fn default_data_has_one_shape_per_channel() {
        let data = UnifiedTrackingData::default();
        assert_eq!(data.shapes.len(), UnifiedExpressions::COUNT);
        assert_eq!(data.shape(UnifiedExpressions::JawOpen), 0.0);
    }

    #[test]
    fn support_intersection() {
        let granted = ModuleSupport::ALL.intersect(ModuleSupport::new(true, false));
        assert_eq!(granted, ModuleSupport::new(true, false));
        assert_eq!(ModuleSupport::NONE.intersect(ModuleSupport::ALL), ModuleSupport::NONE);
    }

    struct CaptureLog;

    static CAPTURED: Mutex<Vec<(log::Level, String, String)>> = Mutex::new(Vec::new());

    impl log::Log for CaptureLog {
        fn enabled(&self, _metadata: &log::Metadata) -> bool {
            true
        }

        fn log(&self, record: &log::Record) {
            CAPTURED.lock().unwrap().push((
                record.level(),
                record.target().to_string(),
                record.args().to_string(),
            ));
        }

        fn flush(&self) {}
    }

    static CAPTURE_LOG: CaptureLog = CaptureLog;

    #[test]
    fn facade_logger_keeps_level_and_target() {
        let _ = log::set_logger(&CAPTURE_LOG);
        log::set_max_level(log::LevelFilter::Trace);

        let logger = ModuleLogger::from_log("facade_module");
        logger.warn("lost tracking");
        logger.trace("tick");

        let captured: Vec<_> = CAPTURED
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, target, _)| target == "facade_module")
            .cloned()
            .collect();
        assert_eq!(
            captured,
            vec![
                (log::Level::Warn, "facade_module".to_string(), "lost tracking".to_string()),
                (log::Level::Trace, "facade_module".to_string(), "tick".to_string()),
            ]
        );
    }

    #[test]
    fn logger_tolerates_interior_nul() {
        assert_eq!(to_c_string("a\0b").as_bytes(), b"ab");
    }

    #[test]
    fn tracking_data_serializes_shapes_as_plain_weights() {
        let mut data = UnifiedTrackingData::default();
        data.set_shape(UnifiedExpressions::EyeSquintRight, 0.25);
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["shapes"][0], serde_json::json!(0.25));
    }
}
