// Thanks to "VRCFaceTracking" for the initial implementation
// https://github.com/guygodin/VirtualDesktop.VRCFaceTracking

use anyhow::{anyhow, Result};
use api::{ModuleLogger, ModuleSupport, TrackingModule, UnifiedExpressions, UnifiedTrackingData};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::{ModuleConfig, DEFAULT_CONFIG_PATH};
use crate::face_state::{Expressions, FaceState};
use crate::gaze::{self, MAX_DILATION, MIN_DILATION, PUPIL_DIAMETER_MM};
use crate::mapping::MappingTable;
use crate::smoothing::{Eye, Slot, TemporalSmoother};
use crate::source::{self, FaceStateSource, SourceOpener, WaitResult};

const INACTIVE_SLEEP: Duration = Duration::from_millis(10);

/// Whether the streamer is currently delivering meaningful data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Unknown,
    Tracking,
    NotTracking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleStatus {
    Inactive,
    Active,
}

pub struct VirtualDesktopModule {
    config: ModuleConfig,
    config_path: Option<PathBuf>,
    opener: SourceOpener,
    source: Option<Box<dyn FaceStateSource>>,
    mapping: &'static MappingTable,
    smoother: TemporalSmoother,
    connection: ConnectionState,
    last_state: Option<FaceState>,
    last_signal: Option<Instant>,
    enabled: ModuleSupport,
    logger: Option<ModuleLogger>,
}

impl VirtualDesktopModule {
    /// Reads `vd_module.json` at initialization and opens the streamer's
    /// shared memory.
    pub fn new() -> Self {
        let mut module = Self::with_source(
            ModuleConfig::default(),
            Box::new(source::open_shared_memory),
        );
        module.config_path = Some(PathBuf::from(DEFAULT_CONFIG_PATH));
        module
    }

    /// Uses `config` as is and obtains face states from `opener`.
    pub fn with_source(config: ModuleConfig, opener: SourceOpener) -> Self {
        Self {
            smoother: TemporalSmoother::new(config.smoothing_factor),
            config,
            config_path: None,
            opener,
            source: None,
            mapping: MappingTable::shared(),
            connection: ConnectionState::Unknown,
            last_state: None,
            last_signal: None,
            enabled: ModuleSupport::NONE,
            logger: None,
        }
    }

    pub fn status(&self) -> ModuleStatus {
        if self.source.is_some() {
            ModuleStatus::Active
        } else {
            ModuleStatus::Inactive
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection
    }

    pub fn enabled(&self) -> ModuleSupport {
        self.enabled
    }

    fn reload_config(&mut self, logger: &ModuleLogger) {
        let Some(path) = &self.config_path else {
            return;
        };
        match ModuleConfig::load(path) {
            Ok(config) => self.config = config,
            Err(e) => {
                logger.warn(&format!("{:#}. Using defaults.", e));
                self.config = ModuleConfig::default();
            }
        }
    }

    fn set_tracking(&mut self, tracking: bool) {
        let next = if tracking {
            ConnectionState::Tracking
        } else {
            ConnectionState::NotTracking
        };
        if next == self.connection {
            return;
        }
        self.connection = next;

        if let Some(logger) = &self.logger {
            if tracking {
                logger.info("Tracking is now active!");
            } else {
                logger.warn(
                    "Tracking is not active. Make sure you are connected to your computer, \
                     a VR game or SteamVR is launched and face/eye tracking is enabled in the \
                     Streaming tab.",
                );
            }
        }
    }

    fn signal_is_stale(&self) -> bool {
        match (self.config.stale_signal_timeout(), self.last_signal) {
            (Some(limit), Some(at)) => at.elapsed() > limit,
            _ => false,
        }
    }

    fn update_eye_data(&mut self, data: &mut UnifiedTrackingData, face_state: &FaceState) {
        let valid = face_state.eyes_valid();

        let openness = |closed: Expressions, tightener: Expressions| {
            let closed = face_state.weight(closed);
            let squeeze = closed + closed * face_state.weight(tightener);
            1.0 - squeeze.clamp(0.0, 1.0)
        };
        let left_openness = openness(Expressions::EyesClosedL, Expressions::LidTightenerL);
        let right_openness = openness(Expressions::EyesClosedR, Expressions::LidTightenerR);

        data.eye.left.openness = self
            .smoother
            .filter(Slot::Openness(Eye::Left), left_openness, valid);
        data.eye.right.openness = self
            .smoother
            .filter(Slot::Openness(Eye::Right), right_openness, valid);

        let (left_gaze, right_gaze) = gaze::resolve(
            &mut self.smoother,
            face_state.left_eye_pose.orientation,
            face_state.right_eye_pose.orientation,
            valid,
        );
        data.eye.left.gaze = left_gaze;
        data.eye.right.gaze = right_gaze;

        // Not measured by the streamer.
        data.eye.left.pupil_diameter_mm = PUPIL_DIAMETER_MM;
        data.eye.right.pupil_diameter_mm = PUPIL_DIAMETER_MM;
        data.eye.min_dilation = MIN_DILATION;
        data.eye.max_dilation = MAX_DILATION;
    }

    fn update_expressions(&mut self, data: &mut UnifiedTrackingData, face_state: &FaceState) {
        let valid = face_state.expressions_valid();

        for unified in UnifiedExpressions::all() {
            let raw = self.mapping.lookup(face_state, unified);
            let weight = self.smoother.filter(Slot::Shape(unified), raw, valid);
            data.set_shape(unified, weight);
        }

        let w = |expression: Expressions| face_state.weight(expression);

        // Nose wrinkle leaks into the upper lip raiser.
        let upper_up_left =
            (w(Expressions::UpperLipRaiserL) - w(Expressions::NoseWrinklerL)).max(0.0);
        let upper_up_right =
            (w(Expressions::UpperLipRaiserR) - w(Expressions::NoseWrinklerR)).max(0.0);
        let suck_upper_left = (1.0 - w(Expressions::UpperLipRaiserL).powf(1.0 / 6.0))
            .min(w(Expressions::LipSuckLt));
        let suck_upper_right = (1.0 - w(Expressions::UpperLipRaiserR).powf(1.0 / 6.0))
            .min(w(Expressions::LipSuckRt));

        let composites = [
            (UnifiedExpressions::MouthUpperUpLeft, upper_up_left),
            (UnifiedExpressions::MouthUpperDeepenLeft, upper_up_left),
            (UnifiedExpressions::MouthUpperUpRight, upper_up_right),
            (UnifiedExpressions::MouthUpperDeepenRight, upper_up_right),
            (UnifiedExpressions::LipSuckUpperLeft, suck_upper_left),
            (UnifiedExpressions::LipSuckUpperRight, suck_upper_right),
        ];
        for (unified, raw) in composites {
            let weight = self.smoother.filter(Slot::Composite(unified), raw, valid);
            data.set_shape(unified, weight);
        }

        data.set_shape(UnifiedExpressions::TongueOut, 0.0);
    }
}

impl Default for VirtualDesktopModule {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackingModule for VirtualDesktopModule {
    fn supported(&self) -> ModuleSupport {
        ModuleSupport::ALL
    }

    fn initialize(
        &mut self,
        logger: ModuleLogger,
        requested: ModuleSupport,
    ) -> Result<ModuleSupport> {
        logger.info("Initializing Virtual Desktop Module");
        if self.status() == ModuleStatus::Active {
            self.teardown();
        }

        self.reload_config(&logger);
        self.smoother = TemporalSmoother::new(self.config.smoothing_factor);

        let source = match (self.opener)(&self.config) {
            Ok(source) => source,
            Err(e) => {
                logger.error(&format!(
                    "Failed to open the face state shared memory ({:#}). Make sure the Virtual \
                     Desktop Streamer (v1.29 or later) is running.",
                    e
                ));
                self.logger = Some(logger);
                return Err(e.context("Virtual Desktop face state is unavailable"));
            }
        };

        let granted = self.supported().intersect(requested);
        logger.info(&format!(
            "Virtual Desktop Connected! (eye: {}, expression: {})",
            granted.eye, granted.expression
        ));

        self.source = Some(source);
        self.enabled = granted;
        self.connection = ConnectionState::Unknown;
        self.last_state = None;
        self.last_signal = Some(Instant::now());
        self.logger = Some(logger);
        Ok(granted)
    }

    fn update(&mut self, data: &mut UnifiedTrackingData) -> Result<()> {
        let timeout = self.config.wait_timeout();
        let Some(source) = self.source.as_mut() else {
            thread::sleep(INACTIVE_SLEEP);
            return Err(anyhow!("Virtual Desktop module is not active"));
        };

        let wait = source.wait(timeout);
        let read = source.read();

        match wait {
            WaitResult::Signaled => {
                self.last_signal = Some(Instant::now());
                match read {
                    Ok(face_state) => {
                        if self.enabled.eye {
                            self.update_eye_data(data, &face_state);
                        }
                        if self.enabled.expression {
                            self.update_expressions(data, &face_state);
                        }
                        self.set_tracking(face_state.is_tracking());
                        self.last_state = Some(face_state);
                        Ok(())
                    }
                    Err(e) => {
                        if let Some(logger) = &self.logger {
                            logger.debug(&format!("Dropped face state: {:#}", e));
                        }
                        self.set_tracking(false);
                        Err(e)
                    }
                }
            }
            WaitResult::TimedOut => {
                // Flags only; nothing is smoothed without a new frame.
                if let Ok(face_state) = read {
                    self.last_state = Some(face_state);
                }
                let tracking = !self.signal_is_stale()
                    && self.last_state.as_ref().is_some_and(FaceState::is_tracking);
                self.set_tracking(tracking);
                Err(anyhow!("No new frame"))
            }
        }
    }

    fn teardown(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.close();
            if let Some(logger) = &self.logger {
                logger.debug("Released Virtual Desktop face state handles");
                logger.info("Virtual Desktop Disconnected.");
            }
        }
        self.connection = ConnectionState::Unknown;
        self.last_state = None;
        self.last_signal = None;
        self.enabled = ModuleSupport::NONE;
        self.smoother.reset();
    }
}
