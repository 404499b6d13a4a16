use autocrop_types::{DetectorSettings, PipelineCommand, PipelineError, Rect};

/// The video pipeline the engine drives.
///
/// Only detector configuration can fail; a rejected configuration disables
/// the engine for the rest of the file.
pub trait CropPipeline {
    fn configure_detector(&mut self, settings: DetectorSettings) -> Result<(), PipelineError>;

    fn remove_detector(&mut self);

    fn apply_crop(&mut self, rect: Rect);

    /// Restores the uncropped frame.
    fn remove_crop(&mut self);
}

impl<P: CropPipeline + ?Sized> CropPipeline for Box<P> {
    fn configure_detector(&mut self, settings: DetectorSettings) -> Result<(), PipelineError> {
        (**self).configure_detector(settings)
    }

    fn remove_detector(&mut self) {
        (**self).remove_detector();
    }

    fn apply_crop(&mut self, rect: Rect) {
        (**self).apply_crop(rect);
    }

    fn remove_crop(&mut self) {
        (**self).remove_crop();
    }
}

/// In-memory pipeline that keeps every command it receives.
#[derive(Debug, Default, Clone)]
pub struct CommandRecorder {
    commands: Vec<PipelineCommand>,
    reject_detector: Option<String>,
}

impl CommandRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A recorder whose detector refuses every configuration.
    pub fn rejecting(reason: impl Into<String>) -> Self {
        Self {
            commands: Vec::new(),
            reject_detector: Some(reason.into()),
        }
    }

    /// Makes every later detector configuration fail.
    pub fn reject_detector(&mut self, reason: impl Into<String>) {
        self.reject_detector = Some(reason.into());
    }

    pub fn commands(&self) -> &[PipelineCommand] {
        &self.commands
    }

    /// Removes and returns the commands recorded so far.
    pub fn drain(&mut self) -> Vec<PipelineCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Crop changes only, with source restores reported as `None`.
    pub fn crop_changes(&self) -> Vec<Option<Rect>> {
        self.commands
            .iter()
            .filter_map(|command| match command {
                PipelineCommand::ApplyCrop(rect) => Some(Some(*rect)),
                PipelineCommand::RemoveCrop => Some(None),
                _ => None,
            })
            .collect()
    }

    pub fn thresholds(&self) -> Vec<u32> {
        self.commands
            .iter()
            .filter_map(|command| match command {
                PipelineCommand::ConfigureDetector(settings) => Some(settings.threshold),
                _ => None,
            })
            .collect()
    }
}

impl CropPipeline for CommandRecorder {
    fn configure_detector(&mut self, settings: DetectorSettings) -> Result<(), PipelineError> {
        if let Some(reason) = &self.reject_detector {
            return Err(PipelineError::rejected(reason.clone()));
        }
        self.commands.push(PipelineCommand::ConfigureDetector(settings));
        Ok(())
    }

    fn remove_detector(&mut self) {
        self.commands.push(PipelineCommand::RemoveDetector);
    }

    fn apply_crop(&mut self, rect: Rect) {
        self.commands.push(PipelineCommand::ApplyCrop(rect));
    }

    fn remove_crop(&mut self) {
        self.commands.push(PipelineCommand::RemoveCrop);
    }
}
