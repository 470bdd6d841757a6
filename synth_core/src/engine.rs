//! The acoustic-model capability consumed by the scheduler.

use std::fs;
use std::path::Path;

use crate::error::{Result, SynthError};
use crate::label::Label;
use crate::model::{Frame, Model};
use crate::model_queue::ModelEntry;

/// Maximum number of tokens accepted from an engine configuration file.
pub const MAX_ARGS: usize = 100;
/// Maximum length of a single token, in bytes.
pub const MAX_ARG_LEN: usize = 1024;

/// Acoustic-model inference: duration, parameter and global-variance
/// computation into the [`Model`] accumulator, plus trajectory smoothing
/// over a window of queued snapshots.
pub trait Engine: Send {
    /// One-time initialization from the configuration token list.
    fn load(&mut self, args: &EngineArgs) -> Result<()>;

    /// Validate, and normalize if needed, the model's interpolation weights.
    fn check_interpolation_weights(&self, model: &mut Model) -> Result<()>;

    fn compute_duration(&self, model: &mut Model, label: &Label) -> Result<()>;

    fn compute_parameters(&self, model: &mut Model, label: &Label) -> Result<()>;

    fn compute_global_variance(&self, model: &mut Model, label: &Label) -> Result<()>;

    /// Smooth the trajectories of every entry in `window`, oldest first,
    /// writing each entry's `model.trajectory`.
    fn optimize(&self, window: &mut [ModelEntry]);

    /// Turn an optimized model into frames, appended to `out`.
    fn render(&self, model: &Model, out: &mut Vec<Frame>);
}

/// Owned engine arguments, read from a line-oriented configuration file
/// where tokens are separated by whitespace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineArgs(Vec<String>);

impl EngineArgs {
    pub fn new(args: Vec<String>) -> Result<Self> {
        if args.len() > MAX_ARGS {
            return Err(SynthError::ConfigLoad(format!(
                "too many arguments ({} > {MAX_ARGS})",
                args.len()
            )));
        }
        if let Some(arg) = args.iter().find(|a| a.len() > MAX_ARG_LEN) {
            return Err(SynthError::ConfigLoad(format!(
                "argument longer than {MAX_ARG_LEN} bytes: {}...",
                &arg[..arg.char_indices().nth(32).map_or(arg.len(), |(i, _)| i)]
            )));
        }
        Ok(Self(args))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let tokens = text
            .lines()
            .flat_map(str::split_whitespace)
            .map(str::to_string)
            .collect();
        Self::new(tokens)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref()).map_err(|e| {
            SynthError::ConfigLoad(format!("could not open {}: {e}", path.as_ref().display()))
        })?;
        Self::parse(&text)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// The value following `flag`, if the flag is present.
    pub fn value_of(&self, flag: &str) -> Option<&str> {
        let mut it = self.iter();
        it.find(|a| *a == flag)?;
        it.next()
    }
}
