use log::*;
use std::fmt;

/// Which of the two inputs a stage is working on.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ImageIndex {
    First,
    Second,
}

impl fmt::Display for ImageIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageIndex::First => write!(f, "first"),
            ImageIndex::Second => write!(f, "second"),
        }
    }
}

/// The milestones of one flow computation, in the order they are reached.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Stage {
    ScaleMap(ImageIndex),
    DescriptorField(ImageIndex),
    Flow,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::ScaleMap(image) => {
                write!(f, "Calculating the scale map for the {image} image...")
            }
            Stage::DescriptorField(image) => write!(f, "Creating the {image} SIFT image..."),
            Stage::Flow => write!(f, "Doing coarse to fine SIFT flow..."),
        }
    }
}

/// Receives milestones as a computation passes them.
pub trait Progress {
    fn stage(&mut self, stage: Stage);
}

impl<F> Progress for F
where
    F: FnMut(Stage),
{
    fn stage(&mut self, stage: Stage) {
        self(stage)
    }
}

/// Reports every milestone through the `log` facade at `info` level.
#[derive(Debug, Copy, Clone, Default)]
pub struct LogProgress;

impl Progress for LogProgress {
    fn stage(&mut self, stage: Stage) {
        info!("{}", stage);
    }
}
