//! Initialization-stage identifiers and timings.

use std::fmt;

use crate::time::WallTime;

/// A named phase of the enclosing runtime's startup.
///
/// Stages are timed and reported out-of-band from metric values; the full
/// ordered list is announced in the registration message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InitStage {
    RestoreConfig,
    ExecConfig,
    Restore,
    CreateProcess,
    TaskStart,
}

impl InitStage {
    /// All stages, in the order they are reported during registration.
    pub const ALL: [InitStage; 5] = [
        InitStage::RestoreConfig,
        InitStage::ExecConfig,
        InitStage::Restore,
        InitStage::CreateProcess,
        InitStage::TaskStart,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            InitStage::RestoreConfig => "restore_config",
            InitStage::ExecConfig => "exec_config",
            InitStage::Restore => "restore",
            InitStage::CreateProcess => "create_process",
            InitStage::TaskStart => "task_start",
        }
    }
}

impl fmt::Display for InitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timing data for a finished initialization stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTiming {
    pub stage: InitStage,
    pub started: WallTime,
    pub ended: WallTime,
}
