//! Backend commands queued from the terminal to the backend worker.

#[derive(Debug, Clone, PartialEq)]
pub enum BackendCommand {
    Load { input: String },
    Select { menu_id: String, index: usize },
    Home,
    Refresh,
    SwitchMode { mode_id: String },
    CycleMode,
    Click { x: f32, y: f32 },
    ReloadHub,
    RefreshTicker,
    Shutdown,
}

impl BackendCommand {
    pub fn name(&self) -> &'static str {
        match self {
            BackendCommand::Load { .. } => "load",
            BackendCommand::Select { .. } => "select",
            BackendCommand::Home => "home",
            BackendCommand::Refresh => "refresh",
            BackendCommand::SwitchMode { .. } => "switch_mode",
            BackendCommand::CycleMode => "cycle_mode",
            BackendCommand::Click { .. } => "click",
            BackendCommand::ReloadHub => "reload_hub",
            BackendCommand::RefreshTicker => "refresh_ticker",
            BackendCommand::Shutdown => "shutdown",
        }
    }
}
