//! Process utilities for spawning the local model CLI.
//!
//! On Windows, console applications spawn with a visible command prompt window
//! by default. `HideConsoleWindow` suppresses it; elsewhere it is a no-op.

/// Windows creation flag to prevent console window creation
#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x08000000;

pub trait HideConsoleWindow {
    fn hide_console_window(&mut self) -> &mut Self;
}

#[cfg(windows)]
impl HideConsoleWindow for tokio::process::Command {
    fn hide_console_window(&mut self) -> &mut Self {
        self.creation_flags(CREATE_NO_WINDOW)
    }
}

#[cfg(not(windows))]
impl HideConsoleWindow for tokio::process::Command {
    fn hide_console_window(&mut self) -> &mut Self {
        self
    }
}
