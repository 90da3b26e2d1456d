//! Engine configuration.

use std::time::Duration;

use vtgfx::StoreConfig;
use vtgrid::scrollback::SpillConfig;
use vtparse::{ParserConfig, PendingConfig};
use vtreport::PasteConfig;
use vtscreen::{ClipboardConfig, ScreenConfig};

/// All engine knobs in one place. The defaults match the reference
/// behavior: 10k scrollback lines, a 320 MiB image quota, 100 ms
/// synchronized-update timeout.
#[derive(Debug, Clone)]
pub struct Config {
    pub scrollback_lines: usize,
    pub scrollback_spill: Option<SpillConfig>,
    /// Cell geometry in pixels, for size reports and image layout.
    pub cell_width: u32,
    pub cell_height: u32,
    pub clipboard: ClipboardConfig,
    pub graphics: StoreConfig,
    pub paste: PasteConfig,
    /// Synchronized-update buffering limits.
    pub pending_bytes: usize,
    pub pending_timeout: Duration,
    /// OSC/DCS/APC payload cap.
    pub max_escape_payload: usize,
}

impl Default for Config {
    fn default() -> Self {
        let pending = PendingConfig::default();
        Self {
            scrollback_lines: 10_000,
            scrollback_spill: None,
            cell_width: 10,
            cell_height: 20,
            clipboard: ClipboardConfig::default(),
            graphics: StoreConfig::default(),
            paste: PasteConfig::default(),
            pending_bytes: pending.max_bytes,
            pending_timeout: pending.timeout,
            max_escape_payload: ParserConfig::default().max_string_len,
        }
    }
}

impl Config {
    pub(crate) fn parser_config(&self) -> ParserConfig {
        ParserConfig {
            max_string_len: self.max_escape_payload,
            pending: PendingConfig {
                max_bytes: self.pending_bytes,
                timeout: self.pending_timeout,
            },
        }
    }

    pub(crate) fn screen_config(&self) -> ScreenConfig {
        ScreenConfig {
            scrollback_lines: self.scrollback_lines,
            scrollback_spill: self.scrollback_spill.clone(),
            cell_width: self.cell_width,
            cell_height: self.cell_height,
            clipboard: self.clipboard,
            graphics: self.graphics,
        }
    }
}
