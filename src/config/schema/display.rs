use serde::{Deserialize, Serialize};

fn default_fpp_host() -> String {
    "http://127.0.0.1".to_string()
}

fn default_overlay_model() -> String {
    "Texting Matrix".to_string()
}

fn default_text_color() -> String {
    "#FF0000".to_string()
}

fn default_text_font() -> String {
    "FreeSans".to_string()
}

fn default_text_font_size() -> u32 {
    48
}

fn default_text_position() -> String {
    "Center".to_string()
}

fn default_scroll_speed() -> u32 {
    20
}

fn default_message_template() -> String {
    "Merry Christmas {name}!".to_string()
}

fn default_duration_secs() -> u64 {
    10
}

fn default_trigger_timeout_secs() -> u64 {
    10
}

fn default_playlist_settle_ms() -> u64 {
    1000
}

fn default_shutdown_grace_secs() -> u64 {
    30
}

/// What the display loop does with an in-progress show on shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ShutdownPolicy {
    /// Let the current hold period run out (bounded by `shutdownGraceSecs`).
    #[default]
    FinishCurrent,
    /// Stop immediately, leaving the overlay to be cleared.
    Abandon,
}

/// FPP display target plus the timing of each show.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_fpp_host", rename = "fppHost")]
    pub fpp_host: String,
    /// Playlist started underneath the text; empty skips the playlist switch.
    #[serde(default, rename = "nameDisplayPlaylist")]
    pub name_display_playlist: String,
    /// Overlay model the text is drawn on; empty skips the text overlay.
    #[serde(default = "default_overlay_model", rename = "overlayModelName")]
    pub overlay_model_name: String,
    #[serde(default = "default_text_color", rename = "textColor")]
    pub text_color: String,
    #[serde(default = "default_text_font", rename = "textFont")]
    pub text_font: String,
    #[serde(default = "default_text_font_size", rename = "textFontSize")]
    pub text_font_size: u32,
    /// `Center` for static text, or a scroll direction: `L2R`, `R2L`, `T2B`, `B2T`.
    #[serde(default = "default_text_position", rename = "textPosition")]
    pub text_position: String,
    #[serde(default = "default_scroll_speed", rename = "scrollSpeed")]
    pub scroll_speed: u32,
    /// Rendered text; `{name}` is replaced with the display name.
    #[serde(default = "default_message_template", rename = "messageTemplate")]
    pub message_template: String,
    #[serde(default = "default_duration_secs", rename = "durationSecs")]
    pub duration_secs: u64,
    #[serde(
        default = "default_trigger_timeout_secs",
        rename = "triggerTimeoutSecs"
    )]
    pub trigger_timeout_secs: u64,
    #[serde(default = "default_playlist_settle_ms", rename = "playlistSettleMs")]
    pub playlist_settle_ms: u64,
    /// Start the next scheduled FPP item once the queue drains.
    #[serde(default = "super::default_true", rename = "returnToSchedule")]
    pub return_to_schedule: bool,
    #[serde(default, rename = "shutdownPolicy")]
    pub shutdown_policy: ShutdownPolicy,
    #[serde(
        default = "default_shutdown_grace_secs",
        rename = "shutdownGraceSecs"
    )]
    pub shutdown_grace_secs: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            fpp_host: default_fpp_host(),
            name_display_playlist: String::new(),
            overlay_model_name: default_overlay_model(),
            text_color: default_text_color(),
            text_font: default_text_font(),
            text_font_size: default_text_font_size(),
            text_position: default_text_position(),
            scroll_speed: default_scroll_speed(),
            message_template: default_message_template(),
            duration_secs: default_duration_secs(),
            trigger_timeout_secs: default_trigger_timeout_secs(),
            playlist_settle_ms: default_playlist_settle_ms(),
            return_to_schedule: true,
            shutdown_policy: ShutdownPolicy::default(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}
