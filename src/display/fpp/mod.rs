//! Falcon Player (FPP) REST command client.

use super::{DisplayTrigger, render_template};
use crate::config::DisplayConfig;
use crate::errors::MarqueeError;
use crate::utils::http::{error_body, http_client};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

const SCROLL_POSITIONS: [&str; 4] = ["L2R", "R2L", "T2B", "B2T"];
/// Pause between stopping playlists and starting the name playlist.
pub(crate) const STOP_SETTLE: Duration = Duration::from_millis(500);

fn encode(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}

/// Percent-encode a display message, turning line breaks into `%0A`.
fn encode_message(message: &str) -> String {
    message
        .split('\n')
        .map(encode)
        .collect::<Vec<_>>()
        .join("%0A")
}

pub struct FppClient {
    base_url: String,
    config: DisplayConfig,
    client: reqwest::Client,
}

impl FppClient {
    pub fn new(config: DisplayConfig) -> Self {
        let base_url = config.fpp_host.trim_end_matches('/').to_string();
        let client = http_client(Duration::from_secs(config.trigger_timeout_secs.max(1)));
        Self {
            base_url,
            config,
            client,
        }
    }

    fn command_url(&self, command: &str, args: &[String]) -> String {
        let mut url = format!("{}/api/command/{}", self.base_url, encode(command));
        for arg in args {
            url.push('/');
            url.push_str(arg);
        }
        url
    }

    /// Overlay effect URL for `message` on `model`.
    fn overlay_url(&self, model: &str, message: &str) -> String {
        let c = &self.config;
        let color = if c.text_color.starts_with('#') {
            c.text_color.clone()
        } else {
            format!("#{}", c.text_color)
        };
        let position = c.text_position.as_str();
        let mut args = vec![encode(model), "Transparent".to_string()];
        if SCROLL_POSITIONS.contains(&position) {
            args.extend([
                encode("Scroll Text"),
                encode_message(message),
                encode(&color),
                "Center".to_string(),
                c.scroll_speed.to_string(),
                encode(&c.text_font),
                c.text_font_size.to_string(),
                "1".to_string(),
                position.to_string(),
                "0".to_string(),
            ]);
        } else {
            args.extend([
                "Text".to_string(),
                encode(&color),
                encode(&c.text_font),
                c.text_font_size.to_string(),
                "1".to_string(),
                "Center".to_string(),
                "0".to_string(),
                c.duration_secs.to_string(),
                encode_message(message),
            ]);
        }
        self.command_url("Overlay Model Effect", &args)
    }

    async fn get(&self, url: &str) -> Result<(), MarqueeError> {
        debug!("fpp: GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MarqueeError::DisplayTrigger(format!("fpp unreachable: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = error_body(response).await;
            return Err(MarqueeError::DisplayTrigger(format!(
                "fpp returned {}: {}",
                status, body
            )));
        }
        Ok(())
    }

    async fn start_name_playlist(&self, playlist: &str) -> Result<(), MarqueeError> {
        let stop_url = format!("{}/api/playlists/stop", self.base_url);
        if let Err(e) = self.get(&stop_url).await {
            warn!("fpp: could not stop playlists: {}", e);
        }
        tokio::time::sleep(STOP_SETTLE).await;

        let url = self.command_url(
            "Start Playlist",
            &[encode(playlist), "true".into(), "false".into()],
        );
        self.get(&url).await?;
        tokio::time::sleep(Duration::from_millis(self.config.playlist_settle_ms)).await;
        Ok(())
    }

    /// Cheap reachability probe for status reporting.
    pub async fn ping(&self) -> Result<(), MarqueeError> {
        self.get(&format!("{}/api/fppd/status", self.base_url)).await
    }
}

#[async_trait]
impl DisplayTrigger for FppClient {
    async fn present_name(
        &self,
        display_name: &str,
        overlay_target: &str,
        template: &str,
    ) -> Result<(), MarqueeError> {
        let playlist = self.config.name_display_playlist.trim();
        if !playlist.is_empty() {
            self.start_name_playlist(playlist).await?;
        }

        if overlay_target.is_empty() {
            debug!("fpp: no overlay model configured, playlist only");
            return Ok(());
        }
        let message = render_template(template, display_name);
        self.get(&self.overlay_url(overlay_target, &message)).await?;
        info!("fpp: showing '{}' on {}", message, overlay_target);
        Ok(())
    }

    async fn finish_presentation(
        &self,
        overlay_target: &str,
        resume_schedule: bool,
    ) -> Result<(), MarqueeError> {
        if !overlay_target.is_empty() {
            let url = self.command_url("Overlay Model Clear", &[encode(overlay_target)]);
            if let Err(e) = self.get(&url).await {
                warn!("fpp: could not clear overlay: {}", e);
            }
        }
        if resume_schedule {
            self.get(&self.command_url("Start Next Scheduled Item", &[]))
                .await?;
            debug!("fpp: resumed schedule");
        }
        Ok(())
    }
}
