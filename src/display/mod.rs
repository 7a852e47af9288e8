pub mod fpp;

use crate::errors::MarqueeError;
use async_trait::async_trait;

pub use fpp::FppClient;

/// Renders one name on the light display.
#[async_trait]
pub trait DisplayTrigger: Send + Sync {
    /// Put `display_name` on `overlay_target` using `template` (`{name}` is
    /// replaced). Returns once the controller accepted the command.
    async fn present_name(
        &self,
        display_name: &str,
        overlay_target: &str,
        template: &str,
    ) -> Result<(), MarqueeError>;

    /// Called once the hold elapsed. `resume_schedule` is set when nothing
    /// else is waiting and the show should go back to its schedule.
    async fn finish_presentation(
        &self,
        _overlay_target: &str,
        _resume_schedule: bool,
    ) -> Result<(), MarqueeError> {
        Ok(())
    }
}

/// Fill `{name}` in a display template.
pub fn render_template(template: &str, display_name: &str) -> String {
    template.replace("{name}", display_name)
}

#[cfg(test)]
pub(crate) mod mock;
