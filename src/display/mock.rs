use super::{DisplayTrigger, render_template};
use crate::errors::MarqueeError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Records presented messages and tracks how many are on screen at once.
#[derive(Clone, Default)]
pub(crate) struct RecordingTrigger {
    pub shown: Arc<Mutex<Vec<String>>>,
    pub finished: Arc<Mutex<Vec<bool>>>,
    pub on_screen: Arc<AtomicUsize>,
    pub max_on_screen: Arc<AtomicUsize>,
    pub fail: Arc<AtomicBool>,
    pub hang: Arc<AtomicBool>,
}

impl RecordingTrigger {
    pub fn shown(&self) -> Vec<String> {
        self.shown.lock().unwrap().clone()
    }
}

#[async_trait]
impl DisplayTrigger for RecordingTrigger {
    async fn present_name(
        &self,
        display_name: &str,
        _overlay_target: &str,
        template: &str,
    ) -> Result<(), MarqueeError> {
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(MarqueeError::DisplayTrigger("controller offline".into()));
        }
        let now = self.on_screen.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_on_screen.fetch_max(now, Ordering::SeqCst);
        self.shown
            .lock()
            .unwrap()
            .push(render_template(template, display_name));
        Ok(())
    }

    async fn finish_presentation(
        &self,
        _overlay_target: &str,
        resume_schedule: bool,
    ) -> Result<(), MarqueeError> {
        self.on_screen.fetch_sub(1, Ordering::SeqCst);
        self.finished.lock().unwrap().push(resume_schedule);
        Ok(())
    }
}
