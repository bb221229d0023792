//! Job payloads and their handlers.

use std::sync::Arc;

use super::JobHandler;

mod email;
mod image;
mod report;

pub use email::{EmailHandler, EmailJob};
pub use image::{ImageHandler, ImageJob};
pub use report::{ReportHandler, ReportJob, build_report_csv, month_bounds};

/// One handler per job kind.
#[must_use]
pub fn default_handlers() -> Vec<Arc<dyn JobHandler>> {
    vec![
        Arc::new(EmailHandler),
        Arc::new(ImageHandler),
        Arc::new(ReportHandler),
    ]
}
