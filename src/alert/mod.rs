//! Alerting for prolonged outages
//!
//! - Sound channel (asset playback with speech fallback)
//! - Email channel over SMTP
//! - Dispatcher that applies the threshold and repeat throttle

pub mod dispatcher;
pub mod mail;
pub mod sound;

pub use dispatcher::{
    humanize_duration, AlertDecision, AlertDispatcher, AlertPolicy, DeliveryReport, ServiceAlert,
};
pub use mail::{Mailer, SmtpMailer, SmtpSettings};
pub use sound::{SoundPlayer, SystemSoundPlayer};
