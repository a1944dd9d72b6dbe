use crate::error::AlertDeliveryError;
use crate::process;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

/// Audible alert channel
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SoundPlayer: Send + Sync {
    /// Play the alert; `message` is spoken when no sound asset is available
    async fn play(&self, message: &str) -> Result<(), AlertDeliveryError>;
}

/// Plays a sound file (`afplay`), falling back to speech synthesis (`say`)
#[derive(Debug, Clone)]
pub struct SystemSoundPlayer {
    sound_file: Option<PathBuf>,
    player_command: Vec<String>,
    speech_command: Vec<String>,
    timeout: Duration,
}

impl SystemSoundPlayer {
    pub fn new(
        sound_file: Option<PathBuf>,
        player_command: Vec<String>,
        speech_command: Vec<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            sound_file,
            player_command,
            speech_command,
            timeout,
        }
    }

    /// Command line that `play` would run for `message`
    pub fn command_for(&self, message: &str) -> Vec<String> {
        match self.sound_file.as_ref().filter(|path| path.exists()) {
            Some(path) => {
                let mut argv = self.player_command.clone();
                argv.push(path.display().to_string());
                argv
            }
            None => {
                if let Some(path) = &self.sound_file {
                    warn!(
                        "Sound asset {} missing, falling back to speech",
                        path.display()
                    );
                }
                let mut argv = self.speech_command.clone();
                argv.push(message.to_string());
                argv
            }
        }
    }
}

#[async_trait]
impl SoundPlayer for SystemSoundPlayer {
    async fn play(&self, message: &str) -> Result<(), AlertDeliveryError> {
        let argv = self.command_for(message);
        process::run_command(&argv, None, self.timeout)
            .await
            .map_err(AlertDeliveryError::Sound)?;
        debug!("Alert sound played");
        Ok(())
    }
}
