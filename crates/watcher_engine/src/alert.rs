use std::io::Write;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use watcher_logging::{watch_debug, watch_info, watch_warn};

/// Spoken when speech is off or unavailable.
const CUE_TEXT: &str = "New items in stock.";
/// Words per minute at speech rate 1.0.
const BASE_WPM: f32 = 175.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Announcement {
    pub names: Vec<String>,
    pub use_speech: bool,
    pub speech_rate: f32,
}

/// Plays an alert; resolves when the alert has finished.
#[async_trait::async_trait]
pub trait AlertNotifier: Send + Sync {
    async fn announce(&self, announcement: &Announcement);
}

/// External program invocation. `{text}` and `{wpm}` in args are substituted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    fn render(&self, text: &str, wpm: u32) -> Vec<String> {
        let wpm = wpm.to_string();
        self.args
            .iter()
            .map(|arg| arg.replace("{text}", text).replace("{wpm}", &wpm))
            .collect()
    }

    async fn run(&self, text: &str, wpm: u32) -> bool {
        let status = Command::new(&self.program)
            .args(self.render(text, wpm))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        match status {
            Ok(status) if status.success() => true,
            Ok(status) => {
                watch_warn!("{} exited with {status}", self.program);
                false
            }
            Err(err) => {
                watch_warn!("could not run {}: {err}", self.program);
                false
            }
        }
    }
}

/// Speaks matched names through an external TTS command, falling back to a
/// cue command and finally the terminal bell.
#[derive(Debug, Default)]
pub struct CommandNotifier {
    speech: Option<CommandSpec>,
    cue: Option<CommandSpec>,
    speaking: AtomicBool,
}

impl CommandNotifier {
    pub fn new(speech: Option<CommandSpec>, cue: Option<CommandSpec>) -> Self {
        Self {
            speech,
            cue,
            speaking: AtomicBool::new(false),
        }
    }

    async fn speak(&self, speech: &CommandSpec, announcement: &Announcement) -> bool {
        if self.speaking.swap(true, Ordering::SeqCst) {
            watch_debug!("speech already playing; using cue");
            return false;
        }
        let text = speech_text(&announcement.names);
        watch_info!("announcing: {text}");
        let spoken = speech.run(&text, words_per_minute(announcement.speech_rate)).await;
        self.speaking.store(false, Ordering::SeqCst);
        spoken
    }

    async fn cue(&self) {
        if let Some(cue) = &self.cue {
            if cue.run(CUE_TEXT, words_per_minute(1.0)).await {
                return;
            }
        }
        watch_info!("{CUE_TEXT}");
        let mut stderr = std::io::stderr();
        let _ = stderr.write_all(b"\x07");
        let _ = stderr.flush();
    }
}

#[async_trait::async_trait]
impl AlertNotifier for CommandNotifier {
    async fn announce(&self, announcement: &Announcement) {
        if announcement.use_speech && !announcement.names.is_empty() {
            if let Some(speech) = &self.speech {
                if self.speak(speech, announcement).await {
                    return;
                }
            }
        }
        self.cue().await;
    }
}

/// Joins names for speech, dropping trailing `#N` collector numbers.
pub fn speech_text(names: &[String]) -> String {
    names
        .iter()
        .map(|name| spoken_name(name))
        .collect::<Vec<_>>()
        .join("; ")
}

fn spoken_name(name: &str) -> &str {
    let without_digits = name.trim_end_matches(|c: char| c.is_ascii_digit());
    match without_digits.strip_suffix('#') {
        Some(rest) => rest.trim(),
        None => name.trim(),
    }
}

fn words_per_minute(rate: f32) -> u32 {
    (rate * BASE_WPM).round().max(1.0) as u32
}
