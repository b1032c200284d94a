use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::timeline::TimelineIndex;

/// Trailing window before the end of the timeline that fades out, in seconds.
pub const DEFAULT_FADE_DURATION: f64 = 1.5;
/// Extra scale reached by an item at the end of its display time.
pub const DEFAULT_ZOOM_FACTOR: f64 = 0.08;

/// Failure reported by a host audio output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("audio channel: {0}")]
pub struct AudioError(pub String);

/// Host audio output following the playback clock.
pub trait AudioChannel {
    /// Points the channel at a new audio source URL.
    fn load(&mut self, source: &str) -> Result<(), AudioError>;

    fn seek(&mut self, seconds: f64) -> Result<(), AudioError>;

    fn play(&mut self) -> Result<(), AudioError>;

    fn pause(&mut self) -> Result<(), AudioError>;

    /// Sets linear gain in `[0, 1]`.
    fn set_volume(&mut self, volume: f64) -> Result<(), AudioError>;
}

/// Audio channel for hosts without audio output.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentAudio;

impl AudioChannel for SilentAudio {
    fn load(&mut self, _source: &str) -> Result<(), AudioError> {
        Ok(())
    }

    fn seek(&mut self, _seconds: f64) -> Result<(), AudioError> {
        Ok(())
    }

    fn play(&mut self) -> Result<(), AudioError> {
        Ok(())
    }

    fn pause(&mut self) -> Result<(), AudioError> {
        Ok(())
    }

    fn set_volume(&mut self, _volume: f64) -> Result<(), AudioError> {
        Ok(())
    }
}

/// Everything a host needs to draw one playback frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackFrame {
    pub current_time: f64,
    pub active_index: Option<usize>,
    pub item_id: Option<String>,
    /// Fraction of the active item's display time already shown.
    pub item_progress: f64,
    pub scale: f64,
    pub opacity: f64,
    pub volume: f64,
}

/// Output level in the end-of-timeline fade.
///
/// # Example
/// ```
/// use engine::sync::fade_level;
///
/// assert_eq!(fade_level(9.25, 10.0, 1.5), 0.5);
/// assert_eq!(fade_level(8.0, 10.0, 1.5), 1.0);
/// ```
pub fn fade_level(current_time: f64, total: f64, fade_duration: f64) -> f64 {
    if fade_duration <= 0.0 || total <= fade_duration {
        return 1.0;
    }
    let fade_start = total - fade_duration;
    if current_time < fade_start {
        return 1.0;
    }
    let progress = ((current_time - fade_start) / fade_duration).clamp(0.0, 1.0);
    1.0 - progress
}

/// Derives per-item animation and audio levels from the playback clock.
#[derive(Debug)]
pub struct SyncController {
    fade_duration: f64,
    zoom_factor: f64,
    active: Option<usize>,
    item_elapsed: f64,
    last_sample: Option<Duration>,
}

impl SyncController {
    pub fn new(fade_duration: f64, zoom_factor: f64) -> Self {
        Self {
            fade_duration,
            zoom_factor,
            active: None,
            item_elapsed: 0.0,
            last_sample: None,
        }
    }

    /// Forgets the active item so the next frame restarts its animation.
    pub fn reset(&mut self) {
        self.active = None;
        self.item_elapsed = 0.0;
        self.last_sample = None;
    }

    /// Samples the state for `current_time`.
    ///
    /// The in-item animation timer restarts whenever the active index changes
    /// and only advances while `running`.
    pub fn frame(
        &mut self,
        now: Duration,
        current_time: f64,
        running: bool,
        index: &TimelineIndex,
    ) -> PlaybackFrame {
        let active = index.resolve(current_time);
        if active != self.active {
            debug!(from = ?self.active, to = ?active, current_time, "active item changed");
            self.active = active;
            self.item_elapsed = 0.0;
        } else if running {
            if let Some(last) = self.last_sample {
                self.item_elapsed += now.saturating_sub(last).as_secs_f64();
            }
        }
        self.last_sample = running.then_some(now);

        let item_progress = active
            .and_then(|position| index.duration_of(position))
            .filter(|duration| *duration > 0.0)
            .map(|duration| (self.item_elapsed / duration).clamp(0.0, 1.0))
            .unwrap_or(0.0);
        let level = fade_level(current_time, index.total(), self.fade_duration);

        PlaybackFrame {
            current_time,
            active_index: active,
            item_id: active
                .and_then(|position| index.item_id(position))
                .map(str::to_owned),
            item_progress,
            scale: 1.0 + item_progress * self.zoom_factor,
            opacity: level,
            volume: level,
        }
    }

    /// Positions and starts the audio channel at `current_time`.
    ///
    /// Called on play, resume and explicit seeks, never on ordinary ticks.
    pub fn align_audio<A: AudioChannel>(&self, audio: &mut A, current_time: f64, running: bool) {
        if let Err(error) = audio.seek(current_time) {
            warn!(%error, current_time, "audio seek failed");
        }
        if running {
            if let Err(error) = audio.play() {
                warn!(%error, "audio playback was refused");
            }
        }
    }

    pub fn pause_audio<A: AudioChannel>(&self, audio: &mut A) {
        if let Err(error) = audio.pause() {
            warn!(%error, "audio pause failed");
        }
    }

    pub fn apply_volume<A: AudioChannel>(&self, audio: &mut A, frame: &PlaybackFrame) {
        if let Err(error) = audio.set_volume(frame.volume) {
            warn!(%error, volume = frame.volume, "audio volume update failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{AudioChannel, AudioError, SyncController, fade_level};
    use crate::project::{Item, MediaRefs, Orientation};
    use crate::timeline::TimelineIndex;

    fn index(durations: &[f64]) -> TimelineIndex {
        let items: Vec<Item> = durations
            .iter()
            .enumerate()
            .map(|(order, duration)| Item {
                id: format!("item-{order}"),
                order: order as u32,
                duration: *duration,
                orientation: Orientation::Portrait,
                width: 1080,
                height: 1920,
                media: MediaRefs::default(),
            })
            .collect();
        TimelineIndex::rebuild(&items)
    }

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn fade_is_linear_inside_the_trailing_window() {
        assert_eq!(fade_level(9.25, 10.0, 1.5), 0.5);
        assert_eq!(fade_level(8.0, 10.0, 1.5), 1.0);
        assert_eq!(fade_level(10.0, 10.0, 1.5), 0.0);
    }

    #[test]
    fn short_timelines_never_fade() {
        assert_eq!(fade_level(1.2, 1.5, 1.5), 1.0);
        assert_eq!(fade_level(0.9, 1.0, 1.5), 1.0);
    }

    #[test]
    fn item_progress_restarts_on_index_change() {
        let timeline = index(&[2.0, 2.0]);
        let mut sync = SyncController::new(1.5, 0.08);

        let first = sync.frame(ms(0), 0.0, true, &timeline);
        assert_eq!(first.active_index, Some(0));
        assert_eq!(first.item_progress, 0.0);
        assert_eq!(first.scale, 1.0);

        let halfway = sync.frame(ms(1_000), 1.0, true, &timeline);
        assert!((halfway.item_progress - 0.5).abs() < 1e-9);
        assert!((halfway.scale - 1.04).abs() < 1e-9);

        let next = sync.frame(ms(2_000), 2.0, true, &timeline);
        assert_eq!(next.item_id.as_deref(), Some("item-1"));
        assert_eq!(next.item_progress, 0.0);
    }

    #[test]
    fn item_progress_holds_while_paused() {
        let timeline = index(&[4.0]);
        let mut sync = SyncController::new(1.5, 0.08);
        sync.frame(ms(0), 0.0, true, &timeline);
        sync.frame(ms(1_000), 1.0, true, &timeline);
        let paused = sync.frame(ms(1_500), 1.0, false, &timeline);

        let later = sync.frame(ms(9_000), 1.0, false, &timeline);
        assert!((paused.item_progress - 0.25).abs() < 1e-9);
        assert_eq!(later.item_progress, paused.item_progress);
    }

    #[test]
    fn frame_carries_fade_level_as_opacity_and_volume() {
        let timeline = index(&[5.0, 5.0]);
        let mut sync = SyncController::new(1.5, 0.08);

        let frame = sync.frame(ms(0), 9.25, true, &timeline);
        assert_eq!(frame.opacity, 0.5);
        assert_eq!(frame.volume, 0.5);
    }

    #[test]
    fn audio_failures_are_swallowed() {
        let sync = SyncController::new(1.5, 0.08);
        let mut audio = RefusingAudio::default();

        sync.align_audio(&mut audio, 3.0, true);
        sync.pause_audio(&mut audio);

        assert_eq!(audio.attempts, 3);
    }

    #[derive(Debug, Default)]
    struct RefusingAudio {
        attempts: usize,
    }

    impl AudioChannel for RefusingAudio {
        fn load(&mut self, _source: &str) -> Result<(), AudioError> {
            Ok(())
        }

        fn seek(&mut self, _seconds: f64) -> Result<(), AudioError> {
            self.attempts += 1;
            Err(AudioError("no device".to_owned()))
        }

        fn play(&mut self) -> Result<(), AudioError> {
            self.attempts += 1;
            Err(AudioError("autoplay blocked".to_owned()))
        }

        fn pause(&mut self) -> Result<(), AudioError> {
            self.attempts += 1;
            Err(AudioError("no device".to_owned()))
        }

        fn set_volume(&mut self, _volume: f64) -> Result<(), AudioError> {
            Ok(())
        }
    }
}
