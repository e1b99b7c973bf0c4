//! # Session Pair
//!
//! Relay state for one call: the telephony stream identifier, the upstream
//! handle, the commit batcher and the transcoder, driven through
//! `Idle → Streaming → Closing → Closed`.
//!
//! The pair never touches sockets. Its driver (the telephony WebSocket actor)
//! feeds it decoded events one at a time and acts on what it returns:
//! - `start` returning true means "open the upstream connection now"
//! - `relay_upstream` returning a telephony event means "send this to the call"
//! - a closed pair means "close the telephony socket"
//!
//! ## Lifecycle Rules:
//! - Media before the upstream is attached is dropped and counted
//! - Close is idempotent and `Closed` is terminal
//! - An upstream that finishes connecting after close is closed, never attached

use crate::audio::resampler::{DownsampleMode, UpsampleMode};
use crate::audio::transcoder::Transcoder;
use crate::config::AppConfig;
use crate::error::RelayError;
use crate::relay::batching::CommitBatcher;
use crate::relay::protocol::{
    InputTranscription, MediaFrame, SessionConfig, StreamStart, TelephonyOutbound, UpstreamAction,
    UpstreamCommand,
};
use crate::relay::upstream::UpstreamHandle;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What an upstream `error` event does to the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamErrorPolicy {
    /// Log and keep streaming
    Lenient,
    /// Log and close the pair
    Strict,
}

/// What a full upstream send queue does to the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    DropFrame,
    ClosePair,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PairState {
    Idle,
    Streaming,
    Closing,
    Closed,
}

/// Settings captured when the telephony connection arrives.
#[derive(Debug, Clone)]
pub struct PairSettings {
    pub target_sample_rate: u32,
    pub commit_threshold_frames: u32,
    pub commit_on_stop: bool,
    pub error_policy: UpstreamErrorPolicy,
    pub overflow_policy: OverflowPolicy,
    pub upsample_mode: UpsampleMode,
    pub downsample_mode: DownsampleMode,
    /// Sent as `session.update` right after the upstream opens
    pub session: SessionConfig,
}

impl PairSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let relay = &config.relay;
        let upstream = &config.upstream;

        Self {
            target_sample_rate: relay.target_sample_rate,
            commit_threshold_frames: relay.commit_threshold_frames,
            commit_on_stop: relay.commit_on_stop,
            error_policy: relay.upstream_error_policy,
            overflow_policy: relay.overflow_policy,
            upsample_mode: relay.upsample_mode,
            downsample_mode: relay.downsample_mode,
            session: SessionConfig {
                modalities: vec!["text".to_string(), "audio".to_string()],
                instructions: upstream.instructions.clone(),
                voice: upstream.voice.clone(),
                input_audio_format: "pcm16".to_string(),
                output_audio_format: "pcm16".to_string(),
                input_audio_sample_rate: relay.target_sample_rate,
                output_audio_sample_rate: relay.target_sample_rate,
                input_audio_transcription: InputTranscription {
                    model: upstream.transcription_model.clone(),
                },
            },
        }
    }
}

/// Per-pair counters, reported when the pair closes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PairStats {
    /// Telephony frames appended upstream
    pub frames_to_upstream: u64,
    /// Audio deltas sent back to the call
    pub frames_to_telephony: u64,
    pub commits: u64,
    /// Frames lost to a missing upstream or a full queue
    pub frames_dropped: u64,
}

/// Result of relaying one telephony media frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaOutcome {
    Forwarded { committed: bool },
    Dropped,
    /// The pair is already closing or closed
    Ignored,
}

#[derive(Debug)]
pub struct SessionPair {
    id: Uuid,
    state: PairState,
    stream_sid: Option<String>,
    upstream: Option<UpstreamHandle>,
    batcher: CommitBatcher,
    transcoder: Transcoder,
    settings: PairSettings,
    stats: PairStats,
    created_at: DateTime<Utc>,
}

impl SessionPair {
    /// Create an idle pair.
    ///
    /// ## Errors:
    /// Fails only if the target rate is unsupported, which `AppConfig::validate`
    /// already rules out at startup.
    pub fn new(settings: PairSettings) -> Result<Self, RelayError> {
        let transcoder = Transcoder::new(
            settings.target_sample_rate,
            settings.upsample_mode,
            settings.downsample_mode,
        )?;

        Ok(Self {
            id: Uuid::new_v4(),
            state: PairState::Idle,
            stream_sid: None,
            upstream: None,
            batcher: CommitBatcher::new(settings.commit_threshold_frames),
            transcoder,
            settings,
            stats: PairStats::default(),
            created_at: Utc::now(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> PairState {
        self.state
    }

    pub fn stream_sid(&self) -> Option<&str> {
        self.stream_sid.as_deref()
    }

    pub fn stats(&self) -> PairStats {
        self.stats
    }

    pub fn is_closed(&self) -> bool {
        self.state == PairState::Closed
    }

    /// Handle a telephony start event.
    ///
    /// Returns true when the caller should open the upstream connection.
    pub fn start(&mut self, start: &StreamStart) -> bool {
        if self.state != PairState::Idle {
            warn!(
                pair_id = %self.id,
                stream_sid = %start.stream_sid,
                state = ?self.state,
                "Ignoring start event for an already started pair"
            );
            return false;
        }

        info!(
            pair_id = %self.id,
            stream_sid = %start.stream_sid,
            call_sid = start.call_sid.as_deref().unwrap_or("-"),
            "Telephony stream started"
        );
        self.stream_sid = Some(start.stream_sid.clone());
        self.state = PairState::Streaming;
        true
    }

    /// Attach a freshly connected upstream and configure its session.
    ///
    /// Returns false if the pair closed while the connection was opening; the
    /// handle is then closed without sending anything.
    pub fn attach_upstream(&mut self, mut handle: UpstreamHandle) -> Result<bool, RelayError> {
        if self.state != PairState::Streaming || self.upstream.is_some() {
            handle.close();
            info!(
                pair_id = %self.id,
                upstream_id = %handle.id(),
                "Upstream connected after the pair stopped streaming, closing it"
            );
            return Ok(false);
        }

        let session = self.settings.session.clone();
        if let Err(err) = handle.send(UpstreamCommand::SessionUpdate { session }) {
            handle.close();
            self.close();
            return Err(err);
        }

        info!(
            pair_id = %self.id,
            upstream_id = %handle.id(),
            target_rate = self.transcoder.target_rate(),
            ratio = self.transcoder.policy().ratio(),
            upsample = ?self.transcoder.policy().upsample_mode(),
            downsample = ?self.transcoder.policy().downsample_mode(),
            commit_threshold = self.batcher.threshold(),
            "Upstream attached and session configured"
        );
        self.upstream = Some(handle);
        Ok(true)
    }

    /// The upstream connection could not be opened.
    pub fn upstream_failed(&mut self) {
        warn!(pair_id = %self.id, "Upstream connection failed, closing pair");
        self.close();
    }

    /// Forward one telephony media frame upstream.
    pub fn relay_media(&mut self, frame: &MediaFrame) -> Result<MediaOutcome, RelayError> {
        match self.state {
            PairState::Closing | PairState::Closed => return Ok(MediaOutcome::Ignored),
            PairState::Idle | PairState::Streaming => {}
        }

        if self.upstream.is_none() {
            self.stats.frames_dropped += 1;
            debug!(pair_id = %self.id, "Dropping media frame, upstream not open");
            return Ok(MediaOutcome::Dropped);
        }

        let pcm = self.transcoder.telephony_to_upstream(&frame.mulaw);
        if !self.send_upstream(UpstreamCommand::append(&pcm))? {
            self.stats.frames_dropped += 1;
            return Ok(MediaOutcome::Dropped);
        }
        self.stats.frames_to_upstream += 1;
        debug!(
            pair_id = %self.id,
            mulaw_bytes = frame.mulaw.len(),
            pcm_bytes = pcm.len(),
            pending_frames = self.batcher.pending() + 1,
            "Appended audio upstream"
        );

        let committed = if self.batcher.record_frame() {
            let sent = self.send_upstream(UpstreamCommand::CommitAudio)?;
            if sent {
                self.batcher.committed();
                self.stats.commits += 1;
                debug!(pair_id = %self.id, "Committed upstream audio buffer");
            } else {
                debug!(
                    pair_id = %self.id,
                    pending_frames = self.batcher.pending(),
                    "Commit deferred to the next frame"
                );
            }
            sent
        } else {
            false
        };

        Ok(MediaOutcome::Forwarded { committed })
    }

    /// Apply one decoded upstream event.
    ///
    /// Returns the telephony event to send back, if any.
    pub fn relay_upstream(&mut self, action: UpstreamAction) -> Result<Option<TelephonyOutbound>, RelayError> {
        if self.state != PairState::Streaming {
            return Ok(None);
        }

        match action {
            UpstreamAction::SessionCreated { session_id } => {
                info!(
                    pair_id = %self.id,
                    session_id = session_id.as_deref().unwrap_or("-"),
                    "Upstream session created"
                );
                Ok(None)
            }
            UpstreamAction::AudioDelta(pcm) => {
                let stream_sid = match &self.stream_sid {
                    Some(sid) => sid,
                    None => return Ok(None),
                };

                let mulaw = self.transcoder.upstream_to_telephony(&pcm)?;
                self.stats.frames_to_telephony += 1;
                debug!(
                    pair_id = %self.id,
                    pcm_bytes = pcm.len(),
                    mulaw_bytes = mulaw.len(),
                    "Relaying audio to telephony"
                );
                Ok(Some(TelephonyOutbound::media(stream_sid, &mulaw)))
            }
            UpstreamAction::Error(message) => {
                warn!(pair_id = %self.id, error = %message, "Upstream reported an error");
                match self.settings.error_policy {
                    UpstreamErrorPolicy::Lenient => Ok(None),
                    UpstreamErrorPolicy::Strict => {
                        self.close();
                        Err(RelayError::UpstreamRejected(message))
                    }
                }
            }
            UpstreamAction::Ignored(event_type) => {
                debug!(pair_id = %self.id, event_type = %event_type, "Ignoring upstream event");
                Ok(None)
            }
        }
    }

    /// Handle a telephony stop event.
    pub fn stop(&mut self) {
        info!(
            pair_id = %self.id,
            stream_sid = self.stream_sid.as_deref().unwrap_or("-"),
            "Telephony stream stopped"
        );

        let residual = self.batcher.take_residual();
        if self.settings.commit_on_stop && residual > 0 && self.state == PairState::Streaming {
            if let Some(upstream) = &self.upstream {
                match upstream.send(UpstreamCommand::CommitAudio) {
                    Ok(()) => self.stats.commits += 1,
                    Err(err) => debug!(pair_id = %self.id, "Final commit not sent: {}", err),
                }
            }
        } else if residual > 0 {
            debug!(pair_id = %self.id, residual, "Discarding uncommitted frames");
        }

        self.close();
    }

    /// Close the pair and its upstream connection.
    ///
    /// Returns true only for the call that performed the close.
    pub fn close(&mut self) -> bool {
        if self.state == PairState::Closed {
            return false;
        }

        self.state = PairState::Closing;
        if let Some(mut upstream) = self.upstream.take() {
            if upstream.close() {
                debug!(pair_id = %self.id, upstream_id = %upstream.id(), "Upstream connection closed");
            }
        }
        self.state = PairState::Closed;

        let duration = Utc::now() - self.created_at;
        info!(
            pair_id = %self.id,
            stream_sid = self.stream_sid.as_deref().unwrap_or("-"),
            duration_ms = duration.num_milliseconds(),
            frames_to_upstream = self.stats.frames_to_upstream,
            frames_to_telephony = self.stats.frames_to_telephony,
            commits = self.stats.commits,
            frames_dropped = self.stats.frames_dropped,
            "Session pair closed"
        );
        true
    }

    /// Queue a command upstream, applying the overflow policy.
    ///
    /// Ok(false) means the command was not queued and the pair keeps
    /// streaming. The caller decides what a dropped command costs.
    fn send_upstream(&mut self, command: UpstreamCommand) -> Result<bool, RelayError> {
        let upstream = match &self.upstream {
            Some(upstream) => upstream,
            None => return Ok(false),
        };

        match upstream.send(command) {
            Ok(()) => Ok(true),
            Err(RelayError::UpstreamBackpressure { capacity })
                if self.settings.overflow_policy == OverflowPolicy::DropFrame =>
            {
                warn!(pair_id = %self.id, capacity, "Upstream queue full, dropping command");
                Ok(false)
            }
            Err(err) => {
                warn!(pair_id = %self.id, "Upstream send failed, closing pair: {}", err);
                self.close();
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::error::TryRecvError;
    use tokio::sync::mpsc::Receiver;

    fn settings(target_rate: u32, threshold: u32) -> PairSettings {
        let mut config = AppConfig::default();
        config.relay.target_sample_rate = target_rate;
        config.relay.commit_threshold_frames = threshold;
        PairSettings::from_config(&config)
    }

    fn start_event(sid: &str) -> StreamStart {
        StreamStart {
            stream_sid: sid.to_string(),
            call_sid: None,
            media_format: None,
        }
    }

    fn media(mulaw: Vec<u8>) -> MediaFrame {
        MediaFrame { mulaw, track: None }
    }

    /// Start a pair and attach an in-memory upstream, consuming `session.update`.
    fn streaming_pair(settings: PairSettings, capacity: usize) -> (SessionPair, Receiver<UpstreamCommand>) {
        let mut pair = SessionPair::new(settings).unwrap();
        assert!(pair.start(&start_event("CA123")));
        let (handle, mut receiver) = UpstreamHandle::channel(capacity);
        assert!(pair.attach_upstream(handle).unwrap());
        assert!(matches!(receiver.try_recv(), Ok(UpstreamCommand::SessionUpdate { .. })));
        (pair, receiver)
    }

    fn drain(receiver: &mut Receiver<UpstreamCommand>) -> Vec<UpstreamCommand> {
        let mut commands = Vec::new();
        while let Ok(command) = receiver.try_recv() {
            commands.push(command);
        }
        commands
    }

    #[test]
    fn test_end_to_end_call() {
        let mut pair = SessionPair::new(settings(16000, 20)).unwrap();
        assert_eq!(pair.state(), PairState::Idle);

        assert!(pair.start(&start_event("CA123")));
        assert_eq!(pair.state(), PairState::Streaming);
        assert_eq!(pair.stream_sid(), Some("CA123"));

        let (handle, mut receiver) = UpstreamHandle::channel(64);
        assert!(pair.attach_upstream(handle).unwrap());
        match receiver.try_recv().unwrap() {
            UpstreamCommand::SessionUpdate { session } => {
                assert_eq!(session.input_audio_sample_rate, 16000);
                assert_eq!(session.output_audio_sample_rate, 16000);
                assert_eq!(session.input_audio_format, "pcm16");
                assert_eq!(session.modalities, vec!["text", "audio"]);
            }
            other => panic!("Expected session.update first, got {:?}", other),
        }

        let frame = vec![0xFFu8; 160];
        let expected_pcm = Transcoder::new(16000, UpsampleMode::Auto, DownsampleMode::Auto)
            .unwrap()
            .telephony_to_upstream(&frame);

        assert_eq!(
            pair.relay_media(&media(frame.clone())).unwrap(),
            MediaOutcome::Forwarded { committed: false }
        );
        assert_eq!(receiver.try_recv().unwrap(), UpstreamCommand::append(&expected_pcm));

        for _ in 1..20 {
            pair.relay_media(&media(frame.clone())).unwrap();
        }
        let commands = drain(&mut receiver);
        assert_eq!(commands.len(), 20);
        assert_eq!(commands.last(), Some(&UpstreamCommand::CommitAudio));
        assert_eq!(
            commands.iter().filter(|c| **c == UpstreamCommand::CommitAudio).count(),
            1
        );

        pair.stop();
        assert_eq!(pair.state(), PairState::Closed);
        assert_eq!(receiver.try_recv(), Err(TryRecvError::Disconnected));
        assert_eq!(pair.stats().commits, 1);
        assert_eq!(pair.stats().frames_to_upstream, 20);
    }

    #[test]
    fn test_media_order_is_preserved() {
        let (mut pair, mut receiver) = streaming_pair(settings(24000, 20), 64);
        let transcoder = Transcoder::new(24000, UpsampleMode::Auto, DownsampleMode::Auto).unwrap();

        let markers: Vec<u8> = vec![0x10, 0x20, 0x30, 0x40, 0x50];
        for marker in &markers {
            pair.relay_media(&media(vec![*marker; 160])).unwrap();
        }

        let expected: Vec<UpstreamCommand> = markers
            .iter()
            .map(|marker| UpstreamCommand::append(&transcoder.telephony_to_upstream(&[*marker; 160])))
            .collect();
        assert_eq!(drain(&mut receiver), expected);
    }

    #[test]
    fn test_close_is_idempotent() {
        let (mut pair, mut receiver) = streaming_pair(settings(16000, 20), 8);

        assert!(pair.close());
        assert_eq!(receiver.try_recv(), Err(TryRecvError::Disconnected));
        assert!(!pair.close());
        assert!(!pair.close());
        assert_eq!(pair.state(), PairState::Closed);

        // Closed is terminal
        assert_eq!(pair.relay_media(&media(vec![0xFF; 160])).unwrap(), MediaOutcome::Ignored);
        assert!(!pair.start(&start_event("CA999")));
        assert_eq!(pair.relay_upstream(UpstreamAction::AudioDelta(vec![0; 4])).unwrap(), None);
    }

    #[test]
    fn test_duplicate_start_is_ignored() {
        let (mut pair, _receiver) = streaming_pair(settings(16000, 20), 8);
        assert!(!pair.start(&start_event("CA456")));
        assert_eq!(pair.stream_sid(), Some("CA123"));
        assert_eq!(pair.state(), PairState::Streaming);
    }

    #[test]
    fn test_media_before_upstream_is_dropped() {
        let mut pair = SessionPair::new(settings(16000, 20)).unwrap();
        assert_eq!(pair.relay_media(&media(vec![0xFF; 160])).unwrap(), MediaOutcome::Dropped);

        pair.start(&start_event("CA123"));
        assert_eq!(pair.relay_media(&media(vec![0xFF; 160])).unwrap(), MediaOutcome::Dropped);
        assert_eq!(pair.stats().frames_dropped, 2);
    }

    #[test]
    fn test_upstream_attached_after_close_is_closed() {
        let mut pair = SessionPair::new(settings(16000, 20)).unwrap();
        pair.start(&start_event("CA123"));
        pair.stop();

        let (handle, mut receiver) = UpstreamHandle::channel(8);
        assert!(!pair.attach_upstream(handle).unwrap());
        assert_eq!(receiver.try_recv(), Err(TryRecvError::Disconnected));
        assert_eq!(pair.state(), PairState::Closed);
    }

    #[test]
    fn test_connect_failure_closes_pair() {
        let mut pair = SessionPair::new(settings(16000, 20)).unwrap();
        pair.start(&start_event("CA123"));
        pair.upstream_failed();
        assert!(pair.is_closed());
    }

    #[test]
    fn test_audio_delta_becomes_telephony_media() {
        let (mut pair, _receiver) = streaming_pair(settings(24000, 20), 8);

        let outbound = pair
            .relay_upstream(UpstreamAction::AudioDelta(vec![0u8; 960]))
            .unwrap()
            .unwrap();
        let expected = Transcoder::new(24000, UpsampleMode::Auto, DownsampleMode::Auto)
            .unwrap()
            .upstream_to_telephony(&[0u8; 960])
            .unwrap();
        assert_eq!(expected.len(), 160);
        assert_eq!(outbound, TelephonyOutbound::media("CA123", &expected));
        assert_eq!(pair.stats().frames_to_telephony, 1);
    }

    #[test]
    fn test_odd_delta_is_a_decode_error() {
        let (mut pair, _receiver) = streaming_pair(settings(16000, 20), 8);
        let err = pair.relay_upstream(UpstreamAction::AudioDelta(vec![0u8; 3])).unwrap_err();
        assert!(!err.is_fatal());
        assert_eq!(pair.state(), PairState::Streaming);
    }

    #[test]
    fn test_error_policies() {
        let (mut lenient, _rx1) = streaming_pair(settings(16000, 20), 8);
        assert_eq!(lenient.relay_upstream(UpstreamAction::Error("boom".into())).unwrap(), None);
        assert_eq!(lenient.state(), PairState::Streaming);

        let mut strict_settings = settings(16000, 20);
        strict_settings.error_policy = UpstreamErrorPolicy::Strict;
        let (mut strict, _rx2) = streaming_pair(strict_settings, 8);
        let err = strict.relay_upstream(UpstreamAction::Error("boom".into())).unwrap_err();
        assert!(matches!(err, RelayError::UpstreamRejected(_)));
        assert!(strict.is_closed());
    }

    #[test]
    fn test_backpressure_drops_frame_by_default() {
        // One slot was used by session.update and drained; capacity 1 fits one append
        let (mut pair, _receiver) = streaming_pair(settings(16000, 20), 1);
        assert_eq!(
            pair.relay_media(&media(vec![0xFF; 160])).unwrap(),
            MediaOutcome::Forwarded { committed: false }
        );
        assert_eq!(pair.relay_media(&media(vec![0xFF; 160])).unwrap(), MediaOutcome::Dropped);
        assert_eq!(pair.stats().frames_dropped, 1);
        assert_eq!(pair.state(), PairState::Streaming);
    }

    #[test]
    fn test_commit_dropped_under_backpressure_is_retried() {
        // session.update plus two appends fill the queue
        let (handle, mut receiver) = UpstreamHandle::channel(3);
        let mut pair = SessionPair::new(settings(16000, 2)).unwrap();
        pair.start(&start_event("CA123"));
        pair.attach_upstream(handle).unwrap();

        for _ in 0..2 {
            assert_eq!(
                pair.relay_media(&media(vec![0xFF; 160])).unwrap(),
                MediaOutcome::Forwarded { committed: false }
            );
        }
        assert_eq!(pair.stats().commits, 0);
        assert_eq!(pair.stats().frames_dropped, 0);

        let commands = drain(&mut receiver);
        assert_eq!(commands.len(), 3);
        assert!(!commands.contains(&UpstreamCommand::CommitAudio));

        assert_eq!(
            pair.relay_media(&media(vec![0xFF; 160])).unwrap(),
            MediaOutcome::Forwarded { committed: true }
        );
        let commands = drain(&mut receiver);
        assert_eq!(commands.len(), 2);
        assert_eq!(commands.last(), Some(&UpstreamCommand::CommitAudio));
        assert_eq!(pair.stats().commits, 1);
        assert_eq!(pair.stats().frames_dropped, 0);
        assert_eq!(pair.stats().frames_to_upstream, 3);
    }

    #[test]
    fn test_backpressure_can_close_pair() {
        let mut close_settings = settings(16000, 20);
        close_settings.overflow_policy = OverflowPolicy::ClosePair;
        let (mut pair, _receiver) = streaming_pair(close_settings, 1);

        pair.relay_media(&media(vec![0xFF; 160])).unwrap();
        let err = pair.relay_media(&media(vec![0xFF; 160])).unwrap_err();
        assert!(matches!(err, RelayError::UpstreamBackpressure { capacity: 1 }));
        assert!(pair.is_closed());
    }

    #[test]
    fn test_residual_frames_are_dropped_at_stop() {
        let (mut pair, mut receiver) = streaming_pair(settings(16000, 20), 64);
        for _ in 0..7 {
            pair.relay_media(&media(vec![0xFF; 160])).unwrap();
        }
        pair.stop();

        let commands = drain(&mut receiver);
        assert_eq!(commands.len(), 7);
        assert!(!commands.contains(&UpstreamCommand::CommitAudio));
    }

    #[test]
    fn test_commit_on_stop_flushes_residual() {
        let mut flush_settings = settings(16000, 20);
        flush_settings.commit_on_stop = true;
        let (mut pair, mut receiver) = streaming_pair(flush_settings, 64);
        for _ in 0..7 {
            pair.relay_media(&media(vec![0xFF; 160])).unwrap();
        }
        pair.stop();

        let commands = drain(&mut receiver);
        assert_eq!(commands.len(), 8);
        assert_eq!(commands.last(), Some(&UpstreamCommand::CommitAudio));
        assert_eq!(pair.stats().commits, 1);
    }

    #[test]
    fn test_upstream_gone_closes_pair() {
        let (mut pair, receiver) = streaming_pair(settings(16000, 20), 8);
        drop(receiver);
        let err = pair.relay_media(&media(vec![0xFF; 160])).unwrap_err();
        assert!(matches!(err, RelayError::UpstreamClosed));
        assert!(pair.is_closed());
    }
}
