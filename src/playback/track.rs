// Track data - Playable note events grouped by source track
// Decodes and encodes Standard MIDI Files

use super::{PlaybackError, PlaybackResult};
use crate::sequencer::note::{NoteEvent, sort_by_time};
use crate::sequencer::timeline::Tempo;
use midly::num::{u4, u7, u15, u24, u28};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Every Standard MIDI File starts with this chunk id
pub const SMF_MAGIC: &[u8; 4] = b"MThd";

/// Resolution used when encoding
const TICKS_PER_BEAT: u16 = 480;

/// General MIDI percussion channel (channel 10, zero-based 9)
const DRUM_CHANNEL: u8 = 9;

/// Largest delta time a track event can carry
const MAX_DELTA_TICKS: u64 = (1 << 28) - 1;

/// Largest tempo a MIDI tempo event can carry (microseconds per beat)
const MAX_MICROS_PER_BEAT: u32 = (1 << 24) - 1;

/// A named, time-ordered list of note events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub name: String,
    pub events: Vec<NoteEvent>,
}

impl Track {
    /// Create a track; events are sorted by time
    pub fn new(name: impl Into<String>, mut events: Vec<NoteEvent>) -> Self {
        sort_by_time(&mut events);
        Self {
            name: name.into(),
            events,
        }
    }

    /// Time at which the last note of the track stops sounding
    pub fn duration(&self) -> f64 {
        self.events
            .iter()
            .map(NoteEvent::end_time)
            .fold(0.0, f64::max)
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// The unit of playback: one or more tracks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackData {
    pub tracks: Vec<Track>,
}

impl TrackData {
    pub fn new(tracks: Vec<Track>) -> Self {
        Self { tracks }
    }

    /// Wrap a single compiled event list
    pub fn from_events(name: impl Into<String>, events: Vec<NoteEvent>) -> Self {
        Self::new(vec![Track::new(name, events)])
    }

    /// Structural check: at least one track, no empty tracks, sane events
    pub fn validate(&self) -> PlaybackResult<()> {
        if self.tracks.is_empty() {
            return Err(PlaybackError::InvalidFormat(
                "track data contains no tracks".to_string(),
            ));
        }

        for track in &self.tracks {
            if track.is_empty() {
                return Err(PlaybackError::InvalidFormat(format!(
                    "track '{}' contains no notes",
                    track.name
                )));
            }

            let malformed = track.events.iter().find(|event| {
                event.pitch > 127
                    || !event.time.is_finite()
                    || event.time < 0.0
                    || !event.duration.is_finite()
                    || event.duration < 0.0
                    || !(0.0..=1.0).contains(&event.velocity)
            });
            if let Some(event) = malformed {
                return Err(PlaybackError::InvalidFormat(format!(
                    "track '{}' has a malformed note at {}s",
                    track.name, event.time
                )));
            }
        }

        Ok(())
    }

    /// Time at which the last note of any track stops sounding
    pub fn total_duration(&self) -> f64 {
        self.tracks.iter().map(Track::duration).fold(0.0, f64::max)
    }

    /// All events across tracks, grouped by track
    pub fn events(&self) -> impl Iterator<Item = &NoteEvent> {
        self.tracks.iter().flat_map(|track| track.events.iter())
    }

    pub fn event_count(&self) -> usize {
        self.tracks.iter().map(|track| track.events.len()).sum()
    }

    /// Events starting at or after `offset`, merged and sorted by time
    pub fn events_from(&self, offset: f64) -> Vec<NoteEvent> {
        let mut events: Vec<NoteEvent> = self
            .events()
            .filter(|event| event.time >= offset)
            .copied()
            .collect();
        sort_by_time(&mut events);
        events
    }

    /// Decode a Standard MIDI File
    ///
    /// The signature is checked before parsing. Tempo changes are honoured,
    /// note-on/note-off pairs become durations and tracks without notes (such
    /// as a conductor track) are dropped.
    pub fn from_smf_bytes(bytes: &[u8]) -> PlaybackResult<Self> {
        if bytes.len() < SMF_MAGIC.len() || &bytes[..SMF_MAGIC.len()] != SMF_MAGIC {
            return Err(PlaybackError::InvalidFormat(
                "missing MThd signature".to_string(),
            ));
        }

        let smf = Smf::parse(bytes)
            .map_err(|e| PlaybackError::InvalidFormat(format!("failed to parse MIDI data: {}", e)))?;
        let clock = TickClock::new(&smf)?;

        let tracks: Vec<Track> = smf
            .tracks
            .iter()
            .enumerate()
            .filter_map(|(index, events)| decode_track(index, events, &clock))
            .collect();

        let data = Self::new(tracks);
        data.validate()?;
        Ok(data)
    }

    /// Encode as a format 1 Standard MIDI File, notes on the drum channel
    ///
    /// Data that fails [`validate`](Self::validate) is rejected rather than
    /// truncated to MIDI ranges.
    pub fn to_smf_bytes(&self, tempo: Tempo) -> PlaybackResult<Vec<u8>> {
        self.validate()?;

        let ticks_per_second = TICKS_PER_BEAT as f64 / tempo.beat_duration_seconds();
        let micros_per_beat = tempo.micros_per_beat().min(MAX_MICROS_PER_BEAT);

        let mut smf = Smf::new(Header::new(
            Format::Parallel,
            Timing::Metrical(u15::new(TICKS_PER_BEAT)),
        ));

        smf.tracks.push(vec![
            TrackEvent {
                delta: u28::new(0),
                kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(micros_per_beat))),
            },
            end_of_track(),
        ]);

        for track in &self.tracks {
            smf.tracks.push(encode_track(track, ticks_per_second)?);
        }

        let mut buffer = Vec::new();
        smf.write_std(&mut buffer)
            .map_err(|e| PlaybackError::InvalidFormat(format!("failed to encode MIDI data: {}", e)))?;
        Ok(buffer)
    }
}

fn end_of_track<'a>() -> TrackEvent<'a> {
    TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    }
}

fn encode_track<'a>(track: &'a Track, ticks_per_second: f64) -> PlaybackResult<Vec<TrackEvent<'a>>> {
    // (tick, is_note_on, key, velocity); note-offs sort first on shared ticks
    let mut timed: Vec<(u64, bool, u8, u8)> = Vec::with_capacity(track.events.len() * 2);
    for event in &track.events {
        let on = (event.time * ticks_per_second).round() as u64;
        let off = ((event.end_time() * ticks_per_second).round() as u64).max(on + 1);
        timed.push((on, true, event.pitch, event.midi_velocity()));
        timed.push((off, false, event.pitch, 0));
    }
    timed.sort_by_key(|&(tick, is_on, _, _)| (tick, is_on));

    let mut events = Vec::with_capacity(timed.len() + 2);
    events.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::TrackName(track.name.as_bytes())),
    });

    let mut last_tick = 0;
    for (tick, is_on, key, velocity) in timed {
        let delta = tick - last_tick;
        if delta > MAX_DELTA_TICKS {
            return Err(PlaybackError::InvalidFormat(format!(
                "gap of {} ticks in track '{}' is too long for MIDI",
                delta, track.name
            )));
        }
        last_tick = tick;

        let message = if is_on {
            MidiMessage::NoteOn {
                key: u7::new(key),
                vel: u7::new(velocity),
            }
        } else {
            MidiMessage::NoteOff {
                key: u7::new(key),
                vel: u7::new(0),
            }
        };

        events.push(TrackEvent {
            delta: u28::new(delta as u32),
            kind: TrackEventKind::Midi {
                channel: u4::new(DRUM_CHANNEL),
                message,
            },
        });
    }

    events.push(end_of_track());
    Ok(events)
}

fn decode_track(index: usize, events: &[TrackEvent], clock: &TickClock) -> Option<Track> {
    let mut tick: u64 = 0;
    let mut name: Option<String> = None;
    // Sounding notes per (channel, key): start tick and velocity, oldest first
    let mut open: BTreeMap<(u8, u8), Vec<(u64, u8)>> = BTreeMap::new();
    let mut notes = Vec::new();

    for event in events {
        tick += event.delta.as_int() as u64;

        match event.kind {
            TrackEventKind::Midi { channel, message } => match message {
                MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                    open.entry((channel.as_int(), key.as_int()))
                        .or_default()
                        .push((tick, vel.as_int()));
                }
                MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                    if let Some(starts) = open.get_mut(&(channel.as_int(), key.as_int())) {
                        if !starts.is_empty() {
                            let (start, velocity) = starts.remove(0);
                            notes.push(clock.note(key.as_int(), start, tick, velocity));
                        }
                    }
                }
                _ => {}
            },
            TrackEventKind::Meta(MetaMessage::TrackName(raw)) => {
                if let Ok(text) = std::str::from_utf8(raw) {
                    let cleaned = text.trim_end_matches('\0').trim();
                    if !cleaned.is_empty() {
                        name = Some(cleaned.to_string());
                    }
                }
            }
            _ => {}
        }
    }

    // Notes never released ring until the end of the track
    for ((_, key), starts) in open {
        for (start, velocity) in starts {
            notes.push(clock.note(key, start, tick, velocity));
        }
    }

    if notes.is_empty() {
        return None;
    }

    Some(Track::new(
        name.unwrap_or_else(|| format!("Track {}", index + 1)),
        notes,
    ))
}

/// Piecewise-linear tick to seconds conversion
#[derive(Debug, Clone, Copy)]
struct TempoSegment {
    tick: u64,
    seconds: f64,
    seconds_per_tick: f64,
}

#[derive(Debug)]
enum TickClock {
    Metrical(Vec<TempoSegment>),
    Timecode { seconds_per_tick: f64 },
}

impl TickClock {
    fn new(smf: &Smf) -> PlaybackResult<Self> {
        match smf.header.timing {
            Timing::Metrical(ticks_per_beat) => {
                let ticks_per_beat = ticks_per_beat.as_int() as f64;
                if ticks_per_beat == 0.0 {
                    return Err(PlaybackError::InvalidFormat(
                        "header declares 0 ticks per beat".to_string(),
                    ));
                }
                Ok(TickClock::Metrical(Self::tempo_map(smf, ticks_per_beat)))
            }
            Timing::Timecode(fps, subframes) => {
                let ticks_per_second = fps.as_f32() as f64 * subframes as f64;
                if ticks_per_second <= 0.0 {
                    return Err(PlaybackError::InvalidFormat(
                        "header declares 0 ticks per second".to_string(),
                    ));
                }
                Ok(TickClock::Timecode {
                    seconds_per_tick: 1.0 / ticks_per_second,
                })
            }
        }
    }

    /// Tempo changes from every track, merged on the absolute tick axis
    fn tempo_map(smf: &Smf, ticks_per_beat: f64) -> Vec<TempoSegment> {
        let mut changes: Vec<(u64, u32)> = Vec::new();
        for track in &smf.tracks {
            let mut tick: u64 = 0;
            for event in track {
                tick += event.delta.as_int() as u64;
                if let TrackEventKind::Meta(MetaMessage::Tempo(micros)) = event.kind {
                    changes.push((tick, micros.as_int()));
                }
            }
        }
        changes.sort_by_key(|&(tick, _)| tick);

        let seconds_per_tick = |micros: u32| micros as f64 / 1_000_000.0 / ticks_per_beat;
        let default_micros = Tempo::default().micros_per_beat();

        let mut segments = vec![TempoSegment {
            tick: 0,
            seconds: 0.0,
            seconds_per_tick: seconds_per_tick(default_micros),
        }];

        for (tick, micros) in changes {
            let Some(last) = segments.last_mut() else {
                break;
            };
            if tick == last.tick {
                last.seconds_per_tick = seconds_per_tick(micros);
                continue;
            }
            let seconds = last.seconds + (tick - last.tick) as f64 * last.seconds_per_tick;
            segments.push(TempoSegment {
                tick,
                seconds,
                seconds_per_tick: seconds_per_tick(micros),
            });
        }

        segments
    }

    fn seconds(&self, tick: u64) -> f64 {
        match self {
            TickClock::Metrical(segments) => {
                let segment = segments
                    .iter()
                    .rev()
                    .find(|segment| segment.tick <= tick)
                    .unwrap_or(&segments[0]);
                segment.seconds + (tick - segment.tick) as f64 * segment.seconds_per_tick
            }
            TickClock::Timecode { seconds_per_tick } => tick as f64 * seconds_per_tick,
        }
    }

    fn note(&self, key: u8, start_tick: u64, end_tick: u64, velocity: u8) -> NoteEvent {
        let time = self.seconds(start_tick);
        let duration = self.seconds(end_tick) - time;
        NoteEvent::new(key, time, duration, velocity as f32 / 127.0)
    }
}
