use std::path::Path;

use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};

use crate::constants::{CC_SOFT, CC_SUSTAIN, CC_TENUTO, PEDAL_THRESHOLD};
use crate::error::ExtractionError;

const DEFAULT_US_PER_QN: f64 = 500_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pedal {
    Sustain,
    Soft,
    Tenuto,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MidiEventKind {
    KeyDown { key: u8, velocity: u8 },
    KeyUp { key: u8 },
    Pedal { pedal: Pedal, down: bool },
}

impl MidiEventKind {
    /// Releases sort before presses at the same instant, so a re-struck key
    /// ends its previous note first.
    fn order(&self) -> u8 {
        match self {
            MidiEventKind::KeyUp { .. } => 0,
            MidiEventKind::Pedal { down: false, .. } => 1,
            MidiEventKind::Pedal { down: true, .. } => 2,
            MidiEventKind::KeyDown { .. } => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedMidiEvent {
    pub time_seconds: f64,
    pub kind: MidiEventKind,
}

#[derive(Debug, Clone)]
struct AbsoluteEvent<'a> {
    tick: u64,
    kind: TrackEventKind<'a>,
}

/// Piecewise-linear tick to seconds conversion.
#[derive(Debug, Clone)]
pub struct TempoMap {
    /// `(tick, seconds at tick, seconds per tick from here on)`
    segments: Vec<(u64, f64, f64)>,
}

impl TempoMap {
    fn new(timing: Timing, tempo_changes: &[(u64, f64)]) -> Self {
        match timing {
            Timing::Metrical(ppq) => {
                let ppq = ppq.as_int().max(1) as f64;
                let mut segments = vec![(0u64, 0.0f64, DEFAULT_US_PER_QN / 1e6 / ppq)];
                for &(tick, us_per_qn) in tempo_changes {
                    let (last_tick, last_secs, last_rate) = segments[segments.len() - 1];
                    let secs = last_secs + (tick - last_tick) as f64 * last_rate;
                    let rate = us_per_qn / 1e6 / ppq;
                    if tick == last_tick {
                        let n = segments.len();
                        segments[n - 1] = (tick, secs, rate);
                    } else {
                        segments.push((tick, secs, rate));
                    }
                }
                Self { segments }
            }
            Timing::Timecode(fps, subframe) => {
                let ticks_per_second = (fps.as_f32() * subframe as f32).max(1.0) as f64;
                Self { segments: vec![(0, 0.0, 1.0 / ticks_per_second)] }
            }
        }
    }

    pub fn seconds(&self, tick: u64) -> f64 {
        let idx = self.segments.partition_point(|&(t, _, _)| t <= tick).saturating_sub(1);
        let (seg_tick, seg_secs, rate) = self.segments[idx];
        seg_secs + (tick - seg_tick) as f64 * rate
    }
}

/// Parse a Standard MIDI File into key and pedal events on one time axis.
pub fn parse_midi_file<P: AsRef<Path>>(path: P) -> Result<Vec<TimedMidiEvent>, ExtractionError> {
    let bytes = std::fs::read(path)?;
    parse_midi_bytes(&bytes)
}

pub fn parse_midi_bytes(bytes: &[u8]) -> Result<Vec<TimedMidiEvent>, ExtractionError> {
    let smf = Smf::parse(bytes)?;

    let mut absolute: Vec<AbsoluteEvent> = vec![];
    for track in smf.tracks.iter() {
        let mut tick: u64 = 0;
        for event in track {
            tick += event.delta.as_int() as u64;
            absolute.push(AbsoluteEvent { tick, kind: event.kind });
        }
    }
    absolute.sort_by_key(|e| e.tick);

    let tempo_changes: Vec<(u64, f64)> = absolute
        .iter()
        .filter_map(|e| match e.kind {
            TrackEventKind::Meta(MetaMessage::Tempo(us)) => Some((e.tick, us.as_int() as f64)),
            _ => None,
        })
        .collect();
    let tempo_map = TempoMap::new(smf.header.timing, &tempo_changes);

    let mut events: Vec<TimedMidiEvent> = absolute
        .iter()
        .filter_map(|e| {
            let kind = match e.kind {
                TrackEventKind::Midi { message, .. } => midi_event_kind(message)?,
                _ => return None,
            };
            Some(TimedMidiEvent { time_seconds: tempo_map.seconds(e.tick), kind })
        })
        .collect();

    events.sort_by(|a, b| {
        a.time_seconds
            .total_cmp(&b.time_seconds)
            .then(a.kind.order().cmp(&b.kind.order()))
    });

    Ok(events)
}

fn midi_event_kind(message: MidiMessage) -> Option<MidiEventKind> {
    match message {
        // NoteOn with velocity 0 is a NoteOff
        MidiMessage::NoteOn { key, vel } if vel.as_int() == 0 => Some(MidiEventKind::KeyUp { key: key.as_int() }),
        MidiMessage::NoteOn { key, vel } => Some(MidiEventKind::KeyDown { key: key.as_int(), velocity: vel.as_int() }),
        MidiMessage::NoteOff { key, .. } => Some(MidiEventKind::KeyUp { key: key.as_int() }),
        MidiMessage::Controller { controller, value } => {
            let pedal = match controller.as_int() {
                CC_SUSTAIN => Pedal::Sustain,
                CC_SOFT => Pedal::Soft,
                CC_TENUTO => Pedal::Tenuto,
                _ => return None,
            };
            Some(MidiEventKind::Pedal { pedal, down: value.as_int() >= PEDAL_THRESHOLD })
        }
        _ => None,
    }
}
