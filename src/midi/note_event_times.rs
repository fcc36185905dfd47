use std::collections::HashMap;

use super::parser::{MidiEventKind, Pedal, TimedMidiEvent};

#[derive(Debug, Clone, PartialEq)]
pub struct NoteEventTime {
    pub key: u8,
    pub velocity: u8,
    pub onset_seconds: f64,
    pub offset_seconds: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PedalEventTime {
    pub pedal: Pedal,
    pub onset_seconds: f64,
    pub offset_seconds: f64,
}

/// Notes and pedal intervals recovered from a MIDI event stream.
#[derive(Debug, Clone, Default)]
pub struct MidiIntervals {
    pub notes: Vec<NoteEventTime>,
    pub pedals: Vec<PedalEventTime>,
    /// Time of the last event in the file.
    pub end_seconds: f64,
}

/// Pair key presses with releases and pedal downs with pedal ups.
///
/// # Arguments
///
/// * `events` - Time-ordered key and pedal events.
/// * `sustain_extend` - If true, a key released while the sustain pedal is
///   down keeps sounding until the pedal lifts or the key is struck again.
/// * `dedupe_redundant_events` - If true, a press of an already held key is
///   ignored. Otherwise it ends the held note and starts a new one. Lifts of
///   keys that are already up never have an effect.
///
/// # Returns
///
/// * Note and pedal intervals. Anything still open at the end of the stream
///   is closed at the time of the last event.
pub fn events_to_intervals(
    events: &[TimedMidiEvent],
    sustain_extend: bool,
    dedupe_redundant_events: bool,
) -> MidiIntervals {
    let mut intervals = MidiIntervals::default();
    let mut pressed: HashMap<u8, (f64, u8)> = HashMap::new();
    let mut sustained: HashMap<u8, (f64, u8)> = HashMap::new();
    let mut pedals_down: HashMap<Pedal, f64> = HashMap::new();

    let close = |notes: &mut Vec<NoteEventTime>, key: u8, (onset, velocity): (f64, u8), t: f64| {
        notes.push(NoteEventTime { key, velocity, onset_seconds: onset, offset_seconds: t });
    };

    for event in events {
        let t = event.time_seconds;
        match event.kind {
            MidiEventKind::KeyDown { key, velocity } => {
                if pressed.contains_key(&key) && dedupe_redundant_events {
                    continue;
                }
                if let Some(held) = pressed.remove(&key) {
                    close(&mut intervals.notes, key, held, t);
                }
                if let Some(ringing) = sustained.remove(&key) {
                    close(&mut intervals.notes, key, ringing, t);
                }
                pressed.insert(key, (t, velocity));
            }
            MidiEventKind::KeyUp { key } => {
                if let Some(held) = pressed.remove(&key) {
                    if sustain_extend && pedals_down.contains_key(&Pedal::Sustain) {
                        sustained.insert(key, held);
                    } else {
                        close(&mut intervals.notes, key, held, t);
                    }
                }
            }
            MidiEventKind::Pedal { pedal, down: true } => {
                pedals_down.entry(pedal).or_insert(t);
            }
            MidiEventKind::Pedal { pedal, down: false } => {
                if let Some(onset) = pedals_down.remove(&pedal) {
                    intervals.pedals.push(PedalEventTime { pedal, onset_seconds: onset, offset_seconds: t });
                }
                if pedal == Pedal::Sustain {
                    for (key, ringing) in sustained.drain() {
                        close(&mut intervals.notes, key, ringing, t);
                    }
                }
            }
        }
    }

    let end = events.last().map(|e| e.time_seconds).unwrap_or(0.0);
    for (key, held) in pressed.drain().chain(sustained.drain()) {
        close(&mut intervals.notes, key, held, end);
    }
    for (pedal, onset) in pedals_down.drain() {
        intervals.pedals.push(PedalEventTime { pedal, onset_seconds: onset, offset_seconds: end });
    }
    intervals.end_seconds = end;

    intervals
        .notes
        .sort_by(|a, b| a.onset_seconds.total_cmp(&b.onset_seconds).then(a.key.cmp(&b.key)));
    intervals.pedals.sort_by(|a, b| a.onset_seconds.total_cmp(&b.onset_seconds));
    intervals
}
