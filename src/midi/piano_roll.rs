use std::path::Path;

use ndarray::{s, Array2};

use crate::constants::{MIDI_OFFSET, NUM_MIDI_VALUES, ROLL_HEIGHT};
use crate::error::ExtractionError;

use super::note_event_times::{events_to_intervals, MidiIntervals};
use super::parser::{parse_midi_file, Pedal, TimedMidiEvent};

/// Frame-quantized rolls for a single performance, all `width` columns wide.
#[derive(Debug, Clone)]
pub struct PianoRolls {
    /// `(88, width)`, velocity / 127 at each onset frame
    pub onsets: Array2<f32>,
    /// `(88, width)`, 1.0 at each offset frame
    pub offsets: Array2<f32>,
    /// `(88, width)`, 1.0 while a key sounds
    pub frames: Array2<f32>,
    pub sustain: Array2<f32>,
    pub soft: Array2<f32>,
    pub tenuto: Array2<f32>,
}

impl PianoRolls {
    pub fn width(&self) -> usize {
        self.frames.ncols()
    }

    /// `[onsets; frames; sustain; soft; tenuto]`, the layout written to the roll store.
    pub fn stacked(&self) -> Array2<f32> {
        let mut stacked = Array2::zeros((ROLL_HEIGHT, self.width()));
        let mut row = 0;
        for roll in [&self.onsets, &self.frames, &self.sustain, &self.soft, &self.tenuto] {
            stacked.slice_mut(s![row..row + roll.nrows(), ..]).assign(roll);
            row += roll.nrows();
        }
        stacked
    }
}

pub struct PianoRollExtractor {
    quant_secs: f64,
    sustain_extend: bool,
    dedupe_redundant_events: bool,
}

impl PianoRollExtractor {
    /// `dedupe_redundant_events` drops presses of a key that is already
    /// down and releases of a key that is already up.
    pub fn new(quant_secs: f64, sustain_extend: bool, dedupe_redundant_events: bool) -> Self {
        Self { quant_secs, sustain_extend, dedupe_redundant_events }
    }

    pub fn quant_secs(&self) -> f64 {
        self.quant_secs
    }

    fn frame(&self, seconds: f64) -> usize {
        (seconds / self.quant_secs).round().max(0.0) as usize
    }

    /// Build all rolls from an already parsed event stream.
    pub fn rolls(&self, events: &[TimedMidiEvent]) -> Result<PianoRolls, ExtractionError> {
        if events.is_empty() {
            return Err(ExtractionError::InvalidMidi("no key or pedal events".to_string()));
        }
        let MidiIntervals { notes, pedals, end_seconds } =
            events_to_intervals(events, self.sustain_extend, self.dedupe_redundant_events);

        let width = self.frame(end_seconds) + 1;
        let mut rolls = PianoRolls {
            onsets: Array2::zeros((NUM_MIDI_VALUES, width)),
            offsets: Array2::zeros((NUM_MIDI_VALUES, width)),
            frames: Array2::zeros((NUM_MIDI_VALUES, width)),
            sustain: Array2::zeros((1, width)),
            soft: Array2::zeros((1, width)),
            tenuto: Array2::zeros((1, width)),
        };

        for note in notes {
            let key = note.key as usize;
            if key < MIDI_OFFSET || key >= MIDI_OFFSET + NUM_MIDI_VALUES {
                continue;
            }
            let row = key - MIDI_OFFSET;
            let onset = self.frame(note.onset_seconds).min(width - 1);
            let offset = self.frame(note.offset_seconds).clamp(onset, width - 1);

            let velocity = note.velocity as f32 / 127.0;
            if rolls.onsets[[row, onset]] < velocity {
                rolls.onsets[[row, onset]] = velocity;
            }
            rolls.offsets[[row, offset]] = 1.0;
            rolls.frames.slice_mut(s![row, onset..offset.max(onset + 1)]).fill(1.0);
        }

        for pedal in pedals {
            let onset = self.frame(pedal.onset_seconds).min(width - 1);
            let offset = self.frame(pedal.offset_seconds).clamp(onset, width - 1);
            let roll = match pedal.pedal {
                Pedal::Sustain => &mut rolls.sustain,
                Pedal::Soft => &mut rolls.soft,
                Pedal::Tenuto => &mut rolls.tenuto,
            };
            roll.slice_mut(s![0, onset..offset.max(onset + 1)]).fill(1.0);
        }

        Ok(rolls)
    }

    /// Parse `path` and return the stacked `(179, width)` roll.
    pub fn extract_file(&self, path: &Path) -> Result<Array2<f32>, ExtractionError> {
        let events = parse_midi_file(path)?;
        Ok(self.rolls(&events)?.stacked())
    }
}
