//! End-to-end: JSON document → compile → scheduler → sink.

use std::io::Write;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tonnetz::pattern;
use tonnetz::sched::{PlayState, Scheduler};
use tonnetz::sink::{MemorySink, SinkCall};

const SCORE_DOC: &str = r#"{
    "kind": "score",
    "name": "cadence",
    "key": "C major",
    "total_beats": 4,
    "seconds_per_beat": 0.03,
    "events": [
        {"beat": 0, "op": "set_roman", "symbol": "I"},
        {"beat": 2, "op": "set_roman", "symbol": "V7"}
    ],
    "tracks": [{
        "name": "lead",
        "notes": [
            {"note": "chord_tone", "index": 0, "duration": 1},
            {"note": "hold", "duration": 1},
            {"note": "current_chord", "duration": 2}
        ]
    }]
}"#;

const TABLE_DOC: &str = r#"{
    "kind": "table",
    "name": "arp",
    "emitters": [
        {"name": "sus", "fn": "constant", "value": 0.01},
        {"name": "gap", "fn": "constant", "value": 0.02},
        {"name": "lfo", "fn": "cycle", "values": [0.1, 0.9]}
    ],
    "hierarchy": {"key": "C major", "roman": "I"},
    "materials": [{
        "name": "up",
        "steps": [[0], [1], [2]]
    }],
    "modulators": [{
        "name": "sweep", "emitter": "lfo", "control": "cutoff"
    }],
    "tracks": [{
        "name": "lead",
        "material": "up",
        "sustain": "sus",
        "gap": "gap",
        "modulators": ["sweep"],
        "annotate": ["lfo"]
    }]
}"#;

fn play_for(json: &str, millis: u64) -> (Arc<MemorySink>, Scheduler) {
    let compiled = pattern::compile_str(json, 7).expect("document compiles");
    let sink = Arc::new(MemorySink::new());
    let mut scheduler = Scheduler::new(compiled, sink.clone());
    scheduler.play();
    thread::sleep(Duration::from_millis(millis));
    (sink, scheduler)
}

#[test]
fn score_document_plays_through_harmony_changes() {
    let (sink, mut scheduler) = play_for(SCORE_DOC, 200);
    scheduler.stop();

    let calls = sink.calls();
    let note_ons: Vec<&Vec<_>> = calls
        .iter()
        .filter_map(|c| match c {
            SinkCall::NoteOn(notes) => Some(notes),
            _ => None,
        })
        .collect();
    assert!(note_ons.len() >= 2, "got {} note-ons", note_ons.len());

    // First event is the held tonic root; the chord step sounds the whole V7.
    assert_eq!(note_ons[0][0].pitch, 60);
    assert!(note_ons
        .iter()
        .any(|notes| notes.iter().map(|n| n.pitch).collect::<Vec<_>>() == [67, 71, 74, 77]));
    assert!(calls.contains(&SinkCall::AllNotesOff));
}

#[test]
fn table_document_arpeggiates_and_modulates() {
    let (sink, mut scheduler) = play_for(TABLE_DOC, 200);

    let label = scheduler.chord_label();
    scheduler.stop();
    assert_eq!(label.as_deref(), Some("C"));

    let calls = sink.calls();
    let pitches: Vec<u8> = calls
        .iter()
        .filter_map(|c| match c {
            SinkCall::NoteOn(notes) => Some(notes[0].pitch),
            _ => None,
        })
        .collect();
    assert!(pitches.len() >= 3, "got {pitches:?}");
    assert_eq!(&pitches[..3], &[60, 64, 67]);

    // The sweep modulator writes the cycling lfo value before each note.
    let controls: Vec<f64> = calls
        .iter()
        .filter_map(|c| match c {
            SinkCall::Control(name, value) if name == "cutoff" => Some(*value),
            _ => None,
        })
        .collect();
    assert!(controls.len() >= 2);
    assert!(controls.contains(&0.1) && controls.contains(&0.9));
}

#[test]
fn table_annotations_carry_shadowed_emitters() {
    let (_sink, mut scheduler) = play_for(TABLE_DOC, 150);

    let (name, rx) = &scheduler.annotations()[0];
    assert_eq!(name, "lead");
    let annotations: Vec<_> = rx.try_iter().collect();
    assert!(!annotations.is_empty());
    let last = annotations.last().unwrap();
    assert_eq!(last.track, "lead");
    assert_eq!(last.emitters[0].0, "lfo");
    assert!(last.emitters[0].1.is_some());
    assert_eq!(last.label.as_deref(), Some("C"));
    scheduler.stop();
}

#[test]
fn pause_freezes_without_losing_position() {
    let (sink, mut scheduler) = play_for(TABLE_DOC, 120);

    scheduler.set_paused(true);
    assert_eq!(scheduler.state(), PlayState::Paused);
    assert!(sink.calls().contains(&SinkCall::AllNotesOff));

    thread::sleep(Duration::from_millis(60));
    let frozen = sink.note_on_count();
    thread::sleep(Duration::from_millis(100));
    assert_eq!(sink.note_on_count(), frozen);

    scheduler.set_paused(false);
    thread::sleep(Duration::from_millis(100));
    assert!(sink.note_on_count() > frozen);
    scheduler.stop();
}

#[test]
fn document_loads_from_disk() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(TABLE_DOC.as_bytes()).expect("write doc");

    let json = std::fs::read_to_string(file.path()).expect("read back");
    let compiled = pattern::compile_str(&json, 0).expect("document compiles");
    assert_eq!(compiled.name, "arp");
    assert_eq!(compiled.tracks.len(), 1);
}

#[test]
fn malformed_document_is_a_compile_error() {
    assert!(pattern::compile_str("{\"kind\": \"score\"}", 0).is_err());
    assert!(pattern::compile_str("not json", 0).is_err());
}
