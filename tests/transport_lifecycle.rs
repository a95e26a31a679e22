//! Transport lifecycle tests
//!
//! Drives compiled tracks through load/play/pause/seek/stop on the virtual
//! backend and checks what actually reaches the synthesizer.

use mymusic_rhythm::audio::RenderedNote;
use mymusic_rhythm::{
    NoteEvent, PatternCompiler, PlaybackError, Section, Tempo, TrackData, Transport,
    VirtualBackend,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

fn backend() -> Rc<VirtualBackend> {
    Rc::new(VirtualBackend::new_ready())
}

fn transport(backend: &Rc<VirtualBackend>) -> Transport {
    Transport::new(backend.clone()).with_progress_interval(0.05)
}

fn verse_events() -> Vec<NoteEvent> {
    PatternCompiler::default().generate(&Section::new("verse", 8.0), 0.0)
}

fn verse_smf() -> Vec<u8> {
    TrackData::from_events("Drums", verse_events())
        .to_smf_bytes(Tempo::new(120.0))
        .unwrap()
}

fn single_hit(pitch: u8, time: f64) -> TrackData {
    TrackData::from_events("hit", vec![NoteEvent::new(pitch, time, 0.1, 1.0)])
}

fn pitches(notes: &[RenderedNote]) -> Vec<u8> {
    notes.iter().map(|note| note.pitch).collect()
}

#[test]
fn test_pause_resume_plays_every_event_once() {
    let backend = backend();
    let transport = transport(&backend);
    transport.load(&verse_smf()).unwrap();

    let events = verse_events();
    let pause_at = 3.3;

    transport.play().unwrap();
    backend.advance(pause_at);
    transport.pause();

    let before = backend.take_rendered();
    assert_eq!(
        before.len(),
        events.iter().filter(|e| e.time < pause_at).count()
    );
    assert_eq!(transport.snapshot().current_time, pause_at);

    // Nothing sounds while paused
    backend.advance(2.0);
    assert!(backend.rendered().is_empty());

    transport.play().unwrap();
    backend.advance(20.0);

    let after = backend.take_rendered();
    assert_eq!(
        after.len(),
        events.iter().filter(|e| e.time >= pause_at).count()
    );
    assert_eq!(before.len() + after.len(), events.len());
    assert!(transport.state().is_idle());
}

#[test]
fn test_resumed_events_keep_their_spacing() {
    let backend = backend();
    let transport = transport(&backend);
    transport
        .load_tracks(TrackData::from_events(
            "hits",
            vec![
                NoteEvent::new(36, 1.0, 0.1, 1.0),
                NoteEvent::new(38, 2.0, 0.1, 1.0),
                NoteEvent::new(42, 2.75, 0.1, 1.0),
            ],
        ))
        .unwrap();

    transport.play().unwrap();
    backend.advance(1.5);
    transport.pause();
    backend.advance(10.0);
    backend.take_rendered();

    transport.play().unwrap();
    backend.advance(5.0);

    let after = backend.take_rendered();
    assert_eq!(pitches(&after), vec![38, 42]);
    assert!((after[0].at - 0.5).abs() < 1e-9);
    assert!((after[1].at - 1.25).abs() < 1e-9);
    assert!((after[1].wall_time - after[0].wall_time - 0.75).abs() < 1e-9);
}

#[test]
fn test_seek_while_paused_stays_paused() {
    let backend = backend();
    let transport = transport(&backend);
    transport.load(&verse_smf()).unwrap();

    transport.play().unwrap();
    backend.advance(1.0);
    transport.pause();

    transport.seek(5.0).unwrap();
    let snapshot = transport.snapshot();
    assert!(snapshot.paused);
    assert_eq!(snapshot.current_time, 5.0);

    transport.seek(1e9).unwrap();
    assert_eq!(transport.snapshot().current_time, transport.snapshot().duration);
    assert!(transport.state().is_paused());
}

#[test]
fn test_seek_then_play_starts_at_offset() {
    let backend = backend();
    let transport = transport(&backend);
    transport.load(&verse_smf()).unwrap();

    transport.seek(6.0).unwrap();
    transport.play().unwrap();
    backend.advance(20.0);

    let expected = verse_events().iter().filter(|e| e.time >= 6.0).count();
    assert_eq!(backend.rendered().len(), expected);
}

#[test]
fn test_stop_twice_is_safe() {
    let backend = backend();
    let transport = transport(&backend);
    transport.load(&verse_smf()).unwrap();
    transport.play().unwrap();
    backend.advance(2.0);

    transport.stop_playback();
    transport.stop_playback();

    let snapshot = transport.snapshot();
    assert!(!snapshot.playing);
    assert!(!snapshot.paused);
    assert_eq!(snapshot.current_time, 0.0);
    assert!(snapshot.has_track);
    assert_eq!(backend.pending_triggers(), 0);
    assert_eq!(backend.active_timers(), 0);
}

#[test]
fn test_completion_reported_once_then_idle() {
    let backend = backend();
    let transport = transport(&backend);
    transport.load(&verse_smf()).unwrap();

    let completions = Rc::new(Cell::new(0));
    let ends = Rc::new(RefCell::new(Vec::new()));
    {
        let completions = Rc::clone(&completions);
        transport.set_progress_observer(move |progress| {
            assert!(progress.progress <= 1.0);
            if progress.progress >= 1.0 {
                completions.set(completions.get() + 1);
            }
        });
    }
    {
        let ends = Rc::clone(&ends);
        let handle = transport.clone();
        transport.set_end_observer(move || ends.borrow_mut().push(handle.state()));
    }

    transport.play().unwrap();
    backend.advance(30.0);

    assert_eq!(completions.get(), 1);
    assert_eq!(ends.borrow().len(), 1);
    assert!(ends.borrow()[0].is_idle());
    assert_eq!(backend.rendered().len(), verse_events().len());
    assert_eq!(backend.silence_count(), 1);
}

#[test]
fn test_errors_before_setup() {
    let backend = Rc::new(VirtualBackend::new());
    let transport = Transport::new(backend.clone());

    assert!(matches!(transport.play(), Err(PlaybackError::NotInitialized)));

    transport.initialize().unwrap();
    assert!(matches!(transport.play(), Err(PlaybackError::NoTrackLoaded)));

    assert!(matches!(
        transport.load(b"not a midi file"),
        Err(PlaybackError::InvalidFormat(_))
    ));
    assert!(matches!(
        transport.load_tracks(TrackData::new(Vec::new())),
        Err(PlaybackError::InvalidFormat(_))
    ));

    let snapshot = transport.snapshot();
    assert!(snapshot.initialized);
    assert!(!snapshot.has_track);
    assert_eq!(snapshot.duration, 0.0);
}

#[test]
fn test_failed_load_keeps_current_session() {
    let backend = backend();
    let transport = transport(&backend);
    transport.load(&verse_smf()).unwrap();

    assert!(transport.load(b"MThd garbage").is_err());
    assert!(transport.snapshot().has_track);
    transport.play().unwrap();
}

#[test]
fn test_load_rejects_out_of_range_notes() {
    let backend = backend();
    let transport = transport(&backend);
    transport.load_tracks(single_hit(36, 1.0)).unwrap();

    let mut silent = single_hit(38, 0.5);
    silent.tracks[0].events[0].velocity = f32::NAN;
    assert!(matches!(
        transport.load_tracks(silent),
        Err(PlaybackError::InvalidFormat(_))
    ));

    let mut loud = single_hit(38, 0.5);
    loud.tracks[0].events[0].velocity = 3.0;
    assert!(transport.load_tracks(loud).is_err());

    // The previous track is still the one that plays
    transport.play().unwrap();
    backend.advance(5.0);
    assert_eq!(pitches(&backend.rendered()), vec![36]);
}

#[test]
fn test_disposal_failure_does_not_block_play() {
    let backend = backend();
    let transport = transport(&backend);
    transport.load_tracks(single_hit(36, 1.0)).unwrap();

    transport.play().unwrap();
    backend.advance(0.5);
    transport.pause();

    backend.set_fail_release(true);
    transport.play().unwrap();
    assert!(transport.state().is_playing());

    backend.advance(5.0);
    assert_eq!(pitches(&backend.rendered()), vec![36]);
}

#[test]
fn test_reload_silences_previous_session() {
    let backend = backend();
    let transport = transport(&backend);
    transport.load_tracks(single_hit(36, 2.0)).unwrap();
    transport.play().unwrap();
    backend.advance(1.0);

    transport.load_tracks(single_hit(56, 0.5)).unwrap();
    transport.play().unwrap();
    backend.advance(10.0);

    assert_eq!(pitches(&backend.rendered()), vec![56]);
}

#[test]
fn test_reload_while_paused_discards_old_part() {
    let backend = backend();
    let transport = transport(&backend);
    transport.load_tracks(single_hit(36, 2.0)).unwrap();
    transport.play().unwrap();
    backend.advance(1.0);
    transport.pause();

    transport.load_tracks(single_hit(56, 0.5)).unwrap();
    assert!(transport.state().is_idle());
    assert_eq!(transport.snapshot().current_time, 0.0);

    transport.play().unwrap();
    backend.advance(10.0);
    assert_eq!(pitches(&backend.rendered()), vec![56]);
}

#[test]
fn test_transports_on_separate_backends_are_independent() {
    let first_backend = backend();
    let second_backend = backend();
    let first = transport(&first_backend);
    let second = transport(&second_backend);

    first.load_tracks(single_hit(36, 0.5)).unwrap();
    second.load_tracks(single_hit(38, 0.5)).unwrap();
    first.play().unwrap();
    second.play().unwrap();

    first.pause();
    second_backend.advance(1.0);
    first_backend.advance(1.0);

    assert_eq!(pitches(&second_backend.rendered()), vec![38]);
    assert!(first_backend.rendered().is_empty());
    assert!(second.state().is_idle());
    assert!(first.state().is_paused());
}

#[test]
fn test_transports_share_one_clock() {
    let backend = backend();
    let first = transport(&backend);
    let second = transport(&backend);

    first.load_tracks(single_hit(36, 2.0)).unwrap();
    second
        .load_tracks(TrackData::from_events(
            "hits",
            vec![
                NoteEvent::new(38, 0.5, 0.1, 1.0),
                NoteEvent::new(38, 5.0, 0.1, 1.0),
            ],
        ))
        .unwrap();

    first.play().unwrap();
    backend.advance(1.0);
    second.play().unwrap();
    backend.advance(0.75);

    // The second transport joins the running clock at its current position
    let rendered = backend.rendered();
    assert_eq!(pitches(&rendered), vec![38]);
    assert!((rendered[0].at - 1.5).abs() < 1e-9);

    backend.advance(0.5);
    assert_eq!(pitches(&backend.rendered()), vec![38, 36]);
}

#[test]
fn test_pause_cancels_every_trigger_on_the_clock() {
    let backend = backend();
    let first = transport(&backend);
    let second = transport(&backend);

    first.load_tracks(single_hit(36, 1.0)).unwrap();
    second.load_tracks(single_hit(38, 1.0)).unwrap();
    first.play().unwrap();
    second.play().unwrap();
    assert_eq!(backend.pending_triggers(), 2);

    // Cancellation is global to the shared clock
    first.pause();
    assert_eq!(backend.pending_triggers(), 0);
}
