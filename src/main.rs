use anyhow::{Context, Result};
use clap::Parser;
use mymusic_rhythm::{
    Arrangement, EngineConfig, Section, Tempo, TrackData, Transport, VirtualBackend, drum_name,
};
use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(name = "mymusic_rhythm")]
#[command(about = "Compile song sections into a drum track and play it", long_about = None)]
struct Args {
    /// Sections as <type>:<seconds>, played back to back (e.g. intro:8 verse:16 chorus:16)
    #[arg(required = true)]
    sections: Vec<Section>,

    /// Tempo in BPM (overrides the config file)
    #[arg(short, long)]
    tempo: Option<f64>,

    /// Engine config file (.ron or .json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the compiled track as a Standard MIDI File
    #[arg(short, long)]
    write_midi: Option<PathBuf>,

    /// Compile only, do not play
    #[arg(long)]
    no_play: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("ERROR: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(bpm) = args.tempo {
        config.tempo =
            Tempo::try_new(bpm).with_context(|| format!("Invalid tempo {}", bpm))?;
    }

    let compiler = config.compiler()?;
    let arrangement = Arrangement::new(args.sections);

    println!("=== MyMusic Rhythm ===");
    println!("Tempo: {}", compiler.tempo());
    for (start, section) in arrangement.timeline() {
        println!(
            "  {:>7.2}s  {:<12} pattern {:<6}{}",
            start,
            section.kind,
            section.pattern().as_str(),
            if section.has_fill() { " + fill" } else { "" }
        );
    }

    let events = compiler.compile_arrangement(&arrangement);
    println!(
        "Compiled {} hits over {:.2}s\n",
        events.len(),
        arrangement.duration()
    );

    if events.is_empty() {
        println!("Nothing to play");
        return Ok(());
    }

    let tracks = TrackData::from_events("Drums", events);

    if let Some(path) = &args.write_midi {
        let bytes = tracks.to_smf_bytes(compiler.tempo())?;
        std::fs::write(path, bytes)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Wrote {}", path.display());
    }

    if args.no_play {
        return Ok(());
    }

    play(tracks, config.progress_interval)
}

/// Play through the virtual backend in real time, printing every hit
fn play(tracks: TrackData, progress_interval: f64) -> Result<()> {
    let backend = Rc::new(VirtualBackend::new());
    let transport = Transport::new(backend.clone()).with_progress_interval(progress_interval);
    transport.initialize()?;
    transport.load_tracks(tracks)?;

    let last_decile = Rc::new(Cell::new(0));
    {
        let last_decile = Rc::clone(&last_decile);
        transport.set_progress_observer(move |progress| {
            let decile = (progress.progress * 10.0).floor() as u32;
            if decile > last_decile.get() {
                last_decile.set(decile);
                println!(
                    "-- {:>3.0}% ({:.2}s / {:.2}s)",
                    progress.progress * 100.0,
                    progress.current_time,
                    progress.total_time
                );
            }
        });
    }

    let finished = Rc::new(Cell::new(false));
    {
        let finished = Rc::clone(&finished);
        transport.set_end_observer(move || finished.set(true));
    }

    transport.play()?;

    let frame = Duration::try_from_secs_f64(progress_interval)
        .with_context(|| format!("Invalid progress interval {}s", progress_interval))?;
    let mut last = Instant::now();
    while !finished.get() {
        std::thread::sleep(frame);
        let now = Instant::now();
        backend.advance(now.duration_since(last).as_secs_f64());
        last = now;

        for note in backend.take_rendered() {
            println!(
                "  {:>7.3}s  {:<18} vel {:>3}",
                note.wall_time,
                drum_name(note.pitch),
                (note.velocity * 127.0).round() as u8
            );
        }
    }

    println!("\nPlayback finished");
    Ok(())
}
