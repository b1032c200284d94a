use std::time::Duration;

use engine::remote::{InMemoryRemote, Operation};
use engine::session::MemorySessionStore;
use engine::{
    Command, Engine, EngineConfig, Event, ExportJob, ExportStatus, ManualTimeSource,
    PlaybackState, SilentAudio,
};

type TestEngine = Engine<InMemoryRemote, SilentAudio, ManualTimeSource>;

fn drive(engine: &mut TestEngine, time: &ManualTimeSource, total: Duration) -> Vec<Event> {
    let step = Duration::from_millis(50);
    let mut events = Vec::new();
    let mut elapsed = Duration::ZERO;
    while elapsed < total {
        time.advance(step);
        elapsed += step;
        events.extend(engine.run_due_tasks());
    }
    events
}

fn item_ids(engine: &TestEngine) -> Vec<String> {
    engine.project().expect("project loaded").item_ids()
}

#[test]
fn edit_play_and_export_a_resumed_project() {
    let remote = InMemoryRemote::new();
    let seeded = remote.seed_project(&[2.0, 3.0, 1.0]);
    let time = ManualTimeSource::new();
    let mut engine = Engine::new(
        remote.clone(),
        SilentAudio,
        time.clone(),
        MemorySessionStore::with_project(seeded.id.clone()),
        &EngineConfig::default(),
    );

    engine
        .handle_command(Command::OpenSession)
        .expect("open session");
    assert_eq!(engine.project().map(|project| project.id.clone()), Some(seeded.id.clone()));
    assert_eq!(engine.timeline().total(), 6.0);
    assert_eq!(engine.timeline().resolve(2.0), Some(1));

    engine
        .handle_command(Command::Reorder {
            sequence: vec!["photo-2".into(), "photo-0".into(), "photo-1".into()],
        })
        .expect("reorder");
    assert_eq!(item_ids(&engine), ["photo-2", "photo-0", "photo-1"]);
    let stored = remote.project(&seeded.id).expect("stored project");
    assert_eq!(stored.item_ids(), ["photo-2", "photo-0", "photo-1"]);
    assert_eq!(
        stored.items.iter().map(|item| item.order).collect::<Vec<_>>(),
        [0, 1, 2]
    );

    engine
        .handle_command(Command::SetAllDurations { duration: 1.5 })
        .expect("bulk duration");
    assert_eq!(engine.timeline().offsets(), &[0.0, 1.5, 3.0]);
    assert_eq!(engine.timeline().total(), 4.5);

    engine.handle_command(Command::Play).expect("play");
    let events = drive(&mut engine, &time, Duration::from_secs(5));
    let visited: Vec<String> = events
        .iter()
        .filter_map(|event| match event {
            Event::Frame(frame) => frame.item_id.clone(),
            _ => None,
        })
        .fold(Vec::new(), |mut visited, id| {
            if visited.last() != Some(&id) {
                visited.push(id);
            }
            visited
        });
    assert_eq!(visited, ["photo-2", "photo-0", "photo-1", "photo-2"]);
    assert_eq!(engine.playback_state(), PlaybackState::Stopped);
    assert_eq!(engine.current_time(), 0.0);

    remote.script_export(vec![
        ExportJob {
            status: ExportStatus::Processing,
            progress: 40.0,
            file: None,
        },
        ExportJob {
            status: ExportStatus::Completed,
            progress: 100.0,
            file: Some("slideshow.mp4".to_owned()),
        },
    ]);
    engine
        .handle_command(Command::StartExport)
        .expect("start export");
    assert!(
        engine
            .handle_command(Command::StartExport)
            .is_err(),
        "second start while processing"
    );
    drive(&mut engine, &time, Duration::from_secs(3));
    assert_eq!(engine.export_job().status, ExportStatus::Completed);
    assert_eq!(engine.time_until_next_task(), None);

    let out = std::env::temp_dir().join(format!("photosync-export-{}.mp4", std::process::id()));
    let events = engine
        .handle_command(Command::DownloadExport { path: out.clone() })
        .expect("download");
    assert!(matches!(events.as_slice(), [Event::ExportDownloaded { .. }]));
    assert_eq!(
        std::fs::read(&out).expect("read export"),
        b"rendered:slideshow.mp4"
    );
    std::fs::remove_file(&out).expect("remove export");

    assert_eq!(
        remote.calls().last(),
        Some(&Operation::DownloadExport)
    );
}

#[test]
fn stale_session_falls_back_to_a_fresh_project() {
    let remote = InMemoryRemote::new();
    let mut engine = Engine::new(
        remote.clone(),
        SilentAudio,
        ManualTimeSource::new(),
        MemorySessionStore::with_project("deleted-project"),
        &EngineConfig::default(),
    );

    engine
        .handle_command(Command::OpenSession)
        .expect("open session");

    let project = engine.project().expect("fresh project");
    assert_ne!(project.id, "deleted-project");
    assert!(project.items.is_empty());
    assert!(engine.handle_command(Command::Play).is_err());
    assert_eq!(
        remote.calls(),
        vec![Operation::FetchProject, Operation::CreateProject]
    );
}
