use anyhow::{Result, bail};
use outbreak_audio::{
    AudioEngineDesc, DispatchOutcome, GameAudio, OfflineDriver, SoundEvent,
};
use std::time::Duration;

/// Where rendered audio goes and how time passes between script steps.
enum Stage {
    Device,
    /// Pulled by hand; `peak` tracks the loudest sample seen
    Offline { driver: OfflineDriver, peak: f32 },
}

impl Stage {
    fn wait(&mut self, seconds: f64) {
        match self {
            Stage::Device => std::thread::sleep(Duration::from_secs_f64(seconds)),
            Stage::Offline { driver, peak } => {
                let slice = 0.02;
                let mut elapsed = 0.0;
                while elapsed < seconds {
                    let block = driver.render_seconds(slice);
                    *peak = block.iter().fold(*peak, |p, s| p.max(s.abs()));
                    std::thread::sleep(Duration::from_secs_f64(slice));
                    elapsed += slice;
                }
            }
        }
    }
}

pub fn run(offline: bool) -> Result<()> {
    let desc = AudioEngineDesc::default();
    let (audio, mut stage) = if offline {
        let driver = OfflineDriver::new();
        let output_driver = driver.clone();
        let audio = GameAudio::with_output(desc, move |_| Box::new(output_driver.output()));
        (audio, Stage::Offline { driver, peak: 0.0 })
    } else {
        (GameAudio::new(desc), Stage::Device)
    };

    // stands in for the first user gesture
    if !audio.initialize() {
        bail!("no audio output available");
    }
    log::info!("Context ready at {:?}", audio.context_state());

    audio.start_score();
    log::info!("Score playing with {} drones", audio.drone_count());
    stage.wait(1.0);

    for event in [
        SoundEvent::UiClick,
        SoundEvent::UiSelect,
        SoundEvent::DeployAction,
        SoundEvent::HealStart,
        SoundEvent::HealComplete,
        SoundEvent::UiError,
    ] {
        report(event, audio.dispatch(event));
        stage.wait(0.6);
    }

    log::info!("Rapid fire: 10 pistol shots 20 ms apart");
    let mut realized = 0;
    for _ in 0..10 {
        if audio.dispatch(SoundEvent::WeaponPistol).is_played() {
            realized += 1;
        }
        stage.wait(0.02);
    }
    log::info!("{} of 10 shots realized", realized);

    for event in [
        SoundEvent::WeaponShotgun,
        SoundEvent::WeaponSniper,
        SoundEvent::WeaponNet,
        SoundEvent::WeaponRocket,
    ] {
        report(event, audio.dispatch(event));
        stage.wait(0.8);
    }

    audio.toggle_mute();
    log::info!(
        "Muted: score playing = {}, context = {:?}",
        audio.is_score_playing(),
        audio.context_state()
    );
    report(SoundEvent::UiClick, audio.dispatch(SoundEvent::UiClick));
    stage.wait(1.0);

    audio.toggle_mute();
    log::info!("Unmuted: {} drones", audio.drone_count());
    stage.wait(2.0);

    audio.stop_score();
    stage.wait(1.2);

    for event in audio.poll_events() {
        if event.is_error() {
            log::warn!("{:?}", event);
        } else {
            log::debug!("{:?}", event);
        }
    }
    audio.shutdown();

    if let Stage::Offline { peak, .. } = stage {
        log::info!("Offline render finished, peak level {:.3}", peak);
    }
    Ok(())
}

fn report(event: SoundEvent, outcome: DispatchOutcome) {
    match outcome {
        DispatchOutcome::Played(voices) => {
            log::info!("{} -> {} voice(s)", event, voices.len())
        }
        other => log::info!("{} -> {:?}", event, other),
    }
}
