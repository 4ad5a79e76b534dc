//! pim-daemon: voice assistant appliance controller
//!
//! Runs on a small Linux board with a push button, a status LED, a
//! microphone and a speaker:
//! - Button and ENTER start a recording and stop it again
//! - One interaction at a time: record, transcribe, ask, speak
//! - The LED pattern follows the interaction state
//! - Online or offline speech and language backends, chosen at startup
//!
//! Without a microphone the daemon takes typed questions instead.

mod audio;
mod backend;
mod capability;
mod config;
mod events;
mod gpio;
mod indicator;
mod lifecycle;
mod scheduler;
mod state;
mod trigger;

#[cfg(test)]
mod testing;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::io::BufReader;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::audio::{ArecordCapture, CommandPlayback};
use crate::backend::{build_strategy, select_strategy, StrategyKind};
use crate::capability::{detect_capabilities, ProbeSettings};
use crate::config::Config;
use crate::events::{StateEvent, TriggerSource};
use crate::indicator::{GpioLed, IndicatorDriver, IndicatorOutput, LogIndicator};
use crate::lifecycle::ShutdownSignal;
use crate::scheduler::{Collaborators, Scheduler, SchedulerSettings};
use crate::trigger::{ButtonListener, GpioButton, KeyboardListener};

/// Grace period for blocking work (the console reader) at exit
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // A blocked stdin read would otherwise hold the runtime open forever
    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(run());
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    result
}

async fn run() -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "pim-daemon starting");

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(data_dir = %config.data_dir.display(), "configuration loaded");

    let mut shutdown = ShutdownSignal::new()?;

    // Probe once; the snapshot is fixed for the process lifetime
    let capabilities = detect_capabilities(&ProbeSettings::from_config(&config)).await;
    let strategy = match build_strategy(select_strategy(&capabilities), &config) {
        Ok(strategy) => strategy,
        Err(e) => {
            error!(error = %e, "failed to start local models");
            warn!("continuing with the online backend");
            build_strategy(StrategyKind::Online, &config)?
        }
    };
    info!(strategy = %strategy.kind(), "backend selected");

    // Scheduler -> event logger
    let (event_tx, mut event_rx) = broadcast::channel::<StateEvent>(64);
    // Indicator driver -> scheduler (completed speaking flash sequences)
    let (flash_tx, flash_rx) = watch::channel(0u64);

    let collaborators = Collaborators {
        capture: Arc::new(ArecordCapture::new(
            config.capture_device.clone(),
            config.sample_rate,
            config.recording_path(),
        )),
        strategy,
        playback: Arc::new(CommandPlayback::new()),
    };
    let settings = SchedulerSettings::from_config(&config, capabilities.has_speaker);
    let scheduler = Arc::new(Scheduler::new(
        settings,
        collaborators,
        event_tx,
        Some(flash_rx),
    ));

    // Status LED, or a log stand-in when the pin is unavailable
    let led: Arc<dyn IndicatorOutput> = match GpioLed::open(config.led_pin) {
        Ok(led) => Arc::new(led),
        Err(e) => {
            error!(error = %e, "failed to open status LED");
            warn!("continuing without LED");
            Arc::new(LogIndicator)
        }
    };
    let driver = IndicatorDriver::new(led.clone(), scheduler.subscribe_state(), flash_tx);
    let driver_task = tokio::spawn(driver.run());

    let idle_task = tokio::spawn(scheduler.clone().run_idle_timer());

    // Push button, only useful when there is something to record
    let button = if capabilities.has_microphone {
        match GpioButton::open(config.button_pin) {
            Ok(source) => Some(Arc::new(ButtonListener::new(
                Box::new(source),
                config.debounce(),
                config.cooldown(),
            ))),
            Err(e) => {
                error!(error = %e, "failed to open button");
                warn!("continuing without button support - ENTER still works");
                None
            }
        }
    } else {
        None
    };
    let button_task = button.clone().map(|listener| {
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            listener
                .run(|| trigger::dispatch_press(&scheduler, TriggerSource::Button))
                .await;
        })
    });

    let text_mode = capabilities.is_text_only();
    let keyboard_task = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            KeyboardListener::new(text_mode)
                .run(BufReader::new(tokio::io::stdin()), |input| {
                    trigger::dispatch_keyboard(&scheduler, input)
                })
                .await;
        })
    };

    scheduler.mark_ready();
    if text_mode {
        info!("no microphone found - type a question and press ENTER");
    } else {
        info!("press the button or ENTER to talk, again to stop");
    }

    // Main event loop
    tokio::select! {
        // Log interaction events
        _ = async {
            loop {
                match event_rx.recv().await {
                    Ok(event) => {
                        info!(%event, "interaction event");
                        if let Ok(json) = serde_json::to_string(&event) {
                            debug!(event = %json, "interaction event json");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
        } => {
            info!("event logger exited");
        }

        // Wait for shutdown signal
        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    // Cleanup
    info!(state = %scheduler.state(), "shutting down...");

    keyboard_task.abort();
    idle_task.abort();

    if let (Some(listener), Some(task)) = (button, button_task) {
        listener.stop();
        // Dropping the listener hands the button pin back
        if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
            warn!("button listener did not stop in time");
        }
    }

    driver_task.abort();
    let _ = driver_task.await;
    if let Err(e) = led.set(false) {
        warn!(error = %e, "failed to switch LED off");
    }

    info!("pim-daemon stopped");

    Ok(())
}
