use std::pin::Pin;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{sleep, Sleep};
use tracing::{debug, info};

use txgate_flow_core::{ConfirmationRequest, SequencerAction, TransitionSequencer};

/// Drives the transition sequencer against the engine's snapshot stream,
/// standing in for a presentation layer: each exit animation is a sleep and
/// its completion is the one-shot that advances the render key.
pub async fn drive_sequencer(
    mut snapshots: watch::Receiver<ConfirmationRequest>,
    animation: Duration,
) {
    let mut sequencer = TransitionSequencer::new();
    let mut running_exit: Option<Pin<Box<Sleep>>> = None;

    loop {
        if let Some(exit) = running_exit.as_mut() {
            tokio::select! {
                _ = exit.as_mut() => {
                    running_exit = None;
                    if sequencer.finish_exit() {
                        let keys = sequencer.keys();
                        let held_dapp = sequencer
                            .held_payload()
                            .and_then(|payload| payload.dapp.as_ref().map(|d| d.name.clone()));
                        info!(rendering = ?keys.rendering_key, held_dapp = ?held_dapp, "render key advanced");
                    }
                }
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = snapshots.borrow_and_update().clone();
                    feed(&mut sequencer, &snapshot, &mut running_exit, animation);
                }
            }
        } else {
            if snapshots.changed().await.is_err() {
                break;
            }
            let snapshot = snapshots.borrow_and_update().clone();
            feed(&mut sequencer, &snapshot, &mut running_exit, animation);
        }
    }
}

fn feed(
    sequencer: &mut TransitionSequencer,
    snapshot: &ConfirmationRequest,
    running_exit: &mut Option<Pin<Box<Sleep>>>,
    animation: Duration,
) {
    match sequencer.observe(snapshot) {
        SequencerAction::BeginExit => {
            debug!(
                rendering = ?sequencer.keys().rendering_key,
                next = ?sequencer.keys().next_key,
                "exit animation started"
            );
            *running_exit = Some(Box::pin(sleep(animation)));
        }
        SequencerAction::Retarget => {
            debug!(next = ?sequencer.keys().next_key, "exit animation retargeted");
        }
        SequencerAction::Idle => {}
    }
}
