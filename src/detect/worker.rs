use anyhow::{anyhow, Context, Result};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender, TrySendError};
use std::thread::JoinHandle;

use super::client::{DetectionClient, NetworkError};
use crate::camera::EncodedImage;
use crate::detection_loop::{Completion, Dispatcher, RequestTicket};

/// Runs detect calls off the loop thread.
///
/// The worker owns the blocking HTTP exchange and nothing else. Every request
/// resolves into exactly one `Completion`, posted through `events`.
pub struct DetectWorker {
    jobs: Option<SyncSender<(RequestTicket, EncodedImage)>>,
    join: Option<JoinHandle<()>>,
}

impl DetectWorker {
    pub fn spawn<E>(client: DetectionClient, events: Sender<E>) -> Result<Self>
    where
        E: From<Completion> + Send + 'static,
    {
        // Capacity 1: the loop never has more than one request outstanding.
        let (jobs_tx, jobs_rx) = mpsc::sync_channel(1);
        let join = std::thread::Builder::new()
            .name("detect-worker".to_string())
            .spawn(move || run_worker(client, jobs_rx, events))
            .context("spawn detect worker")?;
        Ok(Self {
            jobs: Some(jobs_tx),
            join: Some(join),
        })
    }

    /// Close the job queue and wait for the current request to finish.
    pub fn shutdown(mut self) -> Result<()> {
        self.jobs.take();
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("detect worker thread panicked"))?;
        }
        Ok(())
    }
}

impl Dispatcher for DetectWorker {
    fn dispatch(&mut self, ticket: RequestTicket, image: EncodedImage) -> Result<(), NetworkError> {
        let jobs = self
            .jobs
            .as_ref()
            .ok_or_else(|| NetworkError::Unreachable("detect worker stopped".to_string()))?;
        jobs.try_send((ticket, image)).map_err(|err| match err {
            TrySendError::Full(_) => {
                NetworkError::Unreachable("detect worker busy".to_string())
            }
            TrySendError::Disconnected(_) => {
                NetworkError::Unreachable("detect worker exited".to_string())
            }
        })
    }
}

impl Drop for DetectWorker {
    fn drop(&mut self) {
        // Dropping the sender ends the worker loop; the thread is detached
        // if still blocked on a request.
        self.jobs.take();
    }
}

fn run_worker<E>(
    client: DetectionClient,
    jobs: Receiver<(RequestTicket, EncodedImage)>,
    events: Sender<E>,
) where
    E: From<Completion>,
{
    log::debug!("detect worker started for {}", client.base_url());
    while let Ok((ticket, image)) = jobs.recv() {
        let outcome = client.detect(&image);
        if events.send(E::from(Completion { ticket, outcome })).is_err() {
            break;
        }
    }
    log::debug!("detect worker exiting");
}
