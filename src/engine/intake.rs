use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use crossbeam::channel::{bounded, Receiver};
use log::{debug, warn};

use crate::engine::AbortHandle;
use crate::extractors::PathSpecSource;
use crate::models::PathSpec;

/// Item of the intake channel; source errors travel as messages.
pub type IntakeItem = std::result::Result<PathSpec, String>;

/// Bounded queue between the path-specification source and the foreman.
///
/// The source runs on its own thread and blocks once `depth` items wait
/// to be picked up.
pub struct Intake {
    receiver: Receiver<IntakeItem>,
    producer: JoinHandle<u64>,
}

impl Intake {
    pub fn start(source: Box<dyn PathSpecSource>, depth: usize, abort: AbortHandle) -> Result<Self> {
        let (sender, receiver) = bounded(depth);

        let producer = thread::Builder::new()
            .name("intake".to_string())
            .spawn(move || {
                let mut produced = 0;
                for item in source.path_specs() {
                    if abort.is_aborted() {
                        debug!("Intake stopped by abort");
                        break;
                    }
                    if sender.send(item.map_err(|e| format!("{:#}", e))).is_err() {
                        debug!("Intake closed by the foreman");
                        break;
                    }
                    produced += 1;
                }
                produced
            })
            .context("Failed to start intake thread")?;

        Ok(Self { receiver, producer })
    }

    pub fn receiver(&self) -> &Receiver<IntakeItem> {
        &self.receiver
    }

    /// Close the queue and wait for the producer to stop.
    ///
    /// # Returns
    ///
    /// The number of items the source handed over.
    pub fn close(self) -> u64 {
        let Intake { receiver, producer } = self;
        drop(receiver);

        match producer.join() {
            Ok(produced) => produced,
            Err(_) => {
                warn!("Path specification source panicked");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::StaticSource;
    use std::time::Duration;

    #[test]
    fn test_intake_delivers_in_order() {
        let source = StaticSource::new(["/a", "/b", "/c"]);
        let intake = Intake::start(Box::new(source), 1, AbortHandle::new()).unwrap();

        let received: Vec<String> = intake
            .receiver()
            .iter()
            .map(|item| item.unwrap().to_string())
            .collect();
        assert_eq!(received, vec!["/a", "/b", "/c"]);
        assert_eq!(intake.close(), 3);
    }

    #[test]
    fn test_close_unblocks_full_queue() {
        let source = StaticSource::new((0..100).map(|i| format!("/file{}", i)));
        let intake = Intake::start(Box::new(source), 2, AbortHandle::new()).unwrap();

        let first = intake.receiver().recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(first.unwrap().as_str(), "/file0");
        assert!(intake.close() < 100);
    }
}
