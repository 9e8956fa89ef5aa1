use std::future::Future;
use std::time::Duration;

use futures::stream::{BoxStream, StreamExt};
use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::api::ClientError;

pub const RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

/// What a monitored stream reports into an event loop
#[derive(Debug, Clone, PartialEq)]
pub enum Feed<T> {
    Connected,
    Item(T),
    Disconnected,
}

/// Keep a stream open, re-opening it after [`RECONNECT_INTERVAL`]
///
/// Every item is wrapped with `wrap` and queued on `tx`. Returns when
/// `done` fires or the receiving loop goes away.
pub async fn watch<T, E, F, Fut>(
    name: &'static str,
    mut open: F,
    tx: mpsc::Sender<E>,
    wrap: fn(Feed<T>) -> E,
    done: CancellationToken,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<BoxStream<'static, T>, ClientError>>,
{
    loop {
        let opened = tokio::select! {
            biased;
            _ = done.cancelled() => break,
            opened = open() => opened,
        };
        match opened {
            Ok(mut stream) => {
                info!("Monitoring {}", name);
                if tx.send(wrap(Feed::Connected)).await.is_err() {
                    break;
                }
                loop {
                    let item = tokio::select! {
                        biased;
                        _ = done.cancelled() => return,
                        item = stream.next() => item,
                    };
                    match item {
                        Some(item) => {
                            if tx.send(wrap(Feed::Item(item))).await.is_err() {
                                return;
                            }
                        }
                        None => break,
                    }
                }
                warn!("Lost {} stream", name);
                if tx.send(wrap(Feed::Disconnected)).await.is_err() {
                    break;
                }
            }
            Err(err) => warn!("Cannot monitor {}: {}", name, err),
        }
        tokio::select! {
            _ = done.cancelled() => break,
            _ = sleep(RECONNECT_INTERVAL) => debug!("Retrying {}", name),
        }
    }
    debug!("Stopped monitoring {}", name);
}
