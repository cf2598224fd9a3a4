// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Push-based delivery of records to a callback.
//!
//! ## Architecture
//!
//! Every [`Subscription`] owns a dispatcher thread driving a [`Tailer`]. When
//! the tailer catches up with the tail, the dispatcher parks on a crossbeam
//! channel that the queue signals after each enqueue, falling back to the
//! configured poll interval.
//!
//! ```text
//! ┌──────────────┐   wake channel   ┌──────────────┐   callback   ┌──────────────┐
//! │    Queue     │ ───────────────► │  Dispatcher  │ ───────────► │     user     │
//! │  (enqueue)   │                  │  (bg thread) │              │     code     │
//! └──────────────┘                  └──────────────┘              └──────────────┘
//! ```
//!
//! Subscriptions are read-only: they never move the queue head.

use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error, info};

use crate::{QueueError, Result, error::InternalSnafu, message::Message, tailer::Tailer};

/// Handle to a running subscription.
///
/// Dropping the handle stops the dispatcher without waiting for it; use
/// [`cancel`](Self::cancel) to wait for an in-flight callback to return.
pub struct Subscription {
    cancel: Arc<AtomicBool>,
    wake:   Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    pub(crate) fn spawn<F>(
        tailer: Tailer,
        (wake, wake_rx): (Sender<()>, Receiver<()>),
        callback: F,
    ) -> Result<Self>
    where
        F: FnMut(Result<Message>) + Send + 'static,
    {
        let cancel = Arc::new(AtomicBool::new(false));
        let dispatcher = Dispatcher {
            poll_interval: tailer.queue().config().poll_interval,
            tailer,
            wake_rx,
            cancel: Arc::clone(&cancel),
            callback,
        };

        let handle = thread::Builder::new()
            .name("bigqueue-subscriber".into())
            .spawn(move || dispatcher.run())?;

        Ok(Self {
            cancel,
            wake,
            handle: Some(handle),
        })
    }

    /// Stop the subscription and wait for the dispatcher thread to exit.
    ///
    /// A callback running at the time of the call completes first.
    ///
    /// # Errors
    ///
    /// Returns an error if the dispatcher thread panicked.
    pub fn cancel(mut self) -> Result<()> {
        self.signal();
        if let Some(handle) = self.handle.take() {
            handle.join().map_err(|_| {
                InternalSnafu {
                    message: "subscription thread panicked".to_string(),
                }
                .build()
            })?;
        }
        Ok(())
    }

    /// Whether the dispatcher thread has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    fn signal(&self) {
        self.cancel.store(true, Ordering::Release);
        let _ = self.wake.try_send(());
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.signal();
        }
    }
}

struct Dispatcher<F> {
    tailer:        Tailer,
    wake_rx:       Receiver<()>,
    cancel:        Arc<AtomicBool>,
    poll_interval: Duration,
    callback:      F,
}

impl<F> Dispatcher<F>
where
    F: FnMut(Result<Message>),
{
    /// Deliver records until cancelled or the queue closes.
    fn run(mut self) {
        info!(start = self.tailer.position(), "Subscription started");

        while !self.cancel.load(Ordering::Acquire) {
            match self.tailer.read_next() {
                Ok(Some(message)) => self.deliver(message),
                Ok(None) => self.wait(),
                Err(QueueError::QueueClosed) => {
                    debug!("Queue closed, stopping subscription");
                    break;
                }
                Err(e @ QueueError::NotFound { .. }) => {
                    self.invoke(Err(e));
                    self.tailer.seek_to_head();
                }
                Err(e) => {
                    self.invoke(Err(e));
                    self.wait();
                }
            }
        }

        info!(position = self.tailer.position(), "Subscription stopped");
    }

    fn deliver(&mut self, message: Message) {
        let sequence = message.sequence;
        if !self.invoke(Ok(message)) {
            error!(sequence, "Subscriber callback panicked");
            self.invoke(Err(QueueError::CallbackPanicked { sequence }));
        }
    }

    /// Run the callback, returning `false` if it panicked.
    fn invoke(&mut self, result: Result<Message>) -> bool {
        let callback = &mut self.callback;
        catch_unwind(AssertUnwindSafe(|| callback(result))).is_ok()
    }

    fn wait(&self) {
        match self.wake_rx.recv_timeout(self.poll_interval) {
            Ok(()) | Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => thread::sleep(self.poll_interval),
        }
    }
}
