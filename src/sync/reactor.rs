//! Multiplexing reactor over broker handles
//!
//! [`EventLoop`] owns a set of handles, each registered with an interest
//! mask and a callback. Every handle's eventfd is registered with a mio
//! [`Poll`]; the descriptors only serve as wakeups, and readiness itself is
//! always recomputed from the handles. A handle stays readable until its
//! data is copied (or its priority events are taken), so a callback that
//! does not consume is called again on the next iteration.
//!
//! A [`LoopExit`] stops [`EventLoop::run`] from any thread through a mio
//! [`Waker`], without faking a data event.

use std::{
    collections::HashMap,
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use log::{debug, trace};
use mio::{unix::SourceFd, Events, Interest, Poll, Token, Waker};

use crate::{
    broker::OrbHandle,
    error::{OrbError, Result},
};

use super::events::EventMask;

const EXIT_TOKEN: Token = Token(usize::MAX);

const MAX_EVENTS: usize = 64;

/// Callback invoked with the handle and the satisfied interests
pub type Callback = Box<dyn FnMut(&OrbHandle, EventMask) + Send>;

struct Entry {
    handle: OrbHandle,
    interest: EventMask,
    callback: Callback,
}

/// Thread-safe stop switch for an [`EventLoop`]
#[derive(Debug, Clone)]
pub struct LoopExit {
    waker: Arc<Waker>,
    exit: Arc<AtomicBool>,
}

impl LoopExit {
    /// Make the loop return from [`EventLoop::run`]
    pub fn exit(&self) -> Result<()> {
        self.exit.store(true, Ordering::Release);
        self.waker
            .wake()
            .map_err(|e| OrbError::from_io(e, "waking event loop"))
    }
}

/// Reactor dispatching readiness of broker handles to callbacks
pub struct EventLoop {
    poll: Poll,
    events: Events,
    entries: HashMap<Token, Entry>,
    next_token: usize,
    waker: Arc<Waker>,
    exit: Arc<AtomicBool>,
}

impl std::fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoop")
            .field("handles", &self.entries.len())
            .finish()
    }
}

impl EventLoop {
    /// Create an empty loop
    pub fn new() -> Result<Self> {
        let poll = Poll::new().map_err(|e| OrbError::from_io(e, "creating poll instance"))?;
        let waker = Waker::new(poll.registry(), EXIT_TOKEN)
            .map_err(|e| OrbError::from_io(e, "creating exit waker"))?;

        Ok(Self {
            poll,
            events: Events::with_capacity(MAX_EVENTS),
            entries: HashMap::new(),
            next_token: 0,
            waker: Arc::new(waker),
            exit: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Handle that stops [`Self::run`] from any thread
    pub fn exit_handle(&self) -> LoopExit {
        LoopExit {
            waker: self.waker.clone(),
            exit: self.exit.clone(),
        }
    }

    /// Add a handle with its interests and callback.
    ///
    /// [`EventMask::ERROR`] is reported whether or not it is in `interest`.
    pub fn register<F>(
        &mut self,
        handle: impl Into<OrbHandle>,
        interest: EventMask,
        callback: F,
    ) -> Result<Token>
    where
        F: FnMut(&OrbHandle, EventMask) + Send + 'static,
    {
        let handle = handle.into();
        let token = Token(self.next_token);
        self.next_token += 1;

        let fd = handle.raw_fd();
        self.poll
            .registry()
            .register(&mut SourceFd(&fd), token, Interest::READABLE)
            .map_err(|e| OrbError::from_io(e, "registering handle"))?;

        debug!("event loop: watching {} as {:?}", handle.object(), token);
        self.entries.insert(
            token,
            Entry {
                handle,
                interest,
                callback: Box::new(callback),
            },
        );
        Ok(token)
    }

    /// Remove a handle and give it back
    pub fn unregister(&mut self, token: Token) -> Result<OrbHandle> {
        let entry = self.entries.remove(&token).ok_or_else(|| {
            OrbError::invalid_parameter("token", format!("{:?} is not registered", token))
        })?;

        let fd = entry.handle.raw_fd();
        self.poll
            .registry()
            .deregister(&mut SourceFd(&fd))
            .map_err(|e| OrbError::from_io(e, "deregistering handle"))?;
        Ok(entry.handle)
    }

    /// Number of registered handles
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no handle is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn scan(&self) -> Vec<(Token, EventMask)> {
        self.entries
            .iter()
            .filter_map(|(token, entry)| {
                let hit = entry.handle.poll_events() & (entry.interest | EventMask::ERROR);
                (!hit.is_empty()).then_some((*token, hit))
            })
            .collect()
    }

    /// Earliest point at which a rate-limited subscription turns readable
    fn next_deadline(&self) -> Option<Duration> {
        self.entries
            .values()
            .filter(|entry| entry.interest.contains(EventMask::DATAIN))
            .filter_map(|entry| entry.handle.time_until_ready())
            .min()
    }

    /// Wait for readiness once and dispatch callbacks.
    ///
    /// Returns the number of callbacks invoked, which is 0 on timeout, on a
    /// spurious wake and on EINTR.
    pub fn run_once(&mut self, timeout: Option<Duration>) -> Result<usize> {
        let mut ready = self.scan();

        if ready.is_empty() {
            let wait = match (timeout, self.next_deadline()) {
                (Some(t), Some(d)) => Some(t.min(d)),
                (t, None) => t,
                (None, d) => d,
            };

            match self.poll.poll(&mut self.events, wait) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(0),
                Err(e) => return Err(OrbError::from_io(e, "polling handles")),
            }

            for event in self.events.iter() {
                if let Some(entry) = self.entries.get(&event.token()) {
                    entry.handle.readiness().notifier().drain();
                }
            }

            ready = self.scan();
        }

        let mut dispatched = 0;
        for (token, mask) in ready {
            if let Some(entry) = self.entries.get_mut(&token) {
                trace!("event loop: {} ready {:?}", entry.handle.object(), mask);
                (entry.callback)(&entry.handle, mask);
                dispatched += 1;
            }
        }
        Ok(dispatched)
    }

    /// Dispatch until [`LoopExit::exit`] is called.
    ///
    /// The exit request is consumed, so the loop can be run again.
    pub fn run(&mut self) -> Result<()> {
        while !self.exit.swap(false, Ordering::AcqRel) {
            self.run_once(None)?;
        }
        debug!("event loop: exit requested");
        Ok(())
    }
}
