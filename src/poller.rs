//! Readiness Poller
//!
//! One poll cycle sorts a set of connections into readable, writable and
//! faulted. The OS call underneath is abstracted by [`Selector`]; the
//! production selector is [`PollSelector`] (`poll(2)`).
//!
//! ## Fault isolation
//!
//! A single bad descriptor makes the whole readiness call fail. Instead of
//! giving up on every connection, the poller probes each one with a
//! zero-timeout single-connection select, marks the ones that fail as
//! faulted, and retries the aggregate call with the rest:
//!
//! ```text
//! select(all) ──ok──> result
//!     │
//!     └─err─> probe(each) ──fail──> faulted
//!                 │
//!                 └─pass──> select(survivors) ...
//! ```

use crate::connection::{Connection, ConnectionId, RawDescriptor};
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Aggregate retries in one cycle that may fail without any probe
/// failing before the cycle gives up.
pub const MAX_FRUITLESS_RETRIES: usize = 3;

/// A connection submitted to a [`Selector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watch {
    pub id: ConnectionId,
    pub descriptor: Option<RawDescriptor>,
}

/// What a single selector call reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Readiness {
    pub readable: Vec<ConnectionId>,
    pub writable: Vec<ConnectionId>,
    pub errored: Vec<ConnectionId>,
}

/// A readiness-selection primitive with `select(2)` semantics.
pub trait Selector {
    /// Waits until a watched connection is ready or `timeout` passes
    /// (`None` waits indefinitely).
    ///
    /// # Errors
    ///
    /// Fails as a whole when any watched descriptor is invalid.
    fn select(
        &mut self,
        read: &[Watch],
        write: &[Watch],
        error: &[Watch],
        timeout: Option<Duration>,
    ) -> io::Result<Readiness>;
}

/// How long one poll may block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollTimeout {
    /// Wait until something is ready
    Block,
    /// Wait at most this long
    Wait(Duration),
    /// Do not poll at all
    Expired,
}

impl PollTimeout {
    /// Seconds to a timeout. Negative (or NaN) seconds mean [`PollTimeout::Expired`];
    /// values too large for a `Duration` mean [`PollTimeout::Block`].
    pub fn from_secs_f64(secs: f64) -> Self {
        if secs.is_nan() || secs < 0.0 {
            return PollTimeout::Expired;
        }
        match Duration::try_from_secs_f64(secs) {
            Ok(duration) => PollTimeout::Wait(duration),
            Err(_) => PollTimeout::Block,
        }
    }
}

impl From<Option<Duration>> for PollTimeout {
    fn from(timeout: Option<Duration>) -> Self {
        match timeout {
            Some(duration) => PollTimeout::Wait(duration),
            None => PollTimeout::Block,
        }
    }
}

impl From<Duration> for PollTimeout {
    fn from(duration: Duration) -> Self {
        PollTimeout::Wait(duration)
    }
}

/// Connections classified by one poll cycle. The three sets are disjoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollResult {
    pub readable: BTreeSet<ConnectionId>,
    pub writable: BTreeSet<ConnectionId>,
    pub faulted: BTreeSet<ConnectionId>,
}

impl PollResult {
    pub fn is_empty(&self) -> bool {
        self.readable.is_empty() && self.writable.is_empty() && self.faulted.is_empty()
    }
}

/// Drives a [`Selector`] with the fault-isolating retry policy.
#[derive(Debug, Default)]
pub struct Poller<S> {
    selector: S,
}

impl<S: Selector> Poller<S> {
    pub fn new(selector: S) -> Self {
        Self { selector }
    }

    pub fn selector(&self) -> &S {
        &self.selector
    }

    pub fn selector_mut(&mut self) -> &mut S {
        &mut self.selector
    }

    /// Runs one readiness poll over `connections`.
    ///
    /// Never fails: connections that break the readiness call end up in
    /// [`PollResult::faulted`]. Connection state is not modified.
    pub fn poll_once<'a, C, I>(&mut self, connections: I, timeout: impl Into<PollTimeout>) -> PollResult
    where
        C: Connection + 'a,
        I: IntoIterator<Item = (ConnectionId, &'a C)>,
    {
        let mut result = PollResult::default();
        let deadline = match timeout.into() {
            PollTimeout::Expired => return result,
            PollTimeout::Block => None,
            PollTimeout::Wait(duration) => Some(Instant::now() + duration),
        };

        let mut candidates: BTreeMap<ConnectionId, &C> = connections.into_iter().collect();
        let submitted = candidates.len();
        let mut fruitless = 0;

        while !candidates.is_empty() {
            let watch = |(&id, connection): (&ConnectionId, &&C)| Watch {
                id,
                descriptor: connection.descriptor(),
            };
            let read: Vec<Watch> = candidates
                .iter()
                .filter(|(_, connection)| connection.readable())
                .map(watch)
                .collect();
            let write: Vec<Watch> = candidates
                .iter()
                .filter(|(_, connection)| connection.writable())
                .map(watch)
                .collect();
            let all: Vec<Watch> = candidates.iter().map(watch).collect();

            // Retries only get what is left of the original budget.
            let timeout = deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()));
            match self.selector.select(&read, &write, &all, timeout) {
                Ok(readiness) => {
                    result.readable.extend(readiness.readable);
                    result.writable.extend(readiness.writable);
                    result.faulted.extend(readiness.errored);
                    break;
                }
                Err(e) => {
                    warn!(error = %e, candidates = all.len(), "Readiness poll failed, probing connections");
                    let faulted_before = result.faulted.len();
                    for probe in &all {
                        let outcome = self.selector.select(
                            std::slice::from_ref(probe),
                            &[],
                            &[],
                            Some(Duration::ZERO),
                        );
                        if let Err(e) = outcome {
                            error!(connection = %probe.id, error = %e, "Select error");
                            result.faulted.insert(probe.id);
                            candidates.remove(&probe.id);
                        }
                    }

                    if result.faulted.len() == faulted_before {
                        fruitless += 1;
                        if fruitless >= MAX_FRUITLESS_RETRIES {
                            warn!(retries = fruitless, "Readiness poll keeps failing, skipping this cycle");
                            break;
                        }
                    }
                }
            }
        }

        for id in &result.faulted {
            result.readable.remove(id);
            result.writable.remove(id);
        }

        debug!(
            poll = submitted,
            read = result.readable.len(),
            write = result.writable.len(),
            error = result.faulted.len(),
            "select"
        );
        result
    }
}

/// `poll(2)`-backed selector.
#[cfg(unix)]
#[derive(Debug, Default)]
pub struct PollSelector {
    fds: Vec<libc::pollfd>,
}

#[cfg(unix)]
#[derive(Debug, Clone, Copy, Default)]
struct Interest {
    descriptor: RawDescriptor,
    read: bool,
    write: bool,
    error: bool,
}

#[cfg(unix)]
impl PollSelector {
    pub fn new() -> Self {
        Self::default()
    }

    fn bad_descriptor() -> io::Error {
        io::Error::from_raw_os_error(libc::EBADF)
    }

    /// Whole milliseconds, rounded up so a short wait never becomes a spin.
    fn timeout_millis(timeout: Option<Duration>) -> libc::c_int {
        match timeout {
            None => -1,
            Some(duration) => {
                let mut millis = duration.as_millis();
                if duration.as_nanos() % 1_000_000 != 0 {
                    millis += 1;
                }
                millis.min(libc::c_int::MAX as u128) as libc::c_int
            }
        }
    }
}

#[cfg(unix)]
impl Selector for PollSelector {
    fn select(
        &mut self,
        read: &[Watch],
        write: &[Watch],
        error: &[Watch],
        timeout: Option<Duration>,
    ) -> io::Result<Readiness> {
        let mut interests: BTreeMap<ConnectionId, Interest> = BTreeMap::new();
        let mut watch_for = |watches: &[Watch], mark: fn(&mut Interest)| -> io::Result<()> {
            for watch in watches {
                let descriptor = watch.descriptor.ok_or_else(Self::bad_descriptor)?;
                let interest = interests.entry(watch.id).or_insert(Interest {
                    descriptor,
                    ..Interest::default()
                });
                mark(interest);
            }
            Ok(())
        };
        watch_for(read, |interest| interest.read = true)?;
        watch_for(write, |interest| interest.write = true)?;
        watch_for(error, |interest| interest.error = true)?;

        self.fds.clear();
        for interest in interests.values() {
            let mut events = 0;
            if interest.read {
                events |= libc::POLLIN;
            }
            if interest.write {
                events |= libc::POLLOUT;
            }
            self.fds.push(libc::pollfd {
                fd: interest.descriptor,
                events,
                revents: 0,
            });
        }

        // SAFETY: `fds` is a valid, initialized slice of pollfd for the
        // length passed, and outlives the call.
        let rc = unsafe {
            libc::poll(
                self.fds.as_mut_ptr(),
                self.fds.len() as libc::nfds_t,
                Self::timeout_millis(timeout),
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }

        let mut readiness = Readiness::default();
        for (pollfd, (&id, interest)) in self.fds.iter().zip(interests.iter()) {
            let revents = pollfd.revents;
            if revents & libc::POLLNVAL != 0 {
                return Err(Self::bad_descriptor());
            }
            let hangup = revents & libc::POLLHUP != 0;
            if interest.read && (revents & libc::POLLIN != 0 || hangup) {
                readiness.readable.push(id);
            }
            if interest.write && revents & libc::POLLOUT != 0 {
                readiness.writable.push(id);
            }
            if interest.error && (revents & libc::POLLERR != 0 || (hangup && !interest.read)) {
                readiness.errored.push(id);
            }
        }
        Ok(readiness)
    }
}
