//! Process-wide event reporter (§4.J, §5, §9): a lifecycle-managed
//! (`init`/`stop`) object that is the single writer to the durable event
//! log, fed both by a running engine and by the replay path's live
//! subscription. Modeled on differential-dataflow's own `Logger`
//! (`src/logging.rs`) — a typed event stream callers attach to — except
//! here the sink is a durable `EventLogWriter` rather than an in-memory
//! timely event channel, and the single-writer property (§5) is enforced
//! by routing every post through one background thread rather than by
//! locking a shared writer.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, OnceLock};
use std::thread::JoinHandle;

use crate::event_log::{EventLogEntry, EventLogWriter};

type Subscriber = Box<dyn FnMut(&EventLogEntry) + Send>;

enum Command {
    Post(EventLogEntry),
    Subscribe(Subscriber),
    Stop,
}

struct Inner {
    sender: Sender<Command>,
    writer_thread: Option<JoinHandle<()>>,
}

static REPORTER: OnceLock<Mutex<Option<Inner>>> = OnceLock::new();

/// Process-wide handle; all methods are no-ops before `init` and after
/// `stop`, so a non-master node (§6: `master-host`/`master-port` are out
/// of scope here) can call `post` unconditionally without checking
/// whether a reporter happens to be running locally.
pub struct EventReporter;

impl EventReporter {
    /// Starts the single writer thread, which owns `writer` for the rest
    /// of the process's life. A second `init` call while one is already
    /// running is a no-op — there is exactly one writer, ever (§5).
    pub fn init<W>(writer: EventLogWriter<W>, is_master: bool)
    where
        W: std::io::Write + Send + 'static,
    {
        let cell = REPORTER.get_or_init(|| Mutex::new(None));
        let mut guard = cell.lock().expect("event reporter lock poisoned");
        if guard.is_some() {
            return;
        }
        let (sender, receiver) = mpsc::channel();
        let handle = std::thread::spawn(move || run_writer(writer, receiver, is_master));
        *guard = Some(Inner { sender, writer_thread: Some(handle) });
    }

    /// Posts an entry. Dropped silently if no reporter is running —
    /// mirrors the engine's own behavior when lineage reporting isn't
    /// wired up at all, rather than forcing every call site to check.
    pub fn post(entry: EventLogEntry) {
        Self::with_inner(|inner| {
            let _ = inner.sender.send(Command::Post(entry));
        });
    }

    /// Registers a callback invoked with every entry subsequently posted
    /// — the "live subscription" §4.G asks the event-log reader to use so
    /// newly produced entries reach it as they occur.
    pub fn subscribe(callback: impl FnMut(&EventLogEntry) + Send + 'static) {
        Self::with_inner(|inner| {
            let _ = inner.sender.send(Command::Subscribe(Box::new(callback)));
        });
    }

    /// Stops the writer thread and joins it, flushing any entries still
    /// queued ahead of the stop command.
    pub fn stop() {
        let Some(cell) = REPORTER.get() else { return };
        let mut guard = cell.lock().expect("event reporter lock poisoned");
        if let Some(mut inner) = guard.take() {
            let _ = inner.sender.send(Command::Stop);
            if let Some(handle) = inner.writer_thread.take() {
                let _ = handle.join();
            }
        }
    }

    fn with_inner(f: impl FnOnce(&Inner)) {
        let Some(cell) = REPORTER.get() else { return };
        let guard = cell.lock().expect("event reporter lock poisoned");
        if let Some(inner) = guard.as_ref() {
            f(inner);
        }
    }
}

fn run_writer<W: std::io::Write>(mut writer: EventLogWriter<W>, receiver: Receiver<Command>, is_master: bool) {
    let mut subscribers: Vec<Subscriber> = Vec::new();
    for command in receiver {
        match command {
            Command::Post(entry) => {
                for subscriber in subscribers.iter_mut() {
                    subscriber(&entry);
                }
                if is_master {
                    if let Err(error) = writer.append(&entry) {
                        tracing::warn!(%error, "event reporter failed to append entry");
                    }
                }
            }
            Command::Subscribe(subscriber) => subscribers.push(subscriber),
            Command::Stop => break,
        }
    }
}
