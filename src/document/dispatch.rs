//! Request dispatcher - priority queue, worker threads and completions

use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use flume::{Receiver, RecvTimeoutError, Sender};
use log::{debug, error, warn};

use super::request::{Completion, GeneratorFault, Job, ObserverId, PixmapRequest, RequestId};
use crate::generator::Generator;

type Key = (ObserverId, usize);

/// What happened to a submitted request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submitted {
    Queued(RequestId),
    /// Same observer, page and size is already pending
    Duplicate(RequestId),
}

/// Owns the worker threads for one open document.
///
/// All bookkeeping happens on the owner thread; workers only see jobs and
/// the set of superseded ids they may skip.
pub struct Dispatcher {
    generator: Arc<dyn Generator>,
    job_tx: Sender<Job>,
    completion_tx: Sender<Completion>,
    completion_rx: Receiver<Completion>,
    num_workers: usize,
    next_request_id: u64,
    /// Asynchronous requests waiting for a free worker, most urgent first
    queue: Vec<PixmapRequest>,
    /// Requests rendered on the owner thread at the next pump
    sync_queue: VecDeque<PixmapRequest>,
    /// Jobs handed to workers
    in_flight: HashSet<RequestId>,
    /// Current request for each (observer, page)
    latest: HashMap<Key, PixmapRequest>,
    superseded: Arc<Mutex<HashSet<RequestId>>>,
    text_in_flight: HashMap<usize, RequestId>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(generator: Arc<dyn Generator>, num_workers: usize) -> Self {
        // flume gives MPMC channels: every worker clones the job receiver
        // and pulls from the shared queue
        let (job_tx, job_rx) = flume::unbounded();
        let (completion_tx, completion_rx) = flume::unbounded();
        let superseded = Arc::new(Mutex::new(HashSet::new()));
        let num_workers = num_workers.max(1);

        for n in 0..num_workers {
            let generator = Arc::clone(&generator);
            let rx = job_rx.clone();
            let tx = completion_tx.clone();
            let superseded = Arc::clone(&superseded);

            let spawned = std::thread::Builder::new()
                .name(format!("folio-render-{n}"))
                .spawn(move || dispatch_worker(generator, rx, tx, superseded));
            if let Err(e) = spawned {
                error!("Failed to spawn render worker {n}: {e}");
            }
        }

        Self {
            generator,
            job_tx,
            completion_tx,
            completion_rx,
            num_workers,
            next_request_id: 1,
            queue: Vec::new(),
            sync_queue: VecDeque::new(),
            in_flight: HashSet::new(),
            latest: HashMap::new(),
            superseded,
            text_in_flight: HashMap::new(),
        }
    }

    /// Queue a request, superseding a pending one for the same key at a
    /// different size
    pub fn submit(&mut self, mut request: PixmapRequest) -> Submitted {
        let key = request.key();
        if let Some(pending) = self.latest.get(&key) {
            if pending.same_size(&request) {
                debug!(
                    "Request for page {} by {:?} already pending as {:?}",
                    request.page, request.observer, pending.id
                );
                return Submitted::Duplicate(pending.id);
            }
            let old = pending.id;
            self.supersede(old);
        }

        request.id = self.next_id();
        let id = request.id;
        self.latest.insert(key, request.clone());

        if request.asynchronous && self.generator.can_render_async() {
            // Stable: after every request of equal or higher urgency
            let at = self
                .queue
                .iter()
                .position(|r| r.priority > request.priority)
                .unwrap_or(self.queue.len());
            self.queue.insert(at, request);
        } else {
            self.sync_queue.push_back(request);
        }
        self.dispatch();
        Submitted::Queued(id)
    }

    /// Drop a request wherever it is; in-flight ones are flagged for workers
    fn supersede(&mut self, id: RequestId) {
        debug!("Superseding request {id:?}");
        self.queue.retain(|r| r.id != id);
        self.sync_queue.retain(|r| r.id != id);
        if self.in_flight.contains(&id) {
            self.superseded
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(id);
        }
    }

    /// Cancel everything pending for an observer
    pub fn cancel_observer(&mut self, observer: ObserverId) {
        let ids: Vec<RequestId> = self
            .latest
            .iter()
            .filter(|((o, _), _)| *o == observer)
            .map(|(_, r)| r.id)
            .collect();
        for id in ids {
            self.supersede(id);
        }
        self.latest.retain(|(o, _), _| *o != observer);
    }

    /// Cancel every pending pixmap request
    pub fn cancel_all(&mut self) {
        let ids: Vec<RequestId> = self.latest.values().map(|r| r.id).collect();
        for id in ids {
            self.supersede(id);
        }
        self.latest.clear();
    }

    /// Hand queued requests to idle workers
    fn dispatch(&mut self) {
        while self.in_flight.len() < self.num_workers && !self.queue.is_empty() {
            let request = self.queue.remove(0);
            let id = request.id;
            debug!(
                "Dispatching {:?}: page {} at {}x{} for {:?}",
                id, request.page, request.width, request.height, request.observer
            );
            if self.job_tx.send(Job::Pixmap(request)).is_err() {
                warn!("Render workers are gone, dropping request {id:?}");
                continue;
            }
            self.in_flight.insert(id);
        }
    }

    /// Ask a worker for the text layer; false if already in flight
    pub fn request_text(&mut self, page: usize) -> bool {
        if self.text_in_flight.contains_key(&page) {
            return false;
        }
        let id = self.next_id();
        if self.job_tx.send(Job::Text { id, page }).is_err() {
            warn!("Render workers are gone, cannot extract text of page {page}");
            return false;
        }
        self.text_in_flight.insert(page, id);
        true
    }

    #[must_use]
    pub fn is_text_in_flight(&self, page: usize) -> bool {
        self.text_in_flight.contains_key(&page)
    }

    /// Whether a pixmap request for this key is waiting or rendering
    #[must_use]
    pub fn is_pending(&self, observer: ObserverId, page: usize) -> bool {
        self.latest.contains_key(&(observer, page))
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.latest.len()
    }

    /// Render owner-thread requests, then drain whatever workers finished
    pub fn take_completions(&mut self) -> Vec<Completion> {
        while let Some(request) = self.sync_queue.pop_front() {
            let result = render_guarded(self.generator.as_ref(), &request);
            let _ = self
                .completion_tx
                .send(Completion::Pixmap { request, result });
        }

        let mut completions = Vec::new();
        while let Ok(completion) = self.completion_rx.try_recv() {
            self.forget_job(completion.id());
            completions.push(completion);
        }
        self.dispatch();
        completions
    }

    /// Like [`take_completions`](Self::take_completions) but blocks up to
    /// `timeout` for the first completion when nothing is ready yet
    pub fn wait_completions(&mut self, timeout: Duration) -> Vec<Completion> {
        if self.sync_queue.is_empty() && self.completion_rx.is_empty() {
            match self.completion_rx.recv_timeout(timeout) {
                Ok(first) => {
                    self.forget_job(first.id());
                    let mut completions = vec![first];
                    completions.extend(self.take_completions());
                    return completions;
                }
                Err(RecvTimeoutError::Timeout) => return Vec::new(),
                Err(RecvTimeoutError::Disconnected) => {
                    warn!("Completion channel disconnected");
                    return Vec::new();
                }
            }
        }
        self.take_completions()
    }

    fn forget_job(&mut self, id: RequestId) {
        self.in_flight.remove(&id);
        self.superseded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    /// Close out a pixmap completion; false when it was superseded
    pub fn settle(&mut self, request: &PixmapRequest) -> bool {
        let key = request.key();
        match self.latest.get(&key) {
            Some(current) if current.id == request.id => {
                self.latest.remove(&key);
                true
            }
            _ => false,
        }
    }

    /// Close out a text completion; false when it is unknown
    pub fn settle_text(&mut self, id: RequestId, page: usize) -> bool {
        if self.text_in_flight.get(&page) == Some(&id) {
            self.text_in_flight.remove(&page);
            true
        } else {
            false
        }
    }

    pub fn generator(&self) -> &Arc<dyn Generator> {
        &self.generator
    }

    pub fn shutdown(&self) {
        for _ in 0..self.num_workers {
            let _ = self.job_tx.send(Job::Shutdown);
        }
    }

    fn next_id(&mut self) -> RequestId {
        let id = RequestId::new(self.next_request_id);
        self.next_request_id += 1;
        id
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Render upright through the generator, then turn the result to the
/// requested rotation
fn render_guarded(generator: &dyn Generator, request: &PixmapRequest) -> Result<super::Pixmap, GeneratorFault> {
    let upright = request.upright();
    panic::catch_unwind(AssertUnwindSafe(|| generator.render_pixmap(&upright)))
        .unwrap_or_else(|_| {
            Err(GeneratorFault::generic(format!(
                "generator panicked rendering page {}",
                request.page
            )))
        })
        .map(|pixmap| request.rotation.rotate_pixmap(pixmap))
}

/// Worker loop - runs in a dedicated thread
#[expect(
    clippy::needless_pass_by_value,
    reason = "Values moved into thread, need ownership"
)]
fn dispatch_worker(
    generator: Arc<dyn Generator>,
    jobs: Receiver<Job>,
    completions: Sender<Completion>,
    superseded: Arc<Mutex<HashSet<RequestId>>>,
) {
    for job in jobs {
        match job {
            Job::Pixmap(request) => {
                let skip = superseded
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .contains(&request.id);
                if skip {
                    let _ = completions.send(Completion::Cancelled(request.id));
                    continue;
                }
                let result = render_guarded(generator.as_ref(), &request);
                let _ = completions.send(Completion::Pixmap { request, result });
            }

            Job::Text { id, page } => {
                let text = panic::catch_unwind(AssertUnwindSafe(|| generator.extract_text(page)))
                    .unwrap_or_else(|_| {
                        error!("Generator panicked extracting text of page {page}");
                        None
                    });
                let _ = completions.send(Completion::Text { id, page, text });
            }

            Job::Shutdown => break,
        }
    }
}
